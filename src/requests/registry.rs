use dashmap::DashMap;
use parking_lot::Mutex;
use serenity::all::GuildId;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::bundle::{MediaRequestLifecycleStage, MultiMediaRequestBundle};

pub type SharedRequestBundle = Arc<Mutex<MultiMediaRequestBundle>>;

/// Live request bundles, keyed by bundle uuid.
#[derive(Default)]
pub struct RequestBundleRegistry {
    bundles: DashMap<Uuid, SharedRequestBundle>,
}

impl RequestBundleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, bundle: MultiMediaRequestBundle) -> Uuid {
        let uuid = bundle.uuid;
        debug!("🧾 Registering request bundle {} for guild {}", uuid, bundle.guild_id);
        self.bundles.insert(uuid, Arc::new(Mutex::new(bundle)));
        uuid
    }

    pub fn get(&self, uuid: &Uuid) -> Option<SharedRequestBundle> {
        self.bundles.get(uuid).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }

    pub fn add_media_request(&self, bundle_uuid: &Uuid, search: impl Into<String>) -> Option<Uuid> {
        let bundle = self.get(bundle_uuid)?;
        let request = bundle.lock().add_media_request(search);
        Some(request)
    }

    pub fn print(&self, uuid: &Uuid) -> Option<Vec<String>> {
        self.get(uuid).map(|bundle| bundle.lock().print())
    }

    pub fn update_request_status(
        &self,
        bundle_uuid: &Uuid,
        request_uuid: Uuid,
        stage: MediaRequestLifecycleStage,
        failure_reason: Option<String>,
        override_message: Option<String>,
    ) -> bool {
        self.get(bundle_uuid).is_some_and(|bundle| {
            bundle
                .lock()
                .update_request_status(request_uuid, stage, failure_reason, override_message)
        })
    }

    pub fn is_finished(&self, uuid: &Uuid) -> bool {
        self.get(uuid).is_none_or(|bundle| bundle.lock().finished())
    }

    /// Drops the bundle once every member request has settled.
    pub fn remove_if_done(&self, uuid: &Uuid) -> bool {
        let removed = self
            .bundles
            .remove_if(uuid, |_, bundle| {
                let bundle = bundle.lock();
                bundle.finished() || bundle.is_shutdown()
            })
            .is_some();

        if removed {
            debug!("🗑️ Request bundle {} removed", uuid);
        }
        removed
    }

    /// Silences and forgets every bundle for a guild. Returns their uuids so
    /// callers can tear down the matching chat messages.
    pub fn shutdown_guild(&self, guild_id: GuildId) -> Vec<Uuid> {
        let uuids: Vec<Uuid> = self
            .bundles
            .iter()
            .filter(|entry| entry.value().lock().guild_id == guild_id)
            .map(|entry| *entry.key())
            .collect();

        for uuid in &uuids {
            if let Some((_, bundle)) = self.bundles.remove(uuid) {
                bundle.lock().shutdown();
            }
        }

        if !uuids.is_empty() {
            info!("🛑 Shut down {} request bundles for guild {}", uuids.len(), guild_id);
        }
        uuids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::testing::FakeChannel;
    use pretty_assertions::assert_eq;

    fn bundle(guild: u64) -> MultiMediaRequestBundle {
        MultiMediaRequestBundle::new(FakeChannel::new(guild, 2).shared(), "playlist", 5)
    }

    #[test]
    fn removal_waits_for_completion() {
        let registry = RequestBundleRegistry::new();
        let uuid = registry.insert(bundle(1));
        let request = registry.add_media_request(&uuid, "song").unwrap();

        assert!(!registry.remove_if_done(&uuid));
        assert!(registry.update_request_status(
            &uuid,
            request,
            MediaRequestLifecycleStage::Completed,
            None,
            None
        ));
        assert!(registry.remove_if_done(&uuid));
        assert!(registry.is_empty());
        assert!(registry.print(&uuid).is_none());
    }

    #[test]
    fn shutdown_only_touches_one_guild() {
        let registry = RequestBundleRegistry::new();
        let first = registry.insert(bundle(1));
        let other = registry.insert(bundle(9));
        let first_handle = registry.get(&first).unwrap();

        assert_eq!(registry.shutdown_guild(GuildId::new(1)), vec![first]);
        assert!(first_handle.lock().is_shutdown());
        assert!(registry.get(&first).is_none());
        assert!(registry.get(&other).is_some());
    }

    #[test]
    fn unknown_bundles() {
        let registry = RequestBundleRegistry::new();
        let missing = Uuid::new_v4();

        assert!(registry.add_media_request(&missing, "x").is_none());
        assert!(!registry.update_request_status(
            &missing,
            Uuid::new_v4(),
            MediaRequestLifecycleStage::Failed,
            None,
            None
        ));
        assert!(registry.is_finished(&missing));
        assert!(!registry.remove_if_done(&missing));
    }

    #[test]
    fn concurrent_updates_are_all_counted() {
        let registry = RequestBundleRegistry::new();
        let uuid = registry.insert(bundle(1));
        let requests: Vec<Uuid> = (0..16)
            .filter_map(|i| registry.add_media_request(&uuid, format!("song {}", i)))
            .collect();
        assert_eq!(requests.len(), 16);

        std::thread::scope(|scope| {
            for request in &requests {
                let registry = &registry;
                scope.spawn(move || {
                    assert!(registry.update_request_status(
                        &uuid,
                        *request,
                        MediaRequestLifecycleStage::Completed,
                        None,
                        None
                    ));
                });
            }
        });

        let handle = registry.get(&uuid).unwrap();
        assert_eq!(handle.lock().completed(), 16);
        assert!(handle.lock().finished());

        let removals = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| registry.remove_if_done(&uuid)))
                .collect();
            workers
                .into_iter()
                .map(|worker| worker.join().unwrap())
                .filter(|removed| *removed)
                .count()
        });
        assert_eq!(removals, 1);
        assert!(registry.is_empty());
    }
}
