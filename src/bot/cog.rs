use dashmap::DashMap;
use serenity::all::GuildId;
use std::{sync::Arc, time::Duration};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    config::Config,
    error::MessageQueueError,
    media::MediaDownload,
    messages::{
        render::wrap_urls, BatchEntry, BatchItemStatus, LifecycleStage, MessageDispatch, MessageQueue,
        SharedChannel,
    },
    requests::{MediaRequestLifecycleStage, MultiMediaRequestBundle, RequestBundleRegistry},
    ui::render_play_queue,
};

const PLAY_ORDER_PREFIX: &str = "play_order-";
const REQUEST_BUNDLE_PREFIX: &str = "request_bundle-";

pub fn play_order_key(guild_id: GuildId) -> String {
    format!("{}{}", PLAY_ORDER_PREFIX, guild_id)
}

pub fn request_bundle_key(bundle_uuid: Uuid) -> String {
    format!("{}{}", REQUEST_BUNDLE_PREFIX, bundle_uuid)
}

/// What a multi-mutable bundle should currently display.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleContent {
    pub lines: Vec<String>,
    pub delete_after: Option<Duration>,
    /// Once displayed, the bundle can stop being tracked.
    pub finished: bool,
}

impl BundleContent {
    /// Nothing left to show; clears whatever is still in the channel.
    pub fn gone() -> Self {
        Self {
            finished: true,
            ..Self::default()
        }
    }
}

/// Resolves bundle keys handed out by the queue into display lines.
pub trait BundleContentSource: Send + Sync {
    fn bundle_content(&self, key: &str) -> BundleContent;

    /// Called after a finished bundle has been displayed for the last time.
    fn bundle_finished(&self, key: &str);
}

/// Handle for an item queued through [`MusicCog::queue_items`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueuedItem {
    Batched { batch_id: Uuid, key: String },
    Single { uuid: Uuid, content: String },
}

struct PlayQueueView {
    channel: SharedChannel,
    now_playing: Option<MediaDownload>,
    upcoming: Vec<MediaDownload>,
}

/// Music-facing producer side of the message queue.
///
/// Command handlers and download workers call into the cog; the
/// [`MessageDispatcher`](super::MessageDispatcher) renders whatever the cog
/// reports through [`BundleContentSource`].
pub struct MusicCog {
    config: Arc<Config>,
    queue: Arc<MessageQueue>,
    requests: Arc<RequestBundleRegistry>,
    play_queues: DashMap<GuildId, PlayQueueView>,
}

impl MusicCog {
    pub fn new(config: Arc<Config>) -> Self {
        let queue = MessageQueue::new(config.batch_size, config.batch_auto_delete_after);
        Self {
            config,
            queue: Arc::new(queue),
            requests: Arc::new(RequestBundleRegistry::new()),
            play_queues: DashMap::new(),
        }
    }

    pub fn queue(&self) -> &Arc<MessageQueue> {
        &self.queue
    }

    pub fn requests(&self) -> &Arc<RequestBundleRegistry> {
        &self.requests
    }

    // Play queue display

    /// Replaces the play queue shown for a guild.
    pub fn update_play_queue(
        &self,
        channel: SharedChannel,
        now_playing: Option<MediaDownload>,
        upcoming: Vec<MediaDownload>,
    ) -> Result<(), MessageQueueError> {
        let guild_id = channel.guild_id();
        debug!(
            "🎶 Play queue for guild {}: {} upcoming",
            guild_id,
            upcoming.len()
        );
        self.play_queues.insert(
            guild_id,
            PlayQueueView {
                channel: channel.clone(),
                now_playing,
                upcoming,
            },
        );

        self.queue.update_multiple_mutable(
            &play_order_key(guild_id),
            Some(channel),
            self.config.sticky_queue_messages,
        )?;
        Ok(())
    }

    /// Takes the play queue display down.
    pub fn clear_play_queue(&self, guild_id: GuildId) {
        self.play_queues.remove(&guild_id);
        self.touch(&play_order_key(guild_id));
    }

    // Request bundles

    /// Starts tracking a multi-item request and schedules its first render.
    /// Returns the bundle uuid and one uuid per search, in order.
    pub fn start_request_bundle(
        &self,
        channel: SharedChannel,
        input_string: &str,
        searches: Vec<String>,
    ) -> Result<(Uuid, Vec<Uuid>), MessageQueueError> {
        let mut bundle =
            MultiMediaRequestBundle::new(channel.clone(), input_string, self.config.items_per_message);
        let request_uuids: Vec<Uuid> = searches
            .into_iter()
            .map(|search| bundle.add_media_request(search))
            .collect();

        let bundle_uuid = self.requests.insert(bundle);
        info!(
            "📥 Request bundle {} started with {} items",
            bundle_uuid,
            request_uuids.len()
        );

        self.queue
            .update_multiple_mutable(&request_bundle_key(bundle_uuid), Some(channel), false)?;
        Ok((bundle_uuid, request_uuids))
    }

    pub fn update_request(
        &self,
        bundle_uuid: Uuid,
        request_uuid: Uuid,
        stage: MediaRequestLifecycleStage,
        failure_reason: Option<String>,
        override_message: Option<String>,
    ) -> bool {
        let updated = self.requests.update_request_status(
            &bundle_uuid,
            request_uuid,
            stage,
            failure_reason,
            override_message,
        );
        if updated {
            self.touch(&request_bundle_key(bundle_uuid));
        }
        updated
    }

    // Single messages and batches

    /// Queues an error reply that is sent once and left alone.
    pub fn send_error(&self, channel: SharedChannel, message: impl Into<String>) -> bool {
        let content = wrap_urls(&message.into());
        let delete_after = self.config.error_delete_after;

        self.queue
            .send_single_immutable(vec![MessageDispatch::immutable(async move {
                channel.send(&content, delete_after).await.map(Some)
            })])
    }

    /// Announces items that arrived together: two or more share a batch
    /// message, a lone item gets its own.
    pub fn queue_items(&self, channel: SharedChannel, entries: Vec<BatchEntry>) -> Vec<QueuedItem> {
        if self.queue.should_batch_items(entries.len()) {
            return self
                .queue
                .add_items_to_batch(channel, entries)
                .into_iter()
                .map(|(key, batch_id)| QueuedItem::Batched { batch_id, key })
                .collect();
        }

        entries
            .into_iter()
            .map(|entry| {
                let content = entry.content;
                let line = single_item_line(&content, BatchItemStatus::Pending, None);
                let uuid = self.queue.send_single_mutable(channel.clone(), line, None);
                QueuedItem::Single { uuid, content }
            })
            .collect()
    }

    /// Reports progress on an item. Completed single messages are removed.
    pub fn update_item(
        &self,
        item: &QueuedItem,
        status: BatchItemStatus,
        error_message: Option<String>,
    ) -> bool {
        match item {
            QueuedItem::Batched { batch_id, key } => {
                self.queue
                    .update_batch_item(*batch_id, key, status, error_message)
            }
            QueuedItem::Single { uuid, content } => {
                if status == BatchItemStatus::Completed {
                    return self
                        .queue
                        .update_single_mutable(*uuid, LifecycleStage::Delete, None, None);
                }

                let delete_after = (!status.is_active())
                    .then_some(self.config.error_delete_after)
                    .flatten();
                let line = single_item_line(content, status, error_message.as_deref());
                self.queue
                    .update_single_mutable(*uuid, LifecycleStage::Edit, Some(line), delete_after)
            }
        }
    }

    // Housekeeping

    /// Drops every display, batch and request bundle of a guild and queues
    /// deletes for messages already in the channel.
    pub fn cleanup_guild(&self, guild_id: GuildId) {
        info!("🧹 Cleaning up messages for guild {}", guild_id);

        let deletes = self.queue.clear_guild(guild_id);
        self.queue.send_single_immutable(deletes);

        for bundle_uuid in self.requests.shutdown_guild(guild_id) {
            self.touch(&request_bundle_key(bundle_uuid));
        }
        self.clear_play_queue(guild_id);
    }

    /// Marks an existing bundle dirty. Missing bundles are ignored.
    fn touch(&self, key: &str) {
        if !self.queue.contains_multiple_mutable(key) {
            return;
        }
        if let Err(e) = self.queue.update_multiple_mutable(key, None, false) {
            // Removed between the check and the update.
            debug!("Bundle {} went away: {}", key, e);
        }
    }
}

impl BundleContentSource for MusicCog {
    fn bundle_content(&self, key: &str) -> BundleContent {
        if let Some(guild) = key.strip_prefix(PLAY_ORDER_PREFIX) {
            let Some(view) = guild
                .parse::<u64>()
                .ok()
                .filter(|id| *id != 0)
                .and_then(|id| self.play_queues.get(&GuildId::new(id)))
            else {
                return BundleContent::gone();
            };

            return BundleContent {
                lines: render_play_queue(
                    view.now_playing.as_ref(),
                    &view.upcoming,
                    self.config.max_queue_display,
                ),
                delete_after: None,
                finished: false,
            };
        }

        if let Some(uuid) = key.strip_prefix(REQUEST_BUNDLE_PREFIX) {
            let Some(bundle) = Uuid::parse_str(uuid)
                .ok()
                .and_then(|uuid| self.requests.get(&uuid))
            else {
                return BundleContent::gone();
            };

            let bundle = bundle.lock();
            let finished = bundle.finished() || bundle.is_shutdown();
            return BundleContent {
                lines: bundle.print(),
                delete_after: finished.then_some(self.config.bundle_delete_after).flatten(),
                finished,
            };
        }

        warn!("❓ Unknown bundle key {}", key);
        BundleContent::gone()
    }

    fn bundle_finished(&self, key: &str) {
        if let Some(uuid) = key
            .strip_prefix(REQUEST_BUNDLE_PREFIX)
            .and_then(|uuid| Uuid::parse_str(uuid).ok())
        {
            self.requests.remove_if_done(&uuid);
        }
    }
}

fn single_item_line(content: &str, status: BatchItemStatus, detail: Option<&str>) -> String {
    let content = wrap_urls(content);
    match (status, detail) {
        (BatchItemStatus::Downloading, _) => format!("{} Downloading {}", status.glyph(), content),
        (BatchItemStatus::Failed, Some(error)) => {
            format!("{} Failed {}: {}", status.glyph(), content, error)
        }
        (BatchItemStatus::Skipped, Some(reason)) => {
            format!("{} Skipped {}: {}", status.glyph(), content, reason)
        }
        (BatchItemStatus::Failed, None) => format!("{} Failed {}", status.glyph(), content),
        (BatchItemStatus::Skipped, None) => format!("{} Skipped {}", status.glyph(), content),
        _ => format!("{} Queued {}", status.glyph(), content),
    }
}
