use parking_lot::Mutex;
use serenity::all::GuildId;
use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::Arc,
    time::Duration,
};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    batch::{BatchEntry, BatchItemStatus, BatchedMessageItem},
    bundle::MessageMutableBundle,
    channel::SharedChannel,
    context::{LifecycleStage, MessageContext, StageTransition},
    dispatch::{DispatchAction, DispatchOutcome, MessageDispatch},
};
use crate::error::MessageQueueError;

/// Smallest number of co-arriving items worth a shared batch message.
pub const MIN_BATCH_ITEMS: usize = 2;

pub type SharedBundle = Arc<AsyncMutex<MessageMutableBundle>>;

/// Lane an item came from, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    MultipleMutable,
    BatchedMessage,
    SourceLifecycle,
    SingleImmutable,
}

/// Work handed to the consumer by [`MessageQueue::get_next_message`].
#[derive(Debug)]
pub enum QueuedMessage {
    /// Key of a dirty bundle; content is resolved by the consumer.
    MultipleMutable(String),
    BatchedMessage { batch_id: Uuid, dispatch: MessageDispatch },
    SourceLifecycle(MessageDispatch),
    SingleImmutable(Vec<MessageDispatch>),
}

impl QueuedMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::MultipleMutable(_) => MessageKind::MultipleMutable,
            Self::BatchedMessage { .. } => MessageKind::BatchedMessage,
            Self::SourceLifecycle(_) => MessageKind::SourceLifecycle,
            Self::SingleImmutable(_) => MessageKind::SingleImmutable,
        }
    }
}

/// Rendered state of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchUpdate {
    pub content: String,
    pub delete_after: Option<Duration>,
    pub complete: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub bundles: usize,
    pub dirty_bundles: usize,
    pub active_batches: usize,
    pub pending_batches: usize,
    pub single_mutable: usize,
    pub single_immutable: usize,
    pub in_flight: usize,
}

#[derive(Default)]
struct QueueState {
    sequence: u64,
    mutable_bundles: HashMap<String, SharedBundle>,
    dirty_bundles: HashMap<String, u64>,
    in_flight_bundles: HashSet<String>,

    active_batches: HashMap<Uuid, BatchedMessageItem>,
    pending_batches: HashMap<GuildId, BatchedMessageItem>,
    dirty_batches: VecDeque<Uuid>,
    in_flight_batches: HashSet<Uuid>,

    single_mutable: HashMap<Uuid, MessageContext>,
    dirty_singles: VecDeque<Uuid>,
    in_flight_singles: HashSet<Uuid>,

    single_immutable: VecDeque<Vec<MessageDispatch>>,
}

impl QueueState {
    fn mark_bundle_dirty(&mut self, key: &str) {
        if !self.dirty_bundles.contains_key(key) {
            self.sequence += 1;
            self.dirty_bundles.insert(key.to_string(), self.sequence);
        }
    }

    fn mark_batch_dirty(&mut self, batch_id: Uuid) {
        if !self.dirty_batches.contains(&batch_id) {
            self.dirty_batches.push_back(batch_id);
        }
    }

    fn mark_single_dirty(&mut self, uuid: Uuid) {
        if !self.dirty_singles.contains(&uuid) {
            self.dirty_singles.push_back(uuid);
        }
    }

    fn forget_single(&mut self, uuid: Uuid) -> Option<MessageContext> {
        self.dirty_singles.retain(|id| *id != uuid);
        self.single_mutable.remove(&uuid)
    }

    fn activate_batch(&mut self, batch: BatchedMessageItem) {
        let batch_id = batch.batch_id;
        info!(
            "📦 Batch {} live for guild {} with {} items",
            batch_id,
            batch.guild_id,
            batch.total()
        );
        self.active_batches.insert(batch_id, batch);
        self.mark_batch_dirty(batch_id);
    }

    fn remove_completed_batch(&mut self, batch_id: Uuid) -> bool {
        let complete = self
            .active_batches
            .get(&batch_id)
            .is_some_and(BatchedMessageItem::is_processing_complete);
        if !complete || self.in_flight_batches.contains(&batch_id) {
            return false;
        }

        self.active_batches.remove(&batch_id);
        self.dirty_batches.retain(|id| *id != batch_id);
        debug!("🧹 Batch {} completed and removed", batch_id);
        true
    }

    /// Oldest dirty bundle that is not already being dispatched.
    fn next_bundle(&mut self) -> Option<String> {
        let key = self
            .dirty_bundles
            .iter()
            .filter(|(key, _)| !self.in_flight_bundles.contains(key.as_str()))
            .min_by_key(|(_, sequence)| **sequence)
            .map(|(key, _)| key.clone())?;

        self.dirty_bundles.remove(&key);
        self.in_flight_bundles.insert(key.clone());
        Some(key)
    }

    fn next_batch(&mut self) -> Option<(Uuid, MessageDispatch)> {
        while let Some(index) = self
            .dirty_batches
            .iter()
            .position(|id| !self.in_flight_batches.contains(id))
        {
            let batch_id = self.dirty_batches.remove(index)?;
            let Some(batch) = self.active_batches.get_mut(&batch_id) else {
                continue;
            };

            let content = batch.generate_message_content();
            let delete_after = batch.get_delete_after();
            let context = batch.message_context_mut();
            context.message_content = Some(content);
            context.delete_after = delete_after;
            let dispatch = if context.has_message() {
                context.edit_dispatch()
            } else {
                context.send_dispatch()
            };

            self.in_flight_batches.insert(batch_id);
            return Some((batch_id, dispatch));
        }
        None
    }

    fn next_single(&mut self) -> Option<MessageDispatch> {
        while let Some(index) = self
            .dirty_singles
            .iter()
            .position(|id| !self.in_flight_singles.contains(id))
        {
            let uuid = self.dirty_singles.remove(index)?;
            let Some(context) = self.single_mutable.get(&uuid) else {
                continue;
            };

            let dispatch = context.dispatch();
            self.in_flight_singles.insert(uuid);
            return Some(dispatch);
        }
        None
    }
}

/// Process-wide mailbox between message producers and the single consumer.
///
/// Lanes are served in strict priority: multi-mutable bundles, batches,
/// single mutable contexts, then one-shot immutable dispatches. Anything
/// handed out stays "in flight" until its `complete_*` routine is called, so
/// one bundle, batch or context never has two dispatches running at once.
pub struct MessageQueue {
    state: Mutex<QueueState>,
    batch_size: usize,
    batch_auto_delete_after: Option<Duration>,
}

impl MessageQueue {
    pub fn new(batch_size: usize, batch_auto_delete_after: Option<Duration>) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            batch_size: batch_size.max(MIN_BATCH_ITEMS),
            batch_auto_delete_after,
        }
    }

    pub fn get_next_message(&self) -> Option<QueuedMessage> {
        let mut state = self.state.lock();

        if let Some(key) = state.next_bundle() {
            return Some(QueuedMessage::MultipleMutable(key));
        }
        if let Some((batch_id, dispatch)) = state.next_batch() {
            return Some(QueuedMessage::BatchedMessage { batch_id, dispatch });
        }
        if let Some(dispatch) = state.next_single() {
            return Some(QueuedMessage::SourceLifecycle(dispatch));
        }
        state
            .single_immutable
            .pop_front()
            .map(QueuedMessage::SingleImmutable)
    }

    // Multi-mutable bundles

    /// Marks the bundle under `key` for redisplay, creating it on first use.
    ///
    /// Returns `Ok(true)` when a bundle was created. Creating requires a
    /// channel; updating an existing bundle ignores it.
    pub fn update_multiple_mutable(
        &self,
        key: &str,
        channel: Option<SharedChannel>,
        sticky_messages: bool,
    ) -> Result<bool, MessageQueueError> {
        let mut state = self.state.lock();

        let created = if state.mutable_bundles.contains_key(key) {
            false
        } else {
            let Some(channel) = channel else {
                return Err(MessageQueueError::MissingChannel {
                    key: key.to_string(),
                });
            };
            let bundle = MessageMutableBundle::new(channel, sticky_messages);
            info!(
                "🆕 Message bundle {} created in channel {}",
                key, bundle.channel_id
            );
            state
                .mutable_bundles
                .insert(key.to_string(), Arc::new(AsyncMutex::new(bundle)));
            true
        };

        state.mark_bundle_dirty(key);
        Ok(created)
    }

    pub fn get_multiple_mutable(&self, key: &str) -> Option<SharedBundle> {
        self.state.lock().mutable_bundles.get(key).cloned()
    }

    pub fn contains_multiple_mutable(&self, key: &str) -> bool {
        self.state.lock().mutable_bundles.contains_key(key)
    }

    /// Stops tracking a bundle. Its messages are left as they are.
    pub fn remove_multiple_mutable(&self, key: &str) -> Option<SharedBundle> {
        let mut state = self.state.lock();
        state.dirty_bundles.remove(key);
        state.mutable_bundles.remove(key)
    }

    /// Releases the in-flight mark taken by [`get_next_message`](Self::get_next_message).
    pub fn complete_multiple_mutable(&self, key: &str) {
        self.state.lock().in_flight_bundles.remove(key);
    }

    // Single mutable contexts

    /// Registers a new message that has not been sent yet.
    pub fn send_single_mutable(
        &self,
        channel: SharedChannel,
        content: impl Into<String>,
        delete_after: Option<Duration>,
    ) -> Uuid {
        let context = MessageContext::new(channel)
            .with_content(content)
            .with_delete_after(delete_after);
        let uuid = context.uuid;

        let mut state = self.state.lock();
        state.single_mutable.insert(uuid, context);
        state.mark_single_dirty(uuid);
        uuid
    }

    /// Coalesces an update into a tracked context. `false` for unknown uuids.
    pub fn update_single_mutable(
        &self,
        uuid: Uuid,
        stage: LifecycleStage,
        content: Option<String>,
        delete_after: Option<Duration>,
    ) -> bool {
        let mut state = self.state.lock();
        let in_flight = state.in_flight_singles.contains(&uuid);
        let Some(context) = state.single_mutable.get_mut(&uuid) else {
            return false;
        };

        match context.apply_update(stage, content, delete_after) {
            StageTransition::Stay(_) => state.mark_single_dirty(uuid),
            StageTransition::Discard if in_flight => {
                // The send is already out; remove the message once it lands.
                context.lifecycle_stage = LifecycleStage::Delete;
                context.message_content = None;
                state.mark_single_dirty(uuid);
            }
            StageTransition::Discard => {
                state.forget_single(uuid);
                debug!("🚫 Message {} deleted before it was ever sent", uuid);
            }
        }
        true
    }

    pub fn get_single_mutable(&self, uuid: Uuid) -> Option<MessageContext> {
        self.state.lock().single_mutable.get(&uuid).cloned()
    }

    /// Feeds back the result of a [`QueuedMessage::SourceLifecycle`] dispatch.
    pub fn complete_single_mutable(&self, outcome: DispatchOutcome) {
        let mut state = self.state.lock();
        let uuid = outcome.context_uuid;
        state.in_flight_singles.remove(&uuid);
        let landed = outcome.message.is_some();

        let Some(context) = state.single_mutable.get_mut(&uuid) else {
            return;
        };

        match (outcome.action, outcome.message) {
            (DispatchAction::Send, Some(message)) => {
                context.set_message(Some(message));
                if context.lifecycle_stage == LifecycleStage::Send {
                    context.lifecycle_stage = LifecycleStage::Edit;
                }
            }
            (DispatchAction::Send, None) => {
                warn!("⚠️ Message {} could not be sent, dropping it", uuid);
                state.forget_single(uuid);
            }
            (DispatchAction::Edit, message) => context.set_message(message),
            (DispatchAction::Delete, _) => {
                state.forget_single(uuid);
            }
        }

        // The channel removes an expiring message by itself.
        let expiring = state.single_mutable.get(&uuid).is_some_and(|context| {
            context.lifecycle_stage == LifecycleStage::Edit
                && context.delete_after.is_some()
                && context.has_message()
        });
        if landed && expiring && !state.dirty_singles.contains(&uuid) {
            state.forget_single(uuid);
            debug!("⏲️ Message {} left to expire on its own", uuid);
        }
    }

    // Single immutable

    /// Queues independent one-shot actions. `false` when there is nothing to send.
    pub fn send_single_immutable(&self, dispatches: Vec<MessageDispatch>) -> bool {
        if dispatches.is_empty() {
            return false;
        }
        self.state.lock().single_immutable.push_back(dispatches);
        true
    }

    // Batches

    pub fn should_batch_items(&self, count: usize) -> bool {
        count >= MIN_BATCH_ITEMS
    }

    /// Attaches items to the guild's pending batch, going live with every batch
    /// that fills up. Returns which batch each item key landed in.
    ///
    /// Keys are unique within a batch. A key the pending batch already holds
    /// puts that batch live and starts a new one.
    pub fn add_items_to_batch(
        &self,
        channel: SharedChannel,
        entries: Vec<BatchEntry>,
    ) -> Vec<(String, Uuid)> {
        let guild_id = channel.guild_id();
        let mut state = self.state.lock();
        let mut assigned = Vec::with_capacity(entries.len());

        for entry in entries {
            let key = entry.key.clone();
            let collides = state
                .pending_batches
                .get(&guild_id)
                .is_some_and(|batch| batch.contains(&key));
            if collides {
                if let Some(batch) = state.pending_batches.remove(&guild_id) {
                    debug!("🔀 Key {} already batched, starting a new batch", key);
                    state.activate_batch(batch);
                }
            }

            let (batch_id, full) = {
                let batch = state.pending_batches.entry(guild_id).or_insert_with(|| {
                    BatchedMessageItem::new(
                        channel.clone(),
                        self.batch_size,
                        self.batch_auto_delete_after,
                    )
                });
                batch.add_source_dict(entry);
                (batch.batch_id, batch.is_full())
            };
            assigned.push((key, batch_id));

            if full {
                if let Some(batch) = state.pending_batches.remove(&guild_id) {
                    state.activate_batch(batch);
                }
            }
        }

        assigned
    }

    /// Puts the guild's partially filled batch live.
    pub fn finalize_pending_batch(&self, guild_id: GuildId) -> Option<Uuid> {
        let mut state = self.state.lock();
        let batch = state.pending_batches.remove(&guild_id)?;
        let batch_id = batch.batch_id;
        state.activate_batch(batch);
        Some(batch_id)
    }

    /// Updates an item and schedules a redisplay. A status update on a
    /// pending batch puts it live.
    pub fn update_batch_item(
        &self,
        batch_id: Uuid,
        item_key: &str,
        status: BatchItemStatus,
        error_message: Option<String>,
    ) -> bool {
        let mut state = self.state.lock();

        if let Some(batch) = state.active_batches.get_mut(&batch_id) {
            if !batch.update_item_status(item_key, status, error_message) {
                return false;
            }
            state.mark_batch_dirty(batch_id);
            return true;
        }

        let Some(guild_id) = state
            .pending_batches
            .iter()
            .find(|(_, batch)| batch.batch_id == batch_id && batch.contains(item_key))
            .map(|(guild_id, _)| *guild_id)
        else {
            return false;
        };

        let Some(mut batch) = state.pending_batches.remove(&guild_id) else {
            return false;
        };
        batch.update_item_status(item_key, status, error_message);
        state.activate_batch(batch);
        true
    }

    pub fn get_batch_update(&self, batch_id: Uuid) -> Option<BatchUpdate> {
        let state = self.state.lock();
        let batch = state
            .active_batches
            .get(&batch_id)
            .or_else(|| state.pending_batches.values().find(|b| b.batch_id == batch_id))?;

        Some(BatchUpdate {
            content: batch.generate_message_content(),
            delete_after: batch.get_delete_after(),
            complete: batch.is_processing_complete(),
        })
    }

    /// Drops a finished batch. `false` while it is still processing or being sent.
    pub fn cleanup_completed_batch(&self, batch_id: Uuid) -> bool {
        self.state.lock().remove_completed_batch(batch_id)
    }

    /// Feeds back the result of a [`QueuedMessage::BatchedMessage`] dispatch.
    /// Returns `true` when the batch was finished and has been dropped.
    pub fn complete_batch_dispatch(&self, batch_id: Uuid, outcome: DispatchOutcome) -> bool {
        let mut state = self.state.lock();
        state.in_flight_batches.remove(&batch_id);

        let Some(batch) = state.active_batches.get_mut(&batch_id) else {
            return false;
        };
        let context = batch.message_context_mut();
        if outcome.message.is_some() {
            context.lifecycle_stage = LifecycleStage::Edit;
        }
        context.set_message(outcome.message);

        if state.dirty_batches.contains(&batch_id) {
            return false;
        }
        state.remove_completed_batch(batch_id)
    }

    // Housekeeping

    /// Forgets batches and single messages of a guild, returning deletes for
    /// the ones that already reached the channel.
    pub fn clear_guild(&self, guild_id: GuildId) -> Vec<MessageDispatch> {
        let mut state = self.state.lock();
        let mut deletes = Vec::new();

        state.pending_batches.remove(&guild_id);

        let batch_ids: Vec<Uuid> = state
            .active_batches
            .iter()
            .filter(|(_, batch)| batch.guild_id == guild_id)
            .map(|(id, _)| *id)
            .collect();
        for batch_id in batch_ids {
            if let Some(batch) = state.active_batches.remove(&batch_id) {
                if batch.message_context().has_message() {
                    deletes.push(batch.message_context().delete_dispatch());
                }
            }
        }

        let single_ids: Vec<Uuid> = state
            .single_mutable
            .iter()
            .filter(|(_, context)| context.guild_id == guild_id)
            .map(|(id, _)| *id)
            .collect();
        for uuid in single_ids {
            if state.in_flight_singles.contains(&uuid) {
                // Deleted once the running dispatch reports back.
                if let Some(context) = state.single_mutable.get_mut(&uuid) {
                    context.lifecycle_stage = LifecycleStage::Delete;
                    context.message_content = None;
                }
                state.mark_single_dirty(uuid);
                continue;
            }
            if let Some(context) = state.forget_single(uuid) {
                if context.has_message() {
                    deletes.push(context.delete_dispatch());
                }
            }
        }

        let QueueState {
            dirty_batches,
            active_batches,
            ..
        } = &mut *state;
        dirty_batches.retain(|id| active_batches.contains_key(id));

        info!(
            "🧹 Cleared queued messages for guild {} ({} to delete)",
            guild_id,
            deletes.len()
        );
        deletes
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.state.lock();
        QueueStats {
            bundles: state.mutable_bundles.len(),
            dirty_bundles: state.dirty_bundles.len(),
            active_batches: state.active_batches.len(),
            pending_batches: state.pending_batches.len(),
            single_mutable: state.single_mutable.len(),
            single_immutable: state.single_immutable.len(),
            in_flight: state.in_flight_bundles.len()
                + state.in_flight_batches.len()
                + state.in_flight_singles.len(),
        }
    }
}
