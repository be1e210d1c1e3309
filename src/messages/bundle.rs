use anyhow::Result;
use serenity::all::{ChannelId, GuildId};
use std::{collections::VecDeque, fmt, time::Duration};
use tracing::{debug, info};

use super::{
    channel::SharedChannel,
    context::{LifecycleStage, MessageContext},
    dispatch::{DispatchAction, DispatchOutcome, MessageDispatch},
};

/// Ordered set of physical messages that together display one view
/// (play queue, playlist progress) in a guild channel.
///
/// The tracked list only changes through [`get_message_dispatch`],
/// [`update_messages`] and [`clear_all_messages`].
///
/// [`get_message_dispatch`]: Self::get_message_dispatch
/// [`update_messages`]: Self::update_messages
/// [`clear_all_messages`]: Self::clear_all_messages
pub struct MessageMutableBundle {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub sticky_messages: bool,
    message_contexts: Vec<MessageContext>,
    channel: SharedChannel,
}

impl MessageMutableBundle {
    pub fn new(channel: SharedChannel, sticky_messages: bool) -> Self {
        Self {
            guild_id: channel.guild_id(),
            channel_id: channel.id(),
            sticky_messages,
            message_contexts: Vec::new(),
            channel,
        }
    }

    pub fn message_contexts(&self) -> &[MessageContext] {
        &self.message_contexts
    }

    pub fn len(&self) -> usize {
        self.message_contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.message_contexts.is_empty()
    }

    /// True when other messages were posted after ours and the block should
    /// be resent to stay at the bottom of the channel.
    pub async fn should_clear_messages(&self) -> Result<bool> {
        if !self.sticky_messages || self.message_contexts.is_empty() {
            return Ok(false);
        }

        let count = self.message_contexts.len();
        let history = self.channel.history(count).await?;
        if history.len() < count {
            return Ok(true);
        }

        // History is newest first, our last slot is the newest message.
        let displaced = self
            .message_contexts
            .iter()
            .rev()
            .zip(history.iter())
            .any(|(context, id)| context.message_id() != Some(*id));

        if displaced {
            debug!(
                "📌 Bundle in channel {} no longer at the bottom, resending",
                self.channel_id
            );
        }
        Ok(displaced)
    }

    /// Diffs `new_content` against the tracked messages.
    ///
    /// Returns deletes, then edits, then sends. Tracked content is updated
    /// right away; real message handles arrive later through
    /// [`update_messages`](Self::update_messages).
    pub fn get_message_dispatch(
        &mut self,
        new_content: &[String],
        clear_existing: bool,
        delete_after: Option<Duration>,
    ) -> Vec<MessageDispatch> {
        if clear_existing {
            let mut dispatches = self.clear_all_messages();
            dispatches.extend(self.append_sends(new_content, delete_after));
            return dispatches;
        }

        let mut remaining: VecDeque<MessageContext> =
            std::mem::take(&mut self.message_contexts).into();
        let mut deletes = Vec::new();
        let mut edits = Vec::new();
        let mut kept = Vec::with_capacity(new_content.len().min(remaining.len()));
        let mut position = 0;

        while position < new_content.len() {
            let Some(mut context) = remaining.pop_front() else {
                break;
            };
            let wanted = new_content[position].as_str();

            if shows(&context, wanted) {
                // An expiry requested now must also reach unchanged messages.
                if delete_after.is_some() && context.delete_after != delete_after {
                    context.delete_after = delete_after;
                    edits.push(context.edit_dispatch());
                }
                kept.push(context);
                position += 1;
                continue;
            }

            // Surplus messages have to go anyway; dropping them here keeps a
            // later matching message in place instead of editing everything.
            let surplus = (remaining.len() + 1).saturating_sub(new_content.len() - position);
            if remaining.iter().take(surplus).any(|c| shows(c, wanted)) {
                deletes.push(self.retire(context));
                continue;
            }

            context.message_content = Some(wanted.to_string());
            context.delete_after = delete_after;
            edits.push(context.edit_dispatch());
            kept.push(context);
            position += 1;
        }

        for context in remaining {
            deletes.push(self.retire(context));
        }

        self.message_contexts = kept;
        let sends = self.append_sends(&new_content[position..], delete_after);

        if !deletes.is_empty() || !edits.is_empty() || !sends.is_empty() {
            debug!(
                "🔁 Bundle diff in {}: {} deletes, {} edits, {} sends",
                self.channel_id,
                deletes.len(),
                edits.len(),
                sends.len()
            );
        }

        deletes.into_iter().chain(edits).chain(sends).collect()
    }

    fn retire(&self, mut context: MessageContext) -> MessageDispatch {
        context.apply_update(LifecycleStage::Delete, None, None);
        context.delete_dispatch()
    }

    fn append_sends(&mut self, contents: &[String], delete_after: Option<Duration>) -> Vec<MessageDispatch> {
        contents
            .iter()
            .map(|content| {
                let context = MessageContext::new(self.channel.clone())
                    .with_content(content.clone())
                    .with_delete_after(delete_after);
                let dispatch = context.send_dispatch();
                self.message_contexts.push(context);
                dispatch
            })
            .collect()
    }

    /// Feeds dispatch results back so the next diff knows the real messages.
    ///
    /// A failed edit forgets the tracked content so it is retried; slots that
    /// still have no real message are dropped and resent on the next pass.
    pub fn update_messages(&mut self, outcomes: Vec<DispatchOutcome>) {
        for outcome in outcomes {
            let Some(context) = self
                .message_contexts
                .iter_mut()
                .find(|c| c.uuid == outcome.context_uuid)
            else {
                continue;
            };

            match (outcome.action, outcome.message) {
                (DispatchAction::Send | DispatchAction::Edit, Some(message)) => {
                    context.set_message(Some(message));
                    context.lifecycle_stage = LifecycleStage::Edit;
                }
                (DispatchAction::Edit, None) => context.message_content = None,
                _ => {}
            }
        }

        let before = self.message_contexts.len();
        self.message_contexts.retain(MessageContext::has_message);
        let dropped = before - self.message_contexts.len();
        if dropped > 0 {
            debug!("🕳️ Dropped {} unsent slots in {}", dropped, self.channel_id);
        }
    }

    /// Deletes every tracked message and forgets them.
    pub fn clear_all_messages(&mut self) -> Vec<MessageDispatch> {
        let contexts = std::mem::take(&mut self.message_contexts);
        if !contexts.is_empty() {
            info!(
                "🧹 Clearing {} bundle messages in channel {}",
                contexts.len(),
                self.channel_id
            );
        }

        contexts
            .into_iter()
            .filter(MessageContext::has_message)
            .map(|context| self.retire(context))
            .collect()
    }
}

impl fmt::Debug for MessageMutableBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageMutableBundle")
            .field("guild_id", &self.guild_id)
            .field("channel_id", &self.channel_id)
            .field("sticky_messages", &self.sticky_messages)
            .field("message_contexts", &self.message_contexts)
            .finish_non_exhaustive()
    }
}

fn shows(context: &MessageContext, content: &str) -> bool {
    context.message_content.as_deref() == Some(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{dispatch::run_sequentially, testing::FakeChannel};
    use pretty_assertions::assert_eq;

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn count(dispatches: &[MessageDispatch], action: DispatchAction) -> usize {
        dispatches.iter().filter(|d| d.action() == action).count()
    }

    async fn apply(bundle: &mut MessageMutableBundle, content: &[&str]) -> Vec<DispatchAction> {
        let clear = bundle.should_clear_messages().await.unwrap();
        let dispatches = bundle.get_message_dispatch(&lines(content), clear, None);
        let actions = dispatches.iter().map(|d| d.action()).collect();
        let outcomes = run_sequentially(dispatches).await;
        bundle.update_messages(outcomes);
        actions
    }

    #[tokio::test]
    async fn first_pass_sends_everything() {
        let channel = FakeChannel::new(1, 2);
        let mut bundle = MessageMutableBundle::new(channel.shared(), true);

        let actions = apply(&mut bundle, &["A", "B", "C"]).await;

        assert_eq!(actions, vec![DispatchAction::Send; 3]);
        assert_eq!(channel.contents(), lines(&["A", "B", "C"]));
        assert_eq!(bundle.len(), 3);
    }

    #[tokio::test]
    async fn identical_content_is_a_no_op() {
        let channel = FakeChannel::new(1, 2);
        let mut bundle = MessageMutableBundle::new(channel.shared(), true);
        apply(&mut bundle, &["A", "B"]).await;

        let dispatches = bundle.get_message_dispatch(&lines(&["A", "B"]), false, None);

        assert!(dispatches.is_empty());
    }

    #[tokio::test]
    async fn removed_middle_line_is_a_single_delete() {
        let channel = FakeChannel::new(1, 2);
        let mut bundle = MessageMutableBundle::new(channel.shared(), true);
        apply(&mut bundle, &["A", "B", "C", "D"]).await;

        let dispatches = bundle.get_message_dispatch(&lines(&["A", "B", "D"]), false, None);
        assert_eq!(count(&dispatches, DispatchAction::Delete), 1);
        assert_eq!(count(&dispatches, DispatchAction::Edit), 0);
        assert_eq!(count(&dispatches, DispatchAction::Send), 0);

        let outcomes = run_sequentially(dispatches).await;
        bundle.update_messages(outcomes);
        assert_eq!(channel.contents(), lines(&["A", "B", "D"]));
    }

    #[tokio::test]
    async fn changed_line_is_edited_in_place() {
        let channel = FakeChannel::new(1, 2);
        let mut bundle = MessageMutableBundle::new(channel.shared(), true);
        apply(&mut bundle, &["A", "B", "C"]).await;

        let actions = apply(&mut bundle, &["A", "X", "C"]).await;

        assert_eq!(actions, vec![DispatchAction::Edit]);
        assert_eq!(channel.contents(), lines(&["A", "X", "C"]));
    }

    #[tokio::test]
    async fn growing_and_shrinking() {
        let channel = FakeChannel::new(1, 2);
        let mut bundle = MessageMutableBundle::new(channel.shared(), false);
        apply(&mut bundle, &["A"]).await;

        let actions = apply(&mut bundle, &["A", "B", "C"]).await;
        assert_eq!(actions, vec![DispatchAction::Send, DispatchAction::Send]);

        let actions = apply(&mut bundle, &["A"]).await;
        assert_eq!(actions, vec![DispatchAction::Delete, DispatchAction::Delete]);
        assert_eq!(channel.contents(), lines(&["A"]));
    }

    #[tokio::test]
    async fn inserted_line_keeps_order() {
        let channel = FakeChannel::new(1, 2);
        let mut bundle = MessageMutableBundle::new(channel.shared(), false);
        apply(&mut bundle, &["A", "B", "D"]).await;

        apply(&mut bundle, &["A", "B", "C", "D"]).await;

        assert_eq!(channel.contents(), lines(&["A", "B", "C", "D"]));
    }

    #[tokio::test]
    async fn duplicate_lines_end_up_correct() {
        let channel = FakeChannel::new(1, 2);
        let mut bundle = MessageMutableBundle::new(channel.shared(), false);
        apply(&mut bundle, &["A", "A", "B"]).await;

        apply(&mut bundle, &["B", "A", "A"]).await;

        assert_eq!(channel.contents(), lines(&["B", "A", "A"]));
    }

    #[tokio::test]
    async fn clear_existing_resends_everything() {
        let channel = FakeChannel::new(1, 2);
        let mut bundle = MessageMutableBundle::new(channel.shared(), true);
        apply(&mut bundle, &["A", "B"]).await;

        let dispatches = bundle.get_message_dispatch(&lines(&["A", "B"]), true, None);

        assert_eq!(count(&dispatches, DispatchAction::Delete), 2);
        assert_eq!(count(&dispatches, DispatchAction::Send), 2);
        assert_eq!(dispatches[0].action(), DispatchAction::Delete);
    }

    #[tokio::test]
    async fn foreign_message_breaks_stickiness() {
        let channel = FakeChannel::new(1, 2);
        let mut bundle = MessageMutableBundle::new(channel.shared(), true);
        apply(&mut bundle, &["A", "B"]).await;
        assert!(!bundle.should_clear_messages().await.unwrap());

        channel.post_foreign("hey, what song is this?");
        assert!(bundle.should_clear_messages().await.unwrap());

        bundle.sticky_messages = false;
        assert!(!bundle.should_clear_messages().await.unwrap());
    }

    #[tokio::test]
    async fn resend_after_foreign_message_lands_at_the_bottom() {
        let channel = FakeChannel::new(1, 2);
        let mut bundle = MessageMutableBundle::new(channel.shared(), true);
        apply(&mut bundle, &["A", "B"]).await;
        channel.post_foreign("hello");

        apply(&mut bundle, &["A", "B"]).await;

        assert_eq!(channel.contents(), lines(&["hello", "A", "B"]));
        assert!(!bundle.should_clear_messages().await.unwrap());
    }

    #[tokio::test]
    async fn failed_sends_are_retried_next_pass() {
        let channel = FakeChannel::new(1, 2);
        let mut bundle = MessageMutableBundle::new(channel.shared(), false);
        channel.fail_sends(true);
        apply(&mut bundle, &["A", "B"]).await;
        assert!(bundle.is_empty());

        channel.fail_sends(false);
        apply(&mut bundle, &["A", "B"]).await;

        assert_eq!(channel.contents(), lines(&["A", "B"]));
        assert_eq!(bundle.len(), 2);
    }

    #[tokio::test]
    async fn expiry_reaches_unchanged_messages() {
        let channel = FakeChannel::new(1, 2);
        let mut bundle = MessageMutableBundle::new(channel.shared(), false);
        apply(&mut bundle, &["header", "failed b"]).await;
        let expiry = Some(Duration::from_secs(300));

        let dispatches = bundle.get_message_dispatch(&lines(&["done", "failed b"]), false, expiry);
        assert_eq!(count(&dispatches, DispatchAction::Edit), 2);
        bundle.update_messages(run_sequentially(dispatches).await);

        assert_eq!(
            channel.expiries(),
            vec![("done".to_string(), expiry), ("failed b".to_string(), expiry)]
        );
        assert!(bundle
            .get_message_dispatch(&lines(&["done", "failed b"]), false, expiry)
            .is_empty());
    }

    #[tokio::test]
    async fn clear_all_messages_deletes_sent_slots() {
        let channel = FakeChannel::new(1, 2);
        let mut bundle = MessageMutableBundle::new(channel.shared(), true);
        apply(&mut bundle, &["A", "B"]).await;

        let dispatches = bundle.clear_all_messages();
        assert_eq!(dispatches.len(), 2);
        run_sequentially(dispatches).await;

        assert!(bundle.is_empty());
        assert!(channel.contents().is_empty());
    }
}
