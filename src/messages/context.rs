use anyhow::Result;
use chrono::{DateTime, Utc};
use serenity::all::{ChannelId, GuildId, MessageId};
use std::{fmt, time::Duration};
use uuid::Uuid;

use super::{
    channel::{SentMessage, SharedChannel},
    dispatch::{DispatchAction, MessageDispatch},
};

/// Where a managed message is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleStage {
    /// Not posted yet.
    Send,
    /// Posted; content may still change.
    Edit,
    /// Queued for removal.
    Delete,
}

/// Result of folding a requested stage into the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageTransition {
    Stay(LifecycleStage),
    /// The context never reached the API and can be forgotten.
    Discard,
}

impl LifecycleStage {
    /// Coalescing table for successive updates on one context.
    pub fn transition(current: LifecycleStage, requested: LifecycleStage) -> StageTransition {
        use LifecycleStage::*;

        match (current, requested) {
            (Send, Send | Edit) => StageTransition::Stay(Send),
            (Send, Delete) => StageTransition::Discard,
            (Edit, Send | Edit) => StageTransition::Stay(Edit),
            (Edit, Delete) => StageTransition::Stay(Delete),
            (Delete, _) => StageTransition::Stay(Delete),
        }
    }
}

/// Handle for one logical message, sent or not.
#[derive(Clone)]
pub struct MessageContext {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub uuid: Uuid,
    pub created_at: DateTime<Utc>,
    pub lifecycle_stage: LifecycleStage,
    pub message_content: Option<String>,
    pub delete_after: Option<Duration>,
    message: Option<SentMessage>,
    channel: SharedChannel,
}

impl MessageContext {
    pub fn new(channel: SharedChannel) -> Self {
        Self {
            guild_id: channel.guild_id(),
            channel_id: channel.id(),
            uuid: Uuid::new_v4(),
            created_at: Utc::now(),
            lifecycle_stage: LifecycleStage::Send,
            message_content: None,
            delete_after: None,
            message: None,
            channel,
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.message_content = Some(content.into());
        self
    }

    pub fn with_delete_after(mut self, delete_after: Option<Duration>) -> Self {
        self.delete_after = delete_after;
        self
    }

    pub fn channel(&self) -> &SharedChannel {
        &self.channel
    }

    pub fn message(&self) -> Option<&SentMessage> {
        self.message.as_ref()
    }

    pub fn message_id(&self) -> Option<MessageId> {
        self.message.as_ref().map(|m| m.id)
    }

    pub fn has_message(&self) -> bool {
        self.message.is_some()
    }

    /// Remembers the real message. `None` leaves the context untouched.
    pub fn set_message(&mut self, message: Option<SentMessage>) {
        if let Some(message) = message {
            self.message = Some(message);
        }
    }

    /// Folds a producer update into this context.
    ///
    /// Content and expiry are replaced when given; a context that ends in
    /// [`LifecycleStage::Delete`] always loses its content.
    pub fn apply_update(
        &mut self,
        requested: LifecycleStage,
        content: Option<String>,
        delete_after: Option<Duration>,
    ) -> StageTransition {
        let transition = LifecycleStage::transition(self.lifecycle_stage, requested);

        if let StageTransition::Stay(stage) = transition {
            self.lifecycle_stage = stage;
            if stage == LifecycleStage::Delete {
                self.message_content = None;
            } else if let Some(content) = content {
                self.message_content = Some(content);
            }
            if delete_after.is_some() {
                self.delete_after = delete_after;
            }
        }

        transition
    }

    /// Edits the real message. `Ok(false)` when nothing has been sent yet.
    pub async fn edit_message(&self, content: &str, delete_after: Option<Duration>) -> Result<bool> {
        let Some(message_id) = self.message_id() else {
            return Ok(false);
        };
        self.channel.edit(message_id, content, delete_after).await?;
        Ok(true)
    }

    /// Deletes the real message. `Ok(false)` when nothing has been sent yet.
    pub async fn delete_message(&self) -> Result<bool> {
        let Some(message_id) = self.message_id() else {
            return Ok(false);
        };
        self.channel.delete(message_id).await?;
        Ok(true)
    }

    pub fn send_dispatch(&self) -> MessageDispatch {
        let channel = self.channel.clone();
        let content = self.message_content.clone().unwrap_or_default();
        let delete_after = self.delete_after;

        MessageDispatch::new(self.uuid, DispatchAction::Send, async move {
            channel.send(&content, delete_after).await.map(Some)
        })
    }

    pub fn edit_dispatch(&self) -> MessageDispatch {
        let channel = self.channel.clone();
        let message_id = self.message_id();
        let content = self.message_content.clone().unwrap_or_default();
        let delete_after = self.delete_after;

        MessageDispatch::new(self.uuid, DispatchAction::Edit, async move {
            match message_id {
                Some(id) => channel.edit(id, &content, delete_after).await.map(Some),
                None => Ok(None),
            }
        })
    }

    pub fn delete_dispatch(&self) -> MessageDispatch {
        let channel = self.channel.clone();
        let message_id = self.message_id();

        MessageDispatch::new(self.uuid, DispatchAction::Delete, async move {
            if let Some(id) = message_id {
                channel.delete(id).await?;
            }
            Ok(None)
        })
    }

    /// Dispatch matching the current lifecycle stage.
    pub fn dispatch(&self) -> MessageDispatch {
        match self.lifecycle_stage {
            LifecycleStage::Send => self.send_dispatch(),
            LifecycleStage::Edit => self.edit_dispatch(),
            LifecycleStage::Delete => self.delete_dispatch(),
        }
    }
}

impl fmt::Debug for MessageContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageContext")
            .field("guild_id", &self.guild_id)
            .field("channel_id", &self.channel_id)
            .field("uuid", &self.uuid)
            .field("lifecycle_stage", &self.lifecycle_stage)
            .field("message_content", &self.message_content)
            .field("message_id", &self.message_id())
            .finish_non_exhaustive()
    }
}
