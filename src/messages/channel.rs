use anyhow::Result;
use async_trait::async_trait;
use serenity::{
    all::{ChannelId, GuildId, MessageId},
    builder::{CreateMessage, EditMessage, GetMessages},
    http::Http,
};
use std::{sync::Arc, time::Duration};
use tracing::{debug, warn};

/// A message that exists in the chat platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub content: String,
}

/// Text channel a bundle posts into.
///
/// Every call is real network I/O and may fail; callers decide whether a
/// failure matters.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatChannel: Send + Sync {
    fn guild_id(&self) -> GuildId;

    fn id(&self) -> ChannelId;

    async fn send(&self, content: &str, delete_after: Option<Duration>) -> Result<SentMessage>;

    async fn edit(
        &self,
        message_id: MessageId,
        content: &str,
        delete_after: Option<Duration>,
    ) -> Result<SentMessage>;

    async fn delete(&self, message_id: MessageId) -> Result<()>;

    /// Ids of the `limit` most recent messages, newest first.
    async fn history(&self, limit: usize) -> Result<Vec<MessageId>>;
}

pub type SharedChannel = Arc<dyn ChatChannel>;

/// [`ChatChannel`] backed by serenity's HTTP client.
pub struct SerenityChannel {
    http: Arc<Http>,
    guild_id: GuildId,
    channel_id: ChannelId,
}

impl SerenityChannel {
    pub fn new(http: Arc<Http>, guild_id: GuildId, channel_id: ChannelId) -> Self {
        Self {
            http,
            guild_id,
            channel_id,
        }
    }

    pub fn shared(http: Arc<Http>, guild_id: GuildId, channel_id: ChannelId) -> SharedChannel {
        Arc::new(Self::new(http, guild_id, channel_id))
    }

    /// Discord has no native expiry for bot messages, so a task deletes it later.
    fn schedule_delete(&self, message_id: MessageId, delete_after: Duration) {
        let http = self.http.clone();
        let channel_id = self.channel_id;

        tokio::spawn(async move {
            tokio::time::sleep(delete_after).await;
            if let Err(e) = channel_id.delete_message(&http, message_id).await {
                warn!("🗑️ Auto-delete failed for message {}: {:?}", message_id, e);
            } else {
                debug!("🗑️ Auto-deleted message {} in {}", message_id, channel_id);
            }
        });
    }
}

#[async_trait]
impl ChatChannel for SerenityChannel {
    fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    fn id(&self) -> ChannelId {
        self.channel_id
    }

    async fn send(&self, content: &str, delete_after: Option<Duration>) -> Result<SentMessage> {
        let message = self
            .channel_id
            .send_message(&self.http, CreateMessage::new().content(content))
            .await?;

        if let Some(delete_after) = delete_after {
            self.schedule_delete(message.id, delete_after);
        }

        Ok(SentMessage {
            id: message.id,
            channel_id: message.channel_id,
            content: message.content,
        })
    }

    async fn edit(
        &self,
        message_id: MessageId,
        content: &str,
        delete_after: Option<Duration>,
    ) -> Result<SentMessage> {
        let message = self
            .channel_id
            .edit_message(&self.http, message_id, EditMessage::new().content(content))
            .await?;

        if let Some(delete_after) = delete_after {
            self.schedule_delete(message.id, delete_after);
        }

        Ok(SentMessage {
            id: message.id,
            channel_id: message.channel_id,
            content: message.content,
        })
    }

    async fn delete(&self, message_id: MessageId) -> Result<()> {
        self.channel_id.delete_message(&self.http, message_id).await?;
        Ok(())
    }

    async fn history(&self, limit: usize) -> Result<Vec<MessageId>> {
        // Discord caps a single history page at 100 messages.
        let limit = limit.clamp(1, 100) as u8;
        let messages = self
            .channel_id
            .messages(&self.http, GetMessages::new().limit(limit))
            .await?;

        Ok(messages.into_iter().map(|m| m.id).collect())
    }
}
