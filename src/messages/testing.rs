//! In-memory channel used by unit tests.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::all::{ChannelId, GuildId, MessageId};
use std::{collections::HashMap, sync::Arc, time::Duration};

use super::channel::{ChatChannel, SentMessage, SharedChannel};

#[derive(Debug, Default)]
struct FakeState {
    next_id: u64,
    /// Oldest first.
    messages: Vec<(MessageId, String)>,
    /// Last expiry requested per message.
    expiries: HashMap<MessageId, Duration>,
    sends: usize,
    edits: usize,
    deletes: usize,
    fail_sends: bool,
}

pub struct FakeChannel {
    guild_id: GuildId,
    channel_id: ChannelId,
    state: Mutex<FakeState>,
}

impl FakeChannel {
    pub fn new(guild_id: u64, channel_id: u64) -> Arc<Self> {
        Arc::new(Self {
            guild_id: GuildId::new(guild_id),
            channel_id: ChannelId::new(channel_id),
            state: Mutex::new(FakeState {
                next_id: 1000,
                ..FakeState::default()
            }),
        })
    }

    pub fn shared(self: &Arc<Self>) -> SharedChannel {
        self.clone()
    }

    /// Someone else talks in the channel.
    pub fn post_foreign(&self, content: &str) {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = MessageId::new(state.next_id);
        state.messages.push((id, content.to_string()));
    }

    pub fn fail_sends(&self, fail: bool) {
        self.state.lock().fail_sends = fail;
    }

    pub fn contents(&self) -> Vec<String> {
        self.state
            .lock()
            .messages
            .iter()
            .map(|(_, content)| content.clone())
            .collect()
    }

    /// Live messages with the expiry the last send or edit asked for.
    pub fn expiries(&self) -> Vec<(String, Option<Duration>)> {
        let state = self.state.lock();
        state
            .messages
            .iter()
            .map(|(id, content)| (content.clone(), state.expiries.get(id).copied()))
            .collect()
    }

    pub fn sends(&self) -> usize {
        self.state.lock().sends
    }

    pub fn edits(&self) -> usize {
        self.state.lock().edits
    }

    pub fn deletes(&self) -> usize {
        self.state.lock().deletes
    }
}

#[async_trait]
impl ChatChannel for FakeChannel {
    fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    fn id(&self) -> ChannelId {
        self.channel_id
    }

    async fn send(&self, content: &str, delete_after: Option<Duration>) -> Result<SentMessage> {
        let mut state = self.state.lock();
        if state.fail_sends {
            anyhow::bail!("send rejected");
        }
        state.sends += 1;
        state.next_id += 1;
        let id = MessageId::new(state.next_id);
        state.messages.push((id, content.to_string()));
        if let Some(delete_after) = delete_after {
            state.expiries.insert(id, delete_after);
        }

        Ok(SentMessage {
            id,
            channel_id: self.channel_id,
            content: content.to_string(),
        })
    }

    async fn edit(
        &self,
        message_id: MessageId,
        content: &str,
        delete_after: Option<Duration>,
    ) -> Result<SentMessage> {
        let mut state = self.state.lock();
        state.edits += 1;
        let Some(entry) = state.messages.iter_mut().find(|(id, _)| *id == message_id) else {
            anyhow::bail!("unknown message {}", message_id);
        };
        entry.1 = content.to_string();
        if let Some(delete_after) = delete_after {
            state.expiries.insert(message_id, delete_after);
        }

        Ok(SentMessage {
            id: message_id,
            channel_id: self.channel_id,
            content: content.to_string(),
        })
    }

    async fn delete(&self, message_id: MessageId) -> Result<()> {
        let mut state = self.state.lock();
        state.deletes += 1;
        state.messages.retain(|(id, _)| *id != message_id);
        state.expiries.remove(&message_id);
        Ok(())
    }

    async fn history(&self, limit: usize) -> Result<Vec<MessageId>> {
        let state = self.state.lock();
        Ok(state
            .messages
            .iter()
            .rev()
            .take(limit)
            .map(|(id, _)| *id)
            .collect())
    }
}
