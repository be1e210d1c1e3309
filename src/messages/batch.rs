use serenity::all::GuildId;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use super::{
    channel::SharedChannel,
    context::MessageContext,
    render::{fit_lines, wrap_urls},
};

/// Status of one logical item inside a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchItemStatus {
    Pending,
    Downloading,
    Completed,
    Failed,
    Skipped,
}

impl BatchItemStatus {
    pub fn glyph(&self) -> &'static str {
        match self {
            Self::Pending => "⏳",
            Self::Downloading => "⬇️",
            Self::Completed => "✅",
            Self::Failed => "❌",
            Self::Skipped => "⏭️",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Downloading)
    }
}

/// Item handed to a batch by a producer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEntry {
    /// Caller-chosen identity, used for status updates.
    pub key: String,
    /// Text shown for the item (search string, URL, title).
    pub content: String,
}

impl BatchEntry {
    pub fn new(key: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone)]
struct BatchItem {
    entry: BatchEntry,
    status: BatchItemStatus,
    error_message: Option<String>,
}

/// One physical message showing progress for many co-arriving items.
#[derive(Debug)]
pub struct BatchedMessageItem {
    pub batch_id: Uuid,
    pub guild_id: GuildId,
    items: Vec<BatchItem>,
    batch_size: usize,
    auto_delete_after: Option<Duration>,
    total: usize,
    completed: usize,
    failed: usize,
    message_context: MessageContext,
}

impl BatchedMessageItem {
    pub fn new(channel: SharedChannel, batch_size: usize, auto_delete_after: Option<Duration>) -> Self {
        Self {
            batch_id: Uuid::new_v4(),
            guild_id: channel.guild_id(),
            items: Vec::new(),
            batch_size: batch_size.max(1),
            auto_delete_after,
            total: 0,
            completed: 0,
            failed: 0,
            message_context: MessageContext::new(channel),
        }
    }

    /// Adds an item. `false` when the batch is full or already has the key.
    pub fn add_source_dict(&mut self, entry: BatchEntry) -> bool {
        if self.is_full() || self.contains(&entry.key) {
            return false;
        }
        self.items.push(BatchItem {
            entry,
            status: BatchItemStatus::Pending,
            error_message: None,
        });
        self.total += 1;
        true
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.batch_size
    }

    pub fn contains(&self, item_key: &str) -> bool {
        self.items.iter().any(|i| i.entry.key == item_key)
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    pub fn status_of(&self, item_key: &str) -> Option<BatchItemStatus> {
        self.items
            .iter()
            .find(|i| i.entry.key == item_key)
            .map(|i| i.status)
    }

    /// Moves an item to `status`. `false` when the key is unknown.
    ///
    /// Counters follow the item: entering COMPLETED or FAILED counts once,
    /// leaving it uncounts, repeating a status changes nothing.
    pub fn update_item_status(
        &mut self,
        item_key: &str,
        status: BatchItemStatus,
        error_message: Option<String>,
    ) -> bool {
        let Some(item) = self.items.iter_mut().find(|i| i.entry.key == item_key) else {
            return false;
        };

        let previous = item.status;
        item.status = status;
        if error_message.is_some() {
            item.error_message = error_message;
        }

        if previous != status {
            match previous {
                BatchItemStatus::Completed => self.completed -= 1,
                BatchItemStatus::Failed => self.failed -= 1,
                _ => {}
            }
            match status {
                BatchItemStatus::Completed => self.completed += 1,
                BatchItemStatus::Failed => self.failed += 1,
                _ => {}
            }
            debug!(
                "📦 Batch {} item {}: {:?} -> {:?}",
                self.batch_id, item_key, previous, status
            );
        }

        true
    }

    /// An empty batch is never complete.
    pub fn is_processing_complete(&self) -> bool {
        !self.items.is_empty() && !self.items.iter().any(|i| i.status.is_active())
    }

    pub fn should_auto_delete(&self) -> bool {
        self.is_processing_complete() && self.auto_delete_after.is_some()
    }

    pub fn get_delete_after(&self) -> Option<Duration> {
        if self.should_auto_delete() {
            self.auto_delete_after
        } else {
            None
        }
    }

    pub fn generate_message_content(&self) -> String {
        let header = if self.is_processing_complete() {
            format!(
                "Processing Complete ({}/{} succeeded)",
                self.completed, self.total
            )
        } else {
            format!("Processing ({}/{} items)", self.completed, self.total)
        };

        let lines: Vec<String> = self
            .items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.status != BatchItemStatus::Completed)
            .map(|(index, item)| render_item(index + 1, item))
            .collect();

        fit_lines(&header, &lines)
    }

    pub fn message_context(&self) -> &MessageContext {
        &self.message_context
    }

    pub fn message_context_mut(&mut self) -> &mut MessageContext {
        &mut self.message_context
    }
}

fn render_item(position: usize, item: &BatchItem) -> String {
    let detail = match (item.status, item.error_message.as_deref()) {
        (BatchItemStatus::Downloading, _) => " (downloading)".to_string(),
        (BatchItemStatus::Failed, Some(error)) => format!(" (failed: {})", error),
        (BatchItemStatus::Failed, None) => " (failed)".to_string(),
        (BatchItemStatus::Skipped, Some(reason)) => format!(" (skipped: {})", reason),
        (BatchItemStatus::Skipped, None) => " (skipped)".to_string(),
        _ => String::new(),
    };

    format!(
        "{} {}. {}{}",
        item.status.glyph(),
        position,
        wrap_urls(&item.entry.content),
        detail
    )
}
