use chrono::{DateTime, Utc};
use serenity::all::{ChannelId, GuildId};
use tracing::{debug, info};
use uuid::Uuid;

use crate::messages::{
    render::{chunk_lines, wrap_urls},
    SharedChannel,
};

/// Hard bounds for how many request lines share one message.
pub const MIN_ITEMS_PER_MESSAGE: usize = 1;
pub const MAX_ITEMS_PER_MESSAGE: usize = 5;

/// QUEUED → IN_PROGRESS → {COMPLETED | FAILED | DISCARDED}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaRequestLifecycleStage {
    Queued,
    InProgress,
    Completed,
    Failed,
    Discarded,
}

impl MediaRequestLifecycleStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Discarded)
    }
}

/// One member request of a bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRequest {
    pub uuid: Uuid,
    /// What the user asked for: a search string or a URL.
    pub search: String,
    pub status: MediaRequestLifecycleStage,
    pub failure_reason: Option<String>,
    /// Replaces the default status line when set.
    pub override_message: Option<String>,
}

/// Tracks N requests that came from one user action (playlist import,
/// multi-search) and renders their combined progress.
pub struct MultiMediaRequestBundle {
    pub uuid: Uuid,
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub created_at: DateTime<Utc>,
    text_channel: SharedChannel,
    input_string: String,
    items_per_message: usize,
    requests: Vec<MediaRequest>,
    total: usize,
    completed: usize,
    failed: usize,
    discarded: usize,
    is_shutdown: bool,
}

impl MultiMediaRequestBundle {
    pub fn new(text_channel: SharedChannel, input_string: impl Into<String>, items_per_message: i64) -> Self {
        let items_per_message = items_per_message
            .clamp(MIN_ITEMS_PER_MESSAGE as i64, MAX_ITEMS_PER_MESSAGE as i64) as usize;

        Self {
            uuid: Uuid::new_v4(),
            guild_id: text_channel.guild_id(),
            channel_id: text_channel.id(),
            created_at: Utc::now(),
            text_channel,
            input_string: input_string.into(),
            items_per_message,
            requests: Vec::new(),
            total: 0,
            completed: 0,
            failed: 0,
            discarded: 0,
            is_shutdown: false,
        }
    }

    pub fn text_channel(&self) -> &SharedChannel {
        &self.text_channel
    }

    pub fn input_string(&self) -> &str {
        &self.input_string
    }

    pub fn items_per_message(&self) -> usize {
        self.items_per_message
    }

    pub fn requests(&self) -> &[MediaRequest] {
        &self.requests
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

    pub fn discarded(&self) -> usize {
        self.discarded
    }

    pub fn add_media_request(&mut self, search: impl Into<String>) -> Uuid {
        let request = MediaRequest {
            uuid: Uuid::new_v4(),
            search: search.into(),
            status: MediaRequestLifecycleStage::Queued,
            failure_reason: None,
            override_message: None,
        };
        let uuid = request.uuid;
        self.requests.push(request);
        self.total += 1;
        uuid
    }

    /// An empty bundle counts as finished.
    pub fn finished(&self) -> bool {
        self.completed + self.failed + self.discarded == self.total
    }

    pub fn finished_successfully(&self) -> bool {
        self.finished() && self.failed == 0
    }

    pub fn is_shutdown(&self) -> bool {
        self.is_shutdown
    }

    /// Moves one member request forward. Returns `false` for unknown
    /// requests and for attempts to leave a terminal stage.
    pub fn update_request_status(
        &mut self,
        request_uuid: Uuid,
        new_stage: MediaRequestLifecycleStage,
        failure_reason: Option<String>,
        override_message: Option<String>,
    ) -> bool {
        let Some(request) = self.requests.iter_mut().find(|r| r.uuid == request_uuid) else {
            return false;
        };

        let previous = request.status;
        if previous.is_terminal() && previous != new_stage {
            debug!(
                "🚫 Request {} already {:?}, ignoring {:?}",
                request_uuid, previous, new_stage
            );
            return false;
        }

        request.status = new_stage;
        if failure_reason.is_some() {
            request.failure_reason = failure_reason;
        }
        if override_message.is_some() {
            request.override_message = override_message;
        }

        if previous != new_stage {
            match new_stage {
                MediaRequestLifecycleStage::Completed => self.completed += 1,
                MediaRequestLifecycleStage::Failed => self.failed += 1,
                MediaRequestLifecycleStage::Discarded => self.discarded += 1,
                _ => {}
            }
        }

        if self.finished() {
            info!(
                "🏁 Request bundle {} finished: {}/{} ok, {} failed",
                self.uuid, self.completed, self.total, self.failed
            );
        }
        true
    }

    /// Stops all further rendering. Member statuses are left as they are.
    pub fn shutdown(&mut self) {
        self.is_shutdown = true;
    }

    /// Current progress split into chat messages.
    pub fn print(&self) -> Vec<String> {
        if self.is_shutdown {
            return Vec::new();
        }

        let header = (self.total > 1).then(|| self.header());
        let lines: Vec<String> = self
            .requests
            .iter()
            .filter(|r| {
                !matches!(
                    r.status,
                    MediaRequestLifecycleStage::Completed | MediaRequestLifecycleStage::Discarded
                )
            })
            .map(render_request)
            .collect();

        chunk_lines(header.as_deref(), &lines, self.items_per_message)
    }

    fn header(&self) -> String {
        let input = wrap_urls(&self.input_string);
        let title = if self.finished() {
            format!("Completed processing of \"{}\"", input)
        } else {
            format!("Processing \"{}\"", input)
        };

        format!(
            "{}\n{}/{} items downloaded successfully, {} failed",
            title, self.completed, self.total, self.failed
        )
    }
}

fn render_request(request: &MediaRequest) -> String {
    if let Some(message) = &request.override_message {
        return wrap_urls(message);
    }

    let search = wrap_urls(&request.search);
    match request.status {
        MediaRequestLifecycleStage::Queued => format!("Waiting to process: \"{}\"", search),
        MediaRequestLifecycleStage::InProgress => {
            format!("Downloading and processing media request: \"{}\"", search)
        }
        MediaRequestLifecycleStage::Failed => match &request.failure_reason {
            Some(reason) => format!("Media request failed download: \"{}\", {}", search, reason),
            None => format!("Media request failed download: \"{}\"", search),
        },
        MediaRequestLifecycleStage::Completed | MediaRequestLifecycleStage::Discarded => {
            String::new()
        }
    }
}
