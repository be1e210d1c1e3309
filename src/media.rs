use serenity::all::UserId;
use std::time::Duration;

/// A finished download handed over by the download/cache subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaDownload {
    pub title: String,
    pub uploader: Option<String>,
    pub webpage_url: String,
    pub duration: Option<Duration>,
    pub requested_by: Option<UserId>,
}

impl MediaDownload {
    pub fn new(title: impl Into<String>, webpage_url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            uploader: None,
            webpage_url: webpage_url.into(),
            duration: None,
            requested_by: None,
        }
    }

    pub fn with_uploader(mut self, uploader: impl Into<String>) -> Self {
        self.uploader = Some(uploader.into());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn requested_by(mut self, user: UserId) -> Self {
        self.requested_by = Some(user);
        self
    }

    /// `title - uploader`, or just the title.
    pub fn display_name(&self) -> String {
        match &self.uploader {
            Some(uploader) => format!("{} - {}", self.title, uploader),
            None => self.title.clone(),
        }
    }
}
