use std::time::Duration;

use crate::{
    media::MediaDownload,
    messages::render::{fit_lines, wrap_urls, MAX_MESSAGE_LENGTH},
};

/// Upcoming entries rendered into one message before starting the next.
pub const QUEUE_ITEMS_PER_MESSAGE: usize = 15;

/// Renders the play queue as chat messages.
///
/// The first message starts with the currently playing track. Upcoming
/// entries are numbered and show how long until they start, as far as the
/// durations are known. Entries beyond `max_items` are summarised in a
/// trailing "...and N more items" line.
pub fn render_play_queue(
    now_playing: Option<&MediaDownload>,
    upcoming: &[MediaDownload],
    max_items: usize,
) -> Vec<String> {
    let header = now_playing.map(|track| {
        let duration = track
            .duration
            .map(|d| format!(" `[{}]`", format_duration(d)))
            .unwrap_or_default();
        format!(
            "▶️ Now playing: {}{} <{}>",
            track.display_name(),
            duration,
            track.webpage_url.trim_start_matches('<').trim_end_matches('>')
        )
    });

    if upcoming.is_empty() {
        return header.into_iter().collect();
    }

    // Wait time is only known while every earlier duration is known.
    let mut wait = now_playing.map_or(Some(Duration::ZERO), |track| track.duration);
    let mut lines = Vec::with_capacity(upcoming.len().min(max_items) + 1);

    for (index, track) in upcoming.iter().take(max_items).enumerate() {
        let eta = wait
            .map(|w| format!(" (in {})", format_duration(w)))
            .unwrap_or_default();
        lines.push(format!(
            "`{}.` {}{}",
            index + 1,
            wrap_urls(&track.display_name()),
            eta
        ));
        wait = wait.zip(track.duration).map(|(w, d)| w + d);
    }

    if upcoming.len() > max_items {
        lines.push(format!("...and {} more items", upcoming.len() - max_items));
    }

    let mut messages = Vec::new();
    for (index, chunk) in lines.chunks(QUEUE_ITEMS_PER_MESSAGE).enumerate() {
        let header = if index == 0 { header.as_deref().unwrap_or("") } else { "" };
        let message = fit_lines(header, chunk);
        debug_assert!(message.chars().count() <= MAX_MESSAGE_LENGTH);
        messages.push(message);
    }
    messages
}

/// `m:ss` below an hour, `h:mm:ss` above.
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}
