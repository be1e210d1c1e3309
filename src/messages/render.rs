//! Text helpers shared by everything that renders into chat messages.

use regex::{Captures, Regex};
use std::sync::LazyLock;

/// Hard ceiling Discord enforces on message content.
pub const MAX_MESSAGE_LENGTH: usize = 2000;

/// Room kept free for the truncation notice.
const TRUNCATION_RESERVE: usize = 100;

static URL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<?https?://[^\s<>]+>?").expect("valid url regex"));

/// Wraps raw URLs in angle brackets so the client does not embed them.
pub fn wrap_urls(text: &str) -> String {
    URL_REGEX
        .replace_all(text, |caps: &Captures| {
            let url = &caps[0];
            if url.starts_with('<') && url.ends_with('>') {
                url.to_string()
            } else {
                format!("<{}>", url.trim_start_matches('<').trim_end_matches('>'))
            }
        })
        .into_owned()
}

pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(max.saturating_sub(3)).collect();
    truncated.push_str("...");
    truncated
}

/// Joins `header` and `lines` into one message that never exceeds
/// [`MAX_MESSAGE_LENGTH`]. Lines that do not fit are replaced by a notice.
pub fn fit_lines(header: &str, lines: &[String]) -> String {
    let mut output = truncate_chars(header, MAX_MESSAGE_LENGTH - TRUNCATION_RESERVE);
    let mut length = output.chars().count();

    for (index, line) in lines.iter().enumerate() {
        let separator = usize::from(!output.is_empty());
        let line_length = line.chars().count() + separator;

        if length + line_length + TRUNCATION_RESERVE > MAX_MESSAGE_LENGTH {
            let remaining = lines.len() - index;
            if !output.is_empty() {
                output.push('\n');
            }
            output.push_str(&format!("...and {} more items (truncated)", remaining));
            return output;
        }

        if separator == 1 {
            output.push('\n');
        }
        output.push_str(line);
        length += line_length;
    }

    output
}

/// Splits `lines` into messages of at most `per_message` lines each.
/// The header, when present, leads the first message.
pub fn chunk_lines(header: Option<&str>, lines: &[String], per_message: usize) -> Vec<String> {
    if lines.is_empty() {
        return header.map(|h| vec![fit_lines(h, &[])]).unwrap_or_default();
    }

    lines
        .chunks(per_message.max(1))
        .enumerate()
        .map(|(index, chunk)| match (index, header) {
            (0, Some(header)) => fit_lines(header, chunk),
            _ => fit_lines("", chunk),
        })
        .collect()
}
