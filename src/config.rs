use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,

    // Consumer loop
    pub message_poll_interval: Duration,

    // Displays
    pub sticky_queue_messages: bool,
    pub max_queue_display: usize,
    pub items_per_message: i64,

    // Batches
    pub batch_size: usize,
    pub batch_auto_delete_after: Option<Duration>,

    // Auto-delete
    pub bundle_delete_after: Option<Duration>,
    pub error_delete_after: Option<Duration>,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_lookup(|key| std::env::var(key).ok())?;
        config.validate()?;

        Ok(config)
    }

    /// Builds a config from any key/value source. Unset keys fall back to
    /// [`Config::default`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        Ok(Self {
            discord_token: var("DISCORD_TOKEN").context("DISCORD_TOKEN is not set")?,

            message_poll_interval: match var("MESSAGE_POLL_INTERVAL") {
                Some(value) => parse_duration("MESSAGE_POLL_INTERVAL", &value)?,
                None => defaults.message_poll_interval,
            },

            sticky_queue_messages: match var("STICKY_QUEUE_MESSAGES") {
                Some(value) => value
                    .parse()
                    .with_context(|| format!("STICKY_QUEUE_MESSAGES: invalid bool `{}`", value))?,
                None => defaults.sticky_queue_messages,
            },
            max_queue_display: match var("MAX_QUEUE_DISPLAY") {
                Some(value) => value.parse()?,
                None => defaults.max_queue_display,
            },
            items_per_message: match var("ITEMS_PER_MESSAGE") {
                Some(value) => value.parse()?,
                None => defaults.items_per_message,
            },

            batch_size: match var("BATCH_SIZE") {
                Some(value) => value.parse()?,
                None => defaults.batch_size,
            },
            batch_auto_delete_after: match var("BATCH_AUTO_DELETE_AFTER") {
                Some(value) => parse_optional_duration("BATCH_AUTO_DELETE_AFTER", &value)?,
                None => defaults.batch_auto_delete_after,
            },

            bundle_delete_after: match var("BUNDLE_DELETE_AFTER") {
                Some(value) => parse_optional_duration("BUNDLE_DELETE_AFTER", &value)?,
                None => defaults.bundle_delete_after,
            },
            error_delete_after: match var("ERROR_DELETE_AFTER") {
                Some(value) => parse_optional_duration("ERROR_DELETE_AFTER", &value)?,
                None => defaults.error_delete_after,
            },
        })
    }

    /// Validates configuration values for correctness.
    ///
    /// - Poll interval must be non-zero
    /// - Batches need room for at least two items
    /// - The queue display must show at least one entry
    pub fn validate(&self) -> Result<()> {
        if self.message_poll_interval.is_zero() {
            anyhow::bail!("Message poll interval must be greater than 0");
        }

        if self.batch_size < 2 {
            anyhow::bail!("Batch size must be at least 2, got: {}", self.batch_size);
        }

        if self.max_queue_display == 0 {
            anyhow::bail!("Max queue display must be greater than 0");
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// The Discord token is never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Consumer: poll every {}\n  \
            Queue display: {} items, sticky={}\n  \
            Requests: {} items per message, delete after {}\n  \
            Batches: {} items, delete after {}",
            humantime::format_duration(self.message_poll_interval),
            self.max_queue_display,
            self.sticky_queue_messages,
            self.items_per_message,
            describe(self.bundle_delete_after),
            self.batch_size,
            describe(self.batch_auto_delete_after),
        )
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),

            message_poll_interval: Duration::from_millis(100),

            sticky_queue_messages: true,
            max_queue_display: 25,
            items_per_message: 5,

            batch_size: 20,
            batch_auto_delete_after: Some(Duration::from_secs(30)),

            bundle_delete_after: Some(Duration::from_secs(300)),
            error_delete_after: Some(Duration::from_secs(60)),
        }
    }
}

fn parse_duration(key: &str, value: &str) -> Result<Duration> {
    humantime::parse_duration(value.trim())
        .with_context(|| format!("{}: invalid duration `{}`", key, value))
}

/// `off`, `none` and zero durations disable the timer.
fn parse_optional_duration(key: &str, value: &str) -> Result<Option<Duration>> {
    match value.trim().to_ascii_lowercase().as_str() {
        "off" | "none" | "never" | "0" => Ok(None),
        _ => parse_duration(key, value).map(|d| (!d.is_zero()).then_some(d)),
    }
}

fn describe(duration: Option<Duration>) -> String {
    duration.map_or("never".to_string(), |d| humantime::format_duration(d).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = from_pairs(&[("DISCORD_TOKEN", "token")]).unwrap();

        assert_eq!(config.discord_token, "token");
        assert_eq!(config.message_poll_interval, Duration::from_millis(100));
        assert_eq!(config.batch_size, 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn token_is_required() {
        assert!(from_pairs(&[]).is_err());
        assert!(from_pairs(&[("DISCORD_TOKEN", "  ")]).is_err());
    }

    #[test]
    fn durations_are_human_readable() {
        let config = from_pairs(&[
            ("DISCORD_TOKEN", "token"),
            ("MESSAGE_POLL_INTERVAL", "250ms"),
            ("BATCH_AUTO_DELETE_AFTER", "off"),
            ("BUNDLE_DELETE_AFTER", "2m"),
        ])
        .unwrap();

        assert_eq!(config.message_poll_interval, Duration::from_millis(250));
        assert_eq!(config.batch_auto_delete_after, None);
        assert_eq!(config.bundle_delete_after, Some(Duration::from_secs(120)));
        assert!(from_pairs(&[("DISCORD_TOKEN", "t"), ("MESSAGE_POLL_INTERVAL", "soon")]).is_err());
    }

    #[test]
    fn validation_rejects_degenerate_values() {
        let config = Config {
            batch_size: 1,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            message_poll_interval: Duration::ZERO,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn summary_hides_token() {
        let config = Config {
            discord_token: "super-secret".into(),
            ..Config::default()
        };
        assert!(!config.summary().contains("super-secret"));
    }
}
