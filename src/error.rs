use thiserror::Error;

/// Errors raised synchronously by the [`MessageQueue`](crate::messages::MessageQueue).
///
/// Lookups of bundles or batches that no longer exist are not errors: they
/// return `None`/`false` so callers can render nothing instead of failing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MessageQueueError {
    /// A brand-new multi-mutable bundle was requested without a channel to post into.
    #[error("cannot create message bundle `{key}` without a channel")]
    MissingChannel { key: String },
}
