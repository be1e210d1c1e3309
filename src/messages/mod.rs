//! # Messages Module
//!
//! Keeps the bot's chat output in sync with what producers want displayed.
//!
//! - [`MessageContext`]: one logical message and its SEND/EDIT/DELETE stage
//! - [`MessageMutableBundle`]: diffs a desired list of lines against the
//!   messages already in a channel and keeps them at the bottom ("sticky")
//! - [`BatchedMessageItem`]: one message summarising many items
//! - [`MessageQueue`]: priority lanes drained by a single consumer
//!
//! Nothing here talks to Discord directly; every network call goes through a
//! [`ChatChannel`] and is wrapped in a lazy [`MessageDispatch`].

pub mod batch;
pub mod bundle;
pub mod channel;
pub mod context;
pub mod dispatch;
pub mod queue;
pub mod render;

#[cfg(test)]
pub(crate) mod testing;

pub use batch::{BatchEntry, BatchItemStatus, BatchedMessageItem};
pub use bundle::MessageMutableBundle;
pub use channel::{ChatChannel, SentMessage, SerenityChannel, SharedChannel};
pub use context::{LifecycleStage, MessageContext, StageTransition};
pub use dispatch::{run_sequentially, DispatchAction, DispatchOutcome, MessageDispatch};
pub use queue::{BatchUpdate, MessageKind, MessageQueue, QueueStats, QueuedMessage, SharedBundle};
