use anyhow::Result;
use futures::future::{BoxFuture, FutureExt};
use std::{fmt, future::Future};
use tracing::{debug, warn};
use uuid::Uuid;

use super::channel::SentMessage;

/// Kind of side effect a [`MessageDispatch`] performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchAction {
    Send,
    Edit,
    Delete,
}

/// One pending call against the chat API.
///
/// The future is lazy: nothing touches the network until [`run`](Self::run)
/// is awaited. Dispatches do not mutate bundle state; their outcomes must be
/// fed back to whoever produced them.
pub struct MessageDispatch {
    context_uuid: Uuid,
    action: DispatchAction,
    call: BoxFuture<'static, Result<Option<SentMessage>>>,
}

/// Result of running a [`MessageDispatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub context_uuid: Uuid,
    pub action: DispatchAction,
    /// `None` when the call failed or had nothing to act on.
    pub message: Option<SentMessage>,
}

impl MessageDispatch {
    pub fn new<F>(context_uuid: Uuid, action: DispatchAction, call: F) -> Self
    where
        F: Future<Output = Result<Option<SentMessage>>> + Send + 'static,
    {
        Self {
            context_uuid,
            action,
            call: call.boxed(),
        }
    }

    /// Wraps a fire-and-forget call that is not tied to any tracked context.
    pub fn immutable<F>(call: F) -> Self
    where
        F: Future<Output = Result<Option<SentMessage>>> + Send + 'static,
    {
        Self::new(Uuid::new_v4(), DispatchAction::Send, call)
    }

    pub fn context_uuid(&self) -> Uuid {
        self.context_uuid
    }

    pub fn action(&self) -> DispatchAction {
        self.action
    }

    /// Executes the call. Errors are logged and reported as an absent message.
    pub async fn run(self) -> DispatchOutcome {
        let message = match self.call.await {
            Ok(message) => message,
            Err(e) => {
                warn!(
                    "⚠️ {:?} dispatch failed for context {}: {:?}",
                    self.action, self.context_uuid, e
                );
                None
            }
        };

        DispatchOutcome {
            context_uuid: self.context_uuid,
            action: self.action,
            message,
        }
    }
}

impl fmt::Debug for MessageDispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageDispatch")
            .field("context_uuid", &self.context_uuid)
            .field("action", &self.action)
            .finish_non_exhaustive()
    }
}

/// Runs one bundle's dispatches in order, one at a time.
pub async fn run_sequentially(dispatches: Vec<MessageDispatch>) -> Vec<DispatchOutcome> {
    let mut outcomes = Vec::with_capacity(dispatches.len());
    for dispatch in dispatches {
        outcomes.push(dispatch.run().await);
    }
    debug!("📨 Ran {} message dispatches", outcomes.len());
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serenity::all::{ChannelId, MessageId};
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    };

    #[tokio::test]
    async fn dispatch_is_lazy_until_run() {
        let called = Arc::new(AtomicBool::new(false));
        let flag = called.clone();
        let dispatch = MessageDispatch::immutable(async move {
            flag.store(true, Ordering::SeqCst);
            Ok(None)
        });

        assert!(!called.load(Ordering::SeqCst));
        dispatch.run().await;
        assert!(called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn failed_dispatch_reports_missing_message() {
        let uuid = Uuid::new_v4();
        let dispatch = MessageDispatch::new(uuid, DispatchAction::Edit, async {
            Err(anyhow::anyhow!("rate limited"))
        });

        let outcome = dispatch.run().await;
        assert_eq!(
            outcome,
            DispatchOutcome {
                context_uuid: uuid,
                action: DispatchAction::Edit,
                message: None,
            }
        );
    }

    #[tokio::test]
    async fn sequential_run_keeps_order() {
        let sent = SentMessage {
            id: MessageId::new(7),
            channel_id: ChannelId::new(3),
            content: "hola".to_string(),
        };
        let first = sent.clone();
        let dispatches = vec![
            MessageDispatch::new(Uuid::new_v4(), DispatchAction::Delete, async { Ok(None) }),
            MessageDispatch::new(Uuid::new_v4(), DispatchAction::Send, async move {
                Ok(Some(first))
            }),
        ];

        let outcomes = run_sequentially(dispatches).await;
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].action, DispatchAction::Delete);
        assert_eq!(outcomes[1].message, Some(sent));
    }
}
