use futures::future::join_all;
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::cog::BundleContentSource;
use crate::messages::{run_sequentially, MessageQueue, QueuedMessage};

/// Single consumer draining the [`MessageQueue`].
///
/// Every item is handled on its own task; the queue's in-flight marks keep
/// two dispatches for the same bundle, batch or message from overlapping.
pub struct MessageDispatcher {
    queue: Arc<MessageQueue>,
    source: Arc<dyn BundleContentSource>,
    poll_interval: Duration,
    shutdown: CancellationToken,
}

impl MessageDispatcher {
    pub fn new(
        queue: Arc<MessageQueue>,
        source: Arc<dyn BundleContentSource>,
        poll_interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            queue,
            source,
            poll_interval,
            shutdown,
        }
    }

    pub async fn run(self) {
        info!("📬 Message dispatcher started (poll every {:?})", self.poll_interval);

        while !self.shutdown.is_cancelled() {
            let Some(item) = self.queue.get_next_message() else {
                tokio::select! {
                    _ = self.shutdown.cancelled() => break,
                    _ = tokio::time::sleep(self.poll_interval) => {}
                }
                continue;
            };

            debug!("📤 Dispatching {:?}", item.kind());
            let queue = self.queue.clone();
            let source = self.source.clone();
            tokio::spawn(async move {
                process(&queue, source.as_ref(), item).await;
            });
        }

        info!("📪 Message dispatcher stopped");
    }
}

/// Executes one queued item and feeds the results back into the queue.
pub async fn process(queue: &MessageQueue, source: &dyn BundleContentSource, item: QueuedMessage) {
    match item {
        QueuedMessage::MultipleMutable(key) => {
            sync_bundle(queue, source, &key).await;
            queue.complete_multiple_mutable(&key);
        }
        QueuedMessage::BatchedMessage { batch_id, dispatch } => {
            let outcome = dispatch.run().await;
            if queue.complete_batch_dispatch(batch_id, outcome) {
                debug!("📦 Batch {} displayed for the last time", batch_id);
            }
        }
        QueuedMessage::SourceLifecycle(dispatch) => {
            let outcome = dispatch.run().await;
            queue.complete_single_mutable(outcome);
        }
        QueuedMessage::SingleImmutable(dispatches) => {
            join_all(dispatches.into_iter().map(|dispatch| dispatch.run())).await;
        }
    }
}

async fn sync_bundle(queue: &MessageQueue, source: &dyn BundleContentSource, key: &str) {
    let Some(bundle) = queue.get_multiple_mutable(key) else {
        return;
    };
    let content = source.bundle_content(key);

    {
        let mut bundle = bundle.lock().await;
        let clear = match bundle.should_clear_messages().await {
            Ok(clear) => clear,
            Err(e) => {
                warn!("⚠️ Could not read history for {}: {:?}", key, e);
                false
            }
        };

        let dispatches = bundle.get_message_dispatch(&content.lines, clear, content.delete_after);
        if !dispatches.is_empty() {
            let outcomes = run_sequentially(dispatches).await;
            bundle.update_messages(outcomes);
        }
    }

    if content.finished {
        queue.remove_multiple_mutable(key);
        source.bundle_finished(key);
        debug!("🏁 Bundle {} finished", key);
    }
}

/// Runs everything currently queued, one item at a time.
#[cfg(test)]
pub(crate) async fn drain(cog: &super::MusicCog) {
    while let Some(item) = cog.queue().get_next_message() {
        process(cog.queue(), cog, item).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bot::cog::BundleContent,
        messages::{testing::FakeChannel, MessageDispatch},
    };
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct StaticSource {
        lines: Mutex<Vec<String>>,
        finished: Mutex<Vec<String>>,
    }

    impl BundleContentSource for StaticSource {
        fn bundle_content(&self, _key: &str) -> BundleContent {
            BundleContent {
                lines: self.lines.lock().clone(),
                delete_after: None,
                finished: false,
            }
        }

        fn bundle_finished(&self, key: &str) {
            self.finished.lock().push(key.to_string());
        }
    }

    #[tokio::test]
    async fn displaced_sticky_bundle_is_resent() {
        let queue = MessageQueue::new(5, None);
        let source = StaticSource::default();
        let channel = FakeChannel::new(1, 2);
        *source.lines.lock() = vec!["one".into(), "two".into()];

        queue.update_multiple_mutable("k", Some(channel.shared()), true).unwrap();
        let item = queue.get_next_message().unwrap();
        process(&queue, &source, item).await;
        assert_eq!(channel.contents(), vec!["one", "two"]);

        channel.post_foreign("hello");
        queue.update_multiple_mutable("k", None, true).unwrap();
        let item = queue.get_next_message().unwrap();
        process(&queue, &source, item).await;

        assert_eq!(channel.contents(), vec!["hello", "one", "two"]);
        assert_eq!(channel.deletes(), 2);
        assert!(source.finished.lock().is_empty());
    }

    #[tokio::test]
    async fn bundle_stays_in_flight_until_processed() {
        let queue = MessageQueue::new(5, None);
        let channel = FakeChannel::new(1, 2);

        queue.update_multiple_mutable("k", Some(channel.shared()), true).unwrap();
        let item = queue.get_next_message().unwrap();
        queue.update_multiple_mutable("k", None, true).unwrap();

        assert!(queue.get_next_message().is_none());
        process(&queue, &StaticSource::default(), item).await;
        assert!(matches!(
            queue.get_next_message(),
            Some(QueuedMessage::MultipleMutable(key)) if key == "k"
        ));
    }

    #[tokio::test]
    async fn immutable_failures_do_not_stop_the_rest() {
        let queue = MessageQueue::new(5, None);
        let channel = FakeChannel::new(1, 2);
        let ok = channel.shared();

        queue.send_single_immutable(vec![
            MessageDispatch::immutable(async { Err(anyhow::anyhow!("missing permissions")) }),
            MessageDispatch::immutable(async move { ok.send("still sent", None).await.map(Some) }),
        ]);
        let item = queue.get_next_message().unwrap();
        process(&queue, &StaticSource::default(), item).await;

        assert_eq!(channel.contents(), vec!["still sent"]);
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let queue = Arc::new(MessageQueue::new(5, None));
        let token = CancellationToken::new();
        let dispatcher = MessageDispatcher::new(
            queue,
            Arc::new(StaticSource::default()),
            Duration::from_millis(5),
            token.clone(),
        );

        let handle = tokio::spawn(dispatcher.run());
        token.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("dispatcher did not stop")
            .unwrap();
    }
}
