use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use mochi_core::Message;
use tracing::{debug, warn};

use crate::error::QueueError;
use crate::store::QueueStore;

const POLL_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Delivery seam, kept as a trait so the queue worker does not depend
/// directly on `mochi-peers`'s concrete transport (mirrors
/// `mochi-scheduler::ScheduleDispatcher`'s decoupling from the registry).
#[async_trait]
pub trait PeerSender: Send + Sync {
    async fn send(&self, message: &Message) -> Result<(), QueueError>;
}

/// Polls `queue` for due rows and attempts delivery, per spec §4.8: ack
/// deletes the row, nack/transient failure reschedules with backoff, and
/// exhausted/expired rows are marked `dead`.
pub struct Queue<S: PeerSender> {
    store: QueueStore,
    sender: Arc<S>,
    max_attempts: u32,
}

impl<S: PeerSender> Queue<S> {
    pub fn new(store: QueueStore, sender: Arc<S>) -> Self {
        Queue {
            store,
            sender,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn store(&self) -> &QueueStore {
        &self.store
    }

    /// Runs the worker loop forever. Intended to be spawned as a
    /// background task for the process lifetime.
    pub async fn run(&self) {
        loop {
            match self.store.due(Utc::now()).await {
                Ok(due) if due.is_empty() => tokio::time::sleep(POLL_INTERVAL).await,
                Ok(due) => {
                    for message in due {
                        self.attempt(message).await;
                    }
                }
                Err(err) => {
                    warn!(error = %err, "queue poll failed, backing off");
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
            }
        }
    }

    async fn attempt(&self, message: Message) {
        match self.sender.send(&message).await {
            Ok(()) => {
                if let Err(err) = self.store.ack(message.id).await {
                    warn!(error = %err, id = %message.id, "failed to ack delivered message");
                }
            }
            Err(err) => {
                debug!(id = %message.id, error = %err, "delivery attempt failed, rescheduling");
                if let Err(store_err) = self
                    .store
                    .fail(message.id, &err.to_string(), self.max_attempts)
                    .await
                {
                    warn!(error = %store_err, id = %message.id, "failed to record delivery failure");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mochi_core::{EntityId, MessageType, Value};
    use mochi_store::{ensure_schema, QueueSchema, Store};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FlakySender {
        fail_until: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PeerSender for FlakySender {
        async fn send(&self, _message: &Message) -> Result<(), QueueError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_until.load(Ordering::SeqCst) {
                Err(QueueError::Delivery("peer unreachable".into()))
            } else {
                Ok(())
            }
        }
    }

    struct RecordingSender {
        received: Mutex<Vec<Message>>,
    }

    #[async_trait]
    impl PeerSender for RecordingSender {
        async fn send(&self, message: &Message) -> Result<(), QueueError> {
            self.received.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    async fn fixture() -> QueueStore {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(&dir.path().join("queue.db")).await.unwrap());
        ensure_schema(&store, &QueueSchema).await.unwrap();
        QueueStore::new(store)
    }

    #[tokio::test]
    async fn successful_delivery_acks_and_removes_the_row() {
        let store = fixture().await;
        let id = store
            .enqueue(
                MessageType::Direct,
                None,
                EntityId([1u8; 32]),
                EntityId([2u8; 32]),
                "feeds",
                "post/create",
                &Value::String("hi".into()),
                None,
                None,
                Utc::now() + chrono::Duration::hours(1),
            )
            .await
            .unwrap();

        let sender = Arc::new(RecordingSender {
            received: Mutex::new(Vec::new()),
        });
        let queue = Queue::new(store, sender.clone());
        let message = queue.store().get(id).await.unwrap().unwrap();
        queue.attempt(message).await;

        assert!(queue.store().get(id).await.unwrap().is_none());
        assert_eq!(sender.received.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_delivery_reschedules_with_incremented_attempts() {
        let store = fixture().await;
        let id = store
            .enqueue(
                MessageType::Direct,
                None,
                EntityId([1u8; 32]),
                EntityId([2u8; 32]),
                "feeds",
                "post/create",
                &Value::None,
                None,
                None,
                Utc::now() + chrono::Duration::hours(1),
            )
            .await
            .unwrap();

        let sender = Arc::new(FlakySender {
            fail_until: AtomicUsize::new(100),
            calls: AtomicUsize::new(0),
        });
        let queue = Queue::new(store, sender);
        let message = queue.store().get(id).await.unwrap().unwrap();
        queue.attempt(message).await;

        let after = queue.store().get(id).await.unwrap().unwrap();
        assert_eq!(after.attempts, 1);
        assert_eq!(after.status, mochi_core::MessageStatus::Pending);
    }
}
