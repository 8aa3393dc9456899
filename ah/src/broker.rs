//! Notification Broker - fan-out of "new request" events to UI observers
//!
//! Every subscriber owns a bounded mailbox. Publishing is a non-blocking
//! `try_send` into each mailbox: a slow subscriber loses messages once its
//! mailbox is full, and never slows down the publisher or other subscribers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use requeststore::RequestId;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Default per-subscriber mailbox size
pub const DEFAULT_MAILBOX_CAPACITY: usize = 16;

/// Payload published for every new request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewRequestEvent {
    pub id: RequestId,
    pub source_name: String,
    pub app_name: String,
    pub question: String,
}

struct BrokerInner {
    capacity: usize,
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<u64, mpsc::Sender<String>>>,
}

impl BrokerInner {
    fn subscribers(&self) -> MutexGuard<'_, HashMap<u64, mpsc::Sender<String>>> {
        // The map holds plain senders; a panic elsewhere cannot leave it half-updated
        self.subscribers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// In-process publish/subscribe hub with a single topic
#[derive(Clone)]
pub struct NotificationBroker {
    inner: Arc<BrokerInner>,
}

impl NotificationBroker {
    /// Create a broker whose subscribers get `capacity`-slot mailboxes
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "NotificationBroker::new: called");
        Self {
            inner: Arc::new(BrokerInner {
                capacity: capacity.max(1),
                next_id: AtomicU64::new(1),
                subscribers: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Register a new subscriber
    pub fn subscribe(&self) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.inner.capacity);
        self.inner.subscribers().insert(id, tx);
        debug!(subscriber_id = id, "NotificationBroker::subscribe: new subscriber");
        Subscription {
            id,
            rx,
            broker: Arc::downgrade(&self.inner),
        }
    }

    /// Remove a subscriber; its mailbox is closed
    pub fn unsubscribe(&self, subscription: Subscription) {
        debug!(subscriber_id = subscription.id, "NotificationBroker::unsubscribe: called");
        drop(subscription);
    }

    /// Deliver a new-request notification to every subscriber
    ///
    /// Returns how many mailboxes accepted the message.
    pub fn publish(&self, id: RequestId, source_name: &str, app_name: &str, question: &str) -> usize {
        let event = NewRequestEvent {
            id,
            source_name: source_name.to_string(),
            app_name: app_name.to_string(),
            question: question.to_string(),
        };
        let payload = match serde_json::to_string(&event) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(id, error = %e, "NotificationBroker::publish: failed to serialize event");
                return 0;
            }
        };
        self.publish_raw(&payload)
    }

    fn publish_raw(&self, payload: &str) -> usize {
        let mut subscribers = self.inner.subscribers();
        let mut delivered = 0;
        let mut gone = Vec::new();

        for (sub_id, tx) in subscribers.iter() {
            match tx.try_send(payload.to_string()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!(subscriber_id = sub_id, "NotificationBroker::publish: mailbox full, dropping");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => gone.push(*sub_id),
            }
        }
        for sub_id in gone {
            subscribers.remove(&sub_id);
        }

        debug!(delivered, total = subscribers.len(), "NotificationBroker::publish: done");
        delivered
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers().len()
    }

    /// Drop every mailbox; pending `recv` calls return `None` once drained
    pub fn close(&self) {
        let mut subscribers = self.inner.subscribers();
        debug!(count = subscribers.len(), "NotificationBroker::close: called");
        subscribers.clear();
    }
}

impl Default for NotificationBroker {
    fn default() -> Self {
        Self::new(DEFAULT_MAILBOX_CAPACITY)
    }
}

/// A subscriber's receiving end; dropping it unsubscribes
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<String>,
    broker: Weak<BrokerInner>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next message in FIFO order, `None` once the broker closed this mailbox
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    /// Next already-buffered message, if any
    pub fn try_recv(&mut self) -> Option<String> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.broker.upgrade() {
            inner.subscribers().remove(&self.id);
            debug!(subscriber_id = self.id, "Subscription::drop: unsubscribed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(sub: &mut Subscription) -> Vec<String> {
        std::iter::from_fn(|| sub.try_recv()).collect()
    }

    #[test]
    fn test_publish_without_subscribers() {
        let broker = NotificationBroker::default();
        assert_eq!(broker.publish(1, "ide-x", "app1", "hello?"), 0);
        assert_eq!(broker.subscriber_count(), 0);
    }

    #[test]
    fn test_all_subscribers_get_identical_payload() {
        let broker = NotificationBroker::default();
        let mut subs: Vec<_> = (0..3).map(|_| broker.subscribe()).collect();

        assert_eq!(broker.publish(7, "ide-x", "app1", "pick a color"), 3);

        let payloads: Vec<_> = subs.iter_mut().map(|s| s.try_recv().unwrap()).collect();
        assert!(payloads.windows(2).all(|w| w[0] == w[1]));

        let event: NewRequestEvent = serde_json::from_str(&payloads[0]).unwrap();
        assert_eq!(
            event,
            NewRequestEvent {
                id: 7,
                source_name: "ide-x".to_string(),
                app_name: "app1".to_string(),
                question: "pick a color".to_string(),
            }
        );
    }

    #[test]
    fn test_full_mailbox_drops_excess() {
        let broker = NotificationBroker::new(16);
        let mut slow = broker.subscribe();

        let delivered: usize = (0..20).map(|i| broker.publish(i, "s", "a", "q")).sum();
        assert_eq!(delivered, 16);

        let received = drain(&mut slow);
        assert_eq!(received.len(), 16);
        // FIFO: the first sixteen made it, the last four were dropped
        let last: NewRequestEvent = serde_json::from_str(&received[15]).unwrap();
        assert_eq!(last.id, 15);
    }

    #[test]
    fn test_full_mailbox_does_not_affect_others() {
        let broker = NotificationBroker::new(2);
        let mut slow = broker.subscribe();
        broker.publish(1, "s", "a", "q");
        broker.publish(2, "s", "a", "q");

        let mut fresh = broker.subscribe();
        assert_eq!(broker.publish(3, "s", "a", "q"), 1);
        assert_eq!(drain(&mut slow).len(), 2);
        assert_eq!(drain(&mut fresh).len(), 1);
    }

    #[test]
    fn test_unsubscribe_and_drop_remove_subscriber() {
        let broker = NotificationBroker::default();
        let a = broker.subscribe();
        let b = broker.subscribe();
        assert_eq!(broker.subscriber_count(), 2);

        broker.unsubscribe(a);
        assert_eq!(broker.subscriber_count(), 1);

        drop(b);
        assert_eq!(broker.subscriber_count(), 0);
        assert_eq!(broker.publish(1, "s", "a", "q"), 0);
    }

    #[tokio::test]
    async fn test_close_ends_subscriptions() {
        let broker = NotificationBroker::default();
        let mut sub = broker.subscribe();
        broker.publish(1, "s", "a", "q");
        broker.close();

        assert!(sub.recv().await.is_some());
        assert!(sub.recv().await.is_none());
        assert_eq!(broker.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_recv_wakes_on_publish() {
        let broker = NotificationBroker::default();
        let mut sub = broker.subscribe();

        let publisher = broker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            publisher.publish(9, "s", "a", "late question");
        });

        let msg = sub.recv().await.unwrap();
        assert!(msg.contains("late question"));
    }
}
