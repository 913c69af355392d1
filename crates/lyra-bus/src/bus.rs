//! The message bus: subscription table, mailboxes, and topic handlers.

use crate::error::BusError;
use crate::mailbox::{Mailbox, MAILBOX_CAPACITY};
use crate::message::Message;
use futures::future::BoxFuture;
use futures::FutureExt;
use lyra_core::AgentId;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, warn};

type Handler = Arc<dyn Fn(Message) -> BoxFuture<'static, ()> + Send + Sync>;

/// Async pub/sub message bus.
///
/// One global topic plus arbitrary named topics; each subscriber owns a
/// bounded FIFO [`Mailbox`]. See the crate docs for the delivery guarantees.
pub struct Bus {
    mailboxes: RwLock<HashMap<AgentId, Arc<Mailbox>>>,
    subscriptions: RwLock<HashMap<String, HashSet<AgentId>>>,
    handlers: RwLock<HashMap<String, Vec<Handler>>>,
    seq: AtomicU64,
    published: AtomicU64,
    dropped: AtomicU64,
    capacity: usize,
}

impl Bus {
    /// Creates a new bus with the default mailbox capacity.
    pub fn new() -> Self {
        Self::with_capacity(MAILBOX_CAPACITY)
    }

    /// Creates a new bus whose mailboxes hold at most `capacity` messages.
    pub fn with_capacity(capacity: usize) -> Self {
        debug!(capacity, "message bus initialized");
        Self {
            mailboxes: RwLock::new(HashMap::new()),
            subscriptions: RwLock::new(HashMap::new()),
            handlers: RwLock::new(HashMap::new()),
            seq: AtomicU64::new(0),
            published: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            capacity,
        }
    }

    /// Creates a private mailbox for a subscriber.
    ///
    /// Creating a mailbox that already exists is a warning no-op.
    pub fn create_mailbox(&self, subscriber_id: &str) {
        let mut mailboxes = self.mailboxes.write();
        if mailboxes.contains_key(subscriber_id) {
            warn!(subscriber_id = %subscriber_id, "mailbox already exists, ignoring");
            return;
        }
        mailboxes.insert(
            subscriber_id.to_string(),
            Arc::new(Mailbox::new(self.capacity)),
        );
        debug!(subscriber_id = %subscriber_id, "created mailbox");
    }

    /// Subscribes a subscriber to a topic, creating its mailbox if needed.
    pub fn subscribe(&self, subscriber_id: &str, topic: &str) {
        self.subscriptions
            .write()
            .entry(topic.to_string())
            .or_default()
            .insert(subscriber_id.to_string());

        if !self.mailboxes.read().contains_key(subscriber_id) {
            self.create_mailbox(subscriber_id);
        }

        debug!(subscriber_id = %subscriber_id, topic = %topic, "subscribed");
    }

    /// Removes a subscriber from a topic.
    pub fn unsubscribe(&self, subscriber_id: &str, topic: &str) {
        if let Some(subscribers) = self.subscriptions.write().get_mut(topic) {
            if subscribers.remove(subscriber_id) {
                debug!(subscriber_id = %subscriber_id, topic = %topic, "unsubscribed");
            }
        }
    }

    /// Registers an async handler invoked for every publish on `topic`.
    ///
    /// Each delivery runs as its own task; a crashing handler is logged and
    /// never interferes with mailbox deliveries or other handlers.
    pub fn register_handler<F, Fut>(&self, topic: &str, handler: F)
    where
        F: Fn(Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |message| handler(message).boxed());
        self.handlers
            .write()
            .entry(topic.to_string())
            .or_default()
            .push(handler);
        debug!(topic = %topic, "registered handler");
    }

    /// Publishes a message to a topic.
    ///
    /// Synchronous: on return the message is enqueued into every mailbox
    /// currently subscribed to `topic` and every handler task has been
    /// spawned.
    pub fn publish(&self, topic: &str, payload: serde_json::Value, sender: Option<AgentId>) {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        let message = Message::new(topic, payload, sender, seq);

        if let Some(subscribers) = self.subscriptions.read().get(topic) {
            let mailboxes = self.mailboxes.read();
            for subscriber_id in subscribers {
                if let Some(mailbox) = mailboxes.get(subscriber_id) {
                    if let Some(evicted) = mailbox.push(message.clone()) {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            subscriber_id = %subscriber_id,
                            topic = %topic,
                            evicted_id = %evicted.id,
                            "mailbox overflow, dropped oldest message"
                        );
                    }
                }
            }
        }

        let handlers: Vec<Handler> = self
            .handlers
            .read()
            .get(topic)
            .map(|hs| hs.to_vec())
            .unwrap_or_default();
        for handler in handlers {
            let topic = topic.to_string();
            let task = tokio::spawn(handler(message.clone()));
            tokio::spawn(async move {
                if let Err(err) = task.await {
                    error!(topic = %topic, error = %err, "bus handler crashed");
                }
            });
        }

        self.published.fetch_add(1, Ordering::Relaxed);
        debug!(topic = %topic, message_id = %message.id, seq, "published message");
    }

    /// Waits for and returns the next message for a subscriber.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::NoSuchMailbox`] if no mailbox exists for the
    /// subscriber.
    pub async fn next_message(&self, subscriber_id: &str) -> Result<Message, BusError> {
        let mailbox = self.get_mailbox(subscriber_id)?;
        Ok(mailbox.next().await)
    }

    /// Returns the mailbox handle for a subscriber.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::NoSuchMailbox`] if no mailbox exists for the
    /// subscriber.
    pub fn get_mailbox(&self, subscriber_id: &str) -> Result<Arc<Mailbox>, BusError> {
        self.mailboxes
            .read()
            .get(subscriber_id)
            .cloned()
            .ok_or_else(|| BusError::NoSuchMailbox(subscriber_id.to_string()))
    }

    /// Current bus statistics.
    pub fn stats(&self) -> BusStats {
        BusStats {
            mailboxes: self.mailboxes.read().len(),
            topics: self.subscriptions.read().len(),
            published: self.published.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("Bus")
            .field("mailboxes", &stats.mailboxes)
            .field("topics", &stats.topics)
            .finish_non_exhaustive()
    }
}

/// Bus statistics.
#[derive(Debug, Clone, Default)]
pub struct BusStats {
    /// Number of mailboxes.
    pub mailboxes: usize,
    /// Number of topics with at least one subscription ever made.
    pub topics: usize,
    /// Total messages published since start.
    pub published: u64,
    /// Total messages dropped to overflow since start.
    pub dropped: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topics;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_publish_and_consume() {
        let bus = Bus::new();
        bus.subscribe("a", topics::GLOBAL);

        bus.publish(topics::GLOBAL, serde_json::json!({"n": 1}), None);
        let msg = bus.next_message("a").await.unwrap();
        assert_eq!(msg.payload["n"], 1);
    }

    #[tokio::test]
    async fn test_per_subscriber_fifo() {
        let bus = Bus::new();
        bus.subscribe("a", topics::GLOBAL);
        bus.subscribe("a", topics::TICKER);

        bus.publish(topics::GLOBAL, serde_json::json!(1), None);
        bus.publish(topics::TICKER, serde_json::json!(2), None);
        bus.publish(topics::GLOBAL, serde_json::json!(3), None);

        let first = bus.next_message("a").await.unwrap();
        let second = bus.next_message("a").await.unwrap();
        let third = bus.next_message("a").await.unwrap();
        assert!(first.seq < second.seq && second.seq < third.seq);
    }

    #[tokio::test]
    async fn test_one_copy_per_match() {
        let bus = Bus::new();
        bus.subscribe("a", topics::GLOBAL);
        bus.subscribe("b", topics::GLOBAL);

        bus.publish(topics::GLOBAL, serde_json::json!("x"), Some("b".to_string()));

        assert_eq!(bus.get_mailbox("a").unwrap().len(), 1);
        assert_eq!(bus.get_mailbox("b").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let bus = Bus::new();
        bus.subscribe("a", topics::GLOBAL);
        bus.unsubscribe("a", topics::GLOBAL);

        bus.publish(topics::GLOBAL, serde_json::json!("x"), None);
        assert!(bus.get_mailbox("a").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_mailbox() {
        let bus = Bus::new();
        let err = bus.next_message("ghost").await.unwrap_err();
        assert!(matches!(err, BusError::NoSuchMailbox(_)));
    }

    #[tokio::test]
    async fn test_double_create_is_noop() {
        let bus = Bus::new();
        bus.create_mailbox("a");
        bus.create_mailbox("a");
        assert_eq!(bus.stats().mailboxes, 1);
    }

    #[tokio::test]
    async fn test_handler_invoked_per_publish() {
        let bus = Arc::new(Bus::new());
        let count = Arc::new(AtomicUsize::new(0));

        let seen = count.clone();
        bus.register_handler(topics::GLOBAL, move |_msg| {
            let seen = seen.clone();
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
            }
        });

        bus.publish(topics::GLOBAL, serde_json::json!(1), None);
        bus.publish(topics::GLOBAL, serde_json::json!(2), None);

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_crashing_handler_does_not_poison_delivery() {
        let bus = Arc::new(Bus::new());
        bus.subscribe("a", topics::GLOBAL);
        bus.register_handler(topics::GLOBAL, |_msg| async {
            panic!("handler crash");
        });

        bus.publish(topics::GLOBAL, serde_json::json!("x"), None);

        // The mailbox copy still arrives even though the handler panicked.
        let msg = bus.next_message("a").await.unwrap();
        assert_eq!(msg.payload, serde_json::json!("x"));
    }

    #[tokio::test]
    async fn test_overflow_counts_drops() {
        let bus = Bus::with_capacity(2);
        bus.subscribe("a", topics::GLOBAL);

        for i in 0..3 {
            bus.publish(topics::GLOBAL, serde_json::json!(i), None);
        }

        assert_eq!(bus.stats().dropped, 1);
        // The oldest was dropped; the survivor front is message 1.
        assert_eq!(bus.next_message("a").await.unwrap().payload, serde_json::json!(1));
    }
}
