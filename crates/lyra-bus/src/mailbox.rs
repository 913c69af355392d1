//! Bounded per-subscriber mailboxes.

use crate::message::Message;
use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::Notify;

/// Maximum number of messages a mailbox holds before dropping the oldest.
pub const MAILBOX_CAPACITY: usize = 1024;

/// A bounded FIFO queue of messages for one subscriber.
///
/// Producers never block: when the queue is full the oldest message is
/// evicted. Consumers suspend in [`Mailbox::next`] until a message arrives.
#[derive(Debug)]
pub struct Mailbox {
    queue: Mutex<VecDeque<Message>>,
    notify: Notify,
    capacity: usize,
}

impl Mailbox {
    /// Creates a new mailbox with the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            capacity,
        }
    }

    /// Enqueues a message, evicting the oldest on overflow.
    ///
    /// Returns the evicted message if the mailbox was full.
    pub fn push(&self, message: Message) -> Option<Message> {
        let evicted = {
            let mut queue = self.queue.lock();
            let evicted = if queue.len() >= self.capacity {
                queue.pop_front()
            } else {
                None
            };
            queue.push_back(message);
            evicted
        };
        self.notify.notify_one();
        evicted
    }

    /// Waits for and returns the next message in FIFO order.
    pub async fn next(&self) -> Message {
        loop {
            // Register for notification before checking, so a push between
            // the check and the await is not missed.
            let notified = self.notify.notified();
            if let Some(message) = self.try_next() {
                return message;
            }
            notified.await;
        }
    }

    /// Returns the next message without waiting, if one is queued.
    pub fn try_next(&self) -> Option<Message> {
        self.queue.lock().pop_front()
    }

    /// Drains all currently-queued messages in FIFO order.
    pub fn drain(&self) -> Vec<Message> {
        self.queue.lock().drain(..).collect()
    }

    /// Number of queued messages.
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Returns true if no messages are queued.
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(topic: &str, seq: u64) -> Message {
        Message::new(topic, serde_json::Value::Null, None, seq)
    }

    #[tokio::test]
    async fn mailbox_fifo() {
        let mailbox = Mailbox::new(MAILBOX_CAPACITY);
        mailbox.push(msg("t", 1));
        mailbox.push(msg("t", 2));

        assert_eq!(mailbox.next().await.seq, 1);
        assert_eq!(mailbox.next().await.seq, 2);
    }

    #[tokio::test]
    async fn mailbox_wakes_waiter() {
        let mailbox = std::sync::Arc::new(Mailbox::new(MAILBOX_CAPACITY));
        let consumer = {
            let mailbox = mailbox.clone();
            tokio::spawn(async move { mailbox.next().await.seq })
        };

        tokio::task::yield_now().await;
        mailbox.push(msg("t", 42));

        assert_eq!(consumer.await.unwrap(), 42);
    }

    #[test]
    fn mailbox_drop_oldest_on_overflow() {
        let mailbox = Mailbox::new(2);
        assert!(mailbox.push(msg("t", 1)).is_none());
        assert!(mailbox.push(msg("t", 2)).is_none());

        let evicted = mailbox.push(msg("t", 3)).unwrap();
        assert_eq!(evicted.seq, 1);
        assert_eq!(mailbox.len(), 2);
        assert_eq!(mailbox.try_next().unwrap().seq, 2);
    }

    #[test]
    fn mailbox_drain() {
        let mailbox = Mailbox::new(MAILBOX_CAPACITY);
        mailbox.push(msg("t", 1));
        mailbox.push(msg("t", 2));

        let drained = mailbox.drain();
        assert_eq!(drained.len(), 2);
        assert!(mailbox.is_empty());
    }
}
