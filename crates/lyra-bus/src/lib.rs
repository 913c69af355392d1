//! # Lyra Bus
//!
//! In-process pub/sub message bus for inter-agent communication.
//!
//! The bus carries one global topic plus any number of private topics, with
//! a bounded FIFO mailbox per subscriber. Publication is synchronous: when
//! `publish` returns, the message has been enqueued into every mailbox
//! subscribed to the topic and every registered handler has been spawned.
//! Consumption is asynchronous via [`Bus::next_message`].
//!
//! ## Guarantees
//!
//! - Per-(topic, subscriber) delivery is FIFO; ordering across subscribers
//!   and topics is unspecified.
//! - Exactly one message copy per subscription match per publish.
//! - A crashing handler never interferes with other deliveries.
//!
//! ## Back-pressure
//!
//! Mailboxes are bounded to [`MAILBOX_CAPACITY`] messages. On overflow the
//! oldest message is dropped and a warning is logged; publishers are never
//! blocked.

pub mod bus;
pub mod error;
pub mod mailbox;
pub mod message;
pub mod topics;

pub use bus::{Bus, BusStats};
pub use error::BusError;
pub use mailbox::{Mailbox, MAILBOX_CAPACITY};
pub use message::Message;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_public_api() {
        let bus = Bus::new();
        bus.subscribe("tester", topics::GLOBAL);
        bus.publish(topics::GLOBAL, serde_json::json!("hello"), None);
        let msg = bus.next_message("tester").await.unwrap();
        assert_eq!(msg.topic, topics::GLOBAL);
    }
}
