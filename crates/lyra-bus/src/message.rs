//! Bus messages.

use lyra_core::{AgentId, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A message published on the bus.
///
/// Messages are immutable after publication; every subscribed mailbox
/// receives its own clone.
#[derive(Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message identifier.
    pub id: Uuid,
    /// The topic this message was published on.
    pub topic: String,
    /// Opaque structured payload.
    pub payload: serde_json::Value,
    /// Optional identifier of the sender.
    pub sender: Option<AgentId>,
    /// Publication time.
    pub timestamp: Timestamp,
    /// Bus-global publication sequence number, strictly increasing.
    pub seq: u64,
}

impl Message {
    pub(crate) fn new(
        topic: impl Into<String>,
        payload: serde_json::Value,
        sender: Option<AgentId>,
        seq: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            topic: topic.into(),
            payload,
            sender,
            timestamp: Timestamp::now(),
            seq,
        }
    }

    /// Deserializes the payload into a concrete type.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .field("sender", &self.sender)
            .field("seq", &self.seq)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_decode() {
        let msg = Message::new(
            "global.bus",
            serde_json::json!({"type": "READY", "agent_id": "lyra"}),
            Some("lyra".to_string()),
            7,
        );

        #[derive(Deserialize)]
        struct Ready {
            agent_id: String,
        }

        let ready: Ready = msg.decode().unwrap();
        assert_eq!(ready.agent_id, "lyra");
        assert_eq!(msg.seq, 7);
    }
}
