//! Conversation log.

use lyra_core::Timestamp;
use serde::{Deserialize, Serialize};

/// One entry in the conversation log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationEntry {
    /// Turn number; 0 for the initial user prompt.
    pub turn: u64,
    /// Speaker: an agent id, `User`, or `Orchestrator`.
    pub agent: String,
    /// The spoken text.
    pub message: String,
    /// When the entry was recorded.
    pub timestamp: Timestamp,
}

impl ConversationEntry {
    /// Creates an entry stamped with the current time.
    pub fn new(turn: u64, agent: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            turn,
            agent: agent.into(),
            message: message.into(),
            timestamp: Timestamp::now(),
        }
    }
}
