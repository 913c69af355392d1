//! Reserved bus topics.

/// Cross-cutting system announcements, including READY handshakes.
pub const GLOBAL: &str = "global.bus";

/// Tick events emitted by the epoch clock.
pub const TICKER: &str = "ticker";

/// New proposal submissions.
pub const CONSENSUS_PROPOSAL: &str = "consensus.proposal";

/// Vote submissions.
pub const CONSENSUS_VOTE: &str = "consensus.vote";

/// Prefix for events emitted by the consensus engine.
pub const CONSENSUS_EVENT_PREFIX: &str = "consensus.event";

/// Private inbound topic for an agent.
#[must_use]
pub fn agent_topic(agent_id: &str) -> String {
    format!("agent.{agent_id}.in")
}

/// Consensus engine event topic for the given event kind.
#[must_use]
pub fn consensus_event(kind: &str) -> String {
    format!("{CONSENSUS_EVENT_PREFIX}.{kind}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_topic_format() {
        assert_eq!(agent_topic("lyra"), "agent.lyra.in");
    }

    #[test]
    fn consensus_event_format() {
        assert_eq!(consensus_event("quorum_reached"), "consensus.event.quorum_reached");
    }
}
