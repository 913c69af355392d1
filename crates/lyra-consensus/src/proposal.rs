//! Proposals and votes.

use lyra_core::{AgentId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Status of a consensus proposal.
///
/// Transitions are monotone: `Pending → Voting → {Approved, Rejected,
/// Expired}`. The three final states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalStatus {
    /// Recorded but not yet open for votes.
    Pending,
    /// Open for votes.
    Voting,
    /// Quorum reached in favour.
    Approved,
    /// Quorum reached against.
    Rejected,
    /// Expiry passed before quorum.
    Expired,
}

impl ProposalStatus {
    /// Returns true for the three terminal states.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Expired)
    }

    /// Whether the monotone state machine permits moving to `next`.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        match self {
            Self::Pending => matches!(next, Self::Voting | Self::Expired),
            Self::Voting => next.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Voting => "voting",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
        };
        f.write_str(s)
    }
}

/// Type of vote on a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteType {
    /// In favour.
    Approve,
    /// Against.
    Reject,
    /// Counted toward the total weight without taking a side.
    Abstain,
}

impl FromStr for VoteType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "approve" => Ok(Self::Approve),
            "reject" => Ok(Self::Reject),
            "abstain" => Ok(Self::Abstain),
            _ => Err(()),
        }
    }
}

impl fmt::Display for VoteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Abstain => "abstain",
        };
        f.write_str(s)
    }
}

/// A consensus proposal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    /// Unique identifier.
    pub id: Uuid,
    /// Free-form proposal type, e.g. `BOOT_CONSENSUS`.
    #[serde(rename = "type")]
    pub kind: String,
    /// The proposing entity.
    pub proposer: AgentId,
    /// Opaque proposal content.
    pub content: serde_json::Value,
    /// Current status.
    pub status: ProposalStatus,
    /// Creation time.
    pub created_at: Timestamp,
    /// Optional expiry; past this the proposal expires on the next sweep.
    #[serde(default)]
    pub expires_at: Option<Timestamp>,
    /// Free-form metadata.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Proposal {
    /// Creates a new pending proposal.
    #[must_use]
    pub fn new(
        kind: impl Into<String>,
        content: serde_json::Value,
        proposer: impl Into<AgentId>,
        expires_at: Option<Timestamp>,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: kind.into(),
            proposer: proposer.into(),
            content,
            status: ProposalStatus::Pending,
            created_at: Timestamp::now(),
            expires_at,
            metadata,
        }
    }

    /// Returns true if the expiry time has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at.elapsed())
    }
}

/// A vote on a consensus proposal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    /// Unique identifier.
    pub id: Uuid,
    /// The proposal being voted on.
    pub proposal_id: Uuid,
    /// The voting agent.
    pub agent_id: AgentId,
    /// The side taken.
    pub vote_type: VoteType,
    /// Optional free-form rationale.
    #[serde(default)]
    pub rationale: Option<String>,
    /// Optional base64 Ed25519 signature over the vote.
    #[serde(default)]
    pub signature: Option<String>,
    /// When the vote was recorded.
    pub timestamp: Timestamp,
}

/// Wire format of a vote submission on `consensus.vote`.
///
/// `vote_type` stays a raw string so the engine can reject unknown values
/// as a protocol violation rather than a deserialization failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteSubmission {
    /// The proposal being voted on.
    pub proposal_id: Uuid,
    /// The voting agent; the message sender is used when absent.
    #[serde(default)]
    pub agent_id: Option<AgentId>,
    /// Requested vote type (`approve`, `reject`, `abstain`).
    pub vote_type: String,
    /// Optional free-form rationale.
    #[serde(default)]
    pub rationale: Option<String>,
    /// Optional base64 Ed25519 signature.
    #[serde(default)]
    pub signature: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn status_transitions_are_monotone() {
        use ProposalStatus::*;

        assert!(Pending.can_transition_to(Voting));
        assert!(Voting.can_transition_to(Approved));
        assert!(Voting.can_transition_to(Rejected));
        assert!(Voting.can_transition_to(Expired));

        assert!(!Voting.can_transition_to(Pending));
        assert!(!Approved.can_transition_to(Voting));
        assert!(!Rejected.can_transition_to(Approved));
        assert!(!Expired.can_transition_to(Voting));
    }

    #[test]
    fn terminal_states() {
        assert!(ProposalStatus::Approved.is_terminal());
        assert!(ProposalStatus::Rejected.is_terminal());
        assert!(ProposalStatus::Expired.is_terminal());
        assert!(!ProposalStatus::Voting.is_terminal());
    }

    #[test]
    fn vote_type_parse() {
        assert_eq!("APPROVE".parse::<VoteType>(), Ok(VoteType::Approve));
        assert_eq!("reject".parse::<VoteType>(), Ok(VoteType::Reject));
        assert!("maybe".parse::<VoteType>().is_err());
    }

    #[test]
    fn proposal_wire_format_uses_type_field() {
        let proposal = Proposal::new(
            "BOOT_CONSENSUS",
            serde_json::json!({"agents": ["a"]}),
            "kernel",
            None,
            HashMap::new(),
        );
        let value = serde_json::to_value(&proposal).unwrap();
        assert_eq!(value["type"], "BOOT_CONSENSUS");
        assert_eq!(value["status"], "pending");

        let parsed: Proposal = serde_json::from_value(value).unwrap();
        assert_eq!(parsed.kind, "BOOT_CONSENSUS");
    }

    #[test]
    fn proposal_expiry() {
        let expired = Proposal::new(
            "TEST",
            serde_json::Value::Null,
            "kernel",
            Some(Timestamp::from_millis(1)),
            HashMap::new(),
        );
        assert!(expired.is_expired());

        let open = Proposal::new("TEST", serde_json::Value::Null, "kernel", None, HashMap::new());
        assert!(!open.is_expired());
    }
}
