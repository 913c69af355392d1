//! Events emitted by the consensus engine.
//!
//! Each event is published on `consensus.event.<KIND>`, where `KIND` is the
//! struct's associated [`KIND`](ProposalCreated::KIND) constant.

use crate::proposal::{Proposal, ProposalStatus, Vote, VoteType};
use lyra_core::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Emitted when a proposal record is first seen by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalCreated {
    /// The proposal as recorded.
    pub proposal: Proposal,
    /// Convenience copy of the proposal id.
    pub proposal_id: Uuid,
    /// Emission time.
    pub timestamp: Timestamp,
}

impl ProposalCreated {
    /// Event kind suffix on the bus.
    pub const KIND: &'static str = "proposal_created";
}

/// Emitted when a vote is accepted into the vote table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteReceived {
    /// The accepted vote.
    pub vote: Vote,
    /// Convenience copy of the proposal id.
    pub proposal_id: Uuid,
    /// Emission time.
    pub timestamp: Timestamp,
}

impl VoteReceived {
    /// Event kind suffix on the bus.
    pub const KIND: &'static str = "vote_received";
}

/// Emitted on every proposal status transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChanged {
    /// The proposal whose status changed.
    pub proposal_id: Uuid,
    /// Status before the transition.
    pub old_status: ProposalStatus,
    /// Status after the transition.
    pub new_status: ProposalStatus,
    /// Emission time.
    pub timestamp: Timestamp,
}

impl StatusChanged {
    /// Event kind suffix on the bus.
    pub const KIND: &'static str = "status_changed";
}

/// Emitted exactly once when a proposal reaches weighted quorum.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuorumReached {
    /// The decided proposal.
    pub proposal_id: Uuid,
    /// The winning side (`approve` or `reject`).
    pub result: VoteType,
    /// The votes counted at decision time.
    pub votes: Vec<Vote>,
    /// Emission time.
    pub timestamp: Timestamp,
}

impl QuorumReached {
    /// Event kind suffix on the bus.
    pub const KIND: &'static str = "quorum_reached";
}

/// Time-bounded pause of proposal acceptance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoftLock {
    /// The proposal that triggered the lock.
    pub proposal_id: Uuid,
    /// Lock duration in seconds.
    pub duration_secs: f64,
    /// Human-readable reason.
    pub reason: String,
    /// Emission time.
    pub timestamp: Timestamp,
}

impl SoftLock {
    /// Event kind suffix on the bus.
    pub const KIND: &'static str = "soft_lock";
}

/// Irreversible pause of proposal acceptance, optionally requesting
/// shutdown. Honouring the lock is the scheduler's responsibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardLock {
    /// The proposal that triggered the lock.
    pub proposal_id: Uuid,
    /// Human-readable reason.
    pub reason: String,
    /// Whether a system shutdown is requested.
    pub shutdown_requested: bool,
    /// Emission time.
    pub timestamp: Timestamp,
}

impl HardLock {
    /// Event kind suffix on the bus.
    pub const KIND: &'static str = "hard_lock";
}
