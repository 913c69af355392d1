//! # Lyra Consensus
//!
//! Weighted-quorum consensus over the Lyra bus.
//!
//! The engine owns the proposal and vote tables. It subscribes to
//! `consensus.proposal` and `consensus.vote`, tallies weighted votes, and
//! publishes lifecycle events under `consensus.event.*`:
//! `proposal_created`, `vote_received`, `status_changed`, `quorum_reached`,
//! `soft_lock`, and `hard_lock`.
//!
//! Proposal status moves monotonically through
//! `PENDING → VOTING → {APPROVED, REJECTED, EXPIRED}`; votes arriving in a
//! non-VOTING state are logged and discarded.
//!
//! Vote weights come from an engine-local table defaulting to `1.0` for
//! unknown agents. This deliberately differs from the ledger's `0.5`
//! default: the kernel injects ledger trust weights into this table at boot
//! and keeps them in sync afterwards.

pub mod engine;
pub mod error;
pub mod event;
pub mod proposal;

pub use engine::{ConsensusEngine, DEFAULT_QUORUM_THRESHOLD, ENGINE_SUBSCRIBER_ID};
pub use error::ConsensusError;
pub use event::{
    HardLock, ProposalCreated, QuorumReached, SoftLock, StatusChanged, VoteReceived,
};
pub use proposal::{Proposal, ProposalStatus, Vote, VoteSubmission, VoteType};
