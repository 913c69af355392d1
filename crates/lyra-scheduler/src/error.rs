//! Error types for the scheduler.

use thiserror::Error;

/// Errors that can occur in scheduler operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The referenced agent is not part of the roster.
    #[error("unknown agent: {0}")]
    UnknownAgent(String),

    /// A consensus ballot is already in progress.
    #[error("a consensus ballot is already in progress")]
    BallotInProgress,

    /// The scheduler has no agents to rotate.
    #[error("empty roster")]
    EmptyRoster,

    /// A consensus-engine operation failed.
    #[error(transparent)]
    Consensus(#[from] lyra_consensus::ConsensusError),

    /// An I/O error while saving the conversation log.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
