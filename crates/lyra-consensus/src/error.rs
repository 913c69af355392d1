//! Error types for the consensus engine.

use thiserror::Error;

/// Errors that can occur in consensus operations.
#[derive(Debug, Error)]
pub enum ConsensusError {
    /// A payload could not be encoded for publication.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
