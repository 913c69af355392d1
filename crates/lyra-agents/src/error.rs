//! Error types for agent shells.

use thiserror::Error;

/// Errors that can occur when driving an agent.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The inference backend returned a failure.
    #[error("backend error: {0}")]
    Backend(String),

    /// The HTTP transport to the backend failed.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The backend reply could not be decoded.
    #[error("malformed backend reply: {0}")]
    MalformedReply(String),
}
