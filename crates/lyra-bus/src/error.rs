//! Error types for the bus.

use thiserror::Error;

/// Errors that can occur in bus operations.
#[derive(Debug, Error)]
pub enum BusError {
    /// No mailbox exists for the given subscriber.
    #[error("no mailbox exists for subscriber '{0}'")]
    NoSuchMailbox(String),
}
