//! Error types for ledger operations.

use thiserror::Error;

/// Errors that can occur in ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// An I/O error while reading or writing the ledger directory.
    #[error("ledger I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A ledger file could not be encoded or decoded.
    #[error("ledger serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
