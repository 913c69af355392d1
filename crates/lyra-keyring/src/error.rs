//! Error types for keyring operations.

use thiserror::Error;

/// Errors that can occur in keyring operations.
#[derive(Debug, Error)]
pub enum KeyringError {
    /// No keypair exists for the entity, in memory or in the keystore.
    #[error("no keypair found for entity '{0}'")]
    KeyNotFound(String),

    /// The stored or provided key material is malformed.
    #[error("invalid key material: {0}")]
    InvalidKey(String),

    /// An I/O error while reading or writing the keystore.
    #[error("keystore I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A keystore file could not be encoded or decoded.
    #[error("keystore serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A specialized `Result` for keyring operations.
pub type Result<T> = std::result::Result<T, KeyringError>;
