//! Error types for the kernel.

use thiserror::Error;

/// Errors that can occur during boot and shutdown.
#[derive(Debug, Error)]
pub enum KernelError {
    /// The bootstrap record is missing or invalid. Fatal at boot.
    #[error("configuration error: {0}")]
    Config(String),

    /// The bootstrap record could not be parsed.
    #[error("failed to parse bootstrap record: {0}")]
    Bootstrap(#[from] serde_yaml::Error),

    /// An I/O error during boot.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Required agents did not become ready in time.
    #[error("boot timed out waiting for agents: {0}")]
    BootTimeout(String),

    /// A keyring operation failed.
    #[error(transparent)]
    Keyring(#[from] lyra_keyring::KeyringError),

    /// A ledger operation failed.
    #[error(transparent)]
    Ledger(#[from] lyra_ledger::LedgerError),

    /// A consensus-engine operation failed.
    #[error(transparent)]
    Consensus(#[from] lyra_consensus::ConsensusError),

    /// An agent shell could not be constructed.
    #[error(transparent)]
    Agent(#[from] lyra_agents::AgentError),
}
