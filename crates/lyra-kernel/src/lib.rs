//! # Lyra Kernel
//!
//! Boot sequence and lifecycle management for the Lyra runtime.
//!
//! The kernel composes the bus, ticker, keyring, ledger, consensus engine,
//! and scheduler; launches one worker process per agent in the bootstrap
//! record; collects their `READY <pubkey>` handshakes; drives the
//! `BOOT_CONSENSUS` proposal; and, once approved, pins the consensus record
//! in the ledger and declares the system RUNNING.
//!
//! Boot states move through
//! `INITIALIZING → BOOTING → CONSENSUS → RUNNING → SHUTTING_DOWN`.

pub mod config;
pub mod error;
pub mod kernel;
pub mod worker;

pub use config::{BootstrapEntry, BootstrapRecord, KernelConfig};
pub use error::KernelError;
pub use kernel::{KernelService, KernelState};
