//! # Lyra Core
//!
//! Core types shared across the Lyra coordination runtime: timestamps and
//! agent identity.

#![forbid(unsafe_code)]

mod timestamp;

pub use timestamp::Timestamp;

/// Stable identifier for an agent or any other bus participant.
///
/// Identities are plain strings taken from the bootstrap record (`lyra`,
/// `otto`, `agent_3`, ...). They never change over the lifetime of a boot.
pub type AgentId = String;
