//! # Lyra Agents
//!
//! Agent shells for the Lyra runtime.
//!
//! An agent shell carries the per-agent state the scheduler works with:
//! static configuration from the bootstrap record, reputation, response-time
//! samples, and conversation history. The actual text production is behind
//! the [`Speaker`] trait with two implementations: a network-backed speaker
//! talking to an inference endpoint, and a deterministic mock for tests and
//! simulated runs.
//!
//! Shells never own a reference to the scheduler. Instead the scheduler
//! hands them a narrow [`InterruptSink`] capability for raising interrupts,
//! requesting handoffs, and signalling completion or errors.

pub mod config;
pub mod error;
pub mod shell;
pub mod sink;
pub mod speaker;

pub use config::AgentConfig;
pub use error::AgentError;
pub use shell::{AgentShell, HistoryEntry, HistoryRole};
pub use sink::InterruptSink;
pub use speaker::{HttpSpeaker, MockSpeaker, SpeakContext, Speaker};
