//! # Lyra Scheduler
//!
//! The turn scheduler and orchestrator: token rotation, priority
//! interrupts, handoffs, timeout recovery, and leader election.
//!
//! Agents form an ordered ring; the current *token holder* is the only
//! agent permitted to speak. Each turn the scheduler drains the holder's
//! private mailbox into the prompt, invokes the agent under a deadline,
//! broadcasts the response on `global.bus`, and advances the token.
//!
//! Between turns, pending interrupts may preempt the rotation: the current
//! holder is pushed onto a pause stack and the interrupter takes the token,
//! up to a bounded nesting depth. Repeated timeouts trigger leader
//! election; every fault is reflected in the agent's reputation, its ledger
//! trust weight, and its consensus vote weight.

pub mod error;
pub mod interrupt;
pub mod log;
pub mod scheduler;

pub use error::SchedulerError;
pub use interrupt::InterruptRequest;
pub use log::ConversationEntry;
pub use scheduler::{
    Scheduler, SchedulerConfig, INTERRUPT_KEYWORDS, MAX_INTERRUPT_DEPTH, MAX_TURN_MS, MIN_SLICE_MS,
    PREEMPT_THRESHOLD, URGENCY_PRIORITY,
};
