//! The interrupt-sink capability.

/// Narrow scheduler capability handed to agent shells.
///
/// Shells raise interrupts and handoffs through this trait instead of
/// holding a reference to the scheduler, keeping ownership one-directional.
pub trait InterruptSink: Send + Sync {
    /// Requests preemption on behalf of `agent_id` with the given base
    /// priority (0-100) and payload.
    fn request_interrupt(&self, agent_id: &str, priority: f64, payload: &str);

    /// Requests handing the turn from `sender` to `target`. Returns false
    /// when the target is unknown.
    fn request_handoff(&self, sender: &str, target: &str, payload: &str) -> bool;

    /// Signals that `agent_id` has finished its work for this turn.
    fn mark_complete(&self, agent_id: &str);

    /// Signals that `agent_id` hit an error while working.
    fn mark_error(&self, agent_id: &str, details: &str);
}
