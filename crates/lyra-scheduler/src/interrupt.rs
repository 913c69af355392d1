//! Pending interrupt requests.

use lyra_core::{AgentId, Timestamp};
use std::cmp::Ordering;

/// A pending request from a non-holder to preempt the current turn.
///
/// Ordered for a max-heap: higher effective priority first, earlier
/// request time breaking ties.
#[derive(Debug, Clone)]
pub struct InterruptRequest {
    /// The agent that wants the token.
    pub agent_id: AgentId,
    /// Priority after reputation scaling.
    pub effective_priority: f64,
    /// When the request was made.
    pub requested_at: Timestamp,
    /// Payload carried into the interrupting turn.
    pub payload: String,
}

impl PartialEq for InterruptRequest {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for InterruptRequest {}

impl PartialOrd for InterruptRequest {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for InterruptRequest {
    fn cmp(&self, other: &Self) -> Ordering {
        self.effective_priority
            .total_cmp(&other.effective_priority)
            // Earlier requests win ties, so later timestamps sort lower.
            .then_with(|| other.requested_at.cmp(&self.requested_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BinaryHeap;

    fn request(agent: &str, priority: f64, at_millis: i64) -> InterruptRequest {
        InterruptRequest {
            agent_id: agent.to_string(),
            effective_priority: priority,
            requested_at: Timestamp::from_millis(at_millis),
            payload: String::new(),
        }
    }

    #[test]
    fn heap_pops_highest_priority_first() {
        let mut heap = BinaryHeap::new();
        heap.push(request("low", 40.0, 1));
        heap.push(request("high", 95.0, 2));
        heap.push(request("mid", 70.0, 3));

        assert_eq!(heap.pop().unwrap().agent_id, "high");
        assert_eq!(heap.pop().unwrap().agent_id, "mid");
        assert_eq!(heap.pop().unwrap().agent_id, "low");
    }

    #[test]
    fn ties_break_by_request_time() {
        let mut heap = BinaryHeap::new();
        heap.push(request("later", 80.0, 200));
        heap.push(request("earlier", 80.0, 100));

        assert_eq!(heap.pop().unwrap().agent_id, "earlier");
        assert_eq!(heap.pop().unwrap().agent_id, "later");
    }
}
