//! The turn scheduler.

use crate::error::SchedulerError;
use crate::interrupt::InterruptRequest;
use crate::log::ConversationEntry;
use lyra_agents::{AgentShell, InterruptSink};
use lyra_bus::{topics, Bus};
use lyra_consensus::{ConsensusEngine, QuorumReached, VoteType};
use lyra_core::{AgentId, Timestamp};
use lyra_ledger::Ledger;
use parking_lot::Mutex;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Minimum slice length before a non-critical interrupt may preempt.
pub const MIN_SLICE_MS: u64 = 1500;

/// Per-turn invocation deadline.
pub const MAX_TURN_MS: u64 = 5000;

/// Effective priority at or above which an interrupt preempts immediately.
pub const PREEMPT_THRESHOLD: f64 = 90.0;

/// Maximum nested preemption depth before interrupts are frozen.
pub const MAX_INTERRUPT_DEPTH: u32 = 3;

/// Base priority of interrupts raised by the urgency scan.
pub const URGENCY_PRIORITY: f64 = 95.0;

/// General urgency keywords scanned in every outgoing prompt.
pub const INTERRUPT_KEYWORDS: [&str; 5] = ["urgent", "critical", "emergency", "important", "!!"];

/// Yield between turns.
const INTER_TURN_DELAY_MS: u64 = 500;

/// Reputation penalty for a missed deadline.
const TIMEOUT_PENALTY: f64 = 0.2;

/// Reputation penalty for a backend fault or reported error.
const ERROR_PENALTY: f64 = 0.1;

/// Consecutive faults per agent before leader election triggers.
const FAULT_THRESHOLD: u32 = 3;

/// Trust band applied when mirroring reputation into the ledger.
const TRUST_BAND: (f64, f64) = (0.1, 1.0);

/// Sender id the scheduler uses on the bus.
const SCHEDULER_ID: &str = "scheduler";

/// Tunable scheduler parameters.
///
/// Defaults match the production constants; tests shrink the timing knobs.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Per-turn invocation deadline.
    pub max_turn: Duration,
    /// Minimum slice before non-critical interrupts preempt.
    pub min_slice: Duration,
    /// Yield between turns.
    pub inter_turn_delay: Duration,
    /// Effective priority preempting regardless of slice time.
    pub preempt_threshold: f64,
    /// Nested preemption cap.
    pub max_interrupt_depth: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_turn: Duration::from_millis(MAX_TURN_MS),
            min_slice: Duration::from_millis(MIN_SLICE_MS),
            inter_turn_delay: Duration::from_millis(INTER_TURN_DELAY_MS),
            preempt_threshold: PREEMPT_THRESHOLD,
            max_interrupt_depth: MAX_INTERRUPT_DEPTH,
        }
    }
}

#[derive(Debug, Default)]
struct RotationState {
    ring: VecDeque<AgentId>,
    token_holder: Option<AgentId>,
    pause_stack: VecDeque<AgentId>,
    interrupt_depth: u32,
    inhibit_turns: u32,
    timeout_count: HashMap<AgentId, u32>,
    error_count: HashMap<AgentId, u32>,
    leader: Option<AgentId>,
    consensus_in_progress: bool,
    slice_started: Option<Instant>,
}

enum FaultKind {
    Timeout,
    Error,
}

/// The turn scheduler and orchestrator.
///
/// All state is behind per-structure mutexes held only for the duration of
/// an operation, never across a suspension point; `run` is the single
/// driver and turns are globally serialised.
pub struct Scheduler {
    bus: Arc<Bus>,
    engine: ConsensusEngine,
    ledger: Option<Arc<Ledger>>,
    shells: HashMap<AgentId, Arc<AgentShell>>,
    roster: Vec<AgentId>,
    state: Arc<Mutex<RotationState>>,
    interrupts: Arc<Mutex<BinaryHeap<InterruptRequest>>>,
    log: Arc<Mutex<Vec<ConversationEntry>>>,
    running: Arc<AtomicBool>,
    config: SchedulerConfig,
}

impl Scheduler {
    /// Creates a scheduler over an ordered roster of agent shells.
    ///
    /// Subscribes every agent to its private topic and to `global.bus`, and
    /// registers a handler that announces quorum results.
    pub fn new(
        bus: Arc<Bus>,
        engine: ConsensusEngine,
        shells: Vec<Arc<AgentShell>>,
        config: SchedulerConfig,
    ) -> Self {
        let roster: Vec<AgentId> = shells.iter().map(|s| s.id().clone()).collect();
        for shell in &shells {
            bus.subscribe(shell.id(), &topics::agent_topic(shell.id()));
            bus.subscribe(shell.id(), topics::GLOBAL);
        }

        let state = Arc::new(Mutex::new(RotationState {
            ring: roster.iter().cloned().collect(),
            ..RotationState::default()
        }));

        // Announce quorum results on the global bus and release the ballot
        // guard.
        let handler_bus = bus.clone();
        let handler_state = state.clone();
        bus.register_handler(
            &topics::consensus_event(QuorumReached::KIND),
            move |message| {
                let bus = handler_bus.clone();
                let state = handler_state.clone();
                async move {
                    match message.decode::<QuorumReached>() {
                        Ok(event) => {
                            state.lock().consensus_in_progress = false;
                            bus.publish(
                                topics::GLOBAL,
                                serde_json::json!({
                                    "type": "consensus_result",
                                    "proposal_id": event.proposal_id,
                                    "result": event.result,
                                    "message": format!(
                                        "[CONSENSUS RESULT] Proposal {}: {}",
                                        event.proposal_id, event.result
                                    ),
                                }),
                                Some(SCHEDULER_ID.to_string()),
                            );
                        }
                        Err(err) => warn!(error = %err, "malformed quorum event"),
                    }
                }
            },
        );

        info!(agents = roster.len(), "scheduler initialized");
        Self {
            bus,
            engine,
            ledger: None,
            shells: shells.into_iter().map(|s| (s.id().clone(), s)).collect(),
            roster,
            state,
            interrupts: Arc::new(Mutex::new(BinaryHeap::new())),
            log: Arc::new(Mutex::new(Vec::new())),
            running: Arc::new(AtomicBool::new(false)),
            config,
        }
    }

    /// Attaches a ledger so reputation changes propagate into trust
    /// weights and the consensus engine's weight table.
    #[must_use]
    pub fn with_ledger(mut self, ledger: Arc<Ledger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Runs the conversation for up to `max_turns` turns.
    ///
    /// Can be called again to continue from the current rotation state.
    ///
    /// # Errors
    ///
    /// Fails on an empty roster; per-agent faults never abort the run.
    pub async fn run(&self, initial_prompt: &str, max_turns: u64) -> Result<(), SchedulerError> {
        if self.roster.is_empty() {
            return Err(SchedulerError::EmptyRoster);
        }
        self.running.store(true, Ordering::SeqCst);

        let mut prompt = initial_prompt.to_string();
        self.log
            .lock()
            .push(ConversationEntry::new(0, "User", initial_prompt));
        info!(initial_prompt = %initial_prompt, max_turns, "starting orchestration");

        // Hand the token to the front of the ring on first entry.
        {
            let mut state = self.state.lock();
            if state.token_holder.is_none() {
                if let Some(first) = state.ring.pop_front() {
                    state.ring.push_back(first.clone());
                    state.token_holder = Some(first);
                }
                state.slice_started = Some(Instant::now());
            }
        }

        let mut turn = 0u64;
        while self.running.load(Ordering::SeqCst) && turn < max_turns {
            turn += 1;
            let current_id = self
                .state
                .lock()
                .token_holder
                .clone()
                .ok_or(SchedulerError::EmptyRoster)?;
            let shell = self
                .shells
                .get(&current_id)
                .cloned()
                .ok_or_else(|| SchedulerError::UnknownAgent(current_id.clone()))?;

            info!(turn, max_turns, agent_id = %current_id, "turn started");

            let turn_prompt = self.prompt_with_mailbox(&current_id, &prompt);
            self.urgency_scan(&current_id, &turn_prompt);

            let response =
                match tokio::time::timeout(self.config.max_turn, shell.speak(&turn_prompt)).await {
                    Ok(Ok(response)) => {
                        self.state.lock().timeout_count.insert(current_id.clone(), 0);
                        response
                    }
                    Ok(Err(err)) => {
                        warn!(agent_id = %current_id, error = %err, "agent backend fault");
                        self.record_fault(&current_id, &FaultKind::Error);
                        format!("[{current_id} failed to respond: {err}]")
                    }
                    Err(_) => {
                        warn!(agent_id = %current_id, "agent missed the turn deadline");
                        self.record_fault(&current_id, &FaultKind::Timeout);
                        format!("[{current_id} timed out and did not respond in time]")
                    }
                };

            debug!(agent_id = %current_id, response = %response, "turn response");
            self.log
                .lock()
                .push(ConversationEntry::new(turn, &current_id, &response));

            // One publish; the bus fans out to every subscribed mailbox.
            self.bus.publish(
                topics::GLOBAL,
                serde_json::json!({
                    "type": "turn",
                    "turn": turn,
                    "agent": current_id,
                    "message": response,
                }),
                Some(current_id.clone()),
            );

            prompt = format!(
                "Previous message from {current_id}: {response}\nYour turn to respond."
            );

            // Between turns: a qualifying interrupt takes the token,
            // otherwise the rotation advances.
            if !self.take_interrupt() {
                self.advance_token();
            }

            // Livelock cap on nested preemption.
            {
                let mut state = self.state.lock();
                if state.interrupt_depth > self.config.max_interrupt_depth {
                    warn!(
                        depth = state.interrupt_depth,
                        "interrupt depth over cap, freezing interrupts for one rotation"
                    );
                    self.interrupts.lock().clear();
                    state.interrupt_depth = 0;
                    state.inhibit_turns = state.ring.len() as u32;
                }
            }

            tokio::time::sleep(self.config.inter_turn_delay).await;
        }

        self.running.store(false, Ordering::SeqCst);
        info!(turns = turn, "orchestration finished");
        Ok(())
    }

    /// Stops the run loop after the current turn.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        info!("stopping orchestration");
    }

    /// Returns true while `run` is active.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn prompt_with_mailbox(&self, agent_id: &str, prompt: &str) -> String {
        let Ok(mailbox) = self.bus.get_mailbox(agent_id) else {
            return prompt.to_string();
        };
        let lines: Vec<String> = mailbox
            .drain()
            .into_iter()
            // The agent's own broadcasts come back via global.bus; they are
            // not context.
            .filter(|m| m.sender.as_deref() != Some(agent_id))
            .map(|m| {
                let sender = m.sender.unwrap_or_else(|| "system".to_string());
                format!("{sender}: {}", render_payload(&m.payload))
            })
            .collect();
        if lines.is_empty() {
            prompt.to_string()
        } else {
            format!(
                "{prompt}\n\nMessages from other agents:\n{}",
                lines.join("\n")
            )
        }
    }

    /// Scans an outgoing prompt for urgency and specialty keywords, raising
    /// interrupts on behalf of the matching agents.
    ///
    /// General urgency language and another agent's specialty both raise a
    /// base-95 interrupt; the current speaker hitting its own specialty
    /// self-preempts at its configured threshold priority.
    fn urgency_scan(&self, current_id: &str, prompt: &str) {
        let lowered = prompt.to_lowercase();
        let urgent = INTERRUPT_KEYWORDS.iter().any(|kw| lowered.contains(kw));

        for agent_id in &self.roster {
            let Some(shell) = self.shells.get(agent_id) else {
                continue;
            };
            let specialty_hit = shell.config().matches_specialty(prompt);
            let priority = if agent_id == current_id {
                if urgent {
                    URGENCY_PRIORITY
                } else if specialty_hit {
                    shell.interrupt_priority(prompt)
                } else {
                    continue;
                }
            } else if specialty_hit {
                URGENCY_PRIORITY
            } else {
                continue;
            };
            debug!(agent_id = %agent_id, priority, "urgency scan raised interrupt");
            self.request_interrupt(agent_id, priority, prompt);
        }
    }

    fn take_interrupt(&self) -> bool {
        let mut state = self.state.lock();
        if state.inhibit_turns > 0 {
            state.inhibit_turns -= 1;
            return false;
        }

        let elapsed = state
            .slice_started
            .map(|s| s.elapsed())
            .unwrap_or_default();
        let request = {
            let mut heap = self.interrupts.lock();
            let qualifies = heap.peek().is_some_and(|top| {
                elapsed >= self.config.min_slice
                    || top.effective_priority >= self.config.preempt_threshold
            });
            if !qualifies {
                return false;
            }
            match heap.pop() {
                Some(request) => request,
                None => return false,
            }
        };

        // The interrupter spends its upcoming rotation slot.
        if let Some(pos) = state.ring.iter().position(|id| *id == request.agent_id) {
            if let Some(id) = state.ring.remove(pos) {
                state.ring.push_back(id);
            }
        }
        if let Some(holder) = state.token_holder.take() {
            state.pause_stack.push_front(holder);
        }
        state.interrupt_depth += 1;
        state.token_holder = Some(request.agent_id.clone());
        state.slice_started = Some(Instant::now());
        info!(
            agent_id = %request.agent_id,
            priority = request.effective_priority,
            depth = state.interrupt_depth,
            "interrupt taken"
        );
        drop(state);

        if !request.payload.is_empty() {
            self.bus.publish(
                &topics::agent_topic(&request.agent_id),
                serde_json::json!({"type": "interrupt", "message": request.payload}),
                Some(SCHEDULER_ID.to_string()),
            );
        }
        true
    }

    fn advance_token(&self) {
        let mut state = self.state.lock();
        if let Some(resumed) = state.pause_stack.pop_front() {
            state.interrupt_depth = state.interrupt_depth.saturating_sub(1);
            debug!(agent_id = %resumed, depth = state.interrupt_depth, "resuming paused agent");
            state.token_holder = Some(resumed);
        } else if let Some(next) = state.ring.pop_front() {
            state.ring.push_back(next.clone());
            state.token_holder = Some(next);
        }
        state.slice_started = Some(Instant::now());
    }

    fn record_fault(&self, agent_id: &str, kind: &FaultKind) {
        let (count, penalty) = {
            let mut state = self.state.lock();
            match kind {
                FaultKind::Timeout => {
                    let count = state
                        .timeout_count
                        .entry(agent_id.to_string())
                        .and_modify(|c| *c += 1)
                        .or_insert(1);
                    (*count, TIMEOUT_PENALTY)
                }
                FaultKind::Error => {
                    let count = state
                        .error_count
                        .entry(agent_id.to_string())
                        .and_modify(|c| *c += 1)
                        .or_insert(1);
                    (*count, ERROR_PENALTY)
                }
            }
        };

        self.adjust_reputation(agent_id, -penalty);
        if count >= FAULT_THRESHOLD {
            self.elect_leader();
        }
    }

    /// Adjusts an agent's reputation and mirrors the change into the
    /// ledger trust weight and the engine's vote-weight table.
    pub fn adjust_reputation(&self, agent_id: &str, delta: f64) {
        let Some(shell) = self.shells.get(agent_id) else {
            warn!(agent_id = %agent_id, "reputation change for unknown agent");
            return;
        };
        shell.adjust_reputation(delta);
        if let Some(ledger) = &self.ledger {
            ledger.update_trust_weight(agent_id, delta, TRUST_BAND.0, TRUST_BAND.1);
            self.engine
                .set_agent_weight(agent_id, ledger.trust_weight(agent_id));
        }
    }

    fn elect_leader(&self) {
        if self.state.lock().leader.is_some() {
            return;
        }

        let mut best: Option<(&AgentId, f64)> = None;
        for agent_id in &self.roster {
            let reputation = self.shells[agent_id].reputation();
            if best.is_none_or(|(_, r)| reputation > r) {
                best = Some((agent_id, reputation));
            }
        }
        let Some((leader, reputation)) = best else {
            return;
        };

        self.state.lock().leader = Some(leader.clone());
        info!(leader = %leader, reputation, "elected leader");

        self.bus.publish(
            topics::GLOBAL,
            serde_json::json!({
                "type": "leader_elected",
                "leader": leader,
                "message": format!(
                    "Due to system issues, {leader} has been elected as leader. \
                     Please follow their coordination instructions."
                ),
            }),
            Some(SCHEDULER_ID.to_string()),
        );
    }

    /// Starts a consensus ballot over the roster.
    ///
    /// # Errors
    ///
    /// Fails when a ballot is already in progress or the proposal cannot
    /// be published.
    pub fn start_consensus_ballot(
        &self,
        content: serde_json::Value,
    ) -> Result<Uuid, SchedulerError> {
        {
            let mut state = self.state.lock();
            if state.consensus_in_progress {
                return Err(SchedulerError::BallotInProgress);
            }
            state.consensus_in_progress = true;
        }

        let proposal_id = self.engine.create_proposal(
            "SCHEDULER_BALLOT",
            content.clone(),
            SCHEDULER_ID,
            None,
            HashMap::new(),
        )?;

        self.bus.publish(
            topics::GLOBAL,
            serde_json::json!({
                "type": "consensus_ballot",
                "proposal_id": proposal_id,
                "message": format!("[CONSENSUS] Please vote APPROVE or REJECT on: {content}"),
            }),
            Some(SCHEDULER_ID.to_string()),
        );
        info!(proposal_id = %proposal_id, "consensus ballot started");
        Ok(proposal_id)
    }

    /// Registers an agent's vote on a ballot.
    ///
    /// # Errors
    ///
    /// Fails when the vote cannot be published.
    pub fn register_vote(
        &self,
        agent_id: &str,
        proposal_id: Uuid,
        vote: VoteType,
    ) -> Result<(), SchedulerError> {
        self.engine.cast_vote(proposal_id, agent_id, vote, None, None)?;
        Ok(())
    }

    /// The current token holder.
    pub fn token_holder(&self) -> Option<AgentId> {
        self.state.lock().token_holder.clone()
    }

    /// Current nested preemption depth.
    pub fn interrupt_depth(&self) -> u32 {
        self.state.lock().interrupt_depth
    }

    /// Number of queued interrupt requests.
    pub fn pending_interrupts(&self) -> usize {
        self.interrupts.lock().len()
    }

    /// The elected leader, if any.
    pub fn leader(&self) -> Option<AgentId> {
        self.state.lock().leader.clone()
    }

    /// An agent's current reputation.
    pub fn reputation(&self, agent_id: &str) -> Option<f64> {
        self.shells.get(agent_id).map(|s| s.reputation())
    }

    /// Snapshot of the conversation log, oldest first.
    pub fn conversation_log(&self) -> Vec<ConversationEntry> {
        self.log.lock().clone()
    }

    /// Saves the conversation log as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Fails when the log cannot be encoded or written.
    pub fn save_log(&self, path: impl AsRef<Path>) -> Result<(), SchedulerError> {
        let log = self.log.lock().clone();
        std::fs::write(path.as_ref(), serde_json::to_string_pretty(&log)?)?;
        info!(path = %path.as_ref().display(), entries = log.len(), "conversation log saved");
        Ok(())
    }
}

impl InterruptSink for Scheduler {
    fn request_interrupt(&self, agent_id: &str, priority: f64, payload: &str) {
        let Some(shell) = self.shells.get(agent_id) else {
            warn!(agent_id = %agent_id, "interrupt request from unknown agent");
            return;
        };
        let effective_priority = priority * (0.5 + shell.reputation() / 2.0);
        info!(
            agent_id = %agent_id,
            priority,
            effective_priority,
            "interrupt requested"
        );
        self.interrupts.lock().push(InterruptRequest {
            agent_id: agent_id.to_string(),
            effective_priority,
            requested_at: Timestamp::now(),
            payload: payload.to_string(),
        });
    }

    fn request_handoff(&self, sender: &str, target: &str, payload: &str) -> bool {
        if !self.shells.contains_key(target) {
            warn!(sender = %sender, target = %target, "handoff to unknown agent");
            return false;
        }
        info!(sender = %sender, target = %target, "handoff requested");

        {
            let mut state = self.state.lock();
            if state.token_holder.as_deref() == Some(sender) {
                // Transfer the token and let the target speak next.
                state.token_holder = Some(target.to_string());
                if let Some(pos) = state.ring.iter().position(|id| id == target) {
                    state.ring.remove(pos);
                }
                state.ring.push_front(target.to_string());
                state.slice_started = Some(Instant::now());
            }
        }

        self.bus.publish(
            &topics::agent_topic(target),
            serde_json::json!({
                "type": "handoff",
                "from": sender,
                "message": format!("[HANDOFF] {payload}"),
            }),
            Some(sender.to_string()),
        );
        true
    }

    fn mark_complete(&self, agent_id: &str) {
        info!(agent_id = %agent_id, "agent signalled completion");
        let holds_token = self.state.lock().token_holder.as_deref() == Some(agent_id);
        if holds_token {
            self.advance_token();
        }
    }

    fn mark_error(&self, agent_id: &str, details: &str) {
        warn!(agent_id = %agent_id, details = %details, "agent reported error");
        self.record_fault(agent_id, &FaultKind::Error);
    }
}

fn render_payload(payload: &serde_json::Value) -> String {
    match payload {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Object(map) => map
            .get("message")
            .and_then(serde_json::Value::as_str)
            .map_or_else(|| payload.to_string(), str::to_string),
        other => other.to_string(),
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Scheduler")
            .field("roster", &self.roster)
            .field("token_holder", &state.token_holder)
            .field("interrupt_depth", &state.interrupt_depth)
            .finish_non_exhaustive()
    }
}
