//! The consensus engine: proposal/vote tables and quorum detection.

use crate::error::ConsensusError;
use crate::event::{
    HardLock, ProposalCreated, QuorumReached, SoftLock, StatusChanged, VoteReceived,
};
use crate::proposal::{Proposal, ProposalStatus, Vote, VoteSubmission, VoteType};
use lyra_bus::{topics, Bus, Message};
use lyra_core::{AgentId, Timestamp};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default weighted-majority threshold.
pub const DEFAULT_QUORUM_THRESHOLD: f64 = 0.66;

/// Subscriber id the engine registers on the bus.
pub const ENGINE_SUBSCRIBER_ID: &str = "consensus_engine";

/// Vote weight assumed for agents absent from the engine's weight table.
///
/// Deliberately `1.0` rather than the ledger's `0.5` default: the kernel
/// populates this table from ledger trust at boot.
const DEFAULT_VOTE_WEIGHT: f64 = 1.0;

#[derive(Default)]
struct Tables {
    proposals: RwLock<HashMap<Uuid, Proposal>>,
    votes: RwLock<HashMap<Uuid, HashMap<AgentId, Vote>>>,
    weights: RwLock<HashMap<AgentId, f64>>,
}

/// Consensus engine for the Lyra runtime.
///
/// Cloning is cheap; all clones share the same tables and drive task.
#[derive(Clone)]
pub struct ConsensusEngine {
    bus: Arc<Bus>,
    quorum_threshold: f64,
    tables: Arc<Tables>,
    running: Arc<AtomicBool>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl ConsensusEngine {
    /// Creates a new engine and subscribes it to the consensus topics and
    /// the ticker (for expiry sweeps).
    pub fn new(bus: Arc<Bus>, quorum_threshold: f64) -> Self {
        bus.subscribe(ENGINE_SUBSCRIBER_ID, topics::CONSENSUS_PROPOSAL);
        bus.subscribe(ENGINE_SUBSCRIBER_ID, topics::CONSENSUS_VOTE);
        bus.subscribe(ENGINE_SUBSCRIBER_ID, topics::TICKER);

        info!(quorum_threshold, "consensus engine initialized");
        Self {
            bus,
            quorum_threshold,
            tables: Arc::new(Tables::default()),
            running: Arc::new(AtomicBool::new(false)),
            task: Arc::new(Mutex::new(None)),
        }
    }

    /// Starts the engine's drive loop. Starting twice is a warning no-op.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("consensus engine is already running");
            return;
        }

        let engine = self.clone();
        let handle = tokio::spawn(async move {
            while engine.running.load(Ordering::SeqCst) {
                match engine.bus.next_message(ENGINE_SUBSCRIBER_ID).await {
                    Ok(message) => engine.dispatch(message),
                    Err(err) => {
                        warn!(error = %err, "consensus engine lost its mailbox");
                        break;
                    }
                }
            }
        });

        *self.task.lock() = Some(handle);
        info!("consensus engine started");
    }

    /// Stops the drive loop. Idempotent.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
        }
        info!("consensus engine stopped");
    }

    /// Returns true while the drive loop is active.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn dispatch(&self, message: Message) {
        match message.topic.as_str() {
            topics::CONSENSUS_PROPOSAL => self.handle_proposal(&message),
            topics::CONSENSUS_VOTE => self.handle_vote(&message),
            topics::TICKER => self.expire_stale(),
            other => debug!(topic = %other, "ignoring unexpected topic"),
        }
    }

    fn handle_proposal(&self, message: &Message) {
        let mut proposal: Proposal = match message.decode() {
            Ok(proposal) => proposal,
            Err(err) => {
                warn!(error = %err, "invalid proposal format, discarding");
                return;
            }
        };
        proposal.status = ProposalStatus::Pending;
        let proposal_id = proposal.id;

        self.tables
            .proposals
            .write()
            .insert(proposal_id, proposal.clone());
        self.tables
            .votes
            .write()
            .entry(proposal_id)
            .or_default();

        self.emit(
            ProposalCreated::KIND,
            &ProposalCreated {
                proposal: proposal.clone(),
                proposal_id,
                timestamp: Timestamp::now(),
            },
        );
        info!(proposal_id = %proposal_id, kind = %proposal.kind, "new proposal created");

        // Open for votes immediately after creation.
        self.update_status(proposal_id, ProposalStatus::Voting);
    }

    fn handle_vote(&self, message: &Message) {
        let submission: VoteSubmission = match message.decode() {
            Ok(submission) => submission,
            Err(err) => {
                warn!(error = %err, "invalid vote format, discarding");
                return;
            }
        };

        let Some(agent_id) = submission.agent_id.or_else(|| message.sender.clone()) else {
            warn!(proposal_id = %submission.proposal_id, "vote without agent id, discarding");
            return;
        };

        let status = self
            .tables
            .proposals
            .read()
            .get(&submission.proposal_id)
            .map(|p| p.status);
        match status {
            None => {
                warn!(proposal_id = %submission.proposal_id, "vote for unknown proposal, discarding");
                return;
            }
            Some(ProposalStatus::Voting) => {}
            Some(status) => {
                warn!(
                    proposal_id = %submission.proposal_id,
                    status = %status,
                    "vote for non-voting proposal, discarding"
                );
                return;
            }
        }

        let Ok(vote_type) = submission.vote_type.parse::<VoteType>() else {
            warn!(vote_type = %submission.vote_type, "invalid vote type, discarding");
            return;
        };

        let vote = Vote {
            id: Uuid::new_v4(),
            proposal_id: submission.proposal_id,
            agent_id: agent_id.clone(),
            vote_type,
            rationale: submission.rationale,
            signature: submission.signature,
            timestamp: Timestamp::now(),
        };

        // Latest vote from an agent replaces any earlier one.
        self.tables
            .votes
            .write()
            .entry(submission.proposal_id)
            .or_default()
            .insert(agent_id.clone(), vote.clone());

        self.emit(
            VoteReceived::KIND,
            &VoteReceived {
                proposal_id: vote.proposal_id,
                vote,
                timestamp: Timestamp::now(),
            },
        );
        info!(
            agent_id = %agent_id,
            proposal_id = %submission.proposal_id,
            vote_type = %vote_type,
            "vote received"
        );

        self.check_quorum(submission.proposal_id);
    }

    fn check_quorum(&self, proposal_id: Uuid) {
        let still_voting = self
            .tables
            .proposals
            .read()
            .get(&proposal_id)
            .is_some_and(|p| p.status == ProposalStatus::Voting);
        if !still_voting {
            return;
        }

        let votes: Vec<Vote> = self
            .tables
            .votes
            .read()
            .get(&proposal_id)
            .map(|by_agent| by_agent.values().cloned().collect())
            .unwrap_or_default();
        if votes.is_empty() {
            return;
        }

        let weights = self.tables.weights.read();
        let mut approve_weight = 0.0;
        let mut reject_weight = 0.0;
        let mut total_weight = 0.0;
        for vote in &votes {
            let weight = weights
                .get(&vote.agent_id)
                .copied()
                .unwrap_or(DEFAULT_VOTE_WEIGHT);
            total_weight += weight;
            match vote.vote_type {
                VoteType::Approve => approve_weight += weight,
                VoteType::Reject => reject_weight += weight,
                VoteType::Abstain => {}
            }
        }
        drop(weights);

        if total_weight <= 0.0 {
            return;
        }

        let approve_ratio = approve_weight / total_weight;
        let reject_ratio = reject_weight / total_weight;

        let result = if approve_ratio >= self.quorum_threshold {
            Some((ProposalStatus::Approved, VoteType::Approve, approve_ratio))
        } else if reject_ratio >= self.quorum_threshold {
            Some((ProposalStatus::Rejected, VoteType::Reject, reject_ratio))
        } else {
            None
        };

        if let Some((status, winner, ratio)) = result {
            self.update_status(proposal_id, status);
            self.emit(
                QuorumReached::KIND,
                &QuorumReached {
                    proposal_id,
                    result: winner,
                    votes,
                    timestamp: Timestamp::now(),
                },
            );
            info!(
                proposal_id = %proposal_id,
                result = %winner,
                ratio = format!("{ratio:.2}"),
                "quorum reached"
            );
        }
    }

    fn expire_stale(&self) {
        let expired: Vec<Uuid> = self
            .tables
            .proposals
            .read()
            .values()
            .filter(|p| !p.status.is_terminal() && p.is_expired())
            .map(|p| p.id)
            .collect();
        for proposal_id in expired {
            warn!(proposal_id = %proposal_id, "proposal expired before quorum");
            self.update_status(proposal_id, ProposalStatus::Expired);
        }
    }

    fn update_status(&self, proposal_id: Uuid, new_status: ProposalStatus) {
        let mut proposals = self.tables.proposals.write();
        let Some(proposal) = proposals.get_mut(&proposal_id) else {
            return;
        };
        let old_status = proposal.status;
        if old_status == new_status {
            return;
        }
        if !old_status.can_transition_to(new_status) {
            warn!(
                proposal_id = %proposal_id,
                from = %old_status,
                to = %new_status,
                "refusing backward status transition"
            );
            return;
        }
        proposal.status = new_status;
        drop(proposals);

        self.emit(
            StatusChanged::KIND,
            &StatusChanged {
                proposal_id,
                old_status,
                new_status,
                timestamp: Timestamp::now(),
            },
        );
        info!(
            proposal_id = %proposal_id,
            from = %old_status,
            to = %new_status,
            "proposal status changed"
        );
    }

    /// Creates and publishes a new proposal, returning its id.
    ///
    /// The proposal becomes visible in [`proposal_status`](Self::proposal_status)
    /// once the drive loop has processed it.
    ///
    /// # Errors
    ///
    /// Returns an error if the proposal cannot be encoded.
    pub fn create_proposal(
        &self,
        kind: &str,
        content: serde_json::Value,
        proposer: &str,
        expires_in: Option<Duration>,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Result<Uuid, ConsensusError> {
        let expires_at = expires_in
            .map(|d| Timestamp::from_millis(Timestamp::now().as_millis() + d.as_millis() as i64));
        let proposal = Proposal::new(kind, content, proposer, expires_at, metadata);
        let proposal_id = proposal.id;

        self.bus.publish(
            topics::CONSENSUS_PROPOSAL,
            serde_json::to_value(&proposal)?,
            Some(proposer.to_string()),
        );
        Ok(proposal_id)
    }

    /// Publishes a vote on a proposal.
    ///
    /// # Errors
    ///
    /// Returns an error if the submission cannot be encoded.
    pub fn cast_vote(
        &self,
        proposal_id: Uuid,
        agent_id: &str,
        vote_type: VoteType,
        rationale: Option<String>,
        signature: Option<String>,
    ) -> Result<(), ConsensusError> {
        let submission = VoteSubmission {
            proposal_id,
            agent_id: Some(agent_id.to_string()),
            vote_type: vote_type.to_string(),
            rationale,
            signature,
        };
        self.bus.publish(
            topics::CONSENSUS_VOTE,
            serde_json::to_value(&submission)?,
            Some(agent_id.to_string()),
        );
        Ok(())
    }

    /// Sets an agent's vote weight, clamped to `[0, 1]`.
    pub fn set_agent_weight(&self, agent_id: &str, weight: f64) {
        let weight = weight.clamp(0.0, 1.0);
        self.tables
            .weights
            .write()
            .insert(agent_id.to_string(), weight);
        debug!(agent_id = %agent_id, weight, "set vote weight");
    }

    /// Current status of a proposal, if known to the engine.
    pub fn proposal_status(&self, proposal_id: Uuid) -> Option<ProposalStatus> {
        self.tables
            .proposals
            .read()
            .get(&proposal_id)
            .map(|p| p.status)
    }

    /// A snapshot of a proposal, if known to the engine.
    pub fn proposal(&self, proposal_id: Uuid) -> Option<Proposal> {
        self.tables.proposals.read().get(&proposal_id).cloned()
    }

    /// Number of counted votes on a proposal.
    pub fn vote_count(&self, proposal_id: Uuid) -> usize {
        self.tables
            .votes
            .read()
            .get(&proposal_id)
            .map_or(0, HashMap::len)
    }

    /// Emits a time-bounded pause of proposal acceptance.
    pub fn emit_soft_lock(&self, proposal_id: Uuid, duration: Duration, reason: &str) {
        warn!(duration_secs = duration.as_secs_f64(), reason = %reason, "soft lock initiated");
        self.emit(
            SoftLock::KIND,
            &SoftLock {
                proposal_id,
                duration_secs: duration.as_secs_f64(),
                reason: reason.to_string(),
                timestamp: Timestamp::now(),
            },
        );
    }

    /// Emits an irreversible pause of proposal acceptance.
    pub fn emit_hard_lock(&self, proposal_id: Uuid, reason: &str, shutdown_requested: bool) {
        warn!(reason = %reason, shutdown_requested, "hard lock initiated");
        self.emit(
            HardLock::KIND,
            &HardLock {
                proposal_id,
                reason: reason.to_string(),
                shutdown_requested,
                timestamp: Timestamp::now(),
            },
        );
    }

    fn emit<E: serde::Serialize>(&self, kind: &str, event: &E) {
        match serde_json::to_value(event) {
            Ok(payload) => self.bus.publish(
                &topics::consensus_event(kind),
                payload,
                Some(ENGINE_SUBSCRIBER_ID.to_string()),
            ),
            Err(err) => warn!(kind = %kind, error = %err, "failed to encode consensus event"),
        }
    }
}

impl std::fmt::Debug for ConsensusEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsensusEngine")
            .field("quorum_threshold", &self.quorum_threshold)
            .field("proposals", &self.tables.proposals.read().len())
            .field("running", &self.is_running())
            .finish()
    }
}
