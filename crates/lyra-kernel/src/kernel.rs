//! The kernel service and boot sequence.

use crate::config::{KernelConfig, BootstrapRecord};
use crate::error::KernelError;
use crate::worker::{monitor_worker, spawn_worker};
use lyra_agents::{AgentConfig, AgentShell, HttpSpeaker, MockSpeaker, Speaker};
use lyra_bus::{topics, Bus};
use lyra_consensus::{ConsensusEngine, ProposalStatus};
use lyra_core::{AgentId, Timestamp};
use lyra_keyring::Keyring;
use lyra_ledger::Ledger;
use lyra_scheduler::{Scheduler, SchedulerConfig};
use lyra_ticker::Ticker;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::process::Child;
use tokio::sync::Notify;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Entity id the kernel uses for keys, proposals, and bus messages.
const KERNEL_ID: &str = "kernel";

/// Poll interval while awaiting consensus.
const CONSENSUS_POLL_MS: u64 = 100;

/// Kernel lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelState {
    /// Constructed, not yet booting.
    Initializing,
    /// Loading configuration and launching workers.
    Booting,
    /// Awaiting the boot-consensus proposal.
    Consensus,
    /// Boot complete; the system is live.
    Running,
    /// Shutdown in progress or complete.
    ShuttingDown,
}

impl fmt::Display for KernelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Initializing => "initializing",
            Self::Booting => "booting",
            Self::Consensus => "consensus",
            Self::Running => "running",
            Self::ShuttingDown => "shutting_down",
        };
        f.write_str(s)
    }
}

/// The Lyra kernel: composes every runtime component and drives the boot
/// sequence.
pub struct KernelService {
    config: KernelConfig,
    bus: Arc<Bus>,
    ticker: Ticker,
    engine: ConsensusEngine,
    keyring: Arc<Keyring>,
    ledger: Arc<Ledger>,
    state: Mutex<KernelState>,
    roster: Mutex<Vec<AgentConfig>>,
    workers: Mutex<HashMap<AgentId, Child>>,
    ready: Arc<Mutex<HashSet<AgentId>>>,
    pubkeys: Arc<Mutex<HashMap<AgentId, String>>>,
    ready_notify: Arc<Notify>,
    boot_proposal: Mutex<Option<Uuid>>,
    scheduler: Mutex<Option<Arc<Scheduler>>>,
}

impl KernelService {
    /// Creates a kernel and wires the READY handler onto the global bus.
    ///
    /// # Errors
    ///
    /// Fails when the keystore or ledger directory cannot be prepared.
    pub fn new(config: KernelConfig) -> Result<Self, KernelError> {
        let bus = Arc::new(Bus::new());
        let ticker = Ticker::new(bus.clone(), config.tick_interval_ms);
        let engine = ConsensusEngine::new(bus.clone(), config.quorum_threshold);
        let keyring = Arc::new(Keyring::new(&config.keystore_dir)?);
        let ledger = Arc::new(Ledger::new(&config.ledger_dir)?);

        let ready = Arc::new(Mutex::new(HashSet::new()));
        let pubkeys = Arc::new(Mutex::new(HashMap::new()));
        let ready_notify = Arc::new(Notify::new());

        // READY announcements arrive on the global bus, either republished
        // by the worker stdout monitors or sent by in-process agents.
        {
            let ready = ready.clone();
            let pubkeys = pubkeys.clone();
            let notify = ready_notify.clone();
            bus.register_handler(topics::GLOBAL, move |message| {
                let ready = ready.clone();
                let pubkeys = pubkeys.clone();
                let notify = notify.clone();
                async move {
                    let is_ready = message.payload.get("type").and_then(|v| v.as_str())
                        == Some("READY");
                    if !is_ready {
                        return;
                    }
                    let agent_id = message
                        .payload
                        .get("agent_id")
                        .and_then(|v| v.as_str())
                        .map(str::to_string)
                        .or_else(|| message.sender.clone());
                    let Some(agent_id) = agent_id else {
                        warn!("READY announcement without agent id");
                        return;
                    };

                    if !ready.lock().insert(agent_id.clone()) {
                        return;
                    }
                    if let Some(pubkey) = message.payload.get("pubkey").and_then(|v| v.as_str()) {
                        if !pubkey.is_empty() {
                            pubkeys.lock().insert(agent_id.clone(), pubkey.to_string());
                        }
                    }
                    info!(agent_id = %agent_id, "agent is ready");
                    notify.notify_waiters();
                }
            });
        }

        info!("kernel service initialized");
        Ok(Self {
            config,
            bus,
            ticker,
            engine,
            keyring,
            ledger,
            state: Mutex::new(KernelState::Initializing),
            roster: Mutex::new(Vec::new()),
            workers: Mutex::new(HashMap::new()),
            ready,
            pubkeys,
            ready_notify,
            boot_proposal: Mutex::new(None),
            scheduler: Mutex::new(None),
        })
    }

    /// Runs the boot sequence through to RUNNING.
    ///
    /// # Errors
    ///
    /// Fatal on configuration errors and on required agents missing their
    /// READY deadline. A boot proposal that fails to reach quorum is *not*
    /// fatal: the kernel logs it and continues in degraded mode.
    pub async fn boot(&self) -> Result<(), KernelError> {
        info!("booting lyra kernel");
        *self.state.lock() = KernelState::Booting;

        let roster = BootstrapRecord::load(&self.config.config_path)?.resolve()?;
        for agent in &roster {
            self.bus.create_mailbox(&agent.id);
            self.bus.subscribe(&agent.id, &topics::agent_topic(&agent.id));
            self.bus.subscribe(&agent.id, topics::GLOBAL);
        }
        *self.roster.lock() = roster.clone();

        self.engine.start();
        self.ticker.start();

        self.build_scheduler(&roster)?;
        self.launch_workers(&roster);

        let required: HashSet<AgentId> = roster
            .iter()
            .filter(|a| a.required)
            .map(|a| a.id.clone())
            .collect();
        self.wait_for_ready(&required).await?;

        *self.state.lock() = KernelState::Consensus;

        // The engine votes with ledger trust, not its 1.0 default.
        for agent in &roster {
            self.engine
                .set_agent_weight(&agent.id, self.ledger.trust_weight(&agent.id));
        }

        let proposal_id = self.propose_boot_consensus()?;
        *self.boot_proposal.lock() = Some(proposal_id);

        if self.await_consensus(proposal_id).await {
            self.pin_boot_record(proposal_id);
        } else {
            warn!(
                proposal_id = %proposal_id,
                "boot consensus not reached, continuing in degraded mode"
            );
        }

        *self.state.lock() = KernelState::Running;
        info!("lyra kernel is now running");
        Ok(())
    }

    fn build_scheduler(&self, roster: &[AgentConfig]) -> Result<(), KernelError> {
        let mut shells = Vec::with_capacity(roster.len());
        for config in roster {
            let speaker: Box<dyn Speaker> = match &config.endpoint {
                Some(endpoint) => Box::new(HttpSpeaker::new(endpoint, &config.model)?),
                None => {
                    let mut mock = MockSpeaker::new(&config.id);
                    if let Some(specialty) = &config.specialty {
                        mock = mock.with_specialty(specialty);
                    }
                    Box::new(mock)
                }
            };
            shells.push(Arc::new(AgentShell::new(config.clone(), speaker)));
        }

        let scheduler = Arc::new(
            Scheduler::new(
                self.bus.clone(),
                self.engine.clone(),
                shells,
                SchedulerConfig::default(),
            )
            .with_ledger(self.ledger.clone()),
        );
        *self.scheduler.lock() = Some(scheduler);
        Ok(())
    }

    fn launch_workers(&self, roster: &[AgentConfig]) {
        let program: PathBuf = match &self.config.worker_program {
            Some(program) => program.clone(),
            None => match std::env::current_exe() {
                Ok(exe) => exe,
                Err(err) => {
                    error!(error = %err, "cannot resolve worker program");
                    return;
                }
            },
        };

        for agent in roster {
            match spawn_worker(&program, &agent.model, &agent.id) {
                Ok(mut child) => {
                    monitor_worker(self.bus.clone(), agent.id.clone(), &mut child);
                    self.workers.lock().insert(agent.id.clone(), child);
                }
                Err(err) => {
                    error!(agent_id = %agent.id, error = %err, "failed to launch worker");
                }
            }
        }
    }

    async fn wait_for_ready(&self, required: &HashSet<AgentId>) -> Result<(), KernelError> {
        let deadline = Instant::now() + self.config.boot_timeout;
        loop {
            let notified = self.ready_notify.notified();
            {
                let ready = self.ready.lock();
                if required.iter().all(|id| ready.contains(id)) {
                    info!("all required agents are ready");
                    return Ok(());
                }
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                let ready = self.ready.lock();
                let mut missing: Vec<&str> = required
                    .iter()
                    .filter(|id| !ready.contains(*id))
                    .map(String::as_str)
                    .collect();
                missing.sort_unstable();
                return Err(KernelError::BootTimeout(missing.join(", ")));
            }
            let _ = tokio::time::timeout(
                remaining.min(std::time::Duration::from_millis(100)),
                notified,
            )
            .await;
        }
    }

    fn propose_boot_consensus(&self) -> Result<Uuid, KernelError> {
        info!("proposing boot consensus");

        let mut agents: Vec<AgentId> = self.ready.lock().iter().cloned().collect();
        agents.sort_unstable();
        let content = serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "timestamp": Timestamp::now().as_secs_f64(),
            "agents": agents,
        });

        // Sign the proposal content with the kernel's own key.
        self.keyring.get_or_create(KERNEL_ID)?;
        let signature = self.keyring.sign(KERNEL_ID, content.to_string().as_bytes())?;

        let mut metadata = HashMap::new();
        metadata.insert(
            "agent_pubkeys".to_string(),
            serde_json::to_value(&*self.pubkeys.lock())
                .map_err(lyra_consensus::ConsensusError::from)?,
        );
        metadata.insert("kernel_signature".to_string(), serde_json::json!(signature));

        let proposal_id = self.engine.create_proposal(
            "BOOT_CONSENSUS",
            content,
            KERNEL_ID,
            Some(self.config.boot_timeout),
            metadata,
        )?;
        Ok(proposal_id)
    }

    async fn await_consensus(&self, proposal_id: Uuid) -> bool {
        let deadline = Instant::now() + self.config.boot_timeout;
        while Instant::now() < deadline {
            match self.engine.proposal_status(proposal_id) {
                Some(ProposalStatus::Approved) => return true,
                Some(ProposalStatus::Rejected | ProposalStatus::Expired) => return false,
                _ => {}
            }
            tokio::time::sleep(std::time::Duration::from_millis(CONSENSUS_POLL_MS)).await;
        }
        warn!(proposal_id = %proposal_id, "timed out waiting for boot consensus");
        false
    }

    fn pin_boot_record(&self, proposal_id: Uuid) {
        let pubkeys = self.pubkeys.lock().clone();
        let mut keys: Vec<&str> = pubkeys.values().map(String::as_str).collect();
        keys.sort_unstable();

        let cid = self.ledger.consensus_cid(&keys);
        let mut agents: Vec<&str> = pubkeys.keys().map(String::as_str).collect();
        agents.sort_unstable();

        self.ledger.pin_as(
            &cid,
            serde_json::json!({
                "proposal_id": proposal_id,
                "agents": agents,
                "agent_pubkeys": pubkeys,
                "approved_at": Timestamp::now().as_secs_f64(),
            }),
        );
        info!(cid = %cid, "boot consensus pinned");
    }

    /// Shuts the kernel down: stops the ticker and engine and terminates
    /// worker processes. Idempotent.
    pub fn shutdown(&self) {
        {
            let mut state = self.state.lock();
            if *state == KernelState::ShuttingDown {
                return;
            }
            *state = KernelState::ShuttingDown;
        }

        if let Some(scheduler) = self.scheduler.lock().as_ref() {
            scheduler.stop();
        }
        self.ticker.stop();
        self.engine.stop();

        for (agent_id, mut child) in self.workers.lock().drain() {
            match child.start_kill() {
                Ok(()) => info!(agent_id = %agent_id, "terminated worker"),
                Err(err) => warn!(agent_id = %agent_id, error = %err, "error terminating worker"),
            }
        }
        info!("lyra kernel has been shut down");
    }

    /// Current lifecycle state.
    pub fn state(&self) -> KernelState {
        *self.state.lock()
    }

    /// The shared bus.
    pub fn bus(&self) -> Arc<Bus> {
        self.bus.clone()
    }

    /// The consensus engine.
    pub fn engine(&self) -> ConsensusEngine {
        self.engine.clone()
    }

    /// The ledger.
    pub fn ledger(&self) -> Arc<Ledger> {
        self.ledger.clone()
    }

    /// The keyring.
    pub fn keyring(&self) -> Arc<Keyring> {
        self.keyring.clone()
    }

    /// The scheduler, once boot has constructed it.
    pub fn scheduler(&self) -> Option<Arc<Scheduler>> {
        self.scheduler.lock().clone()
    }

    /// Agents that have announced READY.
    pub fn ready_agents(&self) -> HashSet<AgentId> {
        self.ready.lock().clone()
    }

    /// Public keys collected from READY handshakes.
    pub fn agent_pubkeys(&self) -> HashMap<AgentId, String> {
        self.pubkeys.lock().clone()
    }

    /// The boot-consensus proposal id, once created.
    pub fn boot_proposal(&self) -> Option<Uuid> {
        *self.boot_proposal.lock()
    }
}

impl fmt::Debug for KernelService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelService")
            .field("state", &self.state())
            .field("ready", &self.ready.lock().len())
            .finish_non_exhaustive()
    }
}
