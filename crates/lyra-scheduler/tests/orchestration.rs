//! End-to-end orchestration scenarios.

use lyra_agents::{AgentConfig, AgentShell, InterruptSink, MockSpeaker};
use lyra_bus::{topics, Bus};
use lyra_consensus::{ConsensusEngine, ProposalStatus, VoteType, DEFAULT_QUORUM_THRESHOLD};
use lyra_scheduler::{Scheduler, SchedulerConfig, SchedulerError};
use std::sync::Arc;
use std::time::Duration;

const OBSERVER: &str = "observer";

fn fast_config() -> SchedulerConfig {
    SchedulerConfig {
        max_turn: Duration::from_millis(100),
        // Large enough that only priority >= threshold preempts in tests.
        min_slice: Duration::from_secs(10),
        inter_turn_delay: Duration::from_millis(1),
        ..SchedulerConfig::default()
    }
}

fn build(
    agents: Vec<(&str, MockSpeaker)>,
    config: SchedulerConfig,
) -> (Arc<Bus>, ConsensusEngine, Arc<Scheduler>) {
    let bus = Arc::new(Bus::new());
    let engine = ConsensusEngine::new(bus.clone(), DEFAULT_QUORUM_THRESHOLD);
    let shells = agents
        .into_iter()
        .map(|(id, speaker)| {
            Arc::new(AgentShell::new(
                AgentConfig::new(id, "llama3"),
                Box::new(speaker),
            ))
        })
        .collect();
    let scheduler = Arc::new(Scheduler::new(bus.clone(), engine.clone(), shells, config));
    (bus, engine, scheduler)
}

fn speakers(scheduler: &Scheduler) -> Vec<String> {
    scheduler
        .conversation_log()
        .into_iter()
        .filter(|e| e.turn > 0)
        .map(|e| e.agent)
        .collect()
}

#[tokio::test]
async fn round_robin_of_three() {
    let (_bus, _engine, scheduler) = build(
        vec![
            ("a", MockSpeaker::new("a")),
            ("b", MockSpeaker::new("b")),
            ("c", MockSpeaker::new("c")),
        ],
        fast_config(),
    );

    // Sample token holders while the rotation runs: always exactly one.
    let sampler = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move {
            for _ in 0..50 {
                if scheduler.is_running() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            let mut holders = Vec::new();
            while scheduler.is_running() {
                if let Some(holder) = scheduler.token_holder() {
                    holders.push(holder);
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            holders
        })
    };

    scheduler.run("hi", 6).await.unwrap();

    let holders = sampler.await.unwrap();
    assert!(holders.iter().all(|h| ["a", "b", "c"].contains(&h.as_str())));

    assert_eq!(speakers(&scheduler), ["a", "b", "c", "a", "b", "c"]);
    assert_eq!(scheduler.interrupt_depth(), 0);
}

#[tokio::test]
async fn high_priority_preemption() {
    let (_bus, _engine, scheduler) = build(
        vec![
            ("a", MockSpeaker::new("a")),
            ("b", MockSpeaker::new("b")),
            ("c", MockSpeaker::new("c")),
        ],
        fast_config(),
    );

    // B asks to cut in during A's slice with priority 95.
    scheduler.request_interrupt("b", 95.0, "step in");

    scheduler.run("hi", 6).await.unwrap();

    // A is pre-empted after its slice, B speaks, A resumes, then the
    // rotation continues with C; B's regular slot was consumed.
    assert_eq!(speakers(&scheduler), ["a", "b", "a", "c", "a", "b"]);
    assert_eq!(scheduler.interrupt_depth(), 0);
    assert_eq!(scheduler.pending_interrupts(), 0);
}

#[tokio::test]
async fn timeout_leader_election() {
    let (bus, _engine, scheduler) = build(
        vec![
            ("a", MockSpeaker::new("a").with_delay(Duration::from_millis(500))),
            ("b", MockSpeaker::new("b")),
            ("c", MockSpeaker::new("c")),
        ],
        SchedulerConfig {
            max_turn: Duration::from_millis(50),
            ..fast_config()
        },
    );
    bus.subscribe(OBSERVER, topics::GLOBAL);

    // a times out on each of its three turns; the third triggers election.
    scheduler.run("hi", 7).await.unwrap();

    assert_eq!(scheduler.leader(), Some("b".to_string()));

    let reputation = scheduler.reputation("a").unwrap();
    assert!(
        reputation <= 0.4 + 1e-9,
        "expected at least 0.6 total decay, reputation is {reputation}"
    );

    // Placeholder responses stand in for the timed-out turns.
    let log = scheduler.conversation_log();
    assert!(log
        .iter()
        .any(|e| e.agent == "a" && e.message.contains("timed out")));

    // The election is announced on the global bus.
    let announced = bus
        .get_mailbox(OBSERVER)
        .unwrap()
        .drain()
        .into_iter()
        .any(|m| m.payload["type"] == "leader_elected" && m.payload["leader"] == "b");
    assert!(announced, "missing leader_elected announcement");
}

#[tokio::test]
async fn handoff_transfers_token_and_tags_payload() {
    let (_bus, _engine, scheduler) = build(
        vec![
            ("a", MockSpeaker::new("a")),
            ("b", MockSpeaker::new("b")),
            ("c", MockSpeaker::new("c")),
        ],
        fast_config(),
    );

    scheduler.run("hi", 1).await.unwrap();
    assert_eq!(scheduler.token_holder(), Some("b".to_string()));

    // b holds the token and hands off to c.
    assert!(scheduler.request_handoff("b", "c", "take the floor"));
    assert_eq!(scheduler.token_holder(), Some("c".to_string()));

    scheduler.run("continue", 1).await.unwrap();
    assert_eq!(speakers(&scheduler), ["a", "c"]);

    // The tagged handoff payload reached c's prompt context; the mock
    // speaker echoes the tail of its prompt back.
    let response = scheduler
        .conversation_log()
        .into_iter()
        .find(|e| e.agent == "c")
        .unwrap();
    assert!(response.message.contains("take the floor"));
}

#[tokio::test]
async fn handoff_to_unknown_agent_is_refused() {
    let (_bus, _engine, scheduler) = build(
        vec![("a", MockSpeaker::new("a")), ("b", MockSpeaker::new("b"))],
        fast_config(),
    );
    assert!(!scheduler.request_handoff("a", "ghost", "anyone there"));
}

#[tokio::test]
async fn handoff_from_non_holder_only_delivers_message() {
    let (bus, _engine, scheduler) = build(
        vec![("a", MockSpeaker::new("a")), ("b", MockSpeaker::new("b"))],
        fast_config(),
    );

    assert!(scheduler.request_handoff("a", "b", "fyi"));
    // No token was held, so none was transferred.
    assert_eq!(scheduler.token_holder(), None);

    let delivered = bus
        .get_mailbox("b")
        .unwrap()
        .drain()
        .into_iter()
        .any(|m| m.payload["message"]
            .as_str()
            .is_some_and(|s| s.starts_with("[HANDOFF]")));
    assert!(delivered);
}

#[tokio::test]
async fn interrupt_depth_is_capped() {
    let (_bus, _engine, scheduler) = build(
        vec![
            ("a", MockSpeaker::new("a")),
            ("b", MockSpeaker::new("b")),
            ("c", MockSpeaker::new("c")),
        ],
        fast_config(),
    );

    // Far more qualifying interrupts than the depth cap allows.
    for _ in 0..5 {
        scheduler.request_interrupt("c", 95.0, "again");
    }

    scheduler.run("hi", 8).await.unwrap();

    // The flush reset nesting and cleared the heap.
    assert_eq!(scheduler.interrupt_depth(), 0);
    assert_eq!(scheduler.pending_interrupts(), 0);
}

#[tokio::test]
async fn urgency_scan_preempts_specialist() {
    let bus = Arc::new(Bus::new());
    let engine = ConsensusEngine::new(bus.clone(), DEFAULT_QUORUM_THRESHOLD);
    let shells = vec![
        Arc::new(AgentShell::new(
            AgentConfig::new("otto", "llama3"),
            Box::new(MockSpeaker::new("otto")),
        )),
        Arc::new(AgentShell::new(
            AgentConfig::new("sentinel", "llama3").with_interrupt_keywords(["breach"]),
            Box::new(MockSpeaker::new("sentinel")),
        )),
    ];
    let scheduler = Scheduler::new(bus, engine, shells, fast_config());

    scheduler.run("status check: we may have a breach", 2).await.unwrap();

    // The specialist cut in right after the first turn.
    assert_eq!(speakers(&scheduler), ["otto", "sentinel"]);
}

#[tokio::test]
async fn reputation_changes_mirror_into_ledger_and_engine() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = Arc::new(lyra_ledger::Ledger::new(dir.path()).unwrap());

    let bus = Arc::new(Bus::new());
    let engine = ConsensusEngine::new(bus.clone(), DEFAULT_QUORUM_THRESHOLD);
    let shells = vec![Arc::new(AgentShell::new(
        AgentConfig::new("a", "llama3"),
        Box::new(MockSpeaker::new("a")),
    ))];
    let scheduler =
        Scheduler::new(bus, engine, shells, fast_config()).with_ledger(ledger.clone());

    ledger.set_trust_weight("a", 0.5);
    scheduler.adjust_reputation("a", -0.2);

    // Reputation clamps to [0, 1]; trust follows within its band.
    assert!((scheduler.reputation("a").unwrap() - 0.8).abs() < 1e-9);
    assert!((ledger.trust_weight("a") - 0.3).abs() < 1e-9);

    scheduler.adjust_reputation("a", -5.0);
    assert_eq!(scheduler.reputation("a").unwrap(), 0.0);
    // Ledger trust bottoms out at its band floor, not zero.
    assert!((ledger.trust_weight("a") - 0.1).abs() < 1e-9);
}

#[tokio::test]
async fn consensus_ballot_round_trip() {
    let (bus, engine, scheduler) = build(
        vec![("a", MockSpeaker::new("a")), ("b", MockSpeaker::new("b"))],
        fast_config(),
    );
    engine.start();
    bus.subscribe(OBSERVER, topics::GLOBAL);

    let proposal_id = scheduler
        .start_consensus_ballot(serde_json::json!("adopt the new routing policy"))
        .unwrap();

    // A second ballot is refused while the first is open.
    assert!(matches!(
        scheduler.start_consensus_ballot(serde_json::json!("another")),
        Err(SchedulerError::BallotInProgress)
    ));

    // Wait for the engine to open voting.
    wait_for(|| engine.proposal_status(proposal_id) == Some(ProposalStatus::Voting)).await;

    scheduler.register_vote("a", proposal_id, VoteType::Approve).unwrap();
    wait_for(|| engine.proposal_status(proposal_id) == Some(ProposalStatus::Approved)).await;

    // The scheduler announces the result on the global bus.
    wait_for(|| {
        bus.get_mailbox(OBSERVER)
            .unwrap()
            .drain()
            .into_iter()
            .any(|m| m.payload["type"] == "consensus_result")
    })
    .await;

    // The ballot guard is released for the next proposal.
    wait_for(|| {
        scheduler
            .start_consensus_ballot(serde_json::json!("follow-up"))
            .is_ok()
    })
    .await;

    engine.stop();
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached within deadline");
}
