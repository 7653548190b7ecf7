//! Long operator sessions: two lines with malfunctions enabled, a rule
//! operator that orders and maintains, recorded and replayed.

use foodline_core::action::Action;
use foodline_core::config::{FactoryConfig, SpawnPolicy};
use foodline_core::engine::Factory;
use foodline_core::query::Observation;
use foodline_core::replay::{ReplayAction, ReplayLog, replay, replay_and_verify};

fn session_config(seed: u64) -> FactoryConfig {
    FactoryConfig {
        seed,
        max_ticks: 400,
        spawn: SpawnPolicy::RoundRobin,
        ..FactoryConfig::default()
    }
}

fn operator(obs: &Observation) -> Action {
    if let Some(s) = obs.stations.iter().find(|s| s.status.is_faulted()) {
        return Action::command(format!("maintain_{}", s.name));
    }
    if obs.tick % 12 == 0 {
        Action::command("produce_pasta")
    } else {
        Action::idle()
    }
}

// ===========================================================================
// Test 1: conservation across a full episode
// ===========================================================================

#[test]
fn operator_session_keeps_the_ledger_balanced() {
    let mut f = Factory::new(session_config(7)).unwrap();
    let (mut obs, _) = f.reset(7);
    let mut steps = 0;

    loop {
        let result = f.step(&operator(&obs));
        steps += 1;
        let ledger = f.ledger();
        assert!(ledger.is_balanced(), "tick {}: {ledger:?}", result.observation.tick);
        obs = result.observation;
        if result.terminal {
            break;
        }
    }

    assert_eq!(steps, 400);
    assert!(f.is_terminal());
    assert!(f.counters().completed > 0);
    assert_eq!(obs.kpis.production, f.counters().completed);
}

// ===========================================================================
// Test 2: record, serialize, replay
// ===========================================================================

#[test]
fn recorded_session_replays_with_matching_hashes() {
    let mut f = Factory::new(session_config(11)).unwrap();
    let mut log = ReplayLog::new(&f).unwrap();
    let mut obs = f.observe();
    let mut total_reward = 0;

    for i in 0..250usize {
        let action = operator(&obs);
        let result = f.step(&action);
        total_reward += result.reward;
        obs = result.observation;
        if i % 25 == 24 {
            log.record_with_hash(ReplayAction::Step(action), f.state_hash());
        } else {
            log.record(ReplayAction::Step(action));
        }
    }

    let bytes = log.serialize().unwrap();
    let restored = ReplayLog::deserialize(&bytes).unwrap();
    assert_eq!(restored.action_count(), 250);

    let verified = replay_and_verify(&restored).unwrap();
    assert!(verified.is_verified, "{:?}", verified.first_mismatch);
    assert_eq!(verified.total_reward, total_reward);

    let replayed = replay(&restored).unwrap();
    assert_eq!(replayed.state_hash(), f.state_hash());
    assert_eq!(replayed.counters(), f.counters());
}

// ===========================================================================
// Test 3: snapshot mid-session, continue both copies
// ===========================================================================

#[test]
fn snapshot_mid_session_continues_identically() {
    let mut live = Factory::new(session_config(3)).unwrap();
    for i in 0..120u64 {
        let action = if i % 12 == 0 {
            Action::command("produce_pasta")
        } else {
            Action::idle()
        };
        live.step(&action);
    }

    let mut restored = Factory::deserialize(&live.serialize().unwrap()).unwrap();
    assert_eq!(restored.state_hash(), live.state_hash());

    for _ in 0..150 {
        let a = operator(&live.observe());
        let b = operator(&restored.observe());
        assert_eq!(a, b);
        live.step(&a);
        restored.step(&b);
    }
    assert_eq!(restored.state_hash(), live.state_hash());
    assert_eq!(restored.observe(), live.observe());
}

// ===========================================================================
// Test 4: JSON-driven session
// ===========================================================================

#[test]
fn json_actions_drive_the_same_run_as_typed_actions() {
    let mut typed = Factory::new(session_config(5)).unwrap();
    let mut wired = Factory::new(session_config(5)).unwrap();

    for i in 0..100u64 {
        if i % 12 == 0 {
            typed.step(&Action::command("produce_pasta"));
            wired.step_json(r#"{"action": "produce_pasta"}"#).unwrap();
        } else if i % 12 == 6 {
            typed.step(&Action::command("produce_tomato"));
            wired.step_json(r#""produce_tomato""#).unwrap();
        } else {
            typed.step(&Action::idle());
            wired.step_json(r#""continue""#).unwrap();
        }
    }
    assert_eq!(typed.state_hash(), wired.state_hash());
}
