//! Action recording and playback.
//!
//! A [`ReplayLog`] starts from a factory snapshot and lists every reset and
//! step applied since. Playing it back reproduces the run exactly, and
//! recorded state hashes pinpoint the first step where a replay diverges.

use crate::action::Action;
use crate::engine::Factory;
use crate::serialize::{DeserializeError, SerializeError};

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ReplayAction {
    Reset { seed: u64 },
    Step(Action),
}

/// Where verification failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayMismatch {
    pub action_index: usize,
    pub expected_hash: u64,
    pub actual_hash: u64,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ReplayLog {
    /// Factory state when recording started.
    pub initial_snapshot: Vec<u8>,
    pub actions: Vec<ReplayAction>,
    /// `(action_index, state_hash)` pairs, in action order.
    pub hash_checkpoints: Vec<(usize, u64)>,
}

impl ReplayLog {
    pub fn new(factory: &Factory) -> Result<Self, SerializeError> {
        Ok(Self {
            initial_snapshot: factory.serialize()?,
            actions: Vec::new(),
            hash_checkpoints: Vec::new(),
        })
    }

    pub fn record(&mut self, action: ReplayAction) {
        self.actions.push(action);
    }

    pub fn record_with_hash(&mut self, action: ReplayAction, hash: u64) {
        self.hash_checkpoints.push((self.actions.len(), hash));
        self.actions.push(action);
    }

    pub fn action_count(&self) -> usize {
        self.actions.len()
    }

    pub fn serialize(&self) -> Result<Vec<u8>, SerializeError> {
        bitcode::serialize(self).map_err(|e| SerializeError::Encode(e.to_string()))
    }

    pub fn deserialize(data: &[u8]) -> Result<Self, DeserializeError> {
        bitcode::deserialize(data).map_err(|e| DeserializeError::Decode(e.to_string()))
    }
}

/// Outcome of [`replay_and_verify`].
#[derive(Debug)]
pub struct ReplayResult {
    pub actions_executed: usize,
    pub is_verified: bool,
    pub first_mismatch: Option<ReplayMismatch>,
    /// Sum of step rewards over the replay.
    pub total_reward: i64,
}

fn apply(factory: &mut Factory, action: &ReplayAction) -> i64 {
    match action {
        ReplayAction::Reset { seed } => {
            factory.reset(*seed);
            0
        }
        ReplayAction::Step(a) => factory.step(a).reward,
    }
}

/// Restore the initial snapshot, run every action and compare state hashes
/// at each checkpoint.
pub fn replay_and_verify(log: &ReplayLog) -> Result<ReplayResult, DeserializeError> {
    let mut factory = Factory::deserialize(&log.initial_snapshot)?;
    let mut first_mismatch = None;
    let mut total_reward = 0;
    let mut checkpoints = log.hash_checkpoints.iter().peekable();

    for (i, action) in log.actions.iter().enumerate() {
        total_reward += apply(&mut factory, action);
        while let Some(&&(index, expected_hash)) = checkpoints.peek() {
            if index != i {
                break;
            }
            let actual_hash = factory.state_hash();
            if actual_hash != expected_hash && first_mismatch.is_none() {
                first_mismatch = Some(ReplayMismatch {
                    action_index: i,
                    expected_hash,
                    actual_hash,
                });
            }
            checkpoints.next();
        }
    }

    Ok(ReplayResult {
        actions_executed: log.actions.len(),
        is_verified: first_mismatch.is_none(),
        first_mismatch,
        total_reward,
    })
}

/// Replay without verification and return the final factory.
pub fn replay(log: &ReplayLog) -> Result<Factory, DeserializeError> {
    let mut factory = Factory::deserialize(&log.initial_snapshot)?;
    for action in &log.actions {
        apply(&mut factory, action);
    }
    Ok(factory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    fn script(i: usize) -> Action {
        match i % 12 {
            0 => Action::command("produce_pasta"),
            5 => Action::command("maintain_Cutter_0"),
            _ => Action::idle(),
        }
    }

    fn record_run(steps: usize) -> (ReplayLog, Factory) {
        let mut f = quiet_factory("pasta");
        let mut log = ReplayLog::new(&f).unwrap();
        for i in 0..steps {
            let action = script(i);
            f.step(&action);
            log.record_with_hash(ReplayAction::Step(action), f.state_hash());
        }
        (log, f)
    }

    #[test]
    fn empty_log_returns_initial_state() {
        let f = quiet_factory("pasta");
        let log = ReplayLog::new(&f).unwrap();
        let replayed = replay(&log).unwrap();
        assert_eq!(replayed.state_hash(), f.state_hash());
        assert_eq!(replayed.tick(), 0);
    }

    #[test]
    fn recorded_run_verifies() {
        let (log, original) = record_run(80);
        let result = replay_and_verify(&log).unwrap();
        assert!(result.is_verified);
        assert_eq!(result.actions_executed, 80);
        assert_eq!(replay(&log).unwrap().state_hash(), original.state_hash());
    }

    #[test]
    fn tampered_checkpoint_is_reported() {
        let (mut log, _) = record_run(20);
        log.hash_checkpoints[7].1 ^= 1;
        let result = replay_and_verify(&log).unwrap();
        assert!(!result.is_verified);
        assert_eq!(result.first_mismatch.unwrap().action_index, 7);
    }

    #[test]
    fn reset_in_the_middle_replays() {
        let mut f = quiet_factory("pasta");
        let mut log = ReplayLog::new(&f).unwrap();
        f.step(&Action::command("produce_pasta"));
        log.record(ReplayAction::Step(Action::command("produce_pasta")));
        f.reset(9);
        log.record_with_hash(ReplayAction::Reset { seed: 9 }, f.state_hash());
        f.step(&Action::idle());
        log.record_with_hash(ReplayAction::Step(Action::idle()), f.state_hash());
        assert!(replay_and_verify(&log).unwrap().is_verified);
    }

    #[test]
    fn log_survives_bitcode() {
        let (log, _) = record_run(10);
        let restored = ReplayLog::deserialize(&log.serialize().unwrap()).unwrap();
        assert_eq!(restored.actions, log.actions);
        assert_eq!(restored.hash_checkpoints, log.hash_checkpoints);
        assert!(replay_and_verify(&restored).unwrap().is_verified);
    }
}
