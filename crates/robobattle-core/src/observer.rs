//! Observer hook for rendering, replay and telemetry consumers.
//!
//! Observers run on the driver thread between ticks; a slow observer slows
//! the battle down but cannot change its outcome.

use std::sync::{Arc, Mutex, PoisonError};

use crate::scoring::ContestantResult;
use crate::snapshot::TurnSnapshot;

/// Receives battle progress. Every method defaults to doing nothing.
///
/// # Example
///
/// ```
/// use robobattle_core::observer::BattleObserver;
/// use robobattle_core::snapshot::TurnSnapshot;
///
/// #[derive(Default)]
/// struct TickCounter(u64);
///
/// impl BattleObserver for TickCounter {
///     fn on_turn_ended(&mut self, _snapshot: &TurnSnapshot) {
///         self.0 += 1;
///     }
/// }
/// ```
pub trait BattleObserver: Send {
    /// Battle setup finished; `robots` is the robot count.
    fn on_battle_started(&mut self, _rounds: u32, _robots: usize) {}

    /// A round is about to play its first tick.
    fn on_round_started(&mut self, _round: u32) {}

    /// A tick finished.
    fn on_turn_ended(&mut self, _snapshot: &TurnSnapshot) {}

    /// A round finished after `turns` ticks.
    fn on_round_ended(&mut self, _round: u32, _turns: u64) {}

    /// Final results are available.
    fn on_battle_completed(&mut self, _results: &[ContestantResult]) {}

    /// The battle is over and every thread has been stopped.
    fn on_battle_ended(&mut self, _aborted: bool) {}
}

/// Everything a [`RecordingObserver`] has seen.
#[derive(Debug, Clone, Default)]
pub struct Recording {
    /// Snapshots in tick order
    pub snapshots: Vec<TurnSnapshot>,
    /// `(round, turns)` per finished round
    pub rounds: Vec<(u32, u64)>,
    /// Final results, once reported
    pub results: Option<Vec<ContestantResult>>,
    /// `Some(aborted)` once the battle has ended
    pub ended: Option<bool>,
}

/// Keeps every snapshot in shared memory. Useful for tests and replays.
#[derive(Debug, Clone, Default)]
pub struct RecordingObserver {
    recording: Arc<Mutex<Recording>>,
}

impl RecordingObserver {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of what has been recorded so far.
    #[must_use]
    pub fn recording(&self) -> Recording {
        self.recording
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn with(&self, f: impl FnOnce(&mut Recording)) {
        f(&mut self.recording.lock().unwrap_or_else(PoisonError::into_inner));
    }
}

impl BattleObserver for RecordingObserver {
    fn on_turn_ended(&mut self, snapshot: &TurnSnapshot) {
        self.with(|r| r.snapshots.push(snapshot.clone()));
    }

    fn on_round_ended(&mut self, round: u32, turns: u64) {
        self.with(|r| r.rounds.push((round, turns)));
    }

    fn on_battle_completed(&mut self, results: &[ContestantResult]) {
        self.with(|r| r.results = Some(results.to_vec()));
    }

    fn on_battle_ended(&mut self, aborted: bool) {
        self.with(|r| r.ended = Some(aborted));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ContestantEntry, Registry};

    #[test]
    fn observer_is_object_safe() {
        fn _accepts_boxed(_observer: Box<dyn BattleObserver>) {}
    }

    #[test]
    fn recorder_clones_share_state() {
        let recorder = RecordingObserver::new();
        let mut boxed: Box<dyn BattleObserver> = Box::new(recorder.clone());
        let registry = Registry::new(&[ContestantEntry::solo("a")]);

        boxed.on_battle_started(1, 1);
        boxed.on_turn_ended(&TurnSnapshot::capture(&registry, 0, 0));
        boxed.on_round_ended(0, 1);
        boxed.on_battle_ended(false);

        let recording = recorder.recording();
        assert_eq!(recording.snapshots.len(), 1);
        assert_eq!(recording.rounds, vec![(0, 1)]);
        assert_eq!(recording.ended, Some(false));
        assert!(recording.results.is_none());
    }
}
