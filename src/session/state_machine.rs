//! Lifecycle `Unready → Ready → Training → Trained`, with a TTL on `Trained`.
//!
//! The machine only tracks state; it never calls the classifier. Expiry is not
//! a state of its own: the countdown reaching zero moves `Trained` back to
//! `Ready` in the same call that tears the countdown down.

use std::fmt;

use thiserror::Error;

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Dataset not loaded yet.
    Unready,
    /// Dataset loaded, no trusted trained model.
    Ready,
    /// A training run is in flight.
    Training,
    /// A completed run with a live countdown.
    Trained,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unready => "unready",
            Self::Ready => "ready",
            Self::Training => "training",
            Self::Trained => "trained",
        })
    }
}

/// Countdown lengths, in time-units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTiming {
    pub ttl_units: u32,
    /// A successful prediction lowers the countdown to at most this value.
    pub post_prediction_floor: u32,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self {
            ttl_units: 15,
            post_prediction_floor: 5,
        }
    }
}

/// Identifies one training run so late completions can be matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunId(u64);

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run-{}", self.0)
    }
}

/// Why a prediction cannot be served right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NotReady {
    #[error("dataset not loaded")]
    DatasetNotLoaded,
    #[error("not trained")]
    NotTrained,
}

/// Why a training request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TrainingRejected {
    #[error("dataset not loaded")]
    DatasetNotLoaded,
    #[error("a training run is already in flight")]
    AlreadyTraining,
}

/// A transition the current state does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("dataset already loaded")]
    DatasetAlreadyLoaded,
    #[error("no training run is in flight")]
    NotTraining,
    #[error("{got} does not match the in-flight run {expected}")]
    StaleRun { expected: RunId, got: RunId },
}

/// Result of advancing the countdown by one time-unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No countdown is running.
    Idle,
    Counting { remaining: u32 },
    /// The countdown hit zero; the session is `Ready` again.
    Expired,
}

/// Lifecycle gate for training and prediction.
///
/// `Trained` always means a run completed; its countdown is armed on entry
/// and expiring it drops back to `Ready`.
#[derive(Debug, Clone)]
pub struct SessionStateMachine {
    state: SessionState,
    ttl_remaining: Option<u32>,
    panel_was_open_before_training: bool,
    timing: SessionTiming,
    active_run: Option<RunId>,
    next_run: u64,
}

impl SessionStateMachine {
    pub fn new(timing: SessionTiming) -> Self {
        Self {
            state: SessionState::Unready,
            ttl_remaining: None,
            panel_was_open_before_training: false,
            timing: SessionTiming {
                ttl_units: timing.ttl_units.max(1),
                post_prediction_floor: timing.post_prediction_floor.max(1),
            },
            active_run: None,
            next_run: 1,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// `Some` exactly while `Trained`.
    pub fn ttl_remaining(&self) -> Option<u32> {
        self.ttl_remaining
    }

    pub fn panel_was_open_before_training(&self) -> bool {
        self.panel_was_open_before_training
    }

    pub fn active_run(&self) -> Option<RunId> {
        self.active_run
    }

    /// `Unready → Ready`. Allowed once.
    pub fn mark_dataset_loaded(&mut self) -> Result<(), TransitionError> {
        if self.state != SessionState::Unready {
            return Err(TransitionError::DatasetAlreadyLoaded);
        }
        self.state = SessionState::Ready;
        Ok(())
    }

    /// `Ready → Training`; from `Trained` the countdown is torn down first.
    ///
    /// `panel_open` is the diagnostics panel's visibility just before the run.
    pub fn begin_training(&mut self, panel_open: bool) -> Result<RunId, TrainingRejected> {
        match self.state {
            SessionState::Unready => return Err(TrainingRejected::DatasetNotLoaded),
            SessionState::Training => return Err(TrainingRejected::AlreadyTraining),
            SessionState::Trained => self.invalidate(),
            SessionState::Ready => {}
        }
        let run = RunId(self.next_run);
        self.next_run += 1;
        self.state = SessionState::Training;
        self.active_run = Some(run);
        self.panel_was_open_before_training = panel_open;
        Ok(run)
    }

    /// `Training → Trained`, arming the countdown.
    pub fn complete_training(&mut self, run: RunId) -> Result<(), TransitionError> {
        self.take_run(run)?;
        self.state = SessionState::Trained;
        self.ttl_remaining = Some(self.timing.ttl_units);
        Ok(())
    }

    /// `Training → Ready` after the trainer reported an error.
    pub fn fail_training(&mut self, run: RunId) -> Result<(), TransitionError> {
        self.take_run(run)?;
        self.state = SessionState::Ready;
        Ok(())
    }

    /// Advance the countdown by one time-unit.
    pub fn tick(&mut self) -> TickOutcome {
        let Some(remaining) = self.ttl_remaining else {
            return TickOutcome::Idle;
        };
        let remaining = remaining.saturating_sub(1);
        if remaining == 0 {
            self.invalidate();
            return TickOutcome::Expired;
        }
        self.ttl_remaining = Some(remaining);
        TickOutcome::Counting { remaining }
    }

    pub fn ensure_can_predict(&self) -> Result<(), NotReady> {
        match self.state {
            SessionState::Trained => Ok(()),
            SessionState::Unready => Err(NotReady::DatasetNotLoaded),
            SessionState::Ready | SessionState::Training => Err(NotReady::NotTrained),
        }
    }

    /// Lower the countdown to the post-prediction floor; never raises it.
    pub fn record_prediction(&mut self) -> Option<u32> {
        let remaining = self.ttl_remaining?;
        let shortened = remaining.min(self.timing.post_prediction_floor);
        self.ttl_remaining = Some(shortened);
        Some(shortened)
    }

    fn take_run(&mut self, run: RunId) -> Result<(), TransitionError> {
        match self.active_run {
            None => Err(TransitionError::NotTraining),
            Some(expected) if expected != run => Err(TransitionError::StaleRun { expected, got: run }),
            Some(_) => {
                self.active_run = None;
                Ok(())
            }
        }
    }

    fn invalidate(&mut self) {
        self.ttl_remaining = None;
        self.state = SessionState::Ready;
    }
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self::new(SessionTiming::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trained() -> SessionStateMachine {
        let mut machine = SessionStateMachine::default();
        machine.mark_dataset_loaded().unwrap();
        let run = machine.begin_training(false).unwrap();
        machine.complete_training(run).unwrap();
        machine
    }

    #[test]
    fn prediction_gate_names_the_blocking_reason() {
        let mut machine = SessionStateMachine::default();
        assert_eq!(machine.ensure_can_predict(), Err(NotReady::DatasetNotLoaded));
        machine.mark_dataset_loaded().unwrap();
        assert_eq!(machine.ensure_can_predict(), Err(NotReady::NotTrained));
        machine.begin_training(false).unwrap();
        assert_eq!(machine.ensure_can_predict(), Err(NotReady::NotTrained));
    }

    #[test]
    fn dataset_loaded_fires_once() {
        let mut machine = SessionStateMachine::default();
        machine.mark_dataset_loaded().unwrap();
        assert_eq!(
            machine.mark_dataset_loaded(),
            Err(TransitionError::DatasetAlreadyLoaded)
        );
        assert_eq!(machine.state(), SessionState::Ready);
    }

    #[test]
    fn training_requires_a_loaded_dataset() {
        let mut machine = SessionStateMachine::default();
        assert_eq!(
            machine.begin_training(false),
            Err(TrainingRejected::DatasetNotLoaded)
        );
        assert_eq!(machine.state(), SessionState::Unready);
    }

    #[test]
    fn second_training_request_is_rejected() {
        let mut machine = SessionStateMachine::default();
        machine.mark_dataset_loaded().unwrap();
        let first = machine.begin_training(true).unwrap();
        assert_eq!(
            machine.begin_training(false),
            Err(TrainingRejected::AlreadyTraining)
        );
        assert_eq!(machine.active_run(), Some(first));
        assert!(machine.panel_was_open_before_training());
    }

    #[test]
    fn completion_arms_the_countdown() {
        let machine = trained();
        assert_eq!(machine.state(), SessionState::Trained);
        assert_eq!(machine.ttl_remaining(), Some(15));
        assert_eq!(machine.active_run(), None);
    }

    #[test]
    fn countdown_expiry_forces_ready() {
        let mut machine = trained();
        for expected in (1..15).rev() {
            assert_eq!(machine.tick(), TickOutcome::Counting { remaining: expected });
        }
        assert_eq!(machine.tick(), TickOutcome::Expired);
        assert_eq!(machine.state(), SessionState::Ready);
        assert_eq!(machine.ttl_remaining(), None);
        assert_eq!(machine.tick(), TickOutcome::Idle);
        assert_eq!(machine.ensure_can_predict(), Err(NotReady::NotTrained));
    }

    #[test]
    fn prediction_shortens_but_never_lengthens() {
        let mut machine = trained();
        for _ in 0..3 {
            machine.tick();
        }
        assert_eq!(machine.ttl_remaining(), Some(12));
        assert_eq!(machine.record_prediction(), Some(5));
        assert_eq!(machine.ttl_remaining(), Some(5));

        machine.tick();
        machine.tick();
        assert_eq!(machine.record_prediction(), Some(3));
        assert_eq!(machine.ttl_remaining(), Some(3));
    }

    #[test]
    fn prediction_outside_trained_leaves_ttl_unset() {
        let mut machine = SessionStateMachine::default();
        machine.mark_dataset_loaded().unwrap();
        assert_eq!(machine.record_prediction(), None);
        assert_eq!(machine.ttl_remaining(), None);
    }

    #[test]
    fn failure_returns_to_ready_without_countdown() {
        let mut machine = SessionStateMachine::default();
        machine.mark_dataset_loaded().unwrap();
        let run = machine.begin_training(false).unwrap();
        machine.fail_training(run).unwrap();
        assert_eq!(machine.state(), SessionState::Ready);
        assert_eq!(machine.ttl_remaining(), None);
        assert!(machine.begin_training(false).is_ok());
    }

    #[test]
    fn retrain_from_trained_tears_down_the_countdown() {
        let mut machine = trained();
        machine.tick();
        let run = machine.begin_training(false).unwrap();
        assert_eq!(machine.state(), SessionState::Training);
        assert_eq!(machine.ttl_remaining(), None);
        assert_eq!(machine.tick(), TickOutcome::Idle);
        machine.complete_training(run).unwrap();
        assert_eq!(machine.ttl_remaining(), Some(15));
    }

    #[test]
    fn stale_or_unexpected_completions_are_refused() {
        let mut machine = SessionStateMachine::default();
        machine.mark_dataset_loaded().unwrap();
        let first = machine.begin_training(false).unwrap();
        machine.fail_training(first).unwrap();
        assert_eq!(
            machine.complete_training(first),
            Err(TransitionError::NotTraining)
        );
        let second = machine.begin_training(false).unwrap();
        assert_eq!(
            machine.complete_training(first),
            Err(TransitionError::StaleRun {
                expected: second,
                got: first
            })
        );
        assert_eq!(machine.state(), SessionState::Training);
    }

    #[test]
    fn zero_timing_values_are_raised_to_one() {
        let mut machine = SessionStateMachine::new(SessionTiming {
            ttl_units: 0,
            post_prediction_floor: 0,
        });
        machine.mark_dataset_loaded().unwrap();
        let run = machine.begin_training(false).unwrap();
        machine.complete_training(run).unwrap();
        assert_eq!(machine.ttl_remaining(), Some(1));
        assert_eq!(machine.record_prediction(), Some(1));
        assert_eq!(machine.tick(), TickOutcome::Expired);
    }
}
