//! One training/prediction session over a shared classifier.
//!
//! [`Session`] owns the lifecycle state, the status line and the optional
//! diagnostics panel. Training itself runs elsewhere: [`Session::begin_training`]
//! hands out a [`TrainingRun`] that can be executed on a worker thread, and
//! the result comes back through [`Session::finish_training`].

mod panel;
mod state_machine;
mod status;

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;

pub use panel::{DiagnosticsPanel, PanelPoll, RetryPolicy, VisibilityRetry};
pub use state_machine::{
    NotReady, RunId, SessionState, SessionStateMachine, SessionTiming, TickOutcome,
    TrainingRejected, TransitionError,
};
pub use status::{StatusLine, StatusTone};

use crate::classifier::{
    Backend, Classifier, ClassifierError, EpochReport, FeatureVector, InitError, TrainConfig,
    select_backend,
};
use crate::dataset::{self, LoadSummary, RowSource, SourceError};
use crate::date_codec;
use crate::normalizer::{self, ClassifyFailure, PredictionOutcome};
use panel::PanelDriver;

/// Tunables applied to one session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub timing: SessionTiming,
    pub train: TrainConfig,
    /// Longest wait for a deferred classification reply.
    pub classify_timeout: Duration,
    pub panel_retry: RetryPolicy,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            timing: SessionTiming::default(),
            train: TrainConfig::default(),
            classify_timeout: Duration::from_secs(2),
            panel_retry: RetryPolicy::default(),
        }
    }
}

/// Fatal initialisation failures.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Init(#[from] InitError),
    #[error(transparent)]
    Dataset(#[from] SourceError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// Why a prediction request produced no outcome.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PredictionError {
    #[error("Prediction unavailable: {0}")]
    NotReady(#[from] NotReady),
    #[error("Date, price and volume are all required")]
    MissingInput,
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Classify(#[from] ClassifyFailure),
}

/// User-supplied prediction form fields, as typed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PredictionInput {
    pub date: String,
    pub price: String,
    pub volume: String,
}

impl PredictionInput {
    pub fn features(&self) -> Result<FeatureVector, PredictionError> {
        let (date, price, volume) = (self.date.trim(), self.price.trim(), self.volume.trim());
        if date.is_empty() || price.is_empty() || volume.is_empty() {
            return Err(PredictionError::MissingInput);
        }
        let date = date_codec::encode(date)
            .map_err(|err| PredictionError::InvalidInput(err.to_string()))?;
        let rate = parse_finite("price", price)?;
        let volume = parse_finite("volume", volume)?;
        Ok(FeatureVector { date, volume, rate })
    }
}

fn parse_finite(field: &str, value: &str) -> Result<f64, PredictionError> {
    match value.parse::<f64>() {
        Ok(parsed) if parsed.is_finite() => Ok(parsed),
        _ => Err(PredictionError::InvalidInput(format!(
            "{field} {value:?} is not a finite number"
        ))),
    }
}

/// A training run detached from the session, ready to execute.
pub struct TrainingRun<C> {
    run: RunId,
    config: TrainConfig,
    model: Arc<Mutex<C>>,
}

/// What a [`TrainingRun`] produced.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingOutcome {
    pub run: RunId,
    pub result: Result<(), ClassifierError>,
}

impl<C: Classifier> TrainingRun<C> {
    pub fn run_id(&self) -> RunId {
        self.run
    }

    /// Train the shared model, converting a trainer panic into an error.
    pub fn execute(self, on_epoch: &mut dyn FnMut(EpochReport)) -> TrainingOutcome {
        let mut model = lock(&self.model);
        let config = self.config;
        let result = panic::catch_unwind(AssertUnwindSafe(|| model.train(&config, on_epoch)))
            .unwrap_or_else(|payload| Err(ClassifierError::Panicked(panic_message(&*payload))));
        TrainingOutcome {
            run: self.run,
            result,
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn lock<C>(model: &Mutex<C>) -> MutexGuard<'_, C> {
    model.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The process-wide session: lifecycle, the shared model, the status line
/// and the optional diagnostics panel.
///
/// Every mutation goes through `&mut self`, so one owner serialises them.
/// Training runs borrow the model through [`TrainingRun`] and report back
/// through [`Session::finish_training`].
pub struct Session<C> {
    machine: SessionStateMachine,
    model: Arc<Mutex<C>>,
    settings: SessionSettings,
    status: StatusLine,
    panel: Option<PanelDriver>,
    backend: Option<Backend>,
}

impl<C: Classifier> Session<C> {
    pub fn new(model: C, settings: SessionSettings) -> Self {
        Self {
            machine: SessionStateMachine::new(settings.timing),
            model: Arc::new(Mutex::new(model)),
            settings,
            status: StatusLine::new("Loading dataset…", StatusTone::Info),
            panel: None,
            backend: None,
        }
    }

    pub fn with_panel(mut self, panel: Box<dyn DiagnosticsPanel>) -> Self {
        self.panel = Some(PanelDriver::new(panel, self.settings.panel_retry));
        self
    }

    pub fn state(&self) -> SessionState {
        self.machine.state()
    }

    pub fn ttl_remaining(&self) -> Option<u32> {
        self.machine.ttl_remaining()
    }

    pub fn status(&self) -> &StatusLine {
        &self.status
    }

    pub fn backend(&self) -> Option<Backend> {
        self.backend
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Run `f` against the shared model.
    pub fn with_model<R>(&self, f: impl FnOnce(&C) -> R) -> R {
        f(&lock(&self.model))
    }

    /// Select a backend, then load the dataset.
    pub fn initialize(
        &mut self,
        preferred: Backend,
        source: &mut dyn RowSource,
    ) -> Result<LoadSummary, SessionError> {
        let backend = {
            let mut model = lock(&self.model);
            select_backend(&mut *model, preferred)
        };
        match backend {
            Ok(backend) => self.backend = Some(backend),
            Err(err) => {
                tracing::error!("Classifier initialisation failed: {err}");
                self.set_status(format!("Initialisation failed: {err}"), StatusTone::Error);
                return Err(err.into());
            }
        }
        self.load_dataset(source)
    }

    /// Feed `source` to the model and fire `Unready → Ready`.
    pub fn load_dataset(&mut self, source: &mut dyn RowSource) -> Result<LoadSummary, SessionError> {
        if self.machine.state() != SessionState::Unready {
            return Err(TransitionError::DatasetAlreadyLoaded.into());
        }
        self.set_status("Loading dataset…", StatusTone::Info);
        let rows = match source.read_rows() {
            Ok(rows) => rows,
            Err(err) => {
                tracing::error!("Dataset {} unreadable: {err}", source.name());
                self.set_status(format!("Dataset load failed: {err}"), StatusTone::Error);
                return Err(err.into());
            }
        };
        let summary = {
            let mut model = lock(&self.model);
            dataset::load(rows, &mut *model)
        };
        self.machine.mark_dataset_loaded()?;
        tracing::info!(
            "Dataset {} loaded: {} examples from {} rows",
            source.name(),
            summary.examples_added,
            summary.rows_seen
        );
        self.set_status("Dataset loaded. Ready to train.", StatusTone::Success);
        Ok(summary)
    }

    /// `Ready/Trained → Training`, opening the panel.
    pub fn begin_training(&mut self) -> Result<TrainingRun<C>, TrainingRejected> {
        let panel_open = self.panel.as_ref().is_some_and(PanelDriver::effective_open);
        let run = match self.machine.begin_training(panel_open) {
            Ok(run) => run,
            Err(rejected) => {
                tracing::warn!("Training request rejected: {rejected}");
                let text = match rejected {
                    TrainingRejected::DatasetNotLoaded => "Model not ready yet, wait for dataset load.",
                    TrainingRejected::AlreadyTraining => "Training already in progress.",
                };
                self.set_status(text, StatusTone::Warning);
                return Err(rejected);
            }
        };
        if let Some(panel) = self.panel.as_mut() {
            panel.open_now();
        }
        tracing::info!(
            "Training {run} started (epochs={}, batch_size={})",
            self.settings.train.epochs,
            self.settings.train.batch_size
        );
        self.set_status("Training started…", StatusTone::Info);
        Ok(TrainingRun {
            run,
            config: self.settings.train,
            model: Arc::clone(&self.model),
        })
    }

    /// Forward one epoch report to the log and, when open, the panel.
    pub fn on_epoch(&mut self, report: EpochReport) {
        match report.loss {
            Some(loss) => tracing::debug!("Epoch {}: loss={loss:.4}", report.epoch),
            None => tracing::debug!("Epoch {}", report.epoch),
        }
        if let Some(panel) = self.panel.as_mut() {
            panel.show_epoch(&report);
        }
    }

    /// Apply a run's result. `Ok(Some(delay))` means the panel is closing and
    /// [`Self::poll_panel`] should be called after `delay`.
    pub fn finish_training(
        &mut self,
        outcome: TrainingOutcome,
    ) -> Result<Option<Duration>, TransitionError> {
        let outcome_run = outcome.run;
        let applied = match &outcome.result {
            Ok(()) => self.machine.complete_training(outcome_run),
            Err(_) => self.machine.fail_training(outcome_run),
        };
        if let Err(err) = applied {
            tracing::warn!("Ignoring training result for {outcome_run}: {err}");
            return Err(err);
        }
        match outcome.result {
            Ok(()) => {
                tracing::info!("Training {outcome_run} complete");
                self.set_status("Training complete. You can predict now.", StatusTone::Success);
            }
            Err(err) => {
                tracing::warn!("Training {outcome_run} failed: {err}");
                let detail = match err {
                    ClassifierError::Train(message) => message,
                    other => other.to_string(),
                };
                self.set_status(format!("Training failed: {detail}"), StatusTone::Error);
            }
        }
        Ok(self.restore_panel())
    }

    fn restore_panel(&mut self) -> Option<Duration> {
        if self.machine.panel_was_open_before_training() {
            return None;
        }
        self.panel.as_mut().map(PanelDriver::begin_close)
    }

    /// One convergence step of a pending panel close.
    pub fn poll_panel(&mut self) -> Option<Duration> {
        self.panel.as_mut()?.poll()
    }

    /// Advance the countdown by one time-unit.
    pub fn tick(&mut self) -> TickOutcome {
        let outcome = self.machine.tick();
        if outcome == TickOutcome::Expired {
            tracing::info!("Trained model expired");
            self.set_status(
                "Session expired; retrain with fresh market inputs.",
                StatusTone::Warning,
            );
        }
        outcome
    }

    /// Classify `input` with the trained model and shorten the countdown.
    pub fn predict(&mut self, input: &PredictionInput) -> Result<PredictionOutcome, PredictionError> {
        if let Err(not_ready) = self.machine.ensure_can_predict() {
            let text = match not_ready {
                NotReady::DatasetNotLoaded => "Model not ready yet, wait for dataset load.",
                NotReady::NotTrained => "Train the model first.",
            };
            self.set_status(text, StatusTone::Warning);
            return Err(not_ready.into());
        }
        let features = match input.features() {
            Ok(features) => features,
            Err(err) => {
                let text = match err {
                    PredictionError::MissingInput => "Please fill Date, Price, and Volume.",
                    _ => "Invalid input values.",
                };
                tracing::debug!("Rejected prediction input {input:?}: {err}");
                self.set_status(text, StatusTone::Warning);
                return Err(err);
            }
        };
        let reply = lock(&self.model).classify(&features);
        match normalizer::normalize(reply, self.settings.classify_timeout) {
            Ok(outcome) => {
                let remaining = self.machine.record_prediction();
                tracing::info!("Prediction {outcome} (ttl now {remaining:?})");
                self.set_status(
                    format!("Prediction: {} ({:.1}%)", outcome.label, outcome.confidence_pct),
                    StatusTone::Success,
                );
                Ok(outcome)
            }
            Err(ClassifyFailure::NoResults) => {
                tracing::warn!("Classifier returned no usable candidates");
                self.set_status("No prediction results.", StatusTone::Warning);
                Err(ClassifyFailure::NoResults.into())
            }
            Err(failure) => {
                tracing::warn!("Prediction failed: {failure}");
                self.set_status("Prediction failed (see log).", StatusTone::Error);
                Err(failure.into())
            }
        }
    }

    /// Replace the status line; used for messages from outside the lifecycle.
    pub fn set_status(&mut self, text: impl Into<String>, tone: StatusTone) {
        self.status = StatusLine::new(text, tone);
    }

    /// Drop the session, handing back the model when no run still holds it.
    pub fn teardown(self) -> Option<C> {
        tracing::info!("Session closed in state {}", self.machine.state());
        Arc::try_unwrap(self.model)
            .ok()
            .map(|model| model.into_inner().unwrap_or_else(PoisonError::into_inner))
    }
}
