//! Contract for the classifier/trainer capability the session drives.
//!
//! The session never looks inside a model. It adds examples, asks for
//! normalisation, runs training with a per-epoch progress hook and asks for
//! classifications. Classification replies arrive in the loosely-typed
//! shapes described by [`ClassifyReply`]; only [`crate::normalizer`] reads them.

mod backend;

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use backend::{Backend, InitError, select_backend};

/// Model input, keyed by feature name.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    /// Day offset from [`crate::date_codec::EPOCH`].
    pub date: i64,
    pub volume: f64,
    pub rate: f64,
}

impl FeatureVector {
    /// Positional view in `[date, volume, rate]` order.
    pub fn as_array(&self) -> [f64; 3] {
        [self.date as f64, self.volume, self.rate]
    }
}

/// Options forwarded to [`Classifier::train`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    pub epochs: usize,
    pub batch_size: usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            epochs: 32,
            batch_size: 32,
        }
    }
}

/// Progress report emitted once per epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochReport {
    pub epoch: usize,
    /// Mean training loss over the epoch, when the trainer reports one.
    pub loss: Option<f64>,
}

/// Errors reported by a classifier capability.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClassifierError {
    #[error("Normalization failed: {0}")]
    Normalize(String),
    #[error("Training failed: {0}")]
    Train(String),
    #[error("Backend {0} is not available: {1}")]
    BackendUnavailable(Backend, String),
    #[error("Trainer panicked: {0}")]
    Panicked(String),
}

/// Raw outcome of one classification attempt.
///
/// Different classifier versions deliver results differently: an error-first
/// callback, a callback that puts the candidate array into the error slot, or
/// a deferred value resolved later.
#[derive(Debug)]
pub enum ClassifyReply {
    Callback {
        error: Option<Value>,
        results: Option<Value>,
    },
    Deferred(Deferred),
}

impl ClassifyReply {
    /// Error-first callback carrying candidates.
    pub fn results(results: Value) -> Self {
        Self::Callback {
            error: None,
            results: Some(results),
        }
    }

    /// Error-first callback carrying a failure.
    pub fn error(error: impl Into<Value>) -> Self {
        Self::Callback {
            error: Some(error.into()),
            results: None,
        }
    }
}

/// A classification result that resolves (or rejects) after the call returns.
#[derive(Debug)]
pub struct Deferred {
    rx: Receiver<Result<Value, Value>>,
}

/// Producer half of a [`Deferred`].
#[derive(Debug, Clone)]
pub struct DeferredResolver {
    tx: Sender<Result<Value, Value>>,
}

/// Outcome of waiting on a [`Deferred`].
#[derive(Debug, Clone, PartialEq)]
pub enum Settled {
    Resolved(Value),
    Rejected(Value),
    TimedOut,
    /// The producer went away without settling.
    Abandoned,
}

impl Deferred {
    pub fn channel() -> (DeferredResolver, Deferred) {
        let (tx, rx) = mpsc::channel();
        (DeferredResolver { tx }, Deferred { rx })
    }

    /// A deferred value that has already resolved.
    pub fn resolved(value: Value) -> Self {
        let (resolver, deferred) = Self::channel();
        resolver.resolve(value);
        deferred
    }

    pub fn wait(self, timeout: Duration) -> Settled {
        match self.rx.recv_timeout(timeout) {
            Ok(Ok(value)) => Settled::Resolved(value),
            Ok(Err(value)) => Settled::Rejected(value),
            Err(RecvTimeoutError::Timeout) => Settled::TimedOut,
            Err(RecvTimeoutError::Disconnected) => Settled::Abandoned,
        }
    }
}

impl DeferredResolver {
    /// Returns false when the waiting side has already gone away.
    pub fn resolve(&self, value: Value) -> bool {
        self.tx.send(Ok(value)).is_ok()
    }

    pub fn reject(&self, error: Value) -> bool {
        self.tx.send(Err(error)).is_ok()
    }
}

/// A trainable classifier that the session owns for its whole lifetime.
pub trait Classifier: Send {
    /// Switch the numeric backend. Called once during initialisation.
    fn select_backend(&mut self, backend: Backend) -> Result<(), ClassifierError>;

    /// Record one labelled example.
    fn add_example(&mut self, features: FeatureVector, label: &str);

    /// Number of examples recorded so far.
    fn example_count(&self) -> usize;

    /// Compute feature scaling over the recorded examples.
    fn normalize(&mut self) -> Result<(), ClassifierError>;

    /// Run a full training pass. Returning is the terminal completion signal;
    /// `on_epoch` may be called any number of times before that.
    fn train(
        &mut self,
        config: &TrainConfig,
        on_epoch: &mut dyn FnMut(EpochReport),
    ) -> Result<(), ClassifierError>;

    fn classify(&self, features: &FeatureVector) -> ClassifyReply;
}
