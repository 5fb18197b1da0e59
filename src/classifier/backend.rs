use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{Classifier, ClassifierError};

/// Numeric backend a classifier can run on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Accelerated,
    Cpu,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Accelerated => "accelerated",
            Self::Cpu => "cpu",
        })
    }
}

/// Fatal initialisation failure: no usable backend.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("No usable numeric backend (preferred: {preferred}; cpu: {fallback})")]
pub struct InitError {
    pub preferred: ClassifierError,
    pub fallback: ClassifierError,
}

/// Try the preferred backend, then fall back to [`Backend::Cpu`].
pub fn select_backend(
    model: &mut dyn Classifier,
    preferred: Backend,
) -> Result<Backend, InitError> {
    let preferred_err = match model.select_backend(preferred) {
        Ok(()) => {
            tracing::info!("Numeric backend: {preferred}");
            return Ok(preferred);
        }
        Err(err) if preferred == Backend::Cpu => {
            return Err(InitError {
                preferred: err.clone(),
                fallback: err,
            });
        }
        Err(err) => err,
    };
    tracing::warn!("Backend {preferred} failed, switching to cpu: {preferred_err}");
    match model.select_backend(Backend::Cpu) {
        Ok(()) => {
            tracing::info!("Numeric backend: cpu");
            Ok(Backend::Cpu)
        }
        Err(fallback) => Err(InitError {
            preferred: preferred_err,
            fallback,
        }),
    }
}
