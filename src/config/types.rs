use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::classifier::{Backend, TrainConfig};
use crate::live_data::{FallbackQuote, ProviderDescriptor};
use crate::ml::mlp::TrainOptions;
use crate::session::{RetryPolicy, SessionSettings, SessionTiming};

use super::defaults::*;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unable to create config directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config at {path}: {source}")]
    ParseToml {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config to TOML at {path}: {source}")]
    SerializeToml {
        path: PathBuf,
        source: toml::ser::Error,
    },
    #[error("No suitable config directory found")]
    NoConfigDir,
}

/// Everything read from `config.toml`.
///
/// Config keys: `dataset_path`, `training`, `session`, `backend`, `panel`,
/// `live_data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_dataset_path")]
    pub dataset_path: PathBuf,
    #[serde(default)]
    pub training: TrainingSettings,
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub backend: BackendSettings,
    #[serde(default)]
    pub panel: PanelSettings,
    #[serde(default)]
    pub live_data: LiveDataSettings,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            dataset_path: default_dataset_path(),
            training: TrainingSettings::default(),
            session: SessionSection::default(),
            backend: BackendSettings::default(),
            panel: PanelSettings::default(),
            live_data: LiveDataSettings::default(),
        }
    }
}

impl AppSettings {
    pub fn normalized(self) -> Self {
        Self {
            dataset_path: self.dataset_path,
            training: self.training.normalized(),
            session: self.session.normalized(),
            backend: self.backend,
            panel: self.panel.normalized(),
            live_data: self.live_data.normalized(),
        }
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            timing: SessionTiming {
                ttl_units: self.session.ttl_units,
                post_prediction_floor: self.session.post_prediction_floor,
            },
            train: TrainConfig {
                epochs: self.training.epochs,
                batch_size: self.training.batch_size,
            },
            classify_timeout: Duration::from_millis(self.session.classify_timeout_ms),
            panel_retry: RetryPolicy {
                max_attempts: self.panel.max_attempts,
                retry_delay: Duration::from_millis(self.panel.retry_delay_ms),
                initial_delay: Duration::from_millis(self.panel.initial_delay_ms),
            },
        }
    }

    pub fn mlp_options(&self) -> TrainOptions {
        TrainOptions {
            hidden_size: self.training.hidden_size,
            epochs: self.training.epochs,
            batch_size: self.training.batch_size,
            learning_rate: self.training.learning_rate,
            seed: self.training.seed,
            ..TrainOptions::default()
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.session.tick_interval_ms)
    }
}

/// Config keys: `epochs`, `batch_size`, `hidden_size`, `learning_rate`, `seed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSettings {
    #[serde(default = "default_epochs")]
    pub epochs: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_hidden_size")]
    pub hidden_size: usize,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f32,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            epochs: default_epochs(),
            batch_size: default_batch_size(),
            hidden_size: default_hidden_size(),
            learning_rate: default_learning_rate(),
            seed: default_seed(),
        }
    }
}

impl TrainingSettings {
    fn normalized(mut self) -> Self {
        self.epochs = self.epochs.clamp(1, MAX_EPOCHS);
        self.batch_size = self.batch_size.max(1);
        self.hidden_size = self.hidden_size.max(1);
        self.learning_rate = clamp_learning_rate(self.learning_rate);
        self
    }
}

/// Config keys: `ttl_units`, `post_prediction_floor`, `tick_interval_ms`,
/// `classify_timeout_ms`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSection {
    #[serde(default = "default_ttl_units")]
    pub ttl_units: u32,
    #[serde(default = "default_post_prediction_floor")]
    pub post_prediction_floor: u32,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_classify_timeout_ms")]
    pub classify_timeout_ms: u64,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            ttl_units: default_ttl_units(),
            post_prediction_floor: default_post_prediction_floor(),
            tick_interval_ms: default_tick_interval_ms(),
            classify_timeout_ms: default_classify_timeout_ms(),
        }
    }
}

impl SessionSection {
    fn normalized(mut self) -> Self {
        self.ttl_units = self.ttl_units.max(1);
        self.post_prediction_floor = self.post_prediction_floor.clamp(1, self.ttl_units);
        self.tick_interval_ms = clamp_at_least_one_ms(self.tick_interval_ms);
        self.classify_timeout_ms = clamp_at_least_one_ms(self.classify_timeout_ms);
        self
    }
}

/// Config keys: `preferred`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendSettings {
    #[serde(default)]
    pub preferred: Backend,
}

/// Config keys: `max_attempts`, `retry_delay_ms`, `initial_delay_ms`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelSettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
}

impl Default for PanelSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            initial_delay_ms: default_initial_delay_ms(),
        }
    }
}

impl PanelSettings {
    fn normalized(mut self) -> Self {
        self.max_attempts = self.max_attempts.clamp(1, MAX_ATTEMPTS);
        self
    }
}

/// Config keys: `timeout_ms`, `fallback`, `providers`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveDataSettings {
    #[serde(default = "default_fetch_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_fallback")]
    pub fallback: FallbackQuote,
    #[serde(default = "default_provider_list")]
    pub providers: Vec<ProviderDescriptor>,
}

impl Default for LiveDataSettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_fetch_timeout_ms(),
            fallback: default_fallback(),
            providers: default_provider_list(),
        }
    }
}

impl LiveDataSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    fn normalized(mut self) -> Self {
        self.timeout_ms = clamp_at_least_one_ms(self.timeout_ms);
        let fallback_ok = self.fallback.price_usd.is_finite()
            && self.fallback.price_usd > 0.0
            && self.fallback.volume_usd_24h.is_finite()
            && self.fallback.volume_usd_24h >= 0.0;
        if !fallback_ok {
            tracing::warn!("Ignoring invalid live_data.fallback {:?}", self.fallback);
            self.fallback = default_fallback();
        }
        self.providers.retain(|provider| {
            if provider.name.trim().is_empty() {
                tracing::warn!("Dropping live data provider without a name ({})", provider.url);
                return false;
            }
            match url::Url::parse(&provider.url) {
                Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => true,
                Ok(parsed) => {
                    tracing::warn!(
                        "Dropping live data provider {}: unsupported scheme {}",
                        provider.name,
                        parsed.scheme()
                    );
                    false
                }
                Err(err) => {
                    tracing::warn!("Dropping live data provider {}: {err}", provider.name);
                    false
                }
            }
        });
        if self.providers.is_empty() {
            self.providers = default_provider_list();
        }
        self
    }
}
