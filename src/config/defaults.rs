use std::path::PathBuf;

use crate::live_data::{FallbackQuote, ProviderDescriptor, default_providers};

pub(super) const MAX_EPOCHS: usize = 10_000;
pub(super) const MAX_ATTEMPTS: u32 = 1_000;

pub(super) fn default_dataset_path() -> PathBuf {
    PathBuf::from("dataset_btc_fear_greed.csv")
}

pub(super) fn default_epochs() -> usize {
    32
}

pub(super) fn default_batch_size() -> usize {
    32
}

pub(super) fn default_hidden_size() -> usize {
    16
}

pub(super) fn default_learning_rate() -> f32 {
    0.05
}

pub(super) fn default_seed() -> u64 {
    42
}

pub(super) fn default_ttl_units() -> u32 {
    15
}

pub(super) fn default_post_prediction_floor() -> u32 {
    5
}

pub(super) fn default_tick_interval_ms() -> u64 {
    1_000
}

pub(super) fn default_classify_timeout_ms() -> u64 {
    2_000
}

pub(super) fn default_max_attempts() -> u32 {
    20
}

pub(super) fn default_retry_delay_ms() -> u64 {
    120
}

pub(super) fn default_initial_delay_ms() -> u64 {
    200
}

pub(super) fn default_fetch_timeout_ms() -> u64 {
    8_000
}

pub(super) fn default_fallback() -> FallbackQuote {
    FallbackQuote::default()
}

pub(super) fn default_provider_list() -> Vec<ProviderDescriptor> {
    default_providers()
}

pub(super) fn clamp_learning_rate(value: f32) -> f32 {
    if value.is_finite() && value > 0.0 {
        value.min(10.0)
    } else {
        default_learning_rate()
    }
}

pub(super) fn clamp_at_least_one_ms(value: u64) -> u64 {
    value.max(1)
}
