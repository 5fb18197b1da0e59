//! Fear & greed sentiment sessions: dataset loading, training, TTL-bounded
//! prediction and live market inputs.

pub mod advice;
pub mod app_dirs;
pub mod classifier;
pub mod config;
pub mod dataset;
pub mod date_codec;
pub(crate) mod http_client;
pub mod live_data;
pub mod logging;
pub mod ml;
pub mod normalizer;
pub mod runtime;
pub mod session;
