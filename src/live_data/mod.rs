//! Live BTC price/volume quotes from an ordered chain of public providers.
//!
//! Providers are tried strictly in order and the first schema-valid answer
//! wins. When every provider fails the caller gets a fixed sample quote with
//! [`LiveQuote::degraded`] set; fetching never fails outright.

mod fetcher;
mod providers;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

pub use fetcher::{FALLBACK_SOURCE, LiveDataFetcher, ProviderFailure, QuoteTransport, UreqTransport};
pub use providers::{QuoteSchema, default_providers};

/// One price/volume observation.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveQuote {
    pub price_usd: f64,
    pub volume_usd_24h: f64,
    pub source_name: String,
    pub fetched_at: OffsetDateTime,
    /// Built from [`FallbackQuote`] constants rather than a provider.
    pub degraded: bool,
}

impl LiveQuote {
    /// Rounded `(price, volume)` strings for the prediction form.
    pub fn form_values(&self) -> (String, String) {
        (
            format!("{:.0}", self.price_usd.round()),
            format!("{:.0}", self.volume_usd_24h.round()),
        )
    }
}

/// A single provider in the fallback chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    pub name: String,
    pub url: String,
    pub schema: QuoteSchema,
}

/// Sample values returned when no provider answers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FallbackQuote {
    pub price_usd: f64,
    pub volume_usd_24h: f64,
}

impl Default for FallbackQuote {
    fn default() -> Self {
        Self {
            price_usd: 42_000.0,
            volume_usd_24h: 25_000_000_000.0,
        }
    }
}

/// Why one provider attempt did not yield a quote.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("HTTP {0}")]
    Status(u16),
    #[error("invalid JSON body: {0}")]
    Body(String),
    #[error("response does not match the {0} schema")]
    Schema(QuoteSchema),
}

impl fmt::Display for ProviderDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.url)
    }
}
