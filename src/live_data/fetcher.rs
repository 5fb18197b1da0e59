use std::time::Duration;

use serde_json::Value;
use time::OffsetDateTime;

use crate::http_client;

use super::{FallbackQuote, FetchError, LiveQuote, ProviderDescriptor};

const MAX_BODY_BYTES: usize = 256 * 1024;

/// Name recorded on degraded quotes.
pub const FALLBACK_SOURCE: &str = "sample data";

/// Issues one GET and returns the decoded JSON body.
pub trait QuoteTransport: Send + Sync {
    fn get_json(&self, url: &str) -> Result<Value, FetchError>;
}

/// [`QuoteTransport`] over a `ureq` agent.
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(timeout: Duration) -> Self {
        Self {
            agent: http_client::agent(timeout),
        }
    }
}

impl QuoteTransport for UreqTransport {
    fn get_json(&self, url: &str) -> Result<Value, FetchError> {
        let response = self
            .agent
            .get(url)
            .set("Accept", "application/json")
            .set("Cache-Control", "no-store")
            .call()
            .map_err(|err| match err {
                ureq::Error::Status(code, _) => FetchError::Status(code),
                ureq::Error::Transport(transport) => FetchError::Transport(transport.to_string()),
            })?;
        let bytes = http_client::read_response_bytes(response, MAX_BODY_BYTES)
            .map_err(|err| FetchError::Transport(err.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|err| FetchError::Body(err.to_string()))
    }
}

/// A provider that was skipped during one fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderFailure {
    pub provider: String,
    pub error: FetchError,
}

/// Ordered first-success fetch over a provider chain.
pub struct LiveDataFetcher {
    providers: Vec<ProviderDescriptor>,
    transport: Box<dyn QuoteTransport>,
    fallback: FallbackQuote,
}

impl LiveDataFetcher {
    pub fn new(
        providers: Vec<ProviderDescriptor>,
        transport: Box<dyn QuoteTransport>,
        fallback: FallbackQuote,
    ) -> Self {
        Self {
            providers,
            transport,
            fallback,
        }
    }

    /// Fetch a quote; degrades to the fallback when no provider answers.
    pub fn fetch(&self) -> LiveQuote {
        self.fetch_with_report().0
    }

    /// Like [`Self::fetch`], also returning the providers that failed, in order.
    pub fn fetch_with_report(&self) -> (LiveQuote, Vec<ProviderFailure>) {
        let mut failures = Vec::new();
        for provider in &self.providers {
            match self.try_provider(provider) {
                Ok((price_usd, volume_usd_24h)) => {
                    tracing::info!(
                        "Live data from {}: price={price_usd} volume={volume_usd_24h}",
                        provider.name
                    );
                    let quote = LiveQuote {
                        price_usd,
                        volume_usd_24h,
                        source_name: provider.name.clone(),
                        fetched_at: OffsetDateTime::now_utc(),
                        degraded: false,
                    };
                    return (quote, failures);
                }
                Err(error) => {
                    tracing::warn!("Live data provider {provider} failed: {error}");
                    failures.push(ProviderFailure {
                        provider: provider.name.clone(),
                        error,
                    });
                }
            }
        }
        tracing::warn!(
            "All {} live data providers failed; using sample data",
            self.providers.len()
        );
        (self.fallback_quote(), failures)
    }

    fn try_provider(&self, provider: &ProviderDescriptor) -> Result<(f64, f64), FetchError> {
        let body = self.transport.get_json(&provider.url)?;
        provider
            .schema
            .extract(&body)
            .ok_or(FetchError::Schema(provider.schema))
    }

    fn fallback_quote(&self) -> LiveQuote {
        LiveQuote {
            price_usd: self.fallback.price_usd,
            volume_usd_24h: self.fallback.volume_usd_24h,
            source_name: FALLBACK_SOURCE.to_string(),
            fetched_at: OffsetDateTime::now_utc(),
            degraded: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::test_server::{json_response, serve_once};
    use crate::live_data::QuoteSchema;

    fn provider(name: &str, url: String, schema: QuoteSchema) -> ProviderDescriptor {
        ProviderDescriptor {
            name: name.to_string(),
            url,
            schema,
        }
    }

    #[test]
    fn ureq_transport_maps_status_and_body() {
        let transport = UreqTransport::new(Duration::from_secs(5));

        let url = serve_once(json_response("503 Service Unavailable", "{}"));
        assert_eq!(transport.get_json(&url), Err(FetchError::Status(503)));

        let url = serve_once(json_response("200 OK", "not json"));
        assert!(matches!(transport.get_json(&url), Err(FetchError::Body(_))));

        let url = serve_once(json_response("200 OK", "{\"a\":1}"));
        assert_eq!(transport.get_json(&url).unwrap()["a"], 1);
    }

    #[test]
    fn falls_through_a_failing_server_to_a_working_one() {
        let broken = serve_once(json_response("500 Internal Server Error", "{}"));
        let working = serve_once(json_response(
            "200 OK",
            r#"{"bitcoin":{"usd":61000.0,"usd_24h_vol":20000000000.0}}"#,
        ));
        let fetcher = LiveDataFetcher::new(
            vec![
                provider("broken", broken, QuoteSchema::CoingeckoSimple),
                provider("working", working, QuoteSchema::CoingeckoSimple),
            ],
            Box::new(UreqTransport::new(Duration::from_secs(5))),
            FallbackQuote::default(),
        );
        let (quote, failures) = fetcher.fetch_with_report();
        assert_eq!(quote.source_name, "working");
        assert_eq!(quote.price_usd, 61000.0);
        assert!(!quote.degraded);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].error, FetchError::Status(500));
    }

    #[test]
    fn unreachable_providers_degrade_to_sample_data() {
        let fetcher = LiveDataFetcher::new(
            vec![provider(
                "nowhere",
                "http://127.0.0.1:1/price".to_string(),
                QuoteSchema::CoincapAsset,
            )],
            Box::new(UreqTransport::new(Duration::from_millis(500))),
            FallbackQuote {
                price_usd: 1.0,
                volume_usd_24h: 2.0,
            },
        );
        let quote = fetcher.fetch();
        assert!(quote.degraded);
        assert_eq!(quote.source_name, FALLBACK_SOURCE);
        assert_eq!((quote.price_usd, quote.volume_usd_24h), (1.0, 2.0));
    }
}
