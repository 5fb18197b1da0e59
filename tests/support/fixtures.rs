use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use fearcast::live_data::{FetchError, ProviderDescriptor, QuoteSchema, QuoteTransport};
use serde_json::Value;

/// Write `rows` well-formed records alternating between two separable classes.
pub fn write_dataset(dir: &Path, rows: usize) -> PathBuf {
    let mut text = String::from("date,volume,rate,prediction\n");
    for idx in 0..rows {
        let fear = idx % 2 == 0;
        let day = idx % 28 + 1;
        let month = idx / 28 % 12 + 1;
        let (volume, rate, label) = if fear {
            (1_000 + idx, 20_000 + idx, "Fear")
        } else {
            (9_000 + idx, 60_000 + idx, "Greed")
        };
        text.push_str(&format!("2021-{month:02}-{day:02},{volume},{rate},{label}\n"));
    }
    let path = dir.join("dataset.csv");
    std::fs::write(&path, text).unwrap();
    path
}

pub fn provider(name: &str, schema: QuoteSchema) -> ProviderDescriptor {
    ProviderDescriptor {
        name: name.to_string(),
        url: format!("http://{name}.invalid/quote"),
        schema,
    }
}

/// Transport with scripted replies per URL that records every call.
///
/// Clones share the call log, so a test can keep one while the fetcher owns another.
#[derive(Clone, Default)]
pub struct CountingTransport {
    replies: HashMap<String, Result<Value, FetchError>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl CountingTransport {
    pub fn reply(mut self, provider: &ProviderDescriptor, reply: Result<Value, FetchError>) -> Self {
        self.replies.insert(provider.url.clone(), reply);
        self
    }

    pub fn calls_to(&self, provider: &ProviderDescriptor) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|url| **url == provider.url)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl QuoteTransport for CountingTransport {
    fn get_json(&self, url: &str) -> Result<Value, FetchError> {
        self.calls.lock().unwrap().push(url.to_string());
        self.replies
            .get(url)
            .cloned()
            .unwrap_or_else(|| Err(FetchError::Transport(format!("no route to {url}"))))
    }
}
