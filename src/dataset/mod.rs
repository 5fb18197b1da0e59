//! Training dataset ingestion.
//!
//! A [`RowSource`] yields raw records; [`loader::load`] validates them and
//! feeds the accepted ones to the classifier.

mod csv_source;
pub mod loader;

use thiserror::Error;

pub use csv_source::CsvRowSource;
pub use loader::{LoadSummary, TrainingExample, load};

/// One record as the parser delivers it; any field may be missing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    pub date: Option<String>,
    pub volume: Option<String>,
    pub rate: Option<String>,
    /// Sentiment label.
    pub prediction: Option<String>,
}

/// Failure to produce the row set at all.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Failed to open dataset {path}: {source}")]
    Open {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to read dataset header: {0}")]
    Header(csv::Error),
}

/// Streams raw rows from a named resource.
pub trait RowSource {
    /// Name of the resource, for status and log lines.
    fn name(&self) -> String;

    fn read_rows(&mut self) -> Result<Vec<RawRow>, SourceError>;
}

impl RowSource for Vec<RawRow> {
    fn name(&self) -> String {
        "in-memory rows".to_string()
    }

    fn read_rows(&mut self) -> Result<Vec<RawRow>, SourceError> {
        Ok(std::mem::take(self))
    }
}
