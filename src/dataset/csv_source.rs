use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord, Trim};

use super::{RawRow, RowSource, SourceError};

/// Header-keyed CSV reader producing [`RawRow`]s.
///
/// Columns other than `date`, `volume`, `rate` and `prediction` are ignored.
/// Records that cannot be decoded are logged and skipped.
pub struct CsvRowSource {
    name: String,
    input: Input,
}

enum Input {
    Path(PathBuf),
    Reader(Option<Box<dyn Read + Send>>),
}

impl CsvRowSource {
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        Self {
            name: path.display().to_string(),
            input: Input::Path(path),
        }
    }

    pub fn from_reader(name: impl Into<String>, reader: impl Read + Send + 'static) -> Self {
        Self {
            name: name.into(),
            input: Input::Reader(Some(Box::new(reader))),
        }
    }

    fn open(&mut self) -> Result<Box<dyn Read + Send>, SourceError> {
        match &mut self.input {
            Input::Path(path) => File::open(&*path)
                .map(|file| Box::new(file) as Box<dyn Read + Send>)
                .map_err(|source| SourceError::Open {
                    path: path.display().to_string(),
                    source,
                }),
            Input::Reader(reader) => reader.take().ok_or_else(|| SourceError::Open {
                path: self.name.clone(),
                source: std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "reader already consumed",
                ),
            }),
        }
    }
}

impl RowSource for CsvRowSource {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn read_rows(&mut self) -> Result<Vec<RawRow>, SourceError> {
        let reader = self.open()?;
        let mut csv = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(reader);
        let headers = csv.headers().map_err(SourceError::Header)?.clone();
        let mut rows = Vec::new();
        let mut skipped = 0usize;
        for (index, record) in csv.records().enumerate() {
            match record {
                Ok(record) if is_blank(&record) => {}
                Ok(record) => rows.push(row_from_record(&headers, &record)),
                Err(err) => {
                    skipped += 1;
                    tracing::warn!("Skipping unreadable record {} in {}: {err}", index + 1, self.name);
                }
            }
        }
        tracing::info!("Loaded {} rows from {} ({skipped} unreadable)", rows.len(), self.name);
        Ok(rows)
    }
}

fn row_from_record(headers: &StringRecord, record: &StringRecord) -> RawRow {
    let field = |name: &str| {
        headers
            .iter()
            .position(|header| header.eq_ignore_ascii_case(name))
            .and_then(|idx| record.get(idx))
            .map(str::to_string)
    };
    RawRow {
        date: field("date"),
        volume: field("volume"),
        rate: field("rate"),
        prediction: field("prediction"),
    }
}

fn is_blank(record: &StringRecord) -> bool {
    record.iter().all(|field| field.trim().is_empty())
}
