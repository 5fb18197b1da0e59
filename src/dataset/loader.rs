use crate::classifier::{Classifier, FeatureVector};
use crate::date_codec;

use super::RawRow;

/// A validated row, ready for the classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingExample {
    pub features: FeatureVector,
    pub label: String,
}

/// Result of one dataset load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadSummary {
    pub rows_seen: usize,
    pub examples_added: usize,
    /// Set when the classifier's normalisation step failed; training still proceeds.
    pub normalize_error: Option<String>,
}

impl LoadSummary {
    pub fn rows_rejected(&self) -> usize {
        self.rows_seen - self.examples_added
    }
}

/// Validate one raw row.
///
/// Rejects rows with an empty date or label, a volume/rate that does not parse
/// to a finite number, or a date the codec cannot encode.
pub fn parse_row(row: &RawRow) -> Option<TrainingExample> {
    let date = trimmed(row.date.as_deref())?;
    let label = trimmed(row.prediction.as_deref())?;
    let volume = finite(row.volume.as_deref())?;
    let rate = finite(row.rate.as_deref())?;
    let date = date_codec::encode(date).ok()?;
    Some(TrainingExample {
        features: FeatureVector { date, volume, rate },
        label: label.to_string(),
    })
}

/// Feed every valid row to `model`, then ask it to normalise.
pub fn load<I>(rows: I, model: &mut dyn Classifier) -> LoadSummary
where
    I: IntoIterator<Item = RawRow>,
{
    let mut rows_seen = 0usize;
    let mut examples_added = 0usize;
    for row in rows {
        rows_seen += 1;
        let Some(example) = parse_row(&row) else {
            tracing::trace!("Dropping malformed row {rows_seen}: {row:?}");
            continue;
        };
        model.add_example(example.features, &example.label);
        examples_added += 1;
    }
    tracing::info!(
        "Added {examples_added} training examples ({} rows dropped)",
        rows_seen - examples_added
    );

    let normalize_error = match model.normalize() {
        Ok(()) => {
            tracing::info!("Normalized training data");
            None
        }
        Err(err) => {
            tracing::warn!("Normalization failed (continuing): {err}");
            Some(err.to_string())
        }
    };
    LoadSummary {
        rows_seen,
        examples_added,
        normalize_error,
    }
}

fn trimmed(value: Option<&str>) -> Option<&str> {
    let value = value?.trim();
    (!value.is_empty()).then_some(value)
}

fn finite(value: Option<&str>) -> Option<f64> {
    let parsed = trimmed(value)?.parse::<f64>().ok()?;
    parsed.is_finite().then_some(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::mlp::MlpClassifier;

    fn row(date: &str, volume: &str, rate: &str, label: Option<&str>) -> RawRow {
        RawRow {
            date: Some(date.into()),
            volume: Some(volume.into()),
            rate: Some(rate.into()),
            prediction: label.map(str::to_string),
        }
    }

    #[test]
    fn parse_row_trims_and_encodes() {
        let example = parse_row(&row(" 2018-01-11 ", " 1500.5", "42000 ", Some(" Greed "))).unwrap();
        assert_eq!(example.label, "Greed");
        assert_eq!(
            example.features,
            FeatureVector {
                date: 10,
                volume: 1500.5,
                rate: 42000.0
            }
        );
    }

    #[test]
    fn malformed_rows_are_dropped() {
        assert!(parse_row(&row("2018-01-01", "1", "1", None)).is_none());
        assert!(parse_row(&row("2018-01-01", "1", "1", Some("  "))).is_none());
        assert!(parse_row(&row("2018-01-01", "NaN", "1", Some("Fear"))).is_none());
        assert!(parse_row(&row("2018-01-01", "1", "inf", Some("Fear"))).is_none());
        assert!(parse_row(&row("2018-01-01", "", "1", Some("Fear"))).is_none());
        assert!(parse_row(&row("", "1", "1", Some("Fear"))).is_none());
        assert!(parse_row(&row("2018-02-30", "1", "1", Some("Fear"))).is_none());
        assert!(parse_row(&RawRow::default()).is_none());
    }

    #[test]
    fn load_counts_only_accepted_rows() {
        let rows = vec![
            row("2018-01-01", "10", "1", Some("Fear")),
            row("2018-01-02", "NaN", "1", Some("Fear")),
            row("2018-01-03", "12", "1", None),
            row("2018-01-04", "13", "2", Some("Greed")),
        ];
        let mut model = MlpClassifier::default();
        let summary = load(rows, &mut model);
        assert_eq!(summary.examples_added, 2);
        assert_eq!(summary.rows_rejected(), 2);
        assert_eq!(summary.normalize_error, None);
        assert_eq!(model.example_count(), 2);
        assert!(model.is_normalized());
    }

    #[test]
    fn normalization_failure_is_reported_not_fatal() {
        let mut model = MlpClassifier::default();
        let summary = load(Vec::new(), &mut model);
        assert_eq!(summary.examples_added, 0);
        assert!(summary.normalize_error.is_some());
    }
}
