use serde_json::{Value, json};

use crate::classifier::{
    Backend, Classifier, ClassifierError, ClassifyReply, EpochReport, FeatureVector, TrainConfig,
};

use super::model::{FEATURE_LEN, FeatureScaling, MlpModel};
use super::train::{TrainDataset, TrainOptions, train_mlp};

/// In-memory [`Classifier`] backed by [`MlpModel`].
#[derive(Debug, Clone)]
pub struct MlpClassifier {
    options: TrainOptions,
    rows: Vec<[f64; FEATURE_LEN]>,
    labels: Vec<usize>,
    classes: Vec<String>,
    scaling: Option<FeatureScaling>,
    model: Option<MlpModel>,
    backend: Option<Backend>,
}

impl MlpClassifier {
    pub fn new(options: TrainOptions) -> Self {
        Self {
            options,
            rows: Vec::new(),
            labels: Vec::new(),
            classes: Vec::new(),
            scaling: None,
            model: None,
            backend: None,
        }
    }

    /// Labels in first-seen order.
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn is_normalized(&self) -> bool {
        self.scaling.is_some()
    }

    pub fn backend(&self) -> Option<Backend> {
        self.backend
    }

    fn class_index(&mut self, label: &str) -> usize {
        if let Some(idx) = self.classes.iter().position(|known| known == label) {
            return idx;
        }
        self.classes.push(label.to_string());
        self.classes.len() - 1
    }
}

impl Default for MlpClassifier {
    fn default() -> Self {
        Self::new(TrainOptions::default())
    }
}

impl Classifier for MlpClassifier {
    fn select_backend(&mut self, backend: Backend) -> Result<(), ClassifierError> {
        match backend {
            Backend::Cpu => {
                self.backend = Some(Backend::Cpu);
                Ok(())
            }
            Backend::Accelerated => Err(ClassifierError::BackendUnavailable(
                backend,
                "the MLP runs on the CPU only".to_string(),
            )),
        }
    }

    fn add_example(&mut self, features: FeatureVector, label: &str) {
        let class = self.class_index(label);
        self.rows.push(features.as_array());
        self.labels.push(class);
    }

    fn example_count(&self) -> usize {
        self.rows.len()
    }

    fn normalize(&mut self) -> Result<(), ClassifierError> {
        let scaling = FeatureScaling::from_rows(&self.rows).map_err(ClassifierError::Normalize)?;
        self.scaling = Some(scaling);
        Ok(())
    }

    fn train(
        &mut self,
        config: &TrainConfig,
        on_epoch: &mut dyn FnMut(EpochReport),
    ) -> Result<(), ClassifierError> {
        let scaling = self.scaling.clone().unwrap_or_else(FeatureScaling::identity);
        let dataset = TrainDataset {
            classes: self.classes.clone(),
            x: self.rows.iter().map(|row| scaling.apply(row)).collect(),
            y: self.labels.clone(),
        };
        let options = TrainOptions {
            epochs: config.epochs,
            batch_size: config.batch_size,
            ..self.options.clone()
        };
        let model = train_mlp(&dataset, &scaling, &options, &mut |epoch, loss| {
            on_epoch(EpochReport {
                epoch,
                loss: Some(loss),
            })
        })
        .map_err(ClassifierError::Train)?;
        self.model = Some(model);
        Ok(())
    }

    fn classify(&self, features: &FeatureVector) -> ClassifyReply {
        let Some(model) = &self.model else {
            return ClassifyReply::error("Model is not trained");
        };
        let proba = model.predict_proba(&features.as_array());
        let mut candidates: Vec<(usize, f32)> = proba.into_iter().enumerate().collect();
        candidates.sort_by(|a, b| b.1.total_cmp(&a.1));
        let results: Vec<Value> = candidates
            .into_iter()
            .map(|(idx, confidence)| {
                json!({
                    "label": model.classes[idx],
                    "confidence": confidence,
                })
            })
            .collect();
        ClassifyReply::results(Value::Array(results))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(date: i64, volume: f64, rate: f64) -> FeatureVector {
        FeatureVector { date, volume, rate }
    }

    #[test]
    fn only_cpu_backend_is_supported() {
        let mut model = MlpClassifier::default();
        assert!(model.select_backend(Backend::Accelerated).is_err());
        model.select_backend(Backend::Cpu).unwrap();
        assert_eq!(model.backend(), Some(Backend::Cpu));
    }

    #[test]
    fn labels_are_indexed_in_first_seen_order() {
        let mut model = MlpClassifier::default();
        model.add_example(features(0, 1.0, 1.0), "Greed");
        model.add_example(features(1, 1.0, 1.0), "Fear");
        model.add_example(features(2, 1.0, 1.0), "Greed");
        assert_eq!(model.classes(), ["Greed".to_string(), "Fear".to_string()]);
        assert_eq!(model.example_count(), 3);
    }

    #[test]
    fn normalize_fails_without_examples() {
        let mut model = MlpClassifier::default();
        assert!(matches!(model.normalize(), Err(ClassifierError::Normalize(_))));
        assert!(!model.is_normalized());
    }

    #[test]
    fn classify_before_training_replies_with_error() {
        let model = MlpClassifier::default();
        match model.classify(&features(0, 1.0, 1.0)) {
            ClassifyReply::Callback { error, results } => {
                assert!(error.is_some());
                assert!(results.is_none());
            }
            other => panic!("unexpected reply {other:?}"),
        }
    }

    #[test]
    fn trained_model_replies_with_sorted_candidates() {
        let mut model = MlpClassifier::default();
        for i in 0..30 {
            let label = if i % 2 == 0 { "Fear" } else { "Greed" };
            let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
            model.add_example(features(i, 1000.0 * sign, 10.0 * sign), label);
        }
        model.normalize().unwrap();
        let mut epochs = 0;
        model
            .train(
                &TrainConfig {
                    epochs: 5,
                    batch_size: 8,
                },
                &mut |_| epochs += 1,
            )
            .unwrap();
        assert_eq!(epochs, 5);

        let ClassifyReply::Callback {
            error: None,
            results: Some(Value::Array(results)),
        } = model.classify(&features(4, 1000.0, 10.0))
        else {
            panic!("expected callback results");
        };
        assert_eq!(results.len(), 2);
        let first = results[0]["confidence"].as_f64().unwrap();
        let second = results[1]["confidence"].as_f64().unwrap();
        assert!(first >= second);
    }
}
