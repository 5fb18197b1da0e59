use serde::{Deserialize, Serialize};

/// Number of input features: date offset, volume, rate.
pub const FEATURE_LEN: usize = 3;

/// Per-feature standardisation applied before the first layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureScaling {
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
}

impl FeatureScaling {
    /// Scaling that leaves inputs unchanged.
    pub fn identity() -> Self {
        Self {
            mean: vec![0.0; FEATURE_LEN],
            std: vec![1.0; FEATURE_LEN],
        }
    }

    pub fn from_rows(rows: &[[f64; FEATURE_LEN]]) -> Result<Self, String> {
        if rows.is_empty() {
            return Err("Empty dataset".to_string());
        }
        let n = rows.len() as f64;
        let mut mean = vec![0.0f64; FEATURE_LEN];
        for row in rows {
            for i in 0..FEATURE_LEN {
                mean[i] += row[i];
            }
        }
        for v in &mut mean {
            *v /= n;
        }
        let mut std = vec![0.0f64; FEATURE_LEN];
        for row in rows {
            for i in 0..FEATURE_LEN {
                let diff = row[i] - mean[i];
                std[i] += diff * diff;
            }
        }
        for v in &mut std {
            *v = (*v / n).sqrt();
        }
        if mean.iter().chain(std.iter()).any(|v| !v.is_finite()) {
            return Err("Feature statistics are not finite".to_string());
        }
        Ok(Self { mean, std })
    }

    pub fn apply(&self, raw: &[f64; FEATURE_LEN]) -> Vec<f32> {
        (0..FEATURE_LEN)
            .map(|i| ((raw[i] - self.mean[i]) / self.std[i].max(1e-9)) as f32)
            .collect()
    }
}

/// One-hidden-layer ReLU network with a softmax head.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlpModel {
    pub classes: Vec<String>,
    pub hidden_size: usize,
    pub weights1: Vec<f32>,
    pub bias1: Vec<f32>,
    pub weights2: Vec<f32>,
    pub bias2: Vec<f32>,
    pub scaling: FeatureScaling,
}

impl MlpModel {
    pub fn validate(&self) -> Result<(), String> {
        let hidden = self.hidden_size;
        let classes = self.classes.len();
        if self.weights1.len() != FEATURE_LEN * hidden {
            return Err("weights1 length mismatch".to_string());
        }
        if self.bias1.len() != hidden {
            return Err("bias1 length mismatch".to_string());
        }
        if self.weights2.len() != classes * hidden {
            return Err("weights2 length mismatch".to_string());
        }
        if self.bias2.len() != classes {
            return Err("bias2 length mismatch".to_string());
        }
        if self.scaling.mean.len() != FEATURE_LEN || self.scaling.std.len() != FEATURE_LEN {
            return Err("scaling length mismatch".to_string());
        }
        Ok(())
    }

    /// Class probabilities for raw (unscaled) features, aligned with `classes`.
    pub fn predict_proba(&self, features: &[f64; FEATURE_LEN]) -> Vec<f32> {
        let hidden = self.hidden_size;
        let classes = self.classes.len();
        if classes == 0 || hidden == 0 {
            return Vec::new();
        }
        let normalized = self.scaling.apply(features);

        let mut hidden_act = vec![0.0f32; hidden];
        for h in 0..hidden {
            let mut sum = self.bias1[h];
            let base = h * FEATURE_LEN;
            for i in 0..FEATURE_LEN {
                sum += self.weights1[base + i] * normalized[i];
            }
            hidden_act[h] = sum.max(0.0);
        }

        let mut logits = vec![0.0f32; classes];
        for c in 0..classes {
            let mut sum = self.bias2[c];
            let base = c * hidden;
            for h in 0..hidden {
                sum += self.weights2[base + h] * hidden_act[h];
            }
            logits[c] = sum;
        }

        softmax(&logits)
    }
}

/// Numerically-stable softmax over a set of logits.
pub fn softmax(raw: &[f32]) -> Vec<f32> {
    if raw.is_empty() {
        return Vec::new();
    }
    let max = raw
        .iter()
        .copied()
        .fold(f32::NEG_INFINITY, |a, b| a.max(b));
    let mut exps = Vec::with_capacity(raw.len());
    let mut sum = 0.0f32;
    for &v in raw {
        let e = (v - max).exp();
        exps.push(e);
        sum += e;
    }
    if sum == 0.0 {
        return vec![1.0 / raw.len() as f32; raw.len()];
    }
    for v in &mut exps {
        *v /= sum;
    }
    exps
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn softmax_output_sums_to_one() {
        let model = MlpModel {
            classes: vec!["Fear".into(), "Greed".into()],
            hidden_size: 2,
            weights1: vec![0.0; FEATURE_LEN * 2],
            bias1: vec![0.0; 2],
            weights2: vec![0.0; 2 * 2],
            bias2: vec![0.0; 2],
            scaling: FeatureScaling::identity(),
        };
        model.validate().unwrap();
        let out = model.predict_proba(&[0.0, 0.0, 0.0]);
        let sum: f32 = out.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
    }

    #[test]
    fn scaling_standardises_each_column() {
        let scaling = FeatureScaling::from_rows(&[[0.0, 10.0, 5.0], [2.0, 30.0, 5.0]]).unwrap();
        assert_eq!(scaling.mean, vec![1.0, 20.0, 5.0]);
        assert_eq!(scaling.std, vec![1.0, 10.0, 0.0]);
        let scaled = scaling.apply(&[2.0, 10.0, 5.0]);
        assert_eq!(scaled, vec![1.0, -1.0, 0.0]);
    }

    #[test]
    fn scaling_rejects_empty_dataset() {
        assert!(FeatureScaling::from_rows(&[]).is_err());
    }
}
