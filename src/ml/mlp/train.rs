use rand::rngs::StdRng;
use rand::{Rng, SeedableRng, seq::SliceRandom};

use super::model::{FEATURE_LEN, FeatureScaling, MlpModel, softmax};

/// Scaled feature rows with class indices.
#[derive(Debug, Clone)]
pub struct TrainDataset {
    pub classes: Vec<String>,
    pub x: Vec<Vec<f32>>,
    pub y: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct TrainOptions {
    pub hidden_size: usize,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f32,
    pub l2_penalty: f32,
    pub balance_classes: bool,
    pub seed: u64,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            hidden_size: 16,
            epochs: 32,
            batch_size: 32,
            learning_rate: 0.05,
            l2_penalty: 1e-4,
            balance_classes: true,
            seed: 42,
        }
    }
}

/// Train an MLP, reporting `(epoch, mean loss)` after every epoch.
pub fn train_mlp(
    dataset: &TrainDataset,
    scaling: &FeatureScaling,
    options: &TrainOptions,
    on_epoch: &mut dyn FnMut(usize, f64),
) -> Result<MlpModel, String> {
    if dataset.x.len() != dataset.y.len() {
        return Err("Mismatched X/Y lengths".to_string());
    }
    if dataset.x.is_empty() {
        return Err("Empty dataset".to_string());
    }
    let n_classes = dataset.classes.len();
    if n_classes < 2 {
        return Err("Need at least 2 classes".to_string());
    }
    let n = dataset.x.len();
    let d = FEATURE_LEN;
    let hidden = options.hidden_size.max(1);
    let batch_size = options.batch_size.max(1);

    let mut rng = StdRng::seed_from_u64(options.seed);
    let mut weights1 = vec![0.0f32; hidden * d];
    let mut bias1 = vec![0.0f32; hidden];
    let mut weights2 = vec![0.0f32; n_classes * hidden];
    let mut bias2 = vec![0.0f32; n_classes];
    for w in &mut weights1 {
        *w = (rng.random::<f32>() - 0.5) * 0.5;
    }
    for w in &mut weights2 {
        *w = (rng.random::<f32>() - 0.5) * 0.5;
    }

    let class_weights = class_weights(&dataset.y, n_classes, options.balance_classes);
    let mut indices: Vec<usize> = (0..n).collect();
    let mut hidden_act = vec![0.0f32; hidden];
    let mut hidden_pre = vec![0.0f32; hidden];
    let mut logits = vec![0.0f32; n_classes];

    for epoch in 0..options.epochs {
        indices.shuffle(&mut rng);
        let mut epoch_loss = 0.0f64;
        let mut epoch_weight = 0.0f64;
        for batch in indices.chunks(batch_size) {
            let mut d_w1 = vec![0.0f32; weights1.len()];
            let mut d_b1 = vec![0.0f32; bias1.len()];
            let mut d_w2 = vec![0.0f32; weights2.len()];
            let mut d_b2 = vec![0.0f32; bias2.len()];
            let mut batch_weight = 0.0f32;

            for &idx in batch {
                let x = &dataset.x[idx];
                let y = dataset.y[idx];
                if y >= n_classes || x.len() != d {
                    continue;
                }
                let weight = class_weights[y];
                if weight == 0.0 {
                    continue;
                }

                for h in 0..hidden {
                    let mut sum = bias1[h];
                    let base = h * d;
                    for i in 0..d {
                        sum += weights1[base + i] * x[i];
                    }
                    hidden_pre[h] = sum;
                    hidden_act[h] = sum.max(0.0);
                }
                for c in 0..n_classes {
                    let mut sum = bias2[c];
                    let base = c * hidden;
                    for h in 0..hidden {
                        sum += weights2[base + h] * hidden_act[h];
                    }
                    logits[c] = sum;
                }
                let probs = softmax(&logits);
                epoch_loss += -f64::from(probs[y].max(1e-7).ln()) * f64::from(weight);
                epoch_weight += f64::from(weight);

                let mut d_hidden = vec![0.0f32; hidden];
                for c in 0..n_classes {
                    let target = if c == y { 1.0 } else { 0.0 };
                    let dz2 = probs[c] - target;
                    d_b2[c] += dz2 * weight;
                    let base = c * hidden;
                    for h in 0..hidden {
                        d_w2[base + h] += dz2 * hidden_act[h] * weight;
                        d_hidden[h] += dz2 * weights2[base + h] * weight;
                    }
                }
                for h in 0..hidden {
                    if hidden_pre[h] <= 0.0 {
                        d_hidden[h] = 0.0;
                    }
                    d_b1[h] += d_hidden[h];
                    let base = h * d;
                    for i in 0..d {
                        d_w1[base + i] += d_hidden[h] * x[i];
                    }
                }
                batch_weight += weight;
            }

            if batch_weight == 0.0 {
                continue;
            }
            let scale = options.learning_rate / batch_weight;
            let l2 = options.l2_penalty;
            for i in 0..weights1.len() {
                weights1[i] -= scale * (d_w1[i] + l2 * weights1[i]);
            }
            for i in 0..bias1.len() {
                bias1[i] -= scale * d_b1[i];
            }
            for i in 0..weights2.len() {
                weights2[i] -= scale * (d_w2[i] + l2 * weights2[i]);
            }
            for i in 0..bias2.len() {
                bias2[i] -= scale * d_b2[i];
            }
        }
        let mean_loss = if epoch_weight > 0.0 {
            epoch_loss / epoch_weight
        } else {
            0.0
        };
        on_epoch(epoch, mean_loss);
    }

    let model = MlpModel {
        classes: dataset.classes.clone(),
        hidden_size: hidden,
        weights1,
        bias1,
        weights2,
        bias2,
        scaling: scaling.clone(),
    };
    model.validate()?;
    Ok(model)
}

fn class_weights(labels: &[usize], n_classes: usize, balance: bool) -> Vec<f32> {
    if !balance {
        return vec![1.0; n_classes];
    }
    let mut counts = vec![0f32; n_classes];
    for &y in labels {
        if y < n_classes {
            counts[y] += 1.0;
        }
    }
    let total: f32 = counts.iter().sum();
    counts
        .into_iter()
        .map(|count| {
            if count == 0.0 {
                0.0
            } else {
                total / (n_classes as f32 * count)
            }
        })
        .collect()
}
