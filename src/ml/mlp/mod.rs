//! Lightweight MLP classifier over the `[date, volume, rate]` feature vector.

mod classifier;
mod model;
mod train;

pub use classifier::MlpClassifier;
pub use model::{FEATURE_LEN, FeatureScaling, MlpModel, softmax};
pub use train::{TrainDataset, TrainOptions, train_mlp};
