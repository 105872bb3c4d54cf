//! Tree-ensemble models for disruption prediction.
//!
//! Everything here is deterministic for a fixed seed and hyperparameters:
//! - CART trees with weighted Gini or squared-error splits.
//! - Bagged random forests for status classification and recovery regression.
//! - Softmax gradient boosting of depth-limited regression trees.

pub mod forest;
pub mod gbdt;
pub mod metrics;
pub mod tree;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use forest::{
    FOREST_MODEL_VERSION, ForestOptions, RandomForestClassifier, RandomForestRegressor, train_random_forest,
    train_random_forest_regressor,
};
pub use gbdt::{GbdtModel, TrainOptions as GbdtOptions, softmax, train_gbdt};
pub use tree::{DecisionTree, MaxFeatures, Node, TreeParams};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("empty dataset")]
    EmptyDataset,
    #[error("mismatched lengths: {x} feature rows but {y} targets")]
    MismatchedLengths { x: usize, y: usize },
    #[error("need at least 2 classes, got {0}")]
    TooFewClasses(usize),
    #[error("label {label} is out of range for {n_classes} classes")]
    LabelOutOfRange { label: usize, n_classes: usize },
    #[error("feature vector has {found} values but the model expects {expected}")]
    FeatureWidth { expected: usize, found: usize },
    #[error("feature schema mismatch: model expects [{}], got [{}]", expected.join(", "), found.join(", "))]
    SchemaMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },
    #[error("non-finite regression target at row {0}")]
    NonFiniteTarget(usize),
    #[error("invalid hyperparameter: {0}")]
    InvalidParameter(String),
    #[error("invalid model: {0}")]
    InvalidModel(String),
}

/// In-memory classification dataset used for training and evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainDataset {
    /// Ordered feature names every row follows.
    pub feature_names: Vec<String>,
    /// Ordered class names; `y` holds indices into this list.
    pub classes: Vec<String>,
    /// Feature matrix, row-major.
    pub x: Vec<Vec<f32>>,
    /// Class indices aligned with `x`.
    pub y: Vec<usize>,
}

impl TrainDataset {
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.x.len() != self.y.len() {
            return Err(ModelError::MismatchedLengths {
                x: self.x.len(),
                y: self.y.len(),
            });
        }
        if self.x.is_empty() {
            return Err(ModelError::EmptyDataset);
        }
        let n_classes = self.classes.len();
        if n_classes < 2 {
            return Err(ModelError::TooFewClasses(n_classes));
        }
        if let Some(&label) = self.y.iter().find(|&&label| label >= n_classes) {
            return Err(ModelError::LabelOutOfRange { label, n_classes });
        }
        check_rows(&self.x, self.feature_names.len())
    }

    /// Row count per class index.
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.classes.len()];
        for &label in &self.y {
            if let Some(count) = counts.get_mut(label) {
                *count += 1;
            }
        }
        counts
    }
}

/// In-memory regression dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct RegressionDataset {
    pub feature_names: Vec<String>,
    pub x: Vec<Vec<f32>>,
    pub y: Vec<f32>,
}

impl RegressionDataset {
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.x.len() != self.y.len() {
            return Err(ModelError::MismatchedLengths {
                x: self.x.len(),
                y: self.y.len(),
            });
        }
        if self.x.is_empty() {
            return Err(ModelError::EmptyDataset);
        }
        if let Some(idx) = self.y.iter().position(|value| !value.is_finite()) {
            return Err(ModelError::NonFiniteTarget(idx));
        }
        check_rows(&self.x, self.feature_names.len())
    }
}

fn check_rows(x: &[Vec<f32>], width: usize) -> Result<(), ModelError> {
    match x.iter().find(|row| row.len() != width) {
        Some(row) => Err(ModelError::FeatureWidth {
            expected: width,
            found: row.len(),
        }),
        None => Ok(()),
    }
}

/// Per-sample weighting used to counter class imbalance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassWeight {
    /// Every sample weighs 1.
    #[default]
    None,
    /// `n_samples / (n_present_classes * class_count)`, so each present class
    /// contributes the same total weight.
    Balanced,
}

impl ClassWeight {
    pub fn sample_weights(self, y: &[usize], n_classes: usize) -> Vec<f64> {
        match self {
            Self::None => vec![1.0; y.len()],
            Self::Balanced => {
                let mut counts = vec![0usize; n_classes];
                for &label in y {
                    counts[label] += 1;
                }
                let present = counts.iter().filter(|&&count| count > 0).count().max(1);
                let n = y.len() as f64;
                y.iter()
                    .map(|&label| n / (present as f64 * counts[label] as f64))
                    .collect()
            }
        }
    }
}

impl std::str::FromStr for ClassWeight {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "none" => Ok(Self::None),
            "balanced" => Ok(Self::Balanced),
            other => Err(format!("Unknown class weight '{other}' (expected none or balanced)")),
        }
    }
}

/// A fitted model that scores rows against a fixed class list.
pub trait Classifier {
    /// Ordered class names the probabilities refer to.
    fn classes(&self) -> &[String];

    /// Ordered feature names the model was fitted on.
    fn feature_names(&self) -> &[String];

    /// Class probabilities for one feature vector; sums to 1.
    fn predict_proba(&self, features: &[f32]) -> Result<Vec<f32>, ModelError>;

    fn predict_class_index(&self, features: &[f32]) -> Result<usize, ModelError> {
        Ok(argmax(&self.predict_proba(features)?))
    }
}

/// A fitted model that predicts one continuous value per row.
pub trait Regressor {
    fn feature_names(&self) -> &[String];

    fn predict(&self, features: &[f32]) -> Result<f32, ModelError>;
}

/// Fail unless `features` has the width of the model's schema.
pub fn check_width(feature_names: &[String], features: &[f32]) -> Result<(), ModelError> {
    if features.len() != feature_names.len() {
        return Err(ModelError::FeatureWidth {
            expected: feature_names.len(),
            found: features.len(),
        });
    }
    Ok(())
}

/// Fail unless a model was fitted on exactly `expected`, in the same order.
pub fn check_schema(model_features: &[String], expected: &[String]) -> Result<(), ModelError> {
    if model_features != expected {
        return Err(ModelError::SchemaMismatch {
            expected: model_features.to_vec(),
            found: expected.to_vec(),
        });
    }
    Ok(())
}

/// Index of the largest value; the last one wins ties.
///
/// Classes are ordered by severity, so an even split resolves toward
/// disruption and a binary `[0.5, 0.5]` agrees with `P(class 1) >= 0.5`.
pub fn argmax(values: &[f32]) -> usize {
    let mut best_idx = 0usize;
    let mut best_val = f32::NEG_INFINITY;
    for (idx, &v) in values.iter().enumerate() {
        if v >= best_val {
            best_val = v;
            best_idx = idx;
        }
    }
    best_idx
}
