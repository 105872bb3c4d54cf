use serde::{Deserialize, Serialize};

use crate::ml::tree::DecisionTree;
use crate::ml::{Classifier, ModelError, check_width};

/// Current on-disk format of boosted models.
pub const GBDT_MODEL_VERSION: i64 = 1;

/// Gradient-boosted tree model for multi-class classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GbdtModel {
    /// Model format version.
    pub model_version: i64,
    /// Ordered feature names expected at prediction time.
    pub feature_names: Vec<String>,
    /// Ordered list of class identifiers.
    pub classes: Vec<String>,
    /// Learning rate applied to each tree prediction.
    pub learning_rate: f32,
    /// Initial raw logits before boosting rounds.
    pub init_raw: Vec<f32>,
    /// Shape: `[n_rounds][n_classes]`; every tree has a single output.
    pub trees: Vec<Vec<DecisionTree>>,
}

impl GbdtModel {
    /// Validate structural invariants of the model.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.model_version != GBDT_MODEL_VERSION {
            return Err(ModelError::InvalidModel(format!(
                "unsupported gbdt model_version {}",
                self.model_version
            )));
        }
        if self.classes.len() < 2 {
            return Err(ModelError::TooFewClasses(self.classes.len()));
        }
        if self.init_raw.len() != self.classes.len() {
            return Err(ModelError::InvalidModel(
                "init_raw length must match classes length".to_string(),
            ));
        }
        for (round_idx, round) in self.trees.iter().enumerate() {
            if round.len() != self.classes.len() {
                return Err(ModelError::InvalidModel(format!(
                    "round {round_idx} has {} trees but expected {}",
                    round.len(),
                    self.classes.len()
                )));
            }
            for tree in round {
                if tree.n_outputs != 1 {
                    return Err(ModelError::InvalidModel(format!(
                        "round {round_idx} holds a tree with {} outputs",
                        tree.n_outputs
                    )));
                }
                tree.validate(self.feature_names.len())
                    .map_err(|err| ModelError::InvalidModel(format!("round {round_idx}: {err}")))?;
            }
        }
        Ok(())
    }

    /// Predict raw logits for a feature vector.
    pub fn predict_raw(&self, features: &[f32]) -> Result<Vec<f32>, ModelError> {
        check_width(&self.feature_names, features)?;
        let mut raw = self.init_raw.clone();
        for round in &self.trees {
            for (class_idx, tree) in round.iter().enumerate() {
                let step = tree.predict(features).first().copied().unwrap_or(0.0);
                raw[class_idx] += self.learning_rate * step;
            }
        }
        Ok(raw)
    }

    pub fn n_rounds(&self) -> usize {
        self.trees.len()
    }
}

impl Classifier for GbdtModel {
    fn classes(&self) -> &[String] {
        &self.classes
    }

    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn predict_proba(&self, features: &[f32]) -> Result<Vec<f32>, ModelError> {
        Ok(softmax(&self.predict_raw(features)?))
    }
}

/// Compute a numerically-stable softmax for a set of logits.
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
    if sum == 0.0 || !sum.is_finite() {
        return vec![1.0 / raw.len() as f32; raw.len()];
    }
    for v in &mut exps {
        *v /= sum;
    }
    exps
}
