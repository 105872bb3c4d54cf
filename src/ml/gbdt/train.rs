use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::index;

use super::model::{GBDT_MODEL_VERSION, GbdtModel, softmax};
use crate::ml::tree::{DecisionTree, MaxFeatures, Targets, TreeParams};
use crate::ml::{ClassWeight, ModelError, TrainDataset};

/// Training hyperparameters for tree boosting.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainOptions {
    /// Number of boosting rounds.
    pub rounds: usize,
    /// Learning rate applied per round.
    pub learning_rate: f32,
    /// Depth limit of every tree.
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Fraction of rows drawn (without replacement) per round; 1.0 uses all rows.
    pub subsample: f32,
    pub class_weight: ClassWeight,
    /// Seed for row subsampling.
    pub seed: u64,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            rounds: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_leaf: 1,
            subsample: 1.0,
            class_weight: ClassWeight::None,
            seed: 42,
        }
    }
}

impl TrainOptions {
    fn validate(&self) -> Result<(), ModelError> {
        if self.rounds == 0 {
            return Err(ModelError::InvalidParameter("rounds must be at least 1".to_string()));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(ModelError::InvalidParameter(format!(
                "learning_rate must be > 0, got {}",
                self.learning_rate
            )));
        }
        if self.max_depth == 0 {
            return Err(ModelError::InvalidParameter("max_depth must be at least 1".to_string()));
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return Err(ModelError::InvalidParameter(format!(
                "subsample must be in (0, 1], got {}",
                self.subsample
            )));
        }
        Ok(())
    }
}

/// Train a multi-class boosted tree model using softmax gradient boosting.
pub fn train_gbdt(dataset: &TrainDataset, options: &TrainOptions) -> Result<GbdtModel, ModelError> {
    dataset.validate()?;
    options.validate()?;

    let n = dataset.x.len();
    let n_classes = dataset.classes.len();
    let weights = options.class_weight.sample_weights(&dataset.y, n_classes);
    let params = TreeParams {
        max_depth: Some(options.max_depth),
        min_samples_split: 2,
        min_samples_leaf: options.min_samples_leaf,
        max_features: MaxFeatures::All,
    };
    let mut rng = StdRng::seed_from_u64(options.seed);
    let subsample_n = ((n as f32) * options.subsample).ceil().clamp(1.0, n as f32) as usize;

    let priors = class_priors(&dataset.y, &weights, n_classes);
    let init_raw: Vec<f32> = priors.iter().map(|&p| p.max(1e-6).ln()).collect();
    let mut raw = vec![init_raw.clone(); n];

    let mut rounds_out: Vec<Vec<DecisionTree>> = Vec::with_capacity(options.rounds);
    for round in 0..options.rounds {
        let probs: Vec<Vec<f32>> = raw.iter().map(|r| softmax(r)).collect();
        let residuals = compute_residuals(&dataset.y, &probs, n_classes);
        let samples: Vec<usize> = if subsample_n < n {
            let mut picked = index::sample(&mut rng, n, subsample_n).into_vec();
            picked.sort_unstable();
            picked
        } else {
            (0..n).collect()
        };

        let mut trees_for_round = Vec::with_capacity(n_classes);
        for (class_idx, class_residuals) in residuals.iter().enumerate() {
            let mut tree = DecisionTree::fit(
                &dataset.x,
                Targets::Values(class_residuals),
                &weights,
                samples.clone(),
                &params,
                &mut rng,
            );
            apply_newton_leaves(&mut tree, &dataset.x, class_residuals, &weights, &samples, n_classes);
            for (row, raw_row) in dataset.x.iter().zip(raw.iter_mut()) {
                let step = tree.predict(row).first().copied().unwrap_or(0.0);
                raw_row[class_idx] += options.learning_rate * step;
            }
            trees_for_round.push(tree);
        }
        rounds_out.push(trees_for_round);
        if (round + 1) % 50 == 0 {
            tracing::debug!(round = round + 1, "Boosting progress");
        }
    }

    Ok(GbdtModel {
        model_version: GBDT_MODEL_VERSION,
        feature_names: dataset.feature_names.clone(),
        classes: dataset.classes.clone(),
        learning_rate: options.learning_rate,
        init_raw,
        trees: rounds_out,
    })
}

fn class_priors(y: &[usize], weights: &[f64], n_classes: usize) -> Vec<f32> {
    let mut totals = vec![0f64; n_classes];
    for (&label, &weight) in y.iter().zip(weights) {
        if label < n_classes {
            totals[label] += weight;
        }
    }
    let total: f64 = totals.iter().sum::<f64>().max(f64::MIN_POSITIVE);
    totals.into_iter().map(|t| (t / total) as f32).collect()
}

fn compute_residuals(y: &[usize], probs: &[Vec<f32>], n_classes: usize) -> Vec<Vec<f32>> {
    let n = y.len();
    let mut residuals = vec![vec![0.0f32; n]; n_classes];
    for i in 0..n {
        for (k, class_residuals) in residuals.iter_mut().enumerate() {
            let target = if y[i] == k { 1.0 } else { 0.0 };
            class_residuals[i] = target - probs[i][k];
        }
    }
    residuals
}

/// Replace each leaf's mean residual with the multinomial Newton step
/// `(K - 1) / K * sum(w r) / sum(w |r| (1 - |r|))`.
fn apply_newton_leaves(
    tree: &mut DecisionTree,
    x: &[Vec<f32>],
    residuals: &[f32],
    weights: &[f64],
    samples: &[usize],
    n_classes: usize,
) {
    let mut numerators = vec![0f64; tree.nodes.len()];
    let mut denominators = vec![0f64; tree.nodes.len()];
    for &sample in samples {
        let leaf = tree.leaf_index(&x[sample]);
        let r = residuals[sample] as f64;
        let w = weights[sample];
        numerators[leaf] += w * r;
        denominators[leaf] += w * r.abs() * (1.0 - r.abs());
    }
    let scale = (n_classes as f64 - 1.0) / n_classes as f64;
    for leaf in 0..tree.nodes.len() {
        let value = if denominators[leaf].abs() < 1e-12 {
            0.0
        } else {
            scale * numerators[leaf] / denominators[leaf]
        };
        tree.set_leaf_value(leaf, vec![value as f32]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::Classifier;

    fn storm_dataset() -> TrainDataset {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..45 {
            let gust = (i % 15) as f32 * 2.0;
            let snow = (i / 15) as f32;
            x.push(vec![snow, gust]);
            y.push(if gust >= 20.0 {
                2
            } else if gust >= 10.0 {
                1
            } else {
                0
            });
        }
        TrainDataset {
            feature_names: vec!["snowfall".into(), "wind_gust".into()],
            classes: vec!["normal".into(), "delayed".into(), "suspended".into()],
            x,
            y,
        }
    }

    #[test]
    fn boosting_fits_training_data_and_is_deterministic() {
        let dataset = storm_dataset();
        let options = TrainOptions {
            rounds: 30,
            ..TrainOptions::default()
        };
        let model = train_gbdt(&dataset, &options).unwrap();
        model.validate().unwrap();
        assert_eq!(model.n_rounds(), 30);
        for (row, &label) in dataset.x.iter().zip(&dataset.y) {
            assert_eq!(model.predict_class_index(row).unwrap(), label);
        }
        assert_eq!(train_gbdt(&dataset, &options).unwrap(), model);
    }

    #[test]
    fn subsampling_depends_on_seed() {
        let dataset = storm_dataset();
        let options = TrainOptions {
            rounds: 5,
            subsample: 0.5,
            ..TrainOptions::default()
        };
        let a = train_gbdt(&dataset, &options).unwrap();
        let b = train_gbdt(&dataset, &options).unwrap();
        let c = train_gbdt(
            &dataset,
            &TrainOptions {
                seed: 9,
                ..options.clone()
            },
        )
        .unwrap();
        assert_eq!(a, b);
        assert_ne!(a.trees, c.trees);
    }

    #[test]
    fn init_raw_reflects_weighted_priors() {
        let dataset = storm_dataset();
        let options = TrainOptions {
            rounds: 1,
            class_weight: ClassWeight::Balanced,
            ..TrainOptions::default()
        };
        let model = train_gbdt(&dataset, &options).unwrap();
        let expected = (1.0f32 / 3.0).ln();
        for value in &model.init_raw {
            assert!((value - expected).abs() < 1e-5);
        }
    }

    #[test]
    fn invalid_options_are_rejected() {
        let dataset = storm_dataset();
        for options in [
            TrainOptions {
                rounds: 0,
                ..TrainOptions::default()
            },
            TrainOptions {
                learning_rate: 0.0,
                ..TrainOptions::default()
            },
            TrainOptions {
                subsample: 1.5,
                ..TrainOptions::default()
            },
        ] {
            assert!(matches!(
                train_gbdt(&dataset, &options),
                Err(ModelError::InvalidParameter(_))
            ));
        }
    }
}
