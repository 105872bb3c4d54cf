//! Bagged random forests for classification and regression.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::tree::{DecisionTree, MaxFeatures, Targets, TreeParams};
use super::{
    ClassWeight, Classifier, ModelError, RegressionDataset, Regressor, TrainDataset, check_width,
};

/// Current on-disk format of forest models.
pub const FOREST_MODEL_VERSION: i64 = 1;

/// Forest hyperparameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ForestOptions {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    /// Draw a bootstrap sample per tree; otherwise every tree sees every row.
    pub bootstrap: bool,
    /// Ignored by the regressor.
    pub class_weight: ClassWeight,
    pub seed: u64,
}

impl ForestOptions {
    /// Classification defaults: 100 trees, `sqrt` features per split.
    pub fn classifier() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
            bootstrap: true,
            class_weight: ClassWeight::None,
            seed: 42,
        }
    }

    /// Regression defaults: 100 trees, every feature per split.
    pub fn regressor() -> Self {
        Self {
            max_features: MaxFeatures::All,
            ..Self::classifier()
        }
    }

    fn tree_params(&self) -> TreeParams {
        TreeParams {
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            min_samples_leaf: self.min_samples_leaf,
            max_features: self.max_features,
        }
    }

    fn validate(&self) -> Result<(), ModelError> {
        if self.n_estimators == 0 {
            return Err(ModelError::InvalidParameter(
                "n_estimators must be at least 1".to_string(),
            ));
        }
        if self.max_depth == Some(0) {
            return Err(ModelError::InvalidParameter(
                "max_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Random forest classifier; probabilities are the mean of the trees' leaf distributions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestClassifier {
    pub model_version: i64,
    pub feature_names: Vec<String>,
    pub classes: Vec<String>,
    pub class_weight: ClassWeight,
    pub trees: Vec<DecisionTree>,
    /// Normalised mean impurity decrease per feature; sums to 1 unless no tree split.
    pub feature_importances: Vec<f32>,
}

/// Random forest regressor; the prediction is the mean of the trees' leaf means.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestRegressor {
    pub model_version: i64,
    pub feature_names: Vec<String>,
    pub trees: Vec<DecisionTree>,
    pub feature_importances: Vec<f32>,
}

/// Fit a random forest classifier.
pub fn train_random_forest(
    dataset: &TrainDataset,
    options: &ForestOptions,
) -> Result<RandomForestClassifier, ModelError> {
    dataset.validate()?;
    options.validate()?;
    let n_classes = dataset.classes.len();
    let class_weights = options.class_weight.sample_weights(&dataset.y, n_classes);
    let targets = Targets::Classes {
        y: &dataset.y,
        n_classes,
    };
    let trees = fit_trees(&dataset.x, targets, &class_weights, options);
    let feature_importances = mean_importances(&trees, dataset.feature_names.len());
    tracing::debug!(
        trees = trees.len(),
        max_depth = trees.iter().map(DecisionTree::depth).max().unwrap_or(0),
        "Fitted random forest classifier"
    );
    Ok(RandomForestClassifier {
        model_version: FOREST_MODEL_VERSION,
        feature_names: dataset.feature_names.clone(),
        classes: dataset.classes.clone(),
        class_weight: options.class_weight,
        trees,
        feature_importances,
    })
}

/// Fit a random forest regressor.
pub fn train_random_forest_regressor(
    dataset: &RegressionDataset,
    options: &ForestOptions,
) -> Result<RandomForestRegressor, ModelError> {
    dataset.validate()?;
    options.validate()?;
    let weights = vec![1.0; dataset.y.len()];
    let trees = fit_trees(&dataset.x, Targets::Values(&dataset.y), &weights, options);
    let feature_importances = mean_importances(&trees, dataset.feature_names.len());
    tracing::debug!(trees = trees.len(), "Fitted random forest regressor");
    Ok(RandomForestRegressor {
        model_version: FOREST_MODEL_VERSION,
        feature_names: dataset.feature_names.clone(),
        trees,
        feature_importances,
    })
}

/// Grow `n_estimators` trees from one seeded generator, in order.
fn fit_trees(
    x: &[Vec<f32>],
    targets: Targets<'_>,
    base_weights: &[f64],
    options: &ForestOptions,
) -> Vec<DecisionTree> {
    let n = x.len();
    let params = options.tree_params();
    let mut rng = StdRng::seed_from_u64(options.seed);
    let mut trees = Vec::with_capacity(options.n_estimators);
    for _ in 0..options.n_estimators {
        let (samples, weights) = if options.bootstrap {
            bootstrap(n, base_weights, &mut rng)
        } else {
            ((0..n).collect(), base_weights.to_vec())
        };
        trees.push(DecisionTree::fit(x, targets, &weights, samples, &params, &mut rng));
    }
    trees
}

/// Draw `n` rows with replacement; a row drawn `k` times gets `k` times its weight.
fn bootstrap<R: Rng>(n: usize, base_weights: &[f64], rng: &mut R) -> (Vec<usize>, Vec<f64>) {
    let mut counts = vec![0u32; n];
    for _ in 0..n {
        counts[rng.random_range(0..n)] += 1;
    }
    let samples = (0..n).filter(|&idx| counts[idx] > 0).collect();
    let weights = base_weights
        .iter()
        .zip(&counts)
        .map(|(&weight, &count)| weight * count as f64)
        .collect();
    (samples, weights)
}

fn mean_importances(trees: &[DecisionTree], n_features: usize) -> Vec<f32> {
    let mut sums = vec![0.0f64; n_features];
    let mut contributing = 0usize;
    for tree in trees {
        let total: f64 = tree.impurity_decrease.iter().sum();
        if total <= 0.0 {
            continue;
        }
        contributing += 1;
        for (sum, value) in sums.iter_mut().zip(&tree.impurity_decrease) {
            *sum += value / total;
        }
    }
    if contributing == 0 {
        return vec![0.0; n_features];
    }
    let total: f64 = sums.iter().sum();
    sums.into_iter().map(|sum| (sum / total) as f32).collect()
}

fn validate_trees(
    trees: &[DecisionTree],
    n_features: usize,
    n_outputs: usize,
) -> Result<(), ModelError> {
    if trees.is_empty() {
        return Err(ModelError::InvalidModel("forest has no trees".to_string()));
    }
    for (idx, tree) in trees.iter().enumerate() {
        if tree.n_outputs != n_outputs {
            return Err(ModelError::InvalidModel(format!(
                "tree {idx} has {} outputs, expected {n_outputs}",
                tree.n_outputs
            )));
        }
        tree.validate(n_features)
            .map_err(|err| ModelError::InvalidModel(format!("tree {idx}: {err}")))?;
    }
    Ok(())
}

impl RandomForestClassifier {
    /// Validate structural invariants after loading.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.model_version != FOREST_MODEL_VERSION {
            return Err(ModelError::InvalidModel(format!(
                "unsupported forest model_version {}",
                self.model_version
            )));
        }
        if self.classes.len() < 2 {
            return Err(ModelError::TooFewClasses(self.classes.len()));
        }
        validate_trees(&self.trees, self.feature_names.len(), self.classes.len())
    }

    /// `(feature, importance)` pairs sorted by descending importance.
    pub fn ranked_importances(&self) -> Vec<(String, f32)> {
        let mut ranked: Vec<(String, f32)> = self
            .feature_names
            .iter()
            .cloned()
            .zip(self.feature_importances.iter().copied())
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }
}

impl Classifier for RandomForestClassifier {
    fn classes(&self) -> &[String] {
        &self.classes
    }

    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn predict_proba(&self, features: &[f32]) -> Result<Vec<f32>, ModelError> {
        check_width(&self.feature_names, features)?;
        let mut proba = vec![0.0f32; self.classes.len()];
        for tree in &self.trees {
            for (acc, value) in proba.iter_mut().zip(tree.predict(features)) {
                *acc += value;
            }
        }
        let n_trees = self.trees.len().max(1) as f32;
        for value in &mut proba {
            *value /= n_trees;
        }
        Ok(proba)
    }
}

impl RandomForestRegressor {
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.model_version != FOREST_MODEL_VERSION {
            return Err(ModelError::InvalidModel(format!(
                "unsupported forest model_version {}",
                self.model_version
            )));
        }
        validate_trees(&self.trees, self.feature_names.len(), 1)
    }
}

impl Regressor for RandomForestRegressor {
    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn predict(&self, features: &[f32]) -> Result<f32, ModelError> {
        check_width(&self.feature_names, features)?;
        let sum: f64 = self
            .trees
            .iter()
            .map(|tree| tree.predict(features).first().copied().unwrap_or(0.0) as f64)
            .sum();
        Ok((sum / self.trees.len().max(1) as f64) as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separable_dataset() -> TrainDataset {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..30 {
            let gust = i as f32;
            x.push(vec![(i % 3) as f32, gust, 0.5]);
            y.push(if gust < 10.0 {
                0
            } else if gust < 20.0 {
                1
            } else {
                2
            });
        }
        TrainDataset {
            feature_names: vec!["route_code".into(), "wind_gust".into(), "noise".into()],
            classes: vec!["normal".into(), "delayed".into(), "suspended".into()],
            x,
            y,
        }
    }

    #[test]
    fn forest_is_deterministic_and_learns_separable_classes() {
        let dataset = separable_dataset();
        let options = ForestOptions {
            n_estimators: 25,
            ..ForestOptions::classifier()
        };
        let a = train_random_forest(&dataset, &options).unwrap();
        let b = train_random_forest(&dataset, &options).unwrap();
        assert_eq!(a, b);
        a.validate().unwrap();

        assert_eq!(a.predict_class_index(&[0.0, 2.0, 0.5]).unwrap(), 0);
        assert_eq!(a.predict_class_index(&[1.0, 15.0, 0.5]).unwrap(), 1);
        assert_eq!(a.predict_class_index(&[2.0, 28.0, 0.5]).unwrap(), 2);
        let proba = a.predict_proba(&[0.0, 15.0, 0.5]).unwrap();
        assert!((proba.iter().sum::<f32>() - 1.0).abs() < 1e-5);

        let ranked = a.ranked_importances();
        assert_eq!(ranked[0].0, "wind_gust");
        assert_eq!(ranked.last().map(|(_, value)| *value), Some(0.0));
    }

    #[test]
    fn different_seeds_grow_different_forests() {
        let dataset = separable_dataset();
        let a = train_random_forest(&dataset, &ForestOptions::classifier()).unwrap();
        let b = train_random_forest(
            &dataset,
            &ForestOptions {
                seed: 7,
                ..ForestOptions::classifier()
            },
        )
        .unwrap();
        assert_ne!(a.trees, b.trees);
    }

    #[test]
    fn wrong_width_is_an_error_not_a_guess() {
        let dataset = separable_dataset();
        let model = train_random_forest(
            &dataset,
            &ForestOptions {
                n_estimators: 3,
                ..ForestOptions::classifier()
            },
        )
        .unwrap();
        assert_eq!(
            model.predict_proba(&[1.0, 2.0]).unwrap_err(),
            ModelError::FeatureWidth {
                expected: 3,
                found: 2
            }
        );
    }

    #[test]
    fn balanced_weights_still_fit_with_a_missing_class() {
        let mut dataset = separable_dataset();
        dataset.y.iter_mut().for_each(|label| *label = (*label).min(1));
        let options = ForestOptions {
            n_estimators: 10,
            class_weight: ClassWeight::Balanced,
            ..ForestOptions::classifier()
        };
        let model = train_random_forest(&dataset, &options).unwrap();
        let proba = model.predict_proba(&[0.0, 25.0, 0.5]).unwrap();
        assert_eq!(proba.len(), 3);
        assert_eq!(proba[2], 0.0);
    }

    #[test]
    fn regressor_tracks_the_target() {
        let x: Vec<Vec<f32>> = (0..40).map(|i| vec![i as f32, 1.0]).collect();
        let y: Vec<f32> = (0..40).map(|i| if i < 20 { 0.0 } else { 6.0 }).collect();
        let dataset = RegressionDataset {
            feature_names: vec!["wind_gust".into(), "month".into()],
            x,
            y,
        };
        let options = ForestOptions {
            n_estimators: 20,
            ..ForestOptions::regressor()
        };
        let model = train_random_forest_regressor(&dataset, &options).unwrap();
        model.validate().unwrap();
        assert!(model.predict(&[3.0, 1.0]).unwrap() < 0.5);
        assert!(model.predict(&[35.0, 1.0]).unwrap() > 5.5);
        assert!(model.predict(&[35.0]).is_err());
    }

    #[test]
    fn zero_trees_is_rejected() {
        let options = ForestOptions {
            n_estimators: 0,
            ..ForestOptions::classifier()
        };
        assert!(matches!(
            train_random_forest(&separable_dataset(), &options),
            Err(ModelError::InvalidParameter(_))
        ));
    }
}
