//! End-to-end training run: load, encode, split, fit, evaluate, persist.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

use crate::artifacts::{
    ArtifactError, ArtifactStore, GRADIENT_BOOSTING_MODEL, RANDOM_FOREST_MODEL, RECOVERY_REGRESSOR,
    STATUS_CLASSIFIER,
};
use crate::config::{ConfigError, TrainingConfig};
use crate::dataset::{
    DatasetLoadError, FeatureSchema, LoadedDataset, SplitError, load_dataset, train_test_split,
};
use crate::encoding::{EncodeError, RouteEncoder};
use crate::evaluation::{
    ClassifierEvaluation, RegressorEvaluation, evaluate_classifier, evaluate_regressor,
};
use crate::features::{FeatureBuilder, FeatureError, FeatureMatrix};
use crate::ml::{
    GbdtModel, ModelError, RandomForestClassifier, RandomForestRegressor, train_gbdt,
    train_random_forest, train_random_forest_regressor,
};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Dataset(#[from] DatasetLoadError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Features(#[from] FeatureError),
    #[error(transparent)]
    Split(#[from] SplitError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    #[error("dataset was loaded with the {found} schema but the run is configured for {expected}")]
    SchemaMismatch {
        expected: FeatureSchema,
        found: FeatureSchema,
    },
}

/// Model family stored under the `status_classifier` alias.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusModel {
    RandomForest,
    GradientBoosting,
}

impl StatusModel {
    pub fn for_schema(schema: FeatureSchema) -> Self {
        match schema {
            FeatureSchema::Basic => Self::RandomForest,
            FeatureSchema::Advanced => Self::GradientBoosting,
        }
    }

    pub fn artifact_name(self) -> &'static str {
        match self {
            Self::RandomForest => RANDOM_FOREST_MODEL,
            Self::GradientBoosting => GRADIENT_BOOSTING_MODEL,
        }
    }
}

/// Everything fitted by one run.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainedModels {
    pub schema: FeatureSchema,
    pub encoder: RouteEncoder,
    pub random_forest: RandomForestClassifier,
    pub gradient_boosting: GbdtModel,
    pub regressor: Option<RandomForestRegressor>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SplitSummary {
    pub train_rows: usize,
    pub test_rows: usize,
    /// Row count per class index.
    pub train_class_counts: Vec<usize>,
    pub test_class_counts: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingReport {
    pub schema: FeatureSchema,
    pub rows: usize,
    pub routes: usize,
    pub classes: Vec<String>,
    pub split: SplitSummary,
    pub random_forest: ClassifierEvaluation,
    pub gradient_boosting: ClassifierEvaluation,
    /// `(feature, importance)` from the random forest, most important first.
    pub feature_importances: Vec<(String, f32)>,
    pub regressor: Option<RegressorEvaluation>,
    pub status_model: StatusModel,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingOutcome {
    pub models: TrainedModels,
    pub report: TrainingReport,
}

/// Load the configured dataset, train, and persist every artifact.
pub fn run_training(config: &TrainingConfig) -> Result<(TrainingOutcome, Vec<PathBuf>), PipelineError> {
    config.validate()?;
    let path = config.dataset_path()?;
    tracing::info!(path = %path.display(), schema = %config.schema, "Loading dataset");
    let dataset = load_dataset(path, config.schema, config.delimiter_byte())?;
    let outcome = train_from_dataset(&dataset, config)?;
    let store = ArtifactStore::new(&config.artifact_dir);
    let written = persist(&outcome.models, &store)?;
    Ok((outcome, written))
}

/// Fit and evaluate every configured model on an in-memory dataset.
pub fn train_from_dataset(
    dataset: &LoadedDataset,
    config: &TrainingConfig,
) -> Result<TrainingOutcome, PipelineError> {
    if dataset.schema != config.schema {
        return Err(PipelineError::SchemaMismatch {
            expected: config.schema,
            found: dataset.schema,
        });
    }
    let schema = config.schema;
    let encoder = RouteEncoder::fit(dataset.route_ids())?;
    tracing::info!(rows = dataset.len(), routes = encoder.len(), "Fitted route encoder");
    let matrix = FeatureBuilder::new(schema, &encoder).build_matrix(&dataset.observations)?;

    let split = train_test_split(matrix.len(), config.test_fraction, config.seed)?;
    let train = matrix.select(&split.train);
    let test = matrix.select(&split.test);
    let train_set = train.classification();
    let test_set = test.classification();
    let split_summary = SplitSummary {
        train_rows: train.len(),
        test_rows: test.len(),
        train_class_counts: train_set.class_counts(),
        test_class_counts: test_set.class_counts(),
    };
    tracing::info!(
        train = split_summary.train_rows,
        test = split_summary.test_rows,
        "Split dataset"
    );

    let forest_options = config.forest_options();
    tracing::info!(trees = forest_options.n_estimators, "Training random forest");
    let random_forest = train_random_forest(&train_set, &forest_options)?;
    let boosting_options = config.gbdt_options();
    tracing::info!(
        rounds = boosting_options.rounds,
        learning_rate = boosting_options.learning_rate,
        max_depth = boosting_options.max_depth,
        "Training gradient boosting"
    );
    let gradient_boosting = train_gbdt(&train_set, &boosting_options)?;

    let rf_eval = evaluate_classifier(&random_forest, &test_set, &config.thresholds)?;
    let gb_eval = evaluate_classifier(&gradient_boosting, &test_set, &config.thresholds)?;
    tracing::info!(
        random_forest = rf_eval.accuracy(),
        gradient_boosting = gb_eval.accuracy(),
        "Held-out accuracy"
    );

    let (regressor, regressor_eval) = fit_regressor(config, &train, &test)?.unzip();

    let feature_importances = random_forest.ranked_importances();
    let report = TrainingReport {
        schema,
        rows: matrix.len(),
        routes: encoder.len(),
        classes: schema.class_name_vec(),
        split: split_summary,
        random_forest: rf_eval,
        gradient_boosting: gb_eval,
        feature_importances,
        regressor: regressor_eval,
        status_model: StatusModel::for_schema(schema),
    };
    Ok(TrainingOutcome {
        models: TrainedModels {
            schema,
            encoder,
            random_forest,
            gradient_boosting,
            regressor,
        },
        report,
    })
}

fn fit_regressor(
    config: &TrainingConfig,
    train: &FeatureMatrix,
    test: &FeatureMatrix,
) -> Result<Option<(RandomForestRegressor, RegressorEvaluation)>, PipelineError> {
    let Some(options) = config.regressor_options() else {
        return Ok(None);
    };
    let (Some(train_set), Some(test_set)) = (train.regression(), test.regression()) else {
        tracing::warn!(schema = %config.schema, "No recovery target; skipping regressor");
        return Ok(None);
    };
    let Some(suspended) = config.schema.suspended_class() else {
        return Ok(None);
    };
    tracing::info!(trees = options.n_estimators, "Training recovery-time regressor");
    let model = train_random_forest_regressor(&train_set, &options)?;
    let evaluation = evaluate_regressor(&model, &test_set, &test.targets, suspended)?;
    Ok(Some((model, evaluation)))
}

/// Write every fitted model and the encoder to `store`.
pub fn persist(models: &TrainedModels, store: &ArtifactStore) -> Result<Vec<PathBuf>, ArtifactError> {
    let mut written = vec![
        store.save_route_encoder(&models.encoder)?,
        store.save_random_forest(RANDOM_FOREST_MODEL, &models.random_forest)?,
        store.save_gbdt(GRADIENT_BOOSTING_MODEL, &models.gradient_boosting)?,
    ];
    written.push(match StatusModel::for_schema(models.schema) {
        StatusModel::RandomForest => store.save_random_forest(STATUS_CLASSIFIER, &models.random_forest)?,
        StatusModel::GradientBoosting => store.save_gbdt(STATUS_CLASSIFIER, &models.gradient_boosting)?,
    });
    if let Some(regressor) = &models.regressor {
        written.push(store.save_regressor(regressor)?);
    }
    tracing::info!(count = written.len(), dir = %store.root().display(), "Persisted artifacts");
    Ok(written)
}

/// Scores of persisted artifacts against a dataset, without refitting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtifactEvaluation {
    pub rows: usize,
    /// `(artifact name, evaluation)` for each classifier found in the store.
    pub classifiers: Vec<(String, ClassifierEvaluation)>,
    pub regressor: Option<RegressorEvaluation>,
}

/// Evaluate whatever classifiers and regressor `store` holds on every row of `dataset`.
pub fn evaluate_artifacts(
    store: &ArtifactStore,
    dataset: &LoadedDataset,
    thresholds: &[f32],
) -> Result<ArtifactEvaluation, PipelineError> {
    let encoder = store.load_route_encoder()?;
    let matrix = FeatureBuilder::new(dataset.schema, &encoder).build_matrix(&dataset.observations)?;
    let data = matrix.classification();

    let mut classifiers = Vec::new();
    for name in [RANDOM_FOREST_MODEL, GRADIENT_BOOSTING_MODEL, STATUS_CLASSIFIER] {
        if !store.contains(name) {
            continue;
        }
        let model = store.load_classifier(name)?;
        classifiers.push((name.to_string(), evaluate_classifier(&model, &data, thresholds)?));
    }

    let regressor = match (
        store.contains(RECOVERY_REGRESSOR),
        matrix.regression(),
        dataset.schema.suspended_class(),
    ) {
        (true, Some(reg_data), Some(suspended)) => {
            let model = store.load_regressor()?;
            Some(evaluate_regressor(&model, &reg_data, &matrix.targets, suspended)?)
        }
        _ => None,
    };

    Ok(ArtifactEvaluation {
        rows: matrix.len(),
        classifiers,
        regressor,
    })
}
