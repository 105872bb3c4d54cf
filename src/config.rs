//! Training configuration: schema defaults, an optional TOML file, then CLI flags.
//!
//! ```toml
//! schema = "advanced"
//! dataset = "data/disruptions.csv"
//! artifact_dir = "models"
//! test_fraction = 0.2
//! seed = 42
//! thresholds = [0.3, 0.4, 0.5]
//!
//! [gradient_boosting]
//! rounds = 200
//! max_depth = 5
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::app_dirs::{self, AppDirError};
use crate::dataset::FeatureSchema;
use crate::evaluation::DEFAULT_THRESHOLDS;
use crate::ml::{ClassWeight, ForestOptions, GbdtOptions, MaxFeatures};

pub const DEFAULT_SEED: u64 = 42;
pub const DEFAULT_TEST_FRACTION: f64 = 0.2;
pub const DEFAULT_ARTIFACT_DIR: &str = "models";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    AppDir(#[from] AppDirError),
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config at {path}: {source}")]
    ParseToml {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("No dataset given; pass --data or set `dataset` in the config file")]
    MissingDataset,
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Random forest hyperparameters shared by the classifier and the regressor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestSettings {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_leaf: usize,
    pub bootstrap: bool,
    pub class_weight: ClassWeight,
}

impl ForestSettings {
    fn classifier() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_leaf: 1,
            bootstrap: true,
            class_weight: ClassWeight::Balanced,
        }
    }

    fn regressor() -> Self {
        Self {
            class_weight: ClassWeight::None,
            ..Self::classifier()
        }
    }

    fn to_options(&self, seed: u64, max_features: MaxFeatures) -> ForestOptions {
        ForestOptions {
            n_estimators: self.n_estimators,
            max_depth: self.max_depth,
            min_samples_split: 2,
            min_samples_leaf: self.min_samples_leaf,
            max_features,
            bootstrap: self.bootstrap,
            class_weight: self.class_weight,
            seed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostingSettings {
    pub rounds: usize,
    pub learning_rate: f32,
    pub max_depth: usize,
    pub subsample: f32,
    pub class_weight: ClassWeight,
}

impl BoostingSettings {
    fn for_schema(schema: FeatureSchema) -> Self {
        let (rounds, max_depth) = match schema {
            FeatureSchema::Basic => (100, 3),
            FeatureSchema::Advanced => (200, 5),
        };
        Self {
            rounds,
            learning_rate: 0.1,
            max_depth,
            subsample: 1.0,
            class_weight: ClassWeight::None,
        }
    }
}

/// Fully resolved settings of one training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub schema: FeatureSchema,
    pub dataset: Option<PathBuf>,
    pub artifact_dir: PathBuf,
    pub delimiter: char,
    pub test_fraction: f64,
    pub seed: u64,
    pub thresholds: Vec<f32>,
    pub random_forest: ForestSettings,
    pub gradient_boosting: BoostingSettings,
    /// Recovery-time regressor; only valid with the advanced schema.
    pub regressor: Option<ForestSettings>,
}

impl TrainingConfig {
    pub fn for_schema(schema: FeatureSchema) -> Self {
        Self {
            schema,
            dataset: None,
            artifact_dir: PathBuf::from(DEFAULT_ARTIFACT_DIR),
            delimiter: ',',
            test_fraction: DEFAULT_TEST_FRACTION,
            seed: DEFAULT_SEED,
            thresholds: DEFAULT_THRESHOLDS.to_vec(),
            random_forest: ForestSettings::classifier(),
            gradient_boosting: BoostingSettings::for_schema(schema),
            regressor: schema
                .recovery_column()
                .map(|_| ForestSettings::regressor()),
        }
    }

    /// Schema defaults, then `file`, then `cli`; later layers win.
    pub fn resolve(
        file: Option<&ConfigOverrides>,
        cli: &ConfigOverrides,
    ) -> Result<Self, ConfigError> {
        let schema = cli
            .schema
            .or_else(|| file.and_then(|file| file.schema))
            .unwrap_or(FeatureSchema::Basic);
        let mut config = Self::for_schema(schema);
        if let Some(file) = file {
            config.apply(file);
        }
        config.apply(cli);
        config.validate()?;
        Ok(config)
    }

    /// Layer `overrides` on top. The schema is fixed by [`TrainingConfig::resolve`]
    /// and is not changed here.
    pub fn apply(&mut self, overrides: &ConfigOverrides) {
        if let Some(dataset) = &overrides.dataset {
            self.dataset = Some(dataset.clone());
        }
        if let Some(dir) = &overrides.artifact_dir {
            self.artifact_dir = dir.clone();
        }
        if let Some(delimiter) = overrides.delimiter {
            self.delimiter = delimiter;
        }
        if let Some(fraction) = overrides.test_fraction {
            self.test_fraction = fraction;
        }
        if let Some(seed) = overrides.seed {
            self.seed = seed;
        }
        if let Some(thresholds) = &overrides.thresholds {
            self.thresholds = thresholds.clone();
        }
        if let Some(forest) = &overrides.random_forest {
            forest.apply(&mut self.random_forest);
        }
        if let Some(boosting) = &overrides.gradient_boosting {
            boosting.apply(&mut self.gradient_boosting);
        }
        if overrides.no_regressor {
            self.regressor = None;
        } else if let Some(regressor) = &overrides.regressor {
            regressor.apply(self.regressor.get_or_insert_with(ForestSettings::regressor));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return invalid(format!(
                "test_fraction must be in (0, 1), got {}",
                self.test_fraction
            ));
        }
        if let Some(t) = self.thresholds.iter().find(|t| !(0.0..=1.0).contains(*t)) {
            return invalid(format!("thresholds must be in [0, 1], got {t}"));
        }
        if !self.delimiter.is_ascii() {
            return invalid(format!("delimiter must be ASCII, got {:?}", self.delimiter));
        }
        if self.random_forest.n_estimators == 0 {
            return invalid("random_forest.n_estimators must be at least 1".into());
        }
        let boosting = &self.gradient_boosting;
        if boosting.rounds == 0 {
            return invalid("gradient_boosting.rounds must be at least 1".into());
        }
        if !(boosting.learning_rate > 0.0) {
            return invalid(format!(
                "gradient_boosting.learning_rate must be > 0, got {}",
                boosting.learning_rate
            ));
        }
        if boosting.max_depth == 0 {
            return invalid("gradient_boosting.max_depth must be at least 1".into());
        }
        if !(boosting.subsample > 0.0 && boosting.subsample <= 1.0) {
            return invalid(format!(
                "gradient_boosting.subsample must be in (0, 1], got {}",
                boosting.subsample
            ));
        }
        if let Some(regressor) = &self.regressor {
            if self.schema.recovery_column().is_none() {
                return invalid(format!(
                    "the {} schema has no recovery target for a regressor",
                    self.schema
                ));
            }
            if regressor.n_estimators == 0 {
                return invalid("regressor.n_estimators must be at least 1".into());
            }
        }
        Ok(())
    }

    pub fn delimiter_byte(&self) -> u8 {
        // Checked ASCII in `validate`.
        self.delimiter as u8
    }

    pub fn dataset_path(&self) -> Result<&Path, ConfigError> {
        self.dataset.as_deref().ok_or(ConfigError::MissingDataset)
    }

    pub fn forest_options(&self) -> ForestOptions {
        self.random_forest.to_options(self.seed, MaxFeatures::Sqrt)
    }

    pub fn regressor_options(&self) -> Option<ForestOptions> {
        self.regressor
            .as_ref()
            .map(|settings| settings.to_options(self.seed, MaxFeatures::All))
    }

    pub fn gbdt_options(&self) -> GbdtOptions {
        let b = &self.gradient_boosting;
        GbdtOptions {
            rounds: b.rounds,
            learning_rate: b.learning_rate,
            max_depth: b.max_depth,
            min_samples_leaf: 1,
            subsample: b.subsample,
            class_weight: b.class_weight,
            seed: self.seed,
        }
    }
}

/// Partial settings from a config file or the command line.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigOverrides {
    pub schema: Option<FeatureSchema>,
    pub dataset: Option<PathBuf>,
    pub artifact_dir: Option<PathBuf>,
    pub delimiter: Option<char>,
    pub test_fraction: Option<f64>,
    pub seed: Option<u64>,
    pub thresholds: Option<Vec<f32>>,
    pub random_forest: Option<ForestOverrides>,
    pub gradient_boosting: Option<BoostingOverrides>,
    pub regressor: Option<ForestOverrides>,
    /// Skip the recovery regressor even on the advanced schema.
    pub no_regressor: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ForestOverrides {
    pub n_estimators: Option<usize>,
    pub max_depth: Option<usize>,
    pub min_samples_leaf: Option<usize>,
    pub bootstrap: Option<bool>,
    pub class_weight: Option<ClassWeight>,
}

impl ForestOverrides {
    fn apply(&self, settings: &mut ForestSettings) {
        if let Some(n) = self.n_estimators {
            settings.n_estimators = n;
        }
        if let Some(depth) = self.max_depth {
            settings.max_depth = Some(depth);
        }
        if let Some(min_leaf) = self.min_samples_leaf {
            settings.min_samples_leaf = min_leaf;
        }
        if let Some(bootstrap) = self.bootstrap {
            settings.bootstrap = bootstrap;
        }
        if let Some(weight) = self.class_weight {
            settings.class_weight = weight;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BoostingOverrides {
    pub rounds: Option<usize>,
    pub learning_rate: Option<f32>,
    pub max_depth: Option<usize>,
    pub subsample: Option<f32>,
    pub class_weight: Option<ClassWeight>,
}

impl BoostingOverrides {
    fn apply(&self, settings: &mut BoostingSettings) {
        if let Some(rounds) = self.rounds {
            settings.rounds = rounds;
        }
        if let Some(lr) = self.learning_rate {
            settings.learning_rate = lr;
        }
        if let Some(depth) = self.max_depth {
            settings.max_depth = depth;
        }
        if let Some(subsample) = self.subsample {
            settings.subsample = subsample;
        }
        if let Some(weight) = self.class_weight {
            settings.class_weight = weight;
        }
    }
}

/// Parse a TOML config file into overrides.
pub fn load_overrides(path: &Path) -> Result<ConfigOverrides, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::ParseToml {
        path: path.to_path_buf(),
        source,
    })
}

/// Overrides from `explicit`, or from `railcast.toml` in the app directory when it exists.
pub fn load_file_overrides(explicit: Option<&Path>) -> Result<Option<ConfigOverrides>, ConfigError> {
    if let Some(path) = explicit {
        return load_overrides(path).map(Some);
    }
    let path = app_dirs::training_config_path()?;
    if !path.is_file() {
        return Ok(None);
    }
    tracing::info!(path = %path.display(), "Using training config");
    load_overrides(&path).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_defaults_follow_the_variant() {
        let basic = TrainingConfig::for_schema(FeatureSchema::Basic);
        assert_eq!(basic.gradient_boosting.rounds, 100);
        assert_eq!(basic.gradient_boosting.max_depth, 3);
        assert_eq!(basic.random_forest.class_weight, ClassWeight::Balanced);
        assert!(basic.regressor.is_none());
        basic.validate().unwrap();

        let advanced = TrainingConfig::for_schema(FeatureSchema::Advanced);
        assert_eq!(advanced.gradient_boosting.rounds, 200);
        assert_eq!(advanced.gradient_boosting.max_depth, 5);
        assert_eq!(advanced.regressor_options().unwrap().max_features, MaxFeatures::All);
        assert_eq!(advanced.forest_options().max_features, MaxFeatures::Sqrt);
        assert_eq!(advanced.seed, 42);
    }

    #[test]
    fn cli_overrides_win_over_file() {
        let file: ConfigOverrides = toml::from_str(
            r#"
            schema = "advanced"
            seed = 7
            thresholds = [0.25, 0.75]

            [gradient_boosting]
            rounds = 50
            learning_rate = 0.05
            "#,
        )
        .unwrap();
        let cli = ConfigOverrides {
            seed: Some(9),
            dataset: Some(PathBuf::from("data.csv")),
            ..ConfigOverrides::default()
        };
        let config = TrainingConfig::resolve(Some(&file), &cli).unwrap();
        assert_eq!(config.schema, FeatureSchema::Advanced);
        assert_eq!(config.seed, 9);
        assert_eq!(config.thresholds, vec![0.25, 0.75]);
        assert_eq!(config.gradient_boosting.rounds, 50);
        assert_eq!(config.gradient_boosting.max_depth, 5);
        assert_eq!(config.gbdt_options().seed, 9);
        assert_eq!(config.dataset_path().unwrap(), Path::new("data.csv"));
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut cases = Vec::new();
        let mut config = TrainingConfig::for_schema(FeatureSchema::Basic);
        config.test_fraction = 1.0;
        cases.push(config);
        let mut config = TrainingConfig::for_schema(FeatureSchema::Basic);
        config.thresholds = vec![0.5, 1.5];
        cases.push(config);
        let mut config = TrainingConfig::for_schema(FeatureSchema::Basic);
        config.random_forest.n_estimators = 0;
        cases.push(config);
        let mut config = TrainingConfig::for_schema(FeatureSchema::Advanced);
        config.gradient_boosting.learning_rate = 0.0;
        cases.push(config);
        let mut config = TrainingConfig::for_schema(FeatureSchema::Basic);
        config.regressor = Some(ForestSettings::regressor());
        cases.push(config);
        for config in cases {
            assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        }
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("railcast.toml");
        std::fs::write(&path, "seeed = 3\n").unwrap();
        assert!(matches!(
            load_overrides(&path),
            Err(ConfigError::ParseToml { .. })
        ));
    }

    #[test]
    fn no_regressor_drops_the_advanced_regressor() {
        let cli = ConfigOverrides {
            schema: Some(FeatureSchema::Advanced),
            no_regressor: true,
            ..ConfigOverrides::default()
        };
        let config = TrainingConfig::resolve(None, &cli).unwrap();
        assert!(config.regressor.is_none());
        assert!(matches!(config.dataset_path(), Err(ConfigError::MissingDataset)));
    }
}
