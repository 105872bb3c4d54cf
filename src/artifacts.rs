//! Persisted model and encoder artifacts.
//!
//! Each artifact is one `<name>.json` file holding an envelope:
//! `{format_version, name, kind, checksum, payload}`. The checksum is the
//! blake3 hex digest of the payload's compact JSON text and is verified on load.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::encoding::RouteEncoder;
use crate::ml::{Classifier, GbdtModel, ModelError, RandomForestClassifier, RandomForestRegressor};

pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

pub const ROUTE_ENCODER: &str = "route_encoder";
pub const RANDOM_FOREST_MODEL: &str = "random_forest_model";
pub const GRADIENT_BOOSTING_MODEL: &str = "gradient_boosting_model";
/// Alias of whichever classifier the schema treats as primary.
pub const STATUS_CLASSIFIER: &str = "status_classifier";
pub const RECOVERY_REGRESSOR: &str = "recovery_regressor";

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Failed to create artifact directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Failed to serialize artifact {name}: {source}")]
    Serialize {
        name: String,
        source: serde_json::Error,
    },
    #[error("{path}: unsupported artifact format version {found}")]
    FormatVersion { path: PathBuf, found: u32 },
    #[error("{path}: artifact is named {found}, expected {expected}")]
    NameMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },
    #[error("{path}: artifact kind {found} cannot be loaded as {expected}")]
    KindMismatch {
        path: PathBuf,
        expected: &'static str,
        found: ArtifactKind,
    },
    #[error("{path}: checksum mismatch (stored {stored}, computed {computed})")]
    Checksum {
        path: PathBuf,
        stored: String,
        computed: String,
    },
    #[error("{path}: {source}")]
    Model { path: PathBuf, source: ModelError },
}

/// What an envelope's payload holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    RouteEncoder,
    RandomForestClassifier,
    GradientBoostingClassifier,
    RandomForestRegressor,
}

impl ArtifactKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RouteEncoder => "route_encoder",
            Self::RandomForestClassifier => "random_forest_classifier",
            Self::GradientBoostingClassifier => "gradient_boosting_classifier",
            Self::RandomForestRegressor => "random_forest_regressor",
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Envelope {
    format_version: u32,
    name: String,
    kind: ArtifactKind,
    checksum: String,
    payload: serde_json::Value,
}

/// A classifier loaded from disk, whichever family it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredClassifier {
    RandomForest(RandomForestClassifier),
    GradientBoosting(GbdtModel),
}

impl StoredClassifier {
    pub fn kind(&self) -> ArtifactKind {
        match self {
            Self::RandomForest(_) => ArtifactKind::RandomForestClassifier,
            Self::GradientBoosting(_) => ArtifactKind::GradientBoostingClassifier,
        }
    }
}

impl Classifier for StoredClassifier {
    fn classes(&self) -> &[String] {
        match self {
            Self::RandomForest(model) => model.classes(),
            Self::GradientBoosting(model) => model.classes(),
        }
    }

    fn feature_names(&self) -> &[String] {
        match self {
            Self::RandomForest(model) => Classifier::feature_names(model),
            Self::GradientBoosting(model) => Classifier::feature_names(model),
        }
    }

    fn predict_proba(&self, features: &[f32]) -> Result<Vec<f32>, ModelError> {
        match self {
            Self::RandomForest(model) => model.predict_proba(features),
            Self::GradientBoosting(model) => model.predict_proba(features),
        }
    }
}

/// Directory of named artifact envelopes.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.json"))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.path_for(name).is_file()
    }

    pub fn save_route_encoder(&self, encoder: &RouteEncoder) -> Result<PathBuf, ArtifactError> {
        self.save(ROUTE_ENCODER, ArtifactKind::RouteEncoder, encoder)
    }

    pub fn save_random_forest(
        &self,
        name: &str,
        model: &RandomForestClassifier,
    ) -> Result<PathBuf, ArtifactError> {
        self.save(name, ArtifactKind::RandomForestClassifier, model)
    }

    pub fn save_gbdt(&self, name: &str, model: &GbdtModel) -> Result<PathBuf, ArtifactError> {
        self.save(name, ArtifactKind::GradientBoostingClassifier, model)
    }

    pub fn save_regressor(&self, model: &RandomForestRegressor) -> Result<PathBuf, ArtifactError> {
        self.save(RECOVERY_REGRESSOR, ArtifactKind::RandomForestRegressor, model)
    }

    pub fn load_route_encoder(&self) -> Result<RouteEncoder, ArtifactError> {
        let (path, envelope) = self.read_envelope(ROUTE_ENCODER)?;
        expect_kind(&path, &envelope, ArtifactKind::RouteEncoder, "route encoder")?;
        let encoder: RouteEncoder = decode_payload(&path, envelope.payload)?;
        encoder.validate().map_err(|err| ArtifactError::Model {
            path,
            source: ModelError::InvalidModel(err.to_string()),
        })?;
        Ok(encoder)
    }

    /// Load any classifier artifact; the envelope kind picks the model family.
    pub fn load_classifier(&self, name: &str) -> Result<StoredClassifier, ArtifactError> {
        let (path, envelope) = self.read_envelope(name)?;
        let model = match envelope.kind {
            ArtifactKind::RandomForestClassifier => {
                let model: RandomForestClassifier = decode_payload(&path, envelope.payload)?;
                model.validate().map_err(|source| ArtifactError::Model {
                    path: path.clone(),
                    source,
                })?;
                StoredClassifier::RandomForest(model)
            }
            ArtifactKind::GradientBoostingClassifier => {
                let model: GbdtModel = decode_payload(&path, envelope.payload)?;
                model.validate().map_err(|source| ArtifactError::Model {
                    path: path.clone(),
                    source,
                })?;
                StoredClassifier::GradientBoosting(model)
            }
            found => {
                return Err(ArtifactError::KindMismatch {
                    path,
                    expected: "classifier",
                    found,
                });
            }
        };
        Ok(model)
    }

    pub fn load_regressor(&self) -> Result<RandomForestRegressor, ArtifactError> {
        let (path, envelope) = self.read_envelope(RECOVERY_REGRESSOR)?;
        expect_kind(&path, &envelope, ArtifactKind::RandomForestRegressor, "regressor")?;
        let model: RandomForestRegressor = decode_payload(&path, envelope.payload)?;
        model
            .validate()
            .map_err(|source| ArtifactError::Model { path, source })?;
        Ok(model)
    }

    fn save<T: Serialize>(
        &self,
        name: &str,
        kind: ArtifactKind,
        value: &T,
    ) -> Result<PathBuf, ArtifactError> {
        fs::create_dir_all(&self.root).map_err(|source| ArtifactError::CreateDir {
            path: self.root.clone(),
            source,
        })?;
        let serialize_err = |source| ArtifactError::Serialize {
            name: name.to_string(),
            source,
        };
        let payload = serde_json::to_value(value).map_err(serialize_err)?;
        let envelope = Envelope {
            format_version: ARTIFACT_FORMAT_VERSION,
            name: name.to_string(),
            kind,
            checksum: payload_checksum(&payload).map_err(serialize_err)?,
            payload,
        };
        let bytes = serde_json::to_vec(&envelope).map_err(serialize_err)?;
        let path = self.path_for(name);
        write_atomic(&path, &bytes)?;
        tracing::info!(artifact = name, kind = %kind, path = %path.display(), "Saved artifact");
        Ok(path)
    }

    fn read_envelope(&self, name: &str) -> Result<(PathBuf, Envelope), ArtifactError> {
        let path = self.path_for(name);
        let bytes = fs::read(&path).map_err(|source| ArtifactError::Read {
            path: path.clone(),
            source,
        })?;
        let envelope: Envelope =
            serde_json::from_slice(&bytes).map_err(|source| ArtifactError::Json {
                path: path.clone(),
                source,
            })?;
        if envelope.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(ArtifactError::FormatVersion {
                path,
                found: envelope.format_version,
            });
        }
        if envelope.name != name {
            return Err(ArtifactError::NameMismatch {
                path,
                expected: name.to_string(),
                found: envelope.name,
            });
        }
        let computed = payload_checksum(&envelope.payload).map_err(|source| ArtifactError::Json {
            path: path.clone(),
            source,
        })?;
        if computed != envelope.checksum {
            return Err(ArtifactError::Checksum {
                path,
                stored: envelope.checksum,
                computed,
            });
        }
        Ok((path, envelope))
    }
}

fn expect_kind(
    path: &Path,
    envelope: &Envelope,
    kind: ArtifactKind,
    expected: &'static str,
) -> Result<(), ArtifactError> {
    if envelope.kind != kind {
        return Err(ArtifactError::KindMismatch {
            path: path.to_path_buf(),
            expected,
            found: envelope.kind,
        });
    }
    Ok(())
}

fn decode_payload<T: DeserializeOwned>(
    path: &Path,
    payload: serde_json::Value,
) -> Result<T, ArtifactError> {
    serde_json::from_value(payload).map_err(|source| ArtifactError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn payload_checksum(payload: &serde_json::Value) -> Result<String, serde_json::Error> {
    let bytes = serde_json::to_vec(payload)?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

/// Write through a sibling temp file so readers never see a partial artifact.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ArtifactError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| ArtifactError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes).map_err(|source| ArtifactError::Write {
        path: tmp.clone(),
        source,
    })?;
    fs::rename(&tmp, path).map_err(|source| ArtifactError::Write {
        path: path.to_path_buf(),
        source,
    })
}
