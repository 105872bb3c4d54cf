//! Feature matrix assembly from validated observations.

use thiserror::Error;

use crate::dataset::{FeatureSchema, Observation};
use crate::encoding::{EncodeError, RouteEncoder};
use crate::ml::{RegressionDataset, TrainDataset};

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("line {line}: {source}")]
    Encode { line: u64, source: EncodeError },
    #[error("line {line}: expected {expected} numeric values, found {found}")]
    Width {
        line: u64,
        expected: usize,
        found: usize,
    },
    #[error("line {line}: the {schema} schema needs a recovery time")]
    MissingRecovery { line: u64, schema: FeatureSchema },
}

/// Turns observations into fixed-order feature vectors.
///
/// The vector is `[route_code, numeric columns...]` in
/// [`FeatureSchema::feature_names`] order. Weather values are passed through
/// unscaled.
#[derive(Debug, Clone, Copy)]
pub struct FeatureBuilder<'a> {
    schema: FeatureSchema,
    encoder: &'a RouteEncoder,
}

impl<'a> FeatureBuilder<'a> {
    pub fn new(schema: FeatureSchema, encoder: &'a RouteEncoder) -> Self {
        Self { schema, encoder }
    }

    pub fn schema(&self) -> FeatureSchema {
        self.schema
    }

    pub fn build_row(&self, obs: &Observation) -> Result<Vec<f32>, FeatureError> {
        let expected = self.schema.numeric_columns().len();
        if obs.values.len() != expected {
            return Err(FeatureError::Width {
                line: obs.line,
                expected,
                found: obs.values.len(),
            });
        }
        let code = self
            .encoder
            .encode(&obs.route_id)
            .map_err(|source| FeatureError::Encode {
                line: obs.line,
                source,
            })?;
        let mut row = Vec::with_capacity(self.schema.feature_len());
        row.push(code as f32);
        row.extend_from_slice(&obs.values);
        Ok(row)
    }

    pub fn build_matrix(&self, observations: &[Observation]) -> Result<FeatureMatrix, FeatureError> {
        let mut rows = Vec::with_capacity(observations.len());
        let mut targets = Vec::with_capacity(observations.len());
        let mut recovery = self
            .schema
            .recovery_column()
            .map(|_| Vec::with_capacity(observations.len()));
        for obs in observations {
            rows.push(self.build_row(obs)?);
            targets.push(obs.class_index);
            if let Some(values) = recovery.as_mut() {
                let hours = obs.recovery_hours.ok_or(FeatureError::MissingRecovery {
                    line: obs.line,
                    schema: self.schema,
                })?;
                values.push(hours);
            }
        }
        Ok(FeatureMatrix {
            schema: self.schema,
            rows,
            targets,
            recovery,
        })
    }
}

/// Feature rows with their class targets and optional recovery targets.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    pub schema: FeatureSchema,
    pub rows: Vec<Vec<f32>>,
    pub targets: Vec<usize>,
    pub recovery: Option<Vec<f32>>,
}

impl FeatureMatrix {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows at `indices`, in the given order.
    pub fn select(&self, indices: &[usize]) -> FeatureMatrix {
        FeatureMatrix {
            schema: self.schema,
            rows: indices.iter().map(|&idx| self.rows[idx].clone()).collect(),
            targets: indices.iter().map(|&idx| self.targets[idx]).collect(),
            recovery: self
                .recovery
                .as_ref()
                .map(|values| indices.iter().map(|&idx| values[idx]).collect()),
        }
    }

    pub fn classification(&self) -> TrainDataset {
        TrainDataset {
            feature_names: self.schema.feature_name_vec(),
            classes: self.schema.class_name_vec(),
            x: self.rows.clone(),
            y: self.targets.clone(),
        }
    }

    /// Recovery-time regression view; `None` when the schema has no recovery column.
    pub fn regression(&self) -> Option<RegressionDataset> {
        self.recovery.as_ref().map(|values| RegressionDataset {
            feature_names: self.schema.feature_name_vec(),
            x: self.rows.clone(),
            y: values.clone(),
        })
    }
}
