//! Tree-ensemble interchange graphs.
//!
//! A graph flattens every tree of a fitted model into parallel node arrays
//! (feature id, threshold, mode, true/false child) plus `(node, target,
//! weight)` leaf triples, the layout ONNX-ML tree ensembles use. Graphs are
//! written as `<name>.graph.json` and carry everything needed to reproduce the
//! model's outputs: see [`InterchangeGraph::evaluate`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::artifacts::{ArtifactError, StoredClassifier, write_atomic};
use crate::ml::{
    DecisionTree, GbdtModel, Node, RandomForestClassifier, RandomForestRegressor, argmax, softmax,
};

pub const GRAPH_FORMAT: &str = "railcast.tree_ensemble";
pub const GRAPH_FORMAT_VERSION: u32 = 1;
pub const INPUT_NAME: &str = "float_input";

#[derive(Debug, Error)]
pub enum InterchangeError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid graph JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Failed to serialize graph {name}: {source}")]
    Serialize {
        name: String,
        source: serde_json::Error,
    },
    #[error(transparent)]
    Write(#[from] ArtifactError),
    #[error("invalid graph: {0}")]
    Invalid(String),
    #[error("input row has {found} values but the graph expects {expected}")]
    Width { expected: usize, found: usize },
}

/// A tensor dimension: fixed size or a named, dynamic axis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Dim {
    Fixed(usize),
    Dynamic(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorSpec {
    pub name: String,
    pub elem_type: String,
    pub shape: Vec<Dim>,
}

impl TensorSpec {
    fn new(name: &str, elem_type: &str, shape: Vec<Dim>) -> Self {
        Self {
            name: name.to_string(),
            elem_type: elem_type.to_string(),
            shape,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnsembleKind {
    Classifier,
    Regressor,
}

/// How summed leaf weights become outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostTransform {
    /// Divide the sums by the number of trees.
    Average,
    /// Add `base_values`, then apply softmax across targets.
    Softmax,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeMode {
    #[serde(rename = "BRANCH_LEQ")]
    BranchLeq,
    #[serde(rename = "LEAF")]
    Leaf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafWeight {
    pub node_id: u32,
    pub target_id: u32,
    pub weight: f32,
}

/// One tree as parallel arrays; node `i` is described by index `i` of each.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatTree {
    pub nodes_featureids: Vec<u32>,
    pub nodes_values: Vec<f32>,
    pub nodes_modes: Vec<NodeMode>,
    pub nodes_truenodeids: Vec<u32>,
    pub nodes_falsenodeids: Vec<u32>,
    pub leaf_weights: Vec<LeafWeight>,
}

impl FlatTree {
    /// Flatten a fitted tree. Leaf output `j` goes to target `target_offset + j`,
    /// multiplied by `scale`.
    fn from_tree(tree: &DecisionTree, target_offset: u32, scale: f32) -> Self {
        let n = tree.nodes.len();
        let mut flat = FlatTree {
            nodes_featureids: Vec::with_capacity(n),
            nodes_values: Vec::with_capacity(n),
            nodes_modes: Vec::with_capacity(n),
            nodes_truenodeids: Vec::with_capacity(n),
            nodes_falsenodeids: Vec::with_capacity(n),
            leaf_weights: Vec::new(),
        };
        for (node_id, node) in tree.nodes.iter().enumerate() {
            match node {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    flat.nodes_featureids.push(*feature as u32);
                    flat.nodes_values.push(*threshold);
                    flat.nodes_modes.push(NodeMode::BranchLeq);
                    flat.nodes_truenodeids.push(*left);
                    flat.nodes_falsenodeids.push(*right);
                }
                Node::Leaf { value } => {
                    flat.nodes_featureids.push(0);
                    flat.nodes_values.push(0.0);
                    flat.nodes_modes.push(NodeMode::Leaf);
                    flat.nodes_truenodeids.push(0);
                    flat.nodes_falsenodeids.push(0);
                    for (output, &weight) in value.iter().enumerate() {
                        flat.leaf_weights.push(LeafWeight {
                            node_id: node_id as u32,
                            target_id: target_offset + output as u32,
                            weight: scale * weight,
                        });
                    }
                }
            }
        }
        flat
    }

    fn leaf_for(&self, row: &[f32]) -> usize {
        let mut idx = 0usize;
        while self.nodes_modes[idx] == NodeMode::BranchLeq {
            let value = row[self.nodes_featureids[idx] as usize];
            idx = if value <= self.nodes_values[idx] {
                self.nodes_truenodeids[idx]
            } else {
                self.nodes_falsenodeids[idx]
            } as usize;
        }
        idx
    }

    fn validate(&self, tree_idx: usize, n_features: usize, n_targets: usize) -> Result<(), String> {
        let n = self.nodes_modes.len();
        if n == 0 {
            return Err(format!("tree {tree_idx} has no nodes"));
        }
        if [
            self.nodes_featureids.len(),
            self.nodes_values.len(),
            self.nodes_truenodeids.len(),
            self.nodes_falsenodeids.len(),
        ]
        .iter()
        .any(|&len| len != n)
        {
            return Err(format!("tree {tree_idx} has ragged node arrays"));
        }
        for idx in 0..n {
            if self.nodes_modes[idx] != NodeMode::BranchLeq {
                continue;
            }
            if self.nodes_featureids[idx] as usize >= n_features {
                return Err(format!("tree {tree_idx} node {idx} reads a missing feature"));
            }
            for child in [self.nodes_truenodeids[idx], self.nodes_falsenodeids[idx]] {
                let child = child as usize;
                if child <= idx || child >= n {
                    return Err(format!("tree {tree_idx} node {idx} has invalid child {child}"));
                }
            }
        }
        for leaf in &self.leaf_weights {
            if leaf.node_id as usize >= n || leaf.target_id as usize >= n_targets {
                return Err(format!("tree {tree_idx} has an out-of-range leaf weight"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeEnsemble {
    pub kind: EnsembleKind,
    pub post_transform: PostTransform,
    /// Number of output targets (classes, or 1 for regression).
    pub n_targets: usize,
    /// Added to the per-target sums before the post transform.
    pub base_values: Vec<f32>,
    pub trees: Vec<FlatTree>,
}

/// Self-describing export of a fitted tree model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterchangeGraph {
    pub format: String,
    pub format_version: u32,
    pub name: String,
    pub input: TensorSpec,
    pub outputs: Vec<TensorSpec>,
    pub feature_names: Vec<String>,
    /// Empty for regressors.
    pub class_labels: Vec<String>,
    pub ensemble: TreeEnsemble,
}

/// Result of evaluating a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphOutput {
    /// Argmax class per row; empty for regressors.
    pub labels: Vec<i64>,
    /// `[batch, n_targets]` probabilities, or `[batch, 1]` regression values.
    pub values: Vec<Vec<f32>>,
}

impl InterchangeGraph {
    pub fn from_random_forest(name: &str, model: &RandomForestClassifier) -> Self {
        let trees = model
            .trees
            .iter()
            .map(|tree| FlatTree::from_tree(tree, 0, 1.0))
            .collect();
        Self::classifier(
            name,
            &model.feature_names,
            &model.classes,
            TreeEnsemble {
                kind: EnsembleKind::Classifier,
                post_transform: PostTransform::Average,
                n_targets: model.classes.len(),
                base_values: vec![0.0; model.classes.len()],
                trees,
            },
        )
    }

    /// The learning rate is folded into the leaf weights.
    pub fn from_gbdt(name: &str, model: &GbdtModel) -> Self {
        let trees = model
            .trees
            .iter()
            .flat_map(|round| {
                round.iter().enumerate().map(|(class_idx, tree)| {
                    FlatTree::from_tree(tree, class_idx as u32, model.learning_rate)
                })
            })
            .collect();
        Self::classifier(
            name,
            &model.feature_names,
            &model.classes,
            TreeEnsemble {
                kind: EnsembleKind::Classifier,
                post_transform: PostTransform::Softmax,
                n_targets: model.classes.len(),
                base_values: model.init_raw.clone(),
                trees,
            },
        )
    }

    pub fn from_classifier(name: &str, model: &StoredClassifier) -> Self {
        match model {
            StoredClassifier::RandomForest(model) => Self::from_random_forest(name, model),
            StoredClassifier::GradientBoosting(model) => Self::from_gbdt(name, model),
        }
    }

    pub fn from_regressor(name: &str, model: &RandomForestRegressor) -> Self {
        let n_features = model.feature_names.len();
        Self {
            format: GRAPH_FORMAT.to_string(),
            format_version: GRAPH_FORMAT_VERSION,
            name: name.to_string(),
            input: input_spec(n_features),
            outputs: vec![TensorSpec::new(
                "variable",
                "float32",
                vec![Dim::Dynamic("batch".into()), Dim::Fixed(1)],
            )],
            feature_names: model.feature_names.clone(),
            class_labels: Vec::new(),
            ensemble: TreeEnsemble {
                kind: EnsembleKind::Regressor,
                post_transform: PostTransform::Average,
                n_targets: 1,
                base_values: vec![0.0],
                trees: model
                    .trees
                    .iter()
                    .map(|tree| FlatTree::from_tree(tree, 0, 1.0))
                    .collect(),
            },
        }
    }

    fn classifier(
        name: &str,
        feature_names: &[String],
        classes: &[String],
        ensemble: TreeEnsemble,
    ) -> Self {
        // Probabilities are a plain tensor, not a sequence of per-class maps.
        Self {
            format: GRAPH_FORMAT.to_string(),
            format_version: GRAPH_FORMAT_VERSION,
            name: name.to_string(),
            input: input_spec(feature_names.len()),
            outputs: vec![
                TensorSpec::new("label", "int64", vec![Dim::Dynamic("batch".into())]),
                TensorSpec::new(
                    "probabilities",
                    "float32",
                    vec![Dim::Dynamic("batch".into()), Dim::Fixed(classes.len())],
                ),
            ],
            feature_names: feature_names.to_vec(),
            class_labels: classes.to_vec(),
            ensemble,
        }
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    pub fn validate(&self) -> Result<(), InterchangeError> {
        let invalid = |msg: String| InterchangeError::Invalid(msg);
        if self.format != GRAPH_FORMAT || self.format_version != GRAPH_FORMAT_VERSION {
            return Err(invalid(format!(
                "unsupported format {} v{}",
                self.format, self.format_version
            )));
        }
        if self.input.shape.get(1) != Some(&Dim::Fixed(self.n_features())) {
            return Err(invalid("input width does not match feature names".into()));
        }
        let ensemble = &self.ensemble;
        if ensemble.trees.is_empty() {
            return Err(invalid("ensemble has no trees".into()));
        }
        if ensemble.base_values.len() != ensemble.n_targets {
            return Err(invalid("base_values length must equal n_targets".into()));
        }
        match ensemble.kind {
            EnsembleKind::Classifier if self.class_labels.len() != ensemble.n_targets => {
                return Err(invalid("class labels do not match n_targets".into()));
            }
            EnsembleKind::Regressor if ensemble.n_targets != 1 => {
                return Err(invalid("regressors have exactly one target".into()));
            }
            _ => {}
        }
        for (idx, tree) in ensemble.trees.iter().enumerate() {
            tree.validate(idx, self.n_features(), ensemble.n_targets)
                .map_err(invalid)?;
        }
        Ok(())
    }

    /// Run the graph over a `[batch, n_features]` input.
    pub fn evaluate(&self, batch: &[Vec<f32>]) -> Result<GraphOutput, InterchangeError> {
        let ensemble = &self.ensemble;
        let mut labels = Vec::new();
        let mut values = Vec::with_capacity(batch.len());
        for row in batch {
            if row.len() != self.n_features() {
                return Err(InterchangeError::Width {
                    expected: self.n_features(),
                    found: row.len(),
                });
            }
            let mut sums = vec![0.0f32; ensemble.n_targets];
            for tree in &ensemble.trees {
                let leaf = tree.leaf_for(row) as u32;
                for weight in tree.leaf_weights.iter().filter(|w| w.node_id == leaf) {
                    sums[weight.target_id as usize] += weight.weight;
                }
            }
            let out = match ensemble.post_transform {
                PostTransform::Average => {
                    let n_trees = ensemble.trees.len().max(1) as f32;
                    sums.iter()
                        .zip(&ensemble.base_values)
                        .map(|(sum, base)| base + sum / n_trees)
                        .collect()
                }
                PostTransform::Softmax => {
                    let raw: Vec<f32> = ensemble
                        .base_values
                        .iter()
                        .zip(&sums)
                        .map(|(base, sum)| base + sum)
                        .collect();
                    softmax(&raw)
                }
            };
            if ensemble.kind == EnsembleKind::Classifier {
                labels.push(argmax(&out) as i64);
            }
            values.push(out);
        }
        Ok(GraphOutput { labels, values })
    }

    /// Write `<dir>/<name>.graph.json`.
    pub fn save(&self, dir: &Path) -> Result<PathBuf, InterchangeError> {
        let path = dir.join(graph_file_name(&self.name));
        let bytes = serde_json::to_vec_pretty(self).map_err(|source| {
            InterchangeError::Serialize {
                name: self.name.clone(),
                source,
            }
        })?;
        write_atomic(&path, &bytes)?;
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<Self, InterchangeError> {
        let bytes = std::fs::read(path).map_err(|source| InterchangeError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let graph: Self = serde_json::from_slice(&bytes).map_err(|source| InterchangeError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        graph.validate()?;
        Ok(graph)
    }
}

pub fn graph_file_name(name: &str) -> String {
    format!("{name}.graph.json")
}

fn input_spec(n_features: usize) -> TensorSpec {
    TensorSpec::new(
        INPUT_NAME,
        "float32",
        vec![Dim::Dynamic("batch".into()), Dim::Fixed(n_features)],
    )
}
