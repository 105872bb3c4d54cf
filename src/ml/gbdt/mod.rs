//! Deterministic gradient-boosted tree classifier.
//!
//! Multi-class softmax boosting: every round fits one depth-limited
//! regression tree per class to the softmax residuals and replaces its leaf
//! values with a Newton step. Models export to and load from JSON.

mod model;
mod train;

pub use model::{GBDT_MODEL_VERSION, GbdtModel, softmax};
pub use train::{TrainOptions, train_gbdt};
