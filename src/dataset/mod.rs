//! Observation datasets: schemas, file loading and train/test splitting.

pub mod loader;
pub mod schema;
pub mod split;

pub use loader::{DatasetLoadError, LoadedDataset, Observation, load_dataset, read_dataset};
pub use schema::{FeatureSchema, ROUTE_CODE_FEATURE, ROUTE_COLUMN};
pub use split::{SplitError, SplitIndices, train_test_split};
