//! Library exports for the railcast binaries, benchmarks and tests.
/// Per-user directories for config and logs.
pub mod app_dirs;
/// Wayback Machine availability check.
pub mod archive;
/// Checksummed artifact envelopes on disk.
pub mod artifacts;
/// Layered training configuration.
pub mod config;
/// Observation files, schemas and splitting.
pub mod dataset;
/// Route and status encodings.
pub mod encoding;
/// Held-out evaluation of fitted models.
pub mod evaluation;
/// Feature matrix assembly.
pub mod features;
/// Shared HTTP agent.
pub mod http_client;
/// Tree-ensemble interchange graphs.
pub mod interchange;
/// Tracing setup for the binaries.
pub mod logging;
/// Tree-ensemble models and metrics.
pub mod ml;
/// Training orchestration.
pub mod pipeline;
/// Console renderings.
pub mod report;
/// Route map export and import.
pub mod route_map;
