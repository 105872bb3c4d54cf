//! Per-user directories for railcast tooling.
//!
//! Everything lives under a single `.railcast` folder in the OS config root.
//! `RAILCAST_CONFIG_HOME` replaces that root, which keeps tests and CI runs
//! away from the real user profile.

use std::{
    path::PathBuf,
    sync::{LazyLock, Mutex},
};

use directories::BaseDirs;
use thiserror::Error;

/// Name of the directory created under the config root.
pub const APP_DIR_NAME: &str = ".railcast";
/// Environment variable overriding the config root.
pub const CONFIG_HOME_ENV: &str = "RAILCAST_CONFIG_HOME";
/// File name of the optional training configuration.
pub const TRAINING_CONFIG_FILE_NAME: &str = "railcast.toml";

static CONFIG_BASE_OVERRIDE: LazyLock<Mutex<Option<PathBuf>>> = LazyLock::new(|| Mutex::new(None));

/// Errors raised while resolving application directories.
#[derive(Debug, Error)]
pub enum AppDirError {
    /// Neither the override nor the OS provided a config root.
    #[error("No suitable base config directory available for railcast files")]
    NoBaseDir,
    /// The directory could not be created.
    #[error("Failed to create application directory at {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Return the `.railcast` root, creating it if needed.
pub fn app_root_dir() -> Result<PathBuf, AppDirError> {
    let base = config_base_dir().ok_or(AppDirError::NoBaseDir)?;
    ensure_dir(base.join(APP_DIR_NAME))
}

/// Return the logs directory inside the root, creating it if needed.
pub fn logs_dir() -> Result<PathBuf, AppDirError> {
    ensure_dir(app_root_dir()?.join("logs"))
}

/// Path of `railcast.toml` inside the root. The file itself may not exist.
pub fn training_config_path() -> Result<PathBuf, AppDirError> {
    Ok(app_root_dir()?.join(TRAINING_CONFIG_FILE_NAME))
}

fn ensure_dir(path: PathBuf) -> Result<PathBuf, AppDirError> {
    std::fs::create_dir_all(&path).map_err(|source| AppDirError::CreateDir {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

fn config_base_dir() -> Option<PathBuf> {
    if let Some(path) = CONFIG_BASE_OVERRIDE
        .lock()
        .ok()
        .and_then(|guard| guard.clone())
    {
        return Some(path);
    }
    if let Ok(path) = std::env::var(CONFIG_HOME_ENV) {
        return Some(PathBuf::from(path));
    }
    BaseDirs::new().map(|dirs| dirs.config_dir().to_path_buf())
}

#[cfg(test)]
fn set_config_base_override(path: Option<PathBuf>) {
    let mut guard = CONFIG_BASE_OVERRIDE
        .lock()
        .unwrap_or_else(|err| err.into_inner());
    *guard = path;
}
