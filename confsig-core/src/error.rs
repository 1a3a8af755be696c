//! Error types for confsig-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while loading the static settings record.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Underlying I/O failure (permission denied, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The settings YAML file did not exist at the expected path.
    #[error("settings file not found at {path}")]
    NotFound { path: PathBuf },

    /// YAML parse error on load — includes file path and line context from serde_yaml.
    #[error("failed to parse settings at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// No store address in the file and the fallback env variable is unset.
    #[error("no store address: set consulAddr in the settings file or export {env}")]
    MissingStoreAddr { env: &'static str },

    /// The watched key is empty.
    #[error("consulKey must not be empty in {path}")]
    MissingKey { path: PathBuf },
}
