//! Error types for confsig-sync.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from a reconciliation attempt.
///
/// `KeyMissing`, `Store`, and `Render` are per-attempt failures: the local
/// file is untouched and the next trigger retries. `Io` means the config
/// path itself is unavailable, which the caller treats as fatal.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("store error: {0}")]
    Store(#[from] confsig_store::StoreError),

    #[error("render error: {0}")]
    Render(#[from] confsig_renderer::RenderError),

    /// The watched key does not exist; absence is never "no config needed".
    #[error("key '{key}' not found in the remote store")]
    KeyMissing { key: String },
}

impl SyncError {
    /// Whether this attempt's failure leaves the sidecar healthy enough to
    /// retry on the next trigger.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, SyncError::Io { .. })
    }
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
