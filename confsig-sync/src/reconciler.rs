//! Fetch → render → compare → replace.
//!
//! ## `reconcile` — step order
//!
//! 1. Read the existing file's marker fingerprint (missing file ⇒ empty).
//! 2. Fetch the current remote entry; an absent key is an error, the file
//!    stays untouched.
//! 3. Render the raw value; a template error leaves the file untouched.
//! 4. Fingerprint the rendered content.
//! 5. Equal fingerprints ⇒ `Unchanged`, no write, no side effect.
//! 6. Otherwise atomically replace the file ⇒ `Written`.
//!
//! Two calls in a row with no intervening remote change always report
//! `Unchanged` the second time.

use std::path::{Path, PathBuf};

use confsig_core::types::RenderedConfig;
use confsig_renderer::Renderer;
use confsig_store::KvStore;

use crate::error::SyncError;
use crate::marker;

/// Outcome of one reconciliation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// File was replaced — the rendered content differed from what was on disk.
    Written { path: PathBuf },
    /// Rendered content matches the on-disk fingerprint; nothing was touched.
    Unchanged { path: PathBuf },
}

impl ReconcileOutcome {
    /// Whether this attempt changed the file (and the consumer should reload).
    pub fn changed(&self) -> bool {
        matches!(self, ReconcileOutcome::Written { .. })
    }
}

/// Reconcile the local file at `path` against the remote value of `key`.
pub async fn reconcile(
    store: &dyn KvStore,
    renderer: &Renderer,
    key: &str,
    path: &Path,
) -> Result<ReconcileOutcome, SyncError> {
    let existing = marker::read_persisted(path)?;

    let entry = store
        .get(key)
        .await?
        .ok_or_else(|| SyncError::KeyMissing {
            key: key.to_string(),
        })?;

    let content = renderer.render(&entry.value)?;
    let latest = RenderedConfig {
        fingerprint: marker::fingerprint(&content),
        content,
    };

    if latest.fingerprint == existing.fingerprint {
        tracing::debug!(path = %path.display(), "config unchanged");
        return Ok(ReconcileOutcome::Unchanged {
            path: path.to_path_buf(),
        });
    }

    marker::write_config(path, &latest.fingerprint, &latest.content)?;
    tracing::info!(
        path = %path.display(),
        fingerprint = %latest.fingerprint,
        version = entry.version,
        "config replaced"
    );
    Ok(ReconcileOutcome::Written {
        path: path.to_path_buf(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
