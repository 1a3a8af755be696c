//! Marker line and fingerprint handling.
//!
//! # File format
//!
//! ```text
//! # MD5: <32 lowercase hex chars>\n
//! <rendered content, verbatim>
//! ```
//!
//! The first line makes the file self-describing: a fresh read recovers both
//! the content and the fingerprint the writer believed matched it, with no
//! sidecar metadata file. A missing file or a first line that does not match
//! this shape parses to an empty fingerprint, which forces the next write —
//! never a hard error.

use std::path::Path;

use md5::{Digest, Md5};

use confsig_core::types::PersistedConfig;

use crate::error::{io_err, SyncError};

/// Marker-line prefix. The pattern is process-wide constant data owned by
/// this module; the fingerprint is everything between the prefix and the
/// first newline.
const MARKER_PREFIX: &str = "# MD5: ";

// ---------------------------------------------------------------------------
// Fingerprint
// ---------------------------------------------------------------------------

/// Lowercase hex MD5 digest of `content`.
pub fn fingerprint(content: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

// ---------------------------------------------------------------------------
// Parse / format
// ---------------------------------------------------------------------------

/// Split a raw file into marker fingerprint + content.
///
/// A first line not shaped like the marker yields an empty fingerprint and
/// the whole input as content.
fn parse(raw: &str) -> PersistedConfig {
    if let Some(rest) = raw.strip_prefix(MARKER_PREFIX) {
        if let Some((fingerprint, content)) = rest.split_once('\n') {
            if !fingerprint.is_empty() && fingerprint.chars().all(|c| c.is_ascii_hexdigit()) {
                return PersistedConfig {
                    fingerprint: fingerprint.to_string(),
                    content: content.to_string(),
                };
            }
        }
    }
    PersistedConfig {
        fingerprint: String::new(),
        content: raw.to_string(),
    }
}

fn format(fingerprint: &str, content: &str) -> String {
    format!("{MARKER_PREFIX}{fingerprint}\n{content}")
}

// ---------------------------------------------------------------------------
// Read / write
// ---------------------------------------------------------------------------

/// Read the on-disk configuration.
///
/// A missing file is the valid first-run state: empty fingerprint, empty
/// content. Any other I/O failure is reported — the config path being
/// readable is load-bearing for the whole sidecar.
pub fn read_persisted(path: &Path) -> Result<PersistedConfig, SyncError> {
    match std::fs::read_to_string(path) {
        Ok(raw) => Ok(parse(&raw)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no existing config; first write pending");
            Ok(PersistedConfig::default())
        }
        Err(err) => Err(io_err(path, err)),
    }
}

/// Atomically replace `path` with the marker line plus `content`.
///
/// Writes to `<path>.confsig.tmp` in the same directory and renames over the
/// target, so a concurrent reader observes either the old file or the new
/// one, never a mix. The temp file is removed if the rename fails.
pub fn write_config(path: &Path, fingerprint: &str, content: &str) -> Result<(), SyncError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
    }

    let tmp = path.with_file_name(format!(
        "{}.confsig.tmp",
        path.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "config".to_string())
    ));

    std::fs::write(&tmp, format(fingerprint, content)).map_err(|e| io_err(&tmp, e))?;
    if let Err(err) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, err));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
