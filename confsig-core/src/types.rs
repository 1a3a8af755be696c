//! Domain types for the reconciliation pipeline.
//!
//! All of these are transient values owned by the call that produced them;
//! nothing here is shared across concurrent reconciliation attempts.

// ---------------------------------------------------------------------------
// Remote state
// ---------------------------------------------------------------------------

/// The remote store's current state for the watched key.
///
/// `version` is the store-native modify index: monotonically non-decreasing,
/// used purely as a change-detection token and never interpreted beyond
/// "greater means newer".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub value: Vec<u8>,
    pub version: u64,
}

// ---------------------------------------------------------------------------
// Rendered / persisted configuration
// ---------------------------------------------------------------------------

/// The result of rendering a [`RemoteEntry`]'s value.
///
/// `fingerprint` is the lowercase hex MD5 digest of `content`; for fixed
/// content it is deterministic, and collisions are negligible for
/// change-detection purposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedConfig {
    pub content: String,
    pub fingerprint: String,
}

/// The on-disk configuration as recovered from a fresh read.
///
/// The file's first line encodes the fingerprint the writer believed matched
/// the remainder. A missing file or an unrecognizable first line parses to an
/// empty fingerprint, which forces the next reconciliation to rewrite.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistedConfig {
    pub content: String,
    pub fingerprint: String,
}
