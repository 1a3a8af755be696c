//! # confsig-sync
//!
//! The reconciler: fetch the remote value, render it, fingerprint the
//! result, and atomically replace the local file when — and only when — the
//! content changed.
//!
//! Call [`reconcile`] once per check-now trigger; it is idempotent, so
//! redundant triggers are harmless.

pub mod error;
pub mod marker;
pub mod reconciler;

pub use error::SyncError;
pub use marker::{fingerprint, read_persisted, write_config};
pub use reconciler::{reconcile, ReconcileOutcome};
