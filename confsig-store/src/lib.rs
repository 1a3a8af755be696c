//! # confsig-store
//!
//! The remote store capability: read a key's current value + version, or
//! block until the stored version moves past a known one.
//!
//! [`ConsulStore`] speaks the Consul KV HTTP API; [`MemoryStore`] is an
//! in-process implementation for tests and local dry runs. Both are reached
//! through the [`KvStore`] trait so the reconciler and watcher never know
//! which one they hold.

pub mod consul;
pub mod error;
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;

use confsig_core::types::RemoteEntry;

pub use consul::ConsulStore;
pub use error::StoreError;
pub use memory::MemoryStore;

/// Outcome of one long-poll call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The stored version moved past `since_version`.
    Changed(RemoteEntry),
    /// `max_wait` elapsed with nothing newer; loop again immediately.
    Unchanged,
}

/// Versioned key-value store with a blocking change wait.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Point read. `Ok(None)` means the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<RemoteEntry>, StoreError>;

    /// Block up to `max_wait` until the stored version exceeds
    /// `since_version`.
    ///
    /// `max_wait` is required and should stay under the store's own wait cap
    /// (~55 s for Consul) so a wedged connection surfaces as an error rather
    /// than an open call held forever.
    async fn block_until_changed(
        &self,
        key: &str,
        since_version: u64,
        max_wait: Duration,
    ) -> Result<PollOutcome, StoreError>;
}
