//! In-process [`KvStore`] for tests and local dry runs.
//!
//! Versions start at 1 and bump on every [`MemoryStore::put`]; waiters are
//! woken through a [`tokio::sync::Notify`], so `block_until_changed` behaves
//! like a real long-poll without any network.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;

use confsig_core::types::RemoteEntry;

use crate::error::StoreError;
use crate::{KvStore, PollOutcome};

#[derive(Default)]
struct Inner {
    entries: HashMap<String, RemoteEntry>,
    next_version: u64,
}

/// Shared in-memory store; clones observe the same entries.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    changed: Arc<Notify>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    /// Set `key` to `value`, bumping the store-wide version counter and
    /// waking every blocked poll.
    pub fn put(&self, key: &str, value: impl Into<Vec<u8>>) {
        {
            let mut inner = self.inner.lock().expect("memory store lock");
            inner.next_version += 1;
            let version = inner.next_version;
            inner.entries.insert(
                key.to_string(),
                RemoteEntry {
                    value: value.into(),
                    version,
                },
            );
        }
        self.changed.notify_waiters();
    }

    /// Remove `key` entirely, as if it never existed.
    pub fn remove(&self, key: &str) {
        self.inner
            .lock()
            .expect("memory store lock")
            .entries
            .remove(key);
        self.changed.notify_waiters();
    }

    fn current(&self, key: &str) -> Option<RemoteEntry> {
        self.inner
            .lock()
            .expect("memory store lock")
            .entries
            .get(key)
            .cloned()
    }
}

#[async_trait::async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<RemoteEntry>, StoreError> {
        Ok(self.current(key))
    }

    async fn block_until_changed(
        &self,
        key: &str,
        since_version: u64,
        max_wait: Duration,
    ) -> Result<PollOutcome, StoreError> {
        let deadline = tokio::time::sleep(max_wait);
        tokio::pin!(deadline);

        loop {
            // Register for wakeups before inspecting state, so a put that
            // lands between the check and the await is not missed.
            let notified = self.changed.notified();

            if let Some(entry) = self.current(key) {
                if entry.version > since_version {
                    return Ok(PollOutcome::Changed(entry));
                }
            }

            tokio::select! {
                _ = &mut deadline => return Ok(PollOutcome::Unchanged),
                _ = notified => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_reflects_latest_put() {
        let store = MemoryStore::new();
        assert!(store.get("k").await.expect("get").is_none());

        store.put("k", "v1");
        let first = store.get("k").await.expect("get").expect("entry");
        assert_eq!(first.value, b"v1");

        store.put("k", "v2");
        let second = store.get("k").await.expect("get").expect("entry");
        assert_eq!(second.value, b"v2");
        assert!(second.version > first.version);
    }

    #[tokio::test(start_paused = true)]
    async fn block_returns_unchanged_after_max_wait() {
        let store = MemoryStore::new();
        store.put("k", "v1");
        let version = store.get("k").await.expect("get").expect("entry").version;

        let outcome = store
            .block_until_changed("k", version, Duration::from_secs(55))
            .await
            .expect("poll");
        assert_eq!(outcome, PollOutcome::Unchanged);
    }

    #[tokio::test]
    async fn block_wakes_on_put() {
        let store = MemoryStore::new();
        store.put("k", "v1");
        let version = store.get("k").await.expect("get").expect("entry").version;

        let waiter = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .block_until_changed("k", version, Duration::from_secs(55))
                    .await
            })
        };

        tokio::task::yield_now().await;
        store.put("k", "v2");

        let outcome = waiter.await.expect("join").expect("poll");
        match outcome {
            PollOutcome::Changed(entry) => assert_eq!(entry.value, b"v2"),
            PollOutcome::Unchanged => panic!("expected a change"),
        }
    }
}
