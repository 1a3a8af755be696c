//! Consul KV implementation of [`KvStore`].
//!
//! Speaks the HTTP KV API directly:
//!
//! - `GET {addr}/v1/kv/{key}` — point read; 404 means the key is absent.
//! - `GET {addr}/v1/kv/{key}?index={since}&wait={n}s` — long-poll; the server
//!   holds the request until the key's `ModifyIndex` exceeds `index` or the
//!   wait elapses, then answers with the current pair either way.
//!
//! `Value` arrives base64-encoded; `ModifyIndex` is the opaque version token.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use confsig_core::types::RemoteEntry;

use crate::error::StoreError;
use crate::{KvStore, PollOutcome};

/// Slack added to the HTTP client timeout on top of the long-poll wait, so
/// the server side is the one that ends a healthy poll.
const REQUEST_TIMEOUT_MARGIN: Duration = Duration::from_secs(5);

/// Client timeout for point reads.
const GET_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Wire shape
// ---------------------------------------------------------------------------

/// One element of the KV API's JSON array response.
#[derive(Debug, Deserialize)]
pub(crate) struct KvPair {
    #[serde(rename = "Value")]
    value: Option<String>,
    #[serde(rename = "ModifyIndex")]
    modify_index: u64,
}

/// Decode the first pair of a successful response into a [`RemoteEntry`].
fn entry_from_pairs(pairs: Vec<KvPair>, key: &str) -> Result<RemoteEntry, StoreError> {
    let Some(pair) = pairs.into_iter().next() else {
        return Err(StoreError::EmptyResponse {
            key: key.to_string(),
        });
    };
    let value = match pair.value {
        Some(encoded) => BASE64.decode(encoded)?,
        None => Vec::new(),
    };
    Ok(RemoteEntry {
        value,
        version: pair.modify_index,
    })
}

/// Normalise a configured address into a base URL.
///
/// Consul convention is a bare `host:port`; an explicit scheme is passed
/// through. Trailing slashes are trimmed so path joins stay predictable.
fn base_url(addr: &str) -> String {
    let trimmed = addr.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}

// ---------------------------------------------------------------------------
// ConsulStore
// ---------------------------------------------------------------------------

/// HTTP client for a single Consul agent.
#[derive(Debug, Clone)]
pub struct ConsulStore {
    base: String,
    client: Client,
}

impl ConsulStore {
    /// Build a store client for `addr` (`host:port` or full URL).
    pub fn new(addr: &str) -> ConsulStore {
        ConsulStore {
            base: base_url(addr),
            client: Client::new(),
        }
    }

    /// `{base}/v1/kv/{key}` — keys may contain slashes, which stay verbatim.
    fn kv_url(&self, key: &str) -> String {
        format!("{}/v1/kv/{}", self.base, key)
    }

    async fn fetch(
        &self,
        key: &str,
        long_poll: Option<(u64, Duration)>,
    ) -> Result<Option<RemoteEntry>, StoreError> {
        let mut request = self.client.get(self.kv_url(key));
        request = match long_poll {
            Some((since_version, max_wait)) => request
                .query(&[
                    ("index", since_version.to_string()),
                    ("wait", format!("{}s", max_wait.as_secs())),
                ])
                .timeout(max_wait + REQUEST_TIMEOUT_MARGIN),
            None => request.timeout(GET_TIMEOUT),
        };

        let response = request.send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(StoreError::UnexpectedStatus {
                status: response.status(),
                key: key.to_string(),
            });
        }

        let pairs: Vec<KvPair> = response.json().await?;
        entry_from_pairs(pairs, key).map(Some)
    }
}

#[async_trait::async_trait]
impl KvStore for ConsulStore {
    async fn get(&self, key: &str) -> Result<Option<RemoteEntry>, StoreError> {
        self.fetch(key, None).await
    }

    async fn block_until_changed(
        &self,
        key: &str,
        since_version: u64,
        max_wait: Duration,
    ) -> Result<PollOutcome, StoreError> {
        match self.fetch(key, Some((since_version, max_wait))).await? {
            // A long-poll on an absent key returns once the wait elapses;
            // nothing newer to report until the key is created.
            None => Ok(PollOutcome::Unchanged),
            Some(entry) if entry.version > since_version => Ok(PollOutcome::Changed(entry)),
            Some(_) => Ok(PollOutcome::Unchanged),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
