//! Error types for confsig-store.

use thiserror::Error;

/// All errors that can arise talking to the remote store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Transport-level failure (connect, timeout, TLS, ...).
    #[error("store request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The store answered with an unexpected status code.
    #[error("store returned HTTP {status} for key '{key}'")]
    UnexpectedStatus {
        status: reqwest::StatusCode,
        key: String,
    },

    /// Response body was not the expected JSON shape.
    #[error("store response decode error: {0}")]
    Json(#[from] serde_json::Error),

    /// A pair's `Value` field was not valid base64.
    #[error("store value is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The store answered success but with an empty pair list.
    #[error("store returned an empty response for key '{key}'")]
    EmptyResponse { key: String },
}
