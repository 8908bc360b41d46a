//! Error types for each stage of the pipeline.
//!
//! Fetch and extraction errors never escape their stage; they are logged and
//! turned into empty results. Store and publish errors are fatal for one topic
//! and end up in that topic's [`RunResult`](crate::models::RunResult).

use thiserror::Error;

/// Failure to retrieve or decode a remote document.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("HTTP {0}")]
    Status(u16),

    #[error("malformed payload: {0}")]
    Parse(String),
}

impl FetchError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout(_) | FetchError::Transport(_) => true,
            FetchError::Status(code) => is_transient_status(*code),
            FetchError::Parse(_) => false,
        }
    }
}

/// 5xx, request timeout and rate limiting are worth retrying. Everything else
/// (notably 401/403) is terminal.
pub fn is_transient_status(code: u16) -> bool {
    code >= 500 || code == 408 || code == 429
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage metadata error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("stored dataset at {key} is not valid JSON: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode dataset: {0}")]
    Encode(#[source] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// The run was interrupted before this unit of work could finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cancelled")]
pub struct Cancelled;
