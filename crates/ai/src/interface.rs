//! Backend and sink interfaces consumed by the job runner.

use async_trait::async_trait;
use quill_core::{BackendConfig, JobPayload};
use std::path::PathBuf;

/// Ways a generation call can fail.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// Provider signalled capacity exhaustion (HTTP 429 or equivalent)
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// No response within the invocation timeout
    #[error("timed out: {0}")]
    Timeout(String),

    /// Request rejected as malformed or unauthorized
    #[error("invalid request: {0}")]
    Invalid(String),

    /// Anything else
    #[error("{0}")]
    Other(String),
}

/// A text-generation capability.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Generate text for `payload` using `config`.
    async fn invoke(&self, payload: &JobPayload, config: &BackendConfig) -> Result<String, BackendError>;
}

/// A generated document ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Ledger key of the producing job; names the file when the title cannot
    pub key: String,
    /// Title
    pub title: String,
    /// Body
    pub content: String,
    /// Document type, used to group output
    pub doc_type: String,
    /// Output format
    pub format: String,
}

/// Errors raised while storing a document.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// I/O error
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Title produced an empty file name
    #[error("title {0:?} does not yield a usable file name")]
    InvalidTitle(String),
}

/// Persists generated documents.
#[async_trait]
pub trait DocumentSink: Send + Sync {
    /// Store `document` and return where it went.
    async fn save(&self, document: &Document) -> Result<PathBuf, SinkError>;
}
