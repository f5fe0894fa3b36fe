//! Store trait abstractions.

use async_trait::async_trait;
use quill_core::{BacklogId, BacklogItem};

/// Error type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File involved
        path: std::path::PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Item not found
    #[error("Not found: {0}")]
    NotFound(String),
}

impl StorageError {
    pub(crate) fn io(path: impl Into<std::path::PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Set of job keys that completed successfully.
///
/// A key present in the ledger is never executed again until the ledger is
/// cleared.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Whether `key` has been recorded as completed.
    async fn is_completed(&self, key: &str) -> Result<bool>;

    /// Record `key` as completed. Marking an already completed key is a no-op.
    async fn mark_completed(&mut self, key: &str) -> Result<()>;

    /// All completed keys in completion order.
    async fn completed(&self) -> Result<Vec<String>>;

    /// Forget every completion.
    async fn clear(&mut self) -> Result<()>;
}

/// Append-only list of discovered follow-up jobs.
#[async_trait]
pub trait BacklogStore: Send + Sync {
    /// All items in insertion order.
    async fn list(&self) -> Result<Vec<BacklogItem>>;

    /// Append an item under a fresh id and return that id.
    ///
    /// No deduplication: identical items become distinct entries.
    async fn append(&mut self, item: BacklogItem) -> Result<BacklogId>;

    /// Transition an item to completed. Completing a completed item is a no-op.
    async fn mark_completed(&mut self, id: BacklogId) -> Result<()>;

    /// Drop every item.
    async fn clear(&mut self) -> Result<()>;
}
