//! Storage traits and error types
//!
//! The crawl core only needs atomic get/set of named blobs; everything else about how
//! state is kept belongs to the backend.

use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to lock storage: {0}")]
    Lock(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Named blob storage
///
/// Each call is atomic for its key. Callers never see a partially written value.
pub trait KeyValueStore {
    /// Returns the blob stored under `key`, or None if absent
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Stores `value` under `key`, replacing any previous blob
    fn set(&mut self, key: &str, value: &[u8]) -> StorageResult<()>;

    /// Deletes `key`; deleting a missing key is not an error
    fn remove(&mut self, key: &str) -> StorageResult<()>;
}
