//! Storage module for persisting crawl state
//!
//! This module handles everything that must outlive an execution context:
//! - The crawl session blob
//! - The target queue
//! - Per-target sync watermarks
//!
//! Values are stored as JSON under fixed keys in a [`KeyValueStore`].

mod memory;
mod schema;
mod sqlite;
mod traits;

pub use memory::MemoryStore;
pub use schema::initialize_schema;
pub use sqlite::SqliteStore;
pub use traits::{KeyValueStore, StorageError, StorageResult};

use crate::SweepError;
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Store handle shared by the controller, the queue manager and the CLI
pub type SharedStore = Arc<Mutex<dyn KeyValueStore + Send>>;

/// Key of the persisted crawl session
pub const SESSION_KEY: &str = "crawl_session";

/// Key of the persisted target queue
pub const QUEUE_KEY: &str = "target_queue";

/// Key under which the last completed sync date of `target_id` is kept
pub fn watermark_key(target_id: &str) -> String {
    format!("watermark:{}", target_id)
}

/// Wraps a store for sharing
pub fn shared<S: KeyValueStore + Send + 'static>(store: S) -> SharedStore {
    Arc::new(Mutex::new(store))
}

/// Opens the SQLite store at `path` and wraps it for sharing
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SharedStore)` - Successfully opened storage
/// * `Err(SweepError)` - Failed to open the database
pub fn open_store(path: &Path) -> Result<SharedStore, SweepError> {
    Ok(shared(SqliteStore::new(path)?))
}

/// Reads and decodes the JSON value under `key`
pub fn load_json<T: DeserializeOwned>(
    store: &SharedStore,
    key: &str,
) -> Result<Option<T>, SweepError> {
    let blob = {
        let guard = store
            .lock()
            .map_err(|e| StorageError::Lock(e.to_string()))?;
        guard.get(key)?
    };

    match blob {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

/// Encodes `value` as JSON and stores it under `key`
pub fn save_json<T: Serialize>(
    store: &SharedStore,
    key: &str,
    value: &T,
) -> Result<(), SweepError> {
    let bytes = serde_json::to_vec(value)?;
    let mut guard = store
        .lock()
        .map_err(|e| StorageError::Lock(e.to_string()))?;
    guard.set(key, &bytes)?;
    Ok(())
}

/// Deletes the value under `key`
pub fn remove_key(store: &SharedStore, key: &str) -> Result<(), SweepError> {
    let mut guard = store
        .lock()
        .map_err(|e| StorageError::Lock(e.to_string()))?;
    guard.remove(key)?;
    Ok(())
}

/// Returns the date the last completed session for `target_id` finished on
pub fn load_watermark(
    store: &SharedStore,
    target_id: &str,
) -> Result<Option<NaiveDate>, SweepError> {
    load_json(store, &watermark_key(target_id))
}

pub fn save_watermark(
    store: &SharedStore,
    target_id: &str,
    date: NaiveDate,
) -> Result<(), SweepError> {
    save_json(store, &watermark_key(target_id), &date)
}
