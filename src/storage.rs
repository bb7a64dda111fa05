//!
//! zerogate storage module
//! -----------------------
//! The persistence collaborator seen by the gateway core. Records are JSON documents
//! addressed by `(collection, id)`. Two backends are provided: `MemoryStore` for a
//! single process and `FileStore`, which keeps one JSON file per record under
//! `<root>/<collection>/<id>.json`.
//!
//! Every write is announced on a change feed so that settings can be refreshed
//! while requests are being served. Request handlers never hold the store directly;
//! they receive a per-request `Database` handle acquired through a `DatabasePool`.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::StoreError;

mod file;
mod handle;
mod memory;
mod paths;

pub use file::FileStore;
pub use handle::{Database, DatabaseLease, DatabasePool};
pub use memory::MemoryStore;

/// Number of change notifications buffered per subscriber before it lags.
const CHANGE_FEED_CAPACITY: usize = 64;

/// A record was written or removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub collection: String,
    pub id: String,
}

/// Minimal document-store contract used by the gateway.
///
/// `find` distinguishes absence (`Ok(None)`) from failure (`Err`). Callers rely on
/// that split: absence is an expected outcome, failure aborts the current request.
pub trait DocumentStore: Send + Sync {
    fn find(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError>;
    fn upsert(&self, collection: &str, id: &str, record: Value) -> Result<(), StoreError>;
    /// Returns true if a record was removed.
    fn remove(&self, collection: &str, id: &str) -> Result<bool, StoreError>;
    fn subscribe(&self) -> broadcast::Receiver<Change>;
}

pub type SharedStore = Arc<dyn DocumentStore>;

/// Typed lookup: a stored record that does not decode is a failure, not an absence.
pub fn find_as<T: DeserializeOwned>(store: &dyn DocumentStore, collection: &str, id: &str) -> Result<Option<T>, StoreError> {
    let Some(value) = store.find(collection, id)? else { return Ok(None); };
    serde_json::from_value(value)
        .map(Some)
        .map_err(|source| StoreError::Codec { collection: collection.to_string(), id: id.to_string(), source })
}

pub fn upsert_as<T: Serialize>(store: &dyn DocumentStore, collection: &str, id: &str, record: &T) -> Result<(), StoreError> {
    let value = serde_json::to_value(record)
        .map_err(|source| StoreError::Codec { collection: collection.to_string(), id: id.to_string(), source })?;
    store.upsert(collection, id, value)
}

/// Broadcast side of the change feed shared by the store backends.
#[derive(Clone)]
pub(crate) struct ChangeFeed {
    tx: broadcast::Sender<Change>,
}

impl ChangeFeed {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self { tx }
    }

    pub(crate) fn publish(&self, collection: &str, id: &str) {
        // No subscribers is fine; nobody is watching yet.
        let _ = self.tx.send(Change { collection: collection.to_string(), id: id.to_string() });
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<Change> {
        self.tx.subscribe()
    }
}
