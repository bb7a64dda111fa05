use std::collections::HashMap;

use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::broadcast;

use super::{Change, ChangeFeed, DocumentStore};
use crate::error::StoreError;

/// Process-local document store. Used by tests and single-node deployments.
pub struct MemoryStore {
    records: RwLock<HashMap<(String, String), Value>>,
    feed: ChangeFeed,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self { records: RwLock::new(HashMap::new()), feed: ChangeFeed::new() }
    }

    pub fn len(&self) -> usize { self.records.read().len() }

    pub fn is_empty(&self) -> bool { self.records.read().is_empty() }
}

impl Default for MemoryStore {
    fn default() -> Self { Self::new() }
}

impl DocumentStore for MemoryStore {
    fn find(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        let map = self.records.read();
        Ok(map.get(&(collection.to_string(), id.to_string())).cloned())
    }

    fn upsert(&self, collection: &str, id: &str, record: Value) -> Result<(), StoreError> {
        {
            let mut map = self.records.write();
            map.insert((collection.to_string(), id.to_string()), record);
        }
        self.feed.publish(collection, id);
        Ok(())
    }

    fn remove(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        let removed = self.records.write().remove(&(collection.to_string(), id.to_string())).is_some();
        if removed {
            self.feed.publish(collection, id);
        }
        Ok(removed)
    }

    fn subscribe(&self) -> broadcast::Receiver<Change> {
        self.feed.subscribe()
    }
}
