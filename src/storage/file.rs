use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

use super::paths::{collection_dir, record_path};
use super::{Change, ChangeFeed, DocumentStore};
use crate::error::StoreError;

/// On-disk document store: one pretty-printed JSON file per record.
///
/// Writes go to a temporary file that is renamed over the target, so a concurrent
/// reader sees either the previous or the new document.
pub struct FileStore {
    root: PathBuf,
    write_lock: Mutex<()>,
    feed: ChangeFeed,
}

impl FileStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root, write_lock: Mutex::new(()), feed: ChangeFeed::new() })
    }

    pub fn root_path(&self) -> &Path { &self.root }
}

impl DocumentStore for FileStore {
    fn find(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        let path = record_path(&self.root, collection, id);
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::Io(e)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| StoreError::Codec { collection: collection.to_string(), id: id.to_string(), source })
    }

    fn upsert(&self, collection: &str, id: &str, record: Value) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(&record)
            .map_err(|source| StoreError::Codec { collection: collection.to_string(), id: id.to_string(), source })?;
        {
            let _guard = self.write_lock.lock();
            fs::create_dir_all(collection_dir(&self.root, collection))?;
            let path = record_path(&self.root, collection, id);
            let tmp = path.with_extension("json.tmp");
            fs::write(&tmp, bytes)?;
            fs::rename(&tmp, &path)?;
            debug!(collection, id, "store.upsert path={}", path.display());
        }
        self.feed.publish(collection, id);
        Ok(())
    }

    fn remove(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        let removed = {
            let _guard = self.write_lock.lock();
            match fs::remove_file(record_path(&self.root, collection, id)) {
                Ok(()) => true,
                Err(e) if e.kind() == ErrorKind::NotFound => false,
                Err(e) => return Err(StoreError::Io(e)),
            }
        };
        if removed {
            self.feed.publish(collection, id);
        }
        Ok(removed)
    }

    fn subscribe(&self) -> broadcast::Receiver<Change> {
        self.feed.subscribe()
    }
}
