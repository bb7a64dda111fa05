use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::{find_as, upsert_as, SharedStore};
use crate::error::StoreError;

/// Hands out per-request database handles and tracks how many are outstanding.
#[derive(Clone)]
pub struct DatabasePool {
    store: SharedStore,
    active: Arc<AtomicUsize>,
}

impl DatabasePool {
    pub fn new(store: SharedStore) -> Self {
        Self { store, active: Arc::new(AtomicUsize::new(0)) }
    }

    /// Acquire a handle for the duration of one request. Released when the lease drops.
    pub fn acquire(&self) -> DatabaseLease {
        self.active.fetch_add(1, Ordering::SeqCst);
        DatabaseLease {
            db: Database { store: self.store.clone() },
            active: self.active.clone(),
        }
    }

    /// Number of leases currently held.
    pub fn active_handles(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn store(&self) -> &SharedStore { &self.store }
}

/// Ownership of a request-scoped handle. Dropping it releases the handle, on every path.
pub struct DatabaseLease {
    db: Database,
    active: Arc<AtomicUsize>,
}

impl DatabaseLease {
    pub fn database(&self) -> Database { self.db.clone() }
}

impl Drop for DatabaseLease {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Request-scoped view of the document store, placed in request extensions.
#[derive(Clone)]
pub struct Database {
    store: SharedStore,
}

impl Database {
    pub fn find(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        self.store.find(collection, id)
    }

    pub fn find_as<T: DeserializeOwned>(&self, collection: &str, id: &str) -> Result<Option<T>, StoreError> {
        find_as(self.store.as_ref(), collection, id)
    }

    pub fn upsert_as<T: Serialize>(&self, collection: &str, id: &str, record: &T) -> Result<(), StoreError> {
        upsert_as(self.store.as_ref(), collection, id, record)
    }

    pub fn remove(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        self.store.remove(collection, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn leases_are_counted_until_dropped() {
        let pool = DatabasePool::new(Arc::new(MemoryStore::new()));
        assert_eq!(pool.active_handles(), 0);
        let a = pool.acquire();
        let b = pool.acquire();
        assert_eq!(pool.active_handles(), 2);
        // cloned handles do not extend the lease
        let db = a.database();
        drop(a);
        assert_eq!(pool.active_handles(), 1);
        drop(b);
        assert_eq!(pool.active_handles(), 0);
        assert!(db.find("users", "x").unwrap().is_none());
    }

    #[test]
    fn lease_released_during_unwind() {
        let pool = DatabasePool::new(Arc::new(MemoryStore::new()));
        let p = pool.clone();
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _lease = p.acquire();
            panic!("handler fault");
        }));
        assert!(res.is_err());
        assert_eq!(pool.active_handles(), 0);
    }
}
