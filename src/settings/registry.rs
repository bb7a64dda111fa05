use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info};

use super::SETTINGS_COLLECTION;
use crate::error::SettingsError;
use crate::storage::DocumentStore;

type Constructor = Box<dyn Fn() -> Result<Value, serde_json::Error> + Send + Sync>;
type Installer = Box<dyn Fn(Value) -> Result<(), serde_json::Error> + Send + Sync>;

struct Entry {
    construct: Constructor,
    install: Installer,
}

/// Maps a settings key to the constructor and updater of its typed singleton.
///
/// Registration needs `&mut self`, loading needs `&self`: once the registry is shared
/// (typically behind an `Arc`) no further keys can be added.
#[derive(Default)]
pub struct SettingsRegistry {
    entries: HashMap<String, Entry>,
    order: Vec<String>,
}

impl SettingsRegistry {
    pub fn new() -> Self { Self::default() }

    /// Associate `key` with a default constructor and an updater that publishes a
    /// freshly loaded value. A key can only be registered once.
    pub fn register<T, C, U>(&mut self, key: &str, constructor: C, updater: U) -> Result<(), SettingsError>
    where
        T: Serialize + DeserializeOwned + 'static,
        C: Fn() -> T + Send + Sync + 'static,
        U: Fn(T) + Send + Sync + 'static,
    {
        if self.entries.contains_key(key) {
            return Err(SettingsError::DuplicateKey(key.to_string()));
        }
        let construct: Constructor = Box::new(move || serde_json::to_value(constructor()));
        let install: Installer = Box::new(move |value: Value| {
            let typed: T = serde_json::from_value(value)?;
            updater(typed);
            Ok(())
        });
        self.entries.insert(key.to_string(), Entry { construct, install });
        self.order.push(key.to_string());
        Ok(())
    }

    pub fn contains(&self, key: &str) -> bool { self.entries.contains_key(key) }

    /// Registered keys in registration order.
    pub fn keys(&self) -> &[String] { &self.order }

    /// Load `key` from the store and publish it. A missing record is replaced by the
    /// registered default, which is persisted first. On failure the previously
    /// published value stays current and the error is logged.
    pub fn load(&self, store: &dyn DocumentStore, key: &str) -> Result<(), SettingsError> {
        let res = self.load_inner(store, key);
        if let Err(e) = &res {
            error!(target: "settings", key, error = %e, "settings: load failed");
        }
        res
    }

    fn load_inner(&self, store: &dyn DocumentStore, key: &str) -> Result<(), SettingsError> {
        let entry = self.entries.get(key).ok_or_else(|| SettingsError::UnknownKey(key.to_string()))?;
        let decode = |source: serde_json::Error| SettingsError::Decode { key: key.to_string(), source };

        let record = match store.find(SETTINGS_COLLECTION, key)? {
            Some(record) => record,
            None => {
                let record = (entry.construct)().map_err(decode)?;
                store.upsert(SETTINGS_COLLECTION, key, record.clone())?;
                info!(target: "settings", key, "settings: created default record");
                record
            }
        };
        (entry.install)(record).map_err(decode)
    }

    /// Load every key in registration order, stopping at the first failure.
    pub fn load_all(&self, store: &dyn DocumentStore) -> Result<(), SettingsError> {
        for key in &self.order {
            self.load(store, key)?;
        }
        Ok(())
    }

    /// Reload every key, continuing past failures. Returns the number that failed.
    pub fn refresh_all(&self, store: &dyn DocumentStore) -> usize {
        self.order.iter().filter(|key| self.load(store, key).is_err()).count()
    }
}
