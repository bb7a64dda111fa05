//! Cluster-wide typed settings.
//!
//! Each settings type is a serde document stored in the `settings` collection under a
//! fixed key. `register_all` wires every type into a `SettingsRegistry` at startup; the
//! registry loads the records, creates defaults for missing ones and publishes the
//! decoded values. `spawn_watcher` keeps them current while the server runs.

use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::error::SettingsError;

mod auth;
mod published;
mod registry;
mod watcher;

pub use auth::{AuthSettings, Provider, ProviderKind, ProviderType, RoleManagement, AUTH_KEY, DEFAULT_AUTH_SERVER};
pub use published::Published;
pub use registry::SettingsRegistry;
pub use watcher::spawn_watcher;

/// Collection holding every settings document.
pub const SETTINGS_COLLECTION: &str = "settings";

static AUTH: Lazy<Published<AuthSettings>> = Lazy::new(|| Published::new(AuthSettings::default()));

/// Current authentication settings snapshot.
pub fn auth() -> Arc<AuthSettings> {
    AUTH.get()
}

/// Look up a provider in the current snapshot. `None` is an ordinary outcome.
pub fn get_provider(id: &str) -> Option<Provider> {
    auth().provider(id).cloned()
}

/// Register every settings type. Must run once, before the first load.
pub fn register_all(registry: &mut SettingsRegistry) -> Result<(), SettingsError> {
    registry.register(AUTH_KEY, AuthSettings::default, |next: AuthSettings| {
        let dups = next.duplicate_provider_ids();
        if !dups.is_empty() {
            tracing::warn!(target: "settings", duplicates = ?dups, "settings: duplicate provider ids, first entry wins");
        }
        AUTH.publish(next);
    })?;
    Ok(())
}
