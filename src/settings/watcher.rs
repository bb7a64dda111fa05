use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::{SettingsRegistry, SETTINGS_COLLECTION};
use crate::storage::SharedStore;

/// Keep registered settings current.
///
/// A change to `settings/<key>` reloads that key immediately; every `poll` all keys are
/// reloaded so that writes made by other nodes are picked up even without a feed
/// event. Load failures are logged by the registry and leave the published value alone.
pub fn spawn_watcher(registry: Arc<SettingsRegistry>, store: SharedStore, poll: Duration) -> JoinHandle<()> {
    let mut feed = store.subscribe();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(poll);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // first tick completes immediately; startup already loaded everything
        tick.tick().await;
        loop {
            tokio::select! {
                change = feed.recv() => match change {
                    Ok(change) => {
                        if change.collection == SETTINGS_COLLECTION && registry.contains(&change.id) {
                            debug!(target: "settings", key = %change.id, "settings: change notification");
                            let _ = registry.load(store.as_ref(), &change.id);
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!(target: "settings", missed, "settings: change feed lagged, reloading all");
                        registry.refresh_all(store.as_ref());
                    }
                    Err(RecvError::Closed) => {
                        info!(target: "settings", "settings: change feed closed, watcher stopping");
                        break;
                    }
                },
                _ = tick.tick() => {
                    let failed = registry.refresh_all(store.as_ref());
                    debug!(target: "settings", failed, "settings: periodic refresh");
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Published;
    use crate::storage::{DocumentStore, MemoryStore};
    use serde_json::json;

    #[tokio::test]
    async fn feed_change_republishes() {
        let store: SharedStore = Arc::new(MemoryStore::new());
        let live = Arc::new(Published::new(0u32));
        let mut reg = SettingsRegistry::new();
        {
            let live = live.clone();
            reg.register("counter", || 0u32, move |v: u32| { live.publish(v); }).unwrap();
        }
        let reg = Arc::new(reg);
        reg.load_all(store.as_ref()).unwrap();

        let handle = spawn_watcher(reg.clone(), store.clone(), Duration::from_secs(3600));
        store.upsert(SETTINGS_COLLECTION, "counter", json!(41)).unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while *live.get() != 41 {
            assert!(tokio::time::Instant::now() < deadline, "watcher never applied the change");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.abort();
    }
}
