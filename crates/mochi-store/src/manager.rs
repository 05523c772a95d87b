use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{info, warn};

use crate::error::StoreError;
use crate::store::Store;

const JANITOR_INTERVAL: Duration = Duration::from_secs(60);
const CLOSE_GRACE: Duration = Duration::from_secs(60);

/// Process-wide `path -> handle` registry. `open` shares a single [`Store`]
/// across every caller resolving the same file; `close` only flags the
/// handle as closeable, leaving eviction to the janitor so a racing `open`
/// can cancel the close by reviving the entry.
#[derive(Clone)]
pub struct StoreManager {
    stores: Arc<RwLock<HashMap<PathBuf, Arc<Store>>>>,
}

impl Default for StoreManager {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreManager {
    pub fn new() -> Self {
        StoreManager {
            stores: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn open(&self, path: &Path) -> Result<Arc<Store>, StoreError> {
        if let Some(existing) = self.stores.read().get(path) {
            existing.mark_reopened();
            return Ok(existing.clone());
        }

        let store = Arc::new(Store::open(path).await?);
        let mut stores = self.stores.write();
        // Another opener may have raced us between the read lock above and
        // here; prefer whichever handle landed first so there is only ever
        // one live pool per path.
        let handle = stores.entry(path.to_path_buf()).or_insert(store).clone();
        handle.mark_reopened();
        Ok(handle)
    }

    pub fn close(&self, path: &Path) {
        if let Some(store) = self.stores.read().get(path) {
            store.mark_closed();
        }
    }

    pub fn open_count(&self) -> usize {
        self.stores.read().len()
    }

    /// Evicts any handle whose `closed_at` predates `CLOSE_GRACE`. Intended
    /// to run once per `JANITOR_INTERVAL` for the process lifetime.
    pub fn sweep(&self) {
        let mut stores = self.stores.write();
        let before = stores.len();
        stores.retain(|path, store| {
            let keep = store
                .closed_for()
                .map(|elapsed| elapsed < CLOSE_GRACE)
                .unwrap_or(true);
            if !keep {
                info!(path = %path.display(), "evicting idle store handle");
            }
            keep
        });
        if stores.len() != before {
            info!(evicted = before - stores.len(), "store janitor sweep complete");
        }
    }

    pub fn spawn_janitor(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(JANITOR_INTERVAL);
            loop {
                ticker.tick().await;
                self.sweep();
            }
        })
    }
}

pub fn log_open_failure(path: &Path, err: &StoreError) {
    warn!(path = %path.display(), error = %err, "failed to open store");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn repeated_open_shares_handle() {
        let dir = tempfile::tempdir().unwrap();
        let manager = StoreManager::new();
        let path = dir.path().join("shared.db");

        let a = manager.open(&path).await.unwrap();
        let b = manager.open(&path).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(manager.open_count(), 1);
    }

    #[tokio::test]
    async fn sweep_evicts_only_after_grace_elapses() {
        let dir = tempfile::tempdir().unwrap();
        let manager = StoreManager::new();
        let path = dir.path().join("evict.db");
        manager.open(&path).await.unwrap();
        manager.close(&path);

        manager.sweep();
        assert_eq!(manager.open_count(), 1, "grace period has not elapsed yet");
    }
}
