use std::num::NonZeroUsize;

use lru::LruCache;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Default bound on the recently-seen `msg.id` set, per spec §4.7:
/// "each receiver maintains a bounded set of recently seen msg.ids."
pub const DEFAULT_DEDUP_CAPACITY: usize = 10_000;

/// Tracks recently delivered message ids so a retransmitted `msg` (sender
/// never saw our `ack`) is acknowledged again without re-invoking the
/// handler.
pub struct DedupSet {
    seen: Mutex<LruCache<Uuid, ()>>,
}

impl DedupSet {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self {
            seen: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Returns `true` if this is the first time `id` has been observed.
    /// A `false` result means the caller should re-send `ack`/`nack`
    /// without routing the message again.
    pub async fn check_and_insert(&self, id: Uuid) -> bool {
        let mut seen = self.seen.lock().await;
        if seen.contains(&id) {
            false
        } else {
            seen.put(id, ());
            true
        }
    }
}

impl Default for DedupSet {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_sighting_is_novel_second_is_not() {
        let dedup = DedupSet::new(8);
        let id = Uuid::new_v4();
        assert!(dedup.check_and_insert(id).await);
        assert!(!dedup.check_and_insert(id).await);
    }

    #[tokio::test]
    async fn eviction_forgets_oldest_entries() {
        let dedup = DedupSet::new(2);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        assert!(dedup.check_and_insert(a).await);
        assert!(dedup.check_and_insert(b).await);
        assert!(dedup.check_and_insert(c).await);
        // `a` was evicted to make room for `c`, so it now reads as novel again.
        assert!(dedup.check_and_insert(a).await);
    }
}
