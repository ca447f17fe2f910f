use std::sync::{Arc, Mutex, MutexGuard};

use crate::types::CollectionSelector;

/// Selector state saved when a controller is dropped so the next one
/// created in the same session can pick up where it left off.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<T> {
    pub selector: CollectionSelector,
    pub recent_items: Vec<T>,
    pub recent_cursor: Option<String>,
    pub has_next_page_recent: bool,
    pub search_query: String,
}

#[derive(Debug)]
struct Slot<T> {
    snapshot: Option<Snapshot<T>>,
    needs_refresh: bool,
}

/// Session-scoped, in-memory cache shared by clones.
#[derive(Debug)]
pub struct SessionCache<T> {
    inner: Arc<Mutex<Slot<T>>>,
}

impl<T> Clone for SessionCache<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for SessionCache<T> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Slot {
                snapshot: None,
                needs_refresh: false,
            })),
        }
    }
}

impl<T: Clone> SessionCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Slot<T>> {
        // A panic while holding the lock can't leave a Slot half-written.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn save(&self, snapshot: Snapshot<T>) {
        let mut slot = self.slot();
        slot.snapshot = Some(snapshot);
        slot.needs_refresh = false;
    }

    /// Saved snapshot, unless the cache was invalidated since it was saved.
    pub fn restore(&self) -> Option<Snapshot<T>> {
        let mut slot = self.slot();
        if slot.needs_refresh {
            slot.needs_refresh = false;
            slot.snapshot = None;
            return None;
        }
        slot.snapshot.clone()
    }

    /// Mark the saved data stale, e.g. when the user asked for a refresh.
    pub fn invalidate(&self) {
        self.slot().needs_refresh = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(items: Vec<u32>) -> Snapshot<u32> {
        Snapshot {
            selector: CollectionSelector::AllMembers,
            recent_items: items,
            recent_cursor: Some("c1".into()),
            has_next_page_recent: true,
            search_query: String::new(),
        }
    }

    #[test]
    fn restore_returns_saved_snapshot() {
        let cache = SessionCache::new();
        assert!(cache.restore().is_none());
        cache.save(snapshot(vec![1, 2]));
        assert_eq!(cache.restore(), Some(snapshot(vec![1, 2])));
        assert_eq!(cache.restore(), Some(snapshot(vec![1, 2])));
    }

    #[test]
    fn invalidate_discards_snapshot_once() {
        let cache = SessionCache::new();
        cache.save(snapshot(vec![1]));
        cache.invalidate();
        assert!(cache.restore().is_none());
        assert!(cache.restore().is_none());

        cache.save(snapshot(vec![3]));
        assert_eq!(cache.restore(), Some(snapshot(vec![3])));
    }

    #[test]
    fn clones_share_storage() {
        let cache = SessionCache::new();
        let other = cache.clone();
        other.save(snapshot(vec![7]));
        assert_eq!(cache.restore(), Some(snapshot(vec![7])));
        cache.invalidate();
        assert!(other.restore().is_none());
    }
}
