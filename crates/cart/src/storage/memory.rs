//! In-process storage origin shared between tab handles.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;

use super::{KeyValueStorage, StorageError, StorageEvent, StorageWatch, WATCH_CAPACITY};

/// An in-memory storage origin.
///
/// Every [`MemoryStorage`] handle opened from the same origin sees the same
/// entries. A write through one handle is delivered to the watchers of every
/// other handle, never to the writer's own watchers.
///
/// ```
/// use tangogi_cart::storage::{KeyValueStorage, MemoryStorage};
///
/// let tab_a = MemoryStorage::new();
/// let tab_b = tab_a.open_tab();
/// let mut feed = tab_b.watch();
///
/// tab_a.set("tangogi-cart", "[]").unwrap();
/// let event = feed.try_next().unwrap().unwrap();
/// assert_eq!(event.key, "tangogi-cart");
/// assert_eq!(tab_b.get("tangogi-cart").unwrap().as_deref(), Some("[]"));
/// ```
#[derive(Clone)]
pub struct MemoryStorage {
    origin: Arc<Origin>,
    tab: u64,
}

struct Origin {
    entries: Mutex<HashMap<String, String>>,
    quota: Option<usize>,
    /// One change channel per watching tab.
    feeds: Mutex<HashMap<u64, broadcast::Sender<StorageEvent>>>,
    next_tab: AtomicU64,
}

impl MemoryStorage {
    /// Create a new origin with no quota and return its first tab.
    #[must_use]
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Create a new origin whose keys and values together may not exceed
    /// `quota` bytes.
    #[must_use]
    pub fn with_quota(quota: usize) -> Self {
        Self::build(Some(quota))
    }

    fn build(quota: Option<usize>) -> Self {
        Self {
            origin: Arc::new(Origin {
                entries: Mutex::new(HashMap::new()),
                quota,
                feeds: Mutex::new(HashMap::new()),
                next_tab: AtomicU64::new(1),
            }),
            tab: 0,
        }
    }

    /// Open another tab on the same origin.
    #[must_use]
    pub fn open_tab(&self) -> Self {
        Self {
            origin: Arc::clone(&self.origin),
            tab: self.origin.next_tab.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Write a raw value as a writer outside every tab.
    ///
    /// All tabs observe the change. Quota is not enforced.
    pub fn inject_raw(&self, key: &str, value: Option<&str>) {
        {
            let mut entries = self.origin.lock();
            match value {
                Some(value) => {
                    entries.insert(key.to_owned(), value.to_owned());
                }
                None => {
                    entries.remove(key);
                }
            }
        }
        self.origin.publish(None, key, value.map(str::to_owned));
    }

    /// Remove every entry, as a user wiping site data would.
    ///
    /// All tabs observe one removal per key.
    pub fn clear(&self) {
        let keys: Vec<String> = self.origin.lock().drain().map(|(key, _)| key).collect();
        for key in keys {
            self.origin.publish(None, &key, None);
        }
    }

    /// Bytes currently used by keys and values.
    #[must_use]
    pub fn used_bytes(&self) -> usize {
        usage(&self.origin.lock())
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Origin {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_feeds(&self) -> MutexGuard<'_, HashMap<u64, broadcast::Sender<StorageEvent>>> {
        self.feeds.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver a write to every tab except `source`.
    fn publish(&self, source: Option<u64>, key: &str, new_value: Option<String>) {
        let event = StorageEvent {
            key: key.to_owned(),
            new_value,
        };

        let mut feeds = self.lock_feeds();
        feeds.retain(|_, tx| tx.receiver_count() > 0);
        for (tab, tx) in &*feeds {
            if source != Some(*tab) {
                let _ = tx.send(event.clone());
            }
        }
    }

    fn subscribe(&self, tab: u64) -> broadcast::Receiver<StorageEvent> {
        self.lock_feeds()
            .entry(tab)
            .or_insert_with(|| broadcast::channel(WATCH_CAPACITY).0)
            .subscribe()
    }
}

fn usage(entries: &HashMap<String, String>) -> usize {
    entries.iter().map(|(key, value)| key.len() + value.len()).sum()
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.origin.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        {
            let mut entries = self.origin.lock();

            if let Some(quota) = self.origin.quota {
                let current = entries.get(key).map_or(0, |old| key.len() + old.len());
                let needed = usage(&entries) - current + key.len() + value.len();
                if needed > quota {
                    return Err(StorageError::QuotaExceeded {
                        key: key.to_owned(),
                        needed,
                        quota,
                    });
                }
            }

            entries.insert(key.to_owned(), value.to_owned());
        }

        self.origin
            .publish(Some(self.tab), key, Some(value.to_owned()));
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let removed = self.origin.lock().remove(key).is_some();
        if removed {
            self.origin.publish(Some(self.tab), key, None);
        }
        Ok(())
    }

    fn watch(&self) -> StorageWatch {
        StorageWatch::new(self.origin.subscribe(self.tab))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::storage::WatchError;

    #[test]
    fn test_tabs_share_entries() {
        let tab_a = MemoryStorage::new();
        let tab_b = tab_a.open_tab();

        tab_a.set("k", "v").unwrap();
        assert_eq!(tab_b.get("k").unwrap().as_deref(), Some("v"));

        tab_b.remove("k").unwrap();
        assert_eq!(tab_a.get("k").unwrap(), None);
    }

    #[test]
    fn test_writer_does_not_see_own_events() {
        let tab_a = MemoryStorage::new();
        let tab_b = tab_a.open_tab();
        let mut feed_a = tab_a.watch();
        let mut feed_b = tab_b.watch();

        tab_a.set("k", "v").unwrap();

        assert_eq!(feed_a.try_next().unwrap(), None);
        assert_eq!(
            feed_b.try_next().unwrap(),
            Some(StorageEvent {
                key: "k".to_string(),
                new_value: Some("v".to_string()),
            })
        );
        assert_eq!(feed_b.try_next().unwrap(), None);
    }

    #[test]
    fn test_inject_raw_reaches_every_tab() {
        let tab_a = MemoryStorage::new();
        let tab_b = tab_a.open_tab();
        let mut feed_a = tab_a.watch();
        let mut feed_b = tab_b.watch();

        tab_a.inject_raw("k", Some("{"));

        assert!(feed_a.try_next().unwrap().is_some());
        assert!(feed_b.try_next().unwrap().is_some());
    }

    #[test]
    fn test_remove_missing_key_is_silent() {
        let tab_a = MemoryStorage::new();
        let tab_b = tab_a.open_tab();
        let mut feed_b = tab_b.watch();

        tab_a.remove("nothing").unwrap();
        assert_eq!(feed_b.try_next().unwrap(), None);
    }

    #[test]
    fn test_quota_exceeded_leaves_old_value() {
        let storage = MemoryStorage::with_quota(10);
        storage.set("k", "12345").unwrap();

        let err = storage.set("k", "1234567890").unwrap_err();
        assert!(matches!(err, StorageError::QuotaExceeded { needed: 11, quota: 10, .. }));
        assert_eq!(storage.get("k").unwrap().as_deref(), Some("12345"));
        assert_eq!(storage.used_bytes(), 6);
    }

    #[test]
    fn test_clear_notifies_removals() {
        let tab_a = MemoryStorage::new();
        let tab_b = tab_a.open_tab();
        tab_a.set("a", "1").unwrap();
        tab_a.set("b", "2").unwrap();
        let mut feed_b = tab_b.watch();

        tab_a.clear();

        let mut removed = Vec::new();
        while let Some(event) = feed_b.try_next().unwrap() {
            assert_eq!(event.new_value, None);
            removed.push(event.key);
        }
        removed.sort();
        assert_eq!(removed, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_lagged_feed_reports_missed_events() {
        let tab_a = MemoryStorage::new();
        let tab_b = tab_a.open_tab();
        let mut feed_b = tab_b.watch();

        for i in 0..(WATCH_CAPACITY + 5) {
            tab_a.set("k", &i.to_string()).unwrap();
        }

        assert!(matches!(feed_b.try_next(), Err(WatchError::Lagged(_))));
    }

    #[test]
    fn test_own_writes_never_fill_the_feed() {
        let tab_a = MemoryStorage::new();
        let tab_b = tab_a.open_tab();
        let mut feed_a = tab_a.watch();

        for i in 0..(WATCH_CAPACITY * 2) {
            tab_a.set("k", &i.to_string()).unwrap();
        }
        tab_b.set("k", "theirs").unwrap();

        assert_eq!(
            feed_a.try_next().unwrap(),
            Some(StorageEvent {
                key: "k".to_string(),
                new_value: Some("theirs".to_string()),
            })
        );
        assert_eq!(feed_a.try_next().unwrap(), None);
    }

    #[test]
    fn test_watchers_on_one_tab_each_see_every_event() {
        let tab_a = MemoryStorage::new();
        let tab_b = tab_a.open_tab();
        let mut first = tab_b.watch();
        let mut second = tab_b.watch();

        tab_a.set("k", "v").unwrap();

        assert!(first.try_next().unwrap().is_some());
        assert!(second.try_next().unwrap().is_some());
    }
}
