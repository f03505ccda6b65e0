//! JSON persistence over a key-value backend.
//!
//! Values are namespaced with a key prefix and stored as JSON text. Reading
//! never fails: a missing key and an unreadable value both come back as "no
//! value", with [`Persistence::load_checked`] available when the caller needs
//! to tell them apart.

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::storage::{KeyValueStorage, StorageError, StorageEvent, StorageWatch, WatchError};

/// Result of reading one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Loaded<T> {
    /// Nothing is stored under the key.
    Missing,
    /// A well-formed value.
    Present(T),
    /// Something is stored but it cannot be decoded.
    Corrupted { reason: String },
}

impl<T> Loaded<T> {
    /// Decode a raw stored value.
    #[must_use]
    pub fn decode(raw: Option<&str>) -> Self
    where
        T: DeserializeOwned,
    {
        match raw {
            None => Self::Missing,
            Some(raw) => match serde_json::from_str(raw) {
                Ok(value) => Self::Present(value),
                Err(e) => Self::Corrupted {
                    reason: e.to_string(),
                },
            },
        }
    }

    /// The value, if one was decoded.
    #[must_use]
    pub fn present(self) -> Option<T> {
        match self {
            Self::Present(value) => Some(value),
            Self::Missing | Self::Corrupted { .. } => None,
        }
    }
}

/// Adapter translating typed values to and from a [`KeyValueStorage`].
pub struct Persistence<S> {
    storage: S,
    prefix: String,
}

impl<S: KeyValueStorage> Persistence<S> {
    /// Wrap `storage`, prefixing every logical key with `prefix`.
    pub fn new(storage: S, prefix: impl Into<String>) -> Self {
        Self {
            storage,
            prefix: prefix.into(),
        }
    }

    /// The underlying backend.
    #[must_use]
    pub const fn storage(&self) -> &S {
        &self.storage
    }

    /// Full storage key for a logical key.
    #[must_use]
    pub fn storage_key(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }

    /// Read and decode `key`, returning `None` if it is missing or cannot be
    /// decoded.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.load_checked(key).present()
    }

    /// Read and decode `key`, distinguishing missing from corrupted values.
    ///
    /// A backend read failure is reported as corruption.
    pub fn load_checked<T: DeserializeOwned>(&self, key: &str) -> Loaded<T> {
        let full_key = self.storage_key(key);
        let loaded = match self.storage.get(&full_key) {
            Ok(raw) => Loaded::decode(raw.as_deref()),
            Err(e) => Loaded::Corrupted {
                reason: e.to_string(),
            },
        };

        if let Loaded::Corrupted { reason } = &loaded {
            warn!(key = %full_key, %reason, "discarding unreadable stored value");
        }
        loaded
    }

    /// Encode and write `value` under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be encoded or the backend rejects
    /// the write. Nothing is written in that case.
    pub fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let full_key = self.storage_key(key);
        let raw = serde_json::to_string(value)?;
        self.storage.set(&full_key, &raw)?;
        debug!(key = %full_key, bytes = raw.len(), "saved");
        Ok(())
    }

    /// Delete `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    pub fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.storage.remove(&self.storage_key(key))
    }

    /// Feed of writes to `key` made outside this handle.
    #[must_use]
    pub fn on_external_change(&self, key: &str) -> ExternalChanges {
        ExternalChanges {
            key: self.storage_key(key),
            watch: self.storage.watch(),
        }
    }
}

/// Writes to one key made by other tabs or processes.
pub struct ExternalChanges {
    key: String,
    watch: StorageWatch,
}

impl ExternalChanges {
    /// The full storage key being watched.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Take the next pending change to the watched key without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Lagged`] if changes were dropped.
    pub fn try_next(&mut self) -> Result<Option<StorageEvent>, WatchError> {
        while let Some(event) = self.watch.try_next()? {
            if event.key == self.key {
                return Ok(Some(event));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    #[test]
    fn test_round_trip() {
        let persistence = Persistence::new(MemoryStorage::new(), "tangogi-");
        let wishlist = vec!["prod-001".to_string(), "prod-003".to_string()];

        persistence.save("wishlist", &wishlist).unwrap();
        let loaded: Vec<String> = persistence.load("wishlist").unwrap();
        assert_eq!(loaded, wishlist);

        assert_eq!(
            persistence.storage().get("tangogi-wishlist").unwrap().as_deref(),
            Some(r#"["prod-001","prod-003"]"#)
        );
    }

    #[test]
    fn test_missing_and_corrupted_load_as_none() {
        let storage = MemoryStorage::new();
        storage.set("tangogi-cart", "{not json").unwrap();
        let persistence = Persistence::new(storage, "tangogi-");

        assert_eq!(persistence.load::<Vec<String>>("wishlist"), None);
        assert_eq!(persistence.load::<Vec<String>>("cart"), None);

        assert_eq!(
            persistence.load_checked::<Vec<String>>("wishlist"),
            Loaded::Missing
        );
        assert!(matches!(
            persistence.load_checked::<Vec<String>>("cart"),
            Loaded::Corrupted { .. }
        ));
    }

    #[test]
    fn test_wrong_shape_is_corrupted() {
        let loaded: Loaded<Vec<String>> = Loaded::decode(Some(r#"{"a":1}"#));
        assert!(matches!(loaded, Loaded::Corrupted { .. }));
    }

    #[test]
    fn test_save_failure_keeps_previous_value() {
        let persistence = Persistence::new(MemoryStorage::with_quota(32), "tangogi-");
        persistence.save("wishlist", &["a"]).unwrap();

        let big = vec!["x".repeat(64)];
        assert!(matches!(
            persistence.save("wishlist", &big),
            Err(StorageError::QuotaExceeded { .. })
        ));
        assert_eq!(
            persistence.load::<Vec<String>>("wishlist").unwrap(),
            vec!["a".to_string()]
        );
    }

    #[test]
    fn test_external_changes_filter_by_key() {
        let tab_a = MemoryStorage::new();
        let tab_b = tab_a.open_tab();
        let ours = Persistence::new(tab_a, "tangogi-");
        let theirs = Persistence::new(tab_b, "tangogi-");
        let mut cart_changes = ours.on_external_change("cart");

        theirs.save("wishlist", &["prod-001"]).unwrap();
        theirs.save("cart", &Vec::<String>::new()).unwrap();

        let event = cart_changes.try_next().unwrap().unwrap();
        assert_eq!(event.key, "tangogi-cart");
        assert_eq!(event.new_value.as_deref(), Some("[]"));
        assert_eq!(cart_changes.try_next().unwrap(), None);
    }
}
