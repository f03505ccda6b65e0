//! Key-value storage backends.
//!
//! A backend models one per-origin storage namespace as seen from a single
//! tab: string keys, string values, per-key atomic writes, and a feed of
//! writes made by *other* handles to the same namespace.
//!
//! - [`MemoryStorage`] - in-process origin shared by any number of tabs
//! - [`FileStorage`] - one JSON file per key in a directory

use std::path::PathBuf;

use tokio::sync::broadcast;

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

/// Capacity of each backend's change feed.
pub(crate) const WATCH_CAPACITY: usize = 256;

/// Errors raised by storage backends.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Writing the value would exceed the namespace quota.
    #[error("storage quota exceeded writing {key}: {needed} bytes needed, {quota} allowed")]
    QuotaExceeded {
        key: String,
        needed: usize,
        quota: usize,
    },

    /// The key cannot be represented by this backend.
    #[error("invalid storage key: {0:?}")]
    InvalidKey(String),

    /// Filesystem operation failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The value could not be serialized.
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A write observed in the shared namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    /// Full storage key that changed.
    pub key: String,
    /// The new raw value, or `None` when the key was removed.
    pub new_value: Option<String>,
}

/// Errors raised while reading a change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WatchError {
    /// The feed overflowed and events were dropped.
    #[error("missed {0} storage events")]
    Lagged(u64),
}

/// Feed of writes made through handles other than the one that opened it.
///
/// Backends only deliver foreign writes to a feed, so a handle's own
/// traffic never counts against the feed's capacity.
pub struct StorageWatch {
    rx: broadcast::Receiver<StorageEvent>,
}

impl StorageWatch {
    pub(crate) const fn new(rx: broadcast::Receiver<StorageEvent>) -> Self {
        Self { rx }
    }

    /// Take the next pending external event without blocking.
    ///
    /// Returns `Ok(None)` when nothing is pending.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Lagged`] if events were dropped because the
    /// feed was not drained in time.
    pub fn try_next(&mut self) -> Result<Option<StorageEvent>, WatchError> {
        match self.rx.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(broadcast::error::TryRecvError::Empty | broadcast::error::TryRecvError::Closed) => {
                Ok(None)
            }
            Err(broadcast::error::TryRecvError::Lagged(missed)) => Err(WatchError::Lagged(missed)),
        }
    }
}

/// A per-origin key-value namespace as seen from one tab.
pub trait KeyValueStorage {
    /// Read the raw value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Atomically replace the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the write is rejected (quota, I/O, invalid key).
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete `key`. Deleting a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Subscribe to writes made by other handles.
    fn watch(&self) -> StorageWatch;
}
