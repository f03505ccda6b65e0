//! Directory-backed storage: one `<key>.json` file per key.
//!
//! Writes go to a temporary file in the same directory and are renamed into
//! place, so readers in other processes never observe a half-written value.
//! Other processes' writes are discovered by [`FileStorage::poll_changes`].

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use super::{KeyValueStorage, StorageError, StorageEvent, StorageWatch, WATCH_CAPACITY};

const EXTENSION: &str = "json";

/// Key-value storage persisted as files in a directory.
pub struct FileStorage {
    dir: PathBuf,
    /// Last value this handle read or wrote per key.
    seen: Mutex<HashMap<String, Option<String>>>,
    events: broadcast::Sender<StorageEvent>,
}

impl FileStorage {
    /// Open (and create if needed) a storage directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StorageError::Io {
            path: dir.clone(),
            source,
        })?;

        let (events, _) = broadcast::channel(WATCH_CAPACITY);
        Ok(Self {
            dir,
            seen: Mutex::new(HashMap::new()),
            events,
        })
    }

    /// The storage directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Compare every key on disk with what this handle last saw and publish
    /// an external change event for each difference.
    ///
    /// Returns the number of changes published.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or one of its files cannot be read.
    pub fn poll_changes(&self) -> Result<usize, StorageError> {
        let mut keys: Vec<String> = self.lock_seen().keys().cloned().collect();
        for key in self.keys_on_disk()? {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }

        let mut changed = 0;
        for key in keys {
            let current = self.read(&key)?;
            let previous = self.lock_seen().insert(key.clone(), current.clone());
            if previous.flatten() != current {
                debug!(key = %key, removed = current.is_none(), "external storage change");
                let _ = self.events.send(StorageEvent {
                    key,
                    new_value: current,
                });
                changed += 1;
            }
        }

        Ok(changed)
    }

    fn lock_seen(&self) -> MutexGuard<'_, HashMap<String, Option<String>>> {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        if !is_valid_key(key) {
            return Err(StorageError::InvalidKey(key.to_owned()));
        }
        Ok(self.dir.join(format!("{key}.{EXTENSION}")))
    }

    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io { path, source }),
        }
    }

    fn keys_on_disk(&self) -> Result<Vec<String>, StorageError> {
        let io_err = |source| StorageError::Io {
            path: self.dir.clone(),
            source,
        };

        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            if stem.starts_with('.') {
                continue;
            }
            if is_valid_key(stem) {
                keys.push(stem.to_owned());
            } else {
                debug!(path = %path.display(), "ignoring file that is not a storage key");
            }
        }
        Ok(keys)
    }
}

/// Keys map straight to file names, so only a conservative set is allowed.
fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let value = self.read(key)?;
        self.lock_seen().insert(key.to_owned(), value.clone());
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let dest = self.path_for(key)?;
        let tmp = self.dir.join(format!(".{key}.{}.tmp", Uuid::new_v4()));

        let write = || -> io::Result<()> {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(value.as_bytes())?;
            file.sync_all()?;
            fs::rename(&tmp, &dest)
        };

        if let Err(source) = write() {
            let _ = fs::remove_file(&tmp);
            return Err(StorageError::Io { path: dest, source });
        }

        self.lock_seen()
            .insert(key.to_owned(), Some(value.to_owned()));
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => return Err(StorageError::Io { path, source }),
        }
        self.lock_seen().insert(key.to_owned(), None);
        Ok(())
    }

    fn watch(&self) -> StorageWatch {
        // Every event on this channel comes from another process.
        StorageWatch::new(self.events.subscribe())
    }
}
