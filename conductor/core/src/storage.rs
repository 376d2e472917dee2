//! Key-Value Storage
//!
//! The conductor persists three kinds of state: the transcript and the
//! session id (tab-scoped) and the client id (durable). Both lifetimes are
//! modelled by the same [`KeyValueStore`] trait; the caller decides the
//! lifetime by choosing which store instance it hands to each component.
//!
//! Two implementations are provided:
//! - [`MemoryStore`]: process-local map, lost when the process exits
//! - [`FileStore`]: a JSON object on disk, rewritten on every change
//!
//! Store operations are synchronous map updates. [`FileStore`] hands the
//! file rewrite to a writer task on the tokio runtime, so callers on the
//! async path never wait on disk; [`FileStore::sync`] waits for pending
//! rewrites to land.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Errors raised by a storage backend
#[derive(Debug, Error)]
pub enum StorageError {
    /// Reading or writing the backing file failed
    #[error("Storage I/O failed at {path}: {source}")]
    Io {
        /// File that was being accessed
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// The backing file is not a JSON object of strings
    #[error("Storage file {path} is corrupt: {source}")]
    Corrupt {
        /// File that failed to parse
        path: PathBuf,
        /// Underlying JSON error
        source: serde_json::Error,
    },

    /// Serializing the store contents failed
    #[error("Failed to serialize storage contents: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// String key-value storage with a caller-defined lifetime
pub trait KeyValueStore: Send + Sync {
    /// Read a value, `None` if the key was never set or was removed
    fn get(&self, key: &str) -> Option<String>;

    /// Store a value, replacing any previous one
    ///
    /// # Errors
    ///
    /// Returns an error if the backend could not persist the value.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove a value; removing a missing key is not an error
    ///
    /// # Errors
    ///
    /// Returns an error if the backend could not persist the removal.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently held
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the store holds no keys
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries
            .write()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.write().remove(key);
        Ok(())
    }
}

/// Work queued for the file writer
#[derive(Debug)]
enum FlushOp {
    /// Rewrite the file with this snapshot
    Write(String),
    /// Signal once every earlier write has landed
    Sync(oneshot::Sender<()>),
}

/// JSON-file backed store
///
/// The whole file is loaded on [`FileStore::open`]. Each mutation updates
/// the in-memory map and queues a snapshot for the writer task, which
/// rewrites the file via a temporary file and rename so a crash mid-write
/// leaves the previous contents intact. Snapshots are queued under the
/// map lock, so the file never goes backwards.
///
/// Opened outside a tokio runtime there is no writer task and the file is
/// rewritten inline.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
    writer: Option<mpsc::UnboundedSender<FlushOp>>,
}

impl FileStore {
    /// Open a store at `path`, starting empty if the file does not exist
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let entries = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(|source| StorageError::Io {
                path: path.clone(),
                source,
            })?;
            if raw.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&raw).map_err(|source| StorageError::Corrupt {
                    path: path.clone(),
                    source,
                })?
            }
        } else {
            BTreeMap::new()
        };

        let writer = tokio::runtime::Handle::try_current().ok().map(|handle| {
            let (tx, rx) = mpsc::unbounded_channel();
            handle.spawn(run_writer(path.clone(), rx));
            tx
        });

        tracing::debug!(
            path = %path.display(),
            keys = entries.len(),
            background = writer.is_some(),
            "Opened file store"
        );

        Ok(Self {
            path,
            entries: RwLock::new(entries),
            writer,
        })
    }

    /// Location of the backing file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait until every mutation made so far is on disk
    ///
    /// Returns immediately when the store writes inline. Write failures are
    /// logged by the writer and do not surface here.
    pub async fn sync(&self) {
        let Some(writer) = &self.writer else {
            return;
        };
        let (tx, rx) = oneshot::channel();
        if writer.send(FlushOp::Sync(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let json = serde_json::to_string_pretty(entries)?;
        let json = match &self.writer {
            Some(writer) => match writer.send(FlushOp::Write(json)) {
                Ok(()) => return Ok(()),
                // Writer is gone (runtime shut down), fall back to writing here
                Err(mpsc::error::SendError(FlushOp::Write(json))) => json,
                Err(_) => return Ok(()),
            },
            None => json,
        };
        write_file(&self.path, &json).map_err(|source| StorageError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

fn write_file(path: &Path, json: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)
}

async fn write_file_async(path: &Path, json: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, json).await?;
    tokio::fs::rename(&tmp, path).await
}

/// Drain queued snapshots, writing only the newest of each batch
async fn run_writer(path: PathBuf, mut ops: mpsc::UnboundedReceiver<FlushOp>) {
    while let Some(op) = ops.recv().await {
        let mut latest = None;
        let mut waiters = Vec::new();
        let mut take = |op: FlushOp| match op {
            FlushOp::Write(json) => latest = Some(json),
            FlushOp::Sync(done) => waiters.push(done),
        };
        take(op);
        while let Ok(op) = ops.try_recv() {
            take(op);
        }

        if let Some(json) = latest {
            if let Err(e) = write_file_async(&path, &json).await {
                tracing::warn!(path = %path.display(), error = %e, "Failed to write file store");
            }
        }
        for done in waiters {
            let _ = done.send(());
        }
    }
    tracing::trace!(path = %path.display(), "File store writer stopped");
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.write();
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.write();
        if entries.remove(key).is_none() {
            return Ok(());
        }
        self.flush(&entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_set_get_remove() {
        let store = MemoryStore::new();
        assert!(store.is_empty());
        assert_eq!(store.get("k"), None);

        store.set("k", "v1").unwrap();
        store.set("k", "v2").unwrap();
        assert_eq!(store.get("k").as_deref(), Some("v2"));
        assert_eq!(store.len(), 1);

        store.remove("k").unwrap();
        store.remove("k").unwrap();
        assert_eq!(store.get("k"), None);
    }

    #[test]
    fn test_file_store_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("durable.json");

        let store = FileStore::open(&path).unwrap();
        store.set("client", "abc").unwrap();
        store.set("other", "xyz").unwrap();
        store.remove("other").unwrap();
        drop(store);

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get("client").as_deref(), Some("abc"));
        assert_eq!(reopened.get("other"), None);
        assert_eq!(reopened.path(), path.as_path());
    }

    #[test]
    fn test_file_store_empty_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "").unwrap();

        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.get("anything"), None);
    }

    #[test]
    fn test_file_store_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "[1, 2, 3]").unwrap();

        let err = FileStore::open(&path).unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn test_file_store_writes_in_background() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("tab.json");

        let store = FileStore::open(&path).unwrap();
        store.set("session", "s-1").unwrap();
        store.set("session", "s-2").unwrap();
        store.set("transcript", "[]").unwrap();
        store.remove("transcript").unwrap();

        // Reads see the mutation before it reaches disk
        assert_eq!(store.get("session").as_deref(), Some("s-2"));

        store.sync().await;
        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get("session").as_deref(), Some("s-2"));
        assert_eq!(reopened.get("transcript"), None);
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_file_store_sync_without_runtime_returns() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("store.json")).unwrap();
        store.set("k", "v").unwrap();
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(store.sync());
        assert!(dir.path().join("store.json").exists());
    }
}
