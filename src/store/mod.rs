//! Durable key-value storage for session snapshots.
//!
//! Four independent keys, each holding one JSON document. A missing key is
//! an empty state, not an error.

pub mod snapshot;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::lock;

pub use snapshot::{MapViewport, PersistedCity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKey {
    /// Resolved entries, in insertion order.
    Cities,
    /// Last computed meeting point.
    Aggregate,
    /// Last map viewport reported by the renderer.
    Viewport,
    /// Forward and reverse lookup caches.
    LookupCache,
}

impl StoreKey {
    pub const ALL: [StoreKey; 4] = [Self::Cities, Self::Aggregate, Self::Viewport, Self::LookupCache];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cities => "cities",
            Self::Aggregate => "aggregate",
            Self::Viewport => "viewport",
            Self::LookupCache => "lookup_cache",
        }
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("storage I/O failed for '{key}': {source}")]
    Io {
        key: StoreKey,
        #[source]
        source: io::Error,
    },
    #[error("could not encode '{key}': {source}")]
    Encode {
        key: StoreKey,
        #[source]
        source: serde_json::Error,
    },
    #[error("could not decode '{key}': {source}")]
    Decode {
        key: StoreKey,
        #[source]
        source: serde_json::Error,
    },
}

/// Storage boundary. The core calls it; it never calls back.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn read(&self, key: StoreKey) -> Result<Option<String>, PersistenceError>;
    async fn write(&self, key: StoreKey, value: String) -> Result<(), PersistenceError>;
}

/// Read and decode one key. `Ok(None)` when the key was never written.
pub async fn read_json<T>(store: &dyn PersistenceGateway, key: StoreKey) -> Result<Option<T>, PersistenceError>
where
    T: DeserializeOwned,
{
    match store.read(key).await? {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| PersistenceError::Decode { key, source }),
        None => Ok(None),
    }
}

pub fn encode<T>(key: StoreKey, value: &T) -> Result<String, PersistenceError>
where
    T: Serialize + ?Sized,
{
    serde_json::to_string(value).map_err(|source| PersistenceError::Encode { key, source })
}

// ─── File store ──────────────────────────────────────────────────

/// Distinguishes temp files of concurrent writes to the same key.
static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// One `<key>.json` file per key under a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, key: StoreKey) -> PathBuf {
        self.dir.join(format!("{}.json", key.as_str()))
    }
}

#[async_trait]
impl PersistenceGateway for FileStore {
    async fn read(&self, key: StoreKey) -> Result<Option<String>, PersistenceError> {
        match tokio::fs::read_to_string(self.path(key)).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(PersistenceError::Io { key, source }),
        }
    }

    async fn write(&self, key: StoreKey, value: String) -> Result<(), PersistenceError> {
        let io_err = |source| PersistenceError::Io { key, source };
        tokio::fs::create_dir_all(&self.dir).await.map_err(io_err)?;

        // Write-then-rename so a crash never leaves half a document behind.
        let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
        let tmp = self.dir.join(format!(".{}.json.{}.tmp", key.as_str(), seq));
        tokio::fs::write(&tmp, value).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, self.path(key)).await.map_err(io_err)
    }
}

// ─── Memory store ────────────────────────────────────────────────

/// Process-local store, for tests and for running without a disk.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<StoreKey, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: StoreKey) -> Option<String> {
        lock(&self.values).get(&key).cloned()
    }
}

#[async_trait]
impl PersistenceGateway for MemoryStore {
    async fn read(&self, key: StoreKey) -> Result<Option<String>, PersistenceError> {
        Ok(self.get(key))
    }

    async fn write(&self, key: StoreKey, value: String) -> Result<(), PersistenceError> {
        lock(&self.values).insert(key, value);
        Ok(())
    }
}
