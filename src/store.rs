// Key-value blob storage backing the delay history.
//
// The file store keeps one JSON document per key under the user cache
// directory (e.g. ~/.cache/transit_delay_watch/transport-delay-history.json).

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize history: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// String-keyed blob storage with whole-value reads and writes.
pub trait BlobStore: Send {
    /// Returns `Ok(None)` when nothing has been stored under `key`.
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;
}

impl<T: BlobStore + Sync + ?Sized> BlobStore for std::sync::Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }
}

// ============================================================================
// File Store
// ============================================================================

#[derive(Debug, Clone)]
pub struct FileBlobStore {
    dir: PathBuf,
}

impl FileBlobStore {
    const APP_DIR: &'static str = "transit_delay_watch";

    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Store rooted in the platform cache directory, falling back to the
    /// working directory when the platform has none.
    pub fn in_cache_dir() -> Self {
        let mut dir = dirs::cache_dir().unwrap_or_else(|| PathBuf::from("."));
        dir.push(Self::APP_DIR);
        Self::new(dir)
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl BlobStore for FileBlobStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "no stored blob");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)?;

        // Write next to the target and rename so a crash never leaves a
        // half-written document behind.
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;

        debug!(path = %path.display(), bytes = value.len(), "blob written");
        Ok(())
    }
}

// ============================================================================
// Memory Store
// ============================================================================

#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(key: &str, value: &str) -> Self {
        let store = Self::new();
        store.lock().insert(key.to_string(), value.to_string());
        store
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl BlobStore for MemoryBlobStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}
