//! Persistent storage abstraction
//!
//! The resource only needs to load and save one opaque blob under a fixed
//! key. Which engine holds it is up to the host.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid store key '{0}'")]
    InvalidKey(String),

    #[error("Write rejected for key '{key}'")]
    WriteRejected { key: String },
}

impl StoreError {
    /// Returns true if retrying the same operation could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
            ),
            StoreError::WriteRejected { .. } => true,
            StoreError::InvalidKey(_) => false,
        }
    }
}

/// Key/blob store backing the resource
///
/// # Implementations
///
/// - [`MemoryStore`] -- in-process map, for tests and ephemeral hosts
/// - [`FileStore`] -- one file per key in a directory
pub trait PersistentStore {
    /// Load the blob stored under `key`, `None` if there is none
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Replace the blob stored under `key`
    fn save(&mut self, key: &str, data: &[u8]) -> Result<(), StoreError>;
}

impl<S: PersistentStore + ?Sized> PersistentStore for Box<S> {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).load(key)
    }

    fn save(&mut self, key: &str, data: &[u8]) -> Result<(), StoreError> {
        (**self).save(key, data)
    }
}

// ============================================================================
// MemoryStore
// ============================================================================

/// In-memory store
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: HashMap<String, Vec<u8>>,
    reject_writes: bool,
    writes: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with one entry
    pub fn with_entry(key: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        let mut store = Self::new();
        store.entries.insert(key.into(), data.into());
        store
    }

    /// When set, every `save` fails with [`StoreError::WriteRejected`]
    pub fn set_reject_writes(&mut self, reject: bool) {
        self.reject_writes = reject;
    }

    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    /// Number of successful writes
    pub fn write_count(&self) -> usize {
        self.writes
    }
}

impl PersistentStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn save(&mut self, key: &str, data: &[u8]) -> Result<(), StoreError> {
        if self.reject_writes {
            return Err(StoreError::WriteRejected {
                key: key.to_string(),
            });
        }
        self.entries.insert(key.to_string(), data.to_vec());
        self.writes += 1;
        Ok(())
    }
}

// ============================================================================
// FileStore
// ============================================================================

/// Directory-backed store, one `<key>.cbor` file per key
///
/// Writes go to a temporary file in the same directory which is then renamed
/// over the target, so a reader never sees a partially written blob.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Opens (and creates if needed) the store directory
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing `key`
    pub fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let valid = !key.is_empty()
            && key != "."
            && key != ".."
            && !key.contains(['/', '\\'])
            && !key.contains('\0');
        if !valid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{}.cbor", key)))
    }
}

impl PersistentStore for FileStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.path_for(key)?;
        match fs::read(&path) {
            Ok(data) => {
                debug!(path = %path.display(), size = data.len(), "loaded blob");
                Ok(Some(data))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&mut self, key: &str, data: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| StoreError::Io(e.error))?;
        debug!(path = %path.display(), size = data.len(), "saved blob");
        Ok(())
    }
}
