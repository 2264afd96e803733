//! On-disk layout of a dataset store
//!
//! ```text
//! <dbpath>/db/store.json   snapshot, replaced atomically
//! <dbpath>/db/lock         present while a worker has the store open
//! ```

use crate::error::GraphError;
use crate::store::RecordStore;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const DB_DIR: &str = "db";
const STORE_FILE: &str = "store.json";
const LOCK_FILE: &str = "lock";

/// Paths of one dataset store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreFiles {
    root: PathBuf,
}

impl StoreFiles {
    /// Store rooted at a dataset directory
    #[must_use]
    pub fn new(dbpath: impl Into<PathBuf>) -> Self {
        Self {
            root: dbpath.into(),
        }
    }

    /// Dataset directory
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the snapshot and lock
    #[must_use]
    pub fn db_dir(&self) -> PathBuf {
        self.root.join(DB_DIR)
    }

    /// Snapshot path
    #[must_use]
    pub fn store_path(&self) -> PathBuf {
        self.db_dir().join(STORE_FILE)
    }

    /// Lock file path
    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        self.db_dir().join(LOCK_FILE)
    }

    /// Whether a snapshot exists
    #[must_use]
    pub fn exists(&self) -> bool {
        self.store_path().is_file()
    }

    /// Create the store directory, replacing any previous store
    ///
    /// # Errors
    /// - `GraphError::Io` if the directory cannot be prepared
    pub fn create_clean(&self) -> Result<(), GraphError> {
        let db_dir = self.db_dir();
        if db_dir.exists() {
            fs::remove_dir_all(&db_dir)?;
        }
        fs::create_dir_all(&db_dir)?;
        Ok(())
    }

    /// Remove a lock left behind by a crashed worker
    ///
    /// # Errors
    /// - `GraphError::Io` if the lock exists but cannot be removed
    pub fn clear_stale_lock(&self) -> Result<bool, GraphError> {
        let lock = self.lock_path();
        if lock.exists() {
            warn!(path = %lock.display(), "removing stale store lock");
            fs::remove_file(&lock)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Mark the store as open by this process
    ///
    /// # Errors
    /// - `GraphError::Io` if the lock cannot be written
    pub fn acquire_lock(&self) -> Result<(), GraphError> {
        fs::create_dir_all(self.db_dir())?;
        fs::write(self.lock_path(), std::process::id().to_string())?;
        Ok(())
    }

    /// Release the open marker
    ///
    /// # Errors
    /// - `GraphError::Io` if the lock exists but cannot be removed
    pub fn release_lock(&self) -> Result<(), GraphError> {
        let lock = self.lock_path();
        if lock.exists() {
            fs::remove_file(lock)?;
        }
        Ok(())
    }

    /// Load the snapshot
    ///
    /// # Errors
    /// - `GraphError::Io` if the file cannot be read
    /// - `GraphError::Serde` if the snapshot is corrupt
    pub fn load(&self) -> Result<RecordStore, GraphError> {
        let bytes = fs::read(self.store_path())?;
        let store: RecordStore = serde_json::from_slice(&bytes)?;
        debug!(
            path = %self.store_path().display(),
            documents = store.document_count(),
            "store loaded"
        );
        Ok(store)
    }

    /// Write the snapshot atomically
    ///
    /// # Errors
    /// - `GraphError::Io` if the temp file cannot be written or renamed
    /// - `GraphError::Serde` if serialization fails
    pub fn save(&self, store: &RecordStore) -> Result<(), GraphError> {
        let db_dir = self.db_dir();
        fs::create_dir_all(&db_dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&db_dir)?;
        serde_json::to_writer(&mut tmp, store)?;
        tmp.flush()?;
        tmp.persist(self.store_path()).map_err(|e| e.error)?;
        Ok(())
    }
}
