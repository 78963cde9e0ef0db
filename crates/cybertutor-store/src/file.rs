//! JSON-file document store.
//!
//! The whole database is one JSON snapshot that any number of processes may
//! open. Every operation holds an advisory lock on `<path>.lock` (shared for
//! reads, exclusive for writes) and reloads the snapshot under it. A write
//! applies its edit to the fresh copy, writes `<path>.tmp`, and renames it
//! over `<path>` before the lock is released. A failed write leaves the file
//! untouched.
//!
//! Locking blocks the calling thread; operations are short and local.

use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fs2::FileExt;
use tracing::{debug, instrument, trace};

use cybertutor_core::error::StoreError;
use cybertutor_core::traits::{Document, DocumentStore, Query, TransactionPlan, WriteOp};

use crate::snapshot::Snapshot;

/// A [`DocumentStore`] persisted to a single JSON file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock_path: PathBuf,
}

/// Holds the advisory lock until dropped.
struct LockGuard(File);

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.0) {
            debug!("failed to release store lock: {e}");
        }
    }
}

impl FileStore {
    /// Open the store at `path`, starting empty when the file does not exist.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let mut lock_path = path.clone().into_os_string();
        lock_path.push(".lock");
        let store = Self {
            path,
            lock_path: PathBuf::from(lock_path),
        };
        store.read(|_| ())?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self, exclusive: bool) -> Result<LockGuard, StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_path)?;
        if exclusive {
            FileExt::lock_exclusive(&file)?;
        } else {
            FileExt::lock_shared(&file)?;
        }
        Ok(LockGuard(file))
    }

    fn load(&self) -> Result<Snapshot, StoreError> {
        match std::fs::read(&self.path) {
            Ok(bytes) if bytes.is_empty() => Ok(Snapshot::default()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                trace!("no data file yet, reading as empty");
                Ok(Snapshot::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn persist(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let bytes = serde_json::to_vec_pretty(snapshot)?;
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn read<T>(&self, view: impl FnOnce(&Snapshot) -> T) -> Result<T, StoreError> {
        let _lock = self.lock(false)?;
        let snapshot = self.load()?;
        Ok(view(&snapshot))
    }

    /// Reload under the exclusive lock, run `edit`, and persist the result.
    fn write_with<T>(
        &self,
        edit: impl FnOnce(&mut Snapshot) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let _lock = self.lock(true)?;
        let mut snapshot = self.load()?;
        let out = edit(&mut snapshot)?;
        self.persist(&snapshot)?;
        Ok(out)
    }
}

#[async_trait]
impl DocumentStore for FileStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        self.read(|s| s.get(collection, id))
    }

    async fn query(
        &self,
        collection: &str,
        query: &Query,
    ) -> Result<Vec<(String, Document)>, StoreError> {
        self.read(|s| s.query(collection, query))
    }

    async fn set(&self, collection: &str, id: &str, doc: Document) -> Result<(), StoreError> {
        self.write_with(|s| {
            s.set(collection, id, doc);
            Ok(())
        })
    }

    async fn set_merge(
        &self,
        collection: &str,
        id: &str,
        doc: Document,
    ) -> Result<(), StoreError> {
        self.write_with(|s| {
            s.merge(collection, id, doc);
            Ok(())
        })
    }

    async fn increment(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        delta: i64,
    ) -> Result<i64, StoreError> {
        self.write_with(|s| s.increment(collection, id, field, delta))
    }

    async fn test_and_set(
        &self,
        collection: &str,
        id: &str,
        field: &str,
    ) -> Result<bool, StoreError> {
        self.write_with(|s| s.test_and_set(collection, id, field))
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        self.write_with(|s| {
            s.delete(collection, id);
            Ok(())
        })
    }

    async fn batch_write(&self, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        debug!(ops = ops.len(), "batch write");
        self.write_with(|s| s.apply_all(ops))
    }

    async fn transact<'a>(&self, plan: TransactionPlan<'a>) -> Result<(), StoreError> {
        self.write_with(|s| s.transact(plan))
    }
}
