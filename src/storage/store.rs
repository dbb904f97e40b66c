//! Transactional store over a tree of buckets.
//!
//! The committed state is a single root [`Bucket`] behind an `Arc`. A read
//! transaction clones that `Arc` and so keeps a stable snapshot for as long
//! as it lives. A write transaction holds the writer lock, mutates its own
//! copy-on-write root and publishes it on [`WriteTxn::commit`]. Dropping a
//! write transaction without committing discards every change.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info, trace};
use parking_lot::{Mutex, MutexGuard, RwLock};
use tempfile::NamedTempFile;

use super::bucket::Bucket;
use super::errors::{StorageError, StorageResult};

/// A single-writer, multi-reader bucket store, optionally backed by a file.
#[derive(Debug)]
pub struct Store {
    root: RwLock<Arc<Bucket>>,
    writer: Mutex<()>,
    path: Option<PathBuf>,
}

impl Store {
    /// An empty store that lives only in memory.
    pub fn in_memory() -> Self {
        Self {
            root: RwLock::new(Arc::new(Bucket::new())),
            writer: Mutex::new(()),
            path: None,
        }
    }

    /// Open a store. With a path, the last committed snapshot is loaded from
    /// the file if it exists and every commit is written back to it.
    pub fn open(path: Option<&Path>) -> StorageResult<Self> {
        let Some(path) = path else {
            return Ok(Self::in_memory());
        };

        let root = if path.exists() {
            let data = fs::read(path)?;
            let root: Bucket = bincode::deserialize(&data)?;
            info!("Loaded store from {}", path.display());
            root
        } else {
            if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
                fs::create_dir_all(dir)?;
            }
            debug!("Creating new store at {}", path.display());
            Bucket::new()
        };

        Ok(Self {
            root: RwLock::new(Arc::new(root)),
            writer: Mutex::new(()),
            path: Some(path.to_path_buf()),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Begin a read transaction over the last committed snapshot.
    pub fn read(&self) -> ReadTxn {
        ReadTxn {
            root: Arc::clone(&self.root.read()),
        }
    }

    /// Begin a write transaction, blocking until no other writer is active.
    pub fn write(&self) -> WriteTxn<'_> {
        let guard = self.writer.lock();
        let root = Arc::clone(&self.root.read());
        WriteTxn {
            store: self,
            _guard: guard,
            root,
            committed: false,
        }
    }

    fn persist(&self, root: &Bucket) -> StorageResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let data = bincode::serialize(root)?;

        // the snapshot is durable before it replaces the previous one
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&data)?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| StorageError::Io(e.error))?;
        fsync_dir(dir)?;
        trace!("Persisted store to {}", path.display());
        Ok(())
    }
}

#[cfg(unix)]
fn fsync_dir(dir: &Path) -> StorageResult<()> {
    fs::File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn fsync_dir(_dir: &Path) -> StorageResult<()> {
    Ok(())
}

/// A consistent snapshot of the store.
#[derive(Debug, Clone)]
pub struct ReadTxn {
    root: Arc<Bucket>,
}

impl ReadTxn {
    pub fn bucket(&self, name: &[u8]) -> Option<&Bucket> {
        self.root.bucket(name)
    }

    pub fn bucket_names(&self) -> Vec<Vec<u8>> {
        self.root.bucket_names()
    }

    pub fn root(&self) -> &Bucket {
        &self.root
    }
}

/// An exclusive transaction that commits atomically or not at all.
#[derive(Debug)]
pub struct WriteTxn<'a> {
    store: &'a Store,
    _guard: MutexGuard<'a, ()>,
    root: Arc<Bucket>,
    committed: bool,
}

impl WriteTxn<'_> {
    pub fn bucket(&self, name: &[u8]) -> Option<&Bucket> {
        self.root.bucket(name)
    }

    pub fn bucket_mut(&mut self, name: &[u8]) -> Option<&mut Bucket> {
        self.root_mut().bucket_mut(name)
    }

    /// Like [`WriteTxn::bucket_mut`], but a missing bucket is an error.
    pub fn existing_bucket_mut(&mut self, name: &[u8]) -> StorageResult<&mut Bucket> {
        self.root_mut()
            .bucket_mut(name)
            .ok_or_else(|| StorageError::bucket_not_found(name))
    }

    pub fn create_bucket(&mut self, name: &[u8]) -> StorageResult<&mut Bucket> {
        self.root_mut().create_bucket(name)
    }

    pub fn create_bucket_if_not_exists(&mut self, name: &[u8]) -> StorageResult<&mut Bucket> {
        self.root_mut().create_bucket_if_not_exists(name)
    }

    pub fn delete_bucket(&mut self, name: &[u8]) -> StorageResult<()> {
        self.root_mut().delete_bucket(name)
    }

    pub fn bucket_names(&self) -> Vec<Vec<u8>> {
        self.root.bucket_names()
    }

    pub fn root(&self) -> &Bucket {
        &self.root
    }

    fn root_mut(&mut self) -> &mut Bucket {
        Arc::make_mut(&mut self.root)
    }

    /// Persist and publish the changes. On error nothing is published.
    pub fn commit(mut self) -> StorageResult<()> {
        self.store.persist(&self.root)?;
        *self.store.root.write() = Arc::clone(&self.root);
        self.committed = true;
        trace!("Committed write transaction");
        Ok(())
    }

    /// Discard the changes.
    pub fn rollback(self) {}
}

impl Drop for WriteTxn<'_> {
    fn drop(&mut self) {
        if !self.committed {
            trace!("Rolled back write transaction");
        }
    }
}
