//! Shared, serialized access to container files.
//!
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use parking_lot::Mutex;

use crate::{
    engine::{Engine, Mode},
    errors::Result,
    file::File,
    helpers::normalize_path,
    lock::{CombinedLock, Lock, SerialLock},
};

/// Hands out reference counted, cached `File`s and serializes access to the engine.
///
/// The container engine isn't thread safe. Every engine call made by this crate happens with the
/// coordinator's engine lock held, including opening and closing files, so one coordinator should
/// be shared by everything that uses a given engine. Cloning a `Coordinator` is cheap and yields
/// a handle to the same coordinator.
///
/// Each path is opened at most once, no matter how many callers acquire it. The file is closed
/// when the last `FileRef` for it is released.
///
/// Lock order is engine lock, then the coordinator's file table, then any individual file's
/// state. Nothing here acquires the engine lock while holding either of the others.
///
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

struct Inner {
    engine: Arc<dyn Engine>,

    /// Serializes all engine calls
    lock: Arc<SerialLock>,

    /// Open files, by normalized path and mode
    files: Mutex<HashMap<(PathBuf, Mode), Entry>>,

    /// Per-path locks for writers, by normalized path
    write_locks: Mutex<HashMap<PathBuf, Arc<SerialLock>>>,
}

struct Entry {
    file: Arc<File>,
    refs: usize,
}

impl Coordinator {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self {
            inner: Arc::new(Inner {
                engine,
                lock: Arc::new(SerialLock::new()),
                files: Mutex::new(HashMap::new()),
                write_locks: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// The engine lock
    pub fn lock(&self) -> Arc<SerialLock> {
        Arc::clone(&self.inner.lock)
    }

    /// The write lock for a path. The same lock is returned every time for the same file.
    ///
    pub fn write_lock(&self, path: &Path) -> Result<Arc<SerialLock>> {
        let path = normalize_path(path)?;
        let mut write_locks = self.inner.write_locks.lock();
        let lock = write_locks.entry(path).or_default();

        Ok(Arc::clone(lock))
    }

    /// The lock that should guard access to a file opened in the given mode.
    ///
    /// Readers only need the engine lock. Writers also need exclusive access to the file, so get
    /// the engine lock combined with the file's write lock.
    ///
    pub fn lock_for(&self, path: &Path, mode: Mode) -> Result<Arc<dyn Lock>> {
        let lock: Arc<dyn Lock> = match mode {
            Mode::Read => self.lock(),
            Mode::Write => {
                let engine_lock: Arc<dyn Lock> = self.lock();
                let write_lock: Arc<dyn Lock> = self.write_lock(path)?;
                Arc::new(CombinedLock::new(vec![engine_lock, write_lock]))
            }
        };

        Ok(lock)
    }

    /// Acquire a reference to a file, opening it if it isn't already open.
    ///
    /// Takes the engine lock, so must not be called with it held.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the file. Relative paths are resolved against the current directory, so
    ///   different spellings of the same relative path share one open file.
    /// * `mode` - The mode to open the file in, if it needs to be opened.
    ///
    pub fn acquire(&self, path: &Path, mode: Mode) -> Result<FileRef> {
        let path = normalize_path(path)?;
        let key = (path, mode);

        let _guard = self.inner.lock.acquire();
        let mut files = self.inner.files.lock();
        match files.get_mut(&key) {
            Some(entry) => {
                entry.refs += 1;
                log::debug!("coordinator hit {:?}, refs {}", key.0, entry.refs);
            }
            None => {
                log::debug!("coordinator miss {:?}", key.0);
                let file = File::open(Arc::clone(&self.inner.engine), &key.0, mode)?;
                let entry = Entry {
                    file: Arc::new(file),
                    refs: 1,
                };
                files.insert(key.clone(), entry);
            }
        }

        let (path, mode) = key;
        Ok(FileRef {
            coordinator: self.clone(),
            path,
            mode,
            released: false,
        })
    }

    /// Number of outstanding references to a file, zero if it isn't open
    pub fn refs(&self, path: &Path, mode: Mode) -> usize {
        let key = match normalize_path(path) {
            Ok(path) => (path, mode),
            Err(_) => return 0,
        };

        self.inner
            .files
            .lock()
            .get(&key)
            .map(|entry| entry.refs)
            .unwrap_or(0)
    }

    /// Get the open file for a reference, reopening it if it has been closed.
    ///
    /// Caller must hold the engine lock.
    ///
    fn file(&self, path: &Path, mode: Mode) -> Result<Arc<File>> {
        let mut files = self.inner.files.lock();
        let key = (path.to_path_buf(), mode);
        let entry = files.get_mut(&key);
        match entry {
            Some(entry) if !entry.file.is_closed() => Ok(Arc::clone(&entry.file)),
            Some(entry) => {
                log::debug!("coordinator reopen {path:?}");
                let file = Arc::new(File::open(Arc::clone(&self.inner.engine), path, mode)?);
                entry.file = Arc::clone(&file);

                Ok(file)
            }
            None => {
                // Only reachable if the table was somehow cleared under a live reference
                log::debug!("coordinator reopen {path:?}, no entry");
                let file = Arc::new(File::open(Arc::clone(&self.inner.engine), path, mode)?);
                let entry = Entry {
                    file: Arc::clone(&file),
                    refs: 1,
                };
                files.insert(key, entry);

                Ok(file)
            }
        }
    }

    fn release(&self, path: &Path, mode: Mode) -> Result<()> {
        let _guard = self.inner.lock.acquire();
        let mut files = self.inner.files.lock();
        let key = (path.to_path_buf(), mode);
        let refs = match files.get_mut(&key) {
            Some(entry) => {
                entry.refs -= 1;
                entry.refs
            }
            None => return Ok(()),
        };

        log::debug!("coordinator release {path:?}, refs {refs}");
        if refs == 0 {
            if let Some(entry) = files.remove(&key) {
                return entry.file.close();
            }
        }

        Ok(())
    }
}

/// A counted reference to a file held open by a `Coordinator`.
///
/// Release it with `release` to see any error from closing the file. Dropping an unreleased
/// reference releases it too, logging any error. Either way, releasing takes the engine lock.
///
pub struct FileRef {
    coordinator: Coordinator,
    path: PathBuf,
    mode: Mode,
    released: bool,
}

impl FileRef {
    /// Normalized path of the referenced file
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Get the open file, reopening it if it was closed in the meantime.
    ///
    /// # Arguments
    ///
    /// * `needs_lock` - Whether to take the engine lock. Pass `false` if the caller already holds
    ///   it.
    ///
    pub fn acquire(&self, needs_lock: bool) -> Result<Arc<File>> {
        let _guard = needs_lock.then(|| self.coordinator.inner.lock.acquire());

        self.coordinator.file(&self.path, self.mode)
    }

    /// Give up this reference, closing the file if it was the last one.
    ///
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.coordinator.release(&self.path, self.mode)
    }
}

impl Drop for FileRef {
    fn drop(&mut self) {
        if !self.released {
            if let Err(err) = self.coordinator.release(&self.path, self.mode) {
                log::warn!("error closing {:?}: {err}", self.path);
            }
        }
    }
}
