//! Mutual exclusion for engine access.
//!
//! The container engine is not thread safe, so every call into it happens with a lock held. Locks
//! are shared as `Arc<dyn Lock>` so that a store can be given the engine lock alone, or the engine
//! lock combined with a per-file write lock.
//!
use std::{fmt, mem, sync::Arc};

use parking_lot::{Mutex, MutexGuard};

/// A mutual exclusion primitive with scoped acquisition.
///
pub trait Lock: Send + Sync {
    /// Block until the lock is acquired. The lock is released when the guard is dropped.
    fn acquire(&self) -> LockGuard<'_>;

    /// Acquire the lock only if that can be done without blocking.
    fn try_acquire(&self) -> Option<LockGuard<'_>>;

    fn is_locked(&self) -> bool;
}

/// Holds one or more locks, releasing them in reverse order of acquisition when dropped.
///
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard<'a> {
    guards: Vec<MutexGuard<'a, ()>>,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        while let Some(guard) = self.guards.pop() {
            drop(guard);
        }
    }
}

/// A plain, non-reentrant lock.
///
#[derive(Default)]
pub struct SerialLock {
    mutex: Mutex<()>,
}

impl SerialLock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Lock for SerialLock {
    fn acquire(&self) -> LockGuard<'_> {
        LockGuard {
            guards: vec![self.mutex.lock()],
        }
    }

    fn try_acquire(&self) -> Option<LockGuard<'_>> {
        self.mutex
            .try_lock()
            .map(|guard| LockGuard { guards: vec![guard] })
    }

    fn is_locked(&self) -> bool {
        self.mutex.is_locked()
    }
}

impl fmt::Debug for SerialLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SerialLock(locked={})", self.is_locked())
    }
}

/// Several locks acting as one.
///
/// Members are always acquired in the order given, and released in reverse, so two
/// `CombinedLock`s built from the same locks in the same order can't deadlock each other.
///
pub struct CombinedLock {
    locks: Vec<Arc<dyn Lock>>,
}

impl CombinedLock {
    pub fn new(locks: Vec<Arc<dyn Lock>>) -> Self {
        Self { locks }
    }
}

impl Lock for CombinedLock {
    fn acquire(&self) -> LockGuard<'_> {
        let mut guards = vec![];
        for lock in &self.locks {
            let mut guard = lock.acquire();
            guards.append(&mut mem::take(&mut guard.guards));
        }

        LockGuard { guards }
    }

    fn try_acquire(&self) -> Option<LockGuard<'_>> {
        // Anything acquired so far is released in reverse order if a later member is busy
        let mut acquired = LockGuard { guards: vec![] };
        for lock in &self.locks {
            let mut guard = lock.try_acquire()?;
            acquired.guards.append(&mut mem::take(&mut guard.guards));
        }

        Some(acquired)
    }

    fn is_locked(&self) -> bool {
        self.locks.iter().any(|lock| lock.is_locked())
    }
}
