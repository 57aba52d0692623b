use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use assess_core::model::SessionId;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

/// Per-session reader/writer locks.
///
/// Answer saves share a session's read side so they run concurrently;
/// submit and discard take the write side and exclude saves and each other.
/// An entry lives only while some caller holds or waits on it.
#[derive(Debug, Default)]
pub struct SessionLocks {
    inner: Mutex<HashMap<SessionId, Arc<RwLock<()>>>>,
}

/// Guard over one session's lock. Dropping it releases the lock and removes
/// the registry entry once no other caller holds a handle to it.
#[derive(Debug)]
pub struct SessionGuard<'a, G> {
    locks: &'a SessionLocks,
    id: SessionId,
    guard: Option<G>,
}

impl<G> Drop for SessionGuard<'_, G> {
    fn drop(&mut self) {
        self.guard.take();
        self.locks.release_idle(self.id);
    }
}

pub type SessionReadGuard<'a> = SessionGuard<'a, OwnedRwLockReadGuard<()>>;
pub type SessionWriteGuard<'a> = SessionGuard<'a, OwnedRwLockWriteGuard<()>>;

impl SessionLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> MutexGuard<'_, HashMap<SessionId, Arc<RwLock<()>>>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn entry(&self, id: SessionId) -> Arc<RwLock<()>> {
        Arc::clone(self.map().entry(id).or_default())
    }

    /// Handles are only cloned under the map mutex, so a count of one here
    /// means nobody holds or awaits the lock.
    fn release_idle(&self, id: SessionId) {
        let mut map = self.map();
        if map.get(&id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            map.remove(&id);
        }
    }

    pub async fn read(&self, id: SessionId) -> SessionReadGuard<'_> {
        let guard = self.entry(id).read_owned().await;
        SessionGuard {
            locks: self,
            id,
            guard: Some(guard),
        }
    }

    pub async fn write(&self, id: SessionId) -> SessionWriteGuard<'_> {
        let guard = self.entry(id).write_owned().await;
        SessionGuard {
            locks: self,
            id,
            guard: Some(guard),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
