//! Per-session mutual exclusion.
//!
//! Orchestrator calls and sweeper passes both read-modify-write a session.
//! Holding the session's lock for the whole transition keeps a personality
//! update or proactive message from being applied twice within a process.
//! Entries live only while someone holds or waits for them.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

type LockMap = DashMap<Uuid, Arc<Mutex<()>>>;

#[derive(Debug, Default)]
pub struct SessionLocks {
    locks: LockMap,
}

/// Exclusive access to one session. Releasing the last interest in the
/// session drops its map entry.
#[must_use = "the session is unlocked as soon as the guard is dropped"]
pub struct SessionGuard<'a> {
    guard: Option<OwnedMutexGuard<()>>,
    session_id: Uuid,
    locks: &'a LockMap,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Waiters hold a clone of the Arc, so the map's copy is not the only one.
        self.locks
            .remove_if(&self.session_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to a session.
    pub async fn acquire(&self, session_id: Uuid) -> SessionGuard<'_> {
        // The map shard must not be held across the await.
        let lock = self
            .locks
            .entry(session_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        SessionGuard {
            guard: Some(lock.lock_owned().await),
            session_id,
            locks: &self.locks,
        }
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_session_is_exclusive() {
        let locks = Arc::new(SessionLocks::new());
        let id = Uuid::now_v7();
        let guard = locks.acquire(id).await;

        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.acquire(id).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_different_sessions_do_not_block() {
        let locks = SessionLocks::new();
        let _a = locks.acquire(Uuid::now_v7()).await;
        let _b = locks.acquire(Uuid::now_v7()).await;
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_released_entries_are_evicted() {
        let locks = SessionLocks::new();
        for _ in 0..100 {
            drop(locks.acquire(Uuid::now_v7()).await);
        }
        assert!(locks.is_empty());

        let id = Uuid::now_v7();
        let held = locks.acquire(id).await;
        drop(locks.acquire(Uuid::now_v7()).await);
        assert_eq!(locks.len(), 1);
        drop(held);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_waiter_keeps_entry_alive() {
        let locks = Arc::new(SessionLocks::new());
        let id = Uuid::now_v7();
        let guard = locks.acquire(id).await;

        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.acquire(id).await;
                locks.len()
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(guard);
        assert_eq!(waiter.await.unwrap(), 1);
        assert!(locks.is_empty());
    }
}
