//! Per-conversation leases.
//!
//! Turns within one conversation run one at a time; turns in different
//! conversations run concurrently. A lease is held from before the history
//! read until the turn is persisted. Entries are removed once nobody holds
//! or waits for them, so the map only grows with in-flight conversations.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

type LockMap = DashMap<Uuid, Arc<Mutex<()>>>;

/// Registry of per-conversation locks.
#[derive(Debug, Default, Clone)]
pub struct ConversationLeases {
    locks: Arc<LockMap>,
}

impl ConversationLeases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for and take the lease for `conversation_id`.
    pub async fn acquire(&self, conversation_id: Uuid) -> ConversationLease {
        let lock = self
            .locks
            .entry(conversation_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock_owned().await;
        ConversationLease {
            conversation_id,
            guard: Some(guard),
            locks: Arc::clone(&self.locks),
        }
    }

    /// Number of conversations with a held or awaited lease.
    pub fn active(&self) -> usize {
        self.locks.len()
    }
}

/// A held lease. Released on drop.
#[derive(Debug)]
pub struct ConversationLease {
    conversation_id: Uuid,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<LockMap>,
}

impl ConversationLease {
    pub fn conversation_id(&self) -> Uuid {
        self.conversation_id
    }
}

impl Drop for ConversationLease {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Only the map's own Arc left: no holder, no waiter.
        self.locks
            .remove_if(&self.conversation_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn same_conversation_is_serialized() {
        let leases = ConversationLeases::new();
        let id = Uuid::now_v7();
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let leases = leases.clone();
            let inside = inside.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                let _lease = leases.acquire(id).await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_conversations_do_not_block() {
        let leases = ConversationLeases::new();
        let _a = leases.acquire(Uuid::now_v7()).await;
        let b = tokio::time::timeout(Duration::from_millis(100), leases.acquire(Uuid::now_v7())).await;
        assert!(b.is_ok());
        assert_eq!(leases.active(), 2);
    }

    #[tokio::test]
    async fn entries_removed_after_release() {
        let leases = ConversationLeases::new();
        let id = Uuid::now_v7();
        {
            let lease = leases.acquire(id).await;
            assert_eq!(lease.conversation_id(), id);
            assert_eq!(leases.active(), 1);
        }
        assert_eq!(leases.active(), 0);
    }
}
