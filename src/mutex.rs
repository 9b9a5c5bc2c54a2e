//! Process-local named locks.
//!
//! [`MutexKv`] hands out one async mutex per key. Acquirers of the same key
//! are serialized; different keys never contend. The registry is created
//! once (normally by [`crate::provider::IamProvider`]) and passed by
//! reference to every read-modify-write cycle.
//!
//! Only operations inside this process are serialized. Another process, or
//! the cloud console, can still modify the same bindings concurrently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::trace;

type Table = Arc<Mutex<HashMap<String, Slot>>>;

#[derive(Debug, Default)]
struct Slot {
    mutex: Arc<AsyncMutex<()>>,
    // Holders plus waiters.
    users: usize,
}

/// A table of named async mutexes.
#[derive(Debug, Default)]
pub struct MutexKv {
    slots: Table,
}

impl MutexKv {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for and acquire the lock named `key`.
    ///
    /// The lock is held until the returned guard is dropped. Dropping the
    /// future while it waits gives up its place without leaking the entry.
    pub async fn lock(&self, key: &str) -> KeyGuard {
        let entry = Entry::register(&self.slots, key);
        trace!(key, "Waiting for lock");
        let guard = Arc::clone(&entry.mutex).lock_owned().await;
        trace!(key, "Acquired lock");
        KeyGuard {
            guard: Some(guard),
            entry,
        }
    }

    /// Number of keys currently held or waited on.
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no key is held or waited on.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One holder's or waiter's claim on a table entry.
#[derive(Debug)]
struct Entry {
    key: String,
    mutex: Arc<AsyncMutex<()>>,
    slots: Table,
}

impl Entry {
    fn register(slots: &Table, key: &str) -> Self {
        let mut table = slots.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = table.entry(key.to_string()).or_default();
        slot.users += 1;
        Self {
            key: key.to_string(),
            mutex: Arc::clone(&slot.mutex),
            slots: Arc::clone(slots),
        }
    }
}

impl Drop for Entry {
    fn drop(&mut self) {
        let mut table = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = table.get_mut(&self.key) {
            slot.users = slot.users.saturating_sub(1);
            if slot.users == 0 {
                table.remove(&self.key);
            }
        }
    }
}

/// Holds a named lock; releases it on drop.
#[derive(Debug)]
pub struct KeyGuard {
    guard: Option<OwnedMutexGuard<()>>,
    entry: Entry,
}

impl KeyGuard {
    /// The name of the held lock.
    pub fn key(&self) -> &str {
        &self.entry.key
    }
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        // Unlock before `entry` gives up the table slot.
        self.guard.take();
        trace!(key = %self.entry.key, "Released lock");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready, task};

    #[tokio::test]
    async fn test_lock_and_release() {
        let locks = MutexKv::new();
        {
            let guard = locks.lock("iam-folder-b1g").await;
            assert_eq!(guard.key(), "iam-folder-b1g");
            assert_eq!(locks.len(), 1);
        }
        assert!(locks.is_empty());
    }

    #[test]
    fn test_same_key_blocks_until_release() {
        let locks = MutexKv::new();
        let mut first = task::spawn(locks.lock("iam-folder-b1g"));
        let guard = assert_ready!(first.poll());

        let mut second = task::spawn(locks.lock("iam-folder-b1g"));
        assert_pending!(second.poll());

        drop(guard);
        assert!(second.is_woken());
        let second_guard = assert_ready!(second.poll());
        assert_eq!(locks.len(), 1);

        drop(second_guard);
        assert!(locks.is_empty());
    }

    #[test]
    fn test_different_keys_do_not_contend() {
        let locks = MutexKv::new();
        let mut first = task::spawn(locks.lock("iam-folder-a"));
        let _a = assert_ready!(first.poll());

        let mut second = task::spawn(locks.lock("iam-folder-b"));
        let _b = assert_ready!(second.poll());
        assert_eq!(locks.len(), 2);
    }

    #[test]
    fn test_entry_kept_while_waiter_pending() {
        let locks = MutexKv::new();
        let mut first = task::spawn(locks.lock("k"));
        let guard = assert_ready!(first.poll());

        let mut waiter = task::spawn(locks.lock("k"));
        assert_pending!(waiter.poll());

        drop(guard);
        // The waiter still references the slot.
        assert_eq!(locks.len(), 1);
        drop(assert_ready!(waiter.poll()));
        assert!(locks.is_empty());
    }

    #[test]
    fn test_cancelled_waiter_after_release_frees_entry() {
        let locks = MutexKv::new();
        let mut first = task::spawn(locks.lock("iam-folder-b1g"));
        let guard = assert_ready!(first.poll());

        let mut waiter = task::spawn(locks.lock("iam-folder-b1g"));
        assert_pending!(waiter.poll());

        drop(guard);
        assert_eq!(locks.len(), 1);
        drop(waiter);
        assert!(locks.is_empty());
    }

    #[test]
    fn test_cancelled_waiter_before_release_frees_entry() {
        let locks = MutexKv::new();
        let mut first = task::spawn(locks.lock("iam-folder-b1g"));
        let guard = assert_ready!(first.poll());

        let mut waiter = task::spawn(locks.lock("iam-folder-b1g"));
        assert_pending!(waiter.poll());
        drop(waiter);
        assert_eq!(locks.len(), 1);

        drop(guard);
        assert!(locks.is_empty());

        let mut again = task::spawn(locks.lock("iam-folder-b1g"));
        let _guard = assert_ready!(again.poll());
        assert_eq!(locks.len(), 1);
    }
}
