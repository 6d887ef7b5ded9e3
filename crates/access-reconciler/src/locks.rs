//! Keyed mutual exclusion for registry read-modify-write sequences.
//!
//! The registry offers no conditional writes, so registrations and
//! cancellations touching the same email (or the same requester) inside this
//! process are serialized here. Separate processes can still race.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug)]
struct Slot {
    lock: Arc<AsyncMutex<()>>,
    /// Holders plus waiters.
    users: usize,
}

type Slots = HashMap<String, Slot>;

/// Map of in-flight per-key locks. Cheap to clone; clones share state.
#[derive(Debug, Clone, Default)]
pub struct EmailLocks {
    slots: Arc<Mutex<Slots>>,
}

impl EmailLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `email`. Released when the guard drops.
    ///
    /// The guard exists before the wait starts, so a cancelled waiter still
    /// gives up its map entry.
    pub async fn acquire(&self, email: &str) -> EmailLockGuard {
        let lock = {
            let mut slots = self.slots();
            let slot = slots.entry(email.to_string()).or_insert_with(|| Slot {
                lock: Arc::new(AsyncMutex::new(())),
                users: 0,
            });
            slot.users += 1;
            slot.lock.clone()
        };

        let mut held = EmailLockGuard {
            email: email.to_string(),
            locks: self.clone(),
            guard: None,
        };
        held.guard = Some(lock.lock_owned().await);
        held
    }

    /// Number of keys with a holder or waiter.
    pub fn in_flight(&self) -> usize {
        self.slots().len()
    }

    fn slots(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn release(&self, email: &str) {
        let mut slots = self.slots();
        let idle = match slots.get_mut(email) {
            Some(slot) => {
                slot.users = slot.users.saturating_sub(1);
                slot.users == 0
            }
            None => false,
        };
        if idle {
            slots.remove(email);
        }
    }
}

/// Exclusive access to one key.
#[derive(Debug)]
pub struct EmailLockGuard {
    email: String,
    locks: EmailLocks,
    guard: Option<OwnedMutexGuard<()>>,
}

impl EmailLockGuard {
    pub fn email(&self) -> &str {
        &self.email
    }
}

impl Drop for EmailLockGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks.release(&self.email);
    }
}
