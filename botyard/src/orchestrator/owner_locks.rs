//! Per-owner-key serialization.
//!
//! The absent-vs-found branch reads then writes the store without a lock at
//! the store layer. Two dispatches for the same owner key must never
//! interleave, while different owners may proceed in parallel.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::models::OwnerKey;

/// Keyed async mutex. Entries are dropped once nobody holds or waits on them.
#[derive(Default)]
pub(crate) struct OwnerLocks {
    locks: Mutex<HashMap<OwnerKey, Weak<AsyncMutex<()>>>>,
}

impl OwnerLocks {
    /// Wait until no other holder of `owner` remains.
    pub(crate) async fn acquire(&self, owner: OwnerKey) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock();
            locks.retain(|_, weak| weak.strong_count() > 0);
            match locks.get(&owner).and_then(Weak::upgrade) {
                Some(lock) => lock,
                None => {
                    let lock = Arc::new(AsyncMutex::new(()));
                    locks.insert(owner, Arc::downgrade(&lock));
                    lock
                }
            }
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        let mut locks = self.locks.lock();
        locks.retain(|_, weak| weak.strong_count() > 0);
        locks.len()
    }
}
