//! Per-call serialization
//!
//! Webhooks for the same call id must be applied one at a time; webhooks
//! for different ids run freely. Entries are removed as soon as no task
//! holds or waits on them, so the registry only grows with the number of
//! calls currently being processed.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Registry of async locks keyed by call id
#[derive(Default)]
pub struct CallLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Held while a call is being updated; releases and cleans up on drop
pub struct CallGuard<'a> {
    owner: &'a CallLocks,
    call_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl CallLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `call_id`
    pub async fn lock(&self, call_id: &str) -> CallGuard<'_> {
        let mutex = {
            let mut locks = self.locks.lock();
            locks
                .entry(call_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        // Created before the wait so a cancelled waiter still cleans up
        let mut call_guard = CallGuard {
            owner: self,
            call_id: call_id.to_string(),
            guard: None,
        };
        call_guard.guard = Some(mutex.lock_owned().await);
        call_guard
    }

    /// Number of call ids currently tracked
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        // Release first so the strong count below reflects only waiters
        drop(self.guard.take());

        let mut locks = self.owner.locks.lock();
        if let Some(mutex) = locks.get(&self.call_id) {
            // One reference is the map's own
            if Arc::strong_count(mutex) == 1 {
                locks.remove(&self.call_id);
            }
        }
    }
}
