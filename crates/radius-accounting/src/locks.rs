//! Per-session mutual exclusion
//!
//! Every read-modify-write on one online session (create, counter update,
//! settle + delete, reconciliation) runs while holding that session's lock.
//! Different sessions never contend.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Keyed async mutex, one slot per session id
///
/// Slots are created on demand and dropped again when the last holder or
/// waiter lets go, so the map only ever holds contended or held keys.
#[derive(Debug, Default, Clone)]
pub struct SessionLocks {
    slots: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `session_id`
    pub async fn lock(&self, session_id: &str) -> SessionGuard {
        let slot = self
            .slots
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = slot.lock_owned().await;
        SessionGuard {
            slots: Arc::clone(&self.slots),
            session_id: session_id.to_string(),
            guard: Some(guard),
        }
    }

    /// Number of live slots (held or awaited)
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Held lock for one session; released on drop
#[derive(Debug)]
pub struct SessionGuard {
    slots: Arc<DashMap<String, Arc<Mutex<()>>>>,
    session_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl SessionGuard {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        // Release first so the strong count below only counts the map and waiters
        drop(self.guard.take());
        self.slots
            .remove_if(&self.session_id, |_, slot| Arc::strong_count(slot) == 1);
    }
}
