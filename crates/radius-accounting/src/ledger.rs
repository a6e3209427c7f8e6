//! Session ledger: the authoritative set of online sessions
//!
//! Every operation goes straight to the [`AccountingStore`]; rows are never
//! cached here. The ledger also owns the per-session lock table and the
//! short-lived record of sessions that were just closed.

use crate::cache::TtlCache;
use crate::error::AccountingError;
use crate::locks::{SessionGuard, SessionLocks};
use crate::model::OnlineSession;
use crate::store::{AccountingStore, StoreError};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const CLOSED_SESSION_CAPACITY: usize = 100_000;

pub struct SessionLedger {
    store: Arc<dyn AccountingStore>,
    locks: SessionLocks,
    recently_closed: TtlCache<String, ()>,
}

impl SessionLedger {
    /// `closed_ttl` is how long a closed session id keeps absorbing late packets
    pub fn new(store: Arc<dyn AccountingStore>, closed_ttl: Duration) -> Self {
        SessionLedger {
            store,
            locks: SessionLocks::new(),
            recently_closed: TtlCache::new(closed_ttl, CLOSED_SESSION_CAPACITY),
        }
    }

    /// Exclusive access to one session for the duration of a handler
    pub async fn lock(&self, session_id: &str) -> SessionGuard {
        self.locks.lock(session_id).await
    }

    /// Insert a new online session.
    ///
    /// A successful create ends any tombstone on the id, so a NAS that
    /// reuses session ids after a reboot starts afresh.
    pub async fn create(&self, session: &OnlineSession) -> Result<(), AccountingError> {
        let session_id = &session.session_id;
        match self.store.insert_session(session).await {
            Ok(()) => {}
            Err(StoreError::Conflict(_)) if self.recently_closed(session_id) => {
                // Row of a settled session whose delete failed
                self.store.delete_session(session_id).await?;
                self.store.insert_session(session).await?;
            }
            Err(StoreError::Conflict(_)) => {
                return Err(AccountingError::DuplicateSession(session_id.clone()));
            }
            Err(e) => return Err(e.into()),
        }

        self.recently_closed.remove(session_id);
        debug!(session_id = %session_id, nas = %session.nas_address, "Session row created");
        Ok(())
    }

    pub async fn find(&self, session_id: &str) -> Result<Option<OnlineSession>, AccountingError> {
        Ok(self.store.get_session(session_id).await?)
    }

    /// Like [`find`](Self::find), but a row left behind by an already settled
    /// session is removed and reported as absent.
    pub async fn find_unsettled(&self, session_id: &str) -> Result<Option<OnlineSession>, AccountingError> {
        let found = self.find(session_id).await?;
        if found.is_some() && self.recently_closed(session_id) {
            debug!(session_id = %session_id, "Removing row of an already settled session");
            self.store.delete_session(session_id).await?;
            return Ok(None);
        }
        Ok(found)
    }

    pub async fn update_counters(
        &self,
        session_id: &str,
        upstream_bytes: u64,
        downstream_bytes: u64,
    ) -> Result<(), AccountingError> {
        if self
            .store
            .update_session_counters(session_id, upstream_bytes, downstream_bytes)
            .await?
        {
            Ok(())
        } else {
            Err(AccountingError::SessionNotFound(session_id.to_string()))
        }
    }

    pub async fn set_user_name(&self, session_id: &str, user_name: &str) -> Result<(), AccountingError> {
        if self.store.update_session_user(session_id, user_name).await? {
            Ok(())
        } else {
            Err(AccountingError::SessionNotFound(session_id.to_string()))
        }
    }

    /// Remove an online session and remember it as recently closed
    pub async fn delete(&self, session_id: &str) -> Result<(), AccountingError> {
        if self.store.delete_session(session_id).await? {
            self.mark_closed(session_id);
            Ok(())
        } else {
            Err(AccountingError::SessionNotFound(session_id.to_string()))
        }
    }

    /// Online sessions of one NAS
    pub async fn list_all(&self, nas_address: IpAddr) -> Result<Vec<OnlineSession>, AccountingError> {
        Ok(self.store.sessions_for_nas(nas_address).await?)
    }

    pub fn mark_closed(&self, session_id: &str) {
        self.recently_closed.insert(session_id.to_string(), ());
    }

    /// Whether `session_id` was closed within the tombstone TTL
    pub fn recently_closed(&self, session_id: &str) -> bool {
        self.recently_closed.contains(&session_id.to_string())
    }
}
