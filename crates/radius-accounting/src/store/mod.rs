//! Persistence seam for the accounting core
//!
//! Three collections are owned here:
//!
//! - **online sessions**: one row per connected session, keyed by
//!   Acct-Session-Id
//! - **usage logs**: append-only history, one row per closed session
//! - **subscribers**: remaining flow/time allowance per user
//!
//! # Implementations
//!
//! - [`MemoryStore`]: HashMaps behind a `tokio::sync::RwLock` (tests, single node)
//! - [`PostgresStore`]: `sqlx` on PostgreSQL
//!
//! Each method is atomic on its own. Ordering between methods for the same
//! session is the caller's job (see [`SessionLocks`](crate::locks::SessionLocks)).

pub mod error;
pub mod memory;
pub mod postgres;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use crate::model::{OnlineSession, SubscriberQuota, UsageLog};
use async_trait::async_trait;
use std::net::IpAddr;

#[async_trait]
pub trait AccountingStore: Send + Sync {
    /// Insert a new online session.
    ///
    /// Fails with [`StoreError::Conflict`] if the session id is taken.
    async fn insert_session(&self, session: &OnlineSession) -> Result<(), StoreError>;

    async fn get_session(&self, session_id: &str) -> Result<Option<OnlineSession>, StoreError>;

    /// Overwrite the running traffic totals. Returns `false` if the row is gone.
    async fn update_session_counters(
        &self,
        session_id: &str,
        upstream_bytes: u64,
        downstream_bytes: u64,
    ) -> Result<bool, StoreError>;

    /// Fill in the user of a session. Returns `false` if the row is gone.
    async fn update_session_user(&self, session_id: &str, user_name: &str) -> Result<bool, StoreError>;

    /// Remove a session. Returns `false` if it was already absent.
    async fn delete_session(&self, session_id: &str) -> Result<bool, StoreError>;

    /// Every online session attributed to one NAS
    async fn sessions_for_nas(&self, nas_address: IpAddr) -> Result<Vec<OnlineSession>, StoreError>;

    async fn insert_usage_log(&self, log: &UsageLog) -> Result<(), StoreError>;

    async fn get_subscriber(&self, user_name: &str) -> Result<Option<SubscriberQuota>, StoreError>;

    /// Atomically subtract usage from a subscriber's balances, flooring at zero.
    ///
    /// Returns the balances after the debit, or `None` for an unknown user.
    async fn debit_quota(
        &self,
        user_name: &str,
        flow: u64,
        time: u64,
    ) -> Result<Option<SubscriberQuota>, StoreError>;

    /// Health check / connectivity test
    async fn ping(&self) -> Result<(), StoreError>;
}
