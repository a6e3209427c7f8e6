//! In-memory accounting store

use super::{AccountingStore, StoreError};
use crate::model::{OnlineSession, SubscriberQuota, UsageLog};
use async_trait::async_trait;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory accounting store
///
/// Keeps everything in local HashMaps; nothing survives a restart.
///
/// # Use Cases
///
/// - Development and testing
/// - Single-node deployments that only need live quota enforcement
///
/// # Thread Safety
///
/// Uses `tokio::sync::RwLock` for concurrent access from multiple async tasks.
/// Quota debits happen under the subscribers write lock, so concurrent debits
/// of the same user never lose an update.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    sessions: Arc<RwLock<HashMap<String, OnlineSession>>>,
    usage_logs: Arc<RwLock<Vec<UsageLog>>>,
    subscribers: Arc<RwLock<HashMap<String, SubscriberQuota>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a subscriber's balances
    pub async fn add_subscriber(&self, quota: SubscriberQuota) {
        let mut subscribers = self.subscribers.write().await;
        subscribers.insert(quota.user_name.clone(), quota);
    }

    /// Snapshot of the usage history, oldest first
    pub async fn usage_logs(&self) -> Vec<UsageLog> {
        self.usage_logs.read().await.clone()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl AccountingStore for MemoryStore {
    async fn insert_session(&self, session: &OnlineSession) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session.session_id) {
            return Err(StoreError::Conflict(format!(
                "session {} already exists",
                session.session_id
            )));
        }
        sessions.insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<OnlineSession>, StoreError> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn update_session_counters(
        &self,
        session_id: &str,
        upstream_bytes: u64,
        downstream_bytes: u64,
    ) -> Result<bool, StoreError> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(session_id) {
            Some(session) => {
                session.upstream_bytes = upstream_bytes;
                session.downstream_bytes = downstream_bytes;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn update_session_user(&self, session_id: &str, user_name: &str) -> Result<bool, StoreError> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(session_id) {
            Some(session) => {
                session.user_name = Some(user_name.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_session(&self, session_id: &str) -> Result<bool, StoreError> {
        Ok(self.sessions.write().await.remove(session_id).is_some())
    }

    async fn sessions_for_nas(&self, nas_address: IpAddr) -> Result<Vec<OnlineSession>, StoreError> {
        let sessions = self.sessions.read().await;
        let mut matching: Vec<OnlineSession> = sessions
            .values()
            .filter(|s| s.nas_address == nas_address)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        Ok(matching)
    }

    async fn insert_usage_log(&self, log: &UsageLog) -> Result<(), StoreError> {
        self.usage_logs.write().await.push(log.clone());
        Ok(())
    }

    async fn get_subscriber(&self, user_name: &str) -> Result<Option<SubscriberQuota>, StoreError> {
        Ok(self.subscribers.read().await.get(user_name).cloned())
    }

    async fn debit_quota(
        &self,
        user_name: &str,
        flow: u64,
        time: u64,
    ) -> Result<Option<SubscriberQuota>, StoreError> {
        let mut subscribers = self.subscribers.write().await;
        Ok(subscribers.get_mut(user_name).map(|quota| {
            quota.debit(flow, time);
            quota.clone()
        }))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
