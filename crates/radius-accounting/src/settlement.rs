//! Usage settlement: turn a closing session into a usage log and a quota debit

use crate::counters::TrafficCounters;
use crate::error::AccountingError;
use crate::ledger::SessionLedger;
use crate::model::{Clock, CloseReason, OnlineSession, UsageLog};
use crate::store::AccountingStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// How much flow a closed session consumes from the subscriber's quota
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaDebitPolicy {
    /// Upstream plus downstream bytes
    #[default]
    Total,
    /// Downstream minus upstream, never below zero
    Net,
}

impl QuotaDebitPolicy {
    pub fn flow(self, upstream: u64, downstream: u64) -> u64 {
        match self {
            QuotaDebitPolicy::Total => upstream.saturating_add(downstream),
            QuotaDebitPolicy::Net => downstream.saturating_sub(upstream),
        }
    }
}

pub struct UsageSettlement {
    store: Arc<dyn AccountingStore>,
    ledger: Arc<SessionLedger>,
    policy: QuotaDebitPolicy,
    clock: Arc<dyn Clock>,
}

impl UsageSettlement {
    pub fn new(
        store: Arc<dyn AccountingStore>,
        ledger: Arc<SessionLedger>,
        policy: QuotaDebitPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        UsageSettlement {
            store,
            ledger,
            policy,
            clock,
        }
    }

    pub fn policy(&self) -> QuotaDebitPolicy {
        self.policy
    }

    /// Record the usage log for `session` and debit its subscriber.
    ///
    /// Sessions without a user, or whose user has no quota row, are logged
    /// but debit nothing. The online row is left untouched.
    pub async fn settle(
        &self,
        session: &OnlineSession,
        totals: TrafficCounters,
        reason: CloseReason,
    ) -> Result<UsageLog, AccountingError> {
        let stop_time = self.clock.now();
        let used_duration_secs = u64::try_from((stop_time - session.start_time).num_seconds()).unwrap_or(0);

        let log = UsageLog {
            session_id: session.session_id.clone(),
            user_name: session.user_name.clone(),
            start_time: session.start_time,
            stop_time,
            used_duration_secs,
            total_upstream_bytes: totals.upstream,
            total_downstream_bytes: totals.downstream,
            nas_address: session.nas_address,
            ip_address: session.ip_address,
            mac_address: session.mac_address.clone(),
            close_reason: reason,
        };
        self.store.insert_usage_log(&log).await?;

        if let Some(user_name) = &session.user_name {
            let flow = self.policy.flow(totals.upstream, totals.downstream);
            match self.store.debit_quota(user_name, flow, used_duration_secs).await? {
                Some(quota) => debug!(
                    user = %user_name,
                    flow,
                    time = used_duration_secs,
                    available_flow = quota.available_flow,
                    available_time = quota.available_time,
                    "Quota debited"
                ),
                None => debug!(user = %user_name, "No quota row, nothing to debit"),
            }
        }

        Ok(log)
    }

    /// Settle and then remove the online row.
    ///
    /// If settlement fails the row stays, so a retry can settle again. Once
    /// settlement succeeded the id is tombstoned before the delete, so a
    /// failed delete never leads to a second log or debit while the
    /// tombstone lives.
    pub async fn close_session(
        &self,
        session: &OnlineSession,
        totals: TrafficCounters,
        reason: CloseReason,
    ) -> Result<UsageLog, AccountingError> {
        let log = self.settle(session, totals, reason).await?;
        self.ledger.mark_closed(&session.session_id);
        self.ledger.delete(&session.session_id).await?;

        info!(
            session_id = %log.session_id,
            user = log.user_name.as_deref().unwrap_or("-"),
            nas = %log.nas_address,
            duration = log.used_duration_secs,
            upstream = log.total_upstream_bytes,
            downstream = log.total_downstream_bytes,
            reason = %reason,
            "Session closed"
        );
        Ok(log)
    }
}
