//! Bulk reconciliation after Accounting-On / Accounting-Off
//!
//! A NAS that reboots (or announces a clean shutdown) has lost every session
//! it was carrying, so each online session attributed to it is settled with
//! its last known totals and closed.

use crate::audit::{AuditEntry, AuditEventType, AuditLogger};
use crate::counters::TrafficCounters;
use crate::error::AccountingError;
use crate::ledger::SessionLedger;
use crate::model::CloseReason;
use crate::settlement::UsageSettlement;
use serde::Serialize;
use std::future::Future;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Per-session retry behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total tries per session, including the first
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_millis(100),
        }
    }
}

/// A session that could not be settled after every retry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionFailure {
    pub session_id: String,
    pub error: String,
}

/// Outcome of one reconciliation run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub nas: IpAddr,
    /// Sessions settled and removed by this run
    pub settled: usize,
    /// Sessions listed but closed by a concurrent Stop before their turn
    pub already_closed: usize,
    pub failed: Vec<SessionFailure>,
    /// Set when the run could not even list the NAS's sessions
    pub aborted: Option<String>,
}

impl ReconcileReport {
    fn new(nas: IpAddr) -> Self {
        ReconcileReport {
            nas,
            settled: 0,
            already_closed: 0,
            failed: Vec::new(),
            aborted: None,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.aborted.is_none()
    }
}

enum Outcome {
    Settled,
    AlreadyClosed,
}

/// Force-closes every online session of a NAS
pub struct BulkReconciler {
    ledger: Arc<SessionLedger>,
    settlement: Arc<UsageSettlement>,
    retry: RetryPolicy,
    audit: Arc<AuditLogger>,
    report_tx: mpsc::UnboundedSender<ReconcileReport>,
    report_rx: Mutex<Option<mpsc::UnboundedReceiver<ReconcileReport>>>,
}

impl BulkReconciler {
    pub fn new(
        ledger: Arc<SessionLedger>,
        settlement: Arc<UsageSettlement>,
        retry: RetryPolicy,
        audit: Arc<AuditLogger>,
    ) -> Self {
        let (report_tx, report_rx) = mpsc::unbounded_channel();
        BulkReconciler {
            ledger,
            settlement,
            retry: RetryPolicy {
                max_attempts: retry.max_attempts.max(1),
                ..retry
            },
            audit,
            report_tx,
            report_rx: Mutex::new(Some(report_rx)),
        }
    }

    /// Receiver for the reports of background runs; only the first caller gets it
    pub fn take_reports(&self) -> Option<mpsc::UnboundedReceiver<ReconcileReport>> {
        self.report_rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }

    /// Reconcile `nas` now and return the report.
    ///
    /// Individual session failures end up in [`ReconcileReport::failed`];
    /// only a failure to list the sessions is returned as an error.
    pub async fn reconcile(&self, nas: IpAddr) -> Result<ReconcileReport, AccountingError> {
        let sessions = self.with_retry(|| self.ledger.list_all(nas)).await?;
        info!(nas = %nas, sessions = sessions.len(), "Reconciling NAS sessions");

        let mut report = ReconcileReport::new(nas);
        for session in sessions {
            let session_id = session.session_id;
            let outcome = self.with_retry(|| self.close_one(&session_id)).await;
            match outcome {
                Ok(Outcome::Settled) => report.settled += 1,
                Ok(Outcome::AlreadyClosed) => report.already_closed += 1,
                Err(e) => {
                    warn!(nas = %nas, session_id = %session_id, error = %e, "Skipping session after retries");
                    report.failed.push(SessionFailure {
                        session_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            nas = %nas,
            settled = report.settled,
            already_closed = report.already_closed,
            failed = report.failed.len(),
            "Reconciliation finished"
        );
        self.audit
            .log(AuditEntry::new(AuditEventType::ReconcileCompleted)
                .with_nas(nas, None)
                .with_details(format!(
                    "settled={} already_closed={} failed={}",
                    report.settled,
                    report.already_closed,
                    report.failed.len()
                )))
            .await;
        Ok(report)
    }

    /// Run [`reconcile`](Self::reconcile) in a supervised background task.
    ///
    /// The report (or the reason the run died) is published on the report
    /// channel; nothing is propagated to the caller.
    pub fn spawn(self: &Arc<Self>, nas: IpAddr) -> JoinHandle<()> {
        let reconciler = Arc::clone(self);
        tokio::spawn(async move {
            let worker = {
                let reconciler = Arc::clone(&reconciler);
                tokio::spawn(async move { reconciler.reconcile(nas).await })
            };

            let report = match worker.await {
                Ok(Ok(report)) => report,
                Ok(Err(e)) => {
                    error!(nas = %nas, error = %e, "Reconciliation aborted");
                    reconciler
                        .audit
                        .log(AuditEntry::new(AuditEventType::ReconcileCompleted)
                            .with_nas(nas, None)
                            .with_details(format!("aborted: {}", e)))
                        .await;
                    ReconcileReport {
                        aborted: Some(e.to_string()),
                        ..ReconcileReport::new(nas)
                    }
                }
                Err(join_error) => {
                    error!(nas = %nas, error = %join_error, "Reconciliation task failed");
                    ReconcileReport {
                        aborted: Some(join_error.to_string()),
                        ..ReconcileReport::new(nas)
                    }
                }
            };

            if reconciler.report_tx.send(report).is_err() {
                debug!(nas = %nas, "No reconcile report listener");
            }
        })
    }

    async fn close_one(&self, session_id: &str) -> Result<Outcome, AccountingError> {
        let _guard = self.ledger.lock(session_id).await;

        // Re-read under the lock: a Stop may have closed it or an interim moved its counters
        let Some(session) = self.ledger.find_unsettled(session_id).await? else {
            return Ok(Outcome::AlreadyClosed);
        };
        let totals = TrafficCounters::new(session.upstream_bytes, session.downstream_bytes);
        let log = self
            .settlement
            .close_session(&session, totals, CloseReason::Reconciled)
            .await?;

        self.audit
            .log(AuditEntry::new(AuditEventType::SessionReconciled)
                .with_session_id(&log.session_id)
                .with_username(log.user_name.as_deref())
                .with_nas(log.nas_address, None)
                .with_traffic(log.total_upstream_bytes, log.total_downstream_bytes)
                .with_duration(log.used_duration_secs))
            .await;
        Ok(Outcome::Settled)
    }

    async fn with_retry<T, F, Fut>(&self, mut op: F) -> Result<T, AccountingError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AccountingError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.retry.max_attempts => {
                    debug!(attempt, error = %e, "Reconcile step failed, retrying");
                    attempt += 1;
                    tokio::time::sleep(self.retry.delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
