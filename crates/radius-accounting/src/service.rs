//! Accounting dispatcher
//!
//! [`AccountingService::handle_accounting`] routes one decoded
//! Accounting-Request to its lifecycle transition by Acct-Status-Type:
//!
//! | Status          | Transition                                          |
//! |-----------------|-----------------------------------------------------|
//! | Start           | open a session                                      |
//! | Interim-Update  | add counter deltas (recreate a lost session)        |
//! | Stop            | settle the session and close it                     |
//! | Accounting-On   | reconcile the NAS's sessions in the background      |
//! | Accounting-Off  | same as Accounting-On                               |
//!
//! Start, Interim-Update and Stop for one session id run under that
//! session's lock, so their effects never interleave.

use crate::audit::{AuditEntry, AuditEventType, AuditLogger};
use crate::counters::TrafficCounters;
use crate::error::AccountingError;
use crate::ledger::SessionLedger;
use crate::model::{Clock, CloseReason, NasContext, OnlineSession, SystemClock};
use crate::reconcile::{BulkReconciler, ReconcileReport, RetryPolicy};
use crate::settlement::{QuotaDebitPolicy, UsageSettlement};
use crate::store::AccountingStore;
use crate::view::{AttributeView, MacAddressSource};
use radius_proto::{AcctStatusType, Packet};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How a request was handled when it is to be acknowledged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    /// State was changed by this request
    Recorded,
    /// Already applied (repeated Start, or a late packet for a closed session)
    Duplicate,
    /// Accounting-On/Off accepted; reconciliation runs in the background
    ReconcileScheduled,
}

/// Tunables of the accounting core
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountingOptions {
    pub quota_debit_policy: QuotaDebitPolicy,
    pub retry: RetryPolicy,
    /// How long a closed session id keeps absorbing late packets
    pub closed_session_ttl: Duration,
    pub mac_sources: Vec<MacAddressSource>,
}

impl Default for AccountingOptions {
    fn default() -> Self {
        AccountingOptions {
            quota_debit_policy: QuotaDebitPolicy::default(),
            retry: RetryPolicy::default(),
            closed_session_ttl: Duration::from_secs(300),
            mac_sources: MacAddressSource::defaults(),
        }
    }
}

struct Inner {
    store: Arc<dyn AccountingStore>,
    ledger: Arc<SessionLedger>,
    settlement: Arc<UsageSettlement>,
    reconciler: Arc<BulkReconciler>,
    clock: Arc<dyn Clock>,
    audit: Arc<AuditLogger>,
    mac_sources: Vec<MacAddressSource>,
}

/// Entry point of the accounting core; cheap to clone
#[derive(Clone)]
pub struct AccountingService {
    inner: Arc<Inner>,
}

/// Builder for [`AccountingService`]
pub struct AccountingServiceBuilder {
    store: Arc<dyn AccountingStore>,
    options: AccountingOptions,
    clock: Arc<dyn Clock>,
    audit: Arc<AuditLogger>,
}

impl AccountingServiceBuilder {
    pub fn options(mut self, options: AccountingOptions) -> Self {
        self.options = options;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = audit;
        self
    }

    pub fn build(self) -> AccountingService {
        let ledger = Arc::new(SessionLedger::new(
            Arc::clone(&self.store),
            self.options.closed_session_ttl,
        ));
        let settlement = Arc::new(UsageSettlement::new(
            Arc::clone(&self.store),
            Arc::clone(&ledger),
            self.options.quota_debit_policy,
            Arc::clone(&self.clock),
        ));
        let reconciler = Arc::new(BulkReconciler::new(
            Arc::clone(&ledger),
            Arc::clone(&settlement),
            self.options.retry,
            Arc::clone(&self.audit),
        ));

        AccountingService {
            inner: Arc::new(Inner {
                store: self.store,
                ledger,
                settlement,
                reconciler,
                clock: self.clock,
                audit: self.audit,
                mac_sources: self.options.mac_sources,
            }),
        }
    }
}

impl AccountingService {
    /// Service on the wall clock with auditing disabled
    pub fn new(store: Arc<dyn AccountingStore>, options: AccountingOptions) -> Self {
        Self::builder(store).options(options).build()
    }

    pub fn builder(store: Arc<dyn AccountingStore>) -> AccountingServiceBuilder {
        AccountingServiceBuilder {
            store,
            options: AccountingOptions::default(),
            clock: Arc::new(SystemClock),
            audit: Arc::new(AuditLogger::disabled()),
        }
    }

    pub fn quota_debit_policy(&self) -> QuotaDebitPolicy {
        self.inner.settlement.policy()
    }

    /// Check that the store is reachable
    pub async fn ping(&self) -> Result<(), AccountingError> {
        Ok(self.inner.store.ping().await?)
    }

    /// Apply one Accounting-Request.
    ///
    /// `Ok` means the request must be acknowledged with an
    /// Accounting-Response; `Err` means it must not be.
    pub async fn handle_accounting(&self, packet: &Packet, nas: &NasContext) -> Result<Ack, AccountingError> {
        let view = AttributeView::new(packet);
        let status = view.status_type()?;
        debug!(nas = %nas.address, status = %status, identifier = packet.identifier, "Accounting-Request");

        match status {
            AcctStatusType::Start => self.start(&view, nas).await,
            AcctStatusType::Stop => self.stop(&view, nas).await,
            AcctStatusType::InterimUpdate => self.interim_update(&view, nas).await,
            AcctStatusType::AccountingOn | AcctStatusType::AccountingOff => {
                info!(nas = %nas.address, status = %status, "NAS state change, scheduling reconciliation");
                self.schedule_reconcile(nas.address);
                Ok(Ack::ReconcileScheduled)
            }
        }
    }

    /// Force-close every online session of `nas` and wait for the result
    pub async fn reconcile_nas(&self, nas: IpAddr) -> Result<ReconcileReport, AccountingError> {
        self.inner.reconciler.reconcile(nas).await
    }

    /// Reconcile `nas` in a supervised background task; see [`take_reconcile_reports`](Self::take_reconcile_reports)
    pub fn schedule_reconcile(&self, nas: IpAddr) -> JoinHandle<()> {
        self.inner.reconciler.spawn(nas)
    }

    /// Reports of background reconciliations; only the first caller gets the receiver
    pub fn take_reconcile_reports(&self) -> Option<mpsc::UnboundedReceiver<ReconcileReport>> {
        self.inner.reconciler.take_reports()
    }

    async fn start(&self, view: &AttributeView<'_>, nas: &NasContext) -> Result<Ack, AccountingError> {
        let session_id = required_session_id(view)?;
        let _guard = self.inner.ledger.lock(&session_id).await;

        let session = self.new_session(&session_id, view, nas);
        match self.inner.ledger.create(&session).await {
            Ok(()) => {}
            Err(AccountingError::DuplicateSession(_)) => {
                debug!(session_id = %session_id, "Session already online, Start is a duplicate");
                return Ok(Ack::Duplicate);
            }
            Err(e) => return Err(e),
        }

        info!(
            session_id = %session_id,
            user = session.user_name.as_deref().unwrap_or("-"),
            nas = %nas.address,
            "Session started"
        );
        self.audit(AuditEventType::SessionStart, &session, nas).await;
        Ok(Ack::Recorded)
    }

    async fn stop(&self, view: &AttributeView<'_>, nas: &NasContext) -> Result<Ack, AccountingError> {
        let session_id = required_session_id(view)?;
        let _guard = self.inner.ledger.lock(&session_id).await;

        let Some(mut session) = self.inner.ledger.find_unsettled(&session_id).await? else {
            if self.inner.ledger.recently_closed(&session_id) {
                debug!(session_id = %session_id, "Repeated Stop, session already closed");
                return Ok(Ack::Duplicate);
            }
            return Err(AccountingError::SessionNotFound(session_id));
        };

        // Counters in a Stop are the session's final totals
        let totals = match TrafficCounters::reported(view)? {
            Some(reported) => reported,
            None => TrafficCounters::new(session.upstream_bytes, session.downstream_bytes),
        };
        if session.user_name.is_none() {
            session.user_name = view.user_name();
        }

        let log = self
            .inner
            .settlement
            .close_session(&session, totals, CloseReason::Stop)
            .await?;

        self.inner
            .audit
            .log(AuditEntry::new(AuditEventType::SessionStop)
                .with_session_id(&session_id)
                .with_username(log.user_name.as_deref())
                .with_nas(nas.address, nas.name.as_deref())
                .with_traffic(log.total_upstream_bytes, log.total_downstream_bytes)
                .with_duration(log.used_duration_secs))
            .await;
        Ok(Ack::Recorded)
    }

    async fn interim_update(&self, view: &AttributeView<'_>, nas: &NasContext) -> Result<Ack, AccountingError> {
        let session_id = required_session_id(view)?;
        let delta = TrafficCounters::from_view(view)?;
        let _guard = self.inner.ledger.lock(&session_id).await;

        let Some(session) = self.inner.ledger.find_unsettled(&session_id).await? else {
            if self.inner.ledger.recently_closed(&session_id) {
                debug!(session_id = %session_id, "Interim-Update after close, ignoring");
                return Ok(Ack::Duplicate);
            }
            return self.recover(&session_id, delta, view, nas).await;
        };

        let totals = TrafficCounters::new(session.upstream_bytes, session.downstream_bytes).saturating_add(delta);
        self.inner
            .ledger
            .update_counters(&session_id, totals.upstream, totals.downstream)
            .await?;

        let mut user_name = session.user_name.clone();
        if user_name.is_none() {
            if let Some(user) = view.user_name() {
                self.inner.ledger.set_user_name(&session_id, &user).await?;
                debug!(session_id = %session_id, user = %user, "Resolved session user");
                user_name = Some(user);
            }
        }

        debug!(
            session_id = %session_id,
            upstream = totals.upstream,
            downstream = totals.downstream,
            "Session counters updated"
        );
        self.inner
            .audit
            .log(AuditEntry::new(AuditEventType::InterimUpdate)
                .with_session_id(&session_id)
                .with_username(user_name.as_deref())
                .with_nas(nas.address, nas.name.as_deref())
                .with_traffic(totals.upstream, totals.downstream))
            .await;
        Ok(Ack::Recorded)
    }

    /// Recreate a session the ledger does not know, e.g. after its Start was lost
    async fn recover(
        &self,
        session_id: &str,
        delta: TrafficCounters,
        view: &AttributeView<'_>,
        nas: &NasContext,
    ) -> Result<Ack, AccountingError> {
        let user_name = view
            .user_name()
            .ok_or_else(|| AccountingError::UnresolvedSession(session_id.to_string()))?;
        if self.inner.store.get_subscriber(&user_name).await?.is_none() {
            return Err(AccountingError::UnknownSubscriber(user_name));
        }

        let mut session = self.new_session(session_id, view, nas);
        session.user_name = Some(user_name);
        session.upstream_bytes = delta.upstream;
        session.downstream_bytes = delta.downstream;
        self.inner.ledger.create(&session).await?;

        warn!(
            session_id = %session_id,
            user = session.user_name.as_deref().unwrap_or("-"),
            nas = %nas.address,
            "Recovered unknown session from Interim-Update"
        );
        self.audit(AuditEventType::SessionRecovered, &session, nas).await;
        Ok(Ack::Recorded)
    }

    fn new_session(&self, session_id: &str, view: &AttributeView<'_>, nas: &NasContext) -> OnlineSession {
        let mut session = OnlineSession::new(session_id, nas.address, self.inner.clock.now());
        session.user_name = view.user_name();
        session.ip_address = view.framed_ip();
        session.nas_port_id = view.nas_port_id();
        session.mac_address = view.mac_address(&self.inner.mac_sources);
        session
    }

    async fn audit(&self, event: AuditEventType, session: &OnlineSession, nas: &NasContext) {
        self.inner
            .audit
            .log(AuditEntry::new(event)
                .with_session_id(&session.session_id)
                .with_username(session.user_name.as_deref())
                .with_nas(nas.address, nas.name.as_deref())
                .with_traffic(session.upstream_bytes, session.downstream_bytes))
            .await;
    }
}

fn required_session_id(view: &AttributeView<'_>) -> Result<String, AccountingError> {
    view.session_id()
        .ok_or_else(|| AccountingError::missing("Acct-Session-Id"))
}
