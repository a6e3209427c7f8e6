//! End-to-end session lifecycle tests against the accounting service
//!
//! These tests drive `AccountingService::handle_accounting` with decoded
//! packets and check the resulting store state:
//! - Start / Interim-Update / Stop round trips
//! - Gigaword counter handling
//! - Concurrent updates of one session
//! - Accounting-On/Off reconciliation, including transient store failures

use async_trait::async_trait;
use chrono::DateTime;
use radius_accounting::{
    AccountingOptions, AccountingService, AccountingStore, Ack, CloseReason, ManualClock, MemoryStore,
    NasContext, OnlineSession, QuotaDebitPolicy, RetryPolicy, StoreError, SubscriberQuota, UsageLog,
};
use radius_proto::{Attribute, AttributeType, Code, Packet};
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Store write that `FlakyStore` fails
#[derive(Clone, Copy, PartialEq, Eq)]
enum FailingWrite {
    UsageLog,
    DeleteSession,
}

/// Store wrapper that fails one kind of write for one session a fixed number of times
struct FlakyStore {
    inner: MemoryStore,
    write: FailingWrite,
    failing_session: String,
    failures_left: AtomicU32,
}

impl FlakyStore {
    fn new(inner: MemoryStore, failing_session: &str, failures: u32) -> Self {
        Self::failing(inner, FailingWrite::UsageLog, failing_session, failures)
    }

    fn failing(inner: MemoryStore, write: FailingWrite, failing_session: &str, failures: u32) -> Self {
        FlakyStore {
            inner,
            write,
            failing_session: failing_session.to_string(),
            failures_left: AtomicU32::new(failures),
        }
    }

    fn should_fail(&self, write: FailingWrite, session_id: &str) -> bool {
        write == self.write
            && session_id == self.failing_session
            && self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
    }
}

#[async_trait]
impl AccountingStore for FlakyStore {
    async fn insert_session(&self, session: &OnlineSession) -> Result<(), StoreError> {
        self.inner.insert_session(session).await
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<OnlineSession>, StoreError> {
        self.inner.get_session(session_id).await
    }

    async fn update_session_counters(&self, session_id: &str, up: u64, down: u64) -> Result<bool, StoreError> {
        self.inner.update_session_counters(session_id, up, down).await
    }

    async fn update_session_user(&self, session_id: &str, user_name: &str) -> Result<bool, StoreError> {
        self.inner.update_session_user(session_id, user_name).await
    }

    async fn delete_session(&self, session_id: &str) -> Result<bool, StoreError> {
        if self.should_fail(FailingWrite::DeleteSession, session_id) {
            return Err(StoreError::Backend("connection reset".to_string()));
        }
        self.inner.delete_session(session_id).await
    }

    async fn sessions_for_nas(&self, nas_address: IpAddr) -> Result<Vec<OnlineSession>, StoreError> {
        self.inner.sessions_for_nas(nas_address).await
    }

    async fn insert_usage_log(&self, log: &UsageLog) -> Result<(), StoreError> {
        if self.should_fail(FailingWrite::UsageLog, &log.session_id) {
            return Err(StoreError::Backend("connection reset".to_string()));
        }
        self.inner.insert_usage_log(log).await
    }

    async fn get_subscriber(&self, user_name: &str) -> Result<Option<SubscriberQuota>, StoreError> {
        self.inner.get_subscriber(user_name).await
    }

    async fn debit_quota(&self, user_name: &str, flow: u64, time: u64) -> Result<Option<SubscriberQuota>, StoreError> {
        self.inner.debit_quota(user_name, flow, time).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
    }
}

fn nas_context(addr: &str) -> NasContext {
    NasContext::new(addr.parse().unwrap(), "testing123")
}

fn options(policy: QuotaDebitPolicy) -> AccountingOptions {
    AccountingOptions {
        quota_debit_policy: policy,
        retry: RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_millis(1),
        },
        ..AccountingOptions::default()
    }
}

fn accounting_request(status: u32, session_id: &str, attrs: Vec<Attribute>) -> Packet {
    let mut packet = Packet::new(Code::AccountingRequest, 1, [0u8; 16]);
    packet.add_attribute(Attribute::integer(AttributeType::AcctStatusType as u8, status).unwrap());
    packet.add_attribute(Attribute::string(AttributeType::AcctSessionId as u8, session_id).unwrap());
    for attr in attrs {
        packet.add_attribute(attr);
    }
    packet
}

fn start(session_id: &str, user: &str) -> Packet {
    accounting_request(
        1,
        session_id,
        vec![
            Attribute::string(AttributeType::UserName as u8, user).unwrap(),
            Attribute::ipv4(AttributeType::FramedIpAddress as u8, "100.64.0.10".parse().unwrap()).unwrap(),
        ],
    )
}

fn traffic(status: u32, session_id: &str, up: u64, down: u64) -> Packet {
    accounting_request(
        status,
        session_id,
        vec![
            Attribute::integer(AttributeType::AcctInputOctets as u8, up as u32).unwrap(),
            Attribute::integer(AttributeType::AcctInputGigawords as u8, (up >> 32) as u32).unwrap(),
            Attribute::integer(AttributeType::AcctOutputOctets as u8, down as u32).unwrap(),
            Attribute::integer(AttributeType::AcctOutputGigawords as u8, (down >> 32) as u32).unwrap(),
        ],
    )
}

fn nas_status(status: u32) -> Packet {
    let mut packet = Packet::new(Code::AccountingRequest, 1, [0u8; 16]);
    packet.add_attribute(Attribute::integer(AttributeType::AcctStatusType as u8, status).unwrap());
    packet
}

#[tokio::test]
async fn test_full_session_round_trip() {
    let store = Arc::new(MemoryStore::new());
    store
        .add_subscriber(SubscriberQuota::new("alice", 100 * 1024 * 1024 * 1024, 86_400))
        .await;
    let clock = Arc::new(ManualClock::new(DateTime::from_timestamp(1_700_000_000, 0).unwrap()));
    let service = AccountingService::builder(store.clone())
        .options(options(QuotaDebitPolicy::Total))
        .clock(clock.clone())
        .build();
    let nas = nas_context("10.0.0.1");

    service.handle_accounting(&start("sess-1", "alice"), &nas).await.unwrap();

    // Second interim crosses the 32-bit boundary
    let deltas = [(1_000u64, 2_000u64), (5_000_000_000, 7_000_000_000), (10, 20)];
    for (up, down) in deltas {
        clock.advance(chrono::Duration::seconds(300));
        service
            .handle_accounting(&traffic(3, "sess-1", up, down), &nas)
            .await
            .unwrap();
    }
    let expected_up = 1_000 + 5_000_000_000 + 10;
    let expected_down = 2_000 + 7_000_000_000 + 20;

    // Stop reports the final totals
    clock.advance(chrono::Duration::seconds(100));
    let ack = service
        .handle_accounting(&traffic(2, "sess-1", expected_up, expected_down), &nas)
        .await
        .unwrap();
    assert_eq!(ack, Ack::Recorded);

    let logs = store.usage_logs().await;
    assert_eq!(logs.len(), 1);
    let log = &logs[0];
    assert_eq!(log.session_id, "sess-1");
    assert_eq!(log.user_name.as_deref(), Some("alice"));
    assert_eq!(log.total_upstream_bytes, expected_up);
    assert_eq!(log.total_downstream_bytes, expected_down);
    assert_eq!(log.used_duration_secs, 1_000);
    assert_eq!(log.ip_address, Some("100.64.0.10".parse().unwrap()));
    assert_eq!(log.close_reason, CloseReason::Stop);

    let quota = store.get_subscriber("alice").await.unwrap().unwrap();
    assert_eq!(
        quota.available_flow,
        100 * 1024 * 1024 * 1024 - (expected_up + expected_down) as i64
    );
    assert_eq!(quota.available_time, 86_400 - 1_000);
    assert_eq!(store.session_count().await, 0);
}

#[tokio::test]
async fn test_net_policy_debits_downstream_minus_upstream() {
    let store = Arc::new(MemoryStore::new());
    store.add_subscriber(SubscriberQuota::new("bob", 10_000, 1_000)).await;
    let service = AccountingService::new(store.clone(), options(QuotaDebitPolicy::Net));
    let nas = nas_context("10.0.0.1");

    service.handle_accounting(&start("s", "bob"), &nas).await.unwrap();
    service.handle_accounting(&traffic(2, "s", 1_000, 4_000), &nas).await.unwrap();

    let quota = store.get_subscriber("bob").await.unwrap().unwrap();
    assert_eq!(quota.available_flow, 7_000);
}

#[tokio::test]
async fn test_settlement_never_goes_negative() {
    let store = Arc::new(MemoryStore::new());
    store.add_subscriber(SubscriberQuota::new("carol", 0, 0)).await;
    let service = AccountingService::new(store.clone(), options(QuotaDebitPolicy::Total));
    let nas = nas_context("10.0.0.1");

    service.handle_accounting(&start("s", "carol"), &nas).await.unwrap();
    service.handle_accounting(&traffic(2, "s", 5_000, 5_000), &nas).await.unwrap();

    let quota = store.get_subscriber("carol").await.unwrap().unwrap();
    assert_eq!(quota.available_flow, 0);
    assert_eq!(quota.available_time, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_interim_updates_are_not_lost() {
    let store = Arc::new(MemoryStore::new());
    let service = AccountingService::new(store.clone(), options(QuotaDebitPolicy::Total));
    let nas = nas_context("10.0.0.1");
    service.handle_accounting(&start("busy", "alice"), &nas).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..50 {
        let service = service.clone();
        let nas = nas.clone();
        handles.push(tokio::spawn(async move {
            service
                .handle_accounting(&traffic(3, "busy", 10, 100), &nas)
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let session = store.get_session("busy").await.unwrap().unwrap();
    assert_eq!(session.upstream_bytes, 500);
    assert_eq!(session.downstream_bytes, 5_000);
}

#[tokio::test]
async fn test_accounting_on_survives_transient_failure() {
    let memory = MemoryStore::new();
    let store = Arc::new(FlakyStore::new(memory.clone(), "s2", 1));
    let service = AccountingService::new(store, options(QuotaDebitPolicy::Total));
    let mut reports = service.take_reconcile_reports().unwrap();
    let nas = nas_context("10.0.0.1");
    let other_nas = nas_context("10.0.0.2");

    for id in ["s1", "s2", "s3"] {
        service.handle_accounting(&start(id, "alice"), &nas).await.unwrap();
        service.handle_accounting(&traffic(3, id, 100, 200), &nas).await.unwrap();
    }
    service.handle_accounting(&start("elsewhere", "bob"), &other_nas).await.unwrap();

    let ack = service.handle_accounting(&nas_status(7), &nas).await.unwrap();
    assert_eq!(ack, Ack::ReconcileScheduled);

    let report = tokio::time::timeout(Duration::from_secs(5), reports.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.nas, nas.address);
    assert_eq!(report.settled, 3);
    assert!(report.is_clean());

    let logs = memory.usage_logs().await;
    assert_eq!(logs.len(), 3);
    assert!(logs.iter().all(|log| log.close_reason == CloseReason::Reconciled));
    assert!(logs.iter().all(|log| log.total_upstream_bytes == 100));
    assert_eq!(memory.session_count().await, 1);
    assert!(memory.get_session("elsewhere").await.unwrap().is_some());
}

#[tokio::test]
async fn test_reconcile_skips_session_after_retries() {
    let memory = MemoryStore::new();
    let store = Arc::new(FlakyStore::new(memory.clone(), "stuck", 10));
    let service = AccountingService::new(store, options(QuotaDebitPolicy::Total));
    let nas = nas_context("10.0.0.1");

    service.handle_accounting(&start("ok", "alice"), &nas).await.unwrap();
    service.handle_accounting(&start("stuck", "alice"), &nas).await.unwrap();

    let report = service.reconcile_nas(nas.address).await.unwrap();
    assert_eq!(report.settled, 1);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].session_id, "stuck");

    // Unsettled session stays online for a later retry
    assert!(memory.get_session("stuck").await.unwrap().is_some());
    assert!(memory.get_session("ok").await.unwrap().is_none());
}

#[tokio::test]
async fn test_failed_stop_keeps_session_for_retry() {
    let memory = MemoryStore::new();
    let store = Arc::new(FlakyStore::new(memory.clone(), "s", 1));
    let service = AccountingService::new(store, options(QuotaDebitPolicy::Total));
    let nas = nas_context("10.0.0.1");
    service.handle_accounting(&start("s", "alice"), &nas).await.unwrap();

    let stop = traffic(2, "s", 10, 10);
    assert!(service.handle_accounting(&stop, &nas).await.is_err());
    assert!(memory.get_session("s").await.unwrap().is_some());

    // NAS retransmits the Stop
    assert_eq!(service.handle_accounting(&stop, &nas).await.unwrap(), Ack::Recorded);
    assert!(memory.get_session("s").await.unwrap().is_none());
    assert_eq!(memory.usage_logs().await.len(), 1);
}

#[tokio::test]
async fn test_accounting_off_with_no_sessions() {
    let store = Arc::new(MemoryStore::new());
    let service = AccountingService::new(store, options(QuotaDebitPolicy::Total));
    let mut reports = service.take_reconcile_reports().unwrap();

    service.handle_accounting(&nas_status(8), &nas_context("10.0.0.9")).await.unwrap();
    let report = reports.recv().await.unwrap();
    assert_eq!(report.settled, 0);
    assert_eq!(report.already_closed, 0);
}

#[tokio::test]
async fn test_failed_delete_does_not_settle_twice() {
    let memory = MemoryStore::new();
    memory.add_subscriber(SubscriberQuota::new("alice", 10_000, 10_000)).await;
    let store = Arc::new(FlakyStore::failing(memory.clone(), FailingWrite::DeleteSession, "s", 1));
    let service = AccountingService::new(store, options(QuotaDebitPolicy::Total));
    let nas = nas_context("10.0.0.1");
    service.handle_accounting(&start("s", "alice"), &nas).await.unwrap();

    let stop = traffic(2, "s", 100, 100);
    assert!(service.handle_accounting(&stop, &nas).await.is_err());
    assert_eq!(memory.usage_logs().await.len(), 1);

    // NAS retransmits the unacknowledged Stop
    assert_eq!(service.handle_accounting(&stop, &nas).await.unwrap(), Ack::Duplicate);
    assert_eq!(memory.usage_logs().await.len(), 1);
    assert_eq!(memory.session_count().await, 0);
    let quota = memory.get_subscriber("alice").await.unwrap().unwrap();
    assert_eq!(quota.available_flow, 9_800);
}

#[tokio::test]
async fn test_reconcile_failed_delete_does_not_settle_twice() {
    let memory = MemoryStore::new();
    memory.add_subscriber(SubscriberQuota::new("alice", 10_000, 10_000)).await;
    let store = Arc::new(FlakyStore::failing(memory.clone(), FailingWrite::DeleteSession, "s", 1));
    let service = AccountingService::new(store, options(QuotaDebitPolicy::Total));
    let nas = nas_context("10.0.0.1");
    service.handle_accounting(&start("s", "alice"), &nas).await.unwrap();
    service.handle_accounting(&traffic(3, "s", 100, 100), &nas).await.unwrap();

    let report = service.reconcile_nas(nas.address).await.unwrap();
    assert!(report.is_clean());
    assert_eq!(memory.usage_logs().await.len(), 1);
    assert_eq!(memory.session_count().await, 0);
    let quota = memory.get_subscriber("alice").await.unwrap().unwrap();
    assert_eq!(quota.available_flow, 9_800);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stop_racing_interim_updates() {
    let store = Arc::new(MemoryStore::new());
    store.add_subscriber(SubscriberQuota::new("alice", 1_000_000, 1_000_000)).await;
    let service = AccountingService::new(store.clone(), options(QuotaDebitPolicy::Total));
    let nas = nas_context("10.0.0.1");

    for round in 0..20 {
        let session_id = format!("race-{}", round);
        service.handle_accounting(&start(&session_id, "alice"), &nas).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let service = service.clone();
            let nas = nas.clone();
            let session_id = session_id.clone();
            handles.push(tokio::spawn(async move {
                if i == 4 {
                    service.handle_accounting(&traffic(2, &session_id, 0, 0), &nas).await
                } else {
                    // User-Name present, so a lost session could self-heal
                    let mut interim = traffic(3, &session_id, 10, 10);
                    interim.add_attribute(Attribute::string(AttributeType::UserName as u8, "alice").unwrap());
                    service.handle_accounting(&interim, &nas).await
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert!(store.get_session(&session_id).await.unwrap().is_none());
    }

    assert_eq!(store.session_count().await, 0);
    assert_eq!(store.usage_logs().await.len(), 20);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reconcile_racing_stop() {
    let store = Arc::new(MemoryStore::new());
    let service = AccountingService::new(store.clone(), options(QuotaDebitPolicy::Total));
    let nas = nas_context("10.0.0.1");

    for round in 0..20 {
        let session_id = format!("race-{}", round);
        service.handle_accounting(&start(&session_id, "alice"), &nas).await.unwrap();

        let stopper = {
            let service = service.clone();
            let nas = nas.clone();
            let stop = traffic(2, &session_id, 1, 1);
            tokio::spawn(async move { service.handle_accounting(&stop, &nas).await })
        };
        let reconciler = {
            let service = service.clone();
            let address = nas.address;
            tokio::spawn(async move { service.reconcile_nas(address).await })
        };

        let ack = stopper.await.unwrap().unwrap();
        let report = reconciler.await.unwrap().unwrap();
        assert!(report.settled + report.already_closed <= 1);
        assert!(report.is_clean());
        match ack {
            Ack::Recorded => assert_eq!(report.settled, 0),
            Ack::Duplicate => assert_eq!(report.settled, 1),
            other => panic!("unexpected ack: {:?}", other),
        }
    }

    assert_eq!(store.session_count().await, 0);
    let logs = store.usage_logs().await;
    assert_eq!(logs.len(), 20);
}
