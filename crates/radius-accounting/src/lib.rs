//! RADIUS Accounting Server Implementation
//!
//! Keeps the table of online subscriber sessions from RFC 2866
//! Accounting-Request traffic, settles closed sessions into usage logs and
//! debits subscriber quotas. Built on top of the `radius-proto` protocol
//! implementation.
//!
//! # Features
//!
//! - Start / Interim-Update / Stop session lifecycle with 64-bit
//!   (gigaword-corrected) traffic counters
//! - Recovery of sessions whose Start was lost
//! - Accounting-On/Off bulk reconciliation in supervised background tasks
//! - Per-session serialization and duplicate suppression
//! - In-memory and PostgreSQL stores
//! - UDP listener with reply replay for retransmissions, JSON configuration,
//!   audit trail
//!
//! # Example
//!
//! ```rust,no_run
//! use radius_accounting::{
//!     AccountingOptions, AccountingServer, AccountingService, Config, MemoryStore, ServerConfig,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = AccountingService::new(Arc::new(MemoryStore::new()), AccountingOptions::default());
//!     let config = ServerConfig::new("0.0.0.0:1813".parse()?, Config::default());
//!
//!     let server = AccountingServer::new(config, service).await?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod audit;
pub mod cache;
pub mod config;
pub mod counters;
pub mod error;
pub mod ledger;
pub mod locks;
pub mod model;
pub mod reconcile;
pub mod server;
pub mod service;
pub mod settlement;
pub mod store;
pub mod view;

pub use audit::{AuditEntry, AuditEventType, AuditLogger};
pub use cache::{RequestFingerprint, TtlCache};
pub use config::{Client, Config, ConfigError};
pub use counters::{CounterDirection, TrafficCounters, decode_counter};
pub use error::AccountingError;
pub use ledger::SessionLedger;
pub use locks::{SessionGuard, SessionLocks};
pub use model::{
    Clock, CloseReason, ManualClock, NasContext, OnlineSession, SubscriberQuota, SystemClock, UsageLog,
};
pub use reconcile::{BulkReconciler, ReconcileReport, RetryPolicy, SessionFailure};
pub use server::{AccountingServer, CachedReply, ServerConfig, ServerError};
pub use service::{AccountingOptions, AccountingService, AccountingServiceBuilder, Ack};
pub use settlement::{QuotaDebitPolicy, UsageSettlement};
pub use store::{AccountingStore, MemoryStore, PostgresStore, StoreError};
pub use view::{AttributeView, MacAddressSource};
