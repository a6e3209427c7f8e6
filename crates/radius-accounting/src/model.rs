//! Rows owned by the accounting subsystem

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::sync::Mutex;

/// One currently-connected subscriber session, keyed by Acct-Session-Id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnlineSession {
    pub session_id: String,
    pub nas_address: IpAddr,
    /// Unknown until a packet carrying User-Name is seen
    pub user_name: Option<String>,
    pub ip_address: Option<IpAddr>,
    pub nas_port_id: Option<String>,
    pub mac_address: Option<String>,
    /// Server-assigned, never taken from the NAS
    pub start_time: DateTime<Utc>,
    pub upstream_bytes: u64,
    pub downstream_bytes: u64,
}

impl OnlineSession {
    pub fn new(session_id: impl Into<String>, nas_address: IpAddr, start_time: DateTime<Utc>) -> Self {
        OnlineSession {
            session_id: session_id.into(),
            nas_address,
            user_name: None,
            ip_address: None,
            nas_port_id: None,
            mac_address: None,
            start_time,
            upstream_bytes: 0,
            downstream_bytes: 0,
        }
    }
}

/// How a session came to be closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// Acct-Status-Type = Stop
    Stop,
    /// Forced close after Accounting-On/Off from the NAS
    Reconciled,
}

impl CloseReason {
    pub fn as_str(self) -> &'static str {
        match self {
            CloseReason::Stop => "stop",
            CloseReason::Reconciled => "reconciled",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable usage-history row, one per closed session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageLog {
    pub session_id: String,
    pub user_name: Option<String>,
    pub start_time: DateTime<Utc>,
    pub stop_time: DateTime<Utc>,
    pub used_duration_secs: u64,
    pub total_upstream_bytes: u64,
    pub total_downstream_bytes: u64,
    pub nas_address: IpAddr,
    pub ip_address: Option<IpAddr>,
    pub mac_address: Option<String>,
    pub close_reason: CloseReason,
}

/// Remaining allowance of one subscriber
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberQuota {
    pub user_name: String,
    /// Remaining bytes
    pub available_flow: i64,
    /// Remaining seconds
    pub available_time: i64,
}

impl SubscriberQuota {
    pub fn new(user_name: impl Into<String>, available_flow: i64, available_time: i64) -> Self {
        SubscriberQuota {
            user_name: user_name.into(),
            available_flow,
            available_time,
        }
    }

    /// Subtract usage from both balances, flooring each at zero
    pub fn debit(&mut self, flow: u64, time: u64) {
        self.available_flow = floor_sub(self.available_flow, flow);
        self.available_time = floor_sub(self.available_time, time);
    }
}

fn floor_sub(balance: i64, amount: u64) -> i64 {
    let amount = i64::try_from(amount).unwrap_or(i64::MAX);
    balance.max(0).saturating_sub(amount).max(0)
}

/// The device an Accounting-Request came from
#[derive(Clone)]
pub struct NasContext {
    pub address: IpAddr,
    /// Only used for the authenticator steps, never by the accounting core
    pub secret: Vec<u8>,
    pub name: Option<String>,
}

impl NasContext {
    pub fn new(address: IpAddr, secret: impl Into<Vec<u8>>) -> Self {
        NasContext {
            address,
            secret: secret.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl fmt::Debug for NasContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NasContext")
            .field("address", &self.address)
            .field("secret", &"<redacted>")
            .field("name", &self.name)
            .finish()
    }
}

/// Time source for session start/stop stamps
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock, truncated to whole seconds
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        let now = Utc::now();
        DateTime::from_timestamp(now.timestamp(), 0).unwrap_or(now)
    }
}

/// Manually advanced clock for tests and replay tools
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        ManualClock {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}
