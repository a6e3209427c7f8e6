//! Audit trail for accounting events
//!
//! One JSON object per line. Every session open/close, recovered or
//! reconciled session and dropped request is written here when an audit
//! log path is configured.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::error;

/// Audit event type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    SessionStart,
    SessionStop,
    InterimUpdate,
    /// Interim-Update recreated a session the ledger had lost
    SessionRecovered,
    /// Session force-closed by Accounting-On/Off
    SessionReconciled,
    ReconcileCompleted,
    /// Request not acknowledged (malformed, bad authenticator, persistence failure)
    RequestDropped,
    UnauthorizedClient,
    ServerStart,
}

/// Audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: String,
    pub event_type: AuditEventType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nas_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nas_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downstream_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub server_version: String,
}

impl AuditEntry {
    pub fn new(event_type: AuditEventType) -> Self {
        Self::at(Utc::now(), event_type)
    }

    pub fn at(timestamp: DateTime<Utc>, event_type: AuditEventType) -> Self {
        AuditEntry {
            timestamp: timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            event_type,
            session_id: None,
            username: None,
            nas_ip: None,
            nas_name: None,
            request_id: None,
            upstream_bytes: None,
            downstream_bytes: None,
            duration_secs: None,
            details: None,
            server_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_username(mut self, username: Option<&str>) -> Self {
        self.username = username.map(str::to_string);
        self
    }

    pub fn with_nas(mut self, ip: IpAddr, name: Option<&str>) -> Self {
        self.nas_ip = Some(ip.to_string());
        self.nas_name = name.map(str::to_string);
        self
    }

    pub fn with_request_id(mut self, id: u8) -> Self {
        self.request_id = Some(id);
        self
    }

    /// Byte totals in both directions
    pub fn with_traffic(mut self, upstream: u64, downstream: u64) -> Self {
        self.upstream_bytes = Some(upstream);
        self.downstream_bytes = Some(downstream);
        self
    }

    pub fn with_duration(mut self, secs: u64) -> Self {
        self.duration_secs = Some(secs);
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Append-only JSON-lines audit writer; a no-op when disabled
#[derive(Debug, Default)]
pub struct AuditLogger {
    file_path: Option<PathBuf>,
    file: Option<Mutex<std::fs::File>>,
}

impl AuditLogger {
    /// Open (or create) the audit file; `None` disables auditing
    pub fn new(file_path: Option<impl AsRef<Path>>) -> std::io::Result<Self> {
        match file_path {
            Some(path) => {
                let path = path.as_ref().to_path_buf();
                let file = OpenOptions::new().create(true).append(true).open(&path)?;
                Ok(AuditLogger {
                    file_path: Some(path),
                    file: Some(Mutex::new(file)),
                })
            }
            None => Ok(AuditLogger::disabled()),
        }
    }

    pub fn disabled() -> Self {
        AuditLogger::default()
    }

    pub async fn log(&self, entry: AuditEntry) {
        let Some(file) = &self.file else {
            return;
        };
        match serde_json::to_string(&entry) {
            Ok(json) => {
                let mut f = file.lock().await;
                if let Err(e) = writeln!(f, "{}", json) {
                    error!("Failed to write audit log: {}", e);
                }
            }
            Err(e) => error!("Failed to serialize audit entry: {}", e),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.file.is_some()
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }
}
