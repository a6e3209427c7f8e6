//! Error types for the accounting core

use crate::store::StoreError;
use thiserror::Error;

/// Why an Accounting-Request was not acknowledged
///
/// None of these abort the worker handling the packet; the transport logs
/// the error and leaves recovery to the NAS's retransmission timer.
#[derive(Debug, Error)]
pub enum AccountingError {
    /// A required attribute is missing or a value cannot be parsed
    #[error("Malformed attribute {attribute}: {reason}")]
    MalformedAttribute {
        attribute: &'static str,
        reason: String,
    },

    /// Acct-Status-Type outside Start/Stop/Interim-Update/Accounting-On/Off
    #[error("Unsupported Acct-Status-Type value: {0}")]
    UnsupportedStatusType(u32),

    /// Stop (or a counter update) for a session that is not online
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Interim-Update for an unknown session that carries no User-Name
    #[error("Cannot resolve user for session {0}")]
    UnresolvedSession(String),

    /// Interim-Update for an unknown session whose user is not a subscriber
    #[error("Unknown subscriber: {0}")]
    UnknownSubscriber(String),

    /// Start for a session that is already online
    #[error("Duplicate session start: {0}")]
    DuplicateSession(String),

    /// Any storage failure
    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),
}

impl AccountingError {
    pub(crate) fn missing(attribute: &'static str) -> Self {
        AccountingError::MalformedAttribute {
            attribute,
            reason: "attribute is missing".to_string(),
        }
    }
}
