//! RADIUS Accounting Protocol Support (RFC 2866)
//!
//! # Accounting Status Types
//!
//! - **Start**: Session has started (e.g., user logged in)
//! - **Stop**: Session has ended (e.g., user logged out)
//! - **Interim-Update**: Periodic update during an active session
//! - **Accounting-On**: NAS has (re)booted and starts accounting
//! - **Accounting-Off**: NAS is about to stop accounting, usually before a reboot
//!
//! # Example
//!
//! ```rust
//! use radius_proto::accounting::AcctStatusType;
//!
//! assert_eq!(AcctStatusType::Start.as_u32(), 1);
//! assert_eq!(AcctStatusType::from_u32(3), Some(AcctStatusType::InterimUpdate));
//! assert_eq!(AcctStatusType::from_u32(9), None);
//! ```

use std::fmt;

/// Accounting Status-Type values (RFC 2866 Section 5.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum AcctStatusType {
    /// Start (1) - Session has begun
    Start = 1,
    /// Stop (2) - Session has ended
    Stop = 2,
    /// Interim-Update (3) - Periodic update during session
    InterimUpdate = 3,
    /// Accounting-On (7) - NAS is ready
    AccountingOn = 7,
    /// Accounting-Off (8) - NAS is shutting down
    AccountingOff = 8,
}

impl AcctStatusType {
    /// Convert from the wire value. Values outside the five handled
    /// status types (including the RFC 2866 "Failed" and tunnel values)
    /// yield `None`.
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(AcctStatusType::Start),
            2 => Some(AcctStatusType::Stop),
            3 => Some(AcctStatusType::InterimUpdate),
            7 => Some(AcctStatusType::AccountingOn),
            8 => Some(AcctStatusType::AccountingOff),
            _ => None,
        }
    }

    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Start, Stop and Interim-Update refer to one session
    pub fn is_session_status(self) -> bool {
        matches!(
            self,
            AcctStatusType::Start | AcctStatusType::Stop | AcctStatusType::InterimUpdate
        )
    }

    /// Accounting-On and Accounting-Off refer to the whole NAS
    pub fn is_nas_status(self) -> bool {
        matches!(
            self,
            AcctStatusType::AccountingOn | AcctStatusType::AccountingOff
        )
    }
}

impl fmt::Display for AcctStatusType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AcctStatusType::Start => "Start",
            AcctStatusType::Stop => "Stop",
            AcctStatusType::InterimUpdate => "Interim-Update",
            AcctStatusType::AccountingOn => "Accounting-On",
            AcctStatusType::AccountingOff => "Accounting-Off",
        };
        f.write_str(name)
    }
}
