//! RADIUS Protocol Implementation
//!
//! Packet, attribute and accounting primitives for RFC 2865, 2866 and 2869,
//! as needed by an accounting server.
//!
//! # Features
//!
//! - Packet encoding and decoding
//! - Attribute dictionary with canonical names (`"Acct-Input-Octets"`, ...)
//! - Vendor-Specific sub-attribute parsing
//! - Accounting-Request / Accounting-Response authenticators
//!
//! # Example
//!
//! ```rust
//! use radius_proto::{Attribute, AttributeType, Code, Packet};
//! use radius_proto::auth::calculate_accounting_request_authenticator;
//!
//! let mut packet = Packet::new(Code::AccountingRequest, 1, [0u8; 16]);
//! packet.add_attribute(Attribute::integer(AttributeType::AcctStatusType as u8, 1).unwrap());
//! packet.add_attribute(Attribute::string(AttributeType::AcctSessionId as u8, "0001").unwrap());
//! packet.authenticator =
//!     calculate_accounting_request_authenticator(&packet, b"secret").unwrap();
//!
//! let bytes = packet.encode().unwrap();
//! assert_eq!(Packet::decode(&bytes).unwrap().attributes.len(), 2);
//! ```

pub mod accounting;
pub mod attributes;
pub mod auth;
pub mod packet;

pub use accounting::AcctStatusType;
pub use attributes::{Attribute, AttributeType, VendorAttribute};
pub use auth::{
    calculate_accounting_request_authenticator, calculate_response_authenticator,
    generate_request_authenticator, sign_response, verify_accounting_request_authenticator,
    verify_response_authenticator,
};
pub use packet::{Code, Packet, PacketError};
