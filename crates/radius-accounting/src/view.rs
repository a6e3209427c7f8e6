//! Read-only typed access to the attributes of a decoded Accounting-Request

use crate::error::AccountingError;
use radius_proto::{AcctStatusType, Attribute, AttributeType, Packet};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Where to look for the subscriber's MAC address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum MacAddressSource {
    /// Calling-Station-Id (31), the common choice for Ethernet/Wi-Fi access
    CallingStationId,
    /// A Vendor-Specific sub-attribute, either six raw octets or text
    VendorSpecific { vendor_id: u32, vendor_type: u8 },
}

impl MacAddressSource {
    pub fn defaults() -> Vec<MacAddressSource> {
        vec![MacAddressSource::CallingStationId]
    }
}

/// Borrowing view over a packet's attributes
///
/// Absence of an attribute is never an error here; callers decide which
/// attributes are required.
#[derive(Debug, Clone, Copy)]
pub struct AttributeView<'a> {
    packet: &'a Packet,
}

impl<'a> AttributeView<'a> {
    pub fn new(packet: &'a Packet) -> Self {
        AttributeView { packet }
    }

    /// First attribute with the given dictionary name
    pub fn get(&self, name: &str) -> Option<&'a Attribute> {
        AttributeType::from_name(name).and_then(|attr| self.attribute(attr))
    }

    /// Decoded string value by dictionary name
    pub fn get_string(&self, name: &str) -> Option<String> {
        AttributeType::from_name(name).and_then(|attr| self.string(attr))
    }

    /// Raw payload by dictionary name
    pub fn get_bytes(&self, name: &str) -> Option<&'a [u8]> {
        self.get(name).map(|attr| attr.value.as_slice())
    }

    pub fn attribute(&self, attr: AttributeType) -> Option<&'a Attribute> {
        self.packet.find_attribute(attr.as_u8())
    }

    pub fn bytes(&self, attr: AttributeType) -> Option<&'a [u8]> {
        self.attribute(attr).map(|a| a.value.as_slice())
    }

    /// Text value with trailing NULs stripped; empty strings count as absent.
    ///
    /// Framed-IP-Address is rendered in dotted form so that every
    /// identifier-like attribute can be read as a string.
    pub fn string(&self, attr: AttributeType) -> Option<String> {
        let value = self.attribute(attr)?;
        if attr == AttributeType::FramedIpAddress {
            return value.as_ipv4().ok().map(|ip| ip.to_string());
        }
        let text = String::from_utf8_lossy(&value.value);
        let text = text.trim_end_matches('\0');
        if text.is_empty() {
            None
        } else {
            Some(text.to_string())
        }
    }

    /// 32-bit integer value; a present attribute of the wrong width is malformed
    pub fn integer(&self, attr: AttributeType) -> Result<Option<u32>, AccountingError> {
        match self.attribute(attr) {
            None => Ok(None),
            Some(value) => value
                .as_integer()
                .map(Some)
                .map_err(|e| AccountingError::MalformedAttribute {
                    attribute: attr.name(),
                    reason: e.to_string(),
                }),
        }
    }

    /// Acct-Status-Type, mapped onto the five handled transitions
    pub fn status_type(&self) -> Result<AcctStatusType, AccountingError> {
        let attr = AttributeType::AcctStatusType;
        let value = self
            .integer(attr)?
            .ok_or_else(|| AccountingError::missing(attr.name()))?;
        AcctStatusType::from_u32(value).ok_or(AccountingError::UnsupportedStatusType(value))
    }

    pub fn session_id(&self) -> Option<String> {
        self.string(AttributeType::AcctSessionId)
    }

    pub fn user_name(&self) -> Option<String> {
        self.string(AttributeType::UserName)
    }

    pub fn nas_port_id(&self) -> Option<String> {
        self.string(AttributeType::NasPortId)
    }

    /// Framed-IP-Address; a malformed value is treated as absent
    pub fn framed_ip(&self) -> Option<IpAddr> {
        self.attribute(AttributeType::FramedIpAddress)
            .and_then(|attr| attr.as_ipv4().ok())
            .map(IpAddr::V4)
    }

    /// MAC address from the first source that yields a well-formed value
    pub fn mac_address(&self, sources: &[MacAddressSource]) -> Option<String> {
        sources.iter().find_map(|source| match source {
            MacAddressSource::CallingStationId => {
                self.bytes(AttributeType::CallingStationId).and_then(normalize_mac)
            }
            MacAddressSource::VendorSpecific {
                vendor_id,
                vendor_type,
            } => self
                .packet
                .find_all_attributes(AttributeType::VendorSpecific.as_u8())
                .into_iter()
                .filter_map(|attr| attr.vendor_attributes().ok())
                .flatten()
                .find(|sub| sub.vendor_id == *vendor_id && sub.vendor_type == *vendor_type)
                .and_then(|sub| normalize_mac(sub.value)),
        })
    }
}

/// Normalise a MAC to lowercase colon-separated form.
///
/// Accepts six raw octets or text with exactly twelve hex digits in any of
/// the usual separator styles (`AA-BB-..`, `aabb.ccdd.eeff`, `AABBCCDDEEFF`).
fn normalize_mac(raw: &[u8]) -> Option<String> {
    let octets: Vec<u8> = if raw.len() == 6 && !raw.iter().all(u8::is_ascii_hexdigit) {
        raw.to_vec()
    } else {
        let text = std::str::from_utf8(raw).ok()?;
        let digits: Vec<u8> = text
            .bytes()
            .filter(|b| !matches!(b, b':' | b'-' | b'.' | b' ' | 0))
            .collect();
        if digits.len() != 12 {
            return None;
        }
        digits
            .chunks(2)
            .map(|pair| {
                std::str::from_utf8(pair)
                    .ok()
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok())
            })
            .collect::<Option<Vec<u8>>>()?
    };

    Some(
        octets
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<Vec<_>>()
            .join(":"),
    )
}
