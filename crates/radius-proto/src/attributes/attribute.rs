use crate::packet::PacketError;
use std::net::Ipv4Addr;

/// RADIUS Attribute structure as defined in RFC 2865 Section 5
///
/// ```text
///  0                   1                   2
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |     Type      |    Length     |  Value ...
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Attribute type (1 byte)
    pub attr_type: u8,
    /// Attribute value (0-253 bytes)
    pub value: Vec<u8>,
}

impl Attribute {
    /// Minimum attribute length (type + length fields = 2 bytes)
    pub const MIN_LENGTH: usize = 2;
    /// Maximum attribute length (255 bytes including type and length)
    pub const MAX_LENGTH: usize = 255;
    /// Maximum value length (253 bytes)
    pub const MAX_VALUE_LENGTH: usize = 253;

    pub fn new(attr_type: u8, value: Vec<u8>) -> Result<Self, PacketError> {
        if value.len() > Self::MAX_VALUE_LENGTH {
            return Err(PacketError::AttributeError(format!(
                "Attribute value too long: {} bytes (max {})",
                value.len(),
                Self::MAX_VALUE_LENGTH
            )));
        }
        Ok(Attribute { attr_type, value })
    }

    /// Create a string attribute
    pub fn string(attr_type: u8, value: impl Into<String>) -> Result<Self, PacketError> {
        Self::new(attr_type, value.into().into_bytes())
    }

    /// Create an integer attribute (32-bit big-endian)
    pub fn integer(attr_type: u8, value: u32) -> Result<Self, PacketError> {
        Self::new(attr_type, value.to_be_bytes().to_vec())
    }

    /// Create an IPv4 address attribute
    pub fn ipv4(attr_type: u8, value: Ipv4Addr) -> Result<Self, PacketError> {
        Self::new(attr_type, value.octets().to_vec())
    }

    /// Create a Vendor-Specific (26) attribute carrying a single sub-attribute
    pub fn vendor_specific(
        vendor_id: u32,
        vendor_type: u8,
        value: &[u8],
    ) -> Result<Self, PacketError> {
        if value.len() > Self::MAX_VALUE_LENGTH - 6 {
            return Err(PacketError::AttributeError(format!(
                "Vendor attribute value too long: {} bytes",
                value.len()
            )));
        }
        let mut payload = Vec::with_capacity(6 + value.len());
        payload.extend_from_slice(&vendor_id.to_be_bytes());
        payload.push(vendor_type);
        payload.push((value.len() + 2) as u8);
        payload.extend_from_slice(value);
        Self::new(VENDOR_SPECIFIC, payload)
    }

    /// Encode attribute to bytes
    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        let length = self.encoded_length();
        if length > Self::MAX_LENGTH {
            return Err(PacketError::AttributeError(format!(
                "Encoded attribute too long: {} bytes",
                length
            )));
        }

        let mut buffer = Vec::with_capacity(length);
        buffer.push(self.attr_type);
        buffer.push(length as u8);
        buffer.extend_from_slice(&self.value);
        Ok(buffer)
    }

    /// Decode one attribute from the front of `data`
    pub fn decode(data: &[u8]) -> Result<Self, PacketError> {
        let [attr_type, length, ..] = *data else {
            return Err(PacketError::AttributeError(format!(
                "Attribute data too short: {} bytes",
                data.len()
            )));
        };
        let length = length as usize;

        if length < Self::MIN_LENGTH {
            return Err(PacketError::AttributeError(format!(
                "Invalid attribute length: {}",
                length
            )));
        }

        if data.len() < length {
            return Err(PacketError::AttributeError(format!(
                "Insufficient data for attribute: expected {}, got {}",
                length,
                data.len()
            )));
        }

        Ok(Attribute {
            attr_type,
            value: data[Self::MIN_LENGTH..length].to_vec(),
        })
    }

    /// Get the encoded length of this attribute
    pub fn encoded_length(&self) -> usize {
        Self::MIN_LENGTH + self.value.len()
    }

    /// Try to interpret value as a string
    pub fn as_string(&self) -> Result<String, std::string::FromUtf8Error> {
        String::from_utf8(self.value.clone())
    }

    /// Try to interpret value as an integer (32-bit big-endian)
    pub fn as_integer(&self) -> Result<u32, PacketError> {
        let bytes: [u8; 4] = self.value.as_slice().try_into().map_err(|_| {
            PacketError::AttributeError(format!(
                "Expected 4 bytes for integer, got {}",
                self.value.len()
            ))
        })?;
        Ok(u32::from_be_bytes(bytes))
    }

    /// Try to interpret value as an IPv4 address
    pub fn as_ipv4(&self) -> Result<Ipv4Addr, PacketError> {
        let bytes: [u8; 4] = self.value.as_slice().try_into().map_err(|_| {
            PacketError::AttributeError(format!(
                "Expected 4 bytes for IPv4, got {}",
                self.value.len()
            ))
        })?;
        Ok(Ipv4Addr::from(bytes))
    }

    /// Split a Vendor-Specific attribute into its sub-attributes (RFC 2865 Section 5.26)
    ///
    /// ```text
    /// | Vendor-Id (4) | Vendor type (1) | Vendor length (1) | Attribute-Specific ...
    /// ```
    pub fn vendor_attributes(&self) -> Result<Vec<VendorAttribute<'_>>, PacketError> {
        if self.attr_type != VENDOR_SPECIFIC {
            return Err(PacketError::AttributeError(format!(
                "Attribute {} is not Vendor-Specific",
                self.attr_type
            )));
        }
        if self.value.len() < 4 {
            return Err(PacketError::AttributeError(
                "Vendor-Specific attribute missing Vendor-Id".to_string(),
            ));
        }

        let vendor_id = u32::from_be_bytes([
            self.value[0],
            self.value[1],
            self.value[2],
            self.value[3],
        ]);

        let mut subs = Vec::new();
        let mut rest = &self.value[4..];
        while !rest.is_empty() {
            let [vendor_type, length, ..] = *rest else {
                return Err(PacketError::AttributeError(
                    "Truncated vendor sub-attribute".to_string(),
                ));
            };
            let length = length as usize;
            if length < 2 || length > rest.len() {
                return Err(PacketError::AttributeError(format!(
                    "Invalid vendor sub-attribute length: {}",
                    length
                )));
            }
            subs.push(VendorAttribute {
                vendor_id,
                vendor_type,
                value: &rest[2..length],
            });
            rest = &rest[length..];
        }

        Ok(subs)
    }
}

const VENDOR_SPECIFIC: u8 = 26;

/// A sub-attribute carried inside a Vendor-Specific attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VendorAttribute<'a> {
    pub vendor_id: u32,
    pub vendor_type: u8,
    pub value: &'a [u8],
}
