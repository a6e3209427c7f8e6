//! 64-bit traffic counters from octet/gigaword attribute pairs
//!
//! RFC 2869 Section 5.1: Acct-Input-Gigawords counts how many times
//! Acct-Input-Octets wrapped around 2^32. Same for the output pair.

use crate::error::AccountingError;
use crate::view::AttributeView;
use radius_proto::AttributeType;

/// Which octets/gigawords attribute pair a counter comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterDirection {
    /// Acct-Input-Octets / Acct-Input-Gigawords
    Input,
    /// Acct-Output-Octets / Acct-Output-Gigawords
    Output,
}

impl CounterDirection {
    pub fn attributes(self) -> (AttributeType, AttributeType) {
        match self {
            CounterDirection::Input => (AttributeType::AcctInputOctets, AttributeType::AcctInputGigawords),
            CounterDirection::Output => (AttributeType::AcctOutputOctets, AttributeType::AcctOutputGigawords),
        }
    }
}

/// Combine a 32-bit octet counter with its wrap counter.
///
/// Either value may be absent (treated as zero); a present value that is not
/// exactly four bytes is malformed and reported under the attribute name of
/// `direction`.
pub fn decode_counter(
    direction: CounterDirection,
    octets: Option<&[u8]>,
    gigawords: Option<&[u8]>,
) -> Result<u64, AccountingError> {
    let (octets_attr, gigawords_attr) = direction.attributes();
    let low = read_u32(octets_attr, octets)?;
    let high = read_u32(gigawords_attr, gigawords)?;
    Ok(u64::from(low) | (u64::from(high) << 32))
}

fn read_u32(attr: AttributeType, raw: Option<&[u8]>) -> Result<u32, AccountingError> {
    match raw {
        None => Ok(0),
        Some(&[a, b, c, d]) => Ok(u32::from_be_bytes([a, b, c, d])),
        Some(other) => Err(AccountingError::MalformedAttribute {
            attribute: attr.name(),
            reason: format!("expected 4 bytes, got {}", other.len()),
        }),
    }
}

/// Upstream/downstream byte totals reported by one Accounting-Request
///
/// Upstream is subscriber-to-network traffic (the NAS's "input"),
/// downstream is network-to-subscriber (its "output").
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrafficCounters {
    pub upstream: u64,
    pub downstream: u64,
}

impl TrafficCounters {
    pub fn new(upstream: u64, downstream: u64) -> Self {
        TrafficCounters { upstream, downstream }
    }

    /// Decode both directions, each from its own octets/gigawords pair
    pub fn from_view(view: &AttributeView<'_>) -> Result<Self, AccountingError> {
        Ok(TrafficCounters {
            upstream: decode_direction(view, CounterDirection::Input)?,
            downstream: decode_direction(view, CounterDirection::Output)?,
        })
    }

    /// Like [`from_view`](Self::from_view), but `None` when the packet
    /// carries none of the four counter attributes
    pub fn reported(view: &AttributeView<'_>) -> Result<Option<Self>, AccountingError> {
        let present = [CounterDirection::Input, CounterDirection::Output]
            .into_iter()
            .flat_map(|direction| {
                let (octets, gigawords) = direction.attributes();
                [octets, gigawords]
            })
            .any(|attr| view.bytes(attr).is_some());
        if present {
            Self::from_view(view).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Element-wise saturating sum
    pub fn saturating_add(self, other: TrafficCounters) -> TrafficCounters {
        TrafficCounters {
            upstream: self.upstream.saturating_add(other.upstream),
            downstream: self.downstream.saturating_add(other.downstream),
        }
    }
}

fn decode_direction(view: &AttributeView<'_>, direction: CounterDirection) -> Result<u64, AccountingError> {
    let (octets, gigawords) = direction.attributes();
    decode_counter(direction, view.bytes(octets), view.bytes(gigawords))
}
