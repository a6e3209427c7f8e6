//! Request/Response Authenticator handling for the accounting exchange
//!
//! RFC 2866 Section 3:
//!
//! ```text
//! Request Authenticator  = MD5(Code + Identifier + Length + 16 zero octets
//!                              + request attributes + shared secret)
//! Response Authenticator = MD5(Code + Identifier + Length + Request Authenticator
//!                              + response attributes + shared secret)
//! ```

use crate::packet::{Packet, PacketError};
use rand::Rng;

/// Generate a random Request Authenticator (16 bytes) per RFC 2865 Section 3
pub fn generate_request_authenticator() -> [u8; 16] {
    let mut rng = rand::rng();
    let mut authenticator = [0u8; 16];
    rng.fill(&mut authenticator);
    authenticator
}

fn digest(packet: &Packet, authenticator: &[u8; 16], secret: &[u8]) -> Result<[u8; 16], PacketError> {
    let length = packet.length();
    let mut data = Vec::with_capacity(length + secret.len());

    data.push(packet.code.as_u8());
    data.push(packet.identifier);
    data.extend_from_slice(&(length as u16).to_be_bytes());
    data.extend_from_slice(authenticator);
    for attr in &packet.attributes {
        data.extend_from_slice(&attr.encode()?);
    }
    data.extend_from_slice(secret);

    Ok(md5::compute(&data).0)
}

/// Calculate the Accounting-Request authenticator for `packet`
///
/// The packet's current authenticator field is ignored; the hash is taken
/// over sixteen zero octets in its place.
pub fn calculate_accounting_request_authenticator(
    packet: &Packet,
    secret: &[u8],
) -> Result<[u8; 16], PacketError> {
    digest(packet, &[0u8; 16], secret)
}

/// Check an inbound Accounting-Request against the NAS shared secret
pub fn verify_accounting_request_authenticator(packet: &Packet, secret: &[u8]) -> bool {
    calculate_accounting_request_authenticator(packet, secret)
        .map(|expected| expected == packet.authenticator)
        .unwrap_or(false)
}

/// Calculate Response Authenticator per RFC 2865 Section 3 / RFC 2866 Section 3
pub fn calculate_response_authenticator(
    packet: &Packet,
    request_authenticator: &[u8; 16],
    secret: &[u8],
) -> Result<[u8; 16], PacketError> {
    digest(packet, request_authenticator, secret)
}

/// Fill in the Response Authenticator of a finished reply packet
pub fn sign_response(
    reply: &mut Packet,
    request_authenticator: &[u8; 16],
    secret: &[u8],
) -> Result<(), PacketError> {
    reply.authenticator = calculate_response_authenticator(reply, request_authenticator, secret)?;
    Ok(())
}

/// Verify Response Authenticator
pub fn verify_response_authenticator(
    response: &Packet,
    request_authenticator: &[u8; 16],
    secret: &[u8],
) -> bool {
    calculate_response_authenticator(response, request_authenticator, secret)
        .map(|expected| expected == response.authenticator)
        .unwrap_or(false)
}
