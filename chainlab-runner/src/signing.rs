//! HMAC-SHA256 request signing shared with the runner service.
//!
//! The signed payload is `"{timestamp}.{body}"`; the digest travels hex
//! encoded in [`SIGNATURE_HEADER`] next to the timestamp in
//! [`TIMESTAMP_HEADER`].

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const TIMESTAMP_HEADER: &str = "x-runner-timestamp";
pub const SIGNATURE_HEADER: &str = "x-runner-signature";

/// Header values for one signed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub timestamp: String,
    pub signature: String,
}

fn mac(secret: &str, timestamp: &str, body: &[u8]) -> Option<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);
    Some(mac)
}

/// Hex HMAC of `timestamp + "." + body`.
pub fn sign(secret: &str, timestamp: &str, body: &[u8]) -> String {
    mac(secret, timestamp, body)
        .map(|m| hex::encode(m.finalize().into_bytes()))
        .unwrap_or_default()
}

/// Check a hex signature in constant time.
pub fn verify(secret: &str, timestamp: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature) else {
        return false;
    };
    mac(secret, timestamp, body)
        .map(|m| m.verify_slice(&expected).is_ok())
        .unwrap_or(false)
}

/// Sign `body` at unix time `timestamp` (seconds).
pub fn signed_headers(secret: &str, timestamp: i64, body: &[u8]) -> SignedHeaders {
    let timestamp = timestamp.to_string();
    let signature = sign(secret, &timestamp, body);
    SignedHeaders {
        timestamp,
        signature,
    }
}
