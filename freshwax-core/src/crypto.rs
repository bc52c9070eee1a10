//! Crypto primitives shared by the credential service, webhook
//! verification, and the pub/sub transport signer.
//!
//! HMAC-SHA256 is the only signing primitive. MD5 exists solely because the
//! pub/sub transport requires a body hash; it is not used for security.

use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// hex(HMAC-SHA256(secret, message))
#[must_use]
pub fn hmac_sha256_hex(secret: &str, message: &str) -> String {
    hmac_sha256_hex_bytes(secret, message.as_bytes())
}

/// hex(HMAC-SHA256(secret, body)) over raw bytes; used for webhook bodies.
#[must_use]
pub fn hmac_sha256_hex_bytes(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"));
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time equality for hex-encoded signatures.
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// hex(MD5(utf8(body)))
///
/// Operates on the UTF-8 bytes so multi-byte characters (emoji payloads)
/// hash consistently with the transport's expectations.
#[must_use]
pub fn md5_hex(body: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(body.as_bytes());
    hex::encode(hasher.finalize())
}

/// Unix seconds rendered in lowercase base36.
#[must_use]
pub fn base36_encode(mut value: u64) -> String {
    const ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(ALPHABET[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_else(|_| unreachable!("alphabet is ASCII"))
}

/// Inverse of [`base36_encode`]; `None` on any non-base36 character.
#[must_use]
pub fn base36_decode(text: &str) -> Option<u64> {
    if text.is_empty() {
        return None;
    }
    let mut value: u64 = 0;
    for c in text.chars() {
        let digit = c.to_digit(36)?;
        value = value.checked_mul(36)?.checked_add(u64::from(digit))?;
    }
    Some(value)
}
