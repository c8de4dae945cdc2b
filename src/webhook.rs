//! ElevenLabs webhook signature verification.
//!
//! The provider signs `"<t>.<raw body>"` with HMAC-SHA256 and sends
//! `ElevenLabs-Signature: t=<unix seconds>,v0=<hex digest>`. Verification
//! must run on the body bytes exactly as received; re-serializing parsed JSON
//! changes key order and whitespace and breaks the digest.

use chrono::{DateTime, Utc};
use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

pub const SIGNATURE_HEADER: &str = "elevenlabs-signature";

/// Allowed distance between the signed timestamp and our clock, both ways.
pub const TOLERANCE_MS: i64 = 30 * 60 * 1000;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("Missing signature header")]
    MissingHeader,
    #[error("Malformed signature header")]
    MalformedHeader,
    #[error("Timestamp outside tolerance")]
    Expired,
    #[error("Signature mismatch")]
    Mismatch,
}

/// Parsed `t=...,v0=...` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookSignature {
    pub timestamp: i64,
    /// The `t` token exactly as sent. The digest covers this text, not the
    /// parsed number.
    pub timestamp_token: String,
    pub signature: String,
}

impl WebhookSignature {
    /// Parses the comma-separated `key=value` tokens. Unknown keys are ignored.
    pub fn parse(header: &str) -> Result<Self, SignatureError> {
        let mut timestamp = None;
        let mut signature = None;

        for token in header.split(',') {
            let Some((key, value)) = token.trim().split_once('=') else {
                continue;
            };
            match key.trim() {
                "t" => timestamp = Some(value.trim()),
                "v0" => signature = Some(value.trim()),
                _ => {}
            }
        }

        let (Some(t), Some(sig)) = (timestamp, signature) else {
            return Err(SignatureError::MalformedHeader);
        };
        let timestamp = t.parse::<i64>().map_err(|_| SignatureError::MalformedHeader)?;
        if sig.is_empty() {
            return Err(SignatureError::MalformedHeader);
        }

        Ok(Self {
            timestamp,
            timestamp_token: t.to_string(),
            signature: sig.to_string(),
        })
    }
}

fn keyed_mac(secret: &str, timestamp: &str, body: &[u8]) -> Result<HmacSha256, InvalidLength> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);
    Ok(mac)
}

/// Hex HMAC-SHA256 of `"<timestamp>.<body>"`.
pub fn sign(secret: &str, timestamp: i64, body: &[u8]) -> Result<String, InvalidLength> {
    sign_token(secret, &timestamp.to_string(), body)
}

/// Like [`sign`], for a `t` token that is not the canonical decimal form.
pub fn sign_token(secret: &str, timestamp: &str, body: &[u8]) -> Result<String, InvalidLength> {
    let mac = keyed_mac(secret, timestamp, body)?;
    Ok(hex::encode(mac.finalize().into_bytes()))
}

// the provider sends lowercase hex; anything else is not its digest
fn is_lower_hex(sig: &str) -> bool {
    sig.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Checks an inbound delivery. `now` is passed in so callers and tests control
/// the clock.
pub fn verify(
    header: Option<&str>,
    body: &[u8],
    secret: &str,
    now: DateTime<Utc>,
) -> Result<WebhookSignature, SignatureError> {
    let header = header.ok_or(SignatureError::MissingHeader)?;
    let parsed = WebhookSignature::parse(header)?;

    let signed_ms = parsed.timestamp.saturating_mul(1000);
    let skew = now
        .timestamp_millis()
        .checked_sub(signed_ms)
        .map(i64::unsigned_abs);
    match skew {
        Some(ms) if ms <= TOLERANCE_MS as u64 => {}
        _ => return Err(SignatureError::Expired),
    }

    if !is_lower_hex(&parsed.signature) {
        return Err(SignatureError::Mismatch);
    }
    let Ok(provided) = hex::decode(&parsed.signature) else {
        return Err(SignatureError::Mismatch);
    };
    let Ok(mac) = keyed_mac(secret, &parsed.timestamp_token, body) else {
        return Err(SignatureError::Mismatch);
    };
    // verify_slice compares in constant time
    mac.verify_slice(&provided)
        .map_err(|_| SignatureError::Mismatch)?;

    Ok(parsed)
}
