//! Webhook signature verification (`t=<unix>,v1=<hex hmac>` headers).
//!
//! The signed message is `"{timestamp}.{raw body}"`, authenticated with
//! HMAC-SHA256 under the endpoint secret. A header may carry several `v1`
//! entries during secret rotation; any one matching is accepted.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a signed timestamp before the event is rejected.
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// Allowed clock skew for timestamps from the future.
const FUTURE_SKEW_SECS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("signature header is malformed")]
    Malformed,

    #[error("signature timestamp is outside the tolerance window (age {age_secs}s)")]
    OutsideTolerance { age_secs: i64 },

    #[error("no signature matches the payload")]
    Mismatch,

    #[error("webhook secret is not usable as an HMAC key")]
    InvalidSecret,
}

/// Verify `header` against `payload`.
///
/// `now` is the current Unix time in seconds; it is a parameter so callers
/// and tests control the clock.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: i64,
    tolerance_secs: i64,
) -> Result<(), SignatureError> {
    let mut timestamp = None;
    let mut candidates = Vec::new();

    for part in header.split(',') {
        let part = part.trim();
        if let Some(t) = part.strip_prefix("t=") {
            timestamp = Some(t);
        } else if let Some(sig) = part.strip_prefix("v1=") {
            candidates.push(sig);
        }
    }

    let timestamp_str = timestamp.ok_or(SignatureError::Malformed)?;
    if candidates.is_empty() {
        return Err(SignatureError::Malformed);
    }
    let timestamp: i64 = timestamp_str
        .parse()
        .map_err(|_| SignatureError::Malformed)?;

    let age_secs = now.checked_sub(timestamp).ok_or(SignatureError::Malformed)?;
    if age_secs > tolerance_secs || age_secs < -FUTURE_SKEW_SECS {
        return Err(SignatureError::OutsideTolerance { age_secs });
    }

    for candidate in candidates {
        let Ok(expected) = hex::decode(candidate) else {
            continue;
        };
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| SignatureError::InvalidSecret)?;
        mac.update(timestamp_str.as_bytes());
        mac.update(b".");
        mac.update(payload);
        // verify_slice compares in constant time.
        if mac.verify_slice(&expected).is_ok() {
            return Ok(());
        }
    }

    Err(SignatureError::Mismatch)
}

/// Produce a signature header for `payload` at `timestamp`.
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> Result<String, SignatureError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::InvalidSecret)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    let sig = hex::encode(mac.finalize().into_bytes());
    Ok(format!("t={timestamp},v1={sig}"))
}
