//! Webhook signature verification.
//!
//! Two schemes are supported:
//!
//! - Stripe: `Stripe-Signature: t=<unix>,v1=<hex>` where the MAC is
//!   HMAC-SHA256 over `"{t}.{body}"`.
//! - Replicate (Standard Webhooks): `webhook-id`, `webhook-timestamp` and
//!   `webhook-signature: v1,<base64>` where the MAC is HMAC-SHA256 over
//!   `"{id}.{timestamp}.{body}"`, keyed with the base64 part of a
//!   `whsec_` secret.
//!
//! Comparison is constant time via [`Mac::verify_slice`].

use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Maximum accepted clock skew between signer and receiver.
pub const TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("Signature header is missing or malformed")]
    MalformedHeader,

    #[error("Signature timestamp is outside the tolerance window")]
    Expired,

    #[error("No signature matched the payload")]
    Mismatch,

    #[error("Webhook secret is invalid")]
    InvalidSecret,
}

// ---------------------------------------------------------------------------
// Stripe
// ---------------------------------------------------------------------------

/// Verify a `Stripe-Signature` header against the raw request body.
pub fn verify_stripe(
    secret: &str,
    header: &str,
    body: &[u8],
    now_unix: i64,
) -> Result<(), SignatureError> {
    let mut timestamp: Option<i64> = None;
    let mut signatures: Vec<Vec<u8>> = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = value.parse().ok(),
            "v1" => {
                if let Ok(sig) = hex::decode(value) {
                    signatures.push(sig);
                }
            }
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::MalformedHeader)?;
    if signatures.is_empty() {
        return Err(SignatureError::MalformedHeader);
    }
    if (now_unix - timestamp).abs() > TOLERANCE_SECS {
        return Err(SignatureError::Expired);
    }

    let mut signed = format!("{timestamp}.").into_bytes();
    signed.extend_from_slice(body);

    let matched = signatures.iter().any(|sig| {
        let mut mac = mac_for(secret.as_bytes());
        mac.update(&signed);
        mac.verify_slice(sig).is_ok()
    });
    if matched {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Compute a Stripe-style signature header (used by tests and tooling).
pub fn sign_stripe(secret: &str, body: &[u8], timestamp: i64) -> String {
    let mut mac = mac_for(secret.as_bytes());
    mac.update(format!("{timestamp}.").as_bytes());
    mac.update(body);
    format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
}

// ---------------------------------------------------------------------------
// Standard Webhooks (Replicate)
// ---------------------------------------------------------------------------

/// Headers carried by a Standard Webhooks delivery.
#[derive(Debug, Clone, Copy)]
pub struct WebhookHeaders<'a> {
    pub id: &'a str,
    pub timestamp: &'a str,
    pub signature: &'a str,
}

/// Verify a Standard Webhooks signature against the raw request body.
pub fn verify_standard(
    secret: &str,
    headers: WebhookHeaders<'_>,
    body: &[u8],
    now_unix: i64,
) -> Result<(), SignatureError> {
    let key = decode_secret(secret)?;
    let timestamp: i64 = headers
        .timestamp
        .parse()
        .map_err(|_| SignatureError::MalformedHeader)?;
    if (now_unix - timestamp).abs() > TOLERANCE_SECS {
        return Err(SignatureError::Expired);
    }

    let mut signed = format!("{}.{}.", headers.id, headers.timestamp).into_bytes();
    signed.extend_from_slice(body);

    // The header holds space-separated `v1,<sig>` entries (key rotation).
    let matched = headers
        .signature
        .split_whitespace()
        .filter_map(|entry| entry.strip_prefix("v1,"))
        .filter_map(|sig| base64::engine::general_purpose::STANDARD.decode(sig).ok())
        .any(|sig| {
            let mut mac = mac_for(&key);
            mac.update(&signed);
            mac.verify_slice(&sig).is_ok()
        });
    if matched {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Compute a Standard Webhooks signature header value.
pub fn sign_standard(
    secret: &str,
    id: &str,
    timestamp: i64,
    body: &[u8],
) -> Result<String, SignatureError> {
    let key = decode_secret(secret)?;
    let mut mac = mac_for(&key);
    mac.update(format!("{id}.{timestamp}.").as_bytes());
    mac.update(body);
    let sig = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());
    Ok(format!("v1,{sig}"))
}

fn decode_secret(secret: &str) -> Result<Vec<u8>, SignatureError> {
    let encoded = secret.strip_prefix("whsec_").unwrap_or(secret);
    base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|_| SignatureError::InvalidSecret)
}

fn mac_for(key: &[u8]) -> HmacSha256 {
    HmacSha256::new_from_slice(key).expect("HMAC accepts any key length")
}
