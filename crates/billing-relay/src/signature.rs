//! Webhook Signature Verification
//!
//! Stripe signs `"{t}.{raw body}"` with HMAC-SHA256 and sends
//! `Stripe-Signature: t=<unix>,v1=<hex>[,v1=<hex>...]`. Verification runs over
//! the exact bytes received; re-serialized JSON will not match.

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{PaymentError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the signature
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Maximum accepted clock distance between signing and receipt
pub const DEFAULT_TOLERANCE_SECS: u64 = 300;

/// Verifies Stripe webhook signatures against the endpoint secret
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: String,
    tolerance_secs: u64,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("tolerance_secs", &self.tolerance_secs)
            .finish_non_exhaustive()
    }
}

impl SignatureVerifier {
    /// Create a verifier; an empty secret is a configuration error
    pub fn new(secret: impl Into<String>, tolerance_secs: u64) -> Result<Self> {
        let secret = secret.into();
        if secret.trim().is_empty() {
            return Err(PaymentError::Config("webhook signing secret is empty".into()));
        }
        Ok(Self {
            secret,
            tolerance_secs,
        })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let secret = lookup("STRIPE_WEBHOOK_SECRET")
            .or_else(|| lookup("STRIPE_WH_SECRET"))
            .ok_or_else(|| PaymentError::Config("STRIPE_WEBHOOK_SECRET not set".into()))?;

        let tolerance_secs = match lookup("WEBHOOK_TOLERANCE_SECS") {
            Some(raw) => raw.trim().parse().map_err(|_| {
                PaymentError::Config(format!("WEBHOOK_TOLERANCE_SECS '{raw}' is not a non-negative number"))
            })?,
            None => DEFAULT_TOLERANCE_SECS,
        };

        Self::new(secret, tolerance_secs)
    }

    pub fn tolerance_secs(&self) -> u64 {
        self.tolerance_secs
    }

    /// Verify a payload against its signature header at the current time
    pub fn verify(&self, payload: &[u8], header: Option<&str>) -> Result<()> {
        self.verify_at(payload, header, Utc::now().timestamp())
    }

    /// Verify a payload against its signature header at `now` (unix seconds)
    pub fn verify_at(&self, payload: &[u8], header: Option<&str>, now: i64) -> Result<()> {
        let header = header
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| PaymentError::WebhookSignature("missing Stripe-Signature header".into()))?;

        let parsed = parse_header(header)?;

        // `t` is unauthenticated here and may sit anywhere in the i64 range
        if now.abs_diff(parsed.timestamp) > self.tolerance_secs {
            return Err(PaymentError::WebhookSignature(
                "timestamp outside the tolerance window".into(),
            ));
        }

        let mac = signed_mac(&self.secret, parsed.timestamp, payload)?;
        let matched = parsed.signatures.iter().any(|candidate| {
            hex::decode(candidate)
                .map(|bytes| mac.clone().verify_slice(&bytes).is_ok())
                .unwrap_or(false)
        });

        if matched {
            Ok(())
        } else {
            Err(PaymentError::WebhookSignature(
                "no signature matches the expected value".into(),
            ))
        }
    }
}

/// Produce a `Stripe-Signature` header value for a payload
pub fn sign(payload: &[u8], secret: &str, timestamp: i64) -> Result<String> {
    let digest = signed_mac(secret, timestamp, payload)?.finalize().into_bytes();
    Ok(format!("t={timestamp},v1={}", hex::encode(digest)))
}

fn signed_mac(secret: &str, timestamp: i64, payload: &[u8]) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| PaymentError::Config(format!("invalid signing secret: {e}")))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

#[derive(Debug)]
struct ParsedHeader<'a> {
    timestamp: i64,
    signatures: Vec<&'a str>,
}

fn parse_header(header: &str) -> Result<ParsedHeader<'_>> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = value.parse::<i64>().ok(),
            "v1" => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| PaymentError::WebhookSignature("header has no valid timestamp".into()))?;
    if signatures.is_empty() {
        return Err(PaymentError::WebhookSignature("header has no v1 signature".into()));
    }

    Ok(ParsedHeader {
        timestamp,
        signatures,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";
    const NOW: i64 = 1_700_000_000;

    fn verifier() -> SignatureVerifier {
        SignatureVerifier::new(SECRET, DEFAULT_TOLERANCE_SECS).unwrap()
    }

    #[test]
    fn test_valid_signature() {
        let payload = br#"{"id":"evt_1","type":"invoice.paid"}"#;
        let header = sign(payload, SECRET, NOW).unwrap();
        assert!(verifier().verify_at(payload, Some(&header), NOW + 10).is_ok());
    }

    #[test]
    fn test_any_v1_may_match() {
        let payload = b"{}";
        let good = sign(payload, SECRET, NOW).unwrap();
        let good_sig = good.split("v1=").nth(1).unwrap();
        let header = format!("t={NOW},v1={},v1={good_sig},v0=legacy", "00".repeat(32));
        assert!(verifier().verify_at(payload, Some(&header), NOW).is_ok());
    }

    #[test]
    fn test_tampered_body_rejected() {
        let header = sign(br#"{"amount":100}"#, SECRET, NOW).unwrap();
        let err = verifier().verify_at(br#"{"amount":999}"#, Some(&header), NOW).unwrap_err();
        assert!(matches!(err, PaymentError::WebhookSignature(_)));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let header = sign(b"{}", "whsec_other", NOW).unwrap();
        assert!(verifier().verify_at(b"{}", Some(&header), NOW).is_err());
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let header = sign(b"{}", SECRET, NOW).unwrap();
        let err = verifier()
            .verify_at(b"{}", Some(&header), NOW + 301)
            .unwrap_err();
        assert!(matches!(err, PaymentError::WebhookSignature(_)));
    }

    #[test]
    fn test_missing_or_malformed_header() {
        let v = verifier();
        assert!(v.verify_at(b"{}", None, NOW).is_err());
        assert!(v.verify_at(b"{}", Some(""), NOW).is_err());
        assert!(v.verify_at(b"{}", Some("garbage"), NOW).is_err());
        assert!(v.verify_at(b"{}", Some("t=abc,v1=00"), NOW).is_err());
        assert!(v.verify_at(b"{}", Some(&format!("t={NOW}")), NOW).is_err());
        assert!(v.verify_at(b"{}", Some(&format!("t={NOW},v1=not-hex")), NOW).is_err());
    }

    #[test]
    fn test_empty_secret_is_config_error() {
        assert!(matches!(
            SignatureVerifier::new("", DEFAULT_TOLERANCE_SECS),
            Err(PaymentError::Config(_))
        ));
        assert!(matches!(
            SignatureVerifier::from_lookup(|_| None),
            Err(PaymentError::Config(_))
        ));
    }

    #[test]
    fn test_from_lookup_reads_legacy_name_and_tolerance() {
        let v = SignatureVerifier::from_lookup(|key| match key {
            "STRIPE_WH_SECRET" => Some(SECRET.into()),
            "WEBHOOK_TOLERANCE_SECS" => Some("60".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(v.tolerance_secs(), 60);

        let bad = SignatureVerifier::from_lookup(|key| match key {
            "STRIPE_WEBHOOK_SECRET" => Some(SECRET.into()),
            "WEBHOOK_TOLERANCE_SECS" => Some("soon".into()),
            _ => None,
        });
        assert!(matches!(bad, Err(PaymentError::Config(_))));

        let negative = SignatureVerifier::from_lookup(|key| match key {
            "STRIPE_WEBHOOK_SECRET" => Some(SECRET.into()),
            "WEBHOOK_TOLERANCE_SECS" => Some("-1".into()),
            _ => None,
        });
        assert!(matches!(negative, Err(PaymentError::Config(_))));
    }

    #[test]
    fn test_extreme_timestamps_are_rejected_not_overflowed() {
        let v = verifier();
        let zeros = "00".repeat(32);
        for t in [i64::MIN, i64::MAX] {
            let header = format!("t={t},v1={zeros}");
            let err = v.verify_at(b"{}", Some(&header), NOW).unwrap_err();
            assert!(matches!(err, PaymentError::WebhookSignature(_)));
        }

        // and with the clock itself at the extremes
        let header = sign(b"{}", SECRET, NOW).unwrap();
        assert!(v.verify_at(b"{}", Some(&header), i64::MIN).is_err());
        assert!(v.verify_at(b"{}", Some(&header), i64::MAX).is_err());
    }

    #[test]
    fn test_zero_tolerance_accepts_exact_timestamp() {
        let v = SignatureVerifier::new(SECRET, 0).unwrap();
        let header = sign(b"{}", SECRET, NOW).unwrap();
        assert!(v.verify_at(b"{}", Some(&header), NOW).is_ok());
        assert!(v.verify_at(b"{}", Some(&header), NOW + 1).is_err());
    }
}
