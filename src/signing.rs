//! Request signing for outbound webhooks and verification helpers for
//! receivers.
//!
//! The string to sign is `url + "\n" + body + "\n" + timestamp`. Existing
//! subscribers rebuild it byte for byte, so neither the order nor the
//! delimiter may change.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Produces the header set attached to a delivery.
///
/// Implementations must be pure apart from generating a request id.
pub trait Signer: Send + Sync {
    fn sign(
        &self,
        org_name: &str,
        url: &str,
        raw_body: &str,
        timestamp: &str,
        secret: &str,
    ) -> SignedHeaders;
}

/// Default signer: base64 HMAC-SHA256 over the canonical string.
#[derive(Debug, Clone, Copy, Default)]
pub struct HmacSigner;

impl Signer for HmacSigner {
    fn sign(
        &self,
        org_name: &str,
        url: &str,
        raw_body: &str,
        timestamp: &str,
        secret: &str,
    ) -> SignedHeaders {
        build_signature_headers(org_name, url, raw_body, timestamp, secret)
    }
}

/// Ordered header list produced by a [`Signer`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignedHeaders {
    headers: Vec<(String, String)>,
}

impl SignedHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .headers
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(&name))
        {
            Some(entry) => entry.1 = value,
            None => self.headers.push((name, value)),
        }
    }

    /// Case-insensitive lookup.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn into_vec(self) -> Vec<(String, String)> {
        self.headers
    }
}

pub fn signature_header(org_name: &str) -> String {
    format!("x-{org_name}-signature")
}

pub fn timestamp_header(org_name: &str) -> String {
    format!("x-{org_name}-timestamp")
}

pub fn request_id_header(org_name: &str) -> String {
    format!("x-{org_name}-requestId")
}

pub fn build_string_to_sign(url: &str, body: &str, timestamp: &str) -> String {
    [url, body, timestamp].join("\n")
}

/// Base64 HMAC-SHA256 of `string_to_sign`. An empty secret is a valid key.
pub fn compute_signature(secret: &[u8], string_to_sign: &str) -> String {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret)
        .expect("HMAC can take key of any size");
    mac.update(string_to_sign.as_bytes());
    BASE64.encode(mac.finalize().into_bytes())
}

pub fn build_signature_headers(
    org_name: &str,
    url: &str,
    raw_body: &str,
    timestamp: &str,
    secret: &str,
) -> SignedHeaders {
    let string_to_sign = build_string_to_sign(url, raw_body, timestamp);
    let mut headers = SignedHeaders::new();
    headers.insert(
        signature_header(org_name),
        compute_signature(secret.as_bytes(), &string_to_sign),
    );
    headers.insert(timestamp_header(org_name), timestamp);
    headers.insert(request_id_header(org_name), Uuid::new_v4().to_string());
    headers.insert("Content-Type", "application/json");
    headers
}

/// Verify a received signature in constant time.
pub fn verify_signature(
    secret: &[u8],
    url: &str,
    body: &str,
    timestamp: &str,
    signature_b64: &str,
) -> bool {
    let Ok(signature) = BASE64.decode(signature_b64) else {
        return false;
    };

    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret)
        .expect("HMAC can take key of any size");
    mac.update(build_string_to_sign(url, body, timestamp).as_bytes());
    mac.verify_slice(&signature).is_ok()
}

/// Timestamps are epoch milliseconds. Future timestamps are never fresh.
pub fn is_timestamp_fresh(timestamp_ms: i64, now_ms: i64, max_age_ms: i64) -> bool {
    now_ms
        .checked_sub(timestamp_ms)
        .is_some_and(|age| (0..=max_age_ms).contains(&age))
}

#[derive(Debug, Clone)]
pub struct ParsedSignature {
    pub signature: Option<String>,
    pub timestamp: Option<String>,
    pub request_id: Option<String>,
}

/// Pull the signature headers for `org_name` out of a header list.
pub fn parse_signature_headers<'a, I>(headers: I, org_name: &str) -> ParsedSignature
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let sig_key = signature_header(org_name);
    let ts_key = timestamp_header(org_name);
    let id_key = request_id_header(org_name);

    let mut parsed = ParsedSignature {
        signature: None,
        timestamp: None,
        request_id: None,
    };

    for (name, value) in headers {
        if name.eq_ignore_ascii_case(&sig_key) {
            parsed.signature = Some(value.to_string());
        } else if name.eq_ignore_ascii_case(&ts_key) {
            parsed.timestamp = Some(value.to_string());
        } else if name.eq_ignore_ascii_case(&id_key) {
            parsed.request_id = Some(value.to_string());
        }
    }

    parsed
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationError {
    MissingSignature,
    MissingTimestamp,
    InvalidTimestamp,
    StaleTimestamp,
    InvalidSignature,
}

/// Verify an incoming webhook request in one call.
///
/// `url` must be the full URL the sender posted to (`base + relativeUri`).
pub fn verify_webhook_request<'a, I>(
    headers: I,
    org_name: &str,
    url: &str,
    body: &str,
    secret: &[u8],
    max_age_ms: i64,
    now_ms: i64,
) -> Result<(), VerificationError>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let parsed = parse_signature_headers(headers, org_name);
    let signature = parsed.signature.ok_or(VerificationError::MissingSignature)?;
    let timestamp_str = parsed.timestamp.ok_or(VerificationError::MissingTimestamp)?;
    let timestamp = timestamp_str
        .parse::<i64>()
        .map_err(|_| VerificationError::InvalidTimestamp)?;

    if !is_timestamp_fresh(timestamp, now_ms, max_age_ms) {
        return Err(VerificationError::StaleTimestamp);
    }

    if verify_signature(secret, url, body, &timestamp_str, &signature) {
        Ok(())
    } else {
        Err(VerificationError::InvalidSignature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_to_sign_is_newline_joined_in_order() {
        assert_eq!(
            build_string_to_sign("http://a/b", "{}", "1700000000000"),
            "http://a/b\n{}\n1700000000000"
        );
    }

    #[test]
    fn signature_is_deterministic_base64() {
        let a = compute_signature(b"secret", "payload");
        let b = compute_signature(b"secret", "payload");
        assert_eq!(a, b);
        assert_eq!(BASE64.decode(&a).unwrap().len(), 32);
        assert_ne!(a, compute_signature(b"other", "payload"));
    }

    #[test]
    fn empty_secret_still_signs() {
        let sig = compute_signature(b"", "payload");
        assert!(!sig.is_empty());
        assert!(verify_signature(b"", "payload", "", "", &compute_signature(b"", "payload\n\n")));
    }

    #[test]
    fn headers_are_namespaced_by_org() {
        let headers = HmacSigner.sign("acme", "http://a/b", "{}", "42", "s3cret");
        assert_eq!(headers.len(), 4);
        assert_eq!(headers.get("x-acme-timestamp"), Some("42"));
        assert_eq!(headers.get("content-type"), Some("application/json"));
        assert!(headers.get("X-ACME-REQUESTID").is_some());
        let sig = headers.get("x-acme-signature").unwrap();
        assert!(verify_signature(b"s3cret", "http://a/b", "{}", "42", sig));
    }

    #[test]
    fn request_id_changes_per_call() {
        let a = HmacSigner.sign("acme", "u", "b", "1", "s");
        let b = HmacSigner.sign("acme", "u", "b", "1", "s");
        assert_eq!(a.get("x-acme-signature"), b.get("x-acme-signature"));
        assert_ne!(a.get("x-acme-requestId"), b.get("x-acme-requestId"));
    }

    #[test]
    fn verify_request_checks_freshness_and_signature() {
        let headers = HmacSigner.sign("acme", "http://a/b", "{\"x\":1}", "1000", "k");
        let pairs: Vec<(&str, &str)> = headers.iter().collect();

        assert_eq!(
            verify_webhook_request(pairs.clone(), "acme", "http://a/b", "{\"x\":1}", b"k", 500, 1200),
            Ok(())
        );
        assert_eq!(
            verify_webhook_request(pairs.clone(), "acme", "http://a/b", "{\"x\":1}", b"k", 100, 1200),
            Err(VerificationError::StaleTimestamp)
        );
        assert_eq!(
            verify_webhook_request(pairs.clone(), "acme", "http://a/b", "{\"x\":2}", b"k", 500, 1200),
            Err(VerificationError::InvalidSignature)
        );
        assert_eq!(
            verify_webhook_request(pairs, "other", "http://a/b", "{\"x\":1}", b"k", 500, 1200),
            Err(VerificationError::MissingSignature)
        );
    }

    #[test]
    fn extreme_timestamps_are_stale_not_overflow() {
        let now = 1_700_000_000_000;
        assert!(!is_timestamp_fresh(i64::MIN, now, 300_000));
        assert!(!is_timestamp_fresh(i64::MAX, now, 300_000));
        assert!(!is_timestamp_fresh(i64::MIN, i64::MAX, i64::MAX));
        assert!(is_timestamp_fresh(now - 1_000, now, 300_000));

        let headers = [
            ("x-acme-signature", "AAAA"),
            ("x-acme-timestamp", "-9223372036854775808"),
        ];
        assert_eq!(
            verify_webhook_request(headers, "acme", "http://a/b", "{}", b"k", 300_000, now),
            Err(VerificationError::StaleTimestamp)
        );
    }
}
