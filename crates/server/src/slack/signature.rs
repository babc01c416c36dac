//! Slack request signing (`v0` scheme).
//!
//! Slack signs `v0:{timestamp}:{raw body}` with the app's signing secret and
//! sends the hex digest in `X-Slack-Signature`. Requests older than the
//! replay window are rejected even when the digest matches.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";
pub const SIGNATURE_HEADER: &str = "x-slack-signature";

const VERSION: &str = "v0";

/// Default replay window.
pub const DEFAULT_TOLERANCE: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing signature headers")]
    MissingHeaders,

    #[error("invalid request timestamp")]
    InvalidTimestamp,

    #[error("request timestamp outside the replay window")]
    Stale,

    #[error("signature mismatch")]
    Mismatch,
}

/// Verifies inbound Slack requests.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: Vec<u8>,
    tolerance: Duration,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("tolerance", &self.tolerance)
            .finish_non_exhaustive()
    }
}

impl SignatureVerifier {
    pub fn new(signing_secret: impl Into<String>) -> Self {
        Self {
            secret: signing_secret.into().into_bytes(),
            tolerance: DEFAULT_TOLERANCE,
        }
    }

    pub fn with_tolerance(mut self, tolerance: Duration) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// `v0=` plus the hex HMAC of the signing base string.
    pub fn sign(&self, timestamp: &str, body: &[u8]) -> String {
        format!("{}={}", VERSION, hex::encode(self.digest(timestamp, body)))
    }

    fn digest(&self, timestamp: &str, body: &[u8]) -> Vec<u8> {
        // HMAC accepts keys of any length.
        let mut mac = match HmacSha256::new_from_slice(&self.secret) {
            Ok(mac) => mac,
            Err(_) => return Vec::new(),
        };
        mac.update(VERSION.as_bytes());
        mac.update(b":");
        mac.update(timestamp.as_bytes());
        mac.update(b":");
        mac.update(body);
        mac.finalize().into_bytes().to_vec()
    }

    /// Verify against the current clock.
    pub fn verify(
        &self,
        timestamp: Option<&str>,
        signature: Option<&str>,
        body: &[u8],
    ) -> Result<(), SignatureError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.verify_at(timestamp, signature, body, now)
    }

    /// Verify with an explicit current time in Unix seconds.
    pub fn verify_at(
        &self,
        timestamp: Option<&str>,
        signature: Option<&str>,
        body: &[u8],
        now: u64,
    ) -> Result<(), SignatureError> {
        let (timestamp, signature) = match (timestamp, signature) {
            (Some(t), Some(s)) => (t.trim(), s.trim()),
            _ => return Err(SignatureError::MissingHeaders),
        };

        let sent: u64 = timestamp
            .parse()
            .map_err(|_| SignatureError::InvalidTimestamp)?;
        if now.abs_diff(sent) > self.tolerance.as_secs() {
            return Err(SignatureError::Stale);
        }

        let provided = signature
            .strip_prefix("v0=")
            .and_then(|hex_digest| hex::decode(hex_digest).ok())
            .ok_or(SignatureError::Mismatch)?;
        let expected = self.digest(timestamp, body);

        if expected.len() != provided.len() || !bool::from(expected.ct_eq(provided.as_slice())) {
            return Err(SignatureError::Mismatch);
        }
        Ok(())
    }
}
