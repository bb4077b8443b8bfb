//! Per-request HA2HA headers.
//!
//! Every mutating request carries the protocol version, the sender's agent
//! id, a unique request id (carried end-to-end for idempotence), and an
//! RFC 3339 timestamp; a detached signature over the body is optional.

use chrono::{DateTime, Utc};
use ha2ha_core::constants::{CLOCK_SKEW_TOLERANCE_SECS, PROTOCOL_VERSION};
use ha2ha_core::error::Ha2haError;
use ha2ha_core::types::{AgentId, RequestId};

use crate::ed25519;
use crate::keypair::AgentKeyPair;

#[derive(Clone, Debug)]
pub struct RequestHeaders {
    pub version: String,
    pub agent_id: AgentId,
    pub request_id: RequestId,
    pub timestamp: DateTime<Utc>,
    pub signature: Option<String>,
}

impl RequestHeaders {
    /// Fresh headers stamped with the current protocol version, a new
    /// request id, and the current time.
    pub fn new(agent_id: AgentId, now: DateTime<Utc>) -> Self {
        Self {
            version: PROTOCOL_VERSION.to_string(),
            agent_id,
            request_id: RequestId::generate(),
            timestamp: now,
            signature: None,
        }
    }

    /// Headers with a detached signature over the request body.
    pub fn signed(keypair: &AgentKeyPair, body: &[u8], now: DateTime<Utc>) -> Self {
        let mut headers = Self::new(keypair.agent_id.clone(), now);
        headers.signature = Some(keypair.sign(body));
        headers
    }

    /// Reject timestamps that deviate from `now` by more than `tolerance_secs`
    /// in either direction. Exactly at the tolerance is accepted.
    pub fn check_clock_skew(&self, now: DateTime<Utc>, tolerance_secs: i64) -> Result<(), Ha2haError> {
        let drift = (now - self.timestamp).num_seconds().abs();
        if drift > tolerance_secs {
            return Err(Ha2haError::AttestationFailed(format!(
                "request timestamp drifts {drift}s from local time (tolerance {tolerance_secs}s)"
            )));
        }
        Ok(())
    }

    /// Clock-skew check with the protocol default tolerance.
    pub fn check_clock_skew_default(&self, now: DateTime<Utc>) -> Result<(), Ha2haError> {
        self.check_clock_skew(now, CLOCK_SKEW_TOLERANCE_SECS)
    }

    /// Verify the optional body signature under the sender's public key.
    pub fn verify_signature(&self, public_key_hex: &str, body: &[u8]) -> Result<(), Ha2haError> {
        let sig = self
            .signature
            .as_deref()
            .ok_or(Ha2haError::SignatureInvalid)?;
        ed25519::verify(public_key_hex, body, sig)
    }
}
