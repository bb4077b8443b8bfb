//! Required-header validation for mutating endpoints.

use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use ha2ha_core::constants::{
    HEADER_AGENT_ID, HEADER_REQUEST_ID, HEADER_SIGNATURE, HEADER_TIMESTAMP, HEADER_VERSION,
};
use ha2ha_core::error::Ha2haError;
use ha2ha_core::types::{AgentId, RequestId};
use ha2ha_identity::RequestHeaders;

use crate::error::ApiError;

fn required(headers: &HeaderMap, name: &str) -> Result<String, ApiError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| {
            ApiError::from(Ha2haError::AttestationFailed(format!(
                "missing required header {name}"
            )))
        })
}

/// Parse and validate the `X-HA2HA-*` headers of a mutating request.
///
/// The timestamp must be RFC 3339 and within the clock-skew tolerance of
/// local time in either direction; violations map to `ATTESTATION_FAILED`.
pub fn validate_headers(
    headers: &HeaderMap,
    now: DateTime<Utc>,
    tolerance_secs: i64,
) -> Result<RequestHeaders, ApiError> {
    let version = required(headers, HEADER_VERSION)?;
    let agent_id = required(headers, HEADER_AGENT_ID)?;
    let request_id = required(headers, HEADER_REQUEST_ID)?;
    let timestamp_raw = required(headers, HEADER_TIMESTAMP)?;

    let timestamp = DateTime::parse_from_rfc3339(&timestamp_raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            ApiError::from(Ha2haError::AttestationFailed(format!(
                "timestamp is not RFC 3339: {e}"
            )))
        })?;

    let signature = headers
        .get(HEADER_SIGNATURE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let parsed = RequestHeaders {
        version,
        agent_id: AgentId::new(agent_id),
        request_id: RequestId(request_id),
        timestamp,
        signature,
    };
    parsed.check_clock_skew(now, tolerance_secs)?;
    Ok(parsed)
}
