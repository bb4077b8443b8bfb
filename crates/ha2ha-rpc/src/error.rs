//! Error mapping for the transport surface.
//!
//! Numeric codes sit in the JSON-RPC application range and map onto HTTP
//! statuses; kinds outside the protocol table fall back to the generic
//! invalid-params / internal codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use ha2ha_core::error::Ha2haError;
use serde::Serialize;
use serde_json::Value;

/// Wire shape of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Protocol error code and HTTP status for an error kind.
pub fn map_error(error: &Ha2haError) -> (i32, StatusCode) {
    use Ha2haError::*;
    match error {
        ApprovalExpired { .. } => (-32001, StatusCode::GONE),
        TaskAlreadyRejected => (-32002, StatusCode::CONFLICT),
        TaskAlreadyApproved { .. } => (-32003, StatusCode::CONFLICT),
        TaskNotFound(_) => (-32004, StatusCode::NOT_FOUND),
        HashMismatch { .. } => (-32005, StatusCode::BAD_REQUEST),
        ApproverNotQualified(_) => (-32006, StatusCode::FORBIDDEN),
        TrustLevelInsufficient { .. } => (-32007, StatusCode::FORBIDDEN),
        WorkflowDepthExceeded { .. } => (-32008, StatusCode::BAD_REQUEST),
        RateLimitExceeded => (-32009, StatusCode::TOO_MANY_REQUESTS),
        AttestationFailed(_) | SignatureInvalid | UnknownPublicKey(_) => {
            (-32010, StatusCode::UNAUTHORIZED)
        }

        TaskTimeout { .. } => (-32001, StatusCode::GONE),
        CircuitOpen { .. } => (-32009, StatusCode::TOO_MANY_REQUESTS),
        CooldownActive { .. } => (-32009, StatusCode::TOO_MANY_REQUESTS),
        PeerNotFound(_) => (-32602, StatusCode::NOT_FOUND),
        FederationDisabled(_) => (-32007, StatusCode::FORBIDDEN),

        ExtensionMissing { .. }
        | MajorVersionMismatch { .. }
        | OversightDisabled
        | ExtensionParameterInvalid(_)
        | InvalidWorkflowMeta(_)
        | CategoryScopeUnsupported
        | InvalidStateTransition { .. }
        | Canonicalization(_)
        | InvalidAuditFormat(_)
        | InvalidConfig(_)
        | Serialization(_) => (-32602, StatusCode::BAD_REQUEST),

        ChainCorrupted { .. }
        | InvalidProfile(_)
        | MissingProfile(_)
        | ExecutionFailed(_)
        | Storage(_) => (-32603, StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// Axum-facing wrapper carrying the error kind and optional detail.
#[derive(Debug)]
pub struct ApiError {
    pub error: Ha2haError,
    pub data: Option<Value>,
}

impl ApiError {
    pub fn with_data(error: Ha2haError, data: Value) -> Self {
        Self {
            error,
            data: Some(data),
        }
    }
}

impl From<Ha2haError> for ApiError {
    fn from(error: Ha2haError) -> Self {
        Self { error, data: None }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (code, status) = map_error(&self.error);
        let mut data = self.data;
        // Always expose the stable kind alongside the numeric code.
        let kind = Value::String(self.error.kind().to_string());
        data = Some(match data {
            Some(Value::Object(mut map)) => {
                map.insert("kind".into(), kind);
                Value::Object(map)
            }
            Some(other) => serde_json::json!({"kind": kind, "detail": other}),
            None => serde_json::json!({"kind": kind}),
        });
        let body = ErrorBody {
            code,
            message: self.error.to_string(),
            data,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn table_codes_match_the_protocol() {
        let cases: Vec<(Ha2haError, i32, StatusCode)> = vec![
            (
                Ha2haError::ApprovalExpired { expired_at: Utc::now() },
                -32001,
                StatusCode::GONE,
            ),
            (Ha2haError::TaskAlreadyRejected, -32002, StatusCode::CONFLICT),
            (
                Ha2haError::TaskAlreadyApproved { state: "WORKING".into() },
                -32003,
                StatusCode::CONFLICT,
            ),
            (
                Ha2haError::TaskNotFound("t".into()),
                -32004,
                StatusCode::NOT_FOUND,
            ),
            (
                Ha2haError::HashMismatch { expected: "a".into(), got: "b".into() },
                -32005,
                StatusCode::BAD_REQUEST,
            ),
            (
                Ha2haError::ApproverNotQualified("a".into()),
                -32006,
                StatusCode::FORBIDDEN,
            ),
            (
                Ha2haError::TrustLevelInsufficient {
                    required: ha2ha_core::types::TrustLevel::Standard,
                    standing: ha2ha_core::types::TrustLevel::Unknown,
                },
                -32007,
                StatusCode::FORBIDDEN,
            ),
            (
                Ha2haError::WorkflowDepthExceeded { max: 3, got: 4 },
                -32008,
                StatusCode::BAD_REQUEST,
            ),
            (Ha2haError::RateLimitExceeded, -32009, StatusCode::TOO_MANY_REQUESTS),
            (
                Ha2haError::AttestationFailed("skew".into()),
                -32010,
                StatusCode::UNAUTHORIZED,
            ),
        ];
        for (error, code, status) in cases {
            assert_eq!(map_error(&error), (code, status), "{error:?}");
        }
    }
}
