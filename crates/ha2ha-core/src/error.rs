use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::TrustLevel;

#[derive(Debug, Error)]
pub enum Ha2haError {
    // ── Identity errors ──────────────────────────────────────────────────────
    #[error("invalid signature")]
    SignatureInvalid,

    #[error("attestation failed: {0}")]
    AttestationFailed(String),

    #[error("unknown public key for agent: {0}")]
    UnknownPublicKey(String),

    // ── Negotiation errors ───────────────────────────────────────────────────
    #[error("required extension missing: {uri}")]
    ExtensionMissing { uri: String },

    #[error("major version mismatch: ours v{ours}, peer v{theirs}")]
    MajorVersionMismatch { ours: u64, theirs: u64 },

    #[error("peer card does not declare humanOversight=true")]
    OversightDisabled,

    #[error("invalid extension parameter: {0}")]
    ExtensionParameterInvalid(String),

    #[error("trust level insufficient: peer requires {required}, standing is {standing}")]
    TrustLevelInsufficient {
        required: TrustLevel,
        standing: TrustLevel,
    },

    // ── Trust registry errors ────────────────────────────────────────────────
    #[error("elevation cooldown active until {until}")]
    CooldownActive { until: DateTime<Utc> },

    #[error("unknown peer: {0}")]
    PeerNotFound(String),

    #[error("federation disabled: {0}")]
    FederationDisabled(String),

    // ── Lifecycle errors ─────────────────────────────────────────────────────
    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("task already approved (state: {state})")]
    TaskAlreadyApproved { state: String },

    #[error("task already rejected")]
    TaskAlreadyRejected,

    #[error("task timed out at {expired_at}")]
    TaskTimeout { expired_at: DateTime<Utc> },

    #[error("payload hash mismatch: expected {expected}…, got {got}…")]
    HashMismatch { expected: String, got: String },

    #[error("approval expired at {expired_at}")]
    ApprovalExpired { expired_at: DateTime<Utc> },

    #[error("approver not qualified: {0}")]
    ApproverNotQualified(String),

    #[error("invalid state transition: {from} → {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("CATEGORY approval scope is not yet supported")]
    CategoryScopeUnsupported,

    #[error("task execution failed: {0}")]
    ExecutionFailed(String),

    // ── Circuit / depth errors ───────────────────────────────────────────────
    #[error("circuit open for peer; retry after {retry_at}")]
    CircuitOpen { retry_at: DateTime<Utc> },

    #[error("workflow depth exceeded: max {max}, got {got}")]
    WorkflowDepthExceeded { max: u32, got: u32 },

    #[error("invalid workflow metadata: {0}")]
    InvalidWorkflowMeta(String),

    #[error("rate limit exceeded")]
    RateLimitExceeded,

    // ── Audit errors ─────────────────────────────────────────────────────────
    #[error("audit chain corrupted at entry {broken_at}: {kind}")]
    ChainCorrupted { broken_at: usize, kind: String },

    #[error("invalid audit record format: {0}")]
    InvalidAuditFormat(String),

    // ── Config / profile errors ──────────────────────────────────────────────
    #[error("invalid approver profile: {0}")]
    InvalidProfile(String),

    #[error("approver profile not found: {0}")]
    MissingProfile(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Canonicalization / serialization / storage ───────────────────────────
    #[error("canonicalization failed: {0}")]
    Canonicalization(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl Ha2haError {
    /// Stable machine-readable kind, used in error bodies and audit details.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SignatureInvalid => "SIGNATURE_INVALID",
            Self::AttestationFailed(_) => "ATTESTATION_FAILED",
            Self::UnknownPublicKey(_) => "UNKNOWN_PUBLIC_KEY",
            Self::ExtensionMissing { .. } => "EXTENSION_MISSING",
            Self::MajorVersionMismatch { .. } => "MAJOR_VERSION_MISMATCH",
            Self::OversightDisabled => "OVERSIGHT_DISABLED",
            Self::ExtensionParameterInvalid(_) => "EXTENSION_PARAMETER_INVALID",
            Self::TrustLevelInsufficient { .. } => "TRUST_LEVEL_INSUFFICIENT",
            Self::CooldownActive { .. } => "COOLDOWN_ACTIVE",
            Self::PeerNotFound(_) => "PEER_NOT_FOUND",
            Self::FederationDisabled(_) => "FEDERATION_DISABLED",
            Self::TaskNotFound(_) => "TASK_NOT_FOUND",
            Self::TaskAlreadyApproved { .. } => "TASK_ALREADY_APPROVED",
            Self::TaskAlreadyRejected => "TASK_ALREADY_REJECTED",
            Self::TaskTimeout { .. } => "TASK_TIMEOUT",
            Self::HashMismatch { .. } => "HASH_MISMATCH",
            Self::ApprovalExpired { .. } => "APPROVAL_EXPIRED",
            Self::ApproverNotQualified(_) => "APPROVER_NOT_QUALIFIED",
            Self::InvalidStateTransition { .. } => "INVALID_STATE_TRANSITION",
            Self::CategoryScopeUnsupported => "CATEGORY_SCOPE_UNSUPPORTED",
            Self::ExecutionFailed(_) => "EXECUTION_FAILED",
            Self::CircuitOpen { .. } => "CIRCUIT_OPEN",
            Self::WorkflowDepthExceeded { .. } => "WORKFLOW_DEPTH_EXCEEDED",
            Self::InvalidWorkflowMeta(_) => "INVALID_WORKFLOW_METADATA",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::ChainCorrupted { .. } => "CHAIN_CORRUPTED",
            Self::InvalidAuditFormat(_) => "INVALID_AUDIT_FORMAT",
            Self::InvalidProfile(_) => "INVALID_PROFILE",
            Self::MissingProfile(_) => "MISSING_PROFILE",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::Canonicalization(_) => "CANONICALIZATION_FAILED",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Storage(_) => "STORAGE_ERROR",
        }
    }
}
