//! ─── HA2HA Protocol Constants ───────────────────────────────────────────────
//!
//! "No cross-agent execution without a human in the loop."
//!
//! Extension URI: https://ha2ha.dev/ext/human-oversight/v1
//! Spec version:  0.1.0

// ── Protocol / extension ─────────────────────────────────────────────────────

/// Capability-extension URI advertised on Agent Cards. The trailing `v<N>`
/// path segment is the protocol major version.
pub const HA2HA_EXTENSION_URI: &str = "https://ha2ha.dev/ext/human-oversight/v1";

/// Current spec version (semver).
pub const PROTOCOL_VERSION: &str = "0.1.0";

/// All spec versions this implementation can speak, newest first.
pub const SUPPORTED_VERSIONS: &[&str] = &["0.1.0"];

/// Protocol major version, as encoded in the extension URI suffix.
pub const PROTOCOL_MAJOR: u64 = 1;

// ── Trust cooldowns (seconds before next elevation) ──────────────────────────

/// First sight of a peer: 24 hours before it can be elevated past UNKNOWN.
pub const COOLDOWN_UNKNOWN_SECS: u64 = 24 * 3600;

pub const COOLDOWN_PROVISIONAL_SECS: u64 = 4 * 3600;
pub const COOLDOWN_STANDARD_SECS: u64 = 3600;
pub const COOLDOWN_TRUSTED_SECS: u64 = 15 * 60;
pub const COOLDOWN_VERIFIED_SECS: u64 = 5 * 60;

// ── Approval lifecycle ───────────────────────────────────────────────────────

/// Default window for a SUBMITTED task to be approved before it times out.
pub const DEFAULT_TASK_TIMEOUT_SECS: i64 = 3600;

/// Default validity window of a SIMILAR-scope approval.
pub const SIMILAR_APPROVAL_EXPIRY_SECS: i64 = 24 * 3600;

// ── Workflow depth ───────────────────────────────────────────────────────────

/// Maximum admissible delegation depth. A task at this depth may still run,
/// but may not delegate further.
pub const MAX_WORKFLOW_DEPTH: u32 = 3;

// ── Circuit breaker defaults ─────────────────────────────────────────────────

/// Consecutive failures before the breaker trips.
pub const BREAKER_FAILURE_THRESHOLD: u32 = 3;

/// Windowed failures before the breaker trips.
pub const BREAKER_WINDOW_THRESHOLD: u32 = 5;

/// Length of the windowed-failure window.
pub const BREAKER_WINDOW_SECS: i64 = 5 * 60;

/// Time an OPEN breaker waits before permitting a half-open probe.
pub const BREAKER_RESET_TIMEOUT_SECS: i64 = 3600;

// ── Transport ────────────────────────────────────────────────────────────────

/// Maximum request-timestamp drift from local time, in either direction.
/// Exactly at the tolerance is accepted; one second beyond is rejected.
pub const CLOCK_SKEW_TOLERANCE_SECS: i64 = 60;

pub const HEADER_VERSION: &str = "X-HA2HA-Version";
pub const HEADER_AGENT_ID: &str = "X-HA2HA-Agent-Id";
pub const HEADER_REQUEST_ID: &str = "X-HA2HA-Request-Id";
pub const HEADER_TIMESTAMP: &str = "X-HA2HA-Timestamp";
pub const HEADER_SIGNATURE: &str = "X-HA2HA-Signature";

/// Well-known path prefix for the HA2HA endpoints.
pub const WELL_KNOWN_PREFIX: &str = "/.well-known/ha2ha/v1";

/// Well-known path of the serialized Agent Card.
pub const AGENT_CARD_PATH: &str = "/.well-known/agent.json";

// ── Profile enforcement ──────────────────────────────────────────────────────

/// Rolling window over which approvals count against the fatigue limit.
pub const FATIGUE_WINDOW_SECS: i64 = 3600;

// ── Trust level bounds on the wire ───────────────────────────────────────────

/// Minimum trust level a card may require (inclusive).
pub const MIN_REQUIRED_TRUST: u8 = 1;

/// Maximum trust level a card may require (inclusive).
pub const MAX_REQUIRED_TRUST: u8 = 5;
