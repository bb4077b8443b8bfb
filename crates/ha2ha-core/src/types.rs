use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{
    COOLDOWN_PROVISIONAL_SECS, COOLDOWN_STANDARD_SECS, COOLDOWN_TRUSTED_SECS,
    COOLDOWN_UNKNOWN_SECS, COOLDOWN_VERIFIED_SECS,
};

/// Wall-clock instant (UTC). All protocol timestamps are RFC 3339 on the wire.
pub type Timestamp = DateTime<Utc>;

// ── AgentId ──────────────────────────────────────────────────────────────────

/// Textual peer identifier (e.g. `partner.external`). Carried on Agent Cards
/// and in the `X-HA2HA-Agent-Id` header.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AgentId({})", self.0)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ── TaskId ───────────────────────────────────────────────────────────────────

/// Unique task identifier. Freshly submitted tasks get a UUID v4; peers may
/// carry their own opaque ids.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskId({})", self.0)
    }
}

// ── RequestId ────────────────────────────────────────────────────────────────

/// Per-request identifier carried end-to-end in `X-HA2HA-Request-Id`.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Debug)]
#[serde(transparent)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── TrustLevel ───────────────────────────────────────────────────────────────

/// Graduated trust level, 0–5 with monotonic meaning.
///
/// BLOCKED never auto-recovers; every other level carries a cooldown that
/// must elapse before the next elevation. Higher levels cool down faster.
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Debug, Default,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrustLevel {
    Blocked = 0,
    #[default]
    Unknown = 1,
    Provisional = 2,
    Standard = 3,
    Trusted = 4,
    Verified = 5,
}

impl TrustLevel {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(n: u8) -> Option<Self> {
        match n {
            0 => Some(Self::Blocked),
            1 => Some(Self::Unknown),
            2 => Some(Self::Provisional),
            3 => Some(Self::Standard),
            4 => Some(Self::Trusted),
            5 => Some(Self::Verified),
            _ => None,
        }
    }

    /// Stable textual name, matching the wire encoding.
    pub fn name(self) -> &'static str {
        match self {
            Self::Blocked => "BLOCKED",
            Self::Unknown => "UNKNOWN",
            Self::Provisional => "PROVISIONAL",
            Self::Standard => "STANDARD",
            Self::Trusted => "TRUSTED",
            Self::Verified => "VERIFIED",
        }
    }

    /// Minimum interval before the next elevation from this level.
    /// `None` means infinite (BLOCKED never auto-recovers).
    pub fn elevation_cooldown(self) -> Option<Duration> {
        let secs = match self {
            Self::Blocked => return None,
            Self::Unknown => COOLDOWN_UNKNOWN_SECS,
            Self::Provisional => COOLDOWN_PROVISIONAL_SECS,
            Self::Standard => COOLDOWN_STANDARD_SECS,
            Self::Trusted => COOLDOWN_TRUSTED_SECS,
            Self::Verified => COOLDOWN_VERIFIED_SECS,
        };
        Some(Duration::from_secs(secs))
    }

    /// One level up, capped at VERIFIED.
    pub fn raised(self) -> Self {
        Self::from_u8((self.as_u8() + 1).min(5)).unwrap_or(Self::Verified)
    }

    /// Reduced by `n` levels, saturating at BLOCKED.
    pub fn lowered_by(self, n: u8) -> Self {
        Self::from_u8(self.as_u8().saturating_sub(n)).unwrap_or(Self::Blocked)
    }
}

impl fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ── WorkflowMeta ─────────────────────────────────────────────────────────────

/// Delegation metadata carried by every task: how deep in a delegation chain
/// this task sits, the ordered chain of task ids, and the origin task.
///
/// Initial depth is 1; each delegation increments the depth and appends the
/// new task id to the chain.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkflowMeta {
    pub depth: u32,
    pub chain: Vec<TaskId>,
    pub origin: TaskId,
}

impl WorkflowMeta {
    /// Metadata for a task that starts a workflow (depth 1, chain of itself).
    pub fn root(task_id: TaskId) -> Self {
        Self {
            depth: 1,
            chain: vec![task_id.clone()],
            origin: task_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trust_level_ordering_is_numeric() {
        assert!(TrustLevel::Blocked < TrustLevel::Unknown);
        assert!(TrustLevel::Trusted < TrustLevel::Verified);
        assert_eq!(TrustLevel::Standard.as_u8(), 3);
    }

    #[test]
    fn trust_level_round_trips_through_u8() {
        for n in 0..=5u8 {
            assert_eq!(TrustLevel::from_u8(n).unwrap().as_u8(), n);
        }
        assert!(TrustLevel::from_u8(6).is_none());
    }

    #[test]
    fn blocked_has_no_cooldown() {
        assert!(TrustLevel::Blocked.elevation_cooldown().is_none());
    }

    #[test]
    fn higher_levels_cool_down_faster() {
        let unknown = TrustLevel::Unknown.elevation_cooldown().unwrap();
        let verified = TrustLevel::Verified.elevation_cooldown().unwrap();
        assert!(unknown > verified);
    }

    #[test]
    fn lowered_by_saturates_at_blocked() {
        assert_eq!(TrustLevel::Provisional.lowered_by(5), TrustLevel::Blocked);
        assert_eq!(TrustLevel::Verified.lowered_by(2), TrustLevel::Standard);
    }

    #[test]
    fn raised_caps_at_verified() {
        assert_eq!(TrustLevel::Verified.raised(), TrustLevel::Verified);
        assert_eq!(TrustLevel::Unknown.raised(), TrustLevel::Provisional);
    }

    #[test]
    fn workflow_root_has_depth_one() {
        let id = TaskId::generate();
        let meta = WorkflowMeta::root(id.clone());
        assert_eq!(meta.depth, 1);
        assert_eq!(meta.chain, vec![id.clone()]);
        assert_eq!(meta.origin, id);
    }
}
