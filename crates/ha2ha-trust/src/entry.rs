use chrono::{DateTime, Duration, Utc};
use ha2ha_core::types::{AgentId, TrustLevel};
use serde::{Deserialize, Serialize};

/// Severity of a recorded trust violation.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationSeverity {
    /// Logged only; no level change.
    Low,
    /// One level down.
    Medium,
    /// Two levels down.
    High,
    /// Straight to BLOCKED.
    Critical,
}

impl ViolationSeverity {
    /// Levels removed by this severity. `None` means "to BLOCKED outright".
    pub fn level_penalty(self) -> Option<u8> {
        match self {
            Self::Low => Some(0),
            Self::Medium => Some(1),
            Self::High => Some(2),
            Self::Critical => None,
        }
    }
}

/// Why a trust level changed.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransitionReason {
    /// Entry created on first sight of the peer.
    FirstContact,
    /// A human set the level directly.
    ManualOverride,
    /// Single-step elevation after the cooldown elapsed.
    Elevation,
    Violation { severity: ViolationSeverity },
    Blocked,
    Unblocked,
    /// Level granted by the approver profile's pre-trusted list.
    PreTrusted,
}

/// One recorded level change.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrustTransition {
    pub from: TrustLevel,
    pub to: TrustLevel,
    pub reason: TransitionReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approver: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub at: DateTime<Utc>,
}

/// The registry's durable record for one peer.
///
/// Every mutation appends exactly one history entry; the level never leaves
/// [0, 5]. A BLOCKED entry never recovers automatically.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrustEntry {
    pub peer: AgentId,
    pub level: TrustLevel,
    pub created_at: DateTime<Utc>,
    pub last_transition: DateTime<Utc>,
    pub last_reason: TransitionReason,
    pub violation_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown_expires: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pre_approved_scopes: Vec<String>,
    #[serde(default)]
    pub history: Vec<TrustTransition>,
}

impl TrustEntry {
    /// Fresh entry at UNKNOWN with the first-contact cooldown running.
    pub fn first_contact(peer: AgentId, now: DateTime<Utc>) -> Self {
        let level = TrustLevel::Unknown;
        let cooldown = level
            .elevation_cooldown()
            .map(|d| now + Duration::from_std(d).expect("cooldowns fit in chrono range"));
        Self {
            peer,
            level,
            created_at: now,
            last_transition: now,
            last_reason: TransitionReason::FirstContact,
            violation_count: 0,
            cooldown_expires: cooldown,
            pre_approved_scopes: Vec::new(),
            history: vec![TrustTransition {
                from: level,
                to: level,
                reason: TransitionReason::FirstContact,
                approver: None,
                details: None,
                at: now,
            }],
        }
    }

    /// Move to `to`, appending one history entry and restarting the cooldown
    /// for the new level.
    pub fn transition(
        &mut self,
        to: TrustLevel,
        reason: TransitionReason,
        approver: Option<String>,
        details: Option<String>,
        now: DateTime<Utc>,
    ) {
        self.history.push(TrustTransition {
            from: self.level,
            to,
            reason: reason.clone(),
            approver,
            details,
            at: now,
        });
        self.level = to;
        self.last_transition = now;
        self.last_reason = reason;
        self.cooldown_expires = to
            .elevation_cooldown()
            .map(|d| now + Duration::from_std(d).expect("cooldowns fit in chrono range"));
    }

    /// Whether the elevation cooldown is still running at `now`.
    /// Exactly at the expiry instant the cooldown is over.
    pub fn in_cooldown(&self, now: DateTime<Utc>) -> bool {
        matches!(self.cooldown_expires, Some(expiry) if now < expiry)
    }
}

/// Read-only view handed to authorization-time callers.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustContext {
    pub peer: AgentId,
    pub level: TrustLevel,
    pub level_name: &'static str,
    pub last_transition: DateTime<Utc>,
    pub last_reason: TransitionReason,
    pub violation_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_expires: Option<DateTime<Utc>>,
    pub pre_approved_scopes: Vec<String>,
}

impl From<&TrustEntry> for TrustContext {
    fn from(entry: &TrustEntry) -> Self {
        Self {
            peer: entry.peer.clone(),
            level: entry.level,
            level_name: entry.level.name(),
            last_transition: entry.last_transition,
            last_reason: entry.last_reason.clone(),
            violation_count: entry.violation_count,
            cooldown_expires: entry.cooldown_expires,
            pre_approved_scopes: entry.pre_approved_scopes.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_contact_starts_unknown_with_24h_cooldown() {
        let now = Utc::now();
        let entry = TrustEntry::first_contact(AgentId::new("p"), now);
        assert_eq!(entry.level, TrustLevel::Unknown);
        assert_eq!(entry.cooldown_expires, Some(now + Duration::hours(24)));
        assert_eq!(entry.history.len(), 1);
    }

    #[test]
    fn every_transition_appends_one_history_entry() {
        let now = Utc::now();
        let mut entry = TrustEntry::first_contact(AgentId::new("p"), now);
        entry.transition(
            TrustLevel::Provisional,
            TransitionReason::Elevation,
            Some("alice".into()),
            None,
            now + Duration::days(1),
        );
        entry.transition(
            TrustLevel::Blocked,
            TransitionReason::Blocked,
            Some("alice".into()),
            Some("credential leak".into()),
            now + Duration::days(2),
        );
        assert_eq!(entry.history.len(), 3);
        assert_eq!(entry.history[1].from, TrustLevel::Unknown);
        assert_eq!(entry.history[1].to, TrustLevel::Provisional);
        assert_eq!(entry.level, TrustLevel::Blocked);
        // Blocked carries no expiry: recovery is never automatic.
        assert!(entry.cooldown_expires.is_none());
    }

    #[test]
    fn cooldown_boundary_is_inclusive_of_the_expiry_instant() {
        let now = Utc::now();
        let entry = TrustEntry::first_contact(AgentId::new("p"), now);
        let expiry = entry.cooldown_expires.unwrap();
        assert!(entry.in_cooldown(expiry - Duration::milliseconds(1)));
        assert!(!entry.in_cooldown(expiry));
    }

    #[test]
    fn severity_penalties_match_the_ladder() {
        assert_eq!(ViolationSeverity::Low.level_penalty(), Some(0));
        assert_eq!(ViolationSeverity::Medium.level_penalty(), Some(1));
        assert_eq!(ViolationSeverity::High.level_penalty(), Some(2));
        assert_eq!(ViolationSeverity::Critical.level_penalty(), None);
    }
}
