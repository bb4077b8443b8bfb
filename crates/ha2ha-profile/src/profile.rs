//! The approver profile: who approves, when they are reachable, and which
//! peers they pre-trust. Stored as a YAML document at
//! `<home>/.<app>/ha2ha/approvers/<id>.yaml`.

use std::path::Path;

use chrono::{NaiveTime, Weekday};
use chrono_tz::Tz;
use ha2ha_core::error::Ha2haError;
use ha2ha_core::types::{AgentId, TrustLevel};
use serde::{Deserialize, Serialize};

/// One daily window of a scheduled availability. Windows where `end < start`
/// wrap across midnight.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ScheduleWindow {
    pub days: Vec<Weekday>,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

/// When the approver can be reached for decisions.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Availability {
    #[default]
    Always,
    /// Soft judgement: outside [wake, sleep] approvals are discouraged,
    /// not blocked.
    WakingHours {
        timezone: Tz,
        wake: NaiveTime,
        sleep: NaiveTime,
    },
    /// Strict schedule in a named timezone; authoritative when present.
    Scheduled {
        timezone: Tz,
        windows: Vec<ScheduleWindow>,
    },
}

/// Whether negative availability decisions refuse or merely warn.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Enforcement {
    Soft,
    Strict,
}

/// What the host should do with an approval that arrives off-hours.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OffHoursBehavior {
    #[default]
    Queue,
    Deny,
    Escalate,
}

/// Pre-trusted levels map onto the registry ladder: provisional/standard/
/// trusted are 2/3/4. BLOCKED and VERIFIED are never grantable by profile.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PreTrustLevel {
    Provisional,
    Standard,
    Trusted,
}

impl From<PreTrustLevel> for TrustLevel {
    fn from(level: PreTrustLevel) -> Self {
        match level {
            PreTrustLevel::Provisional => TrustLevel::Provisional,
            PreTrustLevel::Standard => TrustLevel::Standard,
            PreTrustLevel::Trusted => TrustLevel::Trusted,
        }
    }
}

/// A peer the approver vouches for ahead of first contact.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PreTrustedEntity {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_id: Option<AgentId>,
    pub level: PreTrustLevel,
    #[serde(default)]
    pub domains: Vec<String>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryTimeoutAction {
    Deny,
    Escalate,
    Hold,
}

/// What happens when the approver is unreachable past the timeout.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RecoveryPolicy {
    #[serde(default)]
    pub delegates: Vec<String>,
    pub timeout_hours: u32,
    pub timeout_action: RecoveryTimeoutAction,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ApproverProfile {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Glob patterns over task domains: `*` and `prefix/*`.
    #[serde(default)]
    pub domain_patterns: Vec<String>,
    #[serde(default)]
    pub availability: Availability,
    /// Explicit override of the per-mode default enforcement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enforcement: Option<Enforcement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presentation: Option<String>,
    /// Approvals per hour before fatigue warnings start.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fatigue_limit: Option<u32>,
    /// Starting level for peers not otherwise known. Restricted to
    /// BLOCKED / UNKNOWN / PROVISIONAL.
    #[serde(default)]
    pub default_trust: TrustLevel,
    #[serde(default)]
    pub pre_trusted: Vec<PreTrustedEntity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery: Option<RecoveryPolicy>,
    #[serde(default)]
    pub off_hours_behavior: OffHoursBehavior,
}

impl ApproverProfile {
    /// Load and validate the YAML profile document at `path`.
    pub fn load(path: &Path) -> Result<Self, Ha2haError> {
        if !path.exists() {
            return Err(Ha2haError::MissingProfile(path.display().to_string()));
        }
        let raw = std::fs::read_to_string(path).map_err(|e| Ha2haError::Storage(e.to_string()))?;
        let profile: Self =
            serde_yaml::from_str(&raw).map_err(|e| Ha2haError::InvalidProfile(e.to_string()))?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn validate(&self) -> Result<(), Ha2haError> {
        if self.id.trim().is_empty() {
            return Err(Ha2haError::InvalidProfile("id must not be empty".into()));
        }
        if self.default_trust > TrustLevel::Provisional {
            return Err(Ha2haError::InvalidProfile(format!(
                "default_trust may be BLOCKED, UNKNOWN or PROVISIONAL; got {}",
                self.default_trust
            )));
        }
        if self.fatigue_limit == Some(0) {
            return Err(Ha2haError::InvalidProfile(
                "fatigue_limit must be at least 1".into(),
            ));
        }
        if let Availability::Scheduled { windows, .. } = &self.availability {
            if windows.is_empty() {
                return Err(Ha2haError::InvalidProfile(
                    "scheduled availability needs at least one window".into(),
                ));
            }
            if windows.iter().any(|w| w.days.is_empty()) {
                return Err(Ha2haError::InvalidProfile(
                    "schedule window needs at least one day".into(),
                ));
            }
        }
        Ok(())
    }

    /// Effective enforcement: the explicit setting, or the per-mode default
    /// (waking hours are soft, schedules are strict).
    pub fn effective_enforcement(&self) -> Enforcement {
        self.enforcement.unwrap_or(match self.availability {
            Availability::Always | Availability::WakingHours { .. } => Enforcement::Soft,
            Availability::Scheduled { .. } => Enforcement::Strict,
        })
    }

    /// Whether a task domain falls under this approver. An empty pattern
    /// list covers everything.
    pub fn matches_domain(&self, domain: &str) -> bool {
        if self.domain_patterns.is_empty() {
            return true;
        }
        self.domain_patterns
            .iter()
            .any(|pattern| matches_pattern(pattern, domain))
    }
}

/// Domain pattern match: `*` covers everything, `prefix/*` covers the
/// subtree, anything else matches exactly.
pub fn matches_pattern(pattern: &str, domain: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix("/*") {
        return domain == prefix || domain.starts_with(&format!("{prefix}/"));
    }
    pattern == domain
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROFILE_YAML: &str = r#"
id: alice
display_name: Alice
domain_patterns:
  - "weather/*"
  - "search"
availability:
  mode: waking_hours
  timezone: America/New_York
  wake: "07:00:00"
  sleep: "23:00:00"
fatigue_limit: 10
default_trust: UNKNOWN
pre_trusted:
  - name: partner
    peer_id: partner.external
    level: standard
    domains: ["weather/*"]
recovery:
  delegates: ["bob"]
  timeout_hours: 24
  timeout_action: escalate
off_hours_behavior: queue
"#;

    #[test]
    fn yaml_profile_round_trips() {
        let profile: ApproverProfile = serde_yaml::from_str(PROFILE_YAML).unwrap();
        assert_eq!(profile.id, "alice");
        assert_eq!(profile.fatigue_limit, Some(10));
        assert_eq!(profile.pre_trusted.len(), 1);
        assert_eq!(
            TrustLevel::from(profile.pre_trusted[0].level),
            TrustLevel::Standard
        );
        assert!(matches!(
            profile.availability,
            Availability::WakingHours { .. }
        ));
        profile.validate().unwrap();
    }

    #[test]
    fn load_missing_file_reports_missing_profile() {
        let err = ApproverProfile::load(Path::new("/nonexistent/alice.yaml")).unwrap_err();
        assert!(matches!(err, Ha2haError::MissingProfile(_)));
    }

    #[test]
    fn load_rejects_elevated_default_trust() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.yaml");
        std::fs::write(&path, "id: p\ndefault_trust: TRUSTED\n").unwrap();
        let err = ApproverProfile::load(&path).unwrap_err();
        assert!(matches!(err, Ha2haError::InvalidProfile(_)));
    }

    #[test]
    fn domain_patterns_follow_glob_semantics() {
        assert!(matches_pattern("*", "anything/at/all"));
        assert!(matches_pattern("weather/*", "weather/forecast"));
        assert!(matches_pattern("weather/*", "weather"));
        assert!(!matches_pattern("weather/*", "weathervane"));
        assert!(matches_pattern("search", "search"));
        assert!(!matches_pattern("search", "search/deep"));
    }

    #[test]
    fn empty_pattern_list_covers_everything() {
        let profile: ApproverProfile = serde_yaml::from_str("id: p\n").unwrap();
        assert!(profile.matches_domain("whatever"));
    }

    #[test]
    fn enforcement_defaults_by_mode() {
        let waking: ApproverProfile = serde_yaml::from_str(PROFILE_YAML).unwrap();
        assert_eq!(waking.effective_enforcement(), Enforcement::Soft);

        let scheduled: ApproverProfile = serde_yaml::from_str(
            r#"
id: p
availability:
  mode: scheduled
  timezone: UTC
  windows:
    - days: [Mon, Tue]
      start: "09:00:00"
      end: "17:00:00"
"#,
        )
        .unwrap();
        assert_eq!(scheduled.effective_enforcement(), Enforcement::Strict);
    }
}
