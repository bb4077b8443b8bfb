//! The combined profile gate.
//!
//! Availability decides whether approving now is acceptable; fatigue only
//! ever adds a warning. Under strict enforcement an unavailable approver
//! refuses with the profile's off-hours behavior as the suggested action;
//! under soft enforcement the result is "allowed with warning".

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::availability::check_availability;
use crate::fatigue::{FatigueStatus, FatigueTracker};
use crate::profile::{ApproverProfile, Enforcement, OffHoursBehavior};

/// The enforcer's verdict for one approval attempt.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalGate {
    pub allowed: bool,
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<OffHoursBehavior>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_available: Option<DateTime<Utc>>,
    pub fatigue: FatigueStatus,
}

pub struct ProfileEnforcer {
    profile: ApproverProfile,
    fatigue: FatigueTracker,
}

impl ProfileEnforcer {
    pub fn new(profile: ApproverProfile) -> Self {
        Self {
            profile,
            fatigue: FatigueTracker::new(),
        }
    }

    pub fn profile(&self) -> &ApproverProfile {
        &self.profile
    }

    /// Count an approval against the fatigue window.
    pub fn record_approval(&self, now: DateTime<Utc>) {
        self.fatigue.record_approval(now);
    }

    /// Combined decision over availability and fatigue.
    pub fn can_approve(&self, now: DateTime<Utc>) -> ApprovalGate {
        let availability = check_availability(&self.profile.availability, now);
        let fatigue = self.fatigue.check(self.profile.fatigue_limit, now);

        let mut warnings = Vec::new();
        let mut allowed = true;
        let mut suggested_action = None;

        if !availability.available {
            match self.profile.effective_enforcement() {
                Enforcement::Strict => {
                    allowed = false;
                    suggested_action = Some(self.profile.off_hours_behavior);
                }
                Enforcement::Soft => {
                    if let Some(warning) = &availability.warning {
                        warnings.push(warning.clone());
                    }
                }
            }
        }

        if fatigue.exceeded {
            warnings.push(format!(
                "fatigue limit reached: {} approvals in the last hour",
                fatigue.count
            ));
        }

        ApprovalGate {
            allowed,
            warnings,
            suggested_action,
            next_available: availability.next_available,
            fatigue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;
    use chrono_tz::Tz;

    fn t(s: &str) -> NaiveTime {
        s.parse().unwrap()
    }

    fn utc(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn scheduled_profile(off_hours: OffHoursBehavior) -> ApproverProfile {
        let mut profile: ApproverProfile = serde_yaml::from_str("id: alice\n").unwrap();
        profile.availability = crate::profile::Availability::Scheduled {
            timezone: Tz::UTC,
            windows: vec![crate::profile::ScheduleWindow {
                days: vec![chrono::Weekday::Mon],
                start: t("09:00:00"),
                end: t("17:00:00"),
            }],
        };
        profile.off_hours_behavior = off_hours;
        profile
    }

    #[test]
    fn always_available_profile_allows() {
        let enforcer =
            ProfileEnforcer::new(serde_yaml::from_str("id: alice\n").unwrap());
        let gate = enforcer.can_approve(Utc::now());
        assert!(gate.allowed);
        assert!(gate.warnings.is_empty());
    }

    #[test]
    fn strict_schedule_refuses_off_hours_with_suggested_action() {
        let enforcer = ProfileEnforcer::new(scheduled_profile(OffHoursBehavior::Escalate));
        // 2026-03-14 is a Saturday.
        let gate = enforcer.can_approve(utc("2026-03-14T12:00:00Z"));
        assert!(!gate.allowed);
        assert_eq!(gate.suggested_action, Some(OffHoursBehavior::Escalate));
        assert!(gate.next_available.is_some());
    }

    #[test]
    fn soft_waking_hours_allow_with_warning() {
        let mut profile: ApproverProfile = serde_yaml::from_str("id: alice\n").unwrap();
        profile.availability = crate::profile::Availability::WakingHours {
            timezone: Tz::UTC,
            wake: t("07:00:00"),
            sleep: t("23:00:00"),
        };
        let enforcer = ProfileEnforcer::new(profile);
        let gate = enforcer.can_approve(utc("2026-03-14T03:00:00Z"));
        assert!(gate.allowed);
        assert_eq!(gate.warnings.len(), 1);
        assert!(gate.suggested_action.is_none());
    }

    #[test]
    fn fatigue_warns_but_never_refuses() {
        let mut profile: ApproverProfile = serde_yaml::from_str("id: alice\n").unwrap();
        profile.fatigue_limit = Some(2);
        let enforcer = ProfileEnforcer::new(profile);
        let now = Utc::now();
        enforcer.record_approval(now);
        enforcer.record_approval(now);

        let gate = enforcer.can_approve(now);
        assert!(gate.allowed);
        assert!(gate.fatigue.exceeded);
        assert_eq!(gate.warnings.len(), 1);
    }
}
