//! Approval fatigue: a rolling one-hour window of recorded approvals.
//!
//! Reaching the profile's limit reports `exceeded` and warns; it never
//! refuses on its own. The host decides what to do with a tired approver.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use ha2ha_core::constants::FATIGUE_WINDOW_SECS;
use serde::Serialize;
use tracing::warn;

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FatigueStatus {
    pub count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    pub exceeded: bool,
}

#[derive(Default)]
pub struct FatigueTracker {
    approvals: Mutex<VecDeque<DateTime<Utc>>>,
}

impl FatigueTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn prune(approvals: &mut VecDeque<DateTime<Utc>>, now: DateTime<Utc>) {
        let cutoff = now - Duration::seconds(FATIGUE_WINDOW_SECS);
        while matches!(approvals.front(), Some(at) if *at <= cutoff) {
            approvals.pop_front();
        }
    }

    /// Count one approval at `now`.
    pub fn record_approval(&self, now: DateTime<Utc>) {
        let mut approvals = self.approvals.lock().unwrap();
        Self::prune(&mut approvals, now);
        approvals.push_back(now);
    }

    /// The window count against `limit`. Exceeding warns once per check.
    pub fn check(&self, limit: Option<u32>, now: DateTime<Utc>) -> FatigueStatus {
        let mut approvals = self.approvals.lock().unwrap();
        Self::prune(&mut approvals, now);
        let count = approvals.len() as u32;
        let exceeded = matches!(limit, Some(limit) if count >= limit);
        if exceeded {
            warn!(count, ?limit, "approval fatigue limit reached");
        }
        FatigueStatus {
            count,
            limit,
            exceeded,
        }
    }
}
