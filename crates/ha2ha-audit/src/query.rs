//! Query surface over a chain snapshot.
//!
//! All helpers operate on a snapshot of the current entries; concurrent
//! appends never invalidate an in-flight query.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use ha2ha_core::types::{AgentId, TaskId};

use crate::chain::AuditChain;
use crate::entry::{AuditEntry, AuditEventType, AuditOutcome};

/// Filter over audit entries. Unset fields match everything; the time
/// interval is half-open `[start, end)`.
#[derive(Clone, Debug, Default)]
pub struct AuditQuery {
    pub event_types: Option<Vec<AuditEventType>>,
    pub task_id: Option<TaskId>,
    pub source: Option<AgentId>,
    pub target: Option<AgentId>,
    pub human_id: Option<String>,
    pub outcome: Option<AuditOutcome>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub descending: bool,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl AuditQuery {
    fn matches(&self, entry: &AuditEntry) -> bool {
        if let Some(types) = &self.event_types {
            if !types.contains(&entry.event_type) {
                return false;
            }
        }
        if let Some(task_id) = &self.task_id {
            if entry.task_id.as_ref() != Some(task_id) {
                return false;
            }
        }
        if let Some(source) = &self.source {
            if entry.source != *source {
                return false;
            }
        }
        if let Some(target) = &self.target {
            if entry.target != *target {
                return false;
            }
        }
        if let Some(human_id) = &self.human_id {
            if entry.human_id.as_deref() != Some(human_id.as_str()) {
                return false;
            }
        }
        if let Some(outcome) = self.outcome {
            if entry.outcome != outcome {
                return false;
            }
        }
        if let Some(start) = self.start {
            if entry.timestamp < start {
                return false;
            }
        }
        if let Some(end) = self.end {
            if entry.timestamp >= end {
                return false;
            }
        }
        true
    }
}

impl AuditChain {
    /// Entries matching `query`, ordered and paginated.
    pub fn query(&self, query: &AuditQuery) -> Vec<AuditEntry> {
        let mut matched: Vec<AuditEntry> = self
            .entries()
            .into_iter()
            .filter(|e| query.matches(e))
            .collect();
        if query.descending {
            matched.reverse();
        }
        let limit = query.limit.unwrap_or(usize::MAX);
        matched.into_iter().skip(query.offset).take(limit).collect()
    }

    /// Every entry touching `task_id`, oldest first.
    pub fn task_history(&self, task_id: &TaskId) -> Vec<AuditEntry> {
        self.query(&AuditQuery {
            task_id: Some(task_id.clone()),
            ..Default::default()
        })
    }

    /// Every entry where `peer` is the source or the target, oldest first.
    pub fn peer_history(&self, peer: &AgentId) -> Vec<AuditEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.source == *peer || e.target == *peer)
            .collect()
    }

    /// Every entry attributed to `human_id`, oldest first.
    pub fn human_history(&self, human_id: &str) -> Vec<AuditEntry> {
        self.query(&AuditQuery {
            human_id: Some(human_id.to_string()),
            ..Default::default()
        })
    }

    /// The `n` most recent entries, newest first.
    pub fn recent(&self, n: usize) -> Vec<AuditEntry> {
        self.query(&AuditQuery {
            descending: true,
            limit: Some(n),
            ..Default::default()
        })
    }

    pub fn counts_by_type(&self) -> BTreeMap<String, u64> {
        let mut counts = BTreeMap::new();
        for entry in self.entries() {
            let key = serde_json::to_value(entry.event_type)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default();
            *counts.entry(key).or_insert(0) += 1;
        }
        counts
    }

    pub fn counts_by_outcome(&self) -> BTreeMap<String, u64> {
        let mut counts = BTreeMap::new();
        for entry in self.entries() {
            let key = serde_json::to_value(entry.outcome)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default();
            *counts.entry(key).or_insert(0) += 1;
        }
        counts
    }

    /// Entry counts per UTC calendar date (`YYYY-MM-DD`).
    pub fn grouped_by_date(&self) -> BTreeMap<String, u64> {
        let mut counts = BTreeMap::new();
        for entry in self.entries() {
            let key = entry.timestamp.format("%Y-%m-%d").to_string();
            *counts.entry(key).or_insert(0) += 1;
        }
        counts
    }

    /// The security subset: alerts, violations, circuit transitions, and
    /// chain tampering.
    pub fn security_events(&self) -> Vec<AuditEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.event_type.is_security())
            .collect()
    }

    /// Substring search over the serialized detail object.
    pub fn search(&self, needle: &str) -> Vec<AuditEntry> {
        self.entries()
            .into_iter()
            .filter(|e| {
                serde_json::to_string(&e.detail)
                    .map(|s| s.contains(needle))
                    .unwrap_or(false)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::AuditInput;
    use serde_json::json;

    fn seeded_chain(dir: &tempfile::TempDir) -> AuditChain {
        let chain = AuditChain::open(
            &dir.path().join("audit.ndjson"),
            AgentId::new("local"),
            false,
        )
        .unwrap();
        let base: DateTime<Utc> = "2026-03-01T10:00:00Z".parse().unwrap();
        let events = [
            (AuditEventType::TaskSubmitted, "t-1", AuditOutcome::Pending),
            (AuditEventType::TaskApproved, "t-1", AuditOutcome::Success),
            (AuditEventType::TaskSubmitted, "t-2", AuditOutcome::Pending),
            (AuditEventType::SecurityAlert, "t-2", AuditOutcome::Error),
            (AuditEventType::TaskCompleted, "t-1", AuditOutcome::Success),
        ];
        for (i, (event, task, outcome)) in events.into_iter().enumerate() {
            let input = AuditInput::new(
                event,
                AgentId::new("partner.external"),
                AgentId::new("local"),
                outcome,
            )
            .task(TaskId::new(task))
            .human("alice")
            .detail(json!({"task": task}));
            chain
                .append_at(input, base + chrono::Duration::hours(i as i64))
                .unwrap();
        }
        chain
    }

    #[test]
    fn task_history_is_scoped_and_ordered() {
        let dir = tempfile::tempdir().unwrap();
        let chain = seeded_chain(&dir);
        let history = chain.task_history(&TaskId::new("t-1"));
        assert_eq!(history.len(), 3);
        assert!(history.windows(2).all(|w| w[0].seq < w[1].seq));
    }

    #[test]
    fn time_interval_is_half_open() {
        let dir = tempfile::tempdir().unwrap();
        let chain = seeded_chain(&dir);
        let start: DateTime<Utc> = "2026-03-01T10:00:00Z".parse().unwrap();
        let end: DateTime<Utc> = "2026-03-01T12:00:00Z".parse().unwrap();
        let hits = chain.query(&AuditQuery {
            start: Some(start),
            end: Some(end),
            ..Default::default()
        });
        // Entries at 10:00 and 11:00 are in; the one at exactly 12:00 is out.
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn recent_returns_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let chain = seeded_chain(&dir);
        let recent = chain.recent(2);
        assert_eq!(recent.len(), 2);
        assert!(recent[0].seq > recent[1].seq);
    }

    #[test]
    fn pagination_applies_after_ordering() {
        let dir = tempfile::tempdir().unwrap();
        let chain = seeded_chain(&dir);
        let page = chain.query(&AuditQuery {
            descending: true,
            offset: 1,
            limit: Some(2),
            ..Default::default()
        });
        assert_eq!(page.len(), 2);
        let all = chain.recent(usize::MAX);
        assert_eq!(page[0].seq, all[1].seq);
    }

    #[test]
    fn security_subset_and_search() {
        let dir = tempfile::tempdir().unwrap();
        let chain = seeded_chain(&dir);
        let security = chain.security_events();
        assert_eq!(security.len(), 1);
        assert_eq!(security[0].event_type, AuditEventType::SecurityAlert);

        let hits = chain.search("t-2");
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn counts_group_correctly() {
        let dir = tempfile::tempdir().unwrap();
        let chain = seeded_chain(&dir);
        let by_type = chain.counts_by_type();
        assert_eq!(by_type.get("TASK_SUBMITTED"), Some(&2));
        let by_outcome = chain.counts_by_outcome();
        assert_eq!(by_outcome.get("success"), Some(&2));
        // Genesis plus five appended entries, all on one date.
        let by_date = chain.grouped_by_date();
        assert_eq!(by_date.values().sum::<u64>(), 6);
    }
}
