use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use ha2ha_audit::{AuditEventType, AuditInput, AuditOutcome, AuditSink};
use ha2ha_core::error::Ha2haError;
use ha2ha_core::types::{AgentId, TrustLevel};
use serde_json::json;
use tracing::{info, warn};

use crate::entry::{TransitionReason, TrustContext, TrustEntry, ViolationSeverity};
use crate::store::TrustStore;

/// Aggregate registry statistics.
#[derive(Clone, Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustStats {
    pub total_peers: usize,
    pub by_level: BTreeMap<&'static str, usize>,
    pub total_violations: u64,
    pub blocked: usize,
}

/// Durable map from peer id to trust entry, enforcing the graduated trust
/// rules: single-step elevations gated by per-level cooldowns, severity-
/// scaled violation penalties, and a BLOCKED state that never auto-recovers.
///
/// One exclusive writer at a time; reads run concurrently between writes.
/// Persist-on-change is best-effort: a failed flush is logged, never
/// surfaced.
pub struct TrustRegistry {
    agent_id: AgentId,
    entries: RwLock<HashMap<AgentId, TrustEntry>>,
    store: Option<TrustStore>,
    audit: Arc<dyn AuditSink>,
}

impl TrustRegistry {
    /// Open the registry, loading any persisted entries.
    pub fn open(
        agent_id: AgentId,
        store: Option<TrustStore>,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self, Ha2haError> {
        let entries = match &store {
            Some(store) => store.load()?,
            None => HashMap::new(),
        };
        info!(peers = entries.len(), "trust registry opened");
        Ok(Self {
            agent_id,
            entries: RwLock::new(entries),
            store,
            audit,
        })
    }

    /// In-memory registry (no persistence), for hosts and tests.
    pub fn in_memory(agent_id: AgentId, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            agent_id,
            entries: RwLock::new(HashMap::new()),
            store: None,
            audit,
        }
    }

    fn persist(&self, entries: &HashMap<AgentId, TrustEntry>) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save(entries) {
                warn!("trust store flush failed: {e}");
            }
        }
    }

    fn audit_transition(
        &self,
        event: AuditEventType,
        entry: &TrustEntry,
        approver: Option<&str>,
        outcome: AuditOutcome,
        detail: serde_json::Value,
    ) {
        let mut input = AuditInput::new(
            event,
            entry.peer.clone(),
            self.agent_id.clone(),
            outcome,
        )
        .trust(entry.level)
        .detail(detail);
        if let Some(approver) = approver {
            input = input.human(approver);
        }
        self.audit.record(input);
    }

    // ── Reads ────────────────────────────────────────────────────────────────

    /// Snapshot of a peer's entry, if known.
    pub fn get(&self, peer: &AgentId) -> Option<TrustEntry> {
        self.entries.read().unwrap().get(peer).cloned()
    }

    /// The peer's current level; UNKNOWN peers report BLOCKED only when an
    /// entry says so.
    pub fn level_of(&self, peer: &AgentId) -> Option<TrustLevel> {
        self.entries.read().unwrap().get(peer).map(|e| e.level)
    }

    /// Authorization-time view of a peer.
    pub fn context(&self, peer: &AgentId) -> Option<TrustContext> {
        self.entries.read().unwrap().get(peer).map(TrustContext::from)
    }

    pub fn peers_at_level(&self, level: TrustLevel) -> Vec<AgentId> {
        let mut peers: Vec<AgentId> = self
            .entries
            .read()
            .unwrap()
            .values()
            .filter(|e| e.level == level)
            .map(|e| e.peer.clone())
            .collect();
        peers.sort();
        peers
    }

    pub fn blocked_peers(&self) -> Vec<AgentId> {
        self.peers_at_level(TrustLevel::Blocked)
    }

    pub fn stats(&self) -> TrustStats {
        let entries = self.entries.read().unwrap();
        let mut by_level = BTreeMap::new();
        let mut total_violations = 0u64;
        for entry in entries.values() {
            *by_level.entry(entry.level.name()).or_insert(0) += 1;
            total_violations += entry.violation_count as u64;
        }
        TrustStats {
            total_peers: entries.len(),
            blocked: *by_level.get(TrustLevel::Blocked.name()).unwrap_or(&0),
            by_level,
            total_violations,
        }
    }

    // ── Writes ───────────────────────────────────────────────────────────────

    /// Return the peer's entry, creating it at UNKNOWN (with the 24-hour
    /// first-contact cooldown) on first sight.
    pub fn get_or_create(&self, peer: &AgentId, now: DateTime<Utc>) -> TrustEntry {
        if let Some(existing) = self.get(peer) {
            return existing;
        }
        let mut entries = self.entries.write().unwrap();
        let entry = entries
            .entry(peer.clone())
            .or_insert_with(|| {
                info!(peer = %peer, "first contact; trust entry created at UNKNOWN");
                TrustEntry::first_contact(peer.clone(), now)
            })
            .clone();
        self.persist(&entries);
        entry
    }

    /// Seed a peer at `level` without overwriting an existing entry. Used by
    /// pre-trust resolution and `federation.knownAgents`.
    pub fn seed_if_absent(
        &self,
        peer: &AgentId,
        level: TrustLevel,
        reason: TransitionReason,
        now: DateTime<Utc>,
    ) -> TrustEntry {
        {
            let entries = self.entries.read().unwrap();
            if let Some(existing) = entries.get(peer) {
                return existing.clone();
            }
        }
        let mut entries = self.entries.write().unwrap();
        let entry = entries
            .entry(peer.clone())
            .or_insert_with(|| {
                let mut entry = TrustEntry::first_contact(peer.clone(), now);
                if level != TrustLevel::Unknown {
                    entry.transition(level, reason, None, None, now);
                }
                info!(peer = %peer, level = %level, "trust entry seeded");
                entry
            })
            .clone();
        self.persist(&entries);
        entry
    }

    /// Record a human override to an explicit level.
    pub fn set_level(
        &self,
        peer: &AgentId,
        level: TrustLevel,
        approver: &str,
        now: DateTime<Utc>,
    ) -> Result<TrustEntry, Ha2haError> {
        let mut entries = self.entries.write().unwrap();
        let entry = entries
            .entry(peer.clone())
            .or_insert_with(|| TrustEntry::first_contact(peer.clone(), now));
        let previous = entry.level;
        entry.transition(
            level,
            TransitionReason::ManualOverride,
            Some(approver.to_string()),
            None,
            now,
        );
        let snapshot = entry.clone();
        self.persist(&entries);
        drop(entries);

        let event = if level > previous {
            AuditEventType::TrustElevated
        } else {
            AuditEventType::TrustReduced
        };
        self.audit_transition(
            event,
            &snapshot,
            Some(approver),
            AuditOutcome::Success,
            json!({"from": previous, "to": level, "override": true}),
        );
        Ok(snapshot)
    }

    /// Raise the peer by exactly one level. Refused while BLOCKED, at
    /// VERIFIED, or inside the level's cooldown (elevation at the expiry
    /// instant is accepted).
    pub fn elevate(
        &self,
        peer: &AgentId,
        approver: &str,
        now: DateTime<Utc>,
    ) -> Result<TrustEntry, Ha2haError> {
        let mut entries = self.entries.write().unwrap();
        let entry = entries
            .entry(peer.clone())
            .or_insert_with(|| TrustEntry::first_contact(peer.clone(), now));

        if entry.level == TrustLevel::Blocked {
            return Err(Ha2haError::InvalidStateTransition {
                from: TrustLevel::Blocked.name().into(),
                to: TrustLevel::Unknown.name().into(),
            });
        }
        if entry.level == TrustLevel::Verified {
            return Err(Ha2haError::InvalidStateTransition {
                from: TrustLevel::Verified.name().into(),
                to: "above VERIFIED".into(),
            });
        }
        if entry.in_cooldown(now) {
            return Err(Ha2haError::CooldownActive {
                until: entry.cooldown_expires.expect("in_cooldown implies expiry"),
            });
        }

        let previous = entry.level;
        entry.transition(
            entry.level.raised(),
            TransitionReason::Elevation,
            Some(approver.to_string()),
            None,
            now,
        );
        let snapshot = entry.clone();
        self.persist(&entries);
        drop(entries);

        info!(peer = %peer, from = %previous, to = %snapshot.level, "trust elevated");
        self.audit_transition(
            AuditEventType::TrustElevated,
            &snapshot,
            Some(approver),
            AuditOutcome::Success,
            json!({"from": previous, "to": snapshot.level}),
        );
        Ok(snapshot)
    }

    /// Record a violation: count it, apply the severity penalty, audit it.
    /// CRITICAL goes straight to BLOCKED and raises a security alert.
    pub fn record_violation(
        &self,
        peer: &AgentId,
        severity: ViolationSeverity,
        reason: &str,
        now: DateTime<Utc>,
    ) -> TrustEntry {
        let mut entries = self.entries.write().unwrap();
        let entry = entries
            .entry(peer.clone())
            .or_insert_with(|| TrustEntry::first_contact(peer.clone(), now));

        entry.violation_count += 1;
        let previous = entry.level;
        let target = match severity.level_penalty() {
            None => TrustLevel::Blocked,
            Some(penalty) => previous.lowered_by(penalty),
        };
        if target != previous {
            entry.transition(
                target,
                TransitionReason::Violation { severity },
                None,
                Some(reason.to_string()),
                now,
            );
        } else {
            // No level change; the violation still leaves a history entry.
            entry.transition(
                previous,
                TransitionReason::Violation { severity },
                None,
                Some(reason.to_string()),
                now,
            );
        }
        let snapshot = entry.clone();
        self.persist(&entries);
        drop(entries);

        warn!(peer = %peer, ?severity, reason, "trust violation recorded");
        self.audit_transition(
            AuditEventType::TrustViolation,
            &snapshot,
            None,
            AuditOutcome::Error,
            json!({"severity": severity, "reason": reason, "from": previous, "to": snapshot.level}),
        );
        if severity == ViolationSeverity::Critical {
            self.audit_transition(
                AuditEventType::SecurityAlert,
                &snapshot,
                None,
                AuditOutcome::Error,
                json!({"reason": reason, "blocked": true}),
            );
        }
        snapshot
    }

    /// Block the peer outright.
    pub fn block(
        &self,
        peer: &AgentId,
        reason: &str,
        by: &str,
        now: DateTime<Utc>,
    ) -> TrustEntry {
        let mut entries = self.entries.write().unwrap();
        let entry = entries
            .entry(peer.clone())
            .or_insert_with(|| TrustEntry::first_contact(peer.clone(), now));
        entry.transition(
            TrustLevel::Blocked,
            TransitionReason::Blocked,
            Some(by.to_string()),
            Some(reason.to_string()),
            now,
        );
        let snapshot = entry.clone();
        self.persist(&entries);
        drop(entries);

        warn!(peer = %peer, reason, "peer blocked");
        self.audit_transition(
            AuditEventType::TrustBlocked,
            &snapshot,
            Some(by),
            AuditOutcome::Success,
            json!({"reason": reason}),
        );
        snapshot
    }

    /// Human-driven unblock. Lands at UNKNOWN, never the prior level.
    pub fn unblock(
        &self,
        peer: &AgentId,
        approver: &str,
        now: DateTime<Utc>,
    ) -> Result<TrustEntry, Ha2haError> {
        let mut entries = self.entries.write().unwrap();
        let entry = entries
            .get_mut(peer)
            .ok_or_else(|| Ha2haError::PeerNotFound(peer.to_string()))?;
        if entry.level != TrustLevel::Blocked {
            return Err(Ha2haError::InvalidStateTransition {
                from: entry.level.name().into(),
                to: TrustLevel::Unknown.name().into(),
            });
        }
        entry.transition(
            TrustLevel::Unknown,
            TransitionReason::Unblocked,
            Some(approver.to_string()),
            None,
            now,
        );
        let snapshot = entry.clone();
        self.persist(&entries);
        drop(entries);

        info!(peer = %peer, "peer unblocked to UNKNOWN");
        self.audit_transition(
            AuditEventType::TrustUnblocked,
            &snapshot,
            Some(approver),
            AuditOutcome::Success,
            json!({}),
        );
        Ok(snapshot)
    }
}

/// Narrow port for components that report violations without holding the
/// full registry API. Recording is fire-and-forget.
pub trait TrustSink: Send + Sync {
    fn record_violation(&self, peer: &AgentId, severity: ViolationSeverity, reason: &str);

    /// Route a rejection's trust action: block the peer.
    fn block_peer(&self, peer: &AgentId, reason: &str, by: &str);
}

impl TrustSink for TrustRegistry {
    fn record_violation(&self, peer: &AgentId, severity: ViolationSeverity, reason: &str) {
        let _ = TrustRegistry::record_violation(self, peer, severity, reason, Utc::now());
    }

    fn block_peer(&self, peer: &AgentId, reason: &str, by: &str) {
        let _ = TrustRegistry::block(self, peer, reason, by, Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use ha2ha_audit::NullAuditSink;

    fn registry() -> TrustRegistry {
        TrustRegistry::in_memory(AgentId::new("local"), Arc::new(NullAuditSink))
    }

    #[test]
    fn first_sight_creates_unknown_with_cooldown() {
        let reg = registry();
        let now = Utc::now();
        let entry = reg.get_or_create(&AgentId::new("p"), now);
        assert_eq!(entry.level, TrustLevel::Unknown);
        assert!(entry.in_cooldown(now));
    }

    #[test]
    fn elevate_refused_inside_cooldown_and_accepted_at_expiry() {
        let reg = registry();
        let now = Utc::now();
        let peer = AgentId::new("p");
        let entry = reg.get_or_create(&peer, now);
        let expiry = entry.cooldown_expires.unwrap();

        let refused = reg.elevate(&peer, "alice", expiry - Duration::milliseconds(1));
        assert!(matches!(refused, Err(Ha2haError::CooldownActive { .. })));

        let accepted = reg.elevate(&peer, "alice", expiry).unwrap();
        assert_eq!(accepted.level, TrustLevel::Provisional);
    }

    #[test]
    fn elevate_raises_by_exactly_one() {
        let reg = registry();
        let mut now = Utc::now();
        let peer = AgentId::new("p");
        reg.get_or_create(&peer, now);
        for expected in [
            TrustLevel::Provisional,
            TrustLevel::Standard,
            TrustLevel::Trusted,
            TrustLevel::Verified,
        ] {
            now += Duration::days(2);
            assert_eq!(reg.elevate(&peer, "alice", now).unwrap().level, expected);
        }
        now += Duration::days(2);
        assert!(reg.elevate(&peer, "alice", now).is_err());
    }

    #[test]
    fn blocked_peer_cannot_be_elevated() {
        let reg = registry();
        let now = Utc::now();
        let peer = AgentId::new("p");
        reg.block(&peer, "test", "alice", now);
        let result = reg.elevate(&peer, "alice", now + Duration::days(30));
        assert!(matches!(
            result,
            Err(Ha2haError::InvalidStateTransition { .. })
        ));
    }

    #[test]
    fn violation_penalties_follow_severity() {
        let reg = registry();
        let now = Utc::now();
        let peer = AgentId::new("p");
        reg.set_level(&peer, TrustLevel::Trusted, "alice", now).unwrap();

        let e = reg.record_violation(&peer, ViolationSeverity::Low, "noise", now);
        assert_eq!(e.level, TrustLevel::Trusted);
        assert_eq!(e.violation_count, 1);

        let e = reg.record_violation(&peer, ViolationSeverity::Medium, "minor", now);
        assert_eq!(e.level, TrustLevel::Standard);

        let e = reg.record_violation(&peer, ViolationSeverity::High, "major", now);
        assert_eq!(e.level, TrustLevel::Unknown);

        let e = reg.record_violation(&peer, ViolationSeverity::Critical, "breach", now);
        assert_eq!(e.level, TrustLevel::Blocked);
        assert_eq!(e.violation_count, 4);
    }

    #[test]
    fn level_clamps_at_blocked() {
        let reg = registry();
        let now = Utc::now();
        let peer = AgentId::new("p");
        reg.get_or_create(&peer, now);
        let e = reg.record_violation(&peer, ViolationSeverity::High, "x", now);
        assert_eq!(e.level, TrustLevel::Blocked);
        let e = reg.record_violation(&peer, ViolationSeverity::High, "y", now);
        assert_eq!(e.level, TrustLevel::Blocked);
    }

    #[test]
    fn unblock_lands_at_unknown_not_prior_level() {
        let reg = registry();
        let now = Utc::now();
        let peer = AgentId::new("p");
        reg.set_level(&peer, TrustLevel::Verified, "alice", now).unwrap();
        reg.block(&peer, "incident", "alice", now);
        let e = reg.unblock(&peer, "alice", now).unwrap();
        assert_eq!(e.level, TrustLevel::Unknown);
    }

    #[test]
    fn unblock_of_non_blocked_peer_is_refused() {
        let reg = registry();
        let now = Utc::now();
        let peer = AgentId::new("p");
        reg.get_or_create(&peer, now);
        assert!(reg.unblock(&peer, "alice", now).is_err());
    }

    #[test]
    fn history_replays_to_current_level() {
        let reg = registry();
        let mut now = Utc::now();
        let peer = AgentId::new("p");
        reg.get_or_create(&peer, now);
        now += Duration::days(2);
        reg.elevate(&peer, "alice", now).unwrap();
        reg.record_violation(&peer, ViolationSeverity::Medium, "m", now);
        let entry = reg.get(&peer).unwrap();

        let mut replayed = entry.history[0].to;
        for t in &entry.history[1..] {
            assert_eq!(t.from, replayed);
            replayed = t.to;
        }
        assert_eq!(replayed, entry.level);
    }

    #[test]
    fn seed_if_absent_never_overwrites() {
        let reg = registry();
        let now = Utc::now();
        let peer = AgentId::new("p");
        reg.set_level(&peer, TrustLevel::Standard, "alice", now).unwrap();
        let e = reg.seed_if_absent(&peer, TrustLevel::Trusted, TransitionReason::PreTrusted, now);
        assert_eq!(e.level, TrustLevel::Standard);
    }

    #[test]
    fn stats_aggregate_by_level() {
        let reg = registry();
        let now = Utc::now();
        reg.get_or_create(&AgentId::new("a"), now);
        reg.get_or_create(&AgentId::new("b"), now);
        reg.block(&AgentId::new("c"), "x", "alice", now);
        let stats = reg.stats();
        assert_eq!(stats.total_peers, 3);
        assert_eq!(stats.blocked, 1);
        assert_eq!(stats.by_level.get("UNKNOWN"), Some(&2));
    }

    #[test]
    fn persistence_round_trips_through_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agents.json");
        let now = Utc::now();
        {
            let reg = TrustRegistry::open(
                AgentId::new("local"),
                Some(TrustStore::new(&path)),
                Arc::new(NullAuditSink),
            )
            .unwrap();
            reg.set_level(&AgentId::new("p"), TrustLevel::Standard, "alice", now)
                .unwrap();
        }
        let reg = TrustRegistry::open(
            AgentId::new("local"),
            Some(TrustStore::new(&path)),
            Arc::new(NullAuditSink),
        )
        .unwrap();
        assert_eq!(
            reg.level_of(&AgentId::new("p")),
            Some(TrustLevel::Standard)
        );
    }
}
