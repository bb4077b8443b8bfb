use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use ha2ha_audit::{AuditEventType, AuditInput, AuditOutcome, AuditSink, NullAuditSink};
use ha2ha_core::error::Ha2haError;
use ha2ha_core::types::AgentId;
use ha2ha_trust::{TrustSink, ViolationSeverity};
use serde_json::json;

use crate::circuit::{BreakerConfig, CircuitBreaker, CircuitState, ProceedDecision};

/// Per-peer circuit breakers behind a read-mostly map. Each breaker has its
/// own mutex; the map lock is held only to find or insert a breaker.
///
/// Failures can optionally be mirrored into the trust registry; that
/// coupling is fire-and-forget and its errors are ignored.
pub struct BreakerRegistry {
    agent_id: AgentId,
    breakers: RwLock<HashMap<AgentId, Arc<Mutex<CircuitBreaker>>>>,
    config: BreakerConfig,
    trust: Option<Arc<dyn TrustSink>>,
    audit: Arc<dyn AuditSink>,
}

impl BreakerRegistry {
    pub fn new(agent_id: AgentId, config: BreakerConfig) -> Self {
        Self {
            agent_id,
            breakers: RwLock::new(HashMap::new()),
            config,
            trust: None,
            audit: Arc::new(NullAuditSink),
        }
    }

    /// Mirror recorded failures into the trust registry.
    pub fn with_trust(mut self, trust: Arc<dyn TrustSink>) -> Self {
        self.trust = Some(trust);
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    fn breaker_for(&self, peer: &AgentId) -> Arc<Mutex<CircuitBreaker>> {
        if let Some(existing) = self.breakers.read().unwrap().get(peer) {
            return Arc::clone(existing);
        }
        let mut map = self.breakers.write().unwrap();
        Arc::clone(
            map.entry(peer.clone())
                .or_insert_with(|| Arc::new(Mutex::new(CircuitBreaker::new(self.config)))),
        )
    }

    /// Consult the peer's breaker. Refusals carry the reset time.
    pub fn can_proceed(&self, peer: &AgentId, now: DateTime<Utc>) -> ProceedDecision {
        let breaker = self.breaker_for(peer);
        let mut breaker = breaker.lock().unwrap();
        breaker.can_proceed(now)
    }

    /// `can_proceed` mapped onto the error taxonomy: a refusal is
    /// `CircuitOpen` with the retry time.
    pub fn check(&self, peer: &AgentId, now: DateTime<Utc>) -> Result<ProceedDecision, Ha2haError> {
        let decision = self.can_proceed(peer, now);
        if decision.allowed {
            Ok(decision)
        } else {
            Err(Ha2haError::CircuitOpen {
                retry_at: decision.retry_at.unwrap_or(now),
            })
        }
    }

    pub fn record_success(&self, peer: &AgentId) {
        let breaker = self.breaker_for(peer);
        breaker.lock().unwrap().record_success();
    }

    /// Record a failure against the peer. When the failure trips the
    /// breaker, a SECURITY_CIRCUIT_OPEN audit record is written; when trust
    /// coupling is configured the failure also lands as a trust violation.
    pub fn record_failure(
        &self,
        peer: &AgentId,
        severity: ViolationSeverity,
        reason: &str,
        now: DateTime<Utc>,
    ) {
        let breaker = self.breaker_for(peer);
        let tripped = breaker.lock().unwrap().record_failure(severity, reason, now);

        if let Some(trip_reason) = tripped {
            self.audit.record(
                AuditInput::new(
                    AuditEventType::SecurityCircuitOpen,
                    peer.clone(),
                    self.agent_id.clone(),
                    AuditOutcome::Error,
                )
                .detail(json!({"reason": trip_reason})),
            );
        }
        if let Some(trust) = &self.trust {
            trust.record_violation(peer, severity, reason);
        }
    }

    /// Manually open the peer's breaker.
    pub fn trip(&self, peer: &AgentId, reason: &str, now: DateTime<Utc>) {
        let breaker = self.breaker_for(peer);
        breaker.lock().unwrap().trip(reason, now);
        self.audit.record(
            AuditInput::new(
                AuditEventType::SecurityCircuitOpen,
                peer.clone(),
                self.agent_id.clone(),
                AuditOutcome::Error,
            )
            .detail(json!({"reason": reason, "manual": true})),
        );
    }

    /// Manual reset, recorded with the approver identity.
    pub fn reset(&self, peer: &AgentId, approver: &str) {
        let breaker = self.breaker_for(peer);
        breaker.lock().unwrap().reset(approver);
        self.audit.record(
            AuditInput::new(
                AuditEventType::SecurityCircuitReset,
                peer.clone(),
                self.agent_id.clone(),
                AuditOutcome::Success,
            )
            .human(approver)
            .detail(json!({})),
        );
    }

    pub fn state_of(&self, peer: &AgentId) -> Option<CircuitState> {
        self.breakers
            .read()
            .unwrap()
            .get(peer)
            .map(|b| b.lock().unwrap().state())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTrust(AtomicUsize);

    impl TrustSink for CountingTrust {
        fn record_violation(&self, _: &AgentId, _: ViolationSeverity, _: &str) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
        fn block_peer(&self, _: &AgentId, _: &str, _: &str) {}
    }

    #[test]
    fn failures_isolate_per_peer() {
        let reg = BreakerRegistry::new(AgentId::new("local"), BreakerConfig::default());
        let now = Utc::now();
        let bad = AgentId::new("bad");
        let good = AgentId::new("good");
        for _ in 0..3 {
            reg.record_failure(&bad, ViolationSeverity::Medium, "x", now);
        }
        assert!(!reg.can_proceed(&bad, now).allowed);
        assert!(reg.can_proceed(&good, now).allowed);
    }

    #[test]
    fn check_maps_refusal_to_circuit_open() {
        let reg = BreakerRegistry::new(AgentId::new("local"), BreakerConfig::default());
        let now = Utc::now();
        let peer = AgentId::new("p");
        reg.trip(&peer, "manual", now);
        let err = reg.check(&peer, now).unwrap_err();
        assert!(matches!(err, Ha2haError::CircuitOpen { .. }));
    }

    #[test]
    fn trust_coupling_mirrors_failures() {
        let trust = Arc::new(CountingTrust(AtomicUsize::new(0)));
        let reg = BreakerRegistry::new(AgentId::new("local"), BreakerConfig::default())
            .with_trust(trust.clone() as Arc<dyn TrustSink>);
        let now = Utc::now();
        reg.record_failure(&AgentId::new("p"), ViolationSeverity::Low, "x", now);
        reg.record_failure(&AgentId::new("p"), ViolationSeverity::High, "y", now);
        assert_eq!(trust.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn reset_reopens_traffic() {
        let reg = BreakerRegistry::new(AgentId::new("local"), BreakerConfig::default());
        let now = Utc::now();
        let peer = AgentId::new("p");
        reg.trip(&peer, "incident", now);
        assert!(!reg.can_proceed(&peer, now).allowed);
        reg.reset(&peer, "alice");
        assert!(reg.can_proceed(&peer, now).allowed);
    }
}
