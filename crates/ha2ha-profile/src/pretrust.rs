//! Pre-trust resolution.
//!
//! The profile can vouch for named peers ahead of first contact. Resolution
//! matches by peer id first, then by name; the mapped level seeds the trust
//! registry only when the peer has no entry yet. An existing entry is
//! never overwritten.

use chrono::{DateTime, Utc};
use ha2ha_core::types::{AgentId, TrustLevel};
use ha2ha_trust::{TransitionReason, TrustEntry, TrustRegistry};
use tracing::info;

use crate::profile::{ApproverProfile, PreTrustedEntity};

/// Find the pre-trusted entity matching `name` and/or `peer_id`.
pub fn resolve<'a>(
    profile: &'a ApproverProfile,
    name: Option<&str>,
    peer_id: Option<&AgentId>,
) -> Option<(&'a PreTrustedEntity, TrustLevel)> {
    let by_id = peer_id.and_then(|id| {
        profile
            .pre_trusted
            .iter()
            .find(|e| e.peer_id.as_ref() == Some(id))
    });
    let entity = by_id.or_else(|| {
        name.and_then(|name| profile.pre_trusted.iter().find(|e| e.name == name))
    })?;
    Some((entity, TrustLevel::from(entity.level)))
}

/// First-contact resolution: seed the registry at the pre-trusted level when
/// the peer is not already known.
pub fn apply_first_contact(
    profile: &ApproverProfile,
    registry: &TrustRegistry,
    name: Option<&str>,
    peer_id: &AgentId,
    now: DateTime<Utc>,
) -> Option<TrustEntry> {
    let (entity, level) = resolve(profile, name, Some(peer_id))?;
    info!(peer = %peer_id, name = %entity.name, level = %level, "pre-trust match");
    Some(registry.seed_if_absent(peer_id, level, TransitionReason::PreTrusted, now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::PreTrustLevel;
    use ha2ha_audit::NullAuditSink;
    use std::sync::Arc;

    fn profile() -> ApproverProfile {
        let mut profile: ApproverProfile = serde_yaml::from_str("id: alice\n").unwrap();
        profile.pre_trusted = vec![
            PreTrustedEntity {
                name: "partner".into(),
                peer_id: Some(AgentId::new("partner.external")),
                level: PreTrustLevel::Standard,
                domains: vec!["weather/*".into()],
            },
            PreTrustedEntity {
                name: "research-lab".into(),
                peer_id: None,
                level: PreTrustLevel::Provisional,
                domains: vec![],
            },
        ];
        profile
    }

    #[test]
    fn resolves_by_peer_id_before_name() {
        let p = profile();
        let (entity, level) = resolve(
            &p,
            Some("research-lab"),
            Some(&AgentId::new("partner.external")),
        )
        .unwrap();
        assert_eq!(entity.name, "partner");
        assert_eq!(level, TrustLevel::Standard);
    }

    #[test]
    fn resolves_by_name_when_id_unknown() {
        let p = profile();
        let (entity, level) =
            resolve(&p, Some("research-lab"), Some(&AgentId::new("lab.example"))).unwrap();
        assert_eq!(entity.name, "research-lab");
        assert_eq!(level, TrustLevel::Provisional);
    }

    #[test]
    fn unknown_peer_resolves_to_nothing() {
        let p = profile();
        assert!(resolve(&p, Some("stranger"), None).is_none());
    }

    #[test]
    fn first_contact_seeds_registry_once() {
        let p = profile();
        let registry = TrustRegistry::in_memory(AgentId::new("local"), Arc::new(NullAuditSink));
        let now = Utc::now();
        let peer = AgentId::new("partner.external");

        let entry = apply_first_contact(&p, &registry, None, &peer, now).unwrap();
        assert_eq!(entry.level, TrustLevel::Standard);

        // A later violation drops the level; re-resolution must not restore it.
        registry.record_violation(
            &peer,
            ha2ha_trust::ViolationSeverity::Medium,
            "slip",
            now,
        );
        let entry = apply_first_contact(&p, &registry, None, &peer, now).unwrap();
        assert_eq!(entry.level, TrustLevel::Provisional);
    }
}
