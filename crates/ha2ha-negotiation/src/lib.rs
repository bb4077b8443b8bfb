//! Extension and version negotiation.
//!
//! Given our card and a peer's card, decide whether federation can proceed:
//! the HA2HA extension must be present with `humanOversight=true`, the
//! protocol majors must match, a mutually supported spec version must
//! exist, and our standing for the peer must meet its required trust level.

pub mod version;

use ha2ha_core::card::AgentCard;
use ha2ha_core::constants::{MAX_REQUIRED_TRUST, MIN_REQUIRED_TRUST};
use ha2ha_core::types::TrustLevel;
use semver::Version;
use serde::Serialize;
use tracing::debug;

use crate::version::{major_from_uri, select_effective_version};

/// Outcome of a negotiation attempt.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiationResult {
    pub compatible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_version: Option<Version>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_trust: Option<TrustLevel>,
    pub missing_required: Vec<String>,
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NegotiationResult {
    fn refuse(error: impl Into<String>) -> Self {
        Self {
            compatible: false,
            effective_version: None,
            effective_trust: None,
            missing_required: Vec::new(),
            warnings: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// Run the five-step negotiation against `peer_card`, with `our_standing`
/// being the trust level we currently hold for the peer.
pub fn negotiate(
    our_card: &AgentCard,
    peer_card: &AgentCard,
    our_standing: TrustLevel,
) -> NegotiationResult {
    let mut warnings = Vec::new();

    // 1. Presence: a peer without the extension is Trust Level 0.
    let Some(peer_ext) = peer_card.ha2ha_extension() else {
        let our_uri = our_card
            .ha2ha_extension()
            .map(|e| e.uri.clone())
            .unwrap_or_else(|| ha2ha_core::constants::HA2HA_EXTENSION_URI.to_string());
        let mut result = NegotiationResult::refuse("Trust Level 0");
        result.missing_required = vec![our_uri];
        return result;
    };
    if !peer_ext.required {
        warnings.push(
            "peer declares human oversight as optional; apply maximum scrutiny".to_string(),
        );
    }

    // 2. Parameter validation.
    let params = match peer_card.ha2ha_params() {
        Some(Ok(params)) => params,
        Some(Err(e)) => return NegotiationResult::refuse(e.to_string()),
        None => unreachable!("extension presence checked above"),
    };
    if !params.human_oversight {
        return NegotiationResult::refuse("peer does not declare humanOversight=true");
    }
    if !(MIN_REQUIRED_TRUST..=MAX_REQUIRED_TRUST).contains(&params.minimum_trust_level) {
        return NegotiationResult::refuse(format!(
            "required trust level {} outside [1, 5]",
            params.minimum_trust_level
        ));
    }
    let peer_version = match Version::parse(&params.spec_version) {
        Ok(version) => version,
        Err(e) => {
            return NegotiationResult::refuse(format!(
                "peer spec version {:?} is not valid semver: {e}",
                params.spec_version
            ))
        }
    };

    // 3. Protocol major from the URI path suffix must equal ours.
    let our_uri = our_card
        .ha2ha_extension()
        .map(|e| e.uri.as_str())
        .unwrap_or(ha2ha_core::constants::HA2HA_EXTENSION_URI);
    let ours = major_from_uri(our_uri);
    let theirs = major_from_uri(&peer_ext.uri);
    match (ours, theirs) {
        (Some(ours), Some(theirs)) if ours == theirs => {}
        (Some(ours), Some(theirs)) => {
            return NegotiationResult::refuse(format!(
                "protocol major mismatch: ours v{ours}, peer v{theirs}"
            ))
        }
        _ => {
            return NegotiationResult::refuse("extension URI carries no protocol major suffix")
        }
    }

    // 4. Highest mutually supported spec version.
    let Some(effective_version) =
        select_effective_version(peer_version, params.supported_versions.as_deref())
    else {
        return NegotiationResult::refuse("no mutually supported spec version");
    };

    // 5. Trust: the effective level is min(standing, required).
    let required = TrustLevel::from_u8(params.minimum_trust_level)
        .expect("range checked above");
    if our_standing < required {
        return NegotiationResult::refuse(format!(
            "trust level insufficient: peer requires {required}, standing is {our_standing}"
        ));
    }
    let effective_trust = our_standing.min(required);

    debug!(
        version = %effective_version,
        trust = %effective_trust,
        "negotiation succeeded"
    );
    NegotiationResult {
        compatible: true,
        effective_version: Some(effective_version),
        effective_trust: Some(effective_trust),
        missing_required: Vec::new(),
        warnings,
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ha2ha_core::card::{CardExtension, Ha2haParams};
    use ha2ha_core::constants::HA2HA_EXTENSION_URI;
    use serde_json::json;

    fn params(min_trust: u8) -> Ha2haParams {
        Ha2haParams {
            spec_version: "0.1.0".into(),
            human_oversight: true,
            minimum_trust_level: min_trust,
            audit_endpoint: None,
            escalation_contact: None,
            supported_versions: None,
        }
    }

    fn card_with(params: &Ha2haParams) -> AgentCard {
        AgentCard::new("peer", "1.0.0", "https://peer.test", vec![], "ab".repeat(32))
            .with_ha2ha_extension(params)
            .unwrap()
    }

    fn our_card() -> AgentCard {
        card_with(&params(1))
    }

    #[test]
    fn missing_extension_is_trust_level_zero() {
        let bare = AgentCard::new("peer", "1.0.0", "https://peer.test", vec![], "ab".repeat(32));
        let result = negotiate(&our_card(), &bare, TrustLevel::Verified);
        assert!(!result.compatible);
        assert_eq!(result.missing_required, vec![HA2HA_EXTENSION_URI.to_string()]);
        assert_eq!(result.error.as_deref(), Some("Trust Level 0"));
    }

    #[test]
    fn optional_extension_accepted_with_scrutiny_warning() {
        let mut peer = card_with(&params(1));
        peer.extensions[0].required = false;
        let result = negotiate(&our_card(), &peer, TrustLevel::Standard);
        assert!(result.compatible);
        assert!(result.warnings.iter().any(|w| w.contains("maximum scrutiny")));
    }

    #[test]
    fn oversight_must_be_literal_true() {
        let mut p = params(1);
        p.human_oversight = false;
        let result = negotiate(&our_card(), &card_with(&p), TrustLevel::Verified);
        assert!(!result.compatible);
        assert!(result.error.unwrap().contains("humanOversight"));
    }

    #[test]
    fn required_trust_outside_range_is_refused() {
        let mut p = params(1);
        p.minimum_trust_level = 0;
        assert!(!negotiate(&our_card(), &card_with(&p), TrustLevel::Verified).compatible);
        p.minimum_trust_level = 6;
        assert!(!negotiate(&our_card(), &card_with(&p), TrustLevel::Verified).compatible);
    }

    #[test]
    fn invalid_semver_is_refused() {
        let mut p = params(1);
        p.spec_version = "not-a-version".into();
        let result = negotiate(&our_card(), &card_with(&p), TrustLevel::Verified);
        assert!(!result.compatible);
        assert!(result.error.unwrap().contains("semver"));
    }

    #[test]
    fn major_version_mismatch_is_refused() {
        let mut peer = card_with(&params(1));
        peer.extensions[0].uri = "https://ha2ha.dev/ext/human-oversight/v2".into();
        let result = negotiate(&our_card(), &peer, TrustLevel::Verified);
        assert!(!result.compatible);
        assert!(result.error.unwrap().contains("major"));
    }

    #[test]
    fn malformed_params_are_refused() {
        let mut peer = our_card();
        peer.extensions[0].params = json!({"humanOversight": "yes"});
        let result = negotiate(&our_card(), &peer, TrustLevel::Verified);
        assert!(!result.compatible);
    }

    #[test]
    fn insufficient_standing_is_refused() {
        let result = negotiate(&our_card(), &card_with(&params(3)), TrustLevel::Provisional);
        assert!(!result.compatible);
        assert!(result.error.unwrap().contains("insufficient"));
    }

    #[test]
    fn effective_trust_is_min_of_standing_and_required() {
        let result = negotiate(&our_card(), &card_with(&params(2)), TrustLevel::Verified);
        assert!(result.compatible);
        assert_eq!(result.effective_trust, Some(TrustLevel::Provisional));
    }

    #[test]
    fn happy_negotiation_selects_the_shared_version() {
        let result = negotiate(&our_card(), &card_with(&params(1)), TrustLevel::Unknown);
        assert!(result.compatible);
        assert_eq!(result.effective_version, Some(Version::new(0, 1, 0)));
    }

    #[test]
    fn extension_entry_without_params_is_refused() {
        let mut peer = AgentCard::new(
            "peer",
            "1.0.0",
            "https://peer.test",
            vec![],
            "ab".repeat(32),
        );
        peer.extensions.push(CardExtension {
            uri: HA2HA_EXTENSION_URI.into(),
            required: true,
            params: json!(null),
        });
        let result = negotiate(&our_card(), &peer, TrustLevel::Verified);
        assert!(!result.compatible);
    }
}
