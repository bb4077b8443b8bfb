//! Host configuration: the document the deployment hands to the core.

use std::path::{Path, PathBuf};

use ha2ha_core::error::Ha2haError;
use ha2ha_core::types::{AgentId, TrustLevel};
use ha2ha_rpc::EnforcementMode;
use serde::Deserialize;

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct EnforcementConfig {
    #[serde(default)]
    pub mode: EnforcementMode,
}

/// A peer known ahead of time, optionally with an initial trust level.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnownAgent {
    pub id: AgentId,
    pub endpoint: String,
    #[serde(default)]
    pub trust_level: Option<TrustLevel>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FederationConfig {
    #[serde(default = "default_true")]
    pub allow_inbound: bool,
    #[serde(default = "default_true")]
    pub allow_outbound: bool,
    #[serde(default)]
    pub known_agents: Vec<KnownAgent>,
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            allow_inbound: true,
            allow_outbound: true,
            known_agents: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ha2haConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Approver profile to enforce.
    #[serde(default)]
    pub profile: Option<PathBuf>,
    /// Trust storage root; defaults to `<data dir>/trust-store`.
    #[serde(default)]
    pub trust_store: Option<PathBuf>,
    #[serde(default)]
    pub enforcement: EnforcementConfig,
    #[serde(default)]
    pub federation: FederationConfig,
}

impl Default for Ha2haConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            profile: None,
            trust_store: None,
            enforcement: EnforcementConfig::default(),
            federation: FederationConfig::default(),
        }
    }
}

impl Ha2haConfig {
    /// Load the YAML (or JSON) configuration document at `path`.
    pub fn load(path: &Path) -> Result<Self, Ha2haError> {
        let raw = std::fs::read_to_string(path).map_err(|e| Ha2haError::Storage(e.to_string()))?;
        serde_yaml::from_str(&raw).map_err(|e| Ha2haError::InvalidConfig(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_document_parses() {
        let raw = r#"
enabled: true
profile: /home/alice/.ha2ha/approvers/alice.yaml
trustStore: /home/alice/.ha2ha/trust-store
enforcement:
  mode: audit-only
federation:
  allowInbound: true
  allowOutbound: false
  knownAgents:
    - id: partner.external
      endpoint: https://partner.example.test
      trustLevel: STANDARD
"#;
        let config: Ha2haConfig = serde_yaml::from_str(raw).unwrap();
        assert!(config.enabled);
        assert_eq!(config.enforcement.mode, EnforcementMode::AuditOnly);
        assert!(!config.federation.allow_outbound);
        assert_eq!(config.federation.known_agents.len(), 1);
        assert_eq!(
            config.federation.known_agents[0].trust_level,
            Some(TrustLevel::Standard)
        );
    }

    #[test]
    fn empty_document_uses_defaults() {
        let config: Ha2haConfig = serde_yaml::from_str("{}").unwrap();
        assert!(config.enabled);
        assert!(config.federation.allow_inbound);
        assert_eq!(config.enforcement.mode, EnforcementMode::Strict);
    }
}
