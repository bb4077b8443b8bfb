//! Agent Card: a peer's self-describing, signed advertisement.
//!
//! The attestation is a detached signature over the canonicalization of the
//! signed subset (name, version, capabilities, url, public key). A card whose
//! attestation does not verify is treated as anonymous, trust level 0.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::HA2HA_EXTENSION_URI;
use crate::error::Ha2haError;

/// One capability-extension entry on a card.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CardExtension {
    pub uri: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub params: Value,
}

/// Parameters of the HA2HA extension entry.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Ha2haParams {
    pub spec_version: String,
    pub human_oversight: bool,
    pub minimum_trust_level: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_contact: Option<String>,
    /// Comma-separated list of additionally supported spec versions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supported_versions: Option<String>,
}

/// A peer's self-describing advertisement, served at `/.well-known/agent.json`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgentCard {
    pub name: String,
    /// Semantic version of the advertised agent.
    pub version: String,
    pub url: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub extensions: Vec<CardExtension>,
    /// Hex-encoded Ed25519 public key.
    pub public_key: String,
    /// Hex-encoded detached signature over the canonical signed subset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attestation: Option<String>,
}

/// The canonicalizable subset of card fields bound by the attestation.
/// Tampering with any of these, or with the key itself, breaks verification.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedSubset<'a> {
    pub name: &'a str,
    pub version: &'a str,
    pub capabilities: &'a [String],
    pub url: &'a str,
    pub public_key: &'a str,
}

impl AgentCard {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        url: impl Into<String>,
        capabilities: Vec<String>,
        public_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            url: url.into(),
            capabilities,
            extensions: Vec::new(),
            public_key: public_key.into(),
            attestation: None,
        }
    }

    /// Attach the HA2HA extension entry with the given parameters.
    pub fn with_ha2ha_extension(mut self, params: &Ha2haParams) -> Result<Self, Ha2haError> {
        let params = serde_json::to_value(params)
            .map_err(|e| Ha2haError::Serialization(e.to_string()))?;
        self.extensions.push(CardExtension {
            uri: HA2HA_EXTENSION_URI.to_string(),
            required: true,
            params,
        });
        Ok(self)
    }

    /// The subset of fields bound by the attestation signature.
    pub fn signed_subset(&self) -> SignedSubset<'_> {
        SignedSubset {
            name: &self.name,
            version: &self.version,
            capabilities: &self.capabilities,
            url: &self.url,
            public_key: &self.public_key,
        }
    }

    /// The card's HA2HA extension entry, if any.
    pub fn ha2ha_extension(&self) -> Option<&CardExtension> {
        self.extensions.iter().find(|e| e.uri == HA2HA_EXTENSION_URI)
    }

    /// Decode the HA2HA extension parameters.
    pub fn ha2ha_params(&self) -> Option<Result<Ha2haParams, Ha2haError>> {
        self.ha2ha_extension().map(|ext| {
            serde_json::from_value(ext.params.clone())
                .map_err(|e| Ha2haError::ExtensionParameterInvalid(e.to_string()))
        })
    }
}
