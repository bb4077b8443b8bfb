use std::path::Path;

use ed25519_dalek::SigningKey;
use ha2ha_core::error::Ha2haError;
use ha2ha_core::types::AgentId;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::ed25519;

/// An agent's long-term identity: id, display name, and Ed25519 key pair.
///
/// The secret key is held in a `Zeroizing<[u8; 32]>` to wipe memory on drop.
/// Private material never leaves the process; the public key is carried on
/// the Agent Card.
pub struct AgentKeyPair {
    pub agent_id: AgentId,
    pub display_name: Option<String>,
    public_key_hex: String,
    secret_key: zeroize::Zeroizing<[u8; 32]>,
}

/// On-disk identity document (JSON).
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdentityFile {
    agent_id: AgentId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    display_name: Option<String>,
    public_key: String,
    secret_key: String,
}

impl AgentKeyPair {
    /// Generate a fresh Ed25519 identity for `agent_id`.
    pub fn generate(agent_id: AgentId, display_name: Option<String>) -> Self {
        let sk = SigningKey::generate(&mut OsRng);
        Self::from_signing_key(agent_id, display_name, sk)
    }

    fn from_signing_key(agent_id: AgentId, display_name: Option<String>, sk: SigningKey) -> Self {
        let public_key_hex = hex::encode(sk.verifying_key().to_bytes());
        Self {
            agent_id,
            display_name,
            public_key_hex,
            secret_key: zeroize::Zeroizing::new(sk.to_bytes()),
        }
    }

    /// Restore a key pair from raw secret key bytes.
    pub fn from_raw(
        agent_id: AgentId,
        display_name: Option<String>,
        secret_key: [u8; 32],
    ) -> Self {
        Self::from_signing_key(agent_id, display_name, SigningKey::from_bytes(&secret_key))
    }

    /// Load the identity document at `path`, or generate one and write it
    /// there on first run. A loaded document whose public key does not match
    /// its secret key is rejected.
    pub fn load_or_create(
        path: &Path,
        agent_id: AgentId,
        display_name: Option<String>,
    ) -> Result<Self, Ha2haError> {
        if path.exists() {
            let raw = std::fs::read_to_string(path)
                .map_err(|e| Ha2haError::Storage(e.to_string()))?;
            let file: IdentityFile =
                serde_json::from_str(&raw).map_err(|e| Ha2haError::Serialization(e.to_string()))?;
            let sk_bytes = hex::decode(&file.secret_key)
                .map_err(|e| Ha2haError::Serialization(e.to_string()))?;
            let sk_array: [u8; 32] = sk_bytes
                .try_into()
                .map_err(|_| Ha2haError::Serialization("secret key must be 32 bytes".into()))?;
            let kp = Self::from_raw(file.agent_id, file.display_name, sk_array);
            if kp.public_key_hex != file.public_key {
                return Err(Ha2haError::AttestationFailed(
                    "identity file public key does not match secret key".into(),
                ));
            }
            tracing::info!(agent_id = %kp.agent_id, "loaded identity");
            return Ok(kp);
        }

        let kp = Self::generate(agent_id, display_name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Ha2haError::Storage(e.to_string()))?;
        }
        let file = IdentityFile {
            agent_id: kp.agent_id.clone(),
            display_name: kp.display_name.clone(),
            public_key: kp.public_key_hex.clone(),
            secret_key: hex::encode(kp.secret_key.as_ref()),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| Ha2haError::Serialization(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| Ha2haError::Storage(e.to_string()))?;
        tracing::info!(agent_id = %kp.agent_id, path = %path.display(), "created identity");
        Ok(kp)
    }

    /// Sign `message`, returning the hex-encoded detached signature.
    pub fn sign(&self, message: &[u8]) -> String {
        ed25519::sign(&self.secret_key, message)
    }

    /// Hex-encoded Ed25519 public key, as carried on the Agent Card.
    pub fn public_key_hex(&self) -> &str {
        &self.public_key_hex
    }
}

impl std::fmt::Debug for AgentKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AgentKeyPair {{ agent_id: {:?} }}", self.agent_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_or_create_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.json");
        let id = AgentId::new("local.test");

        let created =
            AgentKeyPair::load_or_create(&path, id.clone(), Some("Local".into())).unwrap();
        let loaded = AgentKeyPair::load_or_create(&path, id.clone(), None).unwrap();

        assert_eq!(created.public_key_hex(), loaded.public_key_hex());
        assert_eq!(loaded.agent_id, id);
        assert_eq!(loaded.display_name.as_deref(), Some("Local"));
    }

    #[test]
    fn corrupted_public_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.json");
        AgentKeyPair::load_or_create(&path, AgentId::new("a"), None).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let mut doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
        doc["publicKey"] = serde_json::json!("00".repeat(32));
        std::fs::write(&path, doc.to_string()).unwrap();

        let result = AgentKeyPair::load_or_create(&path, AgentId::new("a"), None);
        assert!(matches!(result, Err(Ha2haError::AttestationFailed(_))));
    }

    #[test]
    fn signatures_verify_under_public_key() {
        let kp = AgentKeyPair::generate(AgentId::new("signer"), None);
        let sig = kp.sign(b"payload");
        assert!(crate::ed25519::verify(kp.public_key_hex(), b"payload", &sig).is_ok());
    }
}
