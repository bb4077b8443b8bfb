//! Canonical approval message signing.
//!
//! An approval commits to exactly one (task id, payload hash, scope) triple
//! through the fixed string form below. The signature is verified under the
//! approver's public key before any task leaves SUBMITTED.

use ha2ha_core::error::Ha2haError;

use crate::ed25519;
use crate::keypair::AgentKeyPair;

/// The canonical string an approver signs:
/// `ha2ha/approve:<task id>:<hash>:<scope>`.
pub fn approval_message(task_id: &str, payload_hash: &str, scope: &str) -> String {
    format!("ha2ha/approve:{task_id}:{payload_hash}:{scope}")
}

/// Sign the canonical approval message with the approver's identity.
pub fn sign_approval(
    keypair: &AgentKeyPair,
    task_id: &str,
    payload_hash: &str,
    scope: &str,
) -> String {
    keypair.sign(approval_message(task_id, payload_hash, scope).as_bytes())
}

/// Verify an approval signature under the approver's public key.
pub fn verify_approval(
    approver_public_key_hex: &str,
    task_id: &str,
    payload_hash: &str,
    scope: &str,
    signature_hex: &str,
) -> Result<(), Ha2haError> {
    ed25519::verify(
        approver_public_key_hex,
        approval_message(task_id, payload_hash, scope).as_bytes(),
        signature_hex,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use ha2ha_core::types::AgentId;

    #[test]
    fn message_has_exact_form() {
        assert_eq!(
            approval_message("task-1", "abc123", "SINGLE"),
            "ha2ha/approve:task-1:abc123:SINGLE"
        );
    }

    #[test]
    fn sign_verify_round_trip() {
        let kp = AgentKeyPair::generate(AgentId::new("approver"), None);
        let sig = sign_approval(&kp, "task-1", "abc123", "SINGLE");
        assert!(verify_approval(kp.public_key_hex(), "task-1", "abc123", "SINGLE", &sig).is_ok());
    }

    #[test]
    fn signature_is_bound_to_every_component() {
        let kp = AgentKeyPair::generate(AgentId::new("approver"), None);
        let sig = sign_approval(&kp, "task-1", "abc123", "SINGLE");
        let pk = kp.public_key_hex();

        assert!(verify_approval(pk, "task-2", "abc123", "SINGLE", &sig).is_err());
        assert!(verify_approval(pk, "task-1", "def456", "SINGLE", &sig).is_err());
        assert!(verify_approval(pk, "task-1", "abc123", "SIMILAR", &sig).is_err());
    }
}
