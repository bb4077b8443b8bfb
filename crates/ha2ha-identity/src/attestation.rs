//! Agent Card attestation: a detached signature over the canonicalization of
//! the card's signed subset (name, version, capabilities, url, public key).

use ha2ha_core::canonical::to_canonical_json;
use ha2ha_core::card::AgentCard;
use ha2ha_core::error::Ha2haError;

use crate::ed25519;
use crate::keypair::AgentKeyPair;

/// Sign `card` with the holder's identity, recording the signature in the
/// card's attestation slot. The card's public key must be the signer's own.
pub fn sign_card(card: &mut AgentCard, keypair: &AgentKeyPair) -> Result<(), Ha2haError> {
    if card.public_key != keypair.public_key_hex() {
        return Err(Ha2haError::AttestationFailed(
            "card public key is not the signer's".into(),
        ));
    }
    let subset = to_canonical_json(&card.signed_subset())?;
    card.attestation = Some(keypair.sign(subset.as_bytes()));
    Ok(())
}

/// Verify a card's attestation under the public key the card itself carries.
///
/// Tampering with any signed field, or with the public key, breaks the
/// signature. Callers treat a card that fails here as anonymous (trust 0).
pub fn verify_card(card: &AgentCard) -> Result<(), Ha2haError> {
    let attestation = card
        .attestation
        .as_deref()
        .ok_or_else(|| Ha2haError::AttestationFailed("card carries no attestation".into()))?;
    let subset = to_canonical_json(&card.signed_subset())?;
    ed25519::verify(&card.public_key, subset.as_bytes(), attestation)
        .map_err(|_| Ha2haError::AttestationFailed("card attestation does not verify".into()))
}
