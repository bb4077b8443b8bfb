use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use ha2ha_core::error::Ha2haError;

/// Sign `message` with a raw Ed25519 secret key. Returns the hex-encoded
/// detached signature.
pub fn sign(secret_key_bytes: &[u8; 32], message: &[u8]) -> String {
    let sk = SigningKey::from_bytes(secret_key_bytes);
    hex::encode(sk.sign(message).to_bytes())
}

/// Verify a hex-encoded detached Ed25519 signature under a hex-encoded
/// public key.
pub fn verify(public_key_hex: &str, message: &[u8], signature_hex: &str) -> Result<(), Ha2haError> {
    let pk = decode_public_key(public_key_hex)?;
    let sig_bytes = hex::decode(signature_hex).map_err(|_| Ha2haError::SignatureInvalid)?;
    let sig_array: [u8; 64] = sig_bytes
        .try_into()
        .map_err(|_| Ha2haError::SignatureInvalid)?;
    let sig = Signature::from_bytes(&sig_array);
    pk.verify(message, &sig)
        .map_err(|_| Ha2haError::SignatureInvalid)
}

/// Decode a hex-encoded Ed25519 public key, rejecting malformed input.
pub fn decode_public_key(public_key_hex: &str) -> Result<VerifyingKey, Ha2haError> {
    let bytes = hex::decode(public_key_hex)
        .map_err(|_| Ha2haError::UnknownPublicKey(public_key_hex.to_string()))?;
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| Ha2haError::UnknownPublicKey(public_key_hex.to_string()))?;
    VerifyingKey::from_bytes(&arr)
        .map_err(|_| Ha2haError::UnknownPublicKey(public_key_hex.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;
    use rand::rngs::OsRng;

    #[test]
    fn sign_verify_round_trip() {
        let sk = SigningKey::generate(&mut OsRng);
        let pk_hex = hex::encode(sk.verifying_key().to_bytes());
        let message = b"no execution without approval";

        let sig = sign(&sk.to_bytes(), message);
        assert!(verify(&pk_hex, message, &sig).is_ok());
    }

    #[test]
    fn tampered_message_fails() {
        let sk = SigningKey::generate(&mut OsRng);
        let pk_hex = hex::encode(sk.verifying_key().to_bytes());
        let sig = sign(&sk.to_bytes(), b"original");
        assert!(verify(&pk_hex, b"tampered", &sig).is_err());
    }

    #[test]
    fn wrong_key_fails() {
        let sk = SigningKey::generate(&mut OsRng);
        let other = SigningKey::generate(&mut OsRng);
        let sig = sign(&sk.to_bytes(), b"message");
        let other_pk = hex::encode(other.verifying_key().to_bytes());
        assert!(verify(&other_pk, b"message", &sig).is_err());
    }

    #[test]
    fn malformed_public_key_is_rejected() {
        assert!(matches!(
            decode_public_key("not-hex"),
            Err(Ha2haError::UnknownPublicKey(_))
        ));
        assert!(matches!(
            decode_public_key("abcd"),
            Err(Ha2haError::UnknownPublicKey(_))
        ));
    }
}
