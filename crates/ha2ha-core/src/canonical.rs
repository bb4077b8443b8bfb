//! Deterministic serialization for everything that gets hashed.
//!
//! RFC 8785 (JSON Canonicalization Scheme): keys sorted lexicographically at
//! every nesting level, numbers in their narrowest lossless form, no
//! insignificant whitespace. Every cross-peer hash commitment (payload
//! hashes, approval messages, audit entries, card attestations) goes through
//! this module without exception.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::Ha2haError;

/// Canonicalize any serializable value to its RFC 8785 form.
///
/// Values that cannot be represented in JSON (non-string map keys, NaN,
/// infinities) fail with a `Canonicalization` error before any state is
/// mutated.
pub fn to_canonical_json<T: Serialize>(value: &T) -> Result<String, Ha2haError> {
    serde_jcs::to_string(value).map_err(|e| Ha2haError::Canonicalization(e.to_string()))
}

/// Lowercase hex SHA-256 of raw bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Lowercase hex SHA-256 of the canonical form of `value`.
///
/// This is the `payload_hash` bound to every task at creation and committed
/// to by every approval.
pub fn payload_hash<T: Serialize>(value: &T) -> Result<String, Ha2haError> {
    Ok(sha256_hex(to_canonical_json(value)?.as_bytes()))
}
