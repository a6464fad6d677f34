// crates/gait-core/src/hashing.rs
// ============================================================================
// Module: Canonical Hashing
// Description: RFC 8785 JSON canonicalization and content hashing utilities.
// Purpose: Provide deterministic hashes for intents, policies, and artifacts.
// Dependencies: serde, serde_jcs, sha2
// ============================================================================

//! ## Overview
//! Every digest-bearing Gait record hashes through RFC 8785 (JCS)
//! canonical JSON so that two semantically equal values always produce
//! byte-identical, and therefore hash-identical, serializations.
//! Hashing pretty-printed or insertion-ordered JSON anywhere in the
//! decision path is a protocol violation.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

// ============================================================================
// SECTION: Hash Algorithm
// ============================================================================

/// Supported hash algorithms for Gait artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashAlgorithm {
    /// SHA-256 hashing (the only algorithm Gait currently emits).
    Sha256,
}

/// Default hash algorithm for Gait.
pub const DEFAULT_HASH_ALGORITHM: HashAlgorithm = HashAlgorithm::Sha256;

// ============================================================================
// SECTION: Hash Digest
// ============================================================================

/// Deterministic content hash representation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HashDigest {
    /// Hash algorithm identifier.
    pub algorithm: HashAlgorithm,
    /// Lowercase hex-encoded digest bytes.
    pub value: String,
}

impl HashDigest {
    /// Creates a new digest from raw bytes.
    #[must_use]
    pub fn new(algorithm: HashAlgorithm, bytes: &[u8]) -> Self {
        Self {
            algorithm,
            value: hex_encode(bytes),
        }
    }

    /// Returns the digest value as a byte slice view of its hex form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl std::fmt::Display for HashDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}:{}", self.algorithm, self.value)
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised when computing canonical hashes.
#[derive(Debug, Error)]
pub enum HashError {
    /// JSON canonicalization failed.
    #[error("failed to canonicalize json: {0}")]
    Canonicalization(String),
}

// ============================================================================
// SECTION: Hashing Helpers
// ============================================================================

/// Returns canonical JSON bytes for a serializable value using RFC 8785.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails
/// (non-finite numbers, cycles, or unrepresentable values).
pub fn canonical_json_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, HashError> {
    serde_jcs::to_vec(value).map_err(|err| HashError::Canonicalization(err.to_string()))
}

/// Hashes canonical JSON using the provided algorithm.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn hash_canonical_json<T: Serialize + ?Sized>(
    algorithm: HashAlgorithm,
    value: &T,
) -> Result<HashDigest, HashError> {
    let bytes = canonical_json_bytes(value)?;
    Ok(hash_bytes(algorithm, &bytes))
}

/// Hashes raw bytes using the provided algorithm.
#[must_use]
pub fn hash_bytes(algorithm: HashAlgorithm, bytes: &[u8]) -> HashDigest {
    match algorithm {
        HashAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            hasher.update(bytes);
            let digest = hasher.finalize();
            HashDigest::new(HashAlgorithm::Sha256, &digest)
        }
    }
}

/// Combines two digests into a new digest by hashing their concatenated
/// hex values. Used to derive deterministic identifiers (e.g. `trace_id`
/// from `intent_digest` and `policy_digest`) without re-hashing payloads.
#[must_use]
pub fn combine_digests(algorithm: HashAlgorithm, left: &HashDigest, right: &HashDigest) -> HashDigest {
    let mut joined = String::with_capacity(left.value.len() + right.value.len() + 1);
    joined.push_str(&left.value);
    joined.push('\u{2295}');
    joined.push_str(&right.value);
    hash_bytes(algorithm, joined.as_bytes())
}

// ============================================================================
// SECTION: Hex Encoding
// ============================================================================

/// Encodes bytes as a lowercase hex string.
fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::Value;
    use serde_json::json;

    use super::*;

    #[test]
    fn hash_bytes_is_stable() {
        let a = hash_bytes(HashAlgorithm::Sha256, b"gait");
        let b = hash_bytes(HashAlgorithm::Sha256, b"gait");
        assert_eq!(a, b);
    }

    #[test]
    fn canonical_json_ignores_key_order() {
        let a = json!({"b": 1, "a": 2});
        let b = json!({"a": 2, "b": 1});
        assert_eq!(canonical_json_bytes(&a).unwrap(), canonical_json_bytes(&b).unwrap());
    }

    #[test]
    fn canonical_json_is_idempotent_bytes() {
        let value = json!({"z": [1, 2, 3], "a": {"nested": true}});
        let once = canonical_json_bytes(&value).unwrap();
        let reparsed: Value = serde_json::from_slice(&once).unwrap();
        let twice = canonical_json_bytes(&reparsed).unwrap();
        assert_eq!(once, twice);
    }

    proptest! {
        #[test]
        fn digest_is_a_pure_function_of_canonical_bytes(
            a in 0i64..1_000_000,
            b in "[a-z]{1,12}",
        ) {
            let value = json!({ "b": b.clone(), "a": a });
            let reordered = json!({ "a": a, "b": b });
            let d1 = hash_canonical_json(HashAlgorithm::Sha256, &value).unwrap();
            let d2 = hash_canonical_json(HashAlgorithm::Sha256, &reordered).unwrap();
            prop_assert_eq!(d1, d2);
        }
    }
}
