// crates/gait-core/src/signer.rs
// ============================================================================
// Module: Signer
// Description: Ed25519 signing and verification over canonical digests.
// Purpose: Give every signable record (token, trace, checkpoint) a single
//          signature envelope shape and a dev/prod key-loading split.
// Dependencies: ed25519-dalek, base64, crate::hashing
// ============================================================================

//! ## Overview
//! Gait never signs raw payload bytes directly; it signs the canonical
//! JSON encoding of a [`HashDigest`](crate::hashing::HashDigest). This
//! keeps signature verification decoupled from the shape of whatever
//! record carries the digest. [`DevSigner`] generates an ephemeral
//! keypair per process for local iteration; [`ProdSigner`] loads a
//! fixed keypair from a file path or the `GAIT_SIGNING_KEY` environment
//! variable and refuses to run against an ephemeral key.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use ed25519_dalek::Signature;
use ed25519_dalek::Signer as DalekSigner;
use ed25519_dalek::SigningKey;
use ed25519_dalek::VerifyingKey;
use rand::rngs::OsRng;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::hashing::HashDigest;
use crate::hashing::canonical_json_bytes;

/// Identifies which keypair produced a signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyId(String);

impl KeyId {
    /// Builds a `KeyId` from the first 16 hex characters of a public
    /// key's SHA-256 fingerprint-equivalent (the raw key bytes, hex
    /// encoded, truncated for readability).
    #[must_use]
    pub fn from_public_key(key: &VerifyingKey) -> Self {
        let hex: String = key.as_bytes().iter().map(|b| format!("{b:02x}")).collect();
        Self(hex[..16].to_owned())
    }

    /// Returns the identifier's string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for KeyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A signature over a canonical digest, carried alongside a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureEnvelope {
    /// Signature algorithm identifier, always `"ed25519"` today.
    pub alg: String,
    /// Identifies the signing key.
    pub key_id: KeyId,
    /// Base64-encoded (standard alphabet) raw signature bytes.
    pub sig_b64: String,
    /// Hex value of the digest that was signed, for audit readability.
    pub signed_digest_hex: String,
    /// `true` when signed by an ephemeral [`DevSigner`] key. Records
    /// signed under `dev_mode: true` must be rejected by any verifier
    /// configured for the `oss-prod` profile.
    pub dev_mode: bool,
}

/// Errors raised by signing or verifying operations.
#[derive(Debug, Error)]
pub enum SignerError {
    /// Canonical encoding of the digest failed.
    #[error("failed to encode digest for signing: {0}")]
    Encoding(String),
    /// The signature bytes were structurally invalid.
    #[error("malformed signature bytes")]
    MalformedSignature,
    /// Signature verification failed against the provided key.
    #[error("signature verification failed")]
    Invalid,
    /// A dev-mode signature was presented to a verifier that requires
    /// production keys.
    #[error("dev-mode signature rejected by production verifier")]
    DevModeRejected,
    /// Loading a production key from disk or environment failed.
    #[error("failed to load signing key: {0}")]
    KeyLoad(String),
}

/// Signs and verifies canonical digests.
pub trait Signer: Send + Sync {
    /// Signs a digest, returning a complete [`SignatureEnvelope`].
    ///
    /// # Errors
    ///
    /// Returns [`SignerError::Encoding`] if the digest cannot be
    /// canonically encoded.
    fn sign(&self, digest: &HashDigest) -> Result<SignatureEnvelope, SignerError>;

    /// Verifies an envelope against its embedded public key material.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError::Invalid`] if the signature does not
    /// verify, [`SignerError::MalformedSignature`] if the encoded
    /// bytes are not a valid signature, or [`SignerError::Encoding`]
    /// if the digest cannot be canonically encoded.
    fn verify(&self, digest: &HashDigest, envelope: &SignatureEnvelope) -> Result<(), SignerError>;

    /// Returns the key identifier this signer signs with.
    fn key_id(&self) -> KeyId;
}

fn digest_message(digest: &HashDigest) -> Result<Vec<u8>, SignerError> {
    canonical_json_bytes(digest).map_err(|err| SignerError::Encoding(err.to_string()))
}

/// Ephemeral-key signer for local development and tests. Generates a
/// fresh Ed25519 keypair on construction; every envelope it produces
/// carries `dev_mode: true`.
pub struct DevSigner {
    signing_key: SigningKey,
    key_id: KeyId,
}

impl DevSigner {
    /// Generates a new ephemeral keypair.
    #[must_use]
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        let key_id = KeyId::from_public_key(&signing_key.verifying_key());
        Self { signing_key, key_id }
    }

    /// Returns the public key, for building a matching verifier.
    #[must_use]
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }
}

impl Default for DevSigner {
    fn default() -> Self {
        Self::generate()
    }
}

impl Signer for DevSigner {
    fn sign(&self, digest: &HashDigest) -> Result<SignatureEnvelope, SignerError> {
        let message = digest_message(digest)?;
        let signature = self.signing_key.sign(&message);
        Ok(SignatureEnvelope {
            alg: "ed25519".to_owned(),
            key_id: self.key_id.clone(),
            sig_b64: BASE64.encode(signature.to_bytes()),
            signed_digest_hex: digest.value.clone(),
            dev_mode: true,
        })
    }

    fn verify(&self, digest: &HashDigest, envelope: &SignatureEnvelope) -> Result<(), SignerError> {
        verify_with_key(&self.signing_key.verifying_key(), digest, envelope)
    }

    fn key_id(&self) -> KeyId {
        self.key_id.clone()
    }
}

/// Fixed-key signer for production use. Loads a 32-byte Ed25519 seed
/// from a file path or the `GAIT_SIGNING_KEY` environment variable
/// (hex or standard base64 encoded); never generates key material.
pub struct ProdSigner {
    signing_key: SigningKey,
    key_id: KeyId,
}

impl ProdSigner {
    /// Environment variable carrying an inline signing key.
    pub const ENV_VAR: &'static str = "GAIT_SIGNING_KEY";

    /// Loads the signing key from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError::KeyLoad`] if the file cannot be read or
    /// does not contain a valid 32-byte Ed25519 seed.
    pub fn load(path: &std::path::Path) -> Result<Self, SignerError> {
        let raw = std::fs::read(path).map_err(|err| SignerError::KeyLoad(err.to_string()))?;
        Self::from_raw(&raw)
    }

    /// Loads the signing key from the `GAIT_SIGNING_KEY` environment
    /// variable.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError::KeyLoad`] if the variable is unset or
    /// does not contain a valid 32-byte Ed25519 seed.
    pub fn from_env() -> Result<Self, SignerError> {
        let raw = std::env::var(Self::ENV_VAR)
            .map_err(|_| SignerError::KeyLoad(format!("{} is not set", Self::ENV_VAR)))?;
        Self::from_raw(raw.trim().as_bytes())
    }

    fn from_raw(raw: &[u8]) -> Result<Self, SignerError> {
        let seed_bytes = decode_seed(raw)?;
        let signing_key = SigningKey::from_bytes(&seed_bytes);
        let key_id = KeyId::from_public_key(&signing_key.verifying_key());
        Ok(Self { signing_key, key_id })
    }

    /// Returns the public key, for building a matching verifier.
    #[must_use]
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }
}

fn decode_seed(raw: &[u8]) -> Result<[u8; 32], SignerError> {
    let bytes = if raw.len() == 32 {
        raw.to_vec()
    } else {
        let text = std::str::from_utf8(raw)
            .map_err(|_| SignerError::KeyLoad("signing key must be utf-8 when not raw".to_owned()))?
            .trim();
        if let Ok(decoded) = BASE64.decode(text) {
            decoded
        } else {
            hex_decode(text).ok_or_else(|| SignerError::KeyLoad("signing key is neither hex nor base64".to_owned()))?
        }
    };
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| SignerError::KeyLoad("signing key must decode to exactly 32 bytes".to_owned()))
}

fn hex_decode(text: &str) -> Option<Vec<u8>> {
    if text.len() % 2 != 0 {
        return None;
    }
    (0..text.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(text.get(i..i + 2)?, 16).ok())
        .collect()
}

impl Signer for ProdSigner {
    fn sign(&self, digest: &HashDigest) -> Result<SignatureEnvelope, SignerError> {
        let message = digest_message(digest)?;
        let signature = self.signing_key.sign(&message);
        Ok(SignatureEnvelope {
            alg: "ed25519".to_owned(),
            key_id: self.key_id.clone(),
            sig_b64: BASE64.encode(signature.to_bytes()),
            signed_digest_hex: digest.value.clone(),
            dev_mode: false,
        })
    }

    fn verify(&self, digest: &HashDigest, envelope: &SignatureEnvelope) -> Result<(), SignerError> {
        if envelope.dev_mode {
            return Err(SignerError::DevModeRejected);
        }
        verify_with_key(&self.signing_key.verifying_key(), digest, envelope)
    }

    fn key_id(&self) -> KeyId {
        self.key_id.clone()
    }
}

/// Verifies an envelope against an explicit public key, independent of
/// which signer minted it. Used by consumers that hold a peer's
/// `VerifyingKey` rather than a local signer.
///
/// # Errors
///
/// Returns [`SignerError::Invalid`] if the signature does not verify,
/// [`SignerError::MalformedSignature`] if the encoded bytes cannot be
/// parsed as a signature, or [`SignerError::Encoding`] if the digest
/// cannot be canonically encoded.
pub fn verify_with_key(
    key: &VerifyingKey,
    digest: &HashDigest,
    envelope: &SignatureEnvelope,
) -> Result<(), SignerError> {
    let message = digest_message(digest)?;
    let sig_bytes = BASE64
        .decode(&envelope.sig_b64)
        .map_err(|_| SignerError::MalformedSignature)?;
    let signature = Signature::try_from(sig_bytes.as_slice()).map_err(|_| SignerError::MalformedSignature)?;
    key.verify_strict(&message, &signature).map_err(|_| SignerError::Invalid)
}
