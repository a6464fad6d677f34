// crates/gait-tokens/src/lib.rs
// ============================================================================
// Module: Gait Tokens
// Description: Approval and delegation capability token mint/verify service.
// Purpose: Bind short-lived capability grants to the intent and policy
//          digests they authorize, and verify them offline against a
//          trust root.
// Dependencies: gait-core, gait-intent, gait-policy, ed25519-dalek, rand
// ============================================================================

//! ## Overview
//! An [`ApprovalToken`] grants a single intent permission to proceed
//! past a `require_approval` verdict; a [`DelegationToken`] grants a
//! delegate authority to act within a bounded `scope_class` and chain
//! depth. Both carry a [`gait_core::SignatureEnvelope`] produced by
//! component B and a 128-bit nonce drawn from [`rand::rngs::OsRng`].
//! Verification here is purely offline: signature, scope, expiry, and
//! bound-digest checks against a caller-supplied [`TrustRoot`] set.
//! Nonce replay defense is out of scope for this crate — it is owned
//! by the trace emitter's per-`policy_digest` window (component H),
//! which is why [`TokenError::Replay`] exists as a stable failure code
//! here without this crate ever constructing it.

use std::collections::BTreeSet;

use gait_core::HashAlgorithm;
use gait_core::HashDigest;
use gait_core::KeyId;
use gait_core::SignatureEnvelope;
use gait_core::Signer;
use gait_core::SignerError;
use gait_core::Timestamp;
use gait_core::hash_canonical_json;
use gait_core::signer::verify_with_key;
use gait_intent::CanonicalIntent;
use gait_policy::TargetClass;
use rand::RngCore;
use rand::rngs::OsRng;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Scope and Nonce
// ============================================================================

/// A set of side-effect classes an approval authorizes.
pub type Scope = BTreeSet<TargetClass>;

/// Draws a 128-bit nonce from a CSPRNG and hex-encodes it.
fn generate_nonce() -> String {
    let mut bytes = [0_u8; 16];
    OsRng.fill_bytes(&mut bytes);
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

// ============================================================================
// SECTION: Approval Token
// ============================================================================

/// Claims carried by an [`ApprovalToken`], excluding the signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalClaims {
    /// Digest of the intent this approval authorizes.
    pub intent_digest: HashDigest,
    /// Digest of the policy this approval was evaluated under.
    pub policy_digest: HashDigest,
    /// Side-effect classes this approval authorizes.
    pub scope: Scope,
    /// This approval is invalid from this instant on.
    pub ttl_until: Timestamp,
    /// Identity of the approver.
    pub approver: String,
    /// Stable reason code recorded with the grant.
    pub reason_code: String,
    /// 128-bit single-use nonce, hex-encoded.
    pub nonce: String,
}

/// A signed, bounded capability grant permitting one intent to proceed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalToken {
    /// The approval's claims.
    pub claims: ApprovalClaims,
    /// Signature over the canonical encoding of `claims`.
    pub envelope: SignatureEnvelope,
}

/// Mints a new [`ApprovalToken`] signed by `signer`.
///
/// # Errors
///
/// Returns [`TokenError::Canonicalization`] if the claims cannot be
/// canonically encoded, or [`TokenError::Signing`] if `signer` fails.
pub fn mint_approval(
    signer: &dyn Signer,
    intent_digest: HashDigest,
    policy_digest: HashDigest,
    scope: Scope,
    ttl_until: Timestamp,
    approver: impl Into<String>,
    reason_code: impl Into<String>,
) -> Result<ApprovalToken, TokenError> {
    let claims = ApprovalClaims {
        intent_digest,
        policy_digest,
        scope,
        ttl_until,
        approver: approver.into(),
        reason_code: reason_code.into(),
        nonce: generate_nonce(),
    };
    let digest = digest_of(&claims)?;
    let envelope = signer.sign(&digest).map_err(TokenError::Signing)?;
    Ok(ApprovalToken { claims, envelope })
}

/// Facts an [`ApprovalToken`] is checked against at verification time.
#[derive(Debug, Clone, Copy)]
pub struct ApprovalBindings<'a> {
    /// The intent being evaluated.
    pub intent: &'a CanonicalIntent,
    /// Digest of the intent being evaluated.
    pub intent_digest: &'a HashDigest,
    /// Digest of the policy being evaluated under.
    pub policy_digest: &'a HashDigest,
    /// Current wall-clock or monotonic time.
    pub now: Timestamp,
}

/// Verifies `token` against `bindings` using `trust_roots` to resolve
/// the signing key named by the token's envelope.
///
/// # Errors
///
/// Returns a [`TokenError`] variant naming the first check that fails,
/// in the order: signature, bound digests, expiry, scope.
pub fn verify_approval(token: &ApprovalToken, trust_roots: &[TrustRoot], bindings: &ApprovalBindings<'_>) -> Result<(), TokenError> {
    let digest = digest_of(&token.claims)?;
    verify_signature(&digest, &token.envelope, trust_roots)?;

    if token.claims.intent_digest != *bindings.intent_digest || token.claims.policy_digest != *bindings.policy_digest {
        return Err(TokenError::ScopeMismatch);
    }
    if token.claims.ttl_until <= bindings.now {
        return Err(TokenError::Expired);
    }
    if !bindings.intent.targets.iter().all(|target| token.claims.scope.contains(&target.class)) {
        return Err(TokenError::ScopeMismatch);
    }
    Ok(())
}

// ============================================================================
// SECTION: Delegation Token
// ============================================================================

/// Claims carried by a [`DelegationToken`], excluding the signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationClaims {
    /// Identity delegating authority.
    pub delegator: String,
    /// Identity receiving delegated authority.
    pub delegate: String,
    /// Broad capability class this delegation grants.
    pub scope_class: String,
    /// Maximum delegation chain depth this grant may participate in.
    pub max_depth: u32,
    /// This delegation is invalid from this instant on.
    pub ttl_until: Timestamp,
    /// If set, this delegation is bound to one specific intent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent_binding: Option<HashDigest>,
    /// 128-bit single-use nonce, hex-encoded.
    pub nonce: String,
}

/// A signed capability grant permitting a delegate to act on a
/// delegator's behalf within a bounded scope and chain depth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationToken {
    /// The delegation's claims.
    pub claims: DelegationClaims,
    /// Signature over the canonical encoding of `claims`.
    pub envelope: SignatureEnvelope,
}

/// Mints a new [`DelegationToken`] signed by `signer`.
///
/// # Errors
///
/// Returns [`TokenError::Canonicalization`] if the claims cannot be
/// canonically encoded, or [`TokenError::Signing`] if `signer` fails.
#[allow(clippy::too_many_arguments, reason = "mirrors the claims this token binds; splitting it would hide the contract")]
pub fn mint_delegation(
    signer: &dyn Signer,
    delegator: impl Into<String>,
    delegate: impl Into<String>,
    scope_class: impl Into<String>,
    max_depth: u32,
    ttl_until: Timestamp,
    intent_binding: Option<HashDigest>,
) -> Result<DelegationToken, TokenError> {
    let claims = DelegationClaims {
        delegator: delegator.into(),
        delegate: delegate.into(),
        scope_class: scope_class.into(),
        max_depth,
        ttl_until,
        intent_binding,
        nonce: generate_nonce(),
    };
    let digest = digest_of(&claims)?;
    let envelope = signer.sign(&digest).map_err(TokenError::Signing)?;
    Ok(DelegationToken { claims, envelope })
}

/// Verifies one link of a delegation chain against `trust_roots`.
///
/// The chain's overall depth bound is `token.claims.max_depth`;
/// callers verifying a multi-hop chain check each link with this
/// function and additionally confirm the chain's observed length does
/// not exceed the shallowest `max_depth` any link declares.
///
/// # Errors
///
/// Returns a [`TokenError`] variant naming the first check that fails.
pub fn verify_delegation(
    token: &DelegationToken,
    trust_roots: &[TrustRoot],
    now: Timestamp,
    observed_depth: u32,
) -> Result<(), TokenError> {
    let digest = digest_of(&token.claims)?;
    verify_signature(&digest, &token.envelope, trust_roots)?;

    if token.claims.ttl_until <= now {
        return Err(TokenError::Expired);
    }
    if observed_depth > token.claims.max_depth {
        return Err(TokenError::DelegationDepthExceeded);
    }
    Ok(())
}

// ============================================================================
// SECTION: Trust Roots and Signature Verification
// ============================================================================

/// A key this deployment trusts to sign approval or delegation tokens.
#[derive(Debug, Clone, Copy)]
pub struct TrustRoot {
    /// Key identifier matching a [`SignatureEnvelope::key_id`].
    pub key_id: KeyId,
    /// The trusted public key.
    pub verifying_key: ed25519_dalek::VerifyingKey,
}

/// Verifies `envelope` over `digest` against whichever `trust_roots`
/// entry matches `envelope.key_id`.
fn verify_signature(digest: &HashDigest, envelope: &SignatureEnvelope, trust_roots: &[TrustRoot]) -> Result<(), TokenError> {
    let root = trust_roots
        .iter()
        .find(|root| root.key_id == envelope.key_id)
        .ok_or(TokenError::DelegationSignerUntrusted)?;
    verify_with_key(&root.verifying_key, digest, envelope).map_err(|_source| TokenError::SignatureInvalid)
}

/// Computes the canonical digest of a claims value.
fn digest_of<T: Serialize>(claims: &T) -> Result<HashDigest, TokenError> {
    hash_canonical_json(HashAlgorithm::Sha256, claims).map_err(|err| TokenError::Canonicalization(err.to_string()))
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Stable failure codes for token minting and verification.
#[derive(Debug, Error)]
pub enum TokenError {
    /// The token's `ttl_until` has already passed.
    #[error("token expired")]
    Expired,
    /// The token's scope does not cover the intent being evaluated, or
    /// its bound digests do not match the intent/policy being evaluated.
    #[error("token scope does not cover this intent")]
    ScopeMismatch,
    /// The token's signature did not verify.
    #[error("token signature invalid")]
    SignatureInvalid,
    /// The token's nonce has already been observed. Constructed only
    /// by the trace emitter's replay window, never by this crate.
    #[error("token nonce already used")]
    Replay,
    /// A delegation chain exceeds a token's declared `max_depth`.
    #[error("delegation chain depth exceeds declared bound")]
    DelegationDepthExceeded,
    /// The token's signing key is not in the trusted root set.
    #[error("delegation signer is not a trusted root")]
    DelegationSignerUntrusted,
    /// Canonical encoding of the claims failed.
    #[error("failed to canonicalize token claims: {0}")]
    Canonicalization(String),
    /// Signing the claims failed.
    #[error("failed to sign token: {0}")]
    Signing(#[source] SignerError),
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use gait_core::SessionId;
    use gait_core::signer::DevSigner;
    use gait_intent::IntentContext;
    use gait_intent::Target;

    use super::*;

    fn trust_root(signer: &DevSigner) -> TrustRoot {
        TrustRoot {
            key_id: signer.key_id(),
            verifying_key: signer.verifying_key(),
        }
    }

    fn scope(classes: &[&str]) -> Scope {
        classes.iter().map(|class| (*class).to_owned()).collect()
    }

    fn intent_with_targets(classes: &[&str]) -> CanonicalIntent {
        CanonicalIntent {
            tool: "tool.write".to_owned(),
            args: BTreeMap::new(),
            targets: classes
                .iter()
                .map(|class| Target {
                    class: (*class).to_owned(),
                    locator: "loc".to_owned(),
                })
                .collect(),
            context: IntentContext {
                identity: "agent-1".to_owned(),
                workspace: "repo-a".to_owned(),
                risk_class: "low".to_owned(),
                session_id: SessionId::new("sess-1"),
                delegation_chain: Vec::new(),
                context_evidence_digest: None,
            },
            provenance: BTreeMap::new(),
        }
    }

    #[test]
    fn mint_and_verify_approval_round_trips() {
        let signer = DevSigner::generate();
        let intent = intent_with_targets(&["fs.write"]);
        let intent_digest = intent.digest().unwrap();
        let policy_digest = hash_canonical_json(HashAlgorithm::Sha256, &"policy").unwrap();

        let token = mint_approval(
            &signer,
            intent_digest.clone(),
            policy_digest.clone(),
            scope(&["fs.write"]),
            Timestamp::parse("2099-01-01T00:00:00Z").unwrap(),
            "alice",
            "manual_review_ok",
        )
        .unwrap();

        let bindings = ApprovalBindings {
            intent: &intent,
            intent_digest: &intent_digest,
            policy_digest: &policy_digest,
            now: Timestamp::parse("2026-07-28T00:00:00Z").unwrap(),
        };
        verify_approval(&token, &[trust_root(&signer)], &bindings).unwrap();
    }

    #[test]
    fn expired_approval_is_rejected() {
        let signer = DevSigner::generate();
        let intent = intent_with_targets(&["fs.write"]);
        let intent_digest = intent.digest().unwrap();
        let policy_digest = hash_canonical_json(HashAlgorithm::Sha256, &"policy").unwrap();

        let token = mint_approval(
            &signer,
            intent_digest.clone(),
            policy_digest.clone(),
            scope(&["fs.write"]),
            Timestamp::parse("2020-01-01T00:00:00Z").unwrap(),
            "alice",
            "manual_review_ok",
        )
        .unwrap();

        let bindings = ApprovalBindings {
            intent: &intent,
            intent_digest: &intent_digest,
            policy_digest: &policy_digest,
            now: Timestamp::parse("2026-07-28T00:00:00Z").unwrap(),
        };
        let err = verify_approval(&token, &[trust_root(&signer)], &bindings).unwrap_err();
        assert!(matches!(err, TokenError::Expired));
    }

    #[test]
    fn approval_scoped_narrower_than_targets_is_rejected() {
        let signer = DevSigner::generate();
        let intent = intent_with_targets(&["fs.write", "net.http"]);
        let intent_digest = intent.digest().unwrap();
        let policy_digest = hash_canonical_json(HashAlgorithm::Sha256, &"policy").unwrap();

        let token = mint_approval(
            &signer,
            intent_digest.clone(),
            policy_digest.clone(),
            scope(&["fs.write"]),
            Timestamp::parse("2099-01-01T00:00:00Z").unwrap(),
            "alice",
            "manual_review_ok",
        )
        .unwrap();

        let bindings = ApprovalBindings {
            intent: &intent,
            intent_digest: &intent_digest,
            policy_digest: &policy_digest,
            now: Timestamp::parse("2026-07-28T00:00:00Z").unwrap(),
        };
        let err = verify_approval(&token, &[trust_root(&signer)], &bindings).unwrap_err();
        assert!(matches!(err, TokenError::ScopeMismatch));
    }

    #[test]
    fn approval_bound_to_different_intent_is_rejected() {
        let signer = DevSigner::generate();
        let intent = intent_with_targets(&["fs.write"]);
        let intent_digest = intent.digest().unwrap();
        let other_digest = hash_canonical_json(HashAlgorithm::Sha256, &"other-intent").unwrap();
        let policy_digest = hash_canonical_json(HashAlgorithm::Sha256, &"policy").unwrap();

        let token = mint_approval(
            &signer,
            other_digest,
            policy_digest.clone(),
            scope(&["fs.write"]),
            Timestamp::parse("2099-01-01T00:00:00Z").unwrap(),
            "alice",
            "manual_review_ok",
        )
        .unwrap();

        let bindings = ApprovalBindings {
            intent: &intent,
            intent_digest: &intent_digest,
            policy_digest: &policy_digest,
            now: Timestamp::parse("2026-07-28T00:00:00Z").unwrap(),
        };
        let err = verify_approval(&token, &[trust_root(&signer)], &bindings).unwrap_err();
        assert!(matches!(err, TokenError::ScopeMismatch));
    }

    #[test]
    fn untrusted_signer_is_rejected() {
        let signer = DevSigner::generate();
        let other_signer = DevSigner::generate();
        let intent = intent_with_targets(&["fs.write"]);
        let intent_digest = intent.digest().unwrap();
        let policy_digest = hash_canonical_json(HashAlgorithm::Sha256, &"policy").unwrap();

        let token = mint_approval(
            &signer,
            intent_digest.clone(),
            policy_digest.clone(),
            scope(&["fs.write"]),
            Timestamp::parse("2099-01-01T00:00:00Z").unwrap(),
            "alice",
            "manual_review_ok",
        )
        .unwrap();

        let bindings = ApprovalBindings {
            intent: &intent,
            intent_digest: &intent_digest,
            policy_digest: &policy_digest,
            now: Timestamp::parse("2026-07-28T00:00:00Z").unwrap(),
        };
        let err = verify_approval(&token, &[trust_root(&other_signer)], &bindings).unwrap_err();
        assert!(matches!(err, TokenError::DelegationSignerUntrusted));
    }

    #[test]
    fn delegation_depth_bound_is_enforced() {
        let signer = DevSigner::generate();
        let token = mint_delegation(
            &signer,
            "root-agent",
            "sub-agent",
            "fs.write",
            2,
            Timestamp::parse("2099-01-01T00:00:00Z").unwrap(),
            None,
        )
        .unwrap();

        let now = Timestamp::parse("2026-07-28T00:00:00Z").unwrap();
        verify_delegation(&token, &[trust_root(&signer)], now, 2).unwrap();
        let err = verify_delegation(&token, &[trust_root(&signer)], now, 3).unwrap_err();
        assert!(matches!(err, TokenError::DelegationDepthExceeded));
    }

    #[test]
    fn tampered_approval_claims_fail_signature_verification() {
        let signer = DevSigner::generate();
        let intent = intent_with_targets(&["fs.write"]);
        let intent_digest = intent.digest().unwrap();
        let policy_digest = hash_canonical_json(HashAlgorithm::Sha256, &"policy").unwrap();

        let mut token = mint_approval(
            &signer,
            intent_digest.clone(),
            policy_digest.clone(),
            scope(&["fs.write"]),
            Timestamp::parse("2099-01-01T00:00:00Z").unwrap(),
            "alice",
            "manual_review_ok",
        )
        .unwrap();
        token.claims.approver = "mallory".to_owned();

        let bindings = ApprovalBindings {
            intent: &intent,
            intent_digest: &intent_digest,
            policy_digest: &policy_digest,
            now: Timestamp::parse("2026-07-28T00:00:00Z").unwrap(),
        };
        let err = verify_approval(&token, &[trust_root(&signer)], &bindings).unwrap_err();
        assert!(matches!(err, TokenError::SignatureInvalid));
    }
}
