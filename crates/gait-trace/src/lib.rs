// crates/gait-trace/src/lib.rs
// ============================================================================
// Module: Gait Trace
// Description: Signed per-decision trace record emission.
// Purpose: Turn one evaluation outcome into durable, tamper-evident evidence
//          with deterministic identity and atomic, non-overwriting writes.
// Dependencies: gait-core, gait-intent, gait-policy, gait-tokens
// ============================================================================

//! ## Overview
//! [`TraceEmitter`] produces one [`TraceRecord`] per evaluated decision.
//! `trace_id` is deterministic — `intent_digest ⊕ policy_digest` via
//! [`gait_core::hashing::combine_digests`] — so repeated evaluations of
//! the same decision share identity; `event_id` is drawn fresh from a
//! CSPRNG on every emission so repeated emissions never collide or
//! overwrite each other on disk. Records are signed over their own
//! canonical encoding (minus the signature field itself) and written
//! write-tmp-then-rename so a partial write is never observable.
//!
//! Replay defense for attached approval/delegation nonces lives here,
//! not in `gait-tokens`: each [`TraceEmitter`] holds a bounded,
//! per-`policy_digest` window of recently seen nonces and rejects a
//! nonce it has already observed.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;

use gait_core::HashAlgorithm;
use gait_core::HashDigest;
use gait_core::Signer;
use gait_core::SignerError;
use gait_core::Timestamp;
use gait_core::combine_digests;
use gait_core::hash_canonical_json;
use gait_core::ids::EventId;
use gait_core::ids::TraceId;
use gait_policy::Verdict;
use gait_policy::VerdictKind;
use rand::RngCore;
use rand::rngs::OsRng;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// Number of recently used nonces retained per `policy_digest` before
/// the oldest entries are evicted.
const NONCE_WINDOW_CAPACITY: usize = 4_096;

// ============================================================================
// SECTION: Trace Record
// ============================================================================

/// Signed evidence of one evaluated decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceRecord {
    /// Deterministic from `intent_digest` and `policy_digest`; shared
    /// by every emission of the same decision.
    pub trace_id: TraceId,
    /// Unique to this emission; never reused, even for the same
    /// `trace_id`.
    pub event_id: EventId,
    /// Wall-clock time of emission. Never hashed into any digest.
    pub observed_at: Timestamp,
    /// Digest of the evaluated intent.
    pub intent_digest: HashDigest,
    /// Digest of the policy evaluated against.
    pub policy_digest: HashDigest,
    /// Rendered verdict.
    pub verdict: VerdictKind,
    /// Reason codes explaining `verdict`.
    pub reason_codes: Vec<String>,
    /// Fail-closed obligation violations, if any overrode the matched
    /// rule's own verdict.
    pub violations: Vec<String>,
    /// Id of the rule that matched, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_rule: Option<String>,
    /// Reference to an approval token consulted for this decision.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_ref: Option<String>,
    /// Reference to a delegation token consulted for this decision.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegation_ref: Option<String>,
    /// Digest of the context evidence bundle this decision was
    /// evaluated against, if one was attached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_set_digest: Option<HashDigest>,
    /// Signature over this record's canonical encoding, excluding this
    /// field.
    pub signature: gait_core::SignatureEnvelope,
}

/// The portion of a [`TraceRecord`] that is actually signed; the
/// `signature` field is never part of its own input.
#[derive(Serialize)]
struct SignInput<'a> {
    trace_id: &'a TraceId,
    event_id: &'a EventId,
    intent_digest: &'a HashDigest,
    policy_digest: &'a HashDigest,
    verdict: VerdictKind,
    reason_codes: &'a [String],
    violations: &'a [String],
    matched_rule: &'a Option<String>,
    approval_ref: &'a Option<String>,
    delegation_ref: &'a Option<String>,
    context_set_digest: &'a Option<HashDigest>,
}

impl TraceRecord {
    /// Computes `trace_id` from `intent_digest` and `policy_digest`.
    #[must_use]
    pub fn derive_trace_id(intent_digest: &HashDigest, policy_digest: &HashDigest) -> TraceId {
        let combined = combine_digests(HashAlgorithm::Sha256, intent_digest, policy_digest);
        TraceId::new(combined.value)
    }

    fn sign_digest(&self) -> Result<HashDigest, TraceError> {
        let input = SignInput {
            trace_id: &self.trace_id,
            event_id: &self.event_id,
            intent_digest: &self.intent_digest,
            policy_digest: &self.policy_digest,
            verdict: self.verdict,
            reason_codes: &self.reason_codes,
            violations: &self.violations,
            matched_rule: &self.matched_rule,
            approval_ref: &self.approval_ref,
            delegation_ref: &self.delegation_ref,
            context_set_digest: &self.context_set_digest,
        };
        hash_canonical_json(HashAlgorithm::Sha256, &input).map_err(|err| TraceError::Canonicalization(err.to_string()))
    }

    /// Verifies this record's signature against the key it names.
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::Signing`] if the signature does not
    /// verify.
    pub fn verify(&self, signer: &dyn Signer) -> Result<(), TraceError> {
        let digest = self.sign_digest()?;
        signer.verify(&digest, &self.signature).map_err(TraceError::Signing)
    }

    /// Returns the deterministic file path this record's emission
    /// writes to, relative to a traces output directory.
    #[must_use]
    pub fn default_relative_path(&self) -> String {
        format!("{}/{}.json", self.trace_id.as_str(), self.event_id.as_str())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while emitting a trace record.
#[derive(Debug, Error)]
pub enum TraceError {
    /// Canonical encoding of the record failed.
    #[error("failed to canonicalize trace record: {0}")]
    Canonicalization(String),
    /// Signing or verifying the record failed.
    #[error("trace signing failed: {0}")]
    Signing(#[source] SignerError),
    /// The nonce attached to this decision's token has already been
    /// observed within this emitter's replay window.
    #[error("nonce already used for this policy")]
    Replay,
    /// Writing the record to disk failed.
    #[error("failed to write trace record at {path}: {source}")]
    Io {
        /// Path the write failed at.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

// ============================================================================
// SECTION: Emission Input
// ============================================================================

/// Everything needed to emit one [`TraceRecord`].
#[derive(Debug, Clone)]
pub struct EmitInput {
    /// Digest of the evaluated intent.
    pub intent_digest: HashDigest,
    /// Digest of the policy evaluated against.
    pub policy_digest: HashDigest,
    /// The rendered verdict.
    pub verdict: Verdict,
    /// Reference to a consulted approval token, if any.
    pub approval_ref: Option<String>,
    /// Reference to a consulted delegation token, if any.
    pub delegation_ref: Option<String>,
    /// Digest of the context evidence bundle consulted, if any.
    pub context_set_digest: Option<HashDigest>,
    /// Nonce carried by whichever token was consulted, subject to this
    /// emitter's replay window. `None` when no token was attached.
    pub nonce: Option<String>,
    /// Wall-clock time of this emission.
    pub observed_at: Timestamp,
}

// ============================================================================
// SECTION: Emitter
// ============================================================================

/// Emits signed [`TraceRecord`]s, writing each atomically under a
/// deterministic, collision-free path.
pub struct TraceEmitter {
    signer: Box<dyn Signer>,
    output_dir: PathBuf,
    nonce_windows: Mutex<HashMap<String, VecDeque<String>>>,
}

impl TraceEmitter {
    /// Builds an emitter that signs with `signer` and writes under
    /// `output_dir`.
    #[must_use]
    pub fn new(signer: Box<dyn Signer>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            signer,
            output_dir: output_dir.into(),
            nonce_windows: Mutex::new(HashMap::new()),
        }
    }

    /// Emits a trace record for `input`, writing it under this
    /// emitter's output directory at its [`TraceRecord::
    /// default_relative_path`].
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::Replay`] if `input.nonce` was already
    /// observed for `input.policy_digest`, or an I/O or signing error
    /// otherwise.
    pub fn emit(&self, input: EmitInput) -> Result<TraceRecord, TraceError> {
        if let Some(nonce) = &input.nonce {
            self.check_and_record_nonce(&input.policy_digest, nonce)?;
        }

        let trace_id = TraceRecord::derive_trace_id(&input.intent_digest, &input.policy_digest);
        let event_id = EventId::new(generate_event_id());

        let mut record = TraceRecord {
            trace_id,
            event_id,
            observed_at: input.observed_at,
            intent_digest: input.intent_digest,
            policy_digest: input.policy_digest,
            verdict: input.verdict.kind,
            reason_codes: input.verdict.reason_codes,
            violations: input.verdict.violations,
            matched_rule: input.verdict.matched_rule,
            approval_ref: input.approval_ref,
            delegation_ref: input.delegation_ref,
            context_set_digest: input.context_set_digest,
            signature: placeholder_envelope(),
        };
        let digest = record.sign_digest()?;
        record.signature = self.signer.sign(&digest).map_err(TraceError::Signing)?;

        self.write(&record)?;
        Ok(record)
    }

    /// Writes `record` to its deterministic path under `output_dir`,
    /// tmp-file-then-rename. The containing directory is created if
    /// absent.
    fn write(&self, record: &TraceRecord) -> Result<(), TraceError> {
        let relative = record.default_relative_path();
        let path = self.output_dir.join(&relative);
        let parent = path.parent().unwrap_or(&self.output_dir);
        std::fs::create_dir_all(parent).map_err(|source| TraceError::Io {
            path: path.clone(),
            source,
        })?;

        let bytes = serde_json::to_vec_pretty(record).map_err(|err| TraceError::Canonicalization(err.to_string()))?;
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &bytes).map_err(|source| TraceError::Io {
            path: tmp_path.clone(),
            source,
        })?;
        std::fs::rename(&tmp_path, &path).map_err(|source| TraceError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(())
    }

    fn check_and_record_nonce(&self, policy_digest: &HashDigest, nonce: &str) -> Result<(), TraceError> {
        let mut windows = self.nonce_windows.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let window = windows.entry(policy_digest.value.clone()).or_default();
        if window.iter().any(|seen| seen == nonce) {
            return Err(TraceError::Replay);
        }
        window.push_back(nonce.to_owned());
        if window.len() > NONCE_WINDOW_CAPACITY {
            window.pop_front();
        }
        Ok(())
    }
}

/// Draws a 128-bit, hex-encoded identifier for a trace emission.
fn generate_event_id() -> String {
    let mut bytes = [0_u8; 16];
    OsRng.fill_bytes(&mut bytes);
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

/// A never-verified placeholder envelope, replaced before a record is
/// ever returned to a caller. Exists only so `sign_digest` can be
/// computed against a fully-constructed `TraceRecord`.
fn placeholder_envelope() -> gait_core::SignatureEnvelope {
    gait_core::SignatureEnvelope {
        alg: "ed25519".to_owned(),
        key_id: gait_core::signer::KeyId::from_public_key(&ed25519_dalek::SigningKey::from_bytes(&[0_u8; 32]).verifying_key()),
        sig_b64: String::new(),
        signed_digest_hex: String::new(),
        dev_mode: true,
    }
}

#[cfg(test)]
mod tests {
    use gait_core::signer::DevSigner;

    use super::*;

    fn digest(seed: &str) -> HashDigest {
        gait_core::hash_bytes(HashAlgorithm::Sha256, seed.as_bytes())
    }

    fn verdict() -> Verdict {
        Verdict {
            kind: VerdictKind::Allow,
            reason_codes: vec!["ok".to_owned()],
            violations: Vec::new(),
            matched_rule: Some("rule-1".to_owned()),
        }
    }

    fn input() -> EmitInput {
        EmitInput {
            intent_digest: digest("intent"),
            policy_digest: digest("policy"),
            verdict: verdict(),
            approval_ref: None,
            delegation_ref: None,
            context_set_digest: None,
            nonce: None,
            observed_at: Timestamp::parse("2026-07-28T00:00:00Z").unwrap(),
        }
    }

    #[test]
    fn repeated_emissions_share_trace_id_but_not_event_id() {
        let dir = tempfile::tempdir().unwrap();
        let emitter = TraceEmitter::new(Box::new(DevSigner::generate()), dir.path());
        let first = emitter.emit(input()).unwrap();
        let second = emitter.emit(input()).unwrap();
        assert_eq!(first.trace_id, second.trace_id);
        assert_ne!(first.event_id, second.event_id);
    }

    #[test]
    fn emitted_records_are_individually_signed_and_verifiable() {
        let dir = tempfile::tempdir().unwrap();
        let signer = DevSigner::generate();
        let verifying_signer = DevSigner::generate();
        let emitter = TraceEmitter::new(Box::new(signer), dir.path());
        let record = emitter.emit(input()).unwrap();
        // A record signed by one dev key must not verify against another.
        assert!(record.verify(&verifying_signer).is_err());
    }

    #[test]
    fn writes_do_not_overwrite_prior_emissions() {
        let dir = tempfile::tempdir().unwrap();
        let emitter = TraceEmitter::new(Box::new(DevSigner::generate()), dir.path());
        let first = emitter.emit(input()).unwrap();
        let second = emitter.emit(input()).unwrap();
        let first_path = dir.path().join(first.default_relative_path());
        let second_path = dir.path().join(second.default_relative_path());
        assert_ne!(first_path, second_path);
        assert!(first_path.exists());
        assert!(second_path.exists());
    }

    #[test]
    fn reused_nonce_for_same_policy_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let emitter = TraceEmitter::new(Box::new(DevSigner::generate()), dir.path());
        let mut first = input();
        first.nonce = Some("nonce-1".to_owned());
        emitter.emit(first).unwrap();

        let mut second = input();
        second.nonce = Some("nonce-1".to_owned());
        let err = emitter.emit(second).unwrap_err();
        assert!(matches!(err, TraceError::Replay));
    }

    #[test]
    fn same_nonce_under_different_policy_is_not_replay() {
        let dir = tempfile::tempdir().unwrap();
        let emitter = TraceEmitter::new(Box::new(DevSigner::generate()), dir.path());
        let mut first = input();
        first.nonce = Some("nonce-1".to_owned());
        emitter.emit(first).unwrap();

        let mut second = input();
        second.policy_digest = digest("other-policy");
        second.nonce = Some("nonce-1".to_owned());
        emitter.emit(second).unwrap();
    }
}
