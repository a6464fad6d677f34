// crates/gait-context/src/lib.rs
// ============================================================================
// Module: Gait Context
// Description: Deterministic "what the model saw" evidence bundle.
// Purpose: Give every intent an optional, ordered snapshot of the evidence it
//          was evaluated against, and classify how that evidence drifts
//          between two packs.
// Dependencies: gait-core, serde, serde_json
// ============================================================================

//! ## Overview
//! A [`ContextEnvelope`] is a bundle of [`ContextRecord`]s describing
//! every piece of evidence a call's evaluation depended on: where it
//! came from, a digest of the query that produced it, a digest of its
//! content, and how fresh it was. Records are always carried sorted
//! by `(source_type, content_digest)` so that two envelopes built from
//! the same evidence, gathered in any order, canonicalize identically
//! under JCS. [`classify_drift`] is the building block `gait-pack`'s
//! diff uses to tell a merely-re-fetched reference apart from one
//! whose content actually changed.

use gait_core::HashAlgorithm;
use gait_core::HashDigest;
use gait_core::Timestamp;
use gait_core::hash_canonical_json;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// How strictly context evidence is required for a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceMode {
    /// Missing or stale evidence degrades gracefully.
    BestEffort,
    /// Missing or stale evidence is itself a policy violation.
    Required,
}

/// One piece of evidence contributing to a decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextRecord {
    /// Evidence source category (e.g. `"retrieval"`, `"tool_output"`).
    pub source_type: String,
    /// Where the evidence was retrieved from, opaque to this crate.
    pub source_locator: String,
    /// Canonical digest of the query that produced this evidence.
    pub query_digest: HashDigest,
    /// Canonical digest of the evidence content itself.
    pub content_digest: HashDigest,
    /// When the evidence was retrieved.
    pub retrieved_at: Timestamp,
    /// How the evidence was redacted before storage, if at all.
    pub redaction_mode: String,
    /// Mutability classification of the underlying source.
    pub immutability: String,
    /// Maximum age, in seconds, for this evidence to remain valid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub freshness_sla_seconds: Option<u64>,
}

/// An ordered, digestible bundle of evidence for one decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextEnvelope {
    /// Stable identifier for this evidence bundle.
    pub context_set_id: String,
    /// Canonical digest of the envelope's content (see
    /// [`ContextEnvelope::recompute_digest`]).
    pub context_set_digest: HashDigest,
    /// Evidence strictness mode.
    pub evidence_mode: EvidenceMode,
    /// Evidence records, always kept sorted by `(source_type,
    /// content_digest)`.
    pub records: Vec<ContextRecord>,
}

/// The portion of a [`ContextEnvelope`] that is actually hashed;
/// `context_set_digest` is never part of its own digest input.
#[derive(Serialize)]
struct DigestInput<'a> {
    context_set_id: &'a str,
    evidence_mode: EvidenceMode,
    records: &'a [ContextRecord],
}

/// Errors raised building or validating a [`ContextEnvelope`].
#[derive(Debug, Error)]
pub enum ContextError {
    /// Canonicalization of the envelope's records failed.
    #[error("failed to canonicalize context envelope: {0}")]
    Canonicalization(String),
    /// A stored `context_set_digest` did not match the records it
    /// accompanies.
    #[error("context_set_digest does not match envelope contents")]
    DigestMismatch,
}

fn sort_key(record: &ContextRecord) -> (&str, &str) {
    (record.source_type.as_str(), record.content_digest.value.as_str())
}

impl ContextEnvelope {
    /// Builds a new envelope, sorting `records` deterministically and
    /// computing its digest.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::Canonicalization`] if the records
    /// cannot be canonically encoded.
    pub fn build(
        context_set_id: impl Into<String>,
        evidence_mode: EvidenceMode,
        mut records: Vec<ContextRecord>,
    ) -> Result<Self, ContextError> {
        records.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));
        let context_set_id = context_set_id.into();
        let digest = digest_of(&context_set_id, evidence_mode, &records)?;
        Ok(Self {
            context_set_id,
            context_set_digest: digest,
            evidence_mode,
            records,
        })
    }

    /// Recomputes the digest this envelope's current contents should
    /// carry.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::Canonicalization`] if the records
    /// cannot be canonically encoded.
    pub fn recompute_digest(&self) -> Result<HashDigest, ContextError> {
        digest_of(&self.context_set_id, self.evidence_mode, &self.records)
    }

    /// Verifies that `context_set_digest` matches the envelope's
    /// current contents.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::DigestMismatch`] if the stored digest
    /// is stale, or [`ContextError::Canonicalization`] if recomputing
    /// it fails.
    pub fn verify_digest(&self) -> Result<(), ContextError> {
        let recomputed = self.recompute_digest()?;
        if recomputed == self.context_set_digest {
            Ok(())
        } else {
            Err(ContextError::DigestMismatch)
        }
    }

    /// Finds a record by its `(source_type, source_locator)` identity.
    #[must_use]
    pub fn find(&self, source_type: &str, source_locator: &str) -> Option<&ContextRecord> {
        self.records
            .iter()
            .find(|record| record.source_type == source_type && record.source_locator == source_locator)
    }
}

fn digest_of(
    context_set_id: &str,
    evidence_mode: EvidenceMode,
    records: &[ContextRecord],
) -> Result<HashDigest, ContextError> {
    hash_canonical_json(
        HashAlgorithm::Sha256,
        &DigestInput {
            context_set_id,
            evidence_mode,
            records,
        },
    )
    .map_err(|err| ContextError::Canonicalization(err.to_string()))
}

/// How a single evidence record changed between two packs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftClass {
    /// Present on the right side only.
    Added,
    /// Present on the left side only.
    Removed,
    /// Present on both sides with identical content.
    Unchanged,
    /// Present on both sides; only non-semantic fields differ
    /// (`retrieved_at`, `freshness_sla_seconds`, `query_digest`).
    ContextRuntimeOnly,
    /// Present on both sides; the evidence content itself differs
    /// (`content_digest`, `source_locator`, `redaction_mode`, or
    /// `immutability`).
    ContextSemantic,
}

/// Classifies how one evidence record changed between a left
/// (baseline) and right (candidate) pack. Either side may be absent.
#[must_use]
pub fn classify_drift(left: Option<&ContextRecord>, right: Option<&ContextRecord>) -> DriftClass {
    match (left, right) {
        (None, Some(_)) => DriftClass::Added,
        (Some(_), None) => DriftClass::Removed,
        (None, None) => DriftClass::Unchanged,
        (Some(left), Some(right)) => {
            if left.content_digest != right.content_digest
                || left.source_locator != right.source_locator
                || left.redaction_mode != right.redaction_mode
                || left.immutability != right.immutability
            {
                DriftClass::ContextSemantic
            } else if left.retrieved_at != right.retrieved_at
                || left.freshness_sla_seconds != right.freshness_sla_seconds
                || left.query_digest != right.query_digest
            {
                DriftClass::ContextRuntimeOnly
            } else {
                DriftClass::Unchanged
            }
        }
    }
}
