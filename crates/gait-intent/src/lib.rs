// crates/gait-intent/src/lib.rs
// ============================================================================
// Module: Gait Intent
// Description: Intent request model, normalization, and canonical digesting.
// Purpose: Turn a caller-supplied tool-call request into the one canonical
//          form every other component reasons about.
// Dependencies: gait-core, serde, serde_json
// ============================================================================

//! ## Overview
//! An [`IntentRequest`] is what a caller submits. [`normalize`] strips
//! transport-only fields, orders declared targets, and produces a
//! [`CanonicalIntent`] whose [`CanonicalIntent::digest`] is stable
//! under any equivalent restatement of the same request: argument key
//! order never matters (arguments are carried in a `BTreeMap`), and
//! declared targets are ordered by `(class, locator)` without
//! deduplication — "stable but not lossy".

use std::collections::BTreeMap;

use gait_core::HashAlgorithm;
use gait_core::HashDigest;
use gait_core::SessionId;
use gait_core::Timestamp;
use gait_core::hash_canonical_json;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Per-argument provenance tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvenanceTag {
    /// Supplied directly by the calling user.
    User,
    /// Produced by a prior tool call's output.
    ToolOutput,
    /// Sourced from untrusted external content (e.g. a fetched page).
    ExternalContent,
}

/// A declared side-effect destination for a tool call.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Target {
    /// Side-effect class tag, e.g. `"fs.write"`, `"net.http"`.
    pub class: String,
    /// Opaque locator within that class (a path, a URL, ...).
    pub locator: String,
}

/// Identity and risk context accompanying an intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentContext {
    /// Caller identity (user, service account, or agent identifier).
    pub identity: String,
    /// Workspace or project the call executes within.
    pub workspace: String,
    /// Declared risk classification for this call.
    pub risk_class: String,
    /// Session this call belongs to.
    pub session_id: SessionId,
    /// Chain of delegation identities, outermost first, if this call
    /// is executing under a delegated capability.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub delegation_chain: Vec<String>,
    /// Digest of the context evidence bundle this call was evaluated
    /// against, if one was attached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_evidence_digest: Option<HashDigest>,
}

/// Transport-level metadata that never survives normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportMetadata {
    /// Opaque request identifier assigned by the transport layer.
    pub request_id: String,
    /// When the transport layer received this request.
    pub received_at: Timestamp,
}

/// A caller-supplied tool-call request, prior to normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentRequest {
    /// Stable tool name.
    pub tool: String,
    /// Argument mapping; key order is never significant.
    pub args: BTreeMap<String, Value>,
    /// Declared side-effect destinations, in caller-declared order.
    pub targets: Vec<Target>,
    /// Identity, workspace, and risk context.
    pub context: IntentContext,
    /// Per-argument origin tags, keyed by argument name.
    #[serde(default)]
    pub provenance: BTreeMap<String, ProvenanceTag>,
    /// Transport-only metadata, stripped by [`normalize`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<TransportMetadata>,
}

/// The normalized, digestible form of an [`IntentRequest`]. Carries no
/// transport-only fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalIntent {
    /// Stable tool name.
    pub tool: String,
    /// Argument mapping; key order is never significant.
    pub args: BTreeMap<String, Value>,
    /// Declared side-effect destinations, ordered by `(class,
    /// locator)`. Duplicates are preserved.
    pub targets: Vec<Target>,
    /// Identity, workspace, and risk context.
    pub context: IntentContext,
    /// Per-argument origin tags, keyed by argument name.
    pub provenance: BTreeMap<String, ProvenanceTag>,
}

/// Errors raised while normalizing or digesting an intent.
#[derive(Debug, Error)]
pub enum IntentError {
    /// Canonical encoding of the normalized intent failed.
    #[error("failed to canonicalize intent: {0}")]
    Canonicalization(String),
}

/// Produces a [`CanonicalIntent`] from a caller-supplied request.
///
/// Equivalent intents — same semantic content, different input
/// ordering — normalize to equal [`CanonicalIntent`] values and
/// therefore produce identical digests.
#[must_use]
pub fn normalize(request: &IntentRequest) -> CanonicalIntent {
    let mut targets = request.targets.clone();
    targets.sort_by(|a, b| (a.class.as_str(), a.locator.as_str()).cmp(&(b.class.as_str(), b.locator.as_str())));
    CanonicalIntent {
        tool: request.tool.clone(),
        args: request.args.clone(),
        targets,
        context: request.context.clone(),
        provenance: request.provenance.clone(),
    }
}

impl CanonicalIntent {
    /// Computes this intent's canonical digest (`intent_digest`).
    ///
    /// # Errors
    ///
    /// Returns [`IntentError::Canonicalization`] if the intent cannot
    /// be canonically encoded, which can only happen for
    /// non-representable argument values (non-finite numbers).
    pub fn digest(&self) -> Result<HashDigest, IntentError> {
        hash_canonical_json(HashAlgorithm::Sha256, self).map_err(|err| IntentError::Canonicalization(err.to_string()))
    }
}
