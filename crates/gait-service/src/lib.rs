// crates/gait-service/src/lib.rs
// ============================================================================
// Module: Gait Service
// Description: Loopback HTTP/SSE/NDJSON evaluation service boundary.
// Purpose: Expose `evaluate_intent` to local callers over three wire
//          formats that all share one evaluation helper and therefore
//          always render semantically identical verdicts.
// Dependencies: gait-core, gait-intent, gait-policy, gait-tokens, gait-trace,
//               gait-context, axum, tokio
// ============================================================================

//! ## Overview
//! `gait-service` is the optional, explicitly-opt-in HTTP boundary
//! named by spec.md §6. [`evaluate_once`] is the single evaluation
//! helper: it normalizes an [`gait_intent::IntentRequest`], verifies
//! any attached approval or delegation token, evaluates the intent
//! against a loaded [`gait_policy::Policy`], and emits a signed
//! [`gait_trace::TraceRecord`]. [`http`] wraps that helper behind three
//! routes (`/v1/evaluate`, `/v1/evaluate/sse`, `/v1/evaluate/stream`)
//! that differ only in wire framing. Binding to a non-loopback address
//! without bearer auth configured is refused at startup, not silently
//! downgraded.

pub mod auth;
pub mod http;

use gait_context::ContextEnvelope;
use gait_core::HashDigest;
use gait_core::Profile;
use gait_core::Signer;
use gait_core::Timestamp;
use gait_intent::CanonicalIntent;
use gait_intent::IntentError;
use gait_intent::IntentRequest;
use gait_policy::EvaluationContext;
use gait_policy::Policy;
use gait_policy::Verdict;
use gait_policy::VerdictKind;
use gait_tokens::ApprovalBindings;
use gait_tokens::ApprovalToken;
use gait_tokens::DelegationToken;
use gait_tokens::TrustRoot;
use gait_trace::EmitInput;
use gait_trace::TraceEmitter;
use gait_trace::TraceError;
use gait_trace::TraceRecord;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// Maximum request body size accepted by any evaluation route. A
/// caller that exceeds this is refused with `413` before its body is
/// ever normalized or hashed.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

// ============================================================================
// SECTION: Request / Response
// ============================================================================

/// The body every evaluation route accepts, regardless of wire format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluateRequest {
    /// The proposed tool call.
    pub intent: IntentRequest,
    /// An approval token consulted for this decision, if attached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_token: Option<ApprovalToken>,
    /// A delegation token consulted for this decision, if attached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegation_token: Option<DelegationToken>,
    /// Context evidence this call was evaluated against, if attached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ContextEnvelope>,
}

/// The body every evaluation route returns, regardless of wire format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluateResponse {
    /// The rendered verdict kind.
    pub verdict: VerdictKind,
    /// Reason codes explaining `verdict`.
    pub reason_codes: Vec<String>,
    /// Fail-closed obligation violations, if any overrode the matched
    /// rule's own verdict.
    pub violations: Vec<String>,
    /// Id of the rule that matched, if any.
    pub matched_rule: Option<String>,
    /// Digest of the normalized intent.
    pub intent_digest: HashDigest,
    /// Digest of the policy evaluated against.
    pub policy_digest: HashDigest,
    /// The signed trace record emitted for this decision.
    pub trace: TraceRecord,
}

impl EvaluateResponse {
    /// Returns `true` when `verdict` is [`VerdictKind::Allow`] or
    /// [`VerdictKind::DryRun`] — the two kinds a `strict`-mode caller
    /// sees as a `2xx` response.
    #[must_use]
    pub fn is_successful(&self) -> bool {
        matches!(self.verdict, VerdictKind::Allow | VerdictKind::DryRun)
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised evaluating a request or running the service.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The intent could not be normalized into a digestible form.
    #[error("invalid intent: {0}")]
    InvalidIntent(#[source] IntentError),
    /// An attached approval token failed verification.
    #[error("approval token invalid: {0}")]
    ApprovalInvalid(#[source] gait_tokens::TokenError),
    /// An attached delegation token failed verification.
    #[error("delegation token invalid: {0}")]
    DelegationInvalid(#[source] gait_tokens::TokenError),
    /// Emitting the decision's trace record failed.
    #[error("trace emission failed: {0}")]
    Trace(#[source] TraceError),
    /// The request body exceeded [`MAX_BODY_BYTES`].
    #[error("request body exceeds {MAX_BODY_BYTES} bytes")]
    BodyTooLarge,
    /// A non-loopback bind address was requested without bearer auth
    /// configured.
    #[error("non-loopback bind address requires bearer auth")]
    NonLoopbackRequiresAuth,
    /// The caller's bearer token did not match the configured one.
    #[error("missing or invalid bearer token")]
    Unauthorized,
    /// Binding or serving the loopback listener failed.
    #[error("service I/O failed: {0}")]
    Io(#[source] std::io::Error),
}

// ============================================================================
// SECTION: Service State
// ============================================================================

/// Everything one running service instance needs to evaluate intents
/// and emit traces for them.
pub struct ServiceState {
    /// The policy every route evaluates against.
    pub policy: Policy,
    /// `policy`'s canonical digest, computed once at construction.
    pub policy_digest: HashDigest,
    /// Operating profile; governs fail-closed obligations.
    pub profile: Profile,
    /// Trust roots accepted when verifying attached tokens.
    pub trust_roots: Vec<TrustRoot>,
    /// Emits and persists a [`TraceRecord`] per decision, over its own
    /// signer.
    pub trace_emitter: TraceEmitter,
    /// Whether non-`allow` verdicts should map to non-`2xx` HTTP
    /// status codes.
    pub strict: bool,
}

impl ServiceState {
    /// Builds service state from a validated policy, signer, and trace
    /// output directory.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Trace`] wrapping a canonicalization
    /// failure if `policy` cannot be digested (this can only happen
    /// for a policy carrying non-representable values, which
    /// [`Policy::validate`] does not itself reject).
    pub fn new(
        policy: Policy,
        profile: Profile,
        trust_roots: Vec<TrustRoot>,
        signer: Box<dyn Signer>,
        trace_output_dir: impl Into<std::path::PathBuf>,
        strict: bool,
    ) -> Result<Self, ServiceError> {
        let policy_digest = policy
            .digest()
            .map_err(|err| ServiceError::Trace(TraceError::Canonicalization(err.to_string())))?;
        Ok(Self {
            policy,
            policy_digest,
            profile,
            trust_roots,
            trace_emitter: TraceEmitter::new(signer, trace_output_dir),
            strict,
        })
    }
}

// ============================================================================
// SECTION: Evaluation Helper
// ============================================================================

/// Evaluates `request` and emits its trace record. Shared by every
/// route in [`http`] so the three transports can never diverge.
///
/// # Errors
///
/// Returns [`ServiceError`] if the intent fails to normalize, an
/// attached token fails verification, or trace emission fails.
pub fn evaluate_once(state: &ServiceState, request: EvaluateRequest) -> Result<EvaluateResponse, ServiceError> {
    let canonical = gait_intent::normalize(&request.intent);
    let intent_digest = canonical.digest().map_err(ServiceError::InvalidIntent)?;
    let now = Timestamp::now();

    let approval_valid = match &request.approval_token {
        Some(token) => {
            verify_approval(&canonical, &intent_digest, &state.policy_digest, token, &state.trust_roots, now)?;
            true
        }
        None => false,
    };

    let delegation_valid = match &request.delegation_token {
        Some(token) => {
            let observed_depth = u32::try_from(canonical.context.delegation_chain.len()).unwrap_or(u32::MAX);
            gait_tokens::verify_delegation(token, &state.trust_roots, now, observed_depth).map_err(ServiceError::DelegationInvalid)?;
            true
        }
        None => false,
    };

    let eval_ctx = EvaluationContext {
        context_evidence_present: request.context.is_some(),
        context_evidence_age_seconds: request.context.as_ref().and_then(context_age_seconds),
        approval_valid,
        delegation_valid,
        rate_limited: false,
        profile: state.profile,
    };

    let verdict: Verdict = gait_policy::evaluate(&canonical, &state.policy, &eval_ctx);

    let trace = state
        .trace_emitter
        .emit(EmitInput {
            intent_digest: intent_digest.clone(),
            policy_digest: state.policy_digest.clone(),
            verdict: verdict.clone(),
            approval_ref: request.approval_token.as_ref().map(|token| token.claims.nonce.clone()),
            delegation_ref: request.delegation_token.as_ref().map(|token| token.claims.nonce.clone()),
            context_set_digest: request.context.as_ref().map(|envelope| envelope.context_set_digest.clone()),
            nonce: request
                .approval_token
                .as_ref()
                .map(|token| token.claims.nonce.clone())
                .or_else(|| request.delegation_token.as_ref().map(|token| token.claims.nonce.clone())),
            observed_at: now,
        })
        .map_err(ServiceError::Trace)?;

    Ok(EvaluateResponse {
        verdict: verdict.kind,
        reason_codes: verdict.reason_codes,
        violations: verdict.violations,
        matched_rule: verdict.matched_rule,
        intent_digest,
        policy_digest: state.policy_digest.clone(),
        trace,
    })
}

/// Resolves the attached context envelope's age in seconds, relative
/// to the newest record it carries. Returns `None` for an envelope
/// with no records.
fn context_age_seconds(envelope: &ContextEnvelope) -> Option<u64> {
    let newest = envelope.records.iter().map(|record| record.retrieved_at).max()?;
    let now = Timestamp::now();
    let delta = now.into_offset_date_time() - newest.into_offset_date_time();
    Some(u64::try_from(delta.whole_seconds().max(0)).unwrap_or(u64::MAX))
}

/// Verifies an attached approval token's scope against the set of
/// target classes this intent actually declares.
fn verify_approval(
    intent: &CanonicalIntent,
    intent_digest: &HashDigest,
    policy_digest: &HashDigest,
    token: &ApprovalToken,
    trust_roots: &[TrustRoot],
    now: Timestamp,
) -> Result<(), ServiceError> {
    let bindings = ApprovalBindings {
        intent,
        intent_digest,
        policy_digest,
        now,
    };
    gait_tokens::verify_approval(token, trust_roots, &bindings).map_err(ServiceError::ApprovalInvalid)
}

#[cfg(test)]
mod tests {
    use gait_core::SessionId;
    use gait_core::signer::DevSigner;
    use gait_intent::IntentContext;
    use std::collections::BTreeMap;
    use std::collections::BTreeSet;

    use super::*;

    fn policy(yaml: &str) -> Policy {
        let policy = Policy::load_str(yaml).unwrap();
        policy.validate().unwrap();
        policy
    }

    fn state(yaml: &str) -> (ServiceState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let state = ServiceState::new(policy(yaml), Profile::Dev, Vec::new(), Box::new(DevSigner::generate()), dir.path(), false).unwrap();
        (state, dir)
    }

    fn request(tool: &str) -> EvaluateRequest {
        EvaluateRequest {
            intent: IntentRequest {
                tool: tool.to_owned(),
                args: BTreeMap::new(),
                targets: Vec::new(),
                context: IntentContext {
                    identity: "agent-1".to_owned(),
                    workspace: "repo-a".to_owned(),
                    risk_class: "low".to_owned(),
                    session_id: SessionId::new("sess-1"),
                    delegation_chain: Vec::new(),
                    context_evidence_digest: None,
                },
                provenance: BTreeMap::new(),
                transport: None,
            },
            approval_token: None,
            delegation_token: None,
            context: None,
        }
    }

    #[test]
    fn evaluate_once_renders_allow_and_emits_trace() {
        let (state, _dir) = state("rules: []\ndefault_verdict: allow\n");
        let response = evaluate_once(&state, request("fs.read")).unwrap();
        assert_eq!(response.verdict, VerdictKind::Allow);
        assert!(response.is_successful());
    }

    #[test]
    fn evaluate_once_is_deterministic_for_equal_requests() {
        let (state, _dir) = state("rules: []\ndefault_verdict: block\n");
        let first = evaluate_once(&state, request("fs.write")).unwrap();
        let second = evaluate_once(&state, request("fs.write")).unwrap();
        assert_eq!(first.verdict, second.verdict);
        assert_eq!(first.intent_digest, second.intent_digest);
        assert_eq!(first.trace.trace_id, second.trace.trace_id);
        assert_ne!(first.trace.event_id, second.trace.event_id);
    }

    #[test]
    fn unknown_approval_signer_is_rejected() {
        let (state, _dir) = state("rules: []\ndefault_verdict: allow\n");
        let mut req = request("fs.write");
        let other_signer = DevSigner::generate();
        let canonical = gait_intent::normalize(&req.intent);
        let intent_digest = canonical.digest().unwrap();
        let token = gait_tokens::mint_approval(
            &other_signer,
            intent_digest,
            state.policy_digest.clone(),
            BTreeSet::new(),
            Timestamp::parse("2099-01-01T00:00:00Z").unwrap(),
            "approver",
            "manual_approval",
        )
        .unwrap();
        req.approval_token = Some(token);
        let err = evaluate_once(&state, req).unwrap_err();
        assert!(matches!(err, ServiceError::ApprovalInvalid(_)));
    }
}
