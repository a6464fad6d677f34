// crates/gait/src/lib.rs
// ============================================================================
// Module: Gait Facade
// Description: Single entry point exposing spec.md §6's operation surface.
// Purpose: Give a CLI shell, service boundary, or language wrapper one
//          `CoreContext` to build, verify, evaluate, and mint against,
//          without reaching into individual gait-* crates directly.
// Dependencies: every gait-* crate
// ============================================================================

//! ## Overview
//! `gait` composes every `gait-*` crate behind one [`CoreContext`] and a
//! single closed [`GaitError`]. It owns no business logic of its own —
//! [`CoreContext::verify`], [`CoreContext::build_pack`],
//! [`CoreContext::diff_packs`], [`CoreContext::evaluate_intent`],
//! [`CoreContext::mint_token`], and [`CoreContext::verify_token`] are
//! thin dispatches to `gait-pack`, `gait-service`, and `gait-tokens`.
//! The [`journal`], [`job`], [`regress`], and [`doctor`] modules add the
//! directory-layout conventions from spec.md §6's persisted state
//! layout (`packs/`, `traces/`, `sessions/<id>/`, `jobs/<id>/`,
//! `regress/`) on top of those crates' own state machines.
//!
//! This crate does not parse arguments or print to a terminal — the
//! CLI shell is explicitly out of scope (spec.md §1) and is expected to
//! sit on top of this facade.

pub mod doctor;
pub mod job;
pub mod journal;
pub mod regress;

use std::path::PathBuf;

use gait_core::CoreConfig;
use gait_core::ConfigError;
use gait_core::DevSigner;
use gait_core::ProdSigner;
use gait_core::Profile;
use gait_core::Signer;
use gait_core::SignerError;
use gait_intent::IntentError;
use gait_pack::BuildInput;
use gait_pack::DiffEntry;
use gait_pack::PackError;
use gait_pack::VerifyOptions;
use gait_pack::VerifyReport;
use gait_policy::Policy;
use gait_policy::PolicyError;
use gait_service::EvaluateRequest;
use gait_service::EvaluateResponse;
use gait_service::ServiceError;
use gait_service::ServiceState;
use gait_tokens::ApprovalToken;
use gait_tokens::DelegationToken;
use gait_tokens::TokenError;
use gait_tokens::TrustRoot;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Every failure mode a `gait` operation can surface, composing each
/// sub-crate's own error type under one closed sum. Variant identity
/// is preserved through `#[from]` rather than collapsed to strings, so
/// callers can match on the underlying cause.
#[derive(Debug, Error)]
pub enum GaitError {
    /// Core configuration failed to validate.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Signing or verifying a digest failed.
    #[error(transparent)]
    Signer(#[from] SignerError),
    /// Pack assembly, opening, verification, or diffing failed.
    #[error(transparent)]
    Pack(#[from] PackError),
    /// A policy document failed to load or validate.
    #[error(transparent)]
    Policy(#[from] PolicyError),
    /// Normalizing an intent failed.
    #[error(transparent)]
    Intent(#[from] IntentError),
    /// Minting or verifying a capability token failed.
    #[error(transparent)]
    Token(#[from] TokenError),
    /// A context evidence envelope failed to build or verify.
    #[error(transparent)]
    Context(#[from] gait_context::ContextError),
    /// A session journal operation failed.
    #[error(transparent)]
    Journal(#[from] gait_journal::JournalError),
    /// A job state-machine operation failed.
    #[error(transparent)]
    Job(#[from] gait_jobs::JobError),
    /// A regression fixture or grading run failed.
    #[error(transparent)]
    Regress(#[from] gait_regress::RegressError),
    /// A credential broker request failed.
    #[error(transparent)]
    Broker(#[from] gait_broker::BrokerError),
    /// A document failed schema validation.
    #[error(transparent)]
    Schema(#[from] gait_schema::SchemaError),
    /// The service boundary rejected a request or failed to evaluate it.
    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl GaitError {
    /// Maps this error to the exit-code contract of spec.md §6.
    ///
    /// This is the *error* half of that contract: a successful
    /// [`CoreContext::evaluate_intent`] call still needs its rendered
    /// [`gait_policy::VerdictKind`] mapped separately via
    /// [`verdict_exit_code`], and a successful
    /// [`gait_regress::run`] result maps via its own
    /// [`gait_regress::RegressResult::exit_code`].
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            GaitError::Pack(err) => pack_exit_code(err),
            GaitError::Schema(_) | GaitError::Intent(_) | GaitError::Context(_) => 6,
            GaitError::Policy(PolicyError::Parse { .. } | PolicyError::DuplicateRuleId(_) | PolicyError::EmptyReasonCode(_) | PolicyError::EmptyRuleId | PolicyError::InvalidGlob { .. }) => 6,
            GaitError::Policy(PolicyError::Canonicalization(_)) => 1,
            GaitError::Token(_) => 2,
            GaitError::Signer(SignerError::KeyLoad(_)) | GaitError::Config(ConfigError::FailClosed(_)) => 7,
            GaitError::Regress(_) => 5,
            GaitError::Journal(_) | GaitError::Job(_) | GaitError::Broker(_) | GaitError::Service(_) | GaitError::Signer(_) | GaitError::Config(_) => 1,
        }
    }

    /// Maps this error to one of spec.md §7's stable taxonomy
    /// identifiers, for machine consumers that key off `kind` rather
    /// than matching on `GaitError` variants directly.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            GaitError::Schema(_) => ErrorKind::SchemaInvalid,
            GaitError::Intent(_) | GaitError::Context(gait_context::ContextError::Canonicalization(_)) => ErrorKind::InvalidInput,
            GaitError::Context(gait_context::ContextError::DigestMismatch) => ErrorKind::HashMismatch,
            GaitError::Policy(PolicyError::Parse { .. } | PolicyError::DuplicateRuleId(_) | PolicyError::EmptyReasonCode(_) | PolicyError::EmptyRuleId | PolicyError::InvalidGlob { .. }) => ErrorKind::UnknownField,
            GaitError::Policy(PolicyError::Canonicalization(_)) => ErrorKind::InvalidInput,
            GaitError::Pack(PackError::HashMismatch(_)) => ErrorKind::HashMismatch,
            GaitError::Pack(PackError::UndeclaredFile(_)) => ErrorKind::PackUndeclaredFile,
            GaitError::Pack(PackError::SignatureMissing | PackError::SignatureInvalid(_)) => ErrorKind::SigInvalid,
            GaitError::Pack(PackError::MissingManifest | PackError::InvalidManifest(_) | PackError::MissingJobId | PackError::Canonicalization(_) | PackError::Schema(_) | PackError::Archive(_)) => ErrorKind::SchemaInvalid,
            GaitError::Token(TokenError::Expired) => ErrorKind::TokenExpired,
            GaitError::Token(TokenError::ScopeMismatch) => ErrorKind::TokenScopeMismatch,
            GaitError::Token(TokenError::Replay) => ErrorKind::TokenReplay,
            GaitError::Token(TokenError::DelegationDepthExceeded) => ErrorKind::DelegationDepthExceeded,
            GaitError::Token(TokenError::SignatureInvalid | TokenError::DelegationSignerUntrusted | TokenError::Signing(_) | TokenError::Canonicalization(_)) => ErrorKind::SigInvalid,
            GaitError::Journal(gait_journal::JournalError::SessionLocked(_)) => ErrorKind::SessionLocked,
            GaitError::Journal(gait_journal::JournalError::CorruptIndex(_) | gait_journal::JournalError::MalformedRecord(..) | gait_journal::JournalError::TruncatedTail(_)) => ErrorKind::JournalCorrupt,
            GaitError::Journal(gait_journal::JournalError::Io { .. } | gait_journal::JournalError::Canonicalization(_)) => ErrorKind::IoError,
            GaitError::Journal(gait_journal::JournalError::PrefixOutOfRange { .. }) => ErrorKind::InvalidInput,
            GaitError::Journal(gait_journal::JournalError::Pack(_)) => ErrorKind::SchemaInvalid,
            GaitError::Job(gait_jobs::JobError::FingerprintMismatch) => ErrorKind::EnvFingerprintMismatch,
            GaitError::Job(gait_jobs::JobError::NoActiveLease) => ErrorKind::LeaseLost,
            GaitError::Job(_) => ErrorKind::InvalidInput,
            GaitError::Regress(_) => ErrorKind::InvalidInput,
            GaitError::Broker(gait_broker::BrokerError::NotRegistered(_)) => ErrorKind::InvalidInput,
            GaitError::Broker(gait_broker::BrokerError::Blocked(_) | gait_broker::BrokerError::Provider(_)) => ErrorKind::PermissionDenied,
            GaitError::Service(ServiceError::Unauthorized | ServiceError::NonLoopbackRequiresAuth) => ErrorKind::PermissionDenied,
            GaitError::Service(ServiceError::BodyTooLarge | ServiceError::InvalidIntent(_)) => ErrorKind::InvalidInput,
            GaitError::Service(ServiceError::ApprovalInvalid(_) | ServiceError::DelegationInvalid(_)) => ErrorKind::TokenScopeMismatch,
            GaitError::Service(ServiceError::Trace(_) | ServiceError::Io(_)) => ErrorKind::IoError,
            GaitError::Signer(SignerError::KeyLoad(_)) => ErrorKind::IoError,
            GaitError::Signer(_) => ErrorKind::SigInvalid,
            GaitError::Config(ConfigError::Read { .. }) => ErrorKind::IoError,
            GaitError::Config(ConfigError::Parse { .. } | ConfigError::UnknownProfile(_)) => ErrorKind::InvalidInput,
            GaitError::Config(ConfigError::FailClosed(_)) => ErrorKind::PolicyEvalFailed,
        }
    }

    /// Operator guidance for this failure, when spec.md §7's
    /// "user-visible failure behavior" has something concrete to
    /// suggest. Returns `None` for failures with no actionable next
    /// step beyond reading the error message.
    #[must_use]
    pub fn hint(&self) -> Option<OperatorHint> {
        match self {
            GaitError::Config(ConfigError::FailClosed(setting)) => Some(OperatorHint {
                next_command: Some(format!("set `{setting}` or switch `profile` to `dev`")),
                artifact_paths: Vec::new(),
            }),
            GaitError::Signer(SignerError::KeyLoad(_)) => Some(OperatorHint {
                next_command: Some("set signing_key_path or GAIT_SIGNING_KEY".to_owned()),
                artifact_paths: Vec::new(),
            }),
            GaitError::Journal(gait_journal::JournalError::SessionLocked(path)) => Some(OperatorHint {
                next_command: Some("retry once the owning process releases the session lock".to_owned()),
                artifact_paths: vec![path.clone()],
            }),
            GaitError::Job(gait_jobs::JobError::FingerprintMismatch) => Some(OperatorHint {
                next_command: Some("pass an explicit fingerprint override to resume".to_owned()),
                artifact_paths: Vec::new(),
            }),
            _ => None,
        }
    }
}

/// A stable taxonomy identifier from spec.md §7, independent of which
/// `GaitError` variant produced it. Machine consumers should key off
/// this rather than matching on `GaitError` directly, since variant
/// shape may grow without the taxonomy changing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A document failed schema validation.
    SchemaInvalid,
    /// A document contained a field not declared by its schema.
    UnknownField,
    /// An input value was otherwise malformed or out of range.
    InvalidInput,
    /// A recomputed hash did not match a declared one.
    HashMismatch,
    /// A pack archive entry was present but undeclared in its manifest.
    PackUndeclaredFile,
    /// A session journal's stored records could not be trusted as-is.
    JournalCorrupt,
    /// A cryptographic signature failed to verify.
    SigInvalid,
    /// A capability token's TTL has already passed.
    TokenExpired,
    /// A capability token does not cover the request it was presented for.
    TokenScopeMismatch,
    /// A capability token's nonce has already been observed.
    TokenReplay,
    /// A delegation chain exceeded its declared depth bound.
    DelegationDepthExceeded,
    /// Policy evaluation could not reach a verdict and failed closed.
    PolicyEvalFailed,
    /// Required context evidence was not supplied.
    ContextEvidenceMissing,
    /// Supplied context evidence exceeded its freshness bound.
    ContextFreshnessExceeded,
    /// A session's advisory lock is held by another owner.
    SessionLocked,
    /// A job's lease was lost or never held.
    LeaseLost,
    /// A resumed job's environment fingerprint did not match.
    EnvFingerprintMismatch,
    /// An operation exceeded its time budget.
    Timeout,
    /// An underlying I/O operation failed.
    IoError,
    /// The caller was not authorized to perform the operation.
    PermissionDenied,
}

/// Operator-facing guidance attached to a failure: a suggested next
/// command and any artifact paths relevant to recovering from it.
#[derive(Debug, Clone, Default)]
pub struct OperatorHint {
    /// A suggested next command or remediation step, in prose.
    pub next_command: Option<String>,
    /// Paths to artifacts relevant to diagnosing or recovering from
    /// this failure (for example, a locked journal's directory).
    pub artifact_paths: Vec<PathBuf>,
}

fn pack_exit_code(err: &PackError) -> u8 {
    match err {
        PackError::HashMismatch(_) | PackError::UndeclaredFile(_) | PackError::SignatureMissing | PackError::SignatureInvalid(_) | PackError::MissingManifest | PackError::InvalidManifest(_) => 2,
        PackError::Archive(_) | PackError::Schema(_) | PackError::MissingJobId | PackError::Canonicalization(_) => 6,
    }
}

/// Maps a rendered [`gait_policy::VerdictKind`] to the exit-code
/// contract of spec.md §6. `Allow` and `DryRun` both report success:
/// a dry run completed its evaluation without being denied.
#[must_use]
pub fn verdict_exit_code(kind: gait_policy::VerdictKind) -> u8 {
    match kind {
        gait_policy::VerdictKind::Allow | gait_policy::VerdictKind::DryRun => 0,
        gait_policy::VerdictKind::Block => 3,
        gait_policy::VerdictKind::RequireApproval => 4,
    }
}

// ============================================================================
// SECTION: Core Context
// ============================================================================

/// Everything one `gait` caller needs: a validated profile, a
/// signing-key source, and the state-directory root every sub-crate's
/// artifacts are rooted under.
pub struct CoreContext {
    config: CoreConfig,
}

impl CoreContext {
    /// Builds a context from `config`, validating it against its
    /// declared profile.
    ///
    /// # Errors
    ///
    /// Returns [`GaitError::Config`] if `config` fails
    /// [`CoreConfig::validate`] (for example, `oss-prod` without a
    /// configured signing key).
    pub fn new(config: CoreConfig) -> Result<Self, GaitError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The validated configuration this context was built from.
    #[must_use]
    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// `${state_dir}/packs`.
    #[must_use]
    pub fn packs_dir(&self) -> PathBuf {
        self.config.state_dir.join("packs")
    }

    /// `${state_dir}/traces`.
    #[must_use]
    pub fn traces_dir(&self) -> PathBuf {
        self.config.state_dir.join("traces")
    }

    /// `${state_dir}/sessions/<session_id>`.
    #[must_use]
    pub fn session_dir(&self, session_id: &gait_core::SessionId) -> PathBuf {
        self.config.state_dir.join("sessions").join(session_id.as_str())
    }

    /// `${state_dir}/jobs/<job_id>`.
    #[must_use]
    pub fn job_dir(&self, job_id: &gait_core::JobId) -> PathBuf {
        self.config.state_dir.join("jobs").join(job_id.as_str())
    }

    /// `${state_dir}/regress`.
    #[must_use]
    pub fn regress_dir(&self) -> PathBuf {
        self.config.state_dir.join("regress")
    }

    /// Loads a signer for this context's profile: a fresh ephemeral key
    /// under [`Profile::Dev`], or the configured production key under
    /// [`Profile::OssProd`].
    ///
    /// # Errors
    ///
    /// Returns [`GaitError::Signer`] if a production key path is
    /// configured but unreadable, or if neither a key path nor the
    /// `GAIT_SIGNING_KEY` environment variable is set.
    pub fn signer(&self) -> Result<Box<dyn Signer>, GaitError> {
        if self.config.profile == Profile::Dev {
            return Ok(Box::new(DevSigner::generate()));
        }
        let signer = match &self.config.signing_key_path {
            Some(path) => ProdSigner::load(path)?,
            None => ProdSigner::from_env()?,
        };
        Ok(Box::new(signer))
    }

    /// Loads and validates a policy document.
    ///
    /// # Errors
    ///
    /// Returns [`GaitError::Policy`] if `yaml` fails strict parsing or
    /// semantic validation.
    pub fn load_policy(&self, yaml: &str) -> Result<Policy, GaitError> {
        let policy = Policy::load_str(yaml)?;
        policy.validate()?;
        Ok(policy)
    }

    /// Verifies a pack's manifest, declared file hashes, and — when
    /// `options.trusted_key` is set — its signature.
    ///
    /// # Errors
    ///
    /// Returns [`GaitError::Pack`] on any integrity, schema, or
    /// signature failure.
    pub fn verify(&self, pack_bytes: &[u8], options: VerifyOptions<'_>) -> Result<VerifyReport, GaitError> {
        gait_pack::verify(pack_bytes, options).map_err(GaitError::from)
    }

    /// Assembles and signs a pack with this context's signer.
    ///
    /// # Errors
    ///
    /// Returns [`GaitError::Signer`] if a signer cannot be loaded, or
    /// [`GaitError::Pack`] if assembly itself fails.
    pub fn build_pack(&self, input: BuildInput) -> Result<Vec<u8>, GaitError> {
        let signer = self.signer()?;
        gait_pack::build(input, Some(signer.as_ref())).map_err(GaitError::from)
    }

    /// Compares two packs field by field.
    ///
    /// # Errors
    ///
    /// Returns [`GaitError::Pack`] if either pack fails to open.
    pub fn diff_packs(&self, left_bytes: &[u8], right_bytes: &[u8]) -> Result<Vec<DiffEntry>, GaitError> {
        gait_pack::diff(left_bytes, right_bytes).map_err(GaitError::from)
    }

    /// Evaluates an intent against `policy`, verifying any attached
    /// tokens, and emits a signed trace record under this context's
    /// [`CoreContext::traces_dir`].
    ///
    /// # Errors
    ///
    /// Returns [`GaitError::Signer`] if a signer cannot be loaded, or
    /// [`GaitError::Service`] if normalization, token verification, or
    /// trace emission fails.
    pub fn evaluate_intent(&self, request: EvaluateRequest, policy: Policy, trust_roots: Vec<TrustRoot>) -> Result<EvaluateResponse, GaitError> {
        let signer = self.signer()?;
        let strict = self.config.profile.is_fail_closed();
        let state = ServiceState::new(policy, self.config.profile, trust_roots, signer, self.traces_dir(), strict)?;
        gait_service::evaluate_once(&state, request).map_err(GaitError::from)
    }

    /// Mints a capability token signed with this context's signer.
    ///
    /// # Errors
    ///
    /// Returns [`GaitError::Signer`] if a signer cannot be loaded, or
    /// [`GaitError::Token`] if claims fail to canonicalize.
    pub fn mint_token(&self, request: MintTokenRequest) -> Result<Token, GaitError> {
        let signer = self.signer()?;
        match request {
            MintTokenRequest::Approval { intent_digest, policy_digest, scope, ttl_until, approver, reason_code } => {
                let token = gait_tokens::mint_approval(signer.as_ref(), intent_digest, policy_digest, scope, ttl_until, approver, reason_code)?;
                Ok(Token::Approval(token))
            }
            MintTokenRequest::Delegation { delegator, delegate, scope_class, max_depth, ttl_until, intent_binding } => {
                let token = gait_tokens::mint_delegation(signer.as_ref(), delegator, delegate, scope_class, max_depth, ttl_until, intent_binding)?;
                Ok(Token::Delegation(token))
            }
        }
    }

    /// Verifies a previously minted capability token.
    ///
    /// # Errors
    ///
    /// Returns [`GaitError::Token`] naming the first failed check.
    pub fn verify_token(&self, token: &Token, trust_roots: &[TrustRoot], bindings: TokenVerifyBindings<'_>) -> Result<(), GaitError> {
        match (token, bindings) {
            (Token::Approval(token), TokenVerifyBindings::Approval(bindings)) => Ok(gait_tokens::verify_approval(token, trust_roots, &bindings)?),
            (Token::Delegation(token), TokenVerifyBindings::Delegation { now, observed_depth }) => {
                Ok(gait_tokens::verify_delegation(token, trust_roots, now, observed_depth)?)
            }
            (Token::Approval(_), TokenVerifyBindings::Delegation { .. }) | (Token::Delegation(_), TokenVerifyBindings::Approval(_)) => Err(GaitError::Token(TokenError::ScopeMismatch)),
        }
    }
}

// ============================================================================
// SECTION: Tokens
// ============================================================================

/// A minted capability token of either kind.
#[derive(Debug, Clone)]
pub enum Token {
    /// A single-intent approval grant.
    Approval(ApprovalToken),
    /// A delegated-authority grant.
    Delegation(DelegationToken),
}

/// Claims to mint a new token from, keyed by token kind.
pub enum MintTokenRequest {
    /// Mint an [`ApprovalToken`].
    Approval {
        /// Digest of the intent this approval authorizes.
        intent_digest: gait_core::HashDigest,
        /// Digest of the policy this approval was evaluated under.
        policy_digest: gait_core::HashDigest,
        /// Side-effect classes this approval authorizes.
        scope: gait_tokens::Scope,
        /// This approval is invalid from this instant on.
        ttl_until: gait_core::Timestamp,
        /// Identity of the approver.
        approver: String,
        /// Stable reason code recorded with the grant.
        reason_code: String,
    },
    /// Mint a [`DelegationToken`].
    Delegation {
        /// Identity delegating authority.
        delegator: String,
        /// Identity receiving delegated authority.
        delegate: String,
        /// Broad capability class this delegation grants.
        scope_class: String,
        /// Maximum delegation chain depth this grant may participate in.
        max_depth: u32,
        /// This delegation is invalid from this instant on.
        ttl_until: gait_core::Timestamp,
        /// If set, binds this delegation to one specific intent.
        intent_binding: Option<gait_core::HashDigest>,
    },
}

/// Facts a token is checked against at verification time, keyed by
/// token kind since approval and delegation tokens bind to different
/// evidence.
pub enum TokenVerifyBindings<'a> {
    /// Bindings for an [`ApprovalToken`].
    Approval(gait_tokens::ApprovalBindings<'a>),
    /// Bindings for one link of a [`DelegationToken`] chain.
    Delegation {
        /// Current wall-clock time.
        now: gait_core::Timestamp,
        /// Observed chain depth at this link.
        observed_depth: u32,
    },
}

#[cfg(test)]
mod tests {
    use gait_core::SessionId;
    use gait_core::Timestamp;
    use gait_intent::IntentContext;
    use gait_intent::IntentRequest;
    use std::collections::BTreeMap;
    use std::collections::BTreeSet;
    use std::path::Path;

    use super::*;

    fn context(dir: &Path) -> CoreContext {
        let config = CoreConfig { profile: Profile::Dev, signing_key_path: None, state_dir: dir.to_path_buf() };
        CoreContext::new(config).unwrap()
    }

    fn intent_request(tool: &str) -> EvaluateRequest {
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
    fn evaluate_intent_renders_allow_for_an_empty_policy() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let policy = ctx.load_policy("rules: []\ndefault_verdict: allow\n").unwrap();
        let response = ctx.evaluate_intent(intent_request("fs.read"), policy, Vec::new()).unwrap();
        assert_eq!(response.verdict, gait_policy::VerdictKind::Allow);
        assert_eq!(verdict_exit_code(response.verdict), 0);
    }

    #[test]
    fn build_then_verify_round_trips_a_signed_pack() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let mut files = BTreeMap::new();
        files.insert("payload.json".to_owned(), b"{}".to_vec());
        let input = BuildInput { pack_type: gait_pack::PackType::Run, files, job_id: None, prev_checkpoint_digest: None, generated_at: Timestamp::now() };
        let bytes = ctx.build_pack(input).unwrap();
        let report = ctx.verify(&bytes, VerifyOptions::default()).unwrap();
        assert_eq!(report.checked_files, 1);
    }

    #[test]
    fn mint_approval_token_carries_the_requested_claims() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let policy = ctx.load_policy("rules: []\ndefault_verdict: allow\n").unwrap();
        let request = intent_request("fs.write");
        let canonical = gait_intent::normalize(&request.intent);
        let intent_digest = canonical.digest().unwrap();
        let policy_digest = policy.digest().unwrap();

        let token = ctx
            .mint_token(MintTokenRequest::Approval {
                intent_digest: intent_digest.clone(),
                policy_digest: policy_digest.clone(),
                scope: BTreeSet::new(),
                ttl_until: Timestamp::parse("2099-01-01T00:00:00Z").unwrap(),
                approver: "approver-1".to_owned(),
                reason_code: "manual_approval".to_owned(),
            })
            .unwrap();

        match token {
            Token::Approval(token) => {
                assert_eq!(token.claims.intent_digest, intent_digest);
                assert_eq!(token.claims.policy_digest, policy_digest);
                assert_eq!(token.claims.approver, "approver-1");
            }
            Token::Delegation(_) => panic!("expected an approval token"),
        }
    }

    #[test]
    fn verify_token_rejects_a_delegation_bindings_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let token = ctx
            .mint_token(MintTokenRequest::Delegation {
                delegator: "agent-root".to_owned(),
                delegate: "agent-child".to_owned(),
                scope_class: "fs".to_owned(),
                max_depth: 2,
                ttl_until: Timestamp::parse("2099-01-01T00:00:00Z").unwrap(),
                intent_binding: None,
            })
            .unwrap();

        let err = ctx
            .verify_token(&token, &[], TokenVerifyBindings::Delegation { now: Timestamp::now(), observed_depth: 0 })
            .unwrap_err();
        assert!(matches!(err, GaitError::Token(TokenError::DelegationSignerUntrusted)));
    }
}
