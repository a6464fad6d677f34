// demos/approval-flow/src/main.rs
// ============================================================================
// Module: Gait Approval-Flow Demo
// Description: An intent requiring approval, first refused, then allowed
//              once a valid approval token is attached.
// Purpose: Demonstrate spec.md §8's "approval required" scenario: a
//          `tool.write` call renders `require_approval` (exit 4) with no
//          token attached, then `allow` (exit 0) once a token bound to
//          the same intent/policy digests and signed by a trusted key
//          is presented.
// Dependencies: gait, gait-core, gait-intent, gait-policy, gait-service,
//               gait-tokens
// ============================================================================

//! ## Overview
//! The approving identity signs with its own [`gait_core::DevSigner`]
//! key, independent of the evaluating [`gait::CoreContext`]'s own
//! signer (which only signs trace records). The context is told to
//! trust that key via the `trust_roots` argument to
//! [`gait::CoreContext::evaluate_intent`].

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::io::Write;

use gait::CoreContext;
use gait_core::CoreConfig;
use gait_core::DevSigner;
use gait_core::KeyId;
use gait_core::Profile;
use gait_core::SessionId;
use gait_core::Timestamp;
use gait_intent::IntentContext;
use gait_intent::IntentRequest;
use gait_intent::Target;
use gait_policy::VerdictKind;
use gait_service::EvaluateRequest;
use gait_tokens::TrustRoot;

const POLICY_YAML: &str = r#"
rules:
  - id: require_approval_for_tool_write
    match:
      tool_glob: "tool.write"
    verdict: require_approval
    reason_code: approval_required
default_verdict: allow
default_reason_code: no_matching_rule
"#;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let state_dir = tempfile::tempdir()?;
    let config = CoreConfig {
        profile: Profile::Dev,
        signing_key_path: None,
        state_dir: state_dir.path().to_path_buf(),
    };
    let ctx = CoreContext::new(config)?;
    let policy = ctx.load_policy(POLICY_YAML)?;

    let intent = IntentRequest {
        tool: "tool.write".to_owned(),
        args: BTreeMap::new(),
        targets: vec![Target {
            class: "fs.write".to_owned(),
            locator: "/tmp/demo-file".to_owned(),
        }],
        context: IntentContext {
            identity: "agent-1".to_owned(),
            workspace: "repo-a".to_owned(),
            risk_class: "medium".to_owned(),
            session_id: SessionId::new("demo-session"),
            delegation_chain: Vec::new(),
            context_evidence_digest: None,
        },
        provenance: BTreeMap::new(),
        transport: None,
    };

    let unapproved = EvaluateRequest {
        intent: intent.clone(),
        approval_token: None,
        delegation_token: None,
        context: None,
    };
    let first = ctx.evaluate_intent(unapproved, policy.clone(), Vec::new())?;
    write_line("Without approval, verdict", verdict_label(first.verdict))?;
    write_line("Without approval, exit code", &gait::verdict_exit_code(first.verdict).to_string())?;

    let canonical = gait_intent::normalize(&intent);
    let intent_digest = canonical.digest()?;
    let policy_digest = policy.digest()?;

    let approver_signer = DevSigner::generate();
    let trust_root = TrustRoot {
        key_id: KeyId::from_public_key(&approver_signer.verifying_key()),
        verifying_key: approver_signer.verifying_key(),
    };

    let mut scope = BTreeSet::new();
    scope.insert("fs.write".to_owned());
    let approval = gait_tokens::mint_approval(
        &approver_signer,
        intent_digest,
        policy_digest,
        scope,
        Timestamp::parse("2099-01-01T00:00:00Z")?,
        "approver-1",
        "manual_approval",
    )?;

    let approved = EvaluateRequest {
        intent,
        approval_token: Some(approval),
        delegation_token: None,
        context: None,
    };
    let second = ctx.evaluate_intent(approved, policy, vec![trust_root])?;
    write_line("With approval, verdict", verdict_label(second.verdict))?;
    write_line("With approval, exit code", &gait::verdict_exit_code(second.verdict).to_string())?;

    Ok(())
}

/// Returns a stable label for a rendered verdict kind.
const fn verdict_label(kind: VerdictKind) -> &'static str {
    match kind {
        VerdictKind::Allow => "allow",
        VerdictKind::Block => "block",
        VerdictKind::DryRun => "dry_run",
        VerdictKind::RequireApproval => "require_approval",
    }
}

/// Writes a labeled line to stdout.
fn write_line(label: &str, value: &str) -> Result<(), std::io::Error> {
    let mut out = std::io::stdout();
    writeln!(out, "{label}: {value}")?;
    Ok(())
}
