// demos/high-risk-block/src/main.rs
// ============================================================================
// Module: Gait High-Risk-Block Demo
// Description: Evaluate a destructive filesystem intent against a policy
//              that blocks it.
// Purpose: Demonstrate spec.md §8's "high-risk block" scenario: a
//          `fs.delete` intent against `/etc/passwd` is blocked by the
//          first matching rule, with a stable reason code and the
//          exit-code contract's `3`.
// Dependencies: gait, gait-core, gait-intent, gait-service
// ============================================================================

//! ## Overview
//! Loads a policy whose first rule blocks `fs.delete` targeting
//! system paths, evaluates a matching intent against it, and prints
//! the rendered verdict, reason codes, matched rule, and exit code.

use std::collections::BTreeMap;
use std::io::Write;

use gait::CoreContext;
use gait_core::CoreConfig;
use gait_core::Profile;
use gait_core::SessionId;
use gait_intent::IntentContext;
use gait_intent::IntentRequest;
use gait_intent::Target;
use gait_policy::VerdictKind;
use gait_service::EvaluateRequest;

const POLICY_YAML: &str = r#"
rules:
  - id: block_fs_delete_system
    match:
      tool_glob: "fs.delete"
      target_classes: ["fs.delete"]
    verdict: block
    reason_code: blocked_destructive_tool
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

    let request = EvaluateRequest {
        intent: IntentRequest {
            tool: "fs.delete".to_owned(),
            args: BTreeMap::new(),
            targets: vec![Target {
                class: "fs.delete".to_owned(),
                locator: "/etc/passwd".to_owned(),
            }],
            context: IntentContext {
                identity: "agent-1".to_owned(),
                workspace: "repo-a".to_owned(),
                risk_class: "high".to_owned(),
                session_id: SessionId::new("demo-session"),
                delegation_chain: Vec::new(),
                context_evidence_digest: None,
            },
            provenance: BTreeMap::new(),
            transport: None,
        },
        approval_token: None,
        delegation_token: None,
        context: None,
    };

    let response = ctx.evaluate_intent(request, policy, Vec::new())?;

    write_line("Verdict", verdict_label(response.verdict))?;
    write_line("Reason codes", &response.reason_codes.join(","))?;
    write_line("Matched rule", response.matched_rule.as_deref().unwrap_or("none"))?;
    write_line("Exit code", &gait::verdict_exit_code(response.verdict).to_string())?;

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
