// crates/gait-policy/src/lib.rs
// ============================================================================
// Module: Gait Policy
// Description: Strict policy loading and deterministic rule evaluation.
// Purpose: Turn a YAML policy document into a closed rule set and render
//          first-match-wins verdicts with oss-prod fail-closed obligations.
// Dependencies: gait-core, gait-intent, globset, serde, serde_yaml
// ============================================================================

//! ## Overview
//! A [`Policy`] is an ordered list of [`Rule`]s plus a `default_verdict`.
//! [`Policy::load_str`] parses it with `serde_yaml`, rejecting unknown
//! fields at every nesting level and reporting the offending `line:col`
//! when parsing fails. [`Policy::validate`] then checks the invariants
//! `serde` alone cannot express (unique rule ids, non-empty reason
//! codes, compilable glob patterns). [`evaluate`] walks the rules in
//! declared order and returns the first one whose [`MatchPredicate`]
//! matches, applying the `oss-prod` profile's fail-closed obligations
//! on top of whatever the matched rule would otherwise produce.

use std::collections::BTreeSet;

use gait_core::HashAlgorithm;
use gait_core::HashDigest;
use gait_core::Profile;
use gait_core::hash_canonical_json;
use gait_intent::CanonicalIntent;
use globset::Glob;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Policy Document
// ============================================================================

/// A single side-effect class a rule's `target_classes` matcher can name.
pub type TargetClass = String;

/// A predicate a [`Rule`] must satisfy to match an intent. Every present
/// field is ANDed together; an absent field imposes no constraint.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatchPredicate {
    /// Glob pattern matched against `intent.tool`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_glob: Option<String>,
    /// Every declared target's class must be a member of this set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_classes: Option<BTreeSet<TargetClass>>,
    /// Glob pattern matched against `intent.context.identity`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_pattern: Option<String>,
    /// Glob pattern matched against `intent.context.workspace`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_pattern: Option<String>,
    /// If `true`, the intent must carry a context evidence digest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_context_evidence: Option<bool>,
    /// Attached context evidence's age, if known, must not exceed this.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_context_age_seconds: Option<u64>,
    /// The intent's delegation chain length must not exceed this.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_delegation_depth: Option<u32>,
}

/// Verdict kinds a rule or `default_verdict` may produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictKind {
    /// The call may proceed.
    Allow,
    /// The call is refused.
    Block,
    /// The call is evaluated but not executed; used for policy rehearsal.
    DryRun,
    /// The call requires an attached, valid approval token to proceed.
    RequireApproval,
}

/// One ordered entry in a [`Policy`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Rule {
    /// Stable identifier, unique within the policy.
    pub id: String,
    /// Conditions this rule fires under.
    #[serde(rename = "match")]
    pub match_predicate: MatchPredicate,
    /// Verdict produced when this rule matches.
    pub verdict: VerdictKind,
    /// Stable reason code surfaced alongside `verdict`.
    pub reason_code: String,
    /// If set, a matching intent without qualifying context evidence
    /// still forces `block` under `oss-prod`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_context_evidence_mode: Option<String>,
    /// If set, a matching intent without a valid delegation still
    /// forces `block` under `oss-prod`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_delegation: Option<bool>,
    /// If set, overrides the predicate's own freshness bound for the
    /// fail-closed obligation check rather than the match itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_context_age_seconds: Option<u64>,
}

/// An ordered rule set plus the verdict to use when nothing matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Policy {
    /// Rules, evaluated in this order; the first match wins.
    pub rules: Vec<Rule>,
    /// Verdict applied when no rule matches.
    pub default_verdict: VerdictKind,
    /// Reason code applied when no rule matches.
    #[serde(default = "default_reason_code")]
    pub default_reason_code: String,
}

/// Returns the reason code used for an unmatched, `default_verdict` decision.
fn default_reason_code() -> String {
    "no_matching_rule".to_owned()
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// A `line:col` locator into a policy document's source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Locator {
    /// One-based line number.
    pub line: usize,
    /// One-based column number.
    pub column: usize,
}

/// Errors raised loading or validating a [`Policy`].
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The document failed to parse as YAML, or violated `serde`-level
    /// structure (unknown field, wrong type, closed-enum mismatch).
    #[error("{message}")]
    Parse {
        /// Parse failure description, prefixed with a `line:col` locator
        /// when `serde_yaml` reports one.
        message: String,
        /// Source location, when `serde_yaml` reports one.
        locator: Option<Locator>,
    },
    /// Two or more rules declare the same `id`.
    #[error("duplicate rule id: {0}")]
    DuplicateRuleId(String),
    /// A rule's `reason_code` is empty.
    #[error("rule {0} has an empty reason_code")]
    EmptyReasonCode(String),
    /// A rule's `id` is empty.
    #[error("policy contains a rule with an empty id")]
    EmptyRuleId,
    /// A glob pattern failed to compile.
    #[error("rule {rule_id} has an invalid glob pattern in {field}: {source}")]
    InvalidGlob {
        /// Offending rule's id.
        rule_id: String,
        /// Field name the invalid pattern was found in.
        field: &'static str,
        /// Underlying compilation error.
        source: globset::Error,
    },
    /// Canonical encoding of the policy failed while computing its digest.
    #[error("failed to canonicalize policy: {0}")]
    Canonicalization(String),
}

impl Policy {
    /// Parses a policy document from YAML text.
    ///
    /// Unknown fields at any nesting level, and values outside a closed
    /// enum's declared variants, are rejected with a `line:col` locator
    /// when `serde_yaml` can supply one.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Parse`] if the document is not well-formed.
    pub fn load_str(source: &str) -> Result<Self, PolicyError> {
        serde_yaml::from_str(source).map_err(|err| {
            let locator = err.location().map(|location| Locator {
                line: location.line(),
                column: location.column(),
            });
            let message = match locator {
                Some(loc) => format!("{}:{}: {err}", loc.line, loc.column),
                None => err.to_string(),
            };
            PolicyError::Parse { message, locator }
        })
    }

    /// Validates invariants `serde` cannot express on its own: unique,
    /// non-empty rule ids, non-empty reason codes, and compilable glob
    /// patterns.
    ///
    /// # Errors
    ///
    /// Returns the first [`PolicyError`] variant describing the
    /// violation found.
    pub fn validate(&self) -> Result<(), PolicyError> {
        ensure_unique_rule_ids(&self.rules)?;
        ensure_nonempty_rule_ids(&self.rules)?;
        ensure_nonempty_reason_codes(&self.rules)?;
        ensure_globs_compile(&self.rules)?;
        Ok(())
    }

    /// Computes this policy's canonical digest (`policy_digest`).
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Canonicalization`] if the policy cannot be
    /// canonically encoded.
    pub fn digest(&self) -> Result<HashDigest, PolicyError> {
        hash_canonical_json(HashAlgorithm::Sha256, self).map_err(|err| PolicyError::Canonicalization(err.to_string()))
    }
}

/// Ensures no two rules share an `id`.
fn ensure_unique_rule_ids(rules: &[Rule]) -> Result<(), PolicyError> {
    for (index, rule) in rules.iter().enumerate() {
        if rules.iter().skip(index + 1).any(|other| other.id == rule.id) {
            return Err(PolicyError::DuplicateRuleId(rule.id.clone()));
        }
    }
    Ok(())
}

/// Ensures every rule carries a non-empty `id`.
fn ensure_nonempty_rule_ids(rules: &[Rule]) -> Result<(), PolicyError> {
    if rules.iter().any(|rule| rule.id.trim().is_empty()) {
        return Err(PolicyError::EmptyRuleId);
    }
    Ok(())
}

/// Ensures every rule carries a non-empty `reason_code`.
fn ensure_nonempty_reason_codes(rules: &[Rule]) -> Result<(), PolicyError> {
    for rule in rules {
        if rule.reason_code.trim().is_empty() {
            return Err(PolicyError::EmptyReasonCode(rule.id.clone()));
        }
    }
    Ok(())
}

/// Ensures every glob pattern a rule declares compiles.
fn ensure_globs_compile(rules: &[Rule]) -> Result<(), PolicyError> {
    for rule in rules {
        if let Some(pattern) = &rule.match_predicate.tool_glob {
            compile_glob(pattern).map_err(|source| PolicyError::InvalidGlob {
                rule_id: rule.id.clone(),
                field: "tool_glob",
                source,
            })?;
        }
        if let Some(pattern) = &rule.match_predicate.identity_pattern {
            compile_glob(pattern).map_err(|source| PolicyError::InvalidGlob {
                rule_id: rule.id.clone(),
                field: "identity_pattern",
                source,
            })?;
        }
        if let Some(pattern) = &rule.match_predicate.workspace_pattern {
            compile_glob(pattern).map_err(|source| PolicyError::InvalidGlob {
                rule_id: rule.id.clone(),
                field: "workspace_pattern",
                source,
            })?;
        }
    }
    Ok(())
}

/// Compiles a glob pattern, discarding the matcher; used only to surface
/// compile errors during [`Policy::validate`].
fn compile_glob(pattern: &str) -> Result<(), globset::Error> {
    Glob::new(pattern).map(|_| ())
}

// ============================================================================
// SECTION: Evaluation
// ============================================================================

/// Facts about an intent's evaluation-time environment that a
/// [`MatchPredicate`] or fail-closed obligation can depend on, beyond
/// what's already present in the [`CanonicalIntent`] itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EvaluationContext {
    /// Whether the intent's context evidence digest, if any, resolves to
    /// a bundle the caller has confirmed is present.
    pub context_evidence_present: bool,
    /// Age in seconds of the attached context evidence, if known.
    pub context_evidence_age_seconds: Option<u64>,
    /// Whether an attached approval token has already been verified
    /// valid for this intent.
    pub approval_valid: bool,
    /// Whether the intent's delegation chain, if any, has already been
    /// verified valid.
    pub delegation_valid: bool,
    /// Whether a rate limit applicable to this intent has been exceeded.
    pub rate_limited: bool,
    /// Profile the evaluation runs under.
    pub profile: Profile,
}

/// The immutable outcome of one evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    /// The rendered verdict kind.
    pub kind: VerdictKind,
    /// Reason codes explaining `kind`, in determination order.
    pub reason_codes: Vec<String>,
    /// Fail-closed obligation violations that overrode the matched
    /// rule's own verdict, if any.
    pub violations: Vec<String>,
    /// Id of the rule that matched, or `None` if `default_verdict` applied.
    pub matched_rule: Option<String>,
}

/// Evaluates `intent` against `policy`, returning the first matching
/// rule's verdict (or `default_verdict` if none match), with `oss-prod`
/// fail-closed obligations applied on top.
#[must_use]
pub fn evaluate(intent: &CanonicalIntent, policy: &Policy, ctx: &EvaluationContext) -> Verdict {
    let matched = policy.rules.iter().find(|rule| predicate_matches(&rule.match_predicate, intent, ctx));

    let (mut kind, mut reason_codes, matched_rule) = match matched {
        Some(rule) => (rule.verdict, vec![rule.reason_code.clone()], Some(rule.id.clone())),
        None => (policy.default_verdict, vec![policy.default_reason_code.clone()], None),
    };

    if kind == VerdictKind::RequireApproval && ctx.approval_valid {
        kind = VerdictKind::Allow;
    }

    let mut violations = Vec::new();
    if ctx.profile.is_fail_closed() {
        collect_fail_closed_violations(intent, matched, ctx, &mut violations);
    }

    if !violations.is_empty() {
        kind = VerdictKind::Block;
        reason_codes = violations.clone();
    }

    Verdict {
        kind,
        reason_codes,
        violations,
        matched_rule,
    }
}

/// Returns `true` if every constraint `predicate` declares is satisfied.
fn predicate_matches(predicate: &MatchPredicate, intent: &CanonicalIntent, ctx: &EvaluationContext) -> bool {
    if let Some(pattern) = &predicate.tool_glob
        && !glob_matches(pattern, &intent.tool)
    {
        return false;
    }
    if let Some(classes) = &predicate.target_classes
        && !intent.targets.iter().all(|target| classes.contains(&target.class))
    {
        return false;
    }
    if let Some(pattern) = &predicate.identity_pattern
        && !glob_matches(pattern, &intent.context.identity)
    {
        return false;
    }
    if let Some(pattern) = &predicate.workspace_pattern
        && !glob_matches(pattern, &intent.context.workspace)
    {
        return false;
    }
    if predicate.require_context_evidence == Some(true) && !ctx.context_evidence_present {
        return false;
    }
    if let Some(max_age) = predicate.max_context_age_seconds {
        match ctx.context_evidence_age_seconds {
            Some(age) if age <= max_age => {}
            _ => return false,
        }
    }
    if let Some(max_depth) = predicate.max_delegation_depth {
        let depth = u32::try_from(intent.context.delegation_chain.len()).unwrap_or(u32::MAX);
        if depth > max_depth {
            return false;
        }
    }
    true
}

/// Compiles and matches a glob pattern against a single string. Patterns
/// are already known-good by the time evaluation runs; a pattern that
/// fails to compile here (one that slipped past [`Policy::validate`])
/// is treated as a non-match rather than a panic.
fn glob_matches(pattern: &str, candidate: &str) -> bool {
    Glob::new(pattern).is_ok_and(|glob| glob.compile_matcher().is_match(candidate))
}

/// Appends every `oss-prod` fail-closed obligation violation found for
/// this decision to `violations`.
fn collect_fail_closed_violations(
    intent: &CanonicalIntent,
    matched: Option<&Rule>,
    ctx: &EvaluationContext,
    violations: &mut Vec<String>,
) {
    let is_high_risk = intent.context.risk_class == "high";
    let has_declared_endpoint_class = !intent.targets.is_empty();
    if is_high_risk && !has_declared_endpoint_class {
        violations.push("missing_endpoint_class".to_owned());
    }

    if intent.context.identity.trim().is_empty() || intent.context.workspace.trim().is_empty() {
        violations.push("missing_identity_context".to_owned());
    }

    let requires_evidence = matched.is_some_and(|rule| rule.required_context_evidence_mode.is_some())
        || matched.is_some_and(|rule| rule.match_predicate.require_context_evidence == Some(true));
    if requires_evidence && !ctx.context_evidence_present {
        violations.push("missing_context_evidence".to_owned());
    }

    if let Some(rule) = matched {
        let max_age = rule.max_context_age_seconds.or(rule.match_predicate.max_context_age_seconds);
        if let Some(max_age) = max_age
            && let Some(age) = ctx.context_evidence_age_seconds
            && age > max_age
        {
            violations.push("context_freshness_exceeded".to_owned());
        }
    }

    if matched.is_some_and(|rule| rule.require_delegation == Some(true)) && !ctx.delegation_valid {
        violations.push("invalid_or_missing_delegation".to_owned());
    }

    if matched.is_some_and(|rule| rule.verdict == VerdictKind::RequireApproval) && !ctx.approval_valid {
        violations.push("invalid_or_missing_approval".to_owned());
    }

    if ctx.rate_limited {
        violations.push("rate_limit_exceeded".to_owned());
    }
}

#[cfg(test)]
mod tests {
    use gait_core::SessionId;
    use gait_intent::IntentContext;
    use gait_intent::Target;
    use std::collections::BTreeMap;

    use super::*;

    fn intent(tool: &str, risk_class: &str, targets: Vec<Target>) -> CanonicalIntent {
        CanonicalIntent {
            tool: tool.to_owned(),
            args: BTreeMap::new(),
            targets,
            context: IntentContext {
                identity: "agent-1".to_owned(),
                workspace: "repo-a".to_owned(),
                risk_class: risk_class.to_owned(),
                session_id: SessionId::new("sess-1"),
                delegation_chain: Vec::new(),
                context_evidence_digest: None,
            },
            provenance: BTreeMap::new(),
        }
    }

    fn dev_ctx() -> EvaluationContext {
        EvaluationContext {
            profile: Profile::Dev,
            ..Default::default()
        }
    }

    #[test]
    fn rejects_unknown_top_level_field() {
        let yaml = "rules: []\ndefault_verdict: block\nbogus_field: 1\n";
        let err = Policy::load_str(yaml).unwrap_err();
        assert!(matches!(err, PolicyError::Parse { .. }));
    }

    #[test]
    fn rejects_unknown_verdict_variant() {
        let yaml = "rules: []\ndefault_verdict: maybe\n";
        assert!(Policy::load_str(yaml).is_err());
    }

    #[test]
    fn detects_duplicate_rule_ids() {
        let yaml = r"
rules:
  - id: r1
    match: {}
    verdict: allow
    reason_code: ok
  - id: r1
    match: {}
    verdict: block
    reason_code: nope
default_verdict: block
";
        let policy = Policy::load_str(yaml).unwrap();
        assert!(matches!(policy.validate(), Err(PolicyError::DuplicateRuleId(id)) if id == "r1"));
    }

    #[test]
    fn first_matching_rule_wins_in_declared_order() {
        let yaml = r"
rules:
  - id: block_delete
    match:
      tool_glob: 'fs.delete'
    verdict: block
    reason_code: blocked_destructive_tool
  - id: allow_everything
    match: {}
    verdict: allow
    reason_code: default_allow
default_verdict: block
";
        let policy = Policy::load_str(yaml).unwrap();
        policy.validate().unwrap();

        let destructive = intent(
            "fs.delete",
            "high",
            vec![Target {
                class: "fs.delete".to_owned(),
                locator: "/etc/passwd".to_owned(),
            }],
        );
        let verdict = evaluate(&destructive, &policy, &dev_ctx());
        assert_eq!(verdict.kind, VerdictKind::Block);
        assert_eq!(verdict.matched_rule.as_deref(), Some("block_delete"));
        assert_eq!(verdict.reason_codes, vec!["blocked_destructive_tool".to_owned()]);

        let benign = intent("fs.read", "low", Vec::new());
        let verdict = evaluate(&benign, &policy, &dev_ctx());
        assert_eq!(verdict.kind, VerdictKind::Allow);
        assert_eq!(verdict.matched_rule.as_deref(), Some("allow_everything"));
    }

    #[test]
    fn unmatched_intent_falls_back_to_default_verdict() {
        let yaml = "rules: []\ndefault_verdict: block\ndefault_reason_code: nothing_matched\n";
        let policy = Policy::load_str(yaml).unwrap();
        let verdict = evaluate(&intent("anything", "low", Vec::new()), &policy, &dev_ctx());
        assert_eq!(verdict.kind, VerdictKind::Block);
        assert_eq!(verdict.matched_rule, None);
        assert_eq!(verdict.reason_codes, vec!["nothing_matched".to_owned()]);
    }

    #[test]
    fn oss_prod_forces_block_on_missing_identity_context() {
        let yaml = r"
rules:
  - id: allow_all
    match: {}
    verdict: allow
    reason_code: default_allow
default_verdict: block
";
        let policy = Policy::load_str(yaml).unwrap();
        let mut bad_intent = intent("anything", "low", Vec::new());
        bad_intent.context.identity = String::new();

        let ctx = EvaluationContext {
            profile: Profile::OssProd,
            ..Default::default()
        };
        let verdict = evaluate(&bad_intent, &policy, &ctx);
        assert_eq!(verdict.kind, VerdictKind::Block);
        assert!(verdict.violations.contains(&"missing_identity_context".to_owned()));
    }

    #[test]
    fn oss_prod_forces_block_when_approval_is_missing() {
        let yaml = r"
rules:
  - id: needs_approval
    match:
      tool_glob: 'tool.write'
    verdict: require_approval
    reason_code: approval_required
default_verdict: block
";
        let policy = Policy::load_str(yaml).unwrap();
        let write_intent = intent("tool.write", "low", Vec::new());

        let ctx = EvaluationContext {
            profile: Profile::OssProd,
            approval_valid: false,
            ..Default::default()
        };
        let verdict = evaluate(&write_intent, &policy, &ctx);
        assert_eq!(verdict.kind, VerdictKind::Block);
        assert!(verdict.violations.contains(&"invalid_or_missing_approval".to_owned()));

        let ctx_with_approval = EvaluationContext {
            approval_valid: true,
            ..ctx
        };
        let verdict = evaluate(&write_intent, &policy, &ctx_with_approval);
        assert_eq!(verdict.kind, VerdictKind::Allow);
        assert!(verdict.violations.is_empty());
    }

    #[test]
    fn delegation_depth_bound_excludes_deep_chains_from_matching() {
        let yaml = r"
rules:
  - id: shallow_only
    match:
      max_delegation_depth: 2
    verdict: allow
    reason_code: shallow_allow
default_verdict: block
default_reason_code: delegation_depth_exceeded
";
        let policy = Policy::load_str(yaml).unwrap();
        let mut deep_intent = intent("anything", "low", Vec::new());
        deep_intent.context.delegation_chain =
            vec!["a".to_owned(), "b".to_owned(), "c".to_owned(), "d".to_owned()];

        let verdict = evaluate(&deep_intent, &policy, &dev_ctx());
        assert_eq!(verdict.kind, VerdictKind::Block);
        assert_eq!(verdict.matched_rule, None);
        assert_eq!(verdict.reason_codes, vec!["delegation_depth_exceeded".to_owned()]);
    }

    #[test]
    fn target_class_set_is_containment_not_equality() {
        let yaml = r"
rules:
  - id: fs_only
    match:
      target_classes: [fs.write, fs.read]
    verdict: allow
    reason_code: fs_allow
default_verdict: block
";
        let policy = Policy::load_str(yaml).unwrap();
        let fs_intent = intent(
            "multi",
            "low",
            vec![Target {
                class: "fs.write".to_owned(),
                locator: "/tmp/a".to_owned(),
            }],
        );
        assert_eq!(evaluate(&fs_intent, &policy, &dev_ctx()).kind, VerdictKind::Allow);

        let mixed_intent = intent(
            "multi",
            "low",
            vec![
                Target {
                    class: "fs.write".to_owned(),
                    locator: "/tmp/a".to_owned(),
                },
                Target {
                    class: "net.http".to_owned(),
                    locator: "https://example.com".to_owned(),
                },
            ],
        );
        assert_eq!(evaluate(&mixed_intent, &policy, &dev_ctx()).kind, VerdictKind::Block);
    }

    #[test]
    fn equivalent_argument_order_yields_same_verdict_and_matched_rule() {
        let yaml = r"
rules:
  - id: write_rule
    match:
      tool_glob: write_file
    verdict: allow
    reason_code: ok
default_verdict: block
";
        let policy = Policy::load_str(yaml).unwrap();
        let mut args_one = BTreeMap::new();
        args_one.insert("b".to_owned(), serde_json::json!(2));
        args_one.insert("a".to_owned(), serde_json::json!(1));
        let mut args_two = BTreeMap::new();
        args_two.insert("a".to_owned(), serde_json::json!(1));
        args_two.insert("b".to_owned(), serde_json::json!(2));

        let mut first = intent("write_file", "low", Vec::new());
        first.args = args_one;
        let mut second = intent("write_file", "low", Vec::new());
        second.args = args_two;

        let verdict_one = evaluate(&first, &policy, &dev_ctx());
        let verdict_two = evaluate(&second, &policy, &dev_ctx());
        assert_eq!(verdict_one, verdict_two);
    }

    #[test]
    fn policy_digest_is_stable_for_equal_policies() {
        let yaml = "rules: []\ndefault_verdict: block\n";
        let policy_one = Policy::load_str(yaml).unwrap();
        let policy_two = Policy::load_str(yaml).unwrap();
        assert_eq!(policy_one.digest().unwrap(), policy_two.digest().unwrap());
    }
}
