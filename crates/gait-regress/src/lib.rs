// crates/gait-regress/src/lib.rs
// ============================================================================
// Module: Gait Regress
// Description: Fixture-based deterministic regression grading and replay.
// Purpose: Turn recorded incidents into repeatable, exit-code-stable
//          regression fixtures.
// Dependencies: gait-core, gait-pack, gait-policy
// ============================================================================

//! ## Overview
//! A fixture pins a `Runpack` (or `Jobpack`) plus a `gait.yaml`
//! declaring which graders apply and what they expect. [`init`] seals a
//! new fixture directory; [`load_fixture`] reads one back; [`grade`] runs
//! every declared grader as a pure function of the fixture's pinned pack
//! bytes and a candidate pack's bytes; [`run`] grades a batch and rolls
//! the result into a stable exit code. [`replay`] resolves a pack's
//! recorded tool calls in stub mode by default, or in real-tool mode once
//! [`RealToolInterlock::is_unlocked`] holds.

pub mod replay;

use std::path::Path;

use gait_pack::PackError;
use gait_policy::VerdictKind;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// `producer_version` stamped onto every [`RegressResult`].
const PRODUCER_VERSION: &str = env!("CARGO_PKG_VERSION");

const GAIT_YAML: &str = "gait.yaml";
const PACK_FILE: &str = "pack.bin";

// ============================================================================
// SECTION: Fixture Configuration
// ============================================================================

/// One grader declaration within a fixture's `gait.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum GraderSpec {
    /// The candidate pack must pass manifest and hash verification.
    SchemaConformance,
    /// The candidate's recorded verdict must equal `expected`.
    ExpectedVerdict {
        /// Expected verdict kind.
        expected: VerdictKind,
    },
    /// The candidate's recorded exit code must equal `expected`.
    ExpectedExitCode {
        /// Expected exit code.
        expected: u8,
    },
    /// The candidate pack must diff against the pinned pack within
    /// `tolerance` non-semantic changes.
    DeterministicDiff {
        /// Maximum number of tolerated `context_runtime_only` diff
        /// entries; any other diff class fails the grader.
        tolerance: usize,
    },
    /// The candidate's context envelope, if present, must validate and
    /// satisfy its declared evidence mode.
    ContextConformance,
}

/// A fixture's `gait.yaml`: which graders apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FixtureConfig {
    /// Human-readable fixture name.
    pub fixture_name: String,
    /// Graders to run against this fixture.
    pub graders: Vec<GraderSpec>,
}

/// A loaded regression fixture: its configuration plus the pinned pack
/// bytes graders are run against.
#[derive(Debug, Clone)]
pub struct Fixture {
    /// Fixture configuration.
    pub config: FixtureConfig,
    /// Pinned (golden) pack bytes.
    pub pinned_pack: Vec<u8>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised by fixture init, load, or grading.
#[derive(Debug, Error)]
pub enum RegressError {
    /// An I/O operation on the fixture directory failed.
    #[error("regress i/o error at {path}: {source}")]
    Io {
        /// Path the failing operation targeted.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// `gait.yaml` failed strict parsing.
    #[error("invalid fixture configuration: {0}")]
    InvalidConfig(String),
    /// Grading a pack failed.
    #[error(transparent)]
    Pack(#[from] PackError),
}

fn io_err(path: &Path, source: std::io::Error) -> RegressError {
    RegressError::Io { path: path.to_path_buf(), source }
}

// ============================================================================
// SECTION: Init / Load
// ============================================================================

/// Seals a new fixture named `run_id` under `fixtures_root`, writing its
/// pinned pack and `gait.yaml`.
///
/// # Errors
///
/// Returns a [`RegressError::Io`] if the fixture directory cannot be
/// created or written.
pub fn init(fixtures_root: &Path, run_id: &str, pinned_pack: &[u8], config: FixtureConfig) -> Result<Fixture, RegressError> {
    let dir = fixtures_root.join(run_id);
    std::fs::create_dir_all(&dir).map_err(|err| io_err(&dir, err))?;

    let pack_path = dir.join(PACK_FILE);
    std::fs::write(&pack_path, pinned_pack).map_err(|err| io_err(&pack_path, err))?;

    let config_path = dir.join(GAIT_YAML);
    let yaml = serde_yaml::to_string(&config).map_err(|err| RegressError::InvalidConfig(err.to_string()))?;
    std::fs::write(&config_path, yaml).map_err(|err| io_err(&config_path, err))?;

    Ok(Fixture { config, pinned_pack: pinned_pack.to_vec() })
}

/// Loads a previously sealed fixture from `fixtures_root/<name>/`.
///
/// # Errors
///
/// Returns [`RegressError::InvalidConfig`] if `gait.yaml` fails strict
/// parsing (unknown fields are rejected), or a [`RegressError::Io`] if
/// either file is missing.
pub fn load_fixture(fixtures_root: &Path, name: &str) -> Result<Fixture, RegressError> {
    let dir = fixtures_root.join(name);

    let config_path = dir.join(GAIT_YAML);
    let config_bytes = std::fs::read(&config_path).map_err(|err| io_err(&config_path, err))?;
    let config: FixtureConfig = serde_yaml::from_slice(&config_bytes).map_err(|err| RegressError::InvalidConfig(err.to_string()))?;

    let pack_path = dir.join(PACK_FILE);
    let pinned_pack = std::fs::read(&pack_path).map_err(|err| io_err(&pack_path, err))?;

    Ok(Fixture { config, pinned_pack })
}

// ============================================================================
// SECTION: Grading
// ============================================================================

/// The outcome of a single grader against a fixture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraderResult {
    /// The grader that ran.
    pub grader: GraderSpec,
    /// Whether the grader passed.
    pub passed: bool,
    /// Human-readable explanation, always present so a failing run is
    /// actionable without re-deriving the grader's logic.
    pub detail: String,
}

/// The outcome of every grader run against one fixture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureResult {
    /// Fixture name.
    pub fixture_name: String,
    /// Per-grader outcomes, in declaration order.
    pub graders: Vec<GraderResult>,
    /// Whether every declared grader passed.
    pub passed: bool,
}

/// Extracts `{"verdict": ..., "exit_code": ...}` from a pack's `run.json`
/// entry, if present.
fn read_run_record(pack_bytes: &[u8]) -> Option<(Option<VerdictKind>, Option<u8>)> {
    let (_manifest, reader) = gait_pack::open(pack_bytes).ok()?;
    let bytes = reader.read("run.json").ok()?;
    let value: serde_json::Value = serde_json::from_slice(bytes).ok()?;
    let verdict = value.get("verdict").and_then(|v| serde_json::from_value::<VerdictKind>(v.clone()).ok());
    let exit_code = value.get("exit_code").and_then(serde_json::Value::as_u64).and_then(|n| u8::try_from(n).ok());
    Some((verdict, exit_code))
}

/// Runs every grader `fixture` declares against `candidate_pack`, as a
/// pure function of both byte buffers.
#[must_use]
pub fn grade(fixture: &Fixture, candidate_pack: &[u8]) -> FixtureResult {
    let graders = fixture
        .config
        .graders
        .iter()
        .map(|spec| grade_one(spec, fixture, candidate_pack))
        .collect::<Vec<_>>();
    let passed = graders.iter().all(|result| result.passed);
    FixtureResult { fixture_name: fixture.config.fixture_name.clone(), graders, passed }
}

fn grade_one(spec: &GraderSpec, fixture: &Fixture, candidate_pack: &[u8]) -> GraderResult {
    match spec {
        GraderSpec::SchemaConformance => match gait_pack::verify(candidate_pack, gait_pack::VerifyOptions::default()) {
            Ok(report) => GraderResult { grader: spec.clone(), passed: true, detail: format!("{} files verified", report.checked_files) },
            Err(err) => GraderResult { grader: spec.clone(), passed: false, detail: err.to_string() },
        },
        GraderSpec::ExpectedVerdict { expected } => match read_run_record(candidate_pack) {
            Some((Some(actual), _)) if actual == *expected => GraderResult { grader: spec.clone(), passed: true, detail: "verdict matched".to_owned() },
            Some((Some(actual), _)) => GraderResult { grader: spec.clone(), passed: false, detail: format!("expected {expected:?}, got {actual:?}") },
            _ => GraderResult { grader: spec.clone(), passed: false, detail: "candidate pack has no recorded verdict".to_owned() },
        },
        GraderSpec::ExpectedExitCode { expected } => match read_run_record(candidate_pack) {
            Some((_, Some(actual))) if actual == *expected => GraderResult { grader: spec.clone(), passed: true, detail: "exit code matched".to_owned() },
            Some((_, Some(actual))) => GraderResult { grader: spec.clone(), passed: false, detail: format!("expected {expected}, got {actual}") },
            _ => GraderResult { grader: spec.clone(), passed: false, detail: "candidate pack has no recorded exit code".to_owned() },
        },
        GraderSpec::DeterministicDiff { tolerance } => match gait_pack::diff(&fixture.pinned_pack, candidate_pack) {
            Ok(entries) => {
                let disqualifying = entries.iter().filter(|entry| !matches!(entry.change_class, gait_pack::ChangeClass::ContextRuntimeOnly)).count();
                let runtime_only = entries.len() - disqualifying;
                if disqualifying == 0 && runtime_only <= *tolerance {
                    GraderResult { grader: spec.clone(), passed: true, detail: format!("{runtime_only} tolerated runtime-only diffs") }
                } else {
                    GraderResult {
                        grader: spec.clone(),
                        passed: false,
                        detail: format!("{disqualifying} disqualifying diffs, {runtime_only} runtime-only diffs against tolerance {tolerance}"),
                    }
                }
            }
            Err(err) => GraderResult { grader: spec.clone(), passed: false, detail: err.to_string() },
        },
        GraderSpec::ContextConformance => match gait_pack::open(candidate_pack) {
            Ok((_manifest, reader)) => match reader.read(gait_pack::CONTEXT_ENVELOPE_PATH) {
                Ok(bytes) => match serde_json::from_slice::<gait_context::ContextEnvelope>(bytes) {
                    Ok(envelope) => match envelope.verify_digest() {
                        Ok(()) => GraderResult { grader: spec.clone(), passed: true, detail: "context envelope digest verified".to_owned() },
                        Err(err) => GraderResult { grader: spec.clone(), passed: false, detail: err.to_string() },
                    },
                    Err(err) => GraderResult { grader: spec.clone(), passed: false, detail: format!("context envelope did not parse: {err}") },
                },
                Err(_) => GraderResult { grader: spec.clone(), passed: true, detail: "no context envelope present; nothing to conform".to_owned() },
            },
            Err(err) => GraderResult { grader: spec.clone(), passed: false, detail: err.to_string() },
        },
    }
}

// ============================================================================
// SECTION: Run
// ============================================================================

/// One fixture paired with the candidate pack it should be graded
/// against.
pub struct RunInput {
    /// The fixture to grade.
    pub fixture: Fixture,
    /// Candidate pack bytes produced for this run (by replay or by a
    /// fresh evaluation, at the caller's discretion).
    pub candidate_pack: Vec<u8>,
}

/// Stable, wire-carried regression result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressResult {
    /// Schema identifier for this artifact.
    pub schema_id: &'static str,
    /// Schema version for this artifact.
    pub schema_version: u32,
    /// Per-fixture results, in input order.
    pub fixtures: Vec<FixtureResult>,
    /// Whether every fixture passed every grader.
    pub all_passed: bool,
    /// The first failing grader's detail, surfaced for operator action.
    pub top_failure_reason: Option<String>,
    /// Version of the producer that graded this result.
    pub producer_version: &'static str,
}

impl RegressResult {
    /// Exit code per the regression contract: `0` all-pass, `5` any
    /// grader failed.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        if self.all_passed { 0 } else { 5 }
    }
}

/// Grades every `(fixture, candidate)` pair in `inputs` and rolls the
/// result into a stable [`RegressResult`].
#[must_use]
pub fn run(inputs: Vec<RunInput>) -> RegressResult {
    let fixtures: Vec<FixtureResult> = inputs.iter().map(|input| grade(&input.fixture, &input.candidate_pack)).collect();
    let all_passed = fixtures.iter().all(|result| result.passed);
    let top_failure_reason = fixtures
        .iter()
        .flat_map(|fixture| fixture.graders.iter())
        .find(|grader| !grader.passed)
        .map(|grader| grader.detail.clone());

    RegressResult { schema_id: "gait.regress_result", schema_version: 1, fixtures, all_passed, top_failure_reason, producer_version: PRODUCER_VERSION }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use gait_core::Timestamp;
    use tempfile::tempdir;

    use super::*;

    fn sample_pack(verdict: &str, exit_code: u8) -> Vec<u8> {
        let mut files = BTreeMap::new();
        files.insert("run.json".to_owned(), serde_json::json!({"verdict": verdict, "exit_code": exit_code}).to_string().into_bytes());
        gait_pack::build(
            gait_pack::BuildInput {
                pack_type: gait_pack::PackType::Run,
                files,
                job_id: None,
                prev_checkpoint_digest: None,
                generated_at: Timestamp::parse("2026-07-28T00:00:00Z").unwrap(),
            },
            None,
        )
        .unwrap()
    }

    #[test]
    fn init_then_load_round_trips_a_fixture() {
        let dir = tempdir().unwrap();
        let pinned = sample_pack("allow", 0);
        let config = FixtureConfig {
            fixture_name: "allow-case".to_owned(),
            graders: vec![GraderSpec::SchemaConformance, GraderSpec::ExpectedVerdict { expected: VerdictKind::Allow }],
        };
        init(dir.path(), "run-1", &pinned, config.clone()).unwrap();

        let loaded = load_fixture(dir.path(), "run-1").unwrap();
        assert_eq!(loaded.config, config);
        assert_eq!(loaded.pinned_pack, pinned);
    }

    #[test]
    fn grade_passes_when_candidate_matches_expectations() {
        let pinned = sample_pack("allow", 0);
        let fixture = Fixture {
            config: FixtureConfig {
                fixture_name: "allow-case".to_owned(),
                graders: vec![GraderSpec::SchemaConformance, GraderSpec::ExpectedVerdict { expected: VerdictKind::Allow }, GraderSpec::ExpectedExitCode { expected: 0 }],
            },
            pinned_pack: pinned.clone(),
        };
        let result = grade(&fixture, &pinned);
        assert!(result.passed);
    }

    #[test]
    fn grade_fails_on_mismatched_verdict() {
        let pinned = sample_pack("allow", 0);
        let candidate = sample_pack("block", 3);
        let fixture = Fixture {
            config: FixtureConfig { fixture_name: "allow-case".to_owned(), graders: vec![GraderSpec::ExpectedVerdict { expected: VerdictKind::Allow }] },
            pinned_pack: pinned,
        };
        let result = grade(&fixture, &candidate);
        assert!(!result.passed);
    }

    #[test]
    fn run_rolls_up_exit_code_five_on_any_failure() {
        let pinned = sample_pack("allow", 0);
        let candidate = sample_pack("block", 3);
        let fixture = Fixture {
            config: FixtureConfig { fixture_name: "allow-case".to_owned(), graders: vec![GraderSpec::ExpectedVerdict { expected: VerdictKind::Allow }] },
            pinned_pack: pinned,
        };
        let result = run(vec![RunInput { fixture, candidate_pack: candidate }]);
        assert_eq!(result.exit_code(), 5);
        assert!(result.top_failure_reason.is_some());
    }

    #[test]
    fn run_exit_code_is_zero_when_everything_passes() {
        let pinned = sample_pack("allow", 0);
        let fixture = Fixture {
            config: FixtureConfig { fixture_name: "allow-case".to_owned(), graders: vec![GraderSpec::ExpectedVerdict { expected: VerdictKind::Allow }] },
            pinned_pack: pinned.clone(),
        };
        let result = run(vec![RunInput { fixture, candidate_pack: pinned }]);
        assert_eq!(result.exit_code(), 0);
    }

    #[test]
    fn deterministic_diff_tolerates_runtime_only_context_drift_within_budget() {
        let record = |content: &[u8]| gait_context::ContextRecord {
            source_type: "retrieval".to_owned(),
            source_locator: "doc-a".to_owned(),
            query_digest: gait_core::hash_bytes(gait_core::HashAlgorithm::Sha256, b"q"),
            content_digest: gait_core::hash_bytes(gait_core::HashAlgorithm::Sha256, content),
            retrieved_at: Timestamp::parse("2026-07-28T00:00:00Z").unwrap(),
            redaction_mode: "none".to_owned(),
            immutability: "immutable".to_owned(),
            freshness_sla_seconds: None,
        };
        let pinned_envelope = gait_context::ContextEnvelope::build("set-1", gait_context::EvidenceMode::Required, vec![record(b"same")]).unwrap();
        let mut drifted_envelope = pinned_envelope.clone();
        drifted_envelope.records[0].retrieved_at = Timestamp::parse("2026-07-29T00:00:00Z").unwrap();
        drifted_envelope.context_set_digest = drifted_envelope.recompute_digest().unwrap();

        let mut pinned_files = BTreeMap::new();
        pinned_files.insert(gait_pack::CONTEXT_ENVELOPE_PATH.to_owned(), serde_json::to_vec(&pinned_envelope).unwrap());
        let pinned = gait_pack::build(
            gait_pack::BuildInput { pack_type: gait_pack::PackType::Run, files: pinned_files, job_id: None, prev_checkpoint_digest: None, generated_at: Timestamp::parse("2026-07-28T00:00:00Z").unwrap() },
            None,
        )
        .unwrap();

        let mut candidate_files = BTreeMap::new();
        candidate_files.insert(gait_pack::CONTEXT_ENVELOPE_PATH.to_owned(), serde_json::to_vec(&drifted_envelope).unwrap());
        let candidate = gait_pack::build(
            gait_pack::BuildInput { pack_type: gait_pack::PackType::Run, files: candidate_files, job_id: None, prev_checkpoint_digest: None, generated_at: Timestamp::parse("2026-07-28T00:00:00Z").unwrap() },
            None,
        )
        .unwrap();

        let fixture = Fixture {
            config: FixtureConfig { fixture_name: "ctx".to_owned(), graders: vec![GraderSpec::DeterministicDiff { tolerance: 1 }] },
            pinned_pack: pinned,
        };
        let result = grade(&fixture, &candidate);
        assert!(result.passed);
    }
}
