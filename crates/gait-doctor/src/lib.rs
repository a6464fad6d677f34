// crates/gait-doctor/src/lib.rs
// ============================================================================
// Module: Gait Doctor
// Description: Runtime readiness checks for a configured Gait deployment.
// Purpose: Give operators one `doctor.check(profile)` call that validates
//          profile settings, signing key availability, state-directory
//          reachability, and the pack build/verify machinery end to end.
// Dependencies: gait-core, gait-journal, gait-pack
// ============================================================================

//! ## Overview
//! `gait-doctor` runs a fixed, closed set of readiness checks against a
//! loaded [`gait_core::CoreConfig`] and reports a structured
//! [`ReadinessReport`]. Every check runs independently and records its
//! own pass/fail detail rather than short-circuiting on the first
//! failure, so an operator sees the full picture in one call.

use std::path::Path;

use gait_core::CoreConfig;
use gait_core::HashAlgorithm;
use gait_core::ProdSigner;
use gait_core::Profile;
use gait_core::SessionId;
use gait_core::Timestamp;
use gait_journal::JournalOpenOptions;
use gait_journal::SessionJournal;
use serde::Deserialize;
use serde::Serialize;

/// Stable name of one readiness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckName {
    /// The loaded configuration validates against its declared profile.
    ProfileValid,
    /// A signing key is loadable under the configured profile.
    SigningKeyLoadable,
    /// The configured state directory exists and is writable.
    StateDirWritable,
    /// A trivial pack builds, verifies, and diffs clean end to end.
    PackSelfTest,
}

/// The outcome of one readiness check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessCheck {
    /// Which check this is.
    pub name: CheckName,
    /// Whether the check passed.
    pub passed: bool,
    /// Human-readable detail, always present so a failing check is
    /// actionable without re-deriving the check's logic.
    pub detail: String,
}

/// The outcome of every readiness check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessReport {
    /// Profile the checks ran under.
    pub profile: Profile,
    /// Per-check outcomes, in a fixed, documented order.
    pub checks: Vec<ReadinessCheck>,
    /// Whether every check passed.
    pub ready: bool,
}

/// Runs every readiness check against `config`.
#[must_use]
pub fn check(config: &CoreConfig) -> ReadinessReport {
    let checks = vec![
        check_profile_valid(config),
        check_signing_key_loadable(config),
        check_state_dir_writable(&config.state_dir),
        check_pack_self_test(),
    ];
    let ready = checks.iter().all(|check| check.passed);
    ReadinessReport { profile: config.profile, checks, ready }
}

fn check_profile_valid(config: &CoreConfig) -> ReadinessCheck {
    match config.validate() {
        Ok(()) => ReadinessCheck { name: CheckName::ProfileValid, passed: true, detail: "profile settings are internally consistent".to_owned() },
        Err(err) => ReadinessCheck { name: CheckName::ProfileValid, passed: false, detail: err.to_string() },
    }
}

fn check_signing_key_loadable(config: &CoreConfig) -> ReadinessCheck {
    if config.profile == Profile::Dev {
        return ReadinessCheck {
            name: CheckName::SigningKeyLoadable,
            passed: true,
            detail: "dev profile signs with an ephemeral key; no configured key required".to_owned(),
        };
    }
    let loaded = match &config.signing_key_path {
        Some(path) => ProdSigner::load(path),
        None => ProdSigner::from_env(),
    };
    match loaded {
        Ok(_signer) => ReadinessCheck { name: CheckName::SigningKeyLoadable, passed: true, detail: "production signing key loaded".to_owned() },
        Err(err) => ReadinessCheck { name: CheckName::SigningKeyLoadable, passed: false, detail: err.to_string() },
    }
}

fn check_state_dir_writable(state_dir: &Path) -> ReadinessCheck {
    let probe_dir = state_dir.join("sessions").join(".gait-doctor-probe");
    let result: Result<u64, String> = (|| {
        let mut journal = SessionJournal::open(&probe_dir, SessionId::new("gait-doctor-probe"), JournalOpenOptions::default())
            .map_err(|err| err.to_string())?;
        let seq = journal.append(serde_json::json!({"probe": "gait-doctor"})).map_err(|err| err.to_string())?;
        Ok(seq)
    })();
    let _ = std::fs::remove_dir_all(&probe_dir);
    match result {
        Ok(seq) => ReadinessCheck {
            name: CheckName::StateDirWritable,
            passed: true,
            detail: format!("{} accepts journal writes (probe seq {seq})", state_dir.display()),
        },
        Err(detail) => ReadinessCheck { name: CheckName::StateDirWritable, passed: false, detail: format!("{} is not usable as a store: {detail}", state_dir.display()) },
    }
}

fn check_pack_self_test() -> ReadinessCheck {
    let Ok(generated_at) = Timestamp::parse("1970-01-01T00:00:00Z") else {
        return ReadinessCheck { name: CheckName::PackSelfTest, passed: false, detail: "doctor self-test timestamp failed to parse".to_owned() };
    };
    let build_input = gait_pack::BuildInput {
        pack_type: gait_pack::PackType::Run,
        files: std::collections::BTreeMap::new(),
        job_id: None,
        prev_checkpoint_digest: None,
        generated_at,
    };
    let built = match gait_pack::build(build_input, None) {
        Ok(bytes) => bytes,
        Err(err) => return ReadinessCheck { name: CheckName::PackSelfTest, passed: false, detail: format!("self-test pack build failed: {err}") },
    };
    match gait_pack::verify(&built, gait_pack::VerifyOptions::default()) {
        Ok(report) => ReadinessCheck {
            name: CheckName::PackSelfTest,
            passed: true,
            detail: format!("build/verify round-trip succeeded ({} files checked)", report.checked_files),
        },
        Err(err) => ReadinessCheck { name: CheckName::PackSelfTest, passed: false, detail: format!("self-test pack verify failed: {err}") },
    }
}

/// Returns `true` when `algorithm` is supported by the pack self-test's
/// digest path. Exists so callers can assert doctor's self-test exercises
/// the same default algorithm the rest of the workspace hashes with.
#[must_use]
pub const fn self_test_hash_algorithm() -> HashAlgorithm {
    gait_core::DEFAULT_HASH_ALGORITHM
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn dev_profile_with_writable_state_dir_is_ready() {
        let dir = tempdir().unwrap();
        let config = CoreConfig { profile: Profile::Dev, signing_key_path: None, state_dir: dir.path().to_path_buf() };
        let report = check(&config);
        assert!(report.ready, "{report:?}");
    }

    #[test]
    fn oss_prod_without_signing_key_is_not_ready() {
        let dir = tempdir().unwrap();
        let config = CoreConfig { profile: Profile::OssProd, signing_key_path: None, state_dir: dir.path().to_path_buf() };
        let report = check(&config);
        assert!(!report.ready);
        let signing_check = report.checks.iter().find(|check| check.name == CheckName::SigningKeyLoadable).unwrap();
        assert!(!signing_check.passed);
    }

    #[test]
    fn unwritable_state_dir_is_reported() {
        let dir = tempdir().unwrap();
        let unwritable = dir.path().join("nested").join("deep");
        // The parent does not exist and is itself a file, so create_dir_all fails.
        std::fs::write(dir.path().join("nested"), b"not a directory").unwrap();
        let config = CoreConfig { profile: Profile::Dev, signing_key_path: None, state_dir: unwritable };
        let report = check(&config);
        assert!(!report.ready);
    }

    #[test]
    fn pack_self_test_passes_independent_of_profile() {
        let check_result = check_pack_self_test();
        assert!(check_result.passed, "{check_result:?}");
    }
}
