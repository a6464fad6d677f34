// demos/minimal/src/main.rs
// ============================================================================
// Module: Gait Minimal Demo
// Description: Build a runpack, verify it, and diff it against itself.
// Purpose: Demonstrate spec.md §8's "demo -> verify -> diff" scenario:
//          building a pack, confirming it verifies clean, and confirming
//          a pack diffed against itself reports no changes.
// Dependencies: gait, gait-core, gait-pack
// ============================================================================

//! ## Overview
//! Builds a minimal runpack from two in-memory payload files, verifies
//! it without a trusted signing key, and diffs it against itself. Every
//! step's result is printed; nothing here depends on the filesystem
//! beyond a throwaway state directory for the owning [`gait::CoreContext`].

use std::collections::BTreeMap;
use std::io::Write;

use gait::CoreContext;
use gait_core::CoreConfig;
use gait_core::Profile;
use gait_core::Timestamp;
use gait_pack::BuildInput;
use gait_pack::PackType;
use gait_pack::VerifyOptions;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let state_dir = tempfile::tempdir()?;
    let config = CoreConfig {
        profile: Profile::Dev,
        signing_key_path: None,
        state_dir: state_dir.path().to_path_buf(),
    };
    let ctx = CoreContext::new(config)?;

    let mut files = BTreeMap::new();
    files.insert("run.json".to_owned(), br#"{"run_id":"demo-run-1","producer_version":"gait/0.1.0"}"#.to_vec());
    files.insert("intents.jsonl".to_owned(), br#"{"tool":"fs.read","args":{}}"#.to_vec());
    files.insert("results.jsonl".to_owned(), br#"{"verdict":"allow"}"#.to_vec());

    let input = BuildInput {
        pack_type: PackType::Run,
        files,
        job_id: None,
        prev_checkpoint_digest: None,
        generated_at: Timestamp::now(),
    };
    let pack_bytes = ctx.build_pack(input)?;
    write_line("Built pack bytes", &pack_bytes.len().to_string())?;

    let report = ctx.verify(&pack_bytes, VerifyOptions::default())?;
    write_line("Verify ok, checked files", &report.checked_files.to_string())?;

    let diff = ctx.diff_packs(&pack_bytes, &pack_bytes)?;
    write_line("Diff against itself, entries", &diff.len().to_string())?;

    Ok(())
}

/// Writes a labeled line to stdout.
fn write_line(label: &str, value: &str) -> Result<(), std::io::Error> {
    let mut out = std::io::stdout();
    writeln!(out, "{label}: {value}")?;
    Ok(())
}
