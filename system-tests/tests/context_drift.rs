// system-tests/tests/context_drift.rs
// ============================================================================
// Module: Context Drift System Test
// Description: Diffing two runpacks whose context_envelope.json differs
//              only in retrieval timing classifies as runtime-only drift;
//              diffing two whose evidence content actually changed
//              classifies as semantic drift.
// Dependencies: gait, gait-core, gait-context, gait-pack
// ============================================================================

#![cfg(feature = "system-tests")]

use std::collections::BTreeMap;

use gait::CoreContext;
use gait_context::ContextEnvelope;
use gait_context::ContextRecord;
use gait_context::EvidenceMode;
use gait_core::CoreConfig;
use gait_core::HashAlgorithm;
use gait_core::Profile;
use gait_core::Timestamp;
use gait_core::hash_bytes;
use gait_pack::BuildInput;
use gait_pack::ChangeClass;
use gait_pack::PackType;

fn ctx(dir: &std::path::Path) -> CoreContext {
    let config = CoreConfig { profile: Profile::Dev, signing_key_path: None, state_dir: dir.to_path_buf() };
    CoreContext::new(config).unwrap()
}

fn record(content: &[u8], retrieved_at: Timestamp) -> ContextRecord {
    ContextRecord {
        source_type: "retrieval".to_owned(),
        source_locator: "docs/readme.md".to_owned(),
        query_digest: hash_bytes(HashAlgorithm::Sha256, b"how do I configure the gate"),
        content_digest: hash_bytes(HashAlgorithm::Sha256, content),
        retrieved_at,
        redaction_mode: "none".to_owned(),
        immutability: "mutable".to_owned(),
        freshness_sla_seconds: Some(3600),
    }
}

fn pack_with_envelope(envelope: &ContextEnvelope, generated_at: Timestamp) -> Vec<u8> {
    let mut files = BTreeMap::new();
    files.insert("run.json".to_owned(), br#"{"run_id":"drift-run"}"#.to_vec());
    files.insert("context_envelope.json".to_owned(), serde_json::to_vec(envelope).unwrap());
    let input = BuildInput { pack_type: PackType::Run, files, job_id: None, prev_checkpoint_digest: None, generated_at };
    gait_pack::build(input, None).unwrap()
}

#[test]
fn re_fetching_the_same_evidence_at_a_later_time_is_runtime_only_drift() {
    let dir = tempfile::tempdir().unwrap();
    let context = ctx(dir.path());
    let generated_at = Timestamp::now();

    let morning = Timestamp::parse("2026-07-28T09:00:00Z").unwrap();
    let afternoon = Timestamp::parse("2026-07-28T15:00:00Z").unwrap();

    let left_envelope = ContextEnvelope::build("ctx-1", EvidenceMode::BestEffort, vec![record(b"install with cargo", morning)]).unwrap();
    let right_envelope = ContextEnvelope::build("ctx-1", EvidenceMode::BestEffort, vec![record(b"install with cargo", afternoon)]).unwrap();

    let left_pack = pack_with_envelope(&left_envelope, generated_at);
    let right_pack = pack_with_envelope(&right_envelope, generated_at);

    let diff = context.diff_packs(&left_pack, &right_pack).unwrap();
    assert_eq!(diff.len(), 1);
    assert_eq!(diff[0].field_path, "context_envelope.json");
    assert_eq!(diff[0].change_class, ChangeClass::ContextRuntimeOnly);
}

#[test]
fn a_changed_reference_document_is_semantic_drift() {
    let dir = tempfile::tempdir().unwrap();
    let context = ctx(dir.path());
    let generated_at = Timestamp::now();
    let retrieved_at = Timestamp::parse("2026-07-28T09:00:00Z").unwrap();

    let left_envelope = ContextEnvelope::build("ctx-1", EvidenceMode::BestEffort, vec![record(b"install with cargo", retrieved_at)]).unwrap();
    let right_envelope = ContextEnvelope::build("ctx-1", EvidenceMode::BestEffort, vec![record(b"install with npm", retrieved_at)]).unwrap();

    let left_pack = pack_with_envelope(&left_envelope, generated_at);
    let right_pack = pack_with_envelope(&right_envelope, generated_at);

    let diff = context.diff_packs(&left_pack, &right_pack).unwrap();
    assert_eq!(diff.len(), 1);
    assert_eq!(diff[0].change_class, ChangeClass::ContextSemantic);
}

#[test]
fn identical_context_envelopes_produce_no_diff_entries() {
    let dir = tempfile::tempdir().unwrap();
    let context = ctx(dir.path());
    let generated_at = Timestamp::now();
    let retrieved_at = Timestamp::parse("2026-07-28T09:00:00Z").unwrap();

    let envelope = ContextEnvelope::build("ctx-1", EvidenceMode::Required, vec![record(b"install with cargo", retrieved_at)]).unwrap();
    let pack_bytes = pack_with_envelope(&envelope, generated_at);

    let diff = context.diff_packs(&pack_bytes, &pack_bytes).unwrap();
    assert!(diff.is_empty());
}
