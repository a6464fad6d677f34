// crates/gait-pack/src/lib.rs
// ============================================================================
// Module: Gait Pack
// Description: Runpack/Jobpack assembly, offline verification, and diff.
// Purpose: Bundle run or job evidence into a deterministic, signed archive
//          and give offline consumers a way to verify and compare them.
// Dependencies: gait-archive, gait-context, gait-core, gait-schema
// ============================================================================

//! ## Overview
//! A pack is a [`gait_archive`] container holding a reserved
//! `manifest.json` entry plus whatever payload files its `pack_type`
//! declares (`run.json`, `intents.jsonl`, `results.jsonl`, `refs.json`,
//! an optional `context_envelope.json`, or, for job packs, an event
//! log prefix and checkpoint metadata). [`build`] computes a hash per
//! file, signs the manifest over everything but its own signature
//! field, and archives deterministically. [`verify`] recomputes every
//! declared hash, rejects any archive entry the manifest doesn't
//! declare, and checks the signature when asked. [`diff`] compares two
//! packs' manifests file-by-file, refining a changed
//! `context_envelope.json` into [`gait_context::classify_drift`]'s
//! runtime/semantic distinction instead of reporting a single opaque
//! "changed".

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use gait_archive::ArchiveError;
use gait_archive::ArchiveReader;
use gait_archive::ArchiveWriter;
use gait_context::ContextEnvelope;
use gait_core::HashAlgorithm;
use gait_core::HashDigest;
use gait_core::Signer;
use gait_core::SignerError;
use gait_core::Timestamp;
use gait_core::hash_bytes;
use gait_core::hash_canonical_json;
use gait_core::ids::JobId;
use gait_core::signer::verify_with_key;
use gait_schema::SchemaError;
use gait_schema::SchemaId;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// Reserved entry name the manifest is always written under.
pub const MANIFEST_PATH: &str = "manifest.json";
/// Reserved entry name for a context envelope payload, when present.
pub const CONTEXT_ENVELOPE_PATH: &str = "context_envelope.json";
/// Manifest schema version this crate produces and reads.
pub const MANIFEST_VERSION: u32 = 1;

// ============================================================================
// SECTION: Manifest
// ============================================================================

/// Which kind of evidence a pack carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackType {
    /// Tool-call evidence captured during a recorded run.
    Run,
    /// Durable job evidence: event log prefix plus checkpoint metadata.
    Job,
}

impl PackType {
    fn schema_id(self) -> SchemaId {
        match self {
            PackType::Run => SchemaId::RunpackManifest,
            PackType::Job => SchemaId::JobpackManifest,
        }
    }
}

/// One declared file's content hash within a pack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHashEntry {
    /// Pack-relative path.
    pub path: String,
    /// Content hash of that file's bytes.
    #[serde(flatten)]
    pub hash: HashDigest,
}

/// A pack's manifest: every declared file's hash, plus identity and an
/// optional signature over everything else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Manifest schema version.
    pub manifest_version: u32,
    /// Which kind of pack this is.
    pub pack_type: PackType,
    /// When this manifest was produced.
    pub generated_at: Timestamp,
    /// Job this pack documents, required for `pack_type = job`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    /// Declared file hashes, sorted by path.
    pub file_hashes: Vec<FileHashEntry>,
    /// Digest of the checkpoint this pack extends, if it is a
    /// checkpoint materialization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_checkpoint_digest: Option<HashDigest>,
    /// Signature over this manifest's canonical encoding, excluding
    /// this field. `None` for unsigned packs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<gait_core::SignatureEnvelope>,
}

/// The portion of a [`Manifest`] that is signed; `signature` itself is
/// never part of its own input.
#[derive(Serialize)]
struct ManifestSignInput<'a> {
    manifest_version: u32,
    pack_type: PackType,
    generated_at: Timestamp,
    job_id: &'a Option<JobId>,
    file_hashes: &'a [FileHashEntry],
    prev_checkpoint_digest: &'a Option<HashDigest>,
}

impl Manifest {
    fn sign_digest(&self) -> Result<HashDigest, PackError> {
        let input = ManifestSignInput {
            manifest_version: self.manifest_version,
            pack_type: self.pack_type,
            generated_at: self.generated_at,
            job_id: &self.job_id,
            file_hashes: &self.file_hashes,
            prev_checkpoint_digest: &self.prev_checkpoint_digest,
        };
        hash_canonical_json(HashAlgorithm::Sha256, &input).map_err(|err| PackError::Canonicalization(err.to_string()))
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Stable failure codes for pack assembly and verification.
#[derive(Debug, Error)]
pub enum PackError {
    /// The underlying archive container was malformed.
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    /// The manifest failed schema validation.
    #[error(transparent)]
    Schema(#[from] SchemaError),
    /// A declared file's recomputed hash did not match the manifest.
    #[error("hash mismatch for pack entry {0}")]
    HashMismatch(String),
    /// An archive entry was present but not declared in the manifest.
    #[error("undeclared pack entry {0}")]
    UndeclaredFile(String),
    /// The manifest requires a signature this verifier could not check.
    #[error("pack signature is missing")]
    SignatureMissing,
    /// The manifest's signature did not verify.
    #[error("pack signature invalid: {0}")]
    SignatureInvalid(#[source] SignerError),
    /// Canonical encoding of the manifest failed.
    #[error("failed to canonicalize manifest: {0}")]
    Canonicalization(String),
    /// `manifest.json` was missing from the archive.
    #[error("archive is missing manifest.json")]
    MissingManifest,
    /// `manifest.json` did not parse as a [`Manifest`].
    #[error("manifest.json is not a valid manifest: {0}")]
    InvalidManifest(String),
    /// A job pack's manifest is missing its required `job_id`.
    #[error("job pack manifest is missing job_id")]
    MissingJobId,
}

// ============================================================================
// SECTION: Build
// ============================================================================

/// Everything needed to assemble one pack.
#[derive(Debug, Clone)]
pub struct BuildInput {
    /// Which kind of pack to build.
    pub pack_type: PackType,
    /// Pack-relative path to raw bytes for every payload file.
    pub files: BTreeMap<String, Vec<u8>>,
    /// Job this pack documents; required when `pack_type = Job`.
    pub job_id: Option<JobId>,
    /// Checkpoint digest this pack extends, if any.
    pub prev_checkpoint_digest: Option<HashDigest>,
    /// Wall-clock generation time.
    pub generated_at: Timestamp,
}

/// Assembles a pack from `input`, optionally signing its manifest with
/// `signer`.
///
/// # Errors
///
/// Returns [`PackError::MissingJobId`] if `input.pack_type` is
/// [`PackType::Job`] with no `job_id`, or an archive/canonicalization/
/// signing error otherwise.
pub fn build(input: BuildInput, signer: Option<&dyn Signer>) -> Result<Vec<u8>, PackError> {
    if input.pack_type == PackType::Job && input.job_id.is_none() {
        return Err(PackError::MissingJobId);
    }

    let file_hashes: Vec<FileHashEntry> = input
        .files
        .iter()
        .map(|(path, bytes)| FileHashEntry {
            path: path.clone(),
            hash: hash_bytes(HashAlgorithm::Sha256, bytes),
        })
        .collect();

    let mut manifest = Manifest {
        manifest_version: MANIFEST_VERSION,
        pack_type: input.pack_type,
        generated_at: input.generated_at,
        job_id: input.job_id,
        file_hashes,
        prev_checkpoint_digest: input.prev_checkpoint_digest,
        signature: None,
    };

    if let Some(signer) = signer {
        let digest = manifest.sign_digest()?;
        manifest.signature = Some(signer.sign(&digest).map_err(PackError::SignatureInvalid)?);
    }

    let manifest_bytes = serde_json::to_vec_pretty(&manifest).map_err(|err| PackError::Canonicalization(err.to_string()))?;

    let mut writer = ArchiveWriter::new();
    writer.write_entry(MANIFEST_PATH, &manifest_bytes)?;
    for (path, bytes) in &input.files {
        writer.write_entry(path, bytes)?;
    }
    Ok(writer.finish()?)
}

// ============================================================================
// SECTION: Open / Verify
// ============================================================================

/// How strictly [`verify`] should check a pack's signature.
#[derive(Debug, Clone, Copy, Default)]
pub struct VerifyOptions<'a> {
    /// When `Some`, the manifest's signature must be present and
    /// verify against this key.
    pub trusted_key: Option<&'a ed25519_dalek::VerifyingKey>,
}

/// The outcome of a successful [`verify`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyReport {
    /// The pack's parsed manifest.
    pub manifest: Manifest,
    /// Number of declared files whose hashes were recomputed and
    /// matched.
    pub checked_files: usize,
}

/// Parses `bytes` as a pack, returning its manifest and an
/// [`ArchiveReader`] over its payload.
///
/// # Errors
///
/// Returns [`PackError::MissingManifest`] if no `manifest.json` entry
/// is present, [`PackError::InvalidManifest`] if it does not parse, or
/// an archive error if the container itself is malformed.
pub fn open(bytes: &[u8]) -> Result<(Manifest, ArchiveReader), PackError> {
    let reader = ArchiveReader::open(bytes)?;
    let manifest_bytes = reader.read(MANIFEST_PATH).map_err(|_| PackError::MissingManifest)?;
    let manifest: Manifest = serde_json::from_slice(manifest_bytes).map_err(|err| PackError::InvalidManifest(err.to_string()))?;
    Ok((manifest, reader))
}

/// Verifies a pack: its manifest against its schema, every declared
/// file's hash against its actual bytes, that no undeclared archive
/// entry exists, and — when `options.trusted_key` is set — that the
/// manifest's signature verifies against it.
///
/// # Errors
///
/// Returns [`PackError::HashMismatch`] on a single-entry integrity
/// failure, [`PackError::UndeclaredFile`] if the archive carries an
/// entry the manifest does not declare, [`PackError::SignatureMissing`]
/// or [`PackError::SignatureInvalid`] under a required signature
/// check, or [`PackError::Schema`] if the manifest fails schema
/// validation.
pub fn verify(bytes: &[u8], options: VerifyOptions<'_>) -> Result<VerifyReport, PackError> {
    let (manifest, reader) = open(bytes)?;

    let manifest_json = serde_json::to_value(&manifest).map_err(|err| PackError::InvalidManifest(err.to_string()))?;
    gait_schema::validate(manifest.pack_type.schema_id(), &manifest_json)?;

    let mut declared: BTreeSet<&str> = BTreeSet::new();
    let mut checked_files = 0_usize;
    for entry in &manifest.file_hashes {
        declared.insert(entry.path.as_str());
        let bytes = reader.read(&entry.path)?;
        let actual = hash_bytes(entry.hash.algorithm, bytes);
        if actual != entry.hash {
            return Err(PackError::HashMismatch(entry.path.clone()));
        }
        checked_files += 1;
    }

    for path in reader.entries() {
        if path != MANIFEST_PATH && !declared.contains(path.as_str()) {
            return Err(PackError::UndeclaredFile(path.clone()));
        }
    }

    if let Some(trusted_key) = options.trusted_key {
        let envelope = manifest.signature.as_ref().ok_or(PackError::SignatureMissing)?;
        let digest = manifest.sign_digest()?;
        verify_with_key(trusted_key, &digest, envelope).map_err(PackError::SignatureInvalid)?;
    }

    Ok(VerifyReport { manifest, checked_files })
}

// ============================================================================
// SECTION: Diff
// ============================================================================

/// How one pack entry changed between a left (baseline) and right
/// (candidate) pack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeClass {
    /// Present on the right side only.
    Added,
    /// Present on the left side only.
    Removed,
    /// Present on both sides with a different content hash, and not
    /// further refined into a context-drift classification.
    Changed,
    /// A changed `context_envelope.json` whose records differ only in
    /// non-semantic fields.
    ContextRuntimeOnly,
    /// A changed `context_envelope.json` whose records differ in
    /// content digest, redaction mode, or immutability.
    ContextSemantic,
}

/// One entry in a [`diff`] result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffEntry {
    /// Dotted, pack-relative field path the change occurred at.
    pub field_path: String,
    /// Left-side hex digest, if present on the left.
    pub left: Option<String>,
    /// Right-side hex digest, if present on the right.
    pub right: Option<String>,
    /// How this entry changed.
    pub change_class: ChangeClass,
}

/// Compares two packs, returning a deterministic, `field_path`-sorted
/// list of differences. Files with identical declared hashes on both
/// sides produce no entry.
///
/// # Errors
///
/// Returns a [`PackError`] if either pack fails to open.
pub fn diff(left_bytes: &[u8], right_bytes: &[u8]) -> Result<Vec<DiffEntry>, PackError> {
    let (left_manifest, left_reader) = open(left_bytes)?;
    let (right_manifest, right_reader) = open(right_bytes)?;

    let left_index: BTreeMap<&str, &FileHashEntry> = left_manifest.file_hashes.iter().map(|e| (e.path.as_str(), e)).collect();
    let right_index: BTreeMap<&str, &FileHashEntry> = right_manifest.file_hashes.iter().map(|e| (e.path.as_str(), e)).collect();

    let mut paths: BTreeSet<&str> = BTreeSet::new();
    paths.extend(left_index.keys().copied());
    paths.extend(right_index.keys().copied());

    let mut entries = Vec::new();
    for path in paths {
        let left_entry = left_index.get(path);
        let right_entry = right_index.get(path);
        match (left_entry, right_entry) {
            (None, Some(right)) => entries.push(DiffEntry {
                field_path: path.to_owned(),
                left: None,
                right: Some(right.hash.value.clone()),
                change_class: ChangeClass::Added,
            }),
            (Some(left), None) => entries.push(DiffEntry {
                field_path: path.to_owned(),
                left: Some(left.hash.value.clone()),
                right: None,
                change_class: ChangeClass::Removed,
            }),
            (Some(left), Some(right)) if left.hash != right.hash => {
                if path == CONTEXT_ENVELOPE_PATH {
                    entries.extend(diff_context_envelope(&left_reader, &right_reader, left, right)?);
                } else {
                    entries.push(DiffEntry {
                        field_path: path.to_owned(),
                        left: Some(left.hash.value.clone()),
                        right: Some(right.hash.value.clone()),
                        change_class: ChangeClass::Changed,
                    });
                }
            }
            _ => {}
        }
    }
    Ok(entries)
}

/// Refines a changed `context_envelope.json` entry into a single
/// classification: `context_semantic` if any record's content
/// meaningfully changed, `context_runtime_only` otherwise.
fn diff_context_envelope(
    left_reader: &ArchiveReader,
    right_reader: &ArchiveReader,
    left: &FileHashEntry,
    right: &FileHashEntry,
) -> Result<Vec<DiffEntry>, PackError> {
    let left_bytes = left_reader.read(CONTEXT_ENVELOPE_PATH)?;
    let right_bytes = right_reader.read(CONTEXT_ENVELOPE_PATH)?;
    let left_envelope: Option<ContextEnvelope> = serde_json::from_slice(left_bytes).ok();
    let right_envelope: Option<ContextEnvelope> = serde_json::from_slice(right_bytes).ok();

    let change_class = match (left_envelope, right_envelope) {
        (Some(left_env), Some(right_env)) => {
            let mut left_by_key: BTreeMap<(&str, &str), &gait_context::ContextRecord> = BTreeMap::new();
            for record in &left_env.records {
                left_by_key.insert((record.source_type.as_str(), record.source_locator.as_str()), record);
            }
            let mut right_by_key: BTreeMap<(&str, &str), &gait_context::ContextRecord> = BTreeMap::new();
            for record in &right_env.records {
                right_by_key.insert((record.source_type.as_str(), record.source_locator.as_str()), record);
            }
            let mut keys: BTreeSet<(&str, &str)> = BTreeSet::new();
            keys.extend(left_by_key.keys().copied());
            keys.extend(right_by_key.keys().copied());

            let mut semantic = false;
            for key in keys {
                let drift = gait_context::classify_drift(left_by_key.get(&key).copied(), right_by_key.get(&key).copied());
                if matches!(drift, gait_context::DriftClass::ContextSemantic) {
                    semantic = true;
                    break;
                }
            }
            if semantic {
                ChangeClass::ContextSemantic
            } else {
                ChangeClass::ContextRuntimeOnly
            }
        }
        _ => ChangeClass::Changed,
    };

    Ok(vec![DiffEntry {
        field_path: CONTEXT_ENVELOPE_PATH.to_owned(),
        left: Some(left.hash.value.clone()),
        right: Some(right.hash.value.clone()),
        change_class,
    }])
}

#[cfg(test)]
mod tests {
    use gait_context::EvidenceMode;
    use gait_core::signer::DevSigner;

    use super::*;

    fn build_input(files: BTreeMap<String, Vec<u8>>) -> BuildInput {
        BuildInput {
            pack_type: PackType::Run,
            files,
            job_id: None,
            prev_checkpoint_digest: None,
            generated_at: Timestamp::parse("2026-07-28T00:00:00Z").unwrap(),
        }
    }

    #[test]
    fn build_then_verify_round_trips() {
        let mut files = BTreeMap::new();
        files.insert("run.json".to_owned(), br#"{"id":"run-1"}"#.to_vec());
        let signer = DevSigner::generate();
        let bytes = build(build_input(files), Some(&signer)).unwrap();

        let report = verify(&bytes, VerifyOptions::default()).unwrap();
        assert_eq!(report.checked_files, 1);
        assert_eq!(report.manifest.pack_type, PackType::Run);
    }

    #[test]
    fn build_is_byte_identical_for_identical_inputs() {
        let mut files = BTreeMap::new();
        files.insert("b.json".to_owned(), b"2".to_vec());
        files.insert("a.json".to_owned(), b"1".to_vec());

        let generated_at = Timestamp::parse("2026-07-28T00:00:00Z").unwrap();
        let mut input_one = build_input(files.clone());
        input_one.generated_at = generated_at;
        let mut input_two = build_input(files);
        input_two.generated_at = generated_at;

        let bytes_one = build(input_one, None).unwrap();
        let bytes_two = build(input_two, None).unwrap();
        assert_eq!(bytes_one, bytes_two);
    }

    #[test]
    fn tampered_entry_fails_verification_with_hash_mismatch() {
        let mut files = BTreeMap::new();
        files.insert("run.json".to_owned(), b"{}".to_vec());
        let bytes = build(build_input(files), None).unwrap();

        let mut tampered = bytes.clone();
        let last = tampered.len() - 1;
        tampered[last] ^= 0xFF;
        let result = verify(&tampered, VerifyOptions::default());
        assert!(result.is_err());
    }

    #[test]
    fn signature_required_but_absent_is_rejected() {
        let mut files = BTreeMap::new();
        files.insert("run.json".to_owned(), b"{}".to_vec());
        let bytes = build(build_input(files), None).unwrap();
        let signer = DevSigner::generate();
        let key = signer.verifying_key();
        let err = verify(&bytes, VerifyOptions { trusted_key: Some(&key) }).unwrap_err();
        assert!(matches!(err, PackError::SignatureMissing));
    }

    #[test]
    fn diff_of_identical_packs_is_empty() {
        let mut files = BTreeMap::new();
        files.insert("run.json".to_owned(), b"{}".to_vec());
        let bytes = build(build_input(files), None).unwrap();
        assert!(diff(&bytes, &bytes).unwrap().is_empty());
    }

    #[test]
    fn diff_classifies_added_and_changed_files() {
        let mut left_files = BTreeMap::new();
        left_files.insert("run.json".to_owned(), b"{\"a\":1}".to_vec());
        let left = build(build_input(left_files), None).unwrap();

        let mut right_files = BTreeMap::new();
        right_files.insert("run.json".to_owned(), b"{\"a\":2}".to_vec());
        right_files.insert("refs.json".to_owned(), b"[]".to_vec());
        let right = build(build_input(right_files), None).unwrap();

        let entries = diff(&left, &right).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().any(|e| e.field_path == "run.json" && e.change_class == ChangeClass::Changed));
        assert!(entries.iter().any(|e| e.field_path == "refs.json" && e.change_class == ChangeClass::Added));
    }

    #[test]
    fn context_envelope_runtime_drift_is_distinguished_from_semantic() {
        let record = |locator: &str, content: &[u8]| gait_context::ContextRecord {
            source_type: "retrieval".to_owned(),
            source_locator: locator.to_owned(),
            query_digest: hash_bytes(HashAlgorithm::Sha256, b"q"),
            content_digest: hash_bytes(HashAlgorithm::Sha256, content),
            retrieved_at: Timestamp::parse("2026-07-28T00:00:00Z").unwrap(),
            redaction_mode: "none".to_owned(),
            immutability: "immutable".to_owned(),
            freshness_sla_seconds: None,
        };

        let left_env = ContextEnvelope::build("set-1", EvidenceMode::Required, vec![record("doc-a", b"same")]).unwrap();
        let mut runtime_only = left_env.clone();
        runtime_only.records[0].retrieved_at = Timestamp::parse("2026-07-29T00:00:00Z").unwrap();
        runtime_only.context_set_digest = runtime_only.recompute_digest().unwrap();

        let mut left_files = BTreeMap::new();
        left_files.insert(CONTEXT_ENVELOPE_PATH.to_owned(), serde_json::to_vec(&left_env).unwrap());
        let left = build(build_input(left_files), None).unwrap();

        let mut right_files = BTreeMap::new();
        right_files.insert(CONTEXT_ENVELOPE_PATH.to_owned(), serde_json::to_vec(&runtime_only).unwrap());
        let right = build(build_input(right_files), None).unwrap();

        let entries = diff(&left, &right).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].change_class, ChangeClass::ContextRuntimeOnly);
    }
}
