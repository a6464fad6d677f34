// crates/gait-journal/src/lib.rs
// ============================================================================
// Module: Gait Journal
// Description: Append-only session event log with checkpoint materialization.
// Purpose: Durably record session events and seal verifiable checkpoints.
// Dependencies: gait-core, gait-pack
// ============================================================================

//! ## Overview
//! A [`SessionJournal`] owns a directory holding `journal.jsonl`
//! (append-only, one canonical-JSON record per line), `journal.index`
//! (last sequence number and checkpoint digest chain), and a `.lock`
//! file held for the journal's lifetime. [`SessionJournal::append`]
//! writes a new record in a single syscall; [`SessionJournal::checkpoint`]
//! seals a journal prefix into a pack via [`gait_pack`]; [`SessionJournal::compact`]
//! drops the sealed prefix from disk while keeping the checkpoint chain
//! verifiable; [`SessionJournal::verify_chain`] checks that chain.

use std::fs::File;
use std::fs::OpenOptions;
use std::io::BufRead;
use std::io::BufReader;
use std::io::Write as _;
use std::path::Path;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use gait_core::HashAlgorithm;
use gait_core::HashDigest;
use gait_core::Signer;
use gait_core::Timestamp;
use gait_core::canonical_json_bytes;
use gait_core::hash_bytes;
use gait_core::ids::SessionId;
use gait_pack::PackError;
use gait_pack::PackType;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

const JOURNAL_FILE: &str = "journal.jsonl";
const INDEX_FILE: &str = "journal.index";
const LOCK_FILE: &str = ".lock";
const JOURNAL_PREFIX_ENTRY: &str = "journal_prefix.jsonl";

/// Number of times a lock acquisition is retried before failing closed.
const LOCK_RETRY_ATTEMPTS: u32 = 8;
/// Base backoff between lock retries; doubles per attempt.
const LOCK_RETRY_BASE_DELAY: Duration = Duration::from_millis(20);

// ============================================================================
// SECTION: Records
// ============================================================================

/// One appended journal record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalRecord {
    /// Monotonic sequence number, starting at 1.
    pub seq: u64,
    /// The event payload, opaque to the journal itself.
    pub event: serde_json::Value,
    /// Wall-clock time the record was appended. Never part of any digest.
    pub recorded_at: Timestamp,
}

/// How `open` should handle a trailing malformed partial line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecoveryMode {
    /// Fail closed and report the truncation point. Default.
    #[default]
    RejectAndReport,
    /// Silently discard the trailing partial line and continue.
    TruncateTrailing,
}

/// One link in the checkpoint digest chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainAnchor {
    /// Last journal sequence number this checkpoint covers.
    pub seq: u64,
    /// Digest of the sealed checkpoint pack.
    pub digest: HashDigest,
    /// Digest of the checkpoint this one extends, if any.
    pub prev_digest: Option<HashDigest>,
}

/// Persisted `journal.index` contents: last sequence number and the
/// checkpoint chain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JournalIndex {
    /// Sequence number of the last appended record.
    pub last_seq: u64,
    /// Sequence number of the first record still on disk. Greater than
    /// zero once a compaction has run.
    pub first_seq: u64,
    /// Checkpoints sealed so far, oldest first.
    pub checkpoint_chain: Vec<ChainAnchor>,
}

impl JournalIndex {
    fn last_checkpoint_digest(&self) -> Option<HashDigest> {
        self.checkpoint_chain.last().map(|anchor| anchor.digest.clone())
    }
}

/// Outcome of [`SessionJournal::verify_chain`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainResult {
    /// Whether every checkpoint's `prev_digest` matched its predecessor.
    pub valid: bool,
    /// Number of checkpoints checked.
    pub checked: usize,
    /// Sequence number of the first broken link, if any.
    pub broken_at: Option<u64>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised by journal operations.
#[derive(Debug, Error)]
pub enum JournalError {
    /// An I/O operation on the journal directory failed.
    #[error("journal i/o error at {path}: {source}")]
    Io {
        /// Path the failing operation targeted.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The advisory lock could not be acquired after bounded retry.
    #[error("session journal at {0} is locked by another owner")]
    SessionLocked(PathBuf),
    /// A journal record failed to canonicalize or parse.
    #[error("malformed journal record at line {0}: {1}")]
    MalformedRecord(usize, String),
    /// A trailing partial line was found and `RejectAndReport` was active.
    #[error("journal has a truncated trailing record at line {0}")]
    TruncatedTail(usize),
    /// `journal.index` did not parse.
    #[error("journal index is corrupt: {0}")]
    CorruptIndex(String),
    /// The requested checkpoint prefix exceeds the journal's current range.
    #[error("checkpoint prefix seq {requested} exceeds last_seq {last_seq}")]
    PrefixOutOfRange {
        /// Requested prefix bound.
        requested: u64,
        /// Last sequence number actually present.
        last_seq: u64,
    },
    /// Checkpoint pack assembly failed.
    #[error(transparent)]
    Pack(#[from] PackError),
    /// Canonicalization of a record or index failed.
    #[error("failed to canonicalize: {0}")]
    Canonicalization(String),
}

fn io_err(path: &Path, source: std::io::Error) -> JournalError {
    JournalError::Io { path: path.to_path_buf(), source }
}

// ============================================================================
// SECTION: Lock
// ============================================================================

struct LockGuard {
    path: PathBuf,
}

impl LockGuard {
    fn acquire(dir: &Path) -> Result<Self, JournalError> {
        let path = dir.join(LOCK_FILE);
        let mut delay = LOCK_RETRY_BASE_DELAY;
        for attempt in 0..LOCK_RETRY_ATTEMPTS {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => return Ok(Self { path }),
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                    if attempt + 1 == LOCK_RETRY_ATTEMPTS {
                        break;
                    }
                    thread::sleep(delay);
                    delay *= 2;
                }
                Err(err) => return Err(io_err(&path, err)),
            }
        }
        Err(JournalError::SessionLocked(dir.to_path_buf()))
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

// ============================================================================
// SECTION: Session Journal
// ============================================================================

/// Options controlling how a [`SessionJournal`] is opened.
#[derive(Debug, Clone, Copy, Default)]
pub struct JournalOpenOptions {
    /// How to treat a trailing malformed record.
    pub recovery: RecoveryMode,
}

/// A directory-backed, lock-owned append-only session journal.
pub struct SessionJournal {
    session_id: SessionId,
    dir: PathBuf,
    index: JournalIndex,
    _lock: LockGuard,
}

impl SessionJournal {
    /// Opens (creating if absent) the journal for `session_id` rooted at
    /// `dir`, acquiring its advisory lock and performing crash recovery.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::SessionLocked`] if the lock cannot be
    /// acquired, [`JournalError::TruncatedTail`] if a trailing malformed
    /// record is found under [`RecoveryMode::RejectAndReport`], or an I/O
    /// error if the directory cannot be prepared.
    pub fn open(dir: &Path, session_id: SessionId, options: JournalOpenOptions) -> Result<Self, JournalError> {
        std::fs::create_dir_all(dir).map_err(|err| io_err(dir, err))?;
        let lock = LockGuard::acquire(dir)?;

        let (index, _recovered_records) = Self::recover(dir, options.recovery)?;

        Ok(Self { session_id, dir: dir.to_path_buf(), index, _lock: lock })
    }

    /// The session this journal belongs to.
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// The last appended sequence number, or zero if empty.
    #[must_use]
    pub fn last_seq(&self) -> u64 {
        self.index.last_seq
    }

    fn recover(dir: &Path, recovery: RecoveryMode) -> Result<(JournalIndex, Vec<JournalRecord>), JournalError> {
        let index_path = dir.join(INDEX_FILE);
        let mut index = if index_path.exists() {
            let bytes = std::fs::read(&index_path).map_err(|err| io_err(&index_path, err))?;
            serde_json::from_slice(&bytes).map_err(|err| JournalError::CorruptIndex(err.to_string()))?
        } else {
            JournalIndex::default()
        };

        let journal_path = dir.join(JOURNAL_FILE);
        if !journal_path.exists() {
            return Ok((index, Vec::new()));
        }

        let file = File::open(&journal_path).map_err(|err| io_err(&journal_path, err))?;
        let reader = BufReader::new(file);
        let mut records = Vec::new();
        let mut last_complete_line = 0_usize;
        let mut saw_incomplete = false;
        for (line_no, line) in reader.lines().enumerate() {
            let line = line.map_err(|err| io_err(&journal_path, err))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<JournalRecord>(&line) {
                Ok(record) => {
                    last_complete_line = line_no + 1;
                    records.push(record);
                }
                Err(err) => {
                    saw_incomplete = true;
                    match recovery {
                        RecoveryMode::RejectAndReport => return Err(JournalError::TruncatedTail(line_no + 1)),
                        RecoveryMode::TruncateTrailing => {
                            let _ = err;
                            break;
                        }
                    }
                }
            }
        }

        if saw_incomplete && matches!(recovery, RecoveryMode::TruncateTrailing) {
            Self::truncate_to_line(&journal_path, last_complete_line)?;
        }

        if let Some(last) = records.last() {
            index.last_seq = index.last_seq.max(last.seq);
        }

        Ok((index, records))
    }

    fn truncate_to_line(path: &Path, keep_lines: usize) -> Result<(), JournalError> {
        let bytes = std::fs::read(path).map_err(|err| io_err(path, err))?;
        let mut kept = Vec::new();
        let mut seen = 0_usize;
        for line in bytes.split(|&b| b == b'\n') {
            if seen >= keep_lines {
                break;
            }
            if !line.is_empty() {
                kept.extend_from_slice(line);
                kept.push(b'\n');
            }
            seen += 1;
        }
        atomic_write(path, &kept)
    }

    /// Appends `event`, returning its assigned sequence number.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the write or the index update fails.
    pub fn append(&mut self, event: serde_json::Value) -> Result<u64, JournalError> {
        let seq = self.index.last_seq + 1;
        let record = JournalRecord { seq, event, recorded_at: Timestamp::now() };
        let mut line = canonical_json_bytes(&record).map_err(|err| JournalError::Canonicalization(err.to_string()))?;
        line.push(b'\n');

        let journal_path = self.dir.join(JOURNAL_FILE);
        let mut file = OpenOptions::new().create(true).append(true).open(&journal_path).map_err(|err| io_err(&journal_path, err))?;
        file.write_all(&line).map_err(|err| io_err(&journal_path, err))?;
        file.sync_data().map_err(|err| io_err(&journal_path, err))?;

        self.index.last_seq = seq;
        self.write_index()?;
        Ok(seq)
    }

    fn write_index(&self) -> Result<(), JournalError> {
        let bytes = serde_json::to_vec_pretty(&self.index).map_err(|err| JournalError::Canonicalization(err.to_string()))?;
        atomic_write(&self.dir.join(INDEX_FILE), &bytes)
    }

    /// Reads every record currently on disk, in sequence order.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::MalformedRecord`] if a stored line fails to
    /// parse.
    pub fn read_all(&self) -> Result<Vec<JournalRecord>, JournalError> {
        let journal_path = self.dir.join(JOURNAL_FILE);
        if !journal_path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&journal_path).map_err(|err| io_err(&journal_path, err))?;
        let reader = BufReader::new(file);
        let mut records = Vec::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line.map_err(|err| io_err(&journal_path, err))?;
            if line.trim().is_empty() {
                continue;
            }
            let record: JournalRecord = serde_json::from_str(&line).map_err(|err| JournalError::MalformedRecord(line_no + 1, err.to_string()))?;
            records.push(record);
        }
        Ok(records)
    }

    /// Seals every record with `seq <= prefix_seq` into a pack, binding the
    /// previous checkpoint's digest. `generated_at` is supplied by the
    /// caller so the same prefix always yields a byte-identical archive.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::PrefixOutOfRange`] if `prefix_seq` exceeds
    /// [`SessionJournal::last_seq`], or a [`PackError`] from assembly.
    pub fn checkpoint(&mut self, prefix_seq: u64, generated_at: Timestamp, signer: Option<&dyn Signer>) -> Result<Vec<u8>, JournalError> {
        if prefix_seq > self.index.last_seq {
            return Err(JournalError::PrefixOutOfRange { requested: prefix_seq, last_seq: self.index.last_seq });
        }

        let records = self.read_all()?;
        let mut prefix_bytes = Vec::new();
        for record in &records {
            if record.seq > prefix_seq {
                break;
            }
            let mut line = canonical_json_bytes(record).map_err(|err| JournalError::Canonicalization(err.to_string()))?;
            line.push(b'\n');
            prefix_bytes.extend_from_slice(&line);
        }

        let mut files = std::collections::BTreeMap::new();
        files.insert(JOURNAL_PREFIX_ENTRY.to_owned(), prefix_bytes);

        let prev_checkpoint_digest = self.index.last_checkpoint_digest();
        let pack_bytes = gait_pack::build(
            gait_pack::BuildInput {
                pack_type: PackType::Run,
                files,
                job_id: None,
                prev_checkpoint_digest: prev_checkpoint_digest.clone(),
                generated_at,
            },
            signer,
        )?;

        let digest = hash_bytes(HashAlgorithm::Sha256, &pack_bytes);
        self.index.checkpoint_chain.push(ChainAnchor { seq: prefix_seq, digest, prev_digest: prev_checkpoint_digest });
        self.write_index()?;

        Ok(pack_bytes)
    }

    /// Drops journal records covered by the most recent checkpoint from
    /// disk, keeping the checkpoint digest chain so [`SessionJournal::verify_chain`]
    /// still passes.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the journal file cannot be rewritten.
    pub fn compact(&mut self) -> Result<(), JournalError> {
        let Some(anchor) = self.index.checkpoint_chain.last() else {
            return Ok(());
        };
        let cutoff = anchor.seq;

        let records = self.read_all()?;
        let mut remaining = Vec::new();
        for record in records {
            if record.seq > cutoff {
                let mut line = canonical_json_bytes(&record).map_err(|err| JournalError::Canonicalization(err.to_string()))?;
                line.push(b'\n');
                remaining.push(line);
            }
        }
        let mut bytes = Vec::new();
        for line in remaining {
            bytes.extend_from_slice(&line);
        }
        atomic_write(&self.dir.join(JOURNAL_FILE), &bytes)?;

        self.index.first_seq = cutoff + 1;
        self.write_index()
    }

    /// Verifies that the checkpoint digest chain is internally consistent,
    /// independent of whether the journal has been compacted.
    #[must_use]
    pub fn verify_chain(&self) -> ChainResult {
        let mut previous: Option<&HashDigest> = None;
        for (idx, anchor) in self.index.checkpoint_chain.iter().enumerate() {
            if anchor.prev_digest.as_ref() != previous {
                return ChainResult { valid: false, checked: idx, broken_at: Some(anchor.seq) };
            }
            previous = Some(&anchor.digest);
        }
        ChainResult { valid: true, checked: self.index.checkpoint_chain.len(), broken_at: None }
    }
}

fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), JournalError> {
    let tmp_path = path.with_extension("tmp");
    {
        let mut file = File::create(&tmp_path).map_err(|err| io_err(&tmp_path, err))?;
        file.write_all(bytes).map_err(|err| io_err(&tmp_path, err))?;
        file.sync_data().map_err(|err| io_err(&tmp_path, err))?;
    }
    std::fs::rename(&tmp_path, path).map_err(|err| io_err(path, err))
}
