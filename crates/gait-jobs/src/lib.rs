// crates/gait-jobs/src/lib.rs
// ============================================================================
// Module: Gait Jobs
// Description: Durable job state machine over an append-only event log.
// Purpose: Schedule multi-step agent jobs with lease-based execution and
//          checkpoint/pause/resume semantics.
// Dependencies: gait-core, gait-journal
// ============================================================================

//! ## Overview
//! A [`JobRuntime`] projects [`JobState`] deterministically from an
//! append-only [`gait_journal::SessionJournal`] event log — the same
//! on-disk format the session journal uses, per spec: jobs are just
//! another kind of journaled history. [`JobRuntime::submit`] opens a
//! fresh job directory and appends the initial event; [`JobRuntime::update`]
//! validates a [`JobCommand`] against the current projected state,
//! appends the resulting event, and re-projects.

use std::collections::BTreeMap;
use std::path::Path;

use gait_core::Timestamp;
use gait_core::hash_bytes;
use gait_core::ids::JobId;
use gait_core::ids::LeaseId;
use gait_core::HashAlgorithm;
use gait_core::HashDigest;
use gait_journal::JournalError;
use gait_journal::JournalOpenOptions;
use gait_journal::SessionJournal;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// Maximum length, in bytes, of a checkpoint's `summary` field.
pub const MAX_CHECKPOINT_SUMMARY_BYTES: usize = 4_096;

// ============================================================================
// SECTION: Status & Stop Reasons
// ============================================================================

/// A job's lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Submitted but not yet claimed by a worker.
    Submitted,
    /// Claimed by a worker holding an unexpired lease.
    Leased,
    /// Actively executing.
    Running,
    /// Execution paused by an explicit request.
    Paused,
    /// Blocked on an external decision; resume requires a matching approval.
    DecisionNeeded,
    /// Terminal: completed successfully.
    Completed,
    /// Terminal: failed.
    Failed,
    /// Terminal: cancelled.
    Cancelled,
}

impl JobStatus {
    /// Whether this status is terminal (no further transitions allowed).
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Stable, enumerated stop reason identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The job ran to completion.
    Completed,
    /// The job failed.
    Failed,
    /// The job was cancelled.
    Cancelled,
    /// The held lease expired before the job reached a terminal state.
    LeaseExpired,
    /// Resume was blocked by an environment fingerprint mismatch.
    FingerprintMismatch,
    /// The job is blocked pending an external decision.
    DecisionRequired,
}

/// A checkpoint record's kind, per spec §4.K.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointKind {
    /// A plan was produced but execution has not started.
    Plan,
    /// Incremental progress.
    Progress,
    /// Blocked pending an external decision.
    DecisionNeeded,
    /// Blocked for a reason other than a pending decision.
    Blocked,
    /// Terminal completion checkpoint.
    Completed,
}

// ============================================================================
// SECTION: Environment Fingerprint
// ============================================================================

/// A snapshot of the execution environment captured at submit time and
/// recompared at resume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentFingerprint {
    /// `std::env::consts::OS`-style platform identifier.
    pub platform: String,
    /// `std::env::consts::ARCH`-style architecture identifier.
    pub arch: String,
    /// Digest over the sorted values of the caller-declared relevant
    /// environment variables.
    pub env_digest: HashDigest,
}

impl EnvironmentFingerprint {
    /// Captures the current environment, hashing the values of
    /// `relevant_vars` (missing variables are recorded as absent rather
    /// than skipped, so their absence is part of the fingerprint too).
    #[must_use]
    pub fn capture(relevant_vars: &[String]) -> Self {
        let mut pairs: BTreeMap<&str, Option<String>> = BTreeMap::new();
        for name in relevant_vars {
            pairs.insert(name.as_str(), std::env::var(name).ok());
        }
        let bytes = serde_json::to_vec(&pairs).unwrap_or_default();
        Self {
            platform: std::env::consts::OS.to_owned(),
            arch: std::env::consts::ARCH.to_owned(),
            env_digest: hash_bytes(HashAlgorithm::Sha256, &bytes),
        }
    }
}

// ============================================================================
// SECTION: Events
// ============================================================================

/// One transition event in a job's append-only log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobEvent {
    /// The job was submitted.
    Submitted {
        /// Opaque job specification, interpreted by the caller.
        spec: serde_json::Value,
        /// Environment variable names considered relevant to this job.
        relevant_env_vars: Vec<String>,
        /// Fingerprint captured at submission.
        fingerprint: EnvironmentFingerprint,
    },
    /// A worker acquired the lease.
    Leased {
        /// Lease identifier.
        lease_id: LeaseId,
        /// Opaque worker identifier.
        worker_id: String,
        /// When the lease expires absent a heartbeat.
        expires_at: Timestamp,
    },
    /// The lease holder renewed its lease.
    LeaseRenewed {
        /// Lease identifier being renewed.
        lease_id: LeaseId,
        /// New expiry.
        expires_at: Timestamp,
    },
    /// The held lease expired before reaching a terminal state.
    LeaseExpired {
        /// The lease that expired.
        lease_id: LeaseId,
    },
    /// Execution started under the held lease.
    Started,
    /// Execution paused.
    Paused {
        /// Operator-supplied reason.
        reason: String,
    },
    /// Execution resumed from a paused state.
    Resumed {
        /// Whether a fingerprint mismatch was explicitly overridden.
        fingerprint_override: bool,
    },
    /// A checkpoint was recorded.
    Checkpoint {
        /// Checkpoint kind.
        checkpoint_kind: CheckpointKind,
        /// Bounded human-readable summary.
        summary: String,
        /// Required for `checkpoint_kind = decision_needed`.
        required_action: Option<String>,
    },
    /// An approval matching a pending `decision_needed` checkpoint arrived.
    ApprovalGranted {
        /// Digest of the approval token that satisfied the pending decision.
        approval_digest: HashDigest,
    },
    /// The job completed successfully.
    Completed {
        /// Bounded human-readable summary.
        summary: String,
    },
    /// The job failed.
    Failed {
        /// Failure reason.
        reason: String,
    },
    /// The job was cancelled.
    Cancelled {
        /// Cancellation reason.
        reason: String,
    },
}

// ============================================================================
// SECTION: Projected State
// ============================================================================

/// The current projected state of a job, rebuilt deterministically from
/// its event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobState {
    /// This job's identifier.
    pub job_id: JobId,
    /// Current lifecycle status.
    pub status: JobStatus,
    /// Current lease holder, if any.
    pub lease: Option<ActiveLease>,
    /// Environment fingerprint captured at submission.
    pub fingerprint: Option<EnvironmentFingerprint>,
    /// Environment variable names considered relevant to this job.
    pub relevant_env_vars: Vec<String>,
    /// Most recent checkpoint, if any.
    pub last_checkpoint: Option<LastCheckpoint>,
    /// Stop reason, populated once `status` is terminal or blocked.
    pub stop_reason: Option<StopReason>,
    /// Number of events folded into this projection.
    pub event_count: u64,
}

/// An active lease over a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveLease {
    /// Lease identifier.
    pub lease_id: LeaseId,
    /// Opaque worker identifier.
    pub worker_id: String,
    /// When this lease expires absent a heartbeat.
    pub expires_at: Timestamp,
}

/// The most recently recorded checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastCheckpoint {
    /// Checkpoint kind.
    pub checkpoint_kind: CheckpointKind,
    /// Bounded human-readable summary.
    pub summary: String,
    /// Required action, present only for `decision_needed` checkpoints.
    pub required_action: Option<String>,
}

fn project(job_id: &JobId, events: &[JobEvent]) -> JobState {
    let mut state = JobState {
        job_id: job_id.clone(),
        status: JobStatus::Submitted,
        lease: None,
        fingerprint: None,
        relevant_env_vars: Vec::new(),
        last_checkpoint: None,
        stop_reason: None,
        event_count: 0,
    };

    for event in events {
        state.event_count += 1;
        match event {
            JobEvent::Submitted { relevant_env_vars, fingerprint, .. } => {
                state.relevant_env_vars.clone_from(relevant_env_vars);
                state.fingerprint = Some(fingerprint.clone());
            }
            JobEvent::Leased { lease_id, worker_id, expires_at } => {
                state.status = JobStatus::Leased;
                state.lease = Some(ActiveLease { lease_id: lease_id.clone(), worker_id: worker_id.clone(), expires_at: *expires_at });
            }
            JobEvent::LeaseRenewed { expires_at, .. } => {
                if let Some(lease) = state.lease.as_mut() {
                    lease.expires_at = *expires_at;
                }
            }
            JobEvent::LeaseExpired { .. } => {
                state.lease = None;
                state.status = JobStatus::Submitted;
                state.stop_reason = Some(StopReason::LeaseExpired);
            }
            JobEvent::Started => {
                state.status = JobStatus::Running;
                state.stop_reason = None;
            }
            JobEvent::Paused { .. } => {
                state.status = JobStatus::Paused;
            }
            JobEvent::Resumed { .. } => {
                state.status = JobStatus::Running;
                state.stop_reason = None;
            }
            JobEvent::Checkpoint { checkpoint_kind, summary, required_action } => {
                state.last_checkpoint = Some(LastCheckpoint {
                    checkpoint_kind: *checkpoint_kind,
                    summary: summary.clone(),
                    required_action: required_action.clone(),
                });
                if matches!(checkpoint_kind, CheckpointKind::DecisionNeeded) {
                    state.status = JobStatus::DecisionNeeded;
                    state.stop_reason = Some(StopReason::DecisionRequired);
                }
            }
            JobEvent::ApprovalGranted { .. } => {
                if matches!(state.status, JobStatus::DecisionNeeded) {
                    state.status = JobStatus::Running;
                    state.stop_reason = None;
                }
            }
            JobEvent::Completed { summary } => {
                state.status = JobStatus::Completed;
                state.stop_reason = Some(StopReason::Completed);
                state.last_checkpoint = Some(LastCheckpoint {
                    checkpoint_kind: CheckpointKind::Completed,
                    summary: summary.clone(),
                    required_action: None,
                });
            }
            JobEvent::Failed { .. } => {
                state.status = JobStatus::Failed;
                state.stop_reason = Some(StopReason::Failed);
            }
            JobEvent::Cancelled { .. } => {
                state.status = JobStatus::Cancelled;
                state.stop_reason = Some(StopReason::Cancelled);
            }
        }
    }

    state
}

// ============================================================================
// SECTION: Commands
// ============================================================================

/// A caller-issued command to apply to a job.
#[derive(Debug, Clone)]
pub enum JobCommand {
    /// Acquire the lease as `worker_id`, valid until `expires_at`.
    AcquireLease {
        /// New lease identifier.
        lease_id: LeaseId,
        /// Opaque worker identifier.
        worker_id: String,
        /// Lease expiry.
        expires_at: Timestamp,
    },
    /// Renew the currently held lease.
    RenewLease {
        /// New expiry.
        expires_at: Timestamp,
    },
    /// Mark the held lease as expired.
    ExpireLease,
    /// Start execution under the held lease.
    Start,
    /// Pause execution.
    Pause {
        /// Operator-supplied reason.
        reason: String,
    },
    /// Resume from a paused or decision-blocked state.
    Resume {
        /// Current environment fingerprint, recomputed by the caller.
        current_fingerprint: EnvironmentFingerprint,
        /// Explicitly override a fingerprint mismatch.
        override_fingerprint_mismatch: bool,
    },
    /// Record a checkpoint.
    Checkpoint {
        /// Checkpoint kind.
        checkpoint_kind: CheckpointKind,
        /// Human-readable summary, truncated to [`MAX_CHECKPOINT_SUMMARY_BYTES`].
        summary: String,
        /// Required for `checkpoint_kind = decision_needed`.
        required_action: Option<String>,
    },
    /// Grant the approval a pending `decision_needed` checkpoint is waiting on.
    GrantApproval {
        /// Digest of the granting approval token.
        approval_digest: HashDigest,
    },
    /// Mark the job complete.
    Complete {
        /// Human-readable summary.
        summary: String,
    },
    /// Mark the job failed.
    Fail {
        /// Failure reason.
        reason: String,
    },
    /// Cancel the job.
    Cancel {
        /// Cancellation reason.
        reason: String,
    },
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while submitting or updating a job.
#[derive(Debug, Error)]
pub enum JobError {
    /// The underlying event journal failed.
    #[error(transparent)]
    Journal(#[from] JournalError),
    /// A stored event failed to deserialize.
    #[error("job event log is corrupt: {0}")]
    CorruptEvent(String),
    /// The command is not valid from the job's current status.
    #[error("cannot apply {command} while job is {status:?}")]
    InvalidTransition {
        /// The job's status at the time of the attempted command.
        status: JobStatus,
        /// A short, stable label for the rejected command.
        command: &'static str,
    },
    /// `checkpoint_kind = decision_needed` without a `required_action`.
    #[error("decision_needed checkpoint requires a required_action")]
    MissingRequiredAction,
    /// A checkpoint summary exceeded the length cap.
    #[error("checkpoint summary exceeds {MAX_CHECKPOINT_SUMMARY_BYTES} bytes")]
    SummaryTooLong,
    /// Resume was attempted with a mismatched fingerprint and no override.
    #[error("environment fingerprint mismatch; resume blocked")]
    FingerprintMismatch,
    /// No lease is currently held.
    #[error("no lease is currently held")]
    NoActiveLease,
}

// ============================================================================
// SECTION: Job Runtime
// ============================================================================

/// A durable, journal-backed job state machine.
pub struct JobRuntime {
    journal: SessionJournal,
    state: JobState,
}

impl JobRuntime {
    /// Submits a new job under `root`, capturing an environment
    /// fingerprint over `relevant_env_vars`.
    ///
    /// # Errors
    ///
    /// Returns a [`JobError::Journal`] if the job directory cannot be
    /// created or locked.
    pub fn submit(root: &Path, job_id: JobId, spec: serde_json::Value, relevant_env_vars: Vec<String>) -> Result<Self, JobError> {
        let dir = root.join(job_id.as_str());
        let mut journal = SessionJournal::open(&dir, gait_core::ids::SessionId::new(job_id.as_str()), JournalOpenOptions::default())?;
        let fingerprint = EnvironmentFingerprint::capture(&relevant_env_vars);
        let event = JobEvent::Submitted { spec, relevant_env_vars, fingerprint };
        journal.append(serde_json::to_value(&event).map_err(|err| JobError::CorruptEvent(err.to_string()))?)?;
        let state = project(&job_id, &[event]);
        Ok(Self { journal, state })
    }

    /// Reopens an existing job, replaying its event log to rebuild
    /// [`JobState`].
    ///
    /// # Errors
    ///
    /// Returns a [`JobError::Journal`] if the directory cannot be locked,
    /// or [`JobError::CorruptEvent`] if a stored event fails to parse.
    pub fn open(root: &Path, job_id: JobId) -> Result<Self, JobError> {
        let dir = root.join(job_id.as_str());
        let journal = SessionJournal::open(&dir, gait_core::ids::SessionId::new(job_id.as_str()), JournalOpenOptions::default())?;
        let records = journal.read_all()?;
        let mut events = Vec::with_capacity(records.len());
        for record in records {
            let event: JobEvent = serde_json::from_value(record.event).map_err(|err| JobError::CorruptEvent(err.to_string()))?;
            events.push(event);
        }
        let state = project(&job_id, &events);
        Ok(Self { journal, state })
    }

    /// The job's current projected state.
    #[must_use]
    pub fn state(&self) -> &JobState {
        &self.state
    }

    /// Applies `command`, validating it against the current status,
    /// appending the resulting event, and re-projecting state.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::InvalidTransition`] if `command` is not valid
    /// from the job's current status, or a validation error specific to
    /// the command (missing required action, oversized summary,
    /// fingerprint mismatch, no active lease).
    pub fn update(&mut self, command: JobCommand) -> Result<&JobState, JobError> {
        let event = self.validate(&command)?;
        self.journal.append(serde_json::to_value(&event).map_err(|err| JobError::CorruptEvent(err.to_string()))?)?;

        self.state = fold_one(self.state.clone(), &event);
        Ok(&self.state)
    }

    fn validate(&self, command: &JobCommand) -> Result<JobEvent, JobError> {
        let status = self.state.status;
        match command {
            JobCommand::AcquireLease { lease_id, worker_id, expires_at } => {
                if status != JobStatus::Submitted {
                    return Err(transition_error(status, "acquire_lease"));
                }
                Ok(JobEvent::Leased { lease_id: lease_id.clone(), worker_id: worker_id.clone(), expires_at: *expires_at })
            }
            JobCommand::RenewLease { expires_at } => {
                let lease_id = self.state.lease.as_ref().map(|lease| lease.lease_id.clone()).ok_or(JobError::NoActiveLease)?;
                Ok(JobEvent::LeaseRenewed { lease_id, expires_at: *expires_at })
            }
            JobCommand::ExpireLease => {
                let lease_id = self.state.lease.as_ref().map(|lease| lease.lease_id.clone()).ok_or(JobError::NoActiveLease)?;
                Ok(JobEvent::LeaseExpired { lease_id })
            }
            JobCommand::Start => {
                if status != JobStatus::Leased {
                    return Err(transition_error(status, "start"));
                }
                Ok(JobEvent::Started)
            }
            JobCommand::Pause { reason } => {
                if status != JobStatus::Running {
                    return Err(transition_error(status, "pause"));
                }
                Ok(JobEvent::Paused { reason: reason.clone() })
            }
            JobCommand::Resume { current_fingerprint, override_fingerprint_mismatch } => {
                if status != JobStatus::Paused {
                    return Err(transition_error(status, "resume"));
                }
                let matches = self.state.fingerprint.as_ref() == Some(current_fingerprint);
                if !matches && !override_fingerprint_mismatch {
                    return Err(JobError::FingerprintMismatch);
                }
                Ok(JobEvent::Resumed { fingerprint_override: !matches && *override_fingerprint_mismatch })
            }
            JobCommand::Checkpoint { checkpoint_kind, summary, required_action } => {
                if status.is_terminal() {
                    return Err(transition_error(status, "checkpoint"));
                }
                if summary.len() > MAX_CHECKPOINT_SUMMARY_BYTES {
                    return Err(JobError::SummaryTooLong);
                }
                if matches!(checkpoint_kind, CheckpointKind::DecisionNeeded) && required_action.is_none() {
                    return Err(JobError::MissingRequiredAction);
                }
                Ok(JobEvent::Checkpoint { checkpoint_kind: *checkpoint_kind, summary: summary.clone(), required_action: required_action.clone() })
            }
            JobCommand::GrantApproval { approval_digest } => {
                if status != JobStatus::DecisionNeeded {
                    return Err(transition_error(status, "grant_approval"));
                }
                Ok(JobEvent::ApprovalGranted { approval_digest: approval_digest.clone() })
            }
            JobCommand::Complete { summary } => {
                if status.is_terminal() {
                    return Err(transition_error(status, "complete"));
                }
                Ok(JobEvent::Completed { summary: summary.clone() })
            }
            JobCommand::Fail { reason } => {
                if status.is_terminal() {
                    return Err(transition_error(status, "fail"));
                }
                Ok(JobEvent::Failed { reason: reason.clone() })
            }
            JobCommand::Cancel { reason } => {
                if status.is_terminal() {
                    return Err(transition_error(status, "cancel"));
                }
                Ok(JobEvent::Cancelled { reason: reason.clone() })
            }
        }
    }
}

fn transition_error(status: JobStatus, command: &'static str) -> JobError {
    JobError::InvalidTransition { status, command }
}

fn fold_one(mut state: JobState, event: &JobEvent) -> JobState {
    state.event_count += 1;
    match event {
        JobEvent::Submitted { relevant_env_vars, fingerprint, .. } => {
            state.relevant_env_vars.clone_from(relevant_env_vars);
            state.fingerprint = Some(fingerprint.clone());
        }
        JobEvent::Leased { lease_id, worker_id, expires_at } => {
            state.status = JobStatus::Leased;
            state.lease = Some(ActiveLease { lease_id: lease_id.clone(), worker_id: worker_id.clone(), expires_at: *expires_at });
        }
        JobEvent::LeaseRenewed { expires_at, .. } => {
            if let Some(lease) = state.lease.as_mut() {
                lease.expires_at = *expires_at;
            }
        }
        JobEvent::LeaseExpired { .. } => {
            state.lease = None;
            state.status = JobStatus::Submitted;
            state.stop_reason = Some(StopReason::LeaseExpired);
        }
        JobEvent::Started => {
            state.status = JobStatus::Running;
            state.stop_reason = None;
        }
        JobEvent::Paused { .. } => {
            state.status = JobStatus::Paused;
        }
        JobEvent::Resumed { .. } => {
            state.status = JobStatus::Running;
            state.stop_reason = None;
        }
        JobEvent::Checkpoint { checkpoint_kind, summary, required_action } => {
            state.last_checkpoint = Some(LastCheckpoint {
                checkpoint_kind: *checkpoint_kind,
                summary: summary.clone(),
                required_action: required_action.clone(),
            });
            if matches!(checkpoint_kind, CheckpointKind::DecisionNeeded) {
                state.status = JobStatus::DecisionNeeded;
                state.stop_reason = Some(StopReason::DecisionRequired);
            }
        }
        JobEvent::ApprovalGranted { .. } => {
            if matches!(state.status, JobStatus::DecisionNeeded) {
                state.status = JobStatus::Running;
                state.stop_reason = None;
            }
        }
        JobEvent::Completed { summary } => {
            state.status = JobStatus::Completed;
            state.stop_reason = Some(StopReason::Completed);
            state.last_checkpoint = Some(LastCheckpoint { checkpoint_kind: CheckpointKind::Completed, summary: summary.clone(), required_action: None });
        }
        JobEvent::Failed { .. } => {
            state.status = JobStatus::Failed;
            state.stop_reason = Some(StopReason::Failed);
        }
        JobEvent::Cancelled { .. } => {
            state.status = JobStatus::Cancelled;
            state.stop_reason = Some(StopReason::Cancelled);
        }
    }
    state
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn submit_then_lease_then_start_transitions_as_expected() {
        let dir = tempdir().unwrap();
        let mut job = JobRuntime::submit(dir.path(), JobId::new("job-1"), serde_json::json!({}), vec![]).unwrap();
        assert_eq!(job.state().status, JobStatus::Submitted);

        job.update(JobCommand::AcquireLease { lease_id: LeaseId::new("lease-1"), worker_id: "worker-a".to_owned(), expires_at: Timestamp::now() }).unwrap();
        assert_eq!(job.state().status, JobStatus::Leased);

        job.update(JobCommand::Start).unwrap();
        assert_eq!(job.state().status, JobStatus::Running);
    }

    #[test]
    fn starting_without_a_lease_is_an_invalid_transition() {
        let dir = tempdir().unwrap();
        let mut job = JobRuntime::submit(dir.path(), JobId::new("job-1"), serde_json::json!({}), vec![]).unwrap();
        let err = job.update(JobCommand::Start).unwrap_err();
        assert!(matches!(err, JobError::InvalidTransition { .. }));
    }

    #[test]
    fn decision_needed_checkpoint_requires_required_action() {
        let dir = tempdir().unwrap();
        let mut job = JobRuntime::submit(dir.path(), JobId::new("job-1"), serde_json::json!({}), vec![]).unwrap();
        job.update(JobCommand::AcquireLease { lease_id: LeaseId::new("lease-1"), worker_id: "w".to_owned(), expires_at: Timestamp::now() }).unwrap();
        job.update(JobCommand::Start).unwrap();

        let err = job
            .update(JobCommand::Checkpoint { checkpoint_kind: CheckpointKind::DecisionNeeded, summary: "waiting".to_owned(), required_action: None })
            .unwrap_err();
        assert!(matches!(err, JobError::MissingRequiredAction));
    }

    #[test]
    fn resume_from_decision_needed_requires_matching_approval() {
        let dir = tempdir().unwrap();
        let mut job = JobRuntime::submit(dir.path(), JobId::new("job-1"), serde_json::json!({}), vec![]).unwrap();
        job.update(JobCommand::AcquireLease { lease_id: LeaseId::new("lease-1"), worker_id: "w".to_owned(), expires_at: Timestamp::now() }).unwrap();
        job.update(JobCommand::Start).unwrap();
        job.update(JobCommand::Checkpoint {
            checkpoint_kind: CheckpointKind::DecisionNeeded,
            summary: "need approval".to_owned(),
            required_action: Some("approve spend".to_owned()),
        })
        .unwrap();
        assert_eq!(job.state().status, JobStatus::DecisionNeeded);

        job.update(JobCommand::GrantApproval { approval_digest: hash_bytes(HashAlgorithm::Sha256, b"token") }).unwrap();
        assert_eq!(job.state().status, JobStatus::Running);
    }

    #[test]
    fn resume_with_mismatched_fingerprint_is_blocked_by_default() {
        let dir = tempdir().unwrap();
        let mut job = JobRuntime::submit(dir.path(), JobId::new("job-1"), serde_json::json!({}), vec!["GAIT_TEST_VAR".to_owned()]).unwrap();
        job.update(JobCommand::AcquireLease { lease_id: LeaseId::new("lease-1"), worker_id: "w".to_owned(), expires_at: Timestamp::now() }).unwrap();
        job.update(JobCommand::Start).unwrap();
        job.update(JobCommand::Pause { reason: "operator pause".to_owned() }).unwrap();

        let mismatched = EnvironmentFingerprint { platform: "other".to_owned(), arch: "other".to_owned(), env_digest: hash_bytes(HashAlgorithm::Sha256, b"different") };
        let err = job.update(JobCommand::Resume { current_fingerprint: mismatched, override_fingerprint_mismatch: false }).unwrap_err();
        assert!(matches!(err, JobError::FingerprintMismatch));
    }

    #[test]
    fn reopen_rebuilds_state_from_the_event_log() {
        let dir = tempdir().unwrap();
        let job_id = JobId::new("job-1");
        {
            let mut job = JobRuntime::submit(dir.path(), job_id.clone(), serde_json::json!({}), vec![]).unwrap();
            job.update(JobCommand::AcquireLease { lease_id: LeaseId::new("lease-1"), worker_id: "w".to_owned(), expires_at: Timestamp::now() }).unwrap();
        }
        let reopened = JobRuntime::open(dir.path(), job_id).unwrap();
        assert_eq!(reopened.state().status, JobStatus::Leased);
    }

    #[test]
    fn cancel_is_allowed_from_any_non_terminal_status() {
        let dir = tempdir().unwrap();
        let mut job = JobRuntime::submit(dir.path(), JobId::new("job-1"), serde_json::json!({}), vec![]).unwrap();
        job.update(JobCommand::Cancel { reason: "operator abort".to_owned() }).unwrap();
        assert_eq!(job.state().status, JobStatus::Cancelled);
    }
}
