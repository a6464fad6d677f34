// crates/gait/src/job.rs
// ============================================================================
// Module: Facade Job
// Description: Job-directory conventions layered on gait-jobs.
// Purpose: Root every job's event log at the persisted state layout
//          spec.md §6 declares (`jobs/<job_id>/`).
// Dependencies: gait-jobs, crate::{CoreContext, GaitError}
// ============================================================================

//! ## Overview
//! [`gait_jobs::JobRuntime`] already implements `submit`, `open`,
//! `state`, and `update` directly over its own event journal; this
//! module adds the one directory convention a caller would otherwise
//! have to derive themselves: `submit` and `inspect` both root the job
//! under `ctx`'s state directory rather than an arbitrary path.

use gait_core::JobId;
use gait_jobs::JobError;
use gait_jobs::JobRuntime;
use gait_jobs::JobState;

use crate::CoreContext;
use crate::GaitError;

/// Submits a new job under `ctx`'s job root, capturing an environment
/// fingerprint over `relevant_env_vars`.
///
/// # Errors
///
/// Returns [`GaitError::Job`] if the job directory cannot be created or
/// locked.
pub fn submit(ctx: &CoreContext, job_id: JobId, spec: serde_json::Value, relevant_env_vars: Vec<String>) -> Result<JobRuntime, GaitError> {
    JobRuntime::submit(&ctx.config().state_dir.join("jobs"), job_id, spec, relevant_env_vars).map_err(GaitError::from)
}

/// Reopens an existing job, replaying its event log to rebuild state.
///
/// # Errors
///
/// Returns [`GaitError::Job`] if the directory cannot be locked or a
/// stored event fails to parse.
pub fn inspect(ctx: &CoreContext, job_id: JobId) -> Result<JobState, GaitError> {
    let runtime = JobRuntime::open(&ctx.config().state_dir.join("jobs"), job_id).map_err(GaitError::from)?;
    Ok(runtime.state().clone())
}

/// Reopens an existing job for mutation via [`JobRuntime::update`].
///
/// # Errors
///
/// Returns [`GaitError::Job`] under the same conditions as [`inspect`].
pub fn open(ctx: &CoreContext, job_id: JobId) -> Result<JobRuntime, GaitError> {
    JobRuntime::open(&ctx.config().state_dir.join("jobs"), job_id).map_err(GaitError::from)
}

/// Surfaced so callers can match on [`JobError`] without depending on
/// `gait-jobs` directly.
pub type JobUpdateError = JobError;

#[cfg(test)]
mod tests {
    use gait_core::CoreConfig;
    use gait_core::Profile;
    use gait_jobs::JobCommand;
    use gait_jobs::JobStatus;

    use super::*;

    fn ctx(dir: &std::path::Path) -> CoreContext {
        let config = CoreConfig { profile: Profile::Dev, signing_key_path: None, state_dir: dir.to_path_buf() };
        CoreContext::new(config).unwrap()
    }

    #[test]
    fn submit_then_inspect_round_trips_job_state() {
        let dir = tempfile::tempdir().unwrap();
        let context = ctx(dir.path());
        let job_id = JobId::new("job-1");
        submit(&context, job_id.clone(), serde_json::json!({ "task": "migrate" }), Vec::new()).unwrap();
        let state = inspect(&context, job_id).unwrap();
        assert_eq!(state.status, JobStatus::Submitted);
    }

    #[test]
    fn reopened_job_accepts_lease_acquisition() {
        let dir = tempfile::tempdir().unwrap();
        let context = ctx(dir.path());
        let job_id = JobId::new("job-2");
        submit(&context, job_id.clone(), serde_json::json!({}), Vec::new()).unwrap();
        let mut runtime = open(&context, job_id).unwrap();
        let state = runtime
            .update(JobCommand::AcquireLease {
                lease_id: gait_core::LeaseId::new("lease-1"),
                worker_id: "worker-1".to_owned(),
                expires_at: gait_core::Timestamp::parse("2099-01-01T00:00:00Z").unwrap(),
            })
            .unwrap();
        assert_eq!(state.status, JobStatus::Leased);
    }
}
