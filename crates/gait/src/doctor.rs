// crates/gait/src/doctor.rs
// ============================================================================
// Module: Facade Doctor
// Description: Readiness checks over a context's configuration.
// Purpose: Give callers `doctor.check(profile)` without reaching past
//          the facade into gait-doctor and gait-core directly.
// Dependencies: gait-doctor, crate::CoreContext
// ============================================================================

//! ## Overview
//! [`check`] is a direct pass-through to [`gait_doctor::check`] over
//! the [`CoreContext`]'s own configuration — readiness checks never
//! fail with a [`crate::GaitError`]; an unready deployment is reported
//! in the returned [`gait_doctor::ReadinessReport`], not raised as an
//! error.

use gait_doctor::ReadinessReport;

use crate::CoreContext;

/// Runs every readiness check against `ctx`'s configuration.
#[must_use]
pub fn check(ctx: &CoreContext) -> ReadinessReport {
    gait_doctor::check(ctx.config())
}

#[cfg(test)]
mod tests {
    use gait_core::CoreConfig;
    use gait_core::Profile;

    use super::*;

    #[test]
    fn dev_profile_against_a_writable_dir_is_ready() {
        let dir = tempfile::tempdir().unwrap();
        let config = CoreConfig { profile: Profile::Dev, signing_key_path: None, state_dir: dir.path().to_path_buf() };
        let ctx = CoreContext::new(config).unwrap();
        let report = check(&ctx);
        assert!(report.ready);
    }
}
