// crates/gait/src/regress.rs
// ============================================================================
// Module: Facade Regress
// Description: Fixture-directory conventions layered on gait-regress.
// Purpose: Root fixtures at the persisted state layout spec.md §6
//          declares (`regress/`).
// Dependencies: gait-regress, crate::{CoreContext, GaitError}
// ============================================================================

//! ## Overview
//! [`gait_regress::run`] and [`gait_regress::grade`] are pure functions
//! of fixture bytes and need no context; this module's [`init`] and
//! [`load_fixture`] only add the directory convention so a caller does
//! not have to derive `${state_dir}/regress` themselves.

use gait_regress::Fixture;
use gait_regress::FixtureConfig;
use gait_regress::RegressError;

use crate::CoreContext;
use crate::GaitError;

/// Seals a new fixture named `run_id` under `ctx`'s regress directory.
///
/// # Errors
///
/// Returns [`GaitError::Regress`] if the fixture directory cannot be
/// created or written.
pub fn init(ctx: &CoreContext, run_id: &str, pinned_pack: &[u8], config: FixtureConfig) -> Result<Fixture, GaitError> {
    gait_regress::init(&ctx.regress_dir(), run_id, pinned_pack, config).map_err(GaitError::from)
}

/// Loads a previously sealed fixture named `name`.
///
/// # Errors
///
/// Returns [`GaitError::Regress`] if the fixture directory or its
/// `gait.yaml` cannot be read.
pub fn load_fixture(ctx: &CoreContext, name: &str) -> Result<Fixture, GaitError> {
    gait_regress::load_fixture(&ctx.regress_dir(), name).map_err(GaitError::from)
}

/// Re-exported for callers that grade or run fixtures directly; these
/// are pure functions and take no [`CoreContext`].
pub use gait_regress::RunInput;
pub use gait_regress::grade;
pub use gait_regress::run;

/// Surfaced so callers can match on [`RegressError`] without depending
/// on `gait-regress` directly.
pub type RegressInitError = RegressError;

#[cfg(test)]
mod tests {
    use gait_core::CoreConfig;
    use gait_core::Profile;
    use gait_core::Timestamp;
    use gait_pack::BuildInput;
    use gait_pack::PackType;
    use std::collections::BTreeMap;

    use super::*;

    fn ctx(dir: &std::path::Path) -> CoreContext {
        let config = CoreConfig { profile: Profile::Dev, signing_key_path: None, state_dir: dir.to_path_buf() };
        CoreContext::new(config).unwrap()
    }

    #[test]
    fn init_then_load_fixture_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let context = ctx(dir.path());
        let mut files = BTreeMap::new();
        files.insert("payload.json".to_owned(), b"{}".to_vec());
        let pack = context
            .build_pack(BuildInput { pack_type: PackType::Run, files, job_id: None, prev_checkpoint_digest: None, generated_at: Timestamp::now() })
            .unwrap();

        let config = FixtureConfig { fixture_name: "smoke".to_owned(), graders: vec![gait_regress::GraderSpec::SchemaConformance] };
        init(&context, "smoke", &pack, config).unwrap();
        let fixture = load_fixture(&context, "smoke").unwrap();
        assert_eq!(fixture.config.fixture_name, "smoke");
    }
}
