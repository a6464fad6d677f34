// crates/gait/src/journal.rs
// ============================================================================
// Module: Facade Journal
// Description: Session-journal conventions layered on gait-journal.
// Purpose: Root every session's journal at the persisted state layout
//          spec.md §6 declares (`sessions/<session_id>/`) and wire
//          checkpoint signing to the context's signer.
// Dependencies: gait-journal, crate::{CoreContext, GaitError}
// ============================================================================

//! ## Overview
//! [`gait_journal::SessionJournal`] already implements `append`,
//! `read_all`, `checkpoint`, `compact`, and `verify_chain` directly; this
//! module only adds the directory convention ([`open`]) and a
//! `checkpoint` wrapper that loads a signer from the owning
//! [`CoreContext`] rather than asking the caller to supply one.

use gait_core::SessionId;
use gait_core::Timestamp;
use gait_journal::JournalOpenOptions;
use gait_journal::SessionJournal;

use crate::CoreContext;
use crate::GaitError;

/// Re-exported so callers need not depend on `gait-journal` directly
/// for the result type [`open`]'s journal exposes via `verify_chain`.
pub use gait_journal::ChainResult;

/// Opens (creating if absent) the journal for `session_id` under
/// `ctx`'s state directory.
///
/// # Errors
///
/// Returns [`GaitError::Journal`] if the journal's advisory lock cannot
/// be acquired or its directory cannot be prepared.
pub fn open(ctx: &CoreContext, session_id: SessionId) -> Result<SessionJournal, GaitError> {
    let dir = ctx.session_dir(&session_id);
    SessionJournal::open(&dir, session_id, JournalOpenOptions::default()).map_err(GaitError::from)
}

/// Seals a checkpoint pack covering `journal`'s records up to
/// `prefix_seq`, signed with a signer freshly loaded from `ctx`.
///
/// # Errors
///
/// Returns [`GaitError::Signer`] if a signer cannot be loaded, or
/// [`GaitError::Journal`] if `prefix_seq` exceeds the journal's last
/// sequence number or pack assembly fails.
pub fn checkpoint(ctx: &CoreContext, journal: &mut SessionJournal, prefix_seq: u64, generated_at: Timestamp) -> Result<Vec<u8>, GaitError> {
    let signer = ctx.signer()?;
    journal.checkpoint(prefix_seq, generated_at, Some(signer.as_ref())).map_err(GaitError::from)
}

#[cfg(test)]
mod tests {
    use gait_core::CoreConfig;
    use gait_core::Profile;

    use super::*;

    #[test]
    fn open_roots_the_journal_under_the_context_state_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = CoreConfig { profile: Profile::Dev, signing_key_path: None, state_dir: dir.path().to_path_buf() };
        let ctx = CoreContext::new(config).unwrap();
        let mut journal = open(&ctx, SessionId::new("sess-journal")).unwrap();
        assert_eq!(journal.last_seq(), 0);
        journal.append(serde_json::json!({ "kind": "noop" })).unwrap();
        assert_eq!(journal.last_seq(), 1);
        assert!(dir.path().join("sessions").join("sess-journal").exists());
    }

    #[test]
    fn checkpoint_signs_with_the_context_signer() {
        let dir = tempfile::tempdir().unwrap();
        let config = CoreConfig { profile: Profile::Dev, signing_key_path: None, state_dir: dir.path().to_path_buf() };
        let ctx = CoreContext::new(config).unwrap();
        let mut journal = open(&ctx, SessionId::new("sess-checkpoint")).unwrap();
        journal.append(serde_json::json!({ "kind": "noop" })).unwrap();
        let pack_bytes = checkpoint(&ctx, &mut journal, 1, Timestamp::now()).unwrap();
        let (manifest, _reader) = gait_pack::open(&pack_bytes).unwrap();
        assert!(manifest.signature.is_some());
    }
}
