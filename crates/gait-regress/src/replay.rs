// crates/gait-regress/src/replay.rs
// ============================================================================
// Module: Gait Regress Replay
// Description: Stub and interlocked real-tool replay of recorded tool calls.
// Purpose: Re-execute a pinned pack's tool calls deterministically, or
//          under an explicit, audited real-tool interlock.
// Dependencies: gait-core, gait-pack
// ============================================================================

//! ## Overview
//! [`replay_stub`] resolves a pack's recorded `intents.jsonl`/
//! `results.jsonl` pairs without invoking any tool, which is the default
//! and is required to be deterministic across repeated invocations.
//! [`replay`] additionally accepts a [`ToolExecutor`] and a
//! [`RealToolInterlock`]; it only dispatches to the executor once every
//! interlock condition holds, and always records, per step, whether that
//! step was executed or stubbed.

use gait_core::HashAlgorithm;
use gait_core::HashDigest;
use gait_core::hash_bytes;
use serde::Deserialize;
use serde::Serialize;

use crate::RegressError;

const INTENTS_FILE: &str = "intents.jsonl";
const RESULTS_FILE: &str = "results.jsonl";
/// Environment variable that must be set (to any value) for real-tool
/// replay to unlock, in addition to the two explicit flags.
pub const REAL_TOOL_ENV_SIGNAL: &str = "GAIT_ALLOW_REAL_TOOL_REPLAY";

// ============================================================================
// SECTION: Replay Mode & Interlock
// ============================================================================

/// Which replay strategy to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplayMode {
    /// Resolve tool calls from recorded results only. Default.
    #[default]
    Stub,
    /// Dispatch to a [`ToolExecutor`] when the interlock is unlocked.
    Real,
}

/// The explicit, multi-flag interlock real-tool replay requires.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealToolInterlock {
    /// Caller-level opt-in flag (e.g. a CLI `--allow-real-tools` switch).
    pub caller_opt_in: bool,
    /// A second, distinct operator acknowledgement (e.g. a config toggle
    /// independent of the caller flag).
    pub operator_ack: bool,
}

impl RealToolInterlock {
    /// Whether every interlock condition holds: both explicit flags and
    /// the [`REAL_TOOL_ENV_SIGNAL`] environment variable.
    #[must_use]
    pub fn is_unlocked(&self) -> bool {
        self.caller_opt_in && self.operator_ack && std::env::var(REAL_TOOL_ENV_SIGNAL).is_ok()
    }
}

/// A caller-supplied real tool dispatcher.
pub trait ToolExecutor {
    /// Executes `tool_name` against the intent digest `args_digest`,
    /// returning the actual result's content digest.
    ///
    /// # Errors
    ///
    /// Returns [`RegressError`] if the tool invocation fails.
    fn execute(&self, tool_name: &str, args_digest: &HashDigest) -> Result<HashDigest, RegressError>;
}

// ============================================================================
// SECTION: Replay Steps
// ============================================================================

/// One replayed step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayStep {
    /// Recorded tool name for this step.
    pub tool_name: String,
    /// Digest of the recorded intent this step replays.
    pub intent_digest: HashDigest,
    /// Digest of the result actually produced by this replay.
    pub result_digest: HashDigest,
    /// `false` for a stub resolution, `true` if a real tool executed.
    pub executed: bool,
}

#[derive(Debug, Deserialize)]
struct IntentRecord {
    tool_name: String,
    intent_digest: HashDigest,
}

#[derive(Debug, Deserialize)]
struct ResultRecord {
    intent_digest: HashDigest,
    result_digest: HashDigest,
}

/// Resolves every recorded intent/result pair in `pack_bytes` from
/// recorded results, without invoking any tool. Deterministic across
/// repeated invocations by construction: it only reads recorded bytes.
///
/// # Errors
///
/// Returns a [`RegressError`] if the pack cannot be opened or its
/// `intents.jsonl`/`results.jsonl` entries fail to parse.
pub fn replay_stub(pack_bytes: &[u8]) -> Result<Vec<ReplayStep>, RegressError> {
    let (_manifest, reader) = gait_pack::open(pack_bytes)?;

    let intents = parse_jsonl::<IntentRecord>(reader.read(INTENTS_FILE).unwrap_or_default())?;
    let results = parse_jsonl::<ResultRecord>(reader.read(RESULTS_FILE).unwrap_or_default())?;

    let mut steps = Vec::with_capacity(intents.len());
    for intent in intents {
        let result = results.iter().find(|result| result.intent_digest == intent.intent_digest);
        let result_digest = result.map_or_else(|| hash_bytes(HashAlgorithm::Sha256, b"missing-result"), |result| result.result_digest.clone());
        steps.push(ReplayStep { tool_name: intent.tool_name, intent_digest: intent.intent_digest, result_digest, executed: false });
    }
    Ok(steps)
}

/// Replays `pack_bytes` under `mode`. In [`ReplayMode::Real`], each step
/// is dispatched to `executor` only once `interlock.is_unlocked()`
/// holds; otherwise every step falls back to the stub resolution from
/// [`replay_stub`], and `executed` is `false` throughout.
///
/// # Errors
///
/// Returns a [`RegressError`] from stub resolution, or from `executor`
/// if real-tool dispatch fails.
pub fn replay(pack_bytes: &[u8], mode: ReplayMode, executor: Option<&dyn ToolExecutor>, interlock: &RealToolInterlock) -> Result<Vec<ReplayStep>, RegressError> {
    let mut steps = replay_stub(pack_bytes)?;
    if matches!(mode, ReplayMode::Real) {
        if let (true, Some(executor)) = (interlock.is_unlocked(), executor) {
            for step in &mut steps {
                step.result_digest = executor.execute(&step.tool_name, &step.intent_digest)?;
                step.executed = true;
            }
        }
    }
    Ok(steps)
}

fn parse_jsonl<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<Vec<T>, RegressError> {
    let mut records = Vec::new();
    for line in bytes.split(|&b| b == b'\n') {
        if line.is_empty() {
            continue;
        }
        let record: T = serde_json::from_slice(line).map_err(|err| RegressError::InvalidConfig(err.to_string()))?;
        records.push(record);
    }
    Ok(records)
}
