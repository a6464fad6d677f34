// crates/gait-core/src/lib.rs
// ============================================================================
// Module: Gait Core Library
// Description: Canonicalization, signing, identifiers, time, and config.
// Purpose: Shared leaf-level primitives used by every other Gait component.
// Dependencies: crate::{hashing, signer, ids, time, config}
// ============================================================================

//! ## Overview
//! `gait-core` provides the primitives every other component hashes,
//! signs, or identifies things through: RFC 8785 canonical JSON and
//! SHA-256 digests, an Ed25519 signer with dev/prod key modes, opaque
//! newtype identifiers, a wall-clock `Timestamp` wrapper used only for
//! human-readable fields, and profile/config loading.
//!
//! Nothing in this crate performs I/O except `signer::ProdSigner::load`
//! and `config::CoreConfig::load`; everything else is pure and safely
//! callable from any thread without coordination.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod hashing;
pub mod ids;
pub mod signer;
pub mod time;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::CoreConfig;
pub use config::ConfigError;
pub use config::Profile;
pub use hashing::DEFAULT_HASH_ALGORITHM;
pub use hashing::HashAlgorithm;
pub use hashing::HashDigest;
pub use hashing::HashError;
pub use hashing::canonical_json_bytes;
pub use hashing::hash_bytes;
pub use hashing::hash_canonical_json;
pub use ids::ApprovalId;
pub use ids::CorrelationId;
pub use ids::DelegationId;
pub use ids::EventId;
pub use ids::JobId;
pub use ids::LeaseId;
pub use ids::PolicyId;
pub use ids::SessionId;
pub use ids::TraceId;
pub use signer::DevSigner;
pub use signer::KeyId;
pub use signer::ProdSigner;
pub use signer::SignatureEnvelope;
pub use signer::Signer;
pub use signer::SignerError;
pub use signer::verify_with_key;
pub use time::Timestamp;
