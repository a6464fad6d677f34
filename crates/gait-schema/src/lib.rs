// crates/gait-schema/src/lib.rs
// ============================================================================
// Module: Gait Schema
// Description: Draft 2020-12 JSON schema validation for Gait artifacts.
// Purpose: Give pack manifests, tokens, and trace records one shared,
//          versioned validation surface.
// Dependencies: jsonschema, serde_json
// ============================================================================

//! ## Overview
//! Schemas are embedded as `&'static str` under a versioned directory
//! (`schemas/v1/*.json`) so validation never depends on a file being
//! present at runtime. Compatibility rule: within a major schema
//! version, changes are additive only; readers tolerate unknown
//! fields, and producers only emit additive fields a versioned
//! contract already permits. Compiled validators are cached per
//! [`SchemaId`] the first time they're needed.

use std::sync::OnceLock;

use jsonschema::Draft;
use jsonschema::Validator;
use serde_json::Value;
use thiserror::Error;

/// Identifies a built-in, versioned Gait schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SchemaId {
    /// `RunpackManifest` (`pack_type = "run"`).
    RunpackManifest,
    /// `JobpackManifest` (`pack_type = "job"`).
    JobpackManifest,
    /// `TraceRecord`.
    TraceRecord,
    /// `ContextEnvelope`.
    ContextEnvelope,
    /// `ApprovalToken`.
    ApprovalToken,
    /// `DelegationToken`.
    DelegationToken,
}

impl SchemaId {
    /// Returns the embedded schema source for this id.
    #[must_use]
    pub const fn source(self) -> &'static str {
        match self {
            SchemaId::RunpackManifest => include_str!("schemas/v1/runpack_manifest.schema.json"),
            SchemaId::JobpackManifest => include_str!("schemas/v1/jobpack_manifest.schema.json"),
            SchemaId::TraceRecord => include_str!("schemas/v1/trace_record.schema.json"),
            SchemaId::ContextEnvelope => include_str!("schemas/v1/context_envelope.schema.json"),
            SchemaId::ApprovalToken => include_str!("schemas/v1/approval_token.schema.json"),
            SchemaId::DelegationToken => include_str!("schemas/v1/delegation_token.schema.json"),
        }
    }

    /// Returns the stable name used in error messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            SchemaId::RunpackManifest => "runpack_manifest",
            SchemaId::JobpackManifest => "jobpack_manifest",
            SchemaId::TraceRecord => "trace_record",
            SchemaId::ContextEnvelope => "context_envelope",
            SchemaId::ApprovalToken => "approval_token",
            SchemaId::DelegationToken => "delegation_token",
        }
    }

    /// Returns the process-wide cache cell backing this schema id.
    fn validator_cell(self) -> &'static OnceLock<Validator> {
        static RUNPACK_MANIFEST: OnceLock<Validator> = OnceLock::new();
        static JOBPACK_MANIFEST: OnceLock<Validator> = OnceLock::new();
        static TRACE_RECORD: OnceLock<Validator> = OnceLock::new();
        static CONTEXT_ENVELOPE: OnceLock<Validator> = OnceLock::new();
        static APPROVAL_TOKEN: OnceLock<Validator> = OnceLock::new();
        static DELEGATION_TOKEN: OnceLock<Validator> = OnceLock::new();
        match self {
            SchemaId::RunpackManifest => &RUNPACK_MANIFEST,
            SchemaId::JobpackManifest => &JOBPACK_MANIFEST,
            SchemaId::TraceRecord => &TRACE_RECORD,
            SchemaId::ContextEnvelope => &CONTEXT_ENVELOPE,
            SchemaId::ApprovalToken => &APPROVAL_TOKEN,
            SchemaId::DelegationToken => &DELEGATION_TOKEN,
        }
    }

    /// Returns the compiled validator, compiling and caching it on
    /// first use.
    ///
    /// # Panics
    ///
    /// Panics if an embedded schema fails to compile. This can only
    /// happen from a programming error in a schema file shipped with
    /// this crate, never from caller input.
    fn validator(self) -> &'static Validator {
        self.validator_cell().get_or_init(|| {
            let parsed: Value = serde_json::from_str(self.source())
                .unwrap_or_else(|err| panic!("embedded schema {} is not valid json: {err}", self.name()));
            jsonschema::options()
                .with_draft(Draft::Draft202012)
                .build(&parsed)
                .unwrap_or_else(|err| panic!("embedded schema {} failed to compile: {err}", self.name()))
        })
    }
}

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// JSON Pointer-style path to the offending value.
    pub path: String,
    /// Human-readable description of the failure.
    pub message: String,
}

/// Errors raised while validating a document against a schema.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// The document failed validation against the named schema.
    #[error("document invalid against schema {schema}: {} error(s)", .errors.len())]
    Invalid {
        /// Schema that rejected the document.
        schema: &'static str,
        /// Per-field failures, in the order `jsonschema` reported them.
        errors: Vec<FieldError>,
    },
}

/// Validates `value` against the schema identified by `schema_id`.
///
/// # Errors
///
/// Returns [`SchemaError::Invalid`] with one [`FieldError`] per
/// violated constraint.
pub fn validate(schema_id: SchemaId, value: &Value) -> Result<(), SchemaError> {
    let validator = schema_id.validator();
    let errors: Vec<FieldError> = validator
        .iter_errors(value)
        .map(|err| FieldError {
            path: err.instance_path.to_string(),
            message: err.to_string(),
        })
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(SchemaError::Invalid {
            schema: schema_id.name(),
            errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn every_embedded_schema_compiles() {
        for id in [
            SchemaId::RunpackManifest,
            SchemaId::JobpackManifest,
            SchemaId::TraceRecord,
            SchemaId::ContextEnvelope,
            SchemaId::ApprovalToken,
            SchemaId::DelegationToken,
        ] {
            let _ = id.validator();
        }
    }

    #[test]
    fn valid_trace_record_passes() {
        let value = json!({
            "trace_id": "abc",
            "event_id": "def",
            "observed_at": "2026-07-28T12:00:00Z",
            "intent_digest": { "algorithm": "sha256", "value": "aa" },
            "policy_digest": { "algorithm": "sha256", "value": "bb" },
            "verdict": "allow",
            "reason_codes": ["ok"],
            "violations": []
        });
        validate(SchemaId::TraceRecord, &value).unwrap();
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let value = json!({ "trace_id": "abc" });
        let err = validate(SchemaId::TraceRecord, &value).unwrap_err();
        match err {
            SchemaError::Invalid { schema, errors } => {
                assert_eq!(schema, "trace_record");
                assert!(!errors.is_empty());
            }
        }
    }

    #[test]
    fn wrong_verdict_enum_value_is_rejected() {
        let value = json!({
            "trace_id": "abc",
            "event_id": "def",
            "observed_at": "2026-07-28T12:00:00Z",
            "intent_digest": {},
            "policy_digest": {},
            "verdict": "maybe",
            "reason_codes": [],
            "violations": []
        });
        assert!(validate(SchemaId::TraceRecord, &value).is_err());
    }

    #[test]
    fn additional_unknown_fields_are_tolerated() {
        let value = json!({
            "trace_id": "abc",
            "event_id": "def",
            "observed_at": "2026-07-28T12:00:00Z",
            "intent_digest": {},
            "policy_digest": {},
            "verdict": "allow",
            "reason_codes": [],
            "violations": [],
            "future_field": "ignored-by-this-major-version"
        });
        validate(SchemaId::TraceRecord, &value).unwrap();
    }
}
