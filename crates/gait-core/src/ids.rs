// crates/gait-core/src/ids.rs
// ============================================================================
// Module: Identifiers
// Description: Opaque newtype identifiers used across Gait components.
// Purpose: Prevent accidental mixing of unrelated string identifiers.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Every identifier Gait hands across a component boundary is a newtype
//! wrapping a `String`, never a bare `String`. This keeps a `JobId`
//! from being passed where a `SessionId` is expected even though both
//! are, at the wire level, plain strings.

use serde::Deserialize;
use serde::Serialize;

/// Declares an opaque, serde-transparent string identifier newtype.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier from an owned string.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Returns the identifier's string form.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consumes the identifier, returning its inner string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Identifies a minted approval token.
    ApprovalId
);
string_id!(
    /// Correlates related records across components (intent, trace,
    /// journal) without implying any hash relationship.
    CorrelationId
);
string_id!(
    /// Identifies a minted delegation token.
    DelegationId
);
string_id!(
    /// Identifies a single emitted trace record.
    EventId
);
string_id!(
    /// Identifies a durable job in the job runtime.
    JobId
);
string_id!(
    /// Identifies a held job lease.
    LeaseId
);
string_id!(
    /// Identifies a loaded policy document.
    PolicyId
);
string_id!(
    /// Identifies a session journal.
    SessionId
);
string_id!(
    /// Deterministic identifier for a decision trace.
    TraceId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip_through_json() {
        let id = JobId::new("job-0001");
        let encoded = serde_json::to_string(&id).unwrap();
        assert_eq!(encoded, "\"job-0001\"");
        let decoded: JobId = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, id);
    }

    #[test]
    fn ids_from_str_and_string_agree() {
        let from_str = SessionId::from("sess-1");
        let from_string = SessionId::from(String::from("sess-1"));
        assert_eq!(from_str, from_string);
    }
}
