// crates/gait-core/src/time.rs
// ============================================================================
// Module: Timestamp
// Description: RFC 3339 wall-clock timestamp wrapper.
// Purpose: Carry human-readable time without it ever entering a digest.
// Dependencies: time
// ============================================================================

//! ## Overview
//! `Timestamp` exists purely for humans and log readers. No canonical
//! digest in Gait ever includes one: two runs of the same intent
//! against the same policy must produce the same `intent_digest` and
//! `policy_digest` regardless of wall-clock skew between them, so
//! timestamps are carried as metadata alongside records, never inside
//! the hashed payload.

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Errors raised while parsing or formatting a [`Timestamp`].
#[derive(Debug, Error)]
pub enum TimestampError {
    /// The input string was not valid RFC 3339.
    #[error("invalid RFC 3339 timestamp: {0}")]
    Parse(String),
}

/// A wall-clock timestamp serialized as an RFC 3339 string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp(OffsetDateTime);

impl Timestamp {
    /// Builds a `Timestamp` from an existing `OffsetDateTime`.
    #[must_use]
    pub fn from_offset_date_time(value: OffsetDateTime) -> Self {
        Self(value)
    }

    /// Returns the current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        Self(OffsetDateTime::now_utc())
    }

    /// Parses an RFC 3339 timestamp string.
    ///
    /// # Errors
    ///
    /// Returns [`TimestampError::Parse`] when `value` is not valid
    /// RFC 3339.
    pub fn parse(value: &str) -> Result<Self, TimestampError> {
        OffsetDateTime::parse(value, &Rfc3339)
            .map(Self)
            .map_err(|err| TimestampError::Parse(err.to_string()))
    }

    /// Formats the timestamp as an RFC 3339 string.
    ///
    /// # Errors
    ///
    /// Returns [`TimestampError::Parse`] if the underlying formatter
    /// fails, which only happens for out-of-range dates.
    pub fn to_rfc3339(self) -> Result<String, TimestampError> {
        self.0
            .format(&Rfc3339)
            .map_err(|err| TimestampError::Parse(err.to_string()))
    }

    /// Returns the underlying `OffsetDateTime`.
    #[must_use]
    pub fn into_offset_date_time(self) -> OffsetDateTime {
        self.0
    }
}

impl Serialize for Timestamp {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let formatted = self.0.format(&Rfc3339).map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&formatted)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Timestamp::parse(&raw).map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0.format(&Rfc3339) {
            Ok(formatted) => f.write_str(&formatted),
            Err(_) => f.write_str("<invalid-timestamp>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_format_round_trip() {
        let raw = "2026-07-28T12:00:00Z";
        let parsed = Timestamp::parse(raw).unwrap();
        assert_eq!(parsed.to_rfc3339().unwrap(), "2026-07-28T12:00:00Z");
    }

    #[test]
    fn rejects_non_rfc3339_input() {
        assert!(Timestamp::parse("not-a-timestamp").is_err());
    }

    #[test]
    fn serde_round_trips_through_json() {
        let parsed = Timestamp::parse("2026-07-28T12:00:00Z").unwrap();
        let encoded = serde_json::to_string(&parsed).unwrap();
        let decoded: Timestamp = serde_json::from_str(&encoded).unwrap();
        assert_eq!(parsed, decoded);
    }
}
