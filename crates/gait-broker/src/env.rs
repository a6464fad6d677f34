// crates/gait-broker/src/env.rs
// ============================================================================
// Module: Environment Credential Broker
// Description: Broker backend resolving values from the process environment.
// Purpose: Reference implementation for testing and demo fixtures.
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! [`EnvBroker`] resolves values from the process environment (or, for
//! deterministic tests, from an explicit override map). It enforces
//! allowlist/denylist policy and hard key/value size limits before ever
//! touching `std::env`, so a misconfigured policy fails closed rather
//! than silently leaking an unexpected variable.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::Deserialize;
use serde_json::Value;

use crate::BrokerCredential;
use crate::BrokerError;
use crate::BrokerRequest;
use crate::CredentialBroker;
use crate::EvidenceAnchor;

/// Configuration for [`EnvBroker`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EnvBrokerConfig {
    /// Optional allowlist of environment variable keys.
    pub allowlist: Option<BTreeSet<String>>,
    /// Explicit denylist; always takes precedence over the allowlist.
    pub denylist: BTreeSet<String>,
    /// Maximum bytes allowed for a single resolved value.
    pub max_value_bytes: usize,
    /// Maximum bytes allowed for a requested key.
    pub max_key_bytes: usize,
    /// Deterministic override map, consulted before `std::env`. Tests
    /// and demos set this instead of mutating process environment.
    pub overrides: Option<BTreeMap<String, String>>,
}

impl Default for EnvBrokerConfig {
    fn default() -> Self {
        Self {
            allowlist: None,
            denylist: BTreeSet::new(),
            max_value_bytes: 64 * 1024,
            max_key_bytes: 255,
            overrides: None,
        }
    }
}

/// Broker backend for environment variable lookups. Supports only the
/// `"get"` check id.
pub struct EnvBroker {
    config: EnvBrokerConfig,
}

impl EnvBroker {
    /// Creates a new broker under `config`.
    #[must_use]
    pub const fn new(config: EnvBrokerConfig) -> Self {
        Self { config }
    }
}

impl CredentialBroker for EnvBroker {
    fn resolve(&self, request: &BrokerRequest) -> Result<BrokerCredential, BrokerError> {
        if request.check_id != "get" {
            return Err(BrokerError::Provider(format!("unsupported env check: {}", request.check_id)));
        }

        let key = extract_key(request.params.as_ref())?;
        if key.len() > self.config.max_key_bytes {
            return Err(BrokerError::Provider("env key exceeds limit".to_owned()));
        }
        if !is_key_allowed(&self.config, key) {
            return Err(BrokerError::Provider(format!("env key blocked by policy: {key}")));
        }

        if let Some(overrides) = &self.config.overrides {
            return overrides
                .get(key)
                .map_or_else(|| Ok(empty_result(key)), |value| build_value_result(key, value.clone(), self.config.max_value_bytes));
        }

        std::env::var(key).map_or_else(|_| Ok(empty_result(key)), |value| build_value_result(key, value, self.config.max_value_bytes))
    }
}

/// Extracts the requested key from `{"key": "..."}` params.
fn extract_key(params: Option<&Value>) -> Result<&str, BrokerError> {
    let params = params.ok_or_else(|| BrokerError::Provider("env check requires params".to_owned()))?;
    let Value::Object(map) = params else {
        return Err(BrokerError::Provider("env params must be an object".to_owned()));
    };
    let Value::String(key) = map.get("key").ok_or_else(|| BrokerError::Provider("missing env key".to_owned()))? else {
        return Err(BrokerError::Provider("env key must be a string".to_owned()));
    };
    Ok(key)
}

/// Validates `key` against allowlist/denylist policy.
fn is_key_allowed(config: &EnvBrokerConfig, key: &str) -> bool {
    if config.denylist.contains(key) {
        return false;
    }
    match &config.allowlist {
        Some(allowlist) => allowlist.contains(key),
        None => true,
    }
}

/// Builds a populated credential, enforcing the value size limit.
fn build_value_result(key: &str, value: String, max_value_bytes: usize) -> Result<BrokerCredential, BrokerError> {
    if value.len() > max_value_bytes {
        return Err(BrokerError::Provider("env value exceeds limit".to_owned()));
    }
    Ok(BrokerCredential {
        value: Some(Value::String(value)),
        anchor: EvidenceAnchor { anchor_type: "env".to_owned(), anchor_value: key.to_owned() },
        content_type: Some("text/plain".to_owned()),
    })
}

/// Builds an empty credential for a key that resolved to nothing.
fn empty_result(key: &str) -> BrokerCredential {
    BrokerCredential { value: None, anchor: EvidenceAnchor { anchor_type: "env".to_owned(), anchor_value: key.to_owned() }, content_type: None }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(key: &str) -> BrokerRequest {
        BrokerRequest { provider_id: "env".to_owned(), check_id: "get".to_owned(), params: Some(serde_json::json!({"key": key})) }
    }

    #[test]
    fn resolves_from_override_map() {
        let mut overrides = BTreeMap::new();
        overrides.insert("GAIT_TEST_KEY".to_owned(), "value".to_owned());
        let broker = EnvBroker::new(EnvBrokerConfig { overrides: Some(overrides), ..EnvBrokerConfig::default() });
        let credential = broker.resolve(&request("GAIT_TEST_KEY")).unwrap();
        assert_eq!(credential.value, Some(Value::String("value".to_owned())));
    }

    #[test]
    fn missing_key_resolves_to_empty_value() {
        let broker = EnvBroker::new(EnvBrokerConfig { overrides: Some(BTreeMap::new()), ..EnvBrokerConfig::default() });
        let credential = broker.resolve(&request("NOT_SET")).unwrap();
        assert_eq!(credential.value, None);
    }

    #[test]
    fn denylisted_key_is_rejected_even_with_override_present() {
        let mut overrides = BTreeMap::new();
        overrides.insert("SECRET".to_owned(), "value".to_owned());
        let mut config = EnvBrokerConfig { overrides: Some(overrides), ..EnvBrokerConfig::default() };
        config.denylist.insert("SECRET".to_owned());
        let broker = EnvBroker::new(config);
        assert!(broker.resolve(&request("SECRET")).is_err());
    }

    #[test]
    fn oversized_value_is_rejected() {
        let mut overrides = BTreeMap::new();
        overrides.insert("BIG".to_owned(), "x".repeat(16));
        let broker = EnvBroker::new(EnvBrokerConfig { overrides: Some(overrides), max_value_bytes: 4, ..EnvBrokerConfig::default() });
        assert!(broker.resolve(&request("BIG")).is_err());
    }

    #[test]
    fn unsupported_check_id_is_rejected() {
        let broker = EnvBroker::new(EnvBrokerConfig::default());
        let request = BrokerRequest { provider_id: "env".to_owned(), check_id: "list".to_owned(), params: None };
        assert!(broker.resolve(&request).is_err());
    }
}
