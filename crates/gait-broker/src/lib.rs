// crates/gait-broker/src/lib.rs
// ============================================================================
// Module: Gait Broker
// Description: Provider-agnostic credential/evidence broker protocol.
// Purpose: Give policy evaluation and context assembly one capability
//          interface for pulling external values, without binding the
//          decision path to any one provider backend.
// Dependencies: gait-core, reqwest, serde_json
// ============================================================================

//! ## Overview
//! `gait-broker` defines the *protocol* a credential or evidence lookup
//! speaks, not the backends that answer it. The broker protocol is the
//! in-scope surface; concrete provider backends beyond the two reference
//! implementations here ([`EnvBroker`], [`HttpBroker`]) are external
//! collaborators per the broker's own access policy.
//!
//! A [`BrokerRegistry`] dispatches [`BrokerRequest`]s to registered
//! [`CredentialBroker`] implementations by `provider_id`, enforcing an
//! allowlist/denylist before ever reaching a backend. The registry itself
//! implements [`CredentialBroker`], so callers never need to distinguish
//! "a single broker" from "a registry of brokers".

pub mod env;
pub mod http;

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

pub use env::EnvBroker;
pub use env::EnvBrokerConfig;
pub use http::HttpBroker;
pub use http::HttpBrokerConfig;

// ============================================================================
// SECTION: Request / Response Shapes
// ============================================================================

/// A single broker lookup request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerRequest {
    /// Identifies which registered broker should serve this request.
    pub provider_id: String,
    /// Names which operation the broker should perform (e.g. `"get"`,
    /// `"status"`, `"body_hash"`). Closed per broker implementation.
    pub check_id: String,
    /// Operation-specific parameters, opaque to the registry.
    pub params: Option<Value>,
}

/// Anchors a resolved credential to the external thing it came from, so
/// a trace record can cite provenance without embedding the secret
/// value itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceAnchor {
    /// The kind of anchor (`"env"`, `"url"`, …).
    pub anchor_type: String,
    /// The anchor's value (an env key, a URL, …), never the resolved
    /// secret or response body.
    pub anchor_value: String,
}

/// A resolved credential or evidence value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerCredential {
    /// The resolved value, or `None` when the lookup target does not
    /// exist (a missing env var, a provider with no opinion).
    pub value: Option<Value>,
    /// Where the value came from.
    pub anchor: EvidenceAnchor,
    /// MIME type of `value`, when known.
    pub content_type: Option<String>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while resolving a broker request.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BrokerError {
    /// No broker is registered under the requested `provider_id`.
    #[error("broker not registered: {0}")]
    NotRegistered(String),
    /// The request was rejected by the registry's access policy before
    /// reaching any broker implementation.
    #[error("broker blocked by policy: {0}")]
    Blocked(String),
    /// A registered broker rejected or failed to resolve the request.
    #[error("broker request failed: {0}")]
    Provider(String),
}

// ============================================================================
// SECTION: Broker Trait
// ============================================================================

/// Resolves a [`BrokerRequest`] into a [`BrokerCredential`]. Implementors
/// are evidence/credential provider backends; they are assumed untrusted
/// input sources and must fail closed on ambiguous requests.
pub trait CredentialBroker: Send + Sync {
    /// Resolves `request`.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Provider`] when the request cannot be
    /// resolved (unsupported `check_id`, malformed params, or a backend
    /// failure).
    fn resolve(&self, request: &BrokerRequest) -> Result<BrokerCredential, BrokerError>;
}

// ============================================================================
// SECTION: Access Policy
// ============================================================================

/// Access policy controlling which registered brokers may be queried.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrokerAccessPolicy {
    /// Optional allowlist of provider identifiers. `None` permits every
    /// non-denied provider.
    pub allowlist: Option<BTreeSet<String>>,
    /// Explicit denylist; always takes precedence over the allowlist.
    pub denylist: BTreeSet<String>,
}

impl BrokerAccessPolicy {
    /// Returns a policy that permits every registered broker.
    #[must_use]
    pub const fn allow_all() -> Self {
        Self { allowlist: None, denylist: BTreeSet::new() }
    }

    /// Returns `true` when `provider_id` is permitted by this policy.
    #[must_use]
    pub fn is_allowed(&self, provider_id: &str) -> bool {
        if self.denylist.contains(provider_id) {
            return false;
        }
        match &self.allowlist {
            Some(allowlist) => allowlist.contains(provider_id),
            None => true,
        }
    }
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Routes [`BrokerRequest`]s to registered [`CredentialBroker`]
/// implementations by `provider_id`, enforcing [`BrokerAccessPolicy`] on
/// every call.
pub struct BrokerRegistry {
    brokers: BTreeMap<String, Box<dyn CredentialBroker>>,
    policy: BrokerAccessPolicy,
}

impl BrokerRegistry {
    /// Creates an empty registry under `policy`.
    #[must_use]
    pub fn new(policy: BrokerAccessPolicy) -> Self {
        Self { brokers: BTreeMap::new(), policy }
    }

    /// Registers `broker` under `provider_id`.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Provider`] if `provider_id` is already
    /// registered.
    pub fn register(
        &mut self,
        provider_id: impl Into<String>,
        broker: impl CredentialBroker + 'static,
    ) -> Result<(), BrokerError> {
        let provider_id = provider_id.into();
        if self.brokers.contains_key(&provider_id) {
            return Err(BrokerError::Provider(format!("broker already registered: {provider_id}")));
        }
        self.brokers.insert(provider_id, Box::new(broker));
        Ok(())
    }

    /// Returns the configured access policy.
    #[must_use]
    pub const fn policy(&self) -> &BrokerAccessPolicy {
        &self.policy
    }
}

impl CredentialBroker for BrokerRegistry {
    fn resolve(&self, request: &BrokerRequest) -> Result<BrokerCredential, BrokerError> {
        if !self.policy.is_allowed(&request.provider_id) {
            return Err(BrokerError::Blocked(request.provider_id.clone()));
        }
        let broker = self
            .brokers
            .get(&request.provider_id)
            .ok_or_else(|| BrokerError::NotRegistered(request.provider_id.clone()))?;
        broker.resolve(request)
    }
}
