// crates/gait-service/src/auth.rs
// ============================================================================
// Module: Service Auth
// Description: Bearer-token auth and the loopback-bind fail-closed rule.
// Purpose: Enforce spec.md §6's "non-loopback bind requires bearer-token
//          auth" boundary before a single route is ever registered.
// Dependencies: gait-service::ServiceError
// ============================================================================

//! ## Overview
//! Two checks, both fail-closed: [`require_auth_for_non_loopback`] runs
//! once at startup and refuses to bind a non-loopback address without a
//! configured bearer token; [`check_bearer`] runs per-request and
//! compares a caller's `Authorization` header against that token.
//! Neither check ever degrades to a warning — a misconfigured bind is a
//! refusal to start, not a logged risk.

use std::net::SocketAddr;

use crate::ServiceError;

/// Returns `true` if `addr` is bound to a loopback interface.
#[must_use]
pub fn is_loopback(addr: &SocketAddr) -> bool {
    addr.ip().is_loopback()
}

/// Enforces that a non-loopback bind address carries a configured
/// bearer token.
///
/// # Errors
///
/// Returns [`ServiceError::NonLoopbackRequiresAuth`] if `addr` is not
/// loopback and `bearer_token` is `None`.
pub fn require_auth_for_non_loopback(addr: &SocketAddr, bearer_token: Option<&str>) -> Result<(), ServiceError> {
    if !is_loopback(addr) && bearer_token.is_none() {
        return Err(ServiceError::NonLoopbackRequiresAuth);
    }
    Ok(())
}

/// Validates a request's `Authorization` header against the
/// configured bearer token.
///
/// # Errors
///
/// Returns [`ServiceError::Unauthorized`] if the header is absent,
/// malformed, or does not match `expected`.
pub fn check_bearer(header_value: Option<&str>, expected: &str) -> Result<(), ServiceError> {
    let presented = header_value
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(ServiceError::Unauthorized)?;
    if constant_time_eq(presented.as_bytes(), expected.as_bytes()) {
        Ok(())
    } else {
        Err(ServiceError::Unauthorized)
    }
}

/// Compares two byte strings in time independent of where they first
/// differ, so a bearer-token check cannot be timed to leak a prefix
/// match.
fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    let mut diff = 0_u8;
    for (a, b) in left.iter().zip(right.iter()) {
        diff |= a ^ b;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_addresses_are_recognized() {
        let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        assert!(is_loopback(&addr));
        let addr: SocketAddr = "[::1]:8080".parse().unwrap();
        assert!(is_loopback(&addr));
    }

    #[test]
    fn non_loopback_bind_without_token_is_refused() {
        let addr: SocketAddr = "0.0.0.0:8080".parse().unwrap();
        assert!(matches!(
            require_auth_for_non_loopback(&addr, None),
            Err(ServiceError::NonLoopbackRequiresAuth)
        ));
        assert!(require_auth_for_non_loopback(&addr, Some("secret")).is_ok());
    }

    #[test]
    fn loopback_bind_never_requires_a_token() {
        let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        assert!(require_auth_for_non_loopback(&addr, None).is_ok());
    }

    #[test]
    fn bearer_check_matches_exact_token_only() {
        assert!(check_bearer(Some("Bearer secret"), "secret").is_ok());
        assert!(check_bearer(Some("Bearer wrong"), "secret").is_err());
        assert!(check_bearer(Some("secret"), "secret").is_err());
        assert!(check_bearer(None, "secret").is_err());
    }
}
