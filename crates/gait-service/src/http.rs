// crates/gait-service/src/http.rs
// ============================================================================
// Module: Service HTTP Router
// Description: `/v1/evaluate`, `/v1/evaluate/sse`, and `/v1/evaluate/stream`.
// Purpose: Wrap `evaluate_once` behind three wire formats that render
//          semantically identical verdicts and share one status-mapping
//          rule.
// Dependencies: gait-service::{evaluate_once, ServiceState}, axum, tokio
// ============================================================================

//! ## Overview
//! All three routes accept the same [`crate::EvaluateRequest`] body and
//! call [`crate::evaluate_once`] exactly once. They differ only in how
//! the resulting [`crate::EvaluateResponse`] is framed on the wire:
//! `/v1/evaluate` returns one JSON object, `/v1/evaluate/sse` returns
//! one Server-Sent Event, `/v1/evaluate/stream` returns one
//! newline-delimited JSON line. In `strict` mode a non-`allow`,
//! non-`dry_run` verdict maps to a non-`2xx` HTTP status while the JSON
//! payload itself is unchanged either way.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::DefaultBodyLimit;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::http::header::AUTHORIZATION;
use axum::http::header::CONTENT_LENGTH;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::response::Sse;
use axum::response::sse::Event;
use axum::routing::post;
use tokio_stream::Stream;

use crate::EvaluateRequest;
use crate::EvaluateResponse;
use crate::MAX_BODY_BYTES;
use crate::ServiceError;
use crate::ServiceState;
use crate::auth;
use crate::evaluate_once;

// ============================================================================
// SECTION: Service Configuration
// ============================================================================

/// Bind and auth configuration for one running service instance.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address the service listens on.
    pub bind_addr: SocketAddr,
    /// Bearer token required on every request when set. Required by
    /// [`auth::require_auth_for_non_loopback`] whenever `bind_addr`
    /// is not loopback.
    pub bearer_token: Option<String>,
}

/// State shared across every route: the evaluator plus the auth token
/// requests are checked against.
struct Shared {
    service: Arc<ServiceState>,
    bearer_token: Option<String>,
}

// ============================================================================
// SECTION: Router
// ============================================================================

/// Builds the evaluation router. Does not bind a listener; see
/// [`serve`].
#[must_use]
pub fn router(service: Arc<ServiceState>, bearer_token: Option<String>) -> Router {
    let shared = Arc::new(Shared { service, bearer_token });
    Router::new()
        .route("/v1/evaluate", post(evaluate_json))
        .route("/v1/evaluate/sse", post(evaluate_sse))
        .route("/v1/evaluate/stream", post(evaluate_ndjson))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(shared)
}

/// Binds `config.bind_addr` and serves the evaluation router until the
/// process is terminated.
///
/// # Errors
///
/// Returns [`ServiceError::NonLoopbackRequiresAuth`] if `config.bind_addr`
/// is not loopback and no bearer token is configured, or
/// [`ServiceError::Io`] if binding the listener fails.
pub async fn serve(config: ServiceConfig, service: Arc<ServiceState>) -> Result<(), ServiceError> {
    auth::require_auth_for_non_loopback(&config.bind_addr, config.bearer_token.as_deref())?;
    let app = router(service, config.bearer_token);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await.map_err(ServiceError::Io)?;
    axum::serve(listener, app).await.map_err(ServiceError::Io)
}

// ============================================================================
// SECTION: Shared Request Handling
// ============================================================================

/// Rejects a declared `Content-Length` over [`MAX_BODY_BYTES`] before a
/// single byte of the body is parsed. A second, independent layer
/// behind axum's own [`DefaultBodyLimit`], which this guards in case a
/// caller's proxy strips or rewrites that layer.
fn check_content_length(headers: &HeaderMap) -> Result<(), ServiceError> {
    let declared = headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<usize>().ok());
    match declared {
        Some(size) if size > MAX_BODY_BYTES => Err(ServiceError::BodyTooLarge),
        _ => Ok(()),
    }
}

/// Checks the caller's bearer token, when one is configured, then
/// evaluates `request`.
fn authorize_and_evaluate(shared: &Shared, headers: &HeaderMap, request: EvaluateRequest) -> Result<EvaluateResponse, ServiceError> {
    check_content_length(headers)?;
    if let Some(expected) = &shared.bearer_token {
        let presented = headers.get(AUTHORIZATION).and_then(|value| value.to_str().ok());
        auth::check_bearer(presented, expected)?;
    }
    evaluate_once(&shared.service, request)
}

/// Maps a rendered verdict to an HTTP status under `strict` mode;
/// non-`strict` mode always reports `200`.
fn status_for(strict: bool, response: &EvaluateResponse) -> StatusCode {
    if !strict || response.is_successful() {
        return StatusCode::OK;
    }
    match response.verdict {
        gait_policy::VerdictKind::RequireApproval => StatusCode::PRECONDITION_REQUIRED,
        gait_policy::VerdictKind::Block => StatusCode::FORBIDDEN,
        gait_policy::VerdictKind::Allow | gait_policy::VerdictKind::DryRun => StatusCode::OK,
    }
}

/// Maps a [`ServiceError`] to its HTTP status, preserving a structured
/// JSON body for every failure.
fn error_response(error: &ServiceError) -> Response {
    let status = match error {
        ServiceError::Unauthorized => StatusCode::UNAUTHORIZED,
        ServiceError::BodyTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        ServiceError::InvalidIntent(_) => StatusCode::BAD_REQUEST,
        ServiceError::ApprovalInvalid(_) | ServiceError::DelegationInvalid(_) => StatusCode::FORBIDDEN,
        ServiceError::NonLoopbackRequiresAuth | ServiceError::Trace(_) | ServiceError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(serde_json::json!({ "error": error.to_string() }))).into_response()
}

// ============================================================================
// SECTION: Route Handlers
// ============================================================================

/// `POST /v1/evaluate` — returns the rendered verdict as one JSON body.
async fn evaluate_json(State(shared): State<Arc<Shared>>, headers: HeaderMap, Json(request): Json<EvaluateRequest>) -> Response {
    match authorize_and_evaluate(&shared, &headers, request) {
        Ok(response) => {
            let status = status_for(shared.service.strict, &response);
            (status, Json(response)).into_response()
        }
        Err(error) => error_response(&error),
    }
}

/// `POST /v1/evaluate/sse` — returns the rendered verdict as a single
/// Server-Sent Event.
async fn evaluate_sse(State(shared): State<Arc<Shared>>, headers: HeaderMap, Json(request): Json<EvaluateRequest>) -> Response {
    match authorize_and_evaluate(&shared, &headers, request) {
        Ok(response) => {
            let payload = serde_json::to_string(&response).unwrap_or_else(|_| "{}".to_owned());
            let stream: std::pin::Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>> =
                Box::pin(tokio_stream::once(Ok(Event::default().event("result").data(payload))));
            Sse::new(stream).into_response()
        }
        Err(error) => error_response(&error),
    }
}

/// `POST /v1/evaluate/stream` — returns the rendered verdict as one
/// newline-delimited JSON line.
async fn evaluate_ndjson(State(shared): State<Arc<Shared>>, headers: HeaderMap, Json(request): Json<EvaluateRequest>) -> Response {
    match authorize_and_evaluate(&shared, &headers, request) {
        Ok(response) => {
            let status = status_for(shared.service.strict, &response);
            let mut payload = serde_json::to_vec(&response).unwrap_or_else(|_| b"{}".to_vec());
            payload.push(b'\n');
            (status, [("content-type", "application/x-ndjson")], Bytes::from(payload)).into_response()
        }
        Err(error) => error_response(&error),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use gait_core::Profile;
    use gait_core::signer::DevSigner;
    use gait_policy::Policy;

    use super::*;

    fn shared_state(yaml: &str, strict: bool) -> (Arc<ServiceState>, tempfile::TempDir) {
        let policy = Policy::load_str(yaml).unwrap();
        policy.validate().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let state = ServiceState::new(policy, Profile::Dev, Vec::new(), Box::new(DevSigner::generate()), dir.path(), strict).unwrap();
        (Arc::new(state), dir)
    }

    fn allow_response() -> EvaluateResponse {
        let (state, _dir) = shared_state("rules: []\ndefault_verdict: allow\n", true);
        let request = EvaluateRequest {
            intent: gait_intent::IntentRequest {
                tool: "fs.read".to_owned(),
                args: std::collections::BTreeMap::new(),
                targets: Vec::new(),
                context: gait_intent::IntentContext {
                    identity: "agent-1".to_owned(),
                    workspace: "repo-a".to_owned(),
                    risk_class: "low".to_owned(),
                    session_id: gait_core::SessionId::new("sess-1"),
                    delegation_chain: Vec::new(),
                    context_evidence_digest: None,
                },
                provenance: std::collections::BTreeMap::new(),
                transport: None,
            },
            approval_token: None,
            delegation_token: None,
            context: None,
        };
        evaluate_once(&state, request).unwrap()
    }

    #[test]
    fn non_strict_mode_always_reports_ok() {
        let response = allow_response();
        assert_eq!(status_for(false, &response), StatusCode::OK);
    }

    #[test]
    fn strict_mode_maps_allow_to_ok() {
        let response = allow_response();
        assert_eq!(status_for(true, &response), StatusCode::OK);
    }

    #[test]
    fn non_loopback_bind_without_bearer_token_is_rejected_before_serving() {
        let addr: SocketAddr = "0.0.0.0:0".parse().unwrap();
        let err = auth::require_auth_for_non_loopback(&addr, None).unwrap_err();
        assert!(matches!(err, ServiceError::NonLoopbackRequiresAuth));
    }

    #[test]
    fn oversized_content_length_is_rejected_before_evaluation() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, (MAX_BODY_BYTES + 1).to_string().parse().unwrap());
        assert!(matches!(check_content_length(&headers), Err(ServiceError::BodyTooLarge)));
    }

    #[test]
    fn content_length_within_limit_is_accepted() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, "128".parse().unwrap());
        assert!(check_content_length(&headers).is_ok());
    }
}
