//! Request middleware: panic recovery, logging, authentication, metrics.
//!
//! Layer order (outermost first): recovery, logging, auth, metrics.
//! Recovery must stay outermost so it catches panics from every other
//! layer, including auth.

use std::any::Any;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use super::response::{CODE_INTERNAL, CODE_UNAUTHORIZED};
use crate::AppState;

/// Methods reachable without a session.
pub const PUBLIC_METHODS: &[&str] = &["/user/login", "/healthz"];

/// Authenticated caller, injected into request extensions by [`auth`].
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: u64,
    pub token: String,
}

/// Token authentication.
///
/// Requires exactly one non-empty `authorization` value for any method
/// outside the allowlist, resolves it through the session store, and
/// injects [`AuthUser`] before the handler runs. Any failure answers
/// `401` without invoking the handler.
pub async fn auth(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let method = request.uri().path().to_string();
    if PUBLIC_METHODS.contains(&method.as_str()) {
        return next.run(request).await;
    }

    let mut values = request.headers().get_all(AUTHORIZATION).iter();
    let (first, extra) = (values.next(), values.next());
    let token = match (first, extra) {
        (Some(value), None) => match value.to_str() {
            Ok(token) if !token.is_empty() => token.to_string(),
            _ => {
                tracing::warn!(%method, "empty or malformed authorization value");
                return unauthenticated("token must not be empty");
            }
        },
        (None, _) => {
            tracing::warn!(%method, "missing authorization value");
            return unauthenticated("missing token");
        }
        (Some(_), Some(_)) => {
            tracing::warn!(%method, "multiple authorization values");
            return unauthenticated("ambiguous token");
        }
    };

    match state.sessions.validate(&token).await {
        Ok(Some(user_id)) => {
            tracing::debug!(%method, user_id, "token accepted");
            request.extensions_mut().insert(AuthUser { user_id, token });
            next.run(request).await
        }
        Ok(None) => {
            tracing::warn!(%method, "token rejected");
            unauthenticated("token is invalid or expired")
        }
        Err(e) => {
            tracing::error!(error = %e, %method, "session lookup failed");
            unauthenticated("token could not be verified")
        }
    }
}

/// Request logging with error classification.
pub async fn logging(request: Request, next: Next) -> Response {
    let method = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    let duration_ms = start.elapsed().as_millis() as u64;
    let status = response.status();
    if status.is_server_error() {
        tracing::error!(%method, %status, duration_ms, "request failed");
    } else if status.is_client_error() {
        tracing::warn!(%method, %status, duration_ms, "request rejected");
    } else {
        tracing::info!(%method, duration_ms, "request handled");
    }
    response
}

/// Per-method latency and outcome counters.
pub async fn record_metrics(request: Request, next: Next) -> Response {
    let method = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    let outcome = if response.status().is_success() {
        "success"
    } else {
        "failure"
    };
    metrics::counter!("rpc_requests_total", "method" => method.clone(), "outcome" => outcome)
        .increment(1);
    metrics::histogram!("rpc_request_duration_seconds", "method" => method)
        .record(start.elapsed().as_secs_f64());
    response
}

/// Responder for the outermost panic-recovery layer.
pub fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let cause = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "unknown panic".to_string()
    };
    tracing::error!(panic = %cause, "request handler panicked");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "code": CODE_INTERNAL, "message": "internal error" })),
    )
        .into_response()
}

fn unauthenticated(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "code": CODE_UNAUTHORIZED, "message": message })),
    )
        .into_response()
}
