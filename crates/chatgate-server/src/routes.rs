use std::time::Duration;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chatgate_auth::{SessionError, TokenIdentifier};
use serde::Deserialize;
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::metrics::render_metrics;
use crate::middleware::{bearer_token, blacklist_middleware, rate_limit_middleware, unauthorized_response};
use crate::state::AppState;

/// Builds the router with the request pipeline:
/// trace → timeout → rate limit → token blacklist → handler.
pub fn build_router(state: AppState) -> Router {
    let request_timeout = state.config.request_timeout();
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/auth/logout", post(logout))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(timeout_layer(request_timeout))
                .layer(from_fn_with_state(state.clone(), rate_limit_middleware))
                .layer(from_fn_with_state(state.clone(), blacklist_middleware)),
        )
        .with_state(state)
}

/// Requests running past `timeout` get 408.
fn timeout_layer(timeout: Duration) -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, timeout)
}

async fn health(State(state): State<AppState>) -> Response {
    let cache = state.cache.health().await;
    let status = if cache.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = json!({
        "status": if cache.healthy { "ok" } else { "degraded" },
        "cache": cache,
    });
    (status, Json(body)).into_response()
}

async fn metrics() -> Response {
    match render_metrics() {
        Some(body) => (
            StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics not initialized").into_response(),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LogoutRequest {
    #[serde(default)]
    pub session_id: Option<Uuid>,
}

/// Revokes the presented access token and, if given, the session.
///
/// The token is blacklisted for the rest of its own lifetime, read from its
/// `exp` claim. A session is only revoked when the presented token is its
/// current access token: an unknown session gets 404, someone else's 403.
async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<LogoutRequest>>,
) -> Response {
    let Some(token) = bearer_token(&headers) else {
        return unauthorized_response("Authentication required");
    };
    let request = body.map(|Json(r)| r).unwrap_or_default();

    if let Some(session_id) = request.session_id {
        match state.sessions.find_session(session_id).await {
            Ok(Some(record)) if record.token_hash == TokenIdentifier::from_raw(token) => {}
            Ok(Some(record)) => {
                tracing::warn!(owner = %record.user_id, "logout rejected for a session of another token");
                return error_response(
                    StatusCode::FORBIDDEN,
                    "forbidden",
                    "Session does not belong to this token",
                );
            }
            Ok(None) => {
                return error_response(StatusCode::NOT_FOUND, "not_found", "Session not found");
            }
            Err(e) => return session_error_response(&e),
        }
    }

    let token_revoked = match state.sessions.revoke_token(token).await {
        Ok(true) => true,
        Ok(false) => {
            return session_error_response(&SessionError::unavailable("failed to blacklist token"));
        }
        Err(e) => return session_error_response(&e),
    };

    let session_revoked = match request.session_id {
        Some(session_id) => match state.sessions.revoke_session(session_id).await {
            Ok(revoked) => revoked,
            Err(e) => return session_error_response(&e),
        },
        None => false,
    };

    tracing::info!(session_revoked, "logout completed");
    (
        StatusCode::OK,
        Json(json!({
            "session_revoked": session_revoked,
            "token_revoked": token_revoked,
        })),
    )
        .into_response()
}

fn session_error_response(error: &SessionError) -> Response {
    let (status, code) = match error {
        SessionError::InvalidToken { .. } | SessionError::InvalidTtl { .. } => {
            (StatusCode::BAD_REQUEST, "invalid_request")
        }
        SessionError::Unavailable { .. } | SessionError::Audit { .. } => {
            tracing::warn!(error = %error, "session operation failed");
            (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable")
        }
    };
    error_response(status, code, &error.to_string())
}

fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    (
        status,
        Json(json!({
            "error": code,
            "message": message,
        })),
    )
        .into_response()
}
