use std::net::{IpAddr, SocketAddr};

use axum::extract::{ConnectInfo, State};
use axum::{
    Json,
    body::Body,
    http::{HeaderMap, HeaderName, HeaderValue, Request, StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chatgate_auth::TokenIdentifier;
use chatgate_ratelimit::{RateLimitDecision, RateLimitRequest};
use serde_json::json;

use crate::metrics::record_http_request;
use crate::state::AppState;

/// Identity used when neither a token nor a client address is known.
pub const ANONYMOUS_IDENTITY: &str = "anonymous";

// =============================================================================
// Rate Limiting Middleware
// =============================================================================

/// Sliding-window rate limiting per identity and endpoint.
///
/// The budget comes from the endpoint rule table. Denied requests get
/// 429 with a `Retry-After` header; allowed ones carry the
/// `X-RateLimit-*` headers. Cache outages fail open.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if should_skip_rate_limit(&req) || !state.limiter.is_enabled() {
        return next.run(req).await;
    }

    let identity = request_identity(&req, state.config.server.trust_forwarded_headers);
    let method = req.method().as_str().to_string();
    let resolved = state.rules.resolve(&method, req.uri().path());
    let request = RateLimitRequest::new(identity, resolved.endpoint).with_method(method.clone());

    let decision = state.limiter.check(&request, resolved.rule).await;
    if !decision.allowed {
        tracing::debug!(
            identity = %request.identity,
            endpoint = %request.endpoint,
            retry_after = ?decision.retry_after_seconds,
            "request rate limited"
        );
        record_http_request(&method, StatusCode::TOO_MANY_REQUESTS.as_u16());
        return too_many_requests_response(&decision);
    }

    let mut response = next.run(req).await;
    apply_rate_limit_headers(response.headers_mut(), &decision);
    record_http_request(&method, response.status().as_u16());
    response
}

fn should_skip_rate_limit(req: &Request<Body>) -> bool {
    matches!(req.uri().path(), "/health" | "/metrics")
}

/// Picks the rate limit identity: client address, then
/// [`ANONYMOUS_IDENTITY`].
///
/// Bearer tokens are not verified at this layer and never change the
/// identity.
pub fn request_identity(req: &Request<Body>, trust_forwarded: bool) -> String {
    let forwarded = trust_forwarded
        .then(|| forwarded_client_ip(req.headers()))
        .flatten();
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    match forwarded.or(peer) {
        Some(ip) => format!("ip:{ip}"),
        None => ANONYMOUS_IDENTITY.to_string(),
    }
}

fn forwarded_client_ip(headers: &HeaderMap) -> Option<IpAddr> {
    let first_forwarded = headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok());

    first_forwarded.or_else(|| {
        headers
            .get("x-real-ip")
            .and_then(|h| h.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
    })
}

fn apply_rate_limit_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    for (name, value) in decision.headers() {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(HeaderName::from_static(header_name(name)), value);
        }
    }
}

/// `HeaderName::from_static` needs lowercase names.
fn header_name(name: &'static str) -> &'static str {
    match name {
        "X-RateLimit-Limit" => "x-ratelimit-limit",
        "X-RateLimit-Remaining" => "x-ratelimit-remaining",
        "X-RateLimit-Reset" => "x-ratelimit-reset",
        _ => "retry-after",
    }
}

fn too_many_requests_response(decision: &RateLimitDecision) -> Response {
    let retry_after = decision.retry_after_seconds.unwrap_or(1);
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({
            "error": "too_many_requests",
            "retry_after": retry_after,
        })),
    )
        .into_response();
    apply_rate_limit_headers(response.headers_mut(), decision);
    response
}

// =============================================================================
// Token Blacklist Middleware
// =============================================================================

/// Rejects requests whose bearer token has been revoked.
///
/// Requests without a bearer token pass through; authenticating them is the
/// handler's business.
pub async fn blacklist_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(req.headers()) else {
        return next.run(req).await;
    };

    let identifier = TokenIdentifier::from_raw(token);
    if state.sessions.is_token_blacklisted(&identifier).await {
        tracing::debug!(path = %req.uri().path(), "revoked token rejected");
        record_http_request(req.method().as_str(), StatusCode::UNAUTHORIZED.as_u16());
        return unauthorized_response("Token revoked");
    }

    next.run(req).await
}

/// Extracts the token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

pub fn unauthorized_response(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(axum::http::header::WWW_AUTHENTICATE, "Bearer")],
        Json(json!({
            "error": "unauthorized",
            "message": message,
        })),
    )
        .into_response()
}
