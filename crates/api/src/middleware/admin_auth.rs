//! Admin authentication middleware.
//!
//! Admin routes require the shared secret from `security.admin_token` in
//! the `X-Admin-Token` header. An empty configured token locks the admin
//! surface entirely.

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;

use crate::app::AppState;
use crate::error::ApiError;

pub const ADMIN_TOKEN_HEADER: &str = "X-Admin-Token";

pub async fn require_admin(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let presented = req
        .headers()
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());

    let Some(presented) = presented else {
        return ApiError::Unauthorized("Missing admin token".into()).into_response();
    };

    if !token_matches(&state.config.security.admin_token, presented) {
        tracing::warn!(path = %req.uri().path(), "Rejected admin request with invalid token");
        return ApiError::Forbidden("Admin access required".into()).into_response();
    }

    next.run(req).await
}

/// Constant-time in the token contents. An empty configured token never
/// matches.
fn token_matches(expected: &str, presented: &str) -> bool {
    !expected.is_empty() && bool::from(expected.as_bytes().ct_eq(presented.as_bytes()))
}
