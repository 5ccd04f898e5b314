//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use thinkpath_core::TutorError;
use tracing::debug;

use crate::web::{state::AppState, Rejection};

/// Middleware that validates the bearer token and extracts its claims.
///
/// If valid, inserts the `TokenClaims` into request extensions for handlers to use.
/// If invalid, expired or missing, returns 401 Unauthorized.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, Rejection> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
        .ok_or(TutorError::InvalidToken)?;

    let claims = state.access.verify_token(token).map_err(|e| {
        debug!("Rejected bearer token: {}", e);
        e
    })?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}
