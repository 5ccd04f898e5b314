//! services/api/src/web/auth.rs
//!
//! Authentication endpoints for signup, login, and password-reset requests.

use axum::{
    extract::{ConnectInfo, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use thinkpath_core::{AuthSession, UserProfile};
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::web::{state::AppState, ErrorBody, Rejection};

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct PasswordResetRequest {
    pub email: String,
}

#[derive(Serialize, ToSchema)]
pub struct UserView {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

impl From<UserProfile> for UserView {
    fn from(user: UserProfile) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct AuthResponse {
    pub user: UserView,
    /// Bearer token for the `Authorization` header.
    pub token: String,
}

impl From<AuthSession> for AuthResponse {
    fn from(session: AuthSession) -> Self {
        Self {
            user: session.user.into(),
            token: session.token,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/signup - Create a new account and sign in
#[utoipa::path(
    post,
    path = "/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 400, description = "A field is missing", body = ErrorBody),
        (status = 409, description = "An account with this email already exists", body = ErrorBody)
    )
)]
pub async fn signup_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, Rejection> {
    let session = state
        .access
        .signup(&req.name, &req.email, &req.password)
        .await?;
    info!(user_id = %session.user.id, "Account created");
    Ok((StatusCode::CREATED, Json(AuthResponse::from(session))))
}

/// POST /auth/login - Sign in with an existing account
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials", body = ErrorBody),
        (status = 429, description = "Too many failed attempts; see Retry-After", body = ErrorBody)
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, Rejection> {
    // Failed attempts are throttled per client address.
    let scope = peer.ip().to_string();
    let session = state.access.login(&scope, &req.email, &req.password).await?;
    info!(user_id = %session.user.id, "Signed in");
    Ok(Json(session.into()))
}

/// POST /auth/password-reset - Request a recovery email
///
/// Always answers with the same message whether or not the account exists.
#[utoipa::path(
    post,
    path = "/auth/password-reset",
    request_body = PasswordResetRequest,
    responses(
        (status = 202, description = "Request accepted", body = MessageResponse)
    )
)]
pub async fn password_reset_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PasswordResetRequest>,
) -> impl IntoResponse {
    let message = state.access.request_password_reset(&req.email).await;
    (StatusCode::ACCEPTED, Json(MessageResponse { message }))
}
