//! REST endpoints for account management.
//!
//! POST /api/auth/register - Create account, send verification email, return session
//! POST /api/auth/login - Exchange email + password for a session token
//! GET  /api/auth/verify-email/{token} and /api/auth/verify-email?token= - Confirm email
//! POST /api/auth/resend-verification - Send a fresh verification email
//! POST /api/auth/forgot-password - Email a reset link (same response for unknown emails)
//! POST /api/auth/reset-password - Set a new password with a reset token
//! GET  /api/auth/me - The authenticated caller

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::auth::account::Session;
use crate::auth::middleware::Identity;
use crate::db::models::UserProjection;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub full_name: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct EmailRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub message: String,
    pub token: String,
    pub user: UserProjection,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

fn message(text: &str) -> Json<MessageResponse> {
    Json(MessageResponse {
        message: text.to_string(),
    })
}

fn session_response(text: &str, session: Session) -> Json<SessionResponse> {
    Json(SessionResponse {
        message: text.to_string(),
        token: session.token,
        user: session.user,
    })
}

/// POST /api/auth/register
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    let Json(req) = payload?;
    let session = state
        .accounts
        .register(&req.email, &req.password, &req.full_name)
        .await?;

    Ok((
        StatusCode::CREATED,
        session_response(
            "Registration successful. Please check your email to verify your account.",
            session,
        ),
    ))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<SessionResponse>, ApiError> {
    let Json(req) = payload?;
    let session = state.accounts.login(&req.email, &req.password).await?;
    Ok(session_response("Login successful", session))
}

/// GET /api/auth/verify-email/{token}
pub async fn verify_email_path(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.accounts.verify_email(&token).await?;
    Ok(message("Email verified successfully"))
}

/// GET /api/auth/verify-email?token=
pub async fn verify_email_query(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.accounts.verify_email(&query.token).await?;
    Ok(message("Email verified successfully"))
}

/// POST /api/auth/resend-verification
pub async fn resend_verification(
    State(state): State<AppState>,
    payload: Result<Json<EmailRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Json(req) = payload?;
    state.accounts.resend_verification(&req.email).await?;
    Ok(message("Verification email sent"))
}

/// POST /api/auth/forgot-password
pub async fn forgot_password(
    State(state): State<AppState>,
    payload: Result<Json<EmailRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Json(req) = payload?;
    state.accounts.forgot_password(&req.email).await?;
    Ok(message(
        "If an account exists with that email, a password reset link has been sent.",
    ))
}

/// POST /api/auth/reset-password
pub async fn reset_password(
    State(state): State<AppState>,
    payload: Result<Json<ResetPasswordRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Json(req) = payload?;
    if req.token.trim().is_empty() || req.new_password.is_empty() {
        return Err(ApiError::validation("Token and new password required"));
    }
    state
        .accounts
        .reset_password(&req.token, &req.new_password)
        .await?;
    Ok(message("Password reset successfully"))
}

/// GET /api/auth/me
pub async fn me(identity: Identity) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "id": identity.user_id,
        "email": identity.email,
        "fullName": identity.full_name,
    }))
}
