//! HTTP error mapping.
//!
//! Every failure leaves the server as `{"error": <kind>, "message": <text>}`
//! with a stable snake_case kind. Internal detail is logged here and never
//! put in the message.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::auth::account::AccountError;
use crate::auth::middleware::AuthError;
use crate::vault::VaultError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub kind: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "validation_error", message)
    }

    fn internal(detail: &dyn std::fmt::Display) -> Self {
        tracing::error!(error = %detail, "internal error");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", "Internal server error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({ "error": self.kind, "message": self.message })),
        )
            .into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        let kind = match &e {
            AuthError::MissingAuth => "missing_auth",
            AuthError::MissingToken => "missing_token",
            AuthError::InvalidToken => "invalid_token",
            AuthError::UserNotFound => "user_not_found",
            AuthError::Internal(_) => return Self::internal(&e),
        };
        Self::new(StatusCode::UNAUTHORIZED, kind, e.to_string())
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}

impl From<AccountError> for ApiError {
    fn from(e: AccountError) -> Self {
        let (status, kind) = match &e {
            AccountError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            AccountError::DuplicateEmail => (StatusCode::CONFLICT, "duplicate_email"),
            AccountError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "invalid_credentials"),
            AccountError::InvalidOrExpiredToken => (StatusCode::BAD_REQUEST, "invalid_or_expired_token"),
            AccountError::NotFound => (StatusCode::NOT_FOUND, "not_found"),
            AccountError::AlreadyVerified => (StatusCode::BAD_REQUEST, "already_verified"),
            AccountError::Delivery(_) => {
                return Self::new(
                    StatusCode::BAD_GATEWAY,
                    "delivery_error",
                    "Failed to send email. Please try again later.",
                )
            }
            AccountError::Internal(_) => return Self::internal(&e),
        };
        Self::new(status, kind, e.to_string())
    }
}

impl From<VaultError> for ApiError {
    fn from(e: VaultError) -> Self {
        match &e {
            VaultError::PayloadTooLarge { .. } => {
                Self::new(StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large", e.to_string())
            }
            VaultError::EncodedPayloadTooLarge { .. } => Self::new(
                StatusCode::PAYLOAD_TOO_LARGE,
                "encoded_payload_too_large",
                e.to_string(),
            ),
            VaultError::Validation(_) => Self::validation(e.to_string()),
            VaultError::NotFoundOrNotOwned => {
                Self::new(StatusCode::NOT_FOUND, "not_found", "File not found")
            }
            // Details were logged by the vault.
            VaultError::StorageWriteFailed(_) => Self::new(
                StatusCode::BAD_GATEWAY,
                "storage_write_failed",
                "Failed to store file",
            ),
            VaultError::ContentMissing(_) => Self::new(
                StatusCode::NOT_FOUND,
                "content_missing",
                "File content is no longer available",
            ),
            VaultError::MetadataWriteFailed(_) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "metadata_write_failed",
                "Failed to record file",
            ),
            VaultError::Internal(_) => Self::internal(&e),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return Self::new(
                StatusCode::PAYLOAD_TOO_LARGE,
                "encoded_payload_too_large",
                "Request body too large",
            );
        }
        Self::validation(rejection.body_text())
    }
}
