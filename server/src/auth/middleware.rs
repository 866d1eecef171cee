use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};

use crate::auth::credentials::CredentialStore;
use crate::auth::jwt::TokenService;
use crate::db;
use crate::state::AppState;

/// The authenticated caller, resolved fresh for every request from the
/// `Authorization: Bearer` header. Use as an extractor on any handler that
/// needs ownership enforcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub email: String,
    pub full_name: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("authorization header required")]
    MissingAuth,

    #[error("bearer token required")]
    MissingToken,

    /// Expired, tampered and malformed tokens all land here.
    #[error("invalid or expired token")]
    InvalidToken,

    #[error("user not found")]
    UserNotFound,

    #[error("internal error: {0}")]
    Internal(String),
}

/// Pull the token out of `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers.get(AUTHORIZATION).ok_or(AuthError::MissingAuth)?;
    let value = value.to_str().map_err(|_| AuthError::MissingToken)?;

    let (scheme, token) = value.trim().split_once(' ').ok_or(AuthError::MissingToken)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::MissingToken);
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::MissingToken);
    }
    Ok(token)
}

/// Verify the token (no store access on failure), then confirm the subject
/// still exists.
pub async fn authenticate(
    headers: &HeaderMap,
    tokens: &TokenService,
    credentials: &CredentialStore,
) -> Result<Identity, AuthError> {
    let token = bearer_token(headers)?;

    let claims = tokens.verify(token).map_err(|e| {
        tracing::debug!(error = %e, "rejected bearer token");
        AuthError::InvalidToken
    })?;

    let store = credentials.clone();
    let user_id = claims.sub;
    let user = db::blocking(move || store.find_by_id(&user_id))
        .await
        .map_err(|e| AuthError::Internal(e.to_string()))?
        .ok_or(AuthError::UserNotFound)?;

    Ok(Identity {
        user_id: user.id,
        email: user.email,
        full_name: user.full_name,
    })
}

impl<S> FromRequestParts<S> for Identity
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        authenticate(&parts.headers, &state.tokens, &state.credentials).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use axum::http::HeaderValue;
    use chrono::{Duration, Utc};
    use std::sync::Arc;

    fn headers(auth: Option<&str>) -> HeaderMap {
        let mut map = HeaderMap::new();
        if let Some(value) = auth {
            map.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    fn setup() -> (TokenService, CredentialStore, Arc<ManualClock>, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let db = db::init_db(tmp.path().to_str().unwrap()).unwrap();
        let clock = Arc::new(ManualClock::default());
        let tokens = TokenService::new(&[1u8; 32], Duration::hours(1), clock.clone());
        (tokens, CredentialStore::new(db), clock, tmp)
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert!(matches!(bearer_token(&headers(None)), Err(AuthError::MissingAuth)));
        assert!(matches!(bearer_token(&headers(Some("Bearer"))), Err(AuthError::MissingToken)));
        assert!(matches!(bearer_token(&headers(Some("Bearer   "))), Err(AuthError::MissingToken)));
        assert!(matches!(bearer_token(&headers(Some("Basic abc"))), Err(AuthError::MissingToken)));
        assert_eq!(bearer_token(&headers(Some("Bearer abc.def"))).unwrap(), "abc.def");
        assert_eq!(bearer_token(&headers(Some("bearer xyz"))).unwrap(), "xyz");
    }

    #[tokio::test]
    async fn test_authenticate_resolves_identity() {
        let (tokens, credentials, _clock, _tmp) = setup();
        let user = credentials.create("a@x.com", "Alice", "hash", Utc::now()).unwrap();
        let token = tokens.issue(&user.id).unwrap();

        let identity = authenticate(&headers(Some(&format!("Bearer {token}"))), &tokens, &credentials)
            .await
            .unwrap();
        assert_eq!(identity.user_id, user.id);
        assert_eq!(identity.email, "a@x.com");
    }

    #[tokio::test]
    async fn test_expired_and_garbage_tokens_are_both_invalid() {
        let (tokens, credentials, clock, _tmp) = setup();
        let user = credentials.create("a@x.com", "Alice", "hash", Utc::now()).unwrap();
        let token = tokens.issue(&user.id).unwrap();
        clock.advance(Duration::hours(2));

        let expired = authenticate(&headers(Some(&format!("Bearer {token}"))), &tokens, &credentials).await;
        let garbage = authenticate(&headers(Some("Bearer not-a-jwt")), &tokens, &credentials).await;
        assert!(matches!(expired, Err(AuthError::InvalidToken)));
        assert!(matches!(garbage, Err(AuthError::InvalidToken)));
    }

    #[tokio::test]
    async fn test_unknown_subject_is_user_not_found() {
        let (tokens, credentials, _clock, _tmp) = setup();
        let token = tokens.issue("deleted-user").unwrap();
        let result = authenticate(&headers(Some(&format!("Bearer {token}"))), &tokens, &credentials).await;
        assert!(matches!(result, Err(AuthError::UserNotFound)));
    }
}
