//! Account flows: register, login, email verification, password reset.
//!
//! One-time tokens are 32 random alphanumerics sent by email; only their
//! SHA-256 lives in the database. Each user has one slot per purpose, so
//! issuing a new token invalidates the previous one.

use std::sync::{Arc, OnceLock};

use chrono::Duration;
use rand::distr::Alphanumeric;
use rand::Rng;

use crate::auth::credentials::{hash_token, normalize_email, CredentialError, CredentialStore};
use crate::auth::jwt::{TokenError, TokenService};
use crate::auth::password::{hash_password, verify_password, PasswordError};
use crate::clock::Clock;
use crate::db::models::{User, UserProjection};
use crate::db::{self, DbError};
use crate::notify::{DeliveryError, EmailNotifier, TemplateKind};

pub const ONE_TIME_TOKEN_LEN: usize = 32;
pub const MIN_PASSWORD_LEN: usize = 8;

fn verification_ttl() -> Duration {
    Duration::hours(24)
}

fn reset_ttl() -> Duration {
    Duration::hours(1)
}

/// Hash checked against when the email is unknown. Computed once with the
/// same parameters as real hashes.
fn dummy_password_hash() -> &'static str {
    static DUMMY: OnceLock<String> = OnceLock::new();
    DUMMY.get_or_init(|| {
        hash_password(&generate_one_time_token()).unwrap_or_else(|e| {
            tracing::error!(error = %e, "could not build dummy password hash");
            String::new()
        })
    })
}

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("{0}")]
    Validation(String),

    #[error("email already registered")]
    DuplicateEmail,

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("invalid or expired token")]
    InvalidOrExpiredToken,

    #[error("user not found")]
    NotFound,

    #[error("email already verified")]
    AlreadyVerified,

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<CredentialError> for AccountError {
    fn from(e: CredentialError) -> Self {
        match e {
            CredentialError::DuplicateEmail => AccountError::DuplicateEmail,
            CredentialError::Database(e) => AccountError::Internal(e.to_string()),
        }
    }
}

impl From<DbError> for AccountError {
    fn from(e: DbError) -> Self {
        AccountError::Internal(e.to_string())
    }
}

impl From<PasswordError> for AccountError {
    fn from(e: PasswordError) -> Self {
        AccountError::Internal(e.to_string())
    }
}

impl From<TokenError> for AccountError {
    fn from(e: TokenError) -> Self {
        AccountError::Internal(e.to_string())
    }
}

/// A freshly issued session.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub user: UserProjection,
}

pub fn generate_one_time_token() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(ONE_TIME_TOKEN_LEN)
        .map(char::from)
        .collect()
}

fn require(field: &str, value: &str) -> Result<(), AccountError> {
    if value.trim().is_empty() {
        return Err(AccountError::Validation(format!("{field} is required")));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<(), AccountError> {
    require("email", email)?;
    let valid = match email.trim().split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !domain.contains('@'),
        None => false,
    };
    if !valid {
        return Err(AccountError::Validation("email is not a valid address".into()));
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), AccountError> {
    require("password", password)?;
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AccountError::Validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

#[derive(Clone)]
pub struct Accounts {
    credentials: CredentialStore,
    tokens: TokenService,
    notifier: Arc<dyn EmailNotifier>,
    clock: Arc<dyn Clock>,
}

impl Accounts {
    pub fn new(
        credentials: CredentialStore,
        tokens: TokenService,
        notifier: Arc<dyn EmailNotifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            credentials,
            tokens,
            notifier,
            clock,
        }
    }

    /// Create an unverified account, send the verification email and log the
    /// user straight in. Delivery failure does not fail registration.
    pub async fn register(&self, email: &str, password: &str, full_name: &str) -> Result<Session, AccountError> {
        validate_email(email)?;
        validate_password(password)?;
        require("fullName", full_name)?;

        let store = self.credentials.clone();
        let email = normalize_email(email);
        let full_name = full_name.trim().to_string();
        let password = password.to_string();
        let now = self.clock.now();
        let plain = generate_one_time_token();
        let token_hash = hash_token(&plain);

        let user = db::blocking(move || -> Result<User, AccountError> {
            let password_hash = hash_password(&password)?;
            let mut user = store.create(&email, &full_name, &password_hash, now)?;
            user.set_verification_token(token_hash, now + verification_ttl());
            store.update(&user, now)?;
            Ok(user)
        })
        .await?;

        tracing::info!(user_id = %user.id, "user registered");

        if let Err(e) = self.notifier.send(&user.email, TemplateKind::VerifyEmail, &plain).await {
            tracing::warn!(user_id = %user.id, error = %e, "verification email not delivered");
        }

        self.session(&user)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Session, AccountError> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(AccountError::Validation("email and password are required".into()));
        }

        let store = self.credentials.clone();
        let email = normalize_email(email);
        let password = password.to_string();

        let user = db::blocking(move || -> Result<Option<User>, AccountError> {
            let Some(user) = store.find_by_email(&email)? else {
                // Same Argon2 cost as a real check, so timing does not reveal the miss.
                verify_password(&password, dummy_password_hash());
                return Ok(None);
            };
            Ok(verify_password(&password, &user.password_hash).then_some(user))
        })
        .await?
        .ok_or(AccountError::InvalidCredentials)?;

        tracing::info!(user_id = %user.id, "user logged in");
        self.session(&user)
    }

    pub async fn verify_email(&self, token: &str) -> Result<(), AccountError> {
        if token.trim().is_empty() {
            return Err(AccountError::InvalidOrExpiredToken);
        }

        let store = self.credentials.clone();
        let token = token.trim().to_string();
        let now = self.clock.now();

        let user_id = db::blocking(move || -> Result<String, AccountError> {
            let mut user = store
                .find_by_verification_token(&token)?
                .ok_or(AccountError::InvalidOrExpiredToken)?;
            match user.verification_expires_at {
                Some(expires_at) if expires_at >= now => {}
                _ => return Err(AccountError::InvalidOrExpiredToken),
            }
            user.consume_verification_token();
            store.update(&user, now)?;
            Ok(user.id)
        })
        .await?;

        tracing::info!(user_id = %user_id, "email verified");
        Ok(())
    }

    /// Issue a fresh verification token. Delivery failure is surfaced here
    /// since sending is the whole point of the call.
    pub async fn resend_verification(&self, email: &str) -> Result<(), AccountError> {
        validate_email(email)?;

        let store = self.credentials.clone();
        let email = normalize_email(email);
        let now = self.clock.now();
        let plain = generate_one_time_token();
        let token_hash = hash_token(&plain);

        let issued_hash = token_hash.clone();
        let (user, previous) = db::blocking(move || -> Result<(User, User), AccountError> {
            let mut user = store.find_by_email(&email)?.ok_or(AccountError::NotFound)?;
            if user.email_verified {
                return Err(AccountError::AlreadyVerified);
            }
            let previous = user.clone();
            user.set_verification_token(token_hash, now + verification_ttl());
            store.update(&user, now)?;
            Ok((user, previous))
        })
        .await?;

        if let Err(e) = self.notifier.send(&user.email, TemplateKind::VerifyEmail, &plain).await {
            tracing::warn!(user_id = %user.id, error = %e, "verification email not delivered");
            self.restore_verification_token(previous, issued_hash).await;
            return Err(e.into());
        }

        tracing::info!(user_id = %user.id, "verification email resent");
        Ok(())
    }

    /// Put back the last delivered verification token after a failed resend,
    /// unless the account changed in the meantime.
    async fn restore_verification_token(&self, previous: User, issued_hash: String) {
        let store = self.credentials.clone();
        let now = self.clock.now();
        let user_id = previous.id.clone();

        let restored = db::blocking(move || -> Result<(), AccountError> {
            let Some(mut current) = store.find_by_id(&previous.id)? else {
                return Ok(());
            };
            if current.verification_token_hash.as_deref() != Some(issued_hash.as_str()) {
                return Ok(());
            }
            current.verification_token_hash = previous.verification_token_hash;
            current.verification_expires_at = previous.verification_expires_at;
            store.update(&current, now)?;
            Ok(())
        })
        .await;

        if let Err(e) = restored {
            tracing::error!(user_id = %user_id, error = %e, "could not restore previous verification token");
        }
    }

    /// Always succeeds so the response never reveals whether `email` exists.
    pub async fn forgot_password(&self, email: &str) -> Result<(), AccountError> {
        validate_email(email)?;

        let store = self.credentials.clone();
        let email = normalize_email(email);
        let now = self.clock.now();
        let plain = generate_one_time_token();
        let token_hash = hash_token(&plain);

        let issued = db::blocking(move || -> Result<Option<User>, AccountError> {
            let Some(mut user) = store.find_by_email(&email)? else {
                return Ok(None);
            };
            user.set_reset_token(token_hash, now + reset_ttl());
            store.update(&user, now)?;
            Ok(Some(user))
        })
        .await;

        match issued {
            Ok(Some(user)) => {
                if let Err(e) = self.notifier.send(&user.email, TemplateKind::PasswordReset, &plain).await {
                    tracing::warn!(user_id = %user.id, error = %e, "reset email not delivered");
                } else {
                    tracing::info!(user_id = %user.id, "password reset requested");
                }
            }
            Ok(None) => tracing::debug!("password reset requested for unknown email"),
            Err(e) => tracing::error!(error = %e, "password reset request failed"),
        }
        Ok(())
    }

    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), AccountError> {
        if token.trim().is_empty() {
            return Err(AccountError::InvalidOrExpiredToken);
        }
        validate_password(new_password)?;

        let store = self.credentials.clone();
        let token = token.trim().to_string();
        let new_password = new_password.to_string();
        let now = self.clock.now();

        let user_id = db::blocking(move || -> Result<String, AccountError> {
            let mut user = store
                .find_by_reset_token(&token)?
                .ok_or(AccountError::InvalidOrExpiredToken)?;
            match user.reset_expires_at {
                Some(expires_at) if expires_at >= now => {}
                _ => return Err(AccountError::InvalidOrExpiredToken),
            }
            user.consume_reset_token(hash_password(&new_password)?);
            store.update(&user, now)?;
            Ok(user.id)
        })
        .await?;

        tracing::info!(user_id = %user_id, "password reset");
        Ok(())
    }

    fn session(&self, user: &User) -> Result<Session, AccountError> {
        Ok(Session {
            token: self.tokens.issue(&user.id)?,
            user: user.projection(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::notify::memory::MemoryNotifier;

    struct Harness {
        accounts: Accounts,
        tokens: TokenService,
        credentials: CredentialStore,
        notifier: Arc<MemoryNotifier>,
        clock: Arc<ManualClock>,
        _tmp: tempfile::TempDir,
    }

    fn harness() -> Harness {
        let tmp = tempfile::tempdir().unwrap();
        let db = db::init_db(tmp.path().to_str().unwrap()).unwrap();
        let clock = Arc::new(ManualClock::default());
        let credentials = CredentialStore::new(db);
        let tokens = TokenService::new(&[9u8; 32], Duration::days(7), clock.clone());
        let notifier = Arc::new(MemoryNotifier::new());
        let accounts = Accounts::new(credentials.clone(), tokens.clone(), notifier.clone(), clock.clone());
        Harness {
            accounts,
            tokens,
            credentials,
            notifier,
            clock,
            _tmp: tmp,
        }
    }

    #[test]
    fn test_one_time_token_shape() {
        let token = generate_one_time_token();
        assert_eq!(token.len(), ONE_TIME_TOKEN_LEN);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(token, generate_one_time_token());
    }

    #[test]
    fn test_validation_rules() {
        assert!(validate_email("a@b.co").is_ok());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("@b.co").is_err());
        assert!(validate_email("a@").is_err());
        assert!(validate_email("a@b@c").is_err());
        assert!(validate_password("1234567").is_err());
        assert!(validate_password("12345678").is_ok());
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let h = harness();
        let registered = h.accounts.register("Alice@X.com", "password1", "Alice").await.unwrap();
        assert_eq!(registered.user.email, "alice@x.com");
        assert!(!registered.user.email_verified);
        assert_eq!(h.tokens.verify(&registered.token).unwrap().sub, registered.user.id);

        let session = h.accounts.login("alice@x.com", "password1").await.unwrap();
        assert_eq!(h.tokens.verify(&session.token).unwrap().sub, registered.user.id);
    }

    #[tokio::test]
    async fn test_register_duplicate_any_case() {
        let h = harness();
        h.accounts.register("A@x.com", "password1", "A").await.unwrap();
        let err = h.accounts.register("a@x.com", "password2", "B").await.unwrap_err();
        assert!(matches!(err, AccountError::DuplicateEmail));
    }

    #[tokio::test]
    async fn test_register_survives_delivery_failure() {
        let h = harness();
        h.notifier.set_failing(true);
        assert!(h.accounts.register("a@x.com", "password1", "A").await.is_ok());
    }

    #[tokio::test]
    async fn test_login_wrong_password_and_unknown_email_look_alike() {
        let h = harness();
        h.accounts.register("a@x.com", "password1", "A").await.unwrap();
        let wrong = h.accounts.login("a@x.com", "password2").await.unwrap_err();
        let unknown = h.accounts.login("b@x.com", "password1").await.unwrap_err();
        assert!(matches!(wrong, AccountError::InvalidCredentials));
        assert!(matches!(unknown, AccountError::InvalidCredentials));

        // Unknown emails still pay for a full Argon2 verification.
        assert!(dummy_password_hash().starts_with("$argon2id$"));
        assert!(!verify_password("password1", dummy_password_hash()));
    }

    #[tokio::test]
    async fn test_verify_email_is_single_use() {
        let h = harness();
        h.accounts.register("a@x.com", "password1", "A").await.unwrap();
        let token = h.notifier.last_token("a@x.com", TemplateKind::VerifyEmail).unwrap();

        h.accounts.verify_email(&token).await.unwrap();
        let user = h.credentials.find_by_email("a@x.com").unwrap().unwrap();
        assert!(user.email_verified);

        let again = h.accounts.verify_email(&token).await;
        assert!(matches!(again, Err(AccountError::InvalidOrExpiredToken)));
    }

    #[tokio::test]
    async fn test_verify_email_expiry() {
        let h = harness();
        h.accounts.register("a@x.com", "password1", "A").await.unwrap();
        let token = h.notifier.last_token("a@x.com", TemplateKind::VerifyEmail).unwrap();

        h.clock.advance(Duration::hours(24) + Duration::seconds(1));
        let result = h.accounts.verify_email(&token).await;
        assert!(matches!(result, Err(AccountError::InvalidOrExpiredToken)));
    }

    #[tokio::test]
    async fn test_resend_replaces_previous_token() {
        let h = harness();
        h.accounts.register("a@x.com", "password1", "A").await.unwrap();
        let first = h.notifier.last_token("a@x.com", TemplateKind::VerifyEmail).unwrap();

        h.accounts.resend_verification("a@x.com").await.unwrap();
        let second = h.notifier.last_token("a@x.com", TemplateKind::VerifyEmail).unwrap();
        assert_ne!(first, second);

        assert!(h.accounts.verify_email(&first).await.is_err());
        h.accounts.verify_email(&second).await.unwrap();

        let after = h.accounts.resend_verification("a@x.com").await;
        assert!(matches!(after, Err(AccountError::AlreadyVerified)));
    }

    #[tokio::test]
    async fn test_resend_errors() {
        let h = harness();
        let missing = h.accounts.resend_verification("nobody@x.com").await;
        assert!(matches!(missing, Err(AccountError::NotFound)));

        h.accounts.register("a@x.com", "password1", "A").await.unwrap();
        h.notifier.set_failing(true);
        let undelivered = h.accounts.resend_verification("a@x.com").await;
        assert!(matches!(undelivered, Err(AccountError::Delivery(_))));
    }

    #[tokio::test]
    async fn test_failed_resend_keeps_delivered_token() {
        let h = harness();
        h.accounts.register("a@x.com", "password1", "A").await.unwrap();
        let delivered = h.notifier.last_token("a@x.com", TemplateKind::VerifyEmail).unwrap();

        h.notifier.set_failing(true);
        let undelivered = h.accounts.resend_verification("a@x.com").await;
        assert!(matches!(undelivered, Err(AccountError::Delivery(_))));
        h.notifier.set_failing(false);

        h.accounts.verify_email(&delivered).await.unwrap();
        let user = h.credentials.find_by_email("a@x.com").unwrap().unwrap();
        assert!(user.email_verified);
    }

    #[tokio::test]
    async fn test_forgot_password_does_not_leak_existence() {
        let h = harness();
        h.accounts.register("a@x.com", "password1", "A").await.unwrap();

        assert!(h.accounts.forgot_password("a@x.com").await.is_ok());
        assert!(h.accounts.forgot_password("nobody@x.com").await.is_ok());
        assert!(h.notifier.last_token("a@x.com", TemplateKind::PasswordReset).is_some());
        assert!(h.notifier.last_token("nobody@x.com", TemplateKind::PasswordReset).is_none());
    }

    #[tokio::test]
    async fn test_reset_password_single_use() {
        let h = harness();
        h.accounts.register("a@x.com", "password1", "A").await.unwrap();
        h.accounts.forgot_password("a@x.com").await.unwrap();
        let token = h.notifier.last_token("a@x.com", TemplateKind::PasswordReset).unwrap();

        h.accounts.reset_password(&token, "new-password").await.unwrap();
        assert!(h.accounts.login("a@x.com", "new-password").await.is_ok());
        assert!(h.accounts.login("a@x.com", "password1").await.is_err());

        let again = h.accounts.reset_password(&token, "another-one").await;
        assert!(matches!(again, Err(AccountError::InvalidOrExpiredToken)));
    }

    #[tokio::test]
    async fn test_reset_password_expired() {
        let h = harness();
        h.accounts.register("a@x.com", "password1", "A").await.unwrap();
        h.accounts.forgot_password("a@x.com").await.unwrap();
        let token = h.notifier.last_token("a@x.com", TemplateKind::PasswordReset).unwrap();

        h.clock.advance(Duration::hours(1) + Duration::seconds(1));
        let result = h.accounts.reset_password(&token, "new-password").await;
        assert!(matches!(result, Err(AccountError::InvalidOrExpiredToken)));
        assert!(h.accounts.login("a@x.com", "password1").await.is_ok());
    }

    #[tokio::test]
    async fn test_reset_rejects_short_password() {
        let h = harness();
        let result = h.accounts.reset_password("whatever", "short").await;
        assert!(matches!(result, Err(AccountError::Validation(_))));
    }
}
