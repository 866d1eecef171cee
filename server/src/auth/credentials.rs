//! Durable user records.
//!
//! Emails are normalized (trimmed, lower-cased) before every lookup and
//! write, and the `UNIQUE` constraint on `users.email` is the only guard
//! against two concurrent registrations of the same address.

use chrono::{DateTime, Utc};
use rusqlite::{ErrorCode, OptionalExtension, Row};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::db::{self, DbError, DbPool};
use crate::db::models::User;

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("email already registered")]
    DuplicateEmail,

    #[error(transparent)]
    Database(#[from] DbError),
}

impl From<rusqlite::Error> for CredentialError {
    fn from(e: rusqlite::Error) -> Self {
        CredentialError::Database(DbError::Sqlite(e))
    }
}

const USER_COLUMNS: &str = "id, email, password_hash, full_name, email_verified, \
     verification_token_hash, verification_expires_at, reset_token_hash, reset_expires_at, created_at";

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// SHA-256 hash of a one-time token for storage comparison.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Clone)]
pub struct CredentialStore {
    db: DbPool,
}

impl CredentialStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Insert a new, unverified user. Fails with `DuplicateEmail` when the
    /// normalized address is already taken.
    pub fn create(
        &self,
        email: &str,
        full_name: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<User, CredentialError> {
        let user = User {
            id: Uuid::now_v7().to_string(),
            email: normalize_email(email),
            password_hash: password_hash.to_string(),
            full_name: full_name.to_string(),
            email_verified: false,
            verification_token_hash: None,
            verification_expires_at: None,
            reset_token_hash: None,
            reset_expires_at: None,
            created_at: now,
        };

        let conn = db::lock(&self.db)?;
        let inserted = conn.execute(
            "INSERT INTO users (id, email, password_hash, full_name, email_verified, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 0, ?5, ?5)",
            rusqlite::params![user.id, user.email, user.password_hash, user.full_name, now],
        );

        match inserted {
            Ok(_) => Ok(user),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(CredentialError::DuplicateEmail)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn find_by_id(&self, id: &str) -> Result<Option<User>, CredentialError> {
        self.find_one("id", id)
    }

    pub fn find_by_email(&self, email: &str) -> Result<Option<User>, CredentialError> {
        self.find_one("email", &normalize_email(email))
    }

    /// Look up by the plaintext token the user received by email.
    pub fn find_by_verification_token(&self, token: &str) -> Result<Option<User>, CredentialError> {
        self.find_one("verification_token_hash", &hash_token(token))
    }

    pub fn find_by_reset_token(&self, token: &str) -> Result<Option<User>, CredentialError> {
        self.find_one("reset_token_hash", &hash_token(token))
    }

    /// Persist every mutable field of `user` in a single statement.
    pub fn update(&self, user: &User, now: DateTime<Utc>) -> Result<(), CredentialError> {
        let conn = db::lock(&self.db)?;
        let changed = conn.execute(
            "UPDATE users SET password_hash = ?2, full_name = ?3, email_verified = ?4,
                verification_token_hash = ?5, verification_expires_at = ?6,
                reset_token_hash = ?7, reset_expires_at = ?8, updated_at = ?9
             WHERE id = ?1",
            rusqlite::params![
                user.id,
                user.password_hash,
                user.full_name,
                user.email_verified,
                user.verification_token_hash,
                user.verification_expires_at,
                user.reset_token_hash,
                user.reset_expires_at,
                now,
            ],
        )?;

        if changed == 0 {
            tracing::warn!(user_id = %user.id, "update on missing user row");
        }
        Ok(())
    }

    fn find_one(&self, column: &'static str, value: &str) -> Result<Option<User>, CredentialError> {
        let conn = db::lock(&self.db)?;
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1");
        let user = conn.query_row(&sql, [value], user_from_row).optional()?;
        Ok(user)
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        full_name: row.get(3)?,
        email_verified: row.get(4)?,
        verification_token_hash: row.get(5)?,
        verification_expires_at: row.get(6)?,
        reset_token_hash: row.get(7)?,
        reset_expires_at: row.get(8)?,
        created_at: row.get(9)?,
    })
}
