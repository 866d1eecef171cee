/// Database row types for all tables.
/// These correspond 1:1 to the SQLite schema defined in migrations.rs.
use chrono::{DateTime, Utc};
use serde::Serialize;

/// User record in the users table.
///
/// One-time tokens are held as SHA-256 hashes; the plaintext only ever
/// leaves the server inside an email. Each purpose has a single slot, so
/// issuing a new token replaces whatever was pending.
#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub email_verified: bool,
    pub verification_token_hash: Option<String>,
    pub verification_expires_at: Option<DateTime<Utc>>,
    pub reset_token_hash: Option<String>,
    pub reset_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Replace any pending verification token.
    pub fn set_verification_token(&mut self, token_hash: String, expires_at: DateTime<Utc>) {
        self.verification_token_hash = Some(token_hash);
        self.verification_expires_at = Some(expires_at);
    }

    /// Mark the email verified and burn the verification token.
    pub fn consume_verification_token(&mut self) {
        self.email_verified = true;
        self.verification_token_hash = None;
        self.verification_expires_at = None;
    }

    /// Replace any pending password-reset token.
    pub fn set_reset_token(&mut self, token_hash: String, expires_at: DateTime<Utc>) {
        self.reset_token_hash = Some(token_hash);
        self.reset_expires_at = Some(expires_at);
    }

    /// Install the new password hash and burn the reset token.
    pub fn consume_reset_token(&mut self, new_password_hash: String) {
        self.password_hash = new_password_hash;
        self.reset_token_hash = None;
        self.reset_expires_at = None;
    }

    /// The caller-visible shape of a user. Never carries hashes or tokens.
    pub fn projection(&self) -> UserProjection {
        UserProjection {
            id: self.id.clone(),
            email: self.email.clone(),
            full_name: self.full_name.clone(),
            email_verified: self.email_verified,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProjection {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub email_verified: bool,
}

/// Where a blob's ciphertext lives. Exactly one variant per record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageLocation {
    Remote(String),
    Local(String),
}

impl StorageLocation {
    pub fn kind(&self) -> &'static str {
        match self {
            StorageLocation::Remote(_) => "remote",
            StorageLocation::Local(_) => "local",
        }
    }

    pub fn key(&self) -> &str {
        match self {
            StorageLocation::Remote(key) | StorageLocation::Local(key) => key,
        }
    }

    /// Rebuild from the `(location_kind, location_key)` column pair.
    pub fn from_columns(kind: &str, key: String) -> Option<Self> {
        match kind {
            "remote" => Some(StorageLocation::Remote(key)),
            "local" => Some(StorageLocation::Local(key)),
            _ => None,
        }
    }
}

/// Blob metadata row in the blobs table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobRecord {
    pub id: String,
    pub owner_id: String,
    pub logical_name: String,
    pub declared_size: u64,
    pub location: StorageLocation,
    pub created_at: DateTime<Utc>,
}

impl BlobRecord {
    /// Public projection: the storage key stays server-side.
    pub fn projection(&self) -> BlobProjection {
        BlobProjection {
            id: self.id.clone(),
            file_name: self.logical_name.clone(),
            file_size: self.declared_size,
            upload_date: self.created_at,
            storage: self.location.kind(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobProjection {
    pub id: String,
    pub file_name: String,
    pub file_size: u64,
    pub upload_date: DateTime<Utc>,
    pub storage: &'static str,
}
