use rusqlite_migration::{Migrations, M};

/// Define all schema migrations.
/// Uses SQLite user_version pragma for tracking - no migration table needed.
pub fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        M::up(
            "-- Migration 1: Accounts

CREATE TABLE users (
    id TEXT PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    full_name TEXT NOT NULL,
    email_verified INTEGER NOT NULL DEFAULT 0,
    verification_token_hash TEXT UNIQUE,
    verification_expires_at TEXT,
    reset_token_hash TEXT UNIQUE,
    reset_expires_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
",
        ),
        M::up(
            "-- Migration 2: Blob metadata registry

CREATE TABLE blobs (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL,
    logical_name TEXT NOT NULL,
    declared_size INTEGER NOT NULL,
    location_kind TEXT NOT NULL CHECK (location_kind IN ('remote', 'local')),
    location_key TEXT NOT NULL,
    created_at TEXT NOT NULL,
    FOREIGN KEY (owner_id) REFERENCES users(id)
);

CREATE INDEX idx_blobs_owner_created ON blobs(owner_id, created_at);
",
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_valid() {
        assert!(migrations().validate().is_ok());
    }
}
