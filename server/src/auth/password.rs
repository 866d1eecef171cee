//! Argon2id password hashing.
//!
//! Hashes are stored in PHC string format, so parameters travel with the hash
//! and old hashes keep verifying if the defaults change.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
#[cfg(test)]
use argon2::{Algorithm, Params, Version};

#[derive(Debug, thiserror::Error)]
#[error("password hashing failed: {0}")]
pub struct PasswordError(String);

/// Production builds use `Argon2::default()` (m=19456 KiB, t=2, p=1).
/// Unit tests use minimal parameters so the suite stays fast.
fn argon2_instance() -> Argon2<'static> {
    #[cfg(test)]
    {
        let params = Params::new(1024, 1, 1, None).expect("valid Argon2 params for tests");
        Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
    }

    #[cfg(not(test))]
    {
        Argon2::default()
    }
}

pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    argon2_instance()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PasswordError(e.to_string()))
}

/// Returns `false` for a wrong password and for an unparseable stored hash.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    let parsed = match PasswordHash::new(stored_hash) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::error!("stored password hash is unparseable: {}", e);
            return false;
        }
    };
    argon2_instance()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}
