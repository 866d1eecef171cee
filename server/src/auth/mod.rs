//! Accounts and request authentication.
//!
//! Passwords are Argon2id hashes, sessions are stateless HS256 JWTs, and the
//! [`middleware::Identity`] extractor gates every file route.

pub mod account;
pub mod credentials;
pub mod jwt;
pub mod middleware;
pub mod password;
pub mod routes;
