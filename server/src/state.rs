use crate::auth::account::Accounts;
use crate::auth::credentials::CredentialStore;
use crate::auth::jwt::TokenService;
use crate::vault::VaultService;

/// Shared application state passed to all handlers via axum State extractor.
/// Everything in here is built once at startup and only read afterwards.
#[derive(Clone)]
pub struct AppState {
    /// Registration, login, verification and reset flows
    pub accounts: Accounts,
    /// Session token issue/verify (signing secret lives inside)
    pub tokens: TokenService,
    /// User lookups for the auth gate
    pub credentials: CredentialStore,
    /// Encrypted blob storage with ownership enforcement
    pub vault: VaultService,
    /// Apply per-IP limits on auth endpoints
    pub rate_limit: bool,
}
