use axum::extract::{DefaultBodyLimit, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use std::sync::Arc;
use std::time::Duration;
use tower_governor::key_extractor::PeerIpKeyExtractor;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};

use crate::auth::routes as auth_routes;
use crate::config::MIB;
use crate::state::AppState;
use crate::vault::routes as file_routes;

/// Attach a per-IP limit of `burst` requests, refilled one every `period`.
/// The limiter's state is pruned in the background once a minute.
fn rate_limited(router: Router<AppState>, period: Duration, burst: u32, name: &str) -> Router<AppState> {
    let Some(config) = GovernorConfigBuilder::default()
        .key_extractor(PeerIpKeyExtractor)
        .period(period)
        .burst_size(burst)
        .finish()
    else {
        tracing::error!("Invalid {} rate limit settings, limiter disabled", name);
        return router;
    };
    let config = Arc::new(config);

    let limiter = config.limiter().clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(60)).await;
            limiter.retain_recent();
        }
    });

    router.layer(GovernorLayer { config })
}

/// Build the full axum Router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    // Register + login: 5 requests per 15 minutes per IP
    let mut auth = Router::new()
        .route("/api/auth/register", post(auth_routes::register))
        .route("/api/auth/login", post(auth_routes::login));

    // Forgot password: 3 requests per hour per IP
    let mut password = Router::new().route("/api/auth/forgot-password", post(auth_routes::forgot_password));

    if state.rate_limit {
        auth = rate_limited(auth, Duration::from_secs(15 * 60 / 5), 5, "auth");
        password = rate_limited(password, Duration::from_secs(60 * 60 / 3), 3, "password");
    }

    // Token-driven account routes (no rate limiting)
    let account = Router::new()
        .route("/api/auth/verify-email", get(auth_routes::verify_email_query))
        .route("/api/auth/verify-email/{token}", get(auth_routes::verify_email_path))
        .route("/api/auth/resend-verification", post(auth_routes::resend_verification))
        .route("/api/auth/reset-password", post(auth_routes::reset_password))
        .route("/api/auth/me", get(auth_routes::me));

    // Encrypted file routes; the JSON envelope around the ciphertext gets 1 MiB of headroom
    let body_limit = usize::try_from(state.vault.limits().max_ciphertext_bytes + MIB).unwrap_or(usize::MAX);
    let files = Router::new()
        .route("/api/files/upload", post(file_routes::upload))
        .route("/api/files/list", get(file_routes::list))
        .route("/api/files/download/{id}", get(file_routes::download))
        .route("/api/files/delete/{id}", delete(file_routes::delete))
        .layer(DefaultBodyLimit::max(body_limit));

    let health = Router::new()
        .route("/health", get(health_check))
        .route("/health/storage", get(storage_health));

    Router::new()
        .merge(auth)
        .merge(password)
        .merge(account)
        .merge(files)
        .merge(health)
        .with_state(state)
}

/// Basic health check endpoint
async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Probe every configured storage backend. Diagnostic only.
async fn storage_health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let backends = state.vault.storage_health().await;
    let healthy = backends.iter().all(|b| b.status.reachable);
    Json(serde_json::json!({
        "status": if healthy { "ok" } else { "degraded" },
        "backends": backends,
    }))
}
