use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use vault_server::auth::{account::Accounts, credentials::CredentialStore, jwt};
use vault_server::clock::{Clock, SystemClock};
use vault_server::config::{generate_config_template, BackendKind, Config};
use vault_server::notify::{log::LogNotifier, smtp::SmtpNotifier, EmailNotifier};
use vault_server::storage::{local::LocalDiskBackend, remote::ObjectStoreBackend, BlobBackend};
use vault_server::vault::{registry::MetadataRegistry, VaultService};
use vault_server::{db, routes, state};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load()?;

    // Handle --generate-config: print template and exit
    if config.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vault_server=info"));
    if config.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().pretty().with_env_filter(filter).init();
    }

    tracing::info!("Vault server v{} starting", env!("CARGO_PKG_VERSION"));

    // Initialize SQLite database
    let db = db::init_db(&config.data_dir)?;

    // Load or generate JWT signing key (256-bit random, stored in data_dir)
    let jwt_secret = jwt::load_or_generate_jwt_secret(&config.data_dir)?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let tokens = jwt::TokenService::new(
        &jwt_secret,
        chrono::Duration::hours(i64::from(config.token_ttl_hours)),
        clock.clone(),
    );

    // --- Storage ---
    let timeout = Duration::from_secs(config.storage.timeout_secs);
    let local_dir = config.local_blob_dir();
    let local: Arc<dyn BlobBackend> = Arc::new(LocalDiskBackend::new(&local_dir, timeout));
    let remote: Option<Arc<dyn BlobBackend>> = match config.storage.backend {
        BackendKind::Local => {
            tracing::info!("Storing blobs on local disk at {}", local_dir.display());
            None
        }
        BackendKind::S3 => {
            let s3 = ObjectStoreBackend::s3(&config.storage)?;
            tracing::info!(
                "Storing blobs in S3, falling back to {} if the bucket is missing",
                local_dir.display()
            );
            Some(Arc::new(s3))
        }
    };

    // Startup probe, informational only
    for backend in remote.iter().chain(std::iter::once(&local)) {
        let status = backend.health_check().await;
        if status.reachable {
            tracing::info!(backend = backend.name(), "{}", status.detail);
        } else {
            tracing::warn!(backend = backend.name(), "{}", status.detail);
        }
    }

    // --- Email ---
    let notifier: Arc<dyn EmailNotifier> = match &config.smtp {
        Some(smtp) => Arc::new(SmtpNotifier::new(smtp, &config.frontend_url)?),
        None => {
            tracing::warn!("No [smtp] section configured; account emails will only be logged");
            Arc::new(LogNotifier::new(&config.frontend_url))
        }
    };

    // Build application state
    let credentials = CredentialStore::new(db.clone());
    let app_state = state::AppState {
        accounts: Accounts::new(credentials.clone(), tokens.clone(), notifier, clock.clone()),
        tokens,
        credentials,
        vault: VaultService::new(
            remote,
            local,
            MetadataRegistry::new(db),
            config.limits,
            clock,
        ),
        rate_limit: config.rate_limit.enabled,
    };

    // Build router
    let app = routes::build_router(app_state);

    // Bind and serve
    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
