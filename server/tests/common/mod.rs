//! Shared harness: the real router on an ephemeral port, backed by in-memory
//! storage, a manual clock and a recording notifier.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::net::TcpListener;

use vault_server::auth::{account::Accounts, credentials::CredentialStore, jwt::TokenService};
use vault_server::clock::ManualClock;
use vault_server::config::LimitsConfig;
use vault_server::notify::{memory::MemoryNotifier, TemplateKind};
use vault_server::storage::{memory::MemoryBackend, BlobBackend};
use vault_server::vault::{registry::MetadataRegistry, VaultService};

pub const MAX_PLAINTEXT: u64 = 1024;
pub const MAX_CIPHERTEXT: u64 = 4096;
pub const PASSWORD: &str = "correct horse";

pub struct TestServer {
    pub base_url: String,
    pub client: reqwest::Client,
    pub notifier: Arc<MemoryNotifier>,
    pub remote: Arc<MemoryBackend>,
    pub local: Arc<MemoryBackend>,
    pub clock: Arc<ManualClock>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Register `email` and return the session token.
    pub async fn register(&self, email: &str) -> String {
        let resp = self
            .client
            .post(self.url("/api/auth/register"))
            .json(&json!({ "email": email, "password": PASSWORD, "fullName": "Test User" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 201, "register {email}");
        let body: Value = resp.json().await.unwrap();
        body["token"].as_str().unwrap().to_string()
    }

    pub fn last_token(&self, email: &str, kind: TemplateKind) -> String {
        self.notifier
            .last_token(email, kind)
            .unwrap_or_else(|| panic!("no {kind:?} email for {email}"))
    }

    pub async fn upload(&self, token: &str, name: &str, size: u64, content: &str) -> reqwest::Response {
        self.client
            .post(self.url("/api/files/upload"))
            .bearer_auth(token)
            .json(&json!({ "fileName": name, "fileSize": size, "encryptedContent": content }))
            .send()
            .await
            .unwrap()
    }
}

/// Start a server with an object-store primary and a local fallback.
pub async fn start_test_server() -> TestServer {
    start(true, false).await
}

/// Start a server that only has local storage.
pub async fn start_local_only_server() -> TestServer {
    start(false, false).await
}

/// Start a server with per-IP limits on the auth endpoints.
pub async fn start_rate_limited_server() -> TestServer {
    start(true, true).await
}

async fn start(with_remote: bool, rate_limit: bool) -> TestServer {
    let tmp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data_dir = tmp_dir.path().to_str().unwrap().to_string();

    let db = vault_server::db::init_db(&data_dir).expect("Failed to init DB");
    let jwt_secret = vault_server::auth::jwt::load_or_generate_jwt_secret(&data_dir)
        .expect("Failed to generate JWT secret");

    let clock = Arc::new(ManualClock::default());
    let notifier = Arc::new(MemoryNotifier::new());
    let remote = Arc::new(MemoryBackend::new());
    let local = Arc::new(MemoryBackend::new());

    let tokens = TokenService::new(&jwt_secret, chrono::Duration::hours(168), clock.clone());
    let credentials = CredentialStore::new(db.clone());
    let state = vault_server::state::AppState {
        accounts: Accounts::new(credentials.clone(), tokens.clone(), notifier.clone(), clock.clone()),
        tokens,
        credentials,
        vault: VaultService::new(
            with_remote.then(|| remote.clone() as Arc<dyn BlobBackend>),
            local.clone(),
            MetadataRegistry::new(db),
            LimitsConfig {
                max_plaintext_bytes: MAX_PLAINTEXT,
                max_ciphertext_bytes: MAX_CIPHERTEXT,
            },
            clock.clone(),
        ),
        rate_limit,
    };

    let app = vault_server::routes::build_router(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
        // Keep tmp_dir alive so the data directory isn't deleted
        let _keep = tmp_dir;
    });

    TestServer {
        base_url: format!("http://{}", addr),
        client: reqwest::Client::new(),
        notifier,
        remote,
        local,
        clock,
    }
}
