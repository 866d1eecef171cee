use clap::parser::ValueSource;
use clap::{CommandFactory, FromArgMatches, Parser};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Encrypted blob vault server
#[derive(Parser, Serialize, Deserialize, Clone, Debug)]
#[command(name = "vault-server", version, about = "Zero-knowledge encrypted blob vault")]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "VAULT_PORT", default_value = "4000")]
    pub port: u16,

    /// Bind address
    #[arg(long, env = "VAULT_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,

    /// Path to TOML config file
    #[arg(long, default_value = "./vault.toml")]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long, env = "VAULT_JSON_LOGS")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    pub generate_config: bool,

    /// Data directory for persistent state (DB, signing key, local blobs)
    #[arg(long, env = "VAULT_DATA_DIR", default_value = "./data")]
    pub data_dir: String,

    /// Session token lifetime in hours
    #[arg(long, env = "VAULT_TOKEN_TTL_HOURS", default_value = "168")]
    pub token_ttl_hours: u32,

    /// Base URL of the web client, used for links in emails
    #[arg(long, env = "VAULT_FRONTEND_URL", default_value = "http://localhost:3000")]
    pub frontend_url: String,

    /// Blob storage backend configuration (loaded from [storage] section in TOML)
    #[arg(skip)]
    #[serde(default, skip_serializing)]
    pub storage: StorageConfig,

    /// Upload size ceilings (loaded from [limits] section in TOML)
    #[arg(skip)]
    #[serde(default, skip_serializing)]
    pub limits: LimitsConfig,

    /// SMTP delivery (loaded from [smtp] section in TOML); emails are only logged when absent
    #[arg(skip)]
    #[serde(default, skip_serializing)]
    pub smtp: Option<SmtpConfig>,

    /// Auth endpoint rate limiting (loaded from [rate_limit] section in TOML)
    #[arg(skip)]
    #[serde(default, skip_serializing)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Local,
    S3,
}

/// Configuration for where ciphertext is written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Primary backend: "local" or "s3" (default: local)
    #[serde(default = "default_backend")]
    pub backend: BackendKind,

    /// S3 bucket name (required for the s3 backend)
    #[serde(default)]
    pub bucket: Option<String>,

    #[serde(default = "default_region")]
    pub region: String,

    /// Custom endpoint for S3-compatible services (MinIO, R2, ...)
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub access_key_id: Option<String>,

    #[serde(default)]
    pub secret_access_key: Option<String>,

    /// Object name prefix inside the bucket
    #[serde(default)]
    pub prefix: Option<String>,

    #[serde(default)]
    pub allow_http: bool,

    /// Local blob directory; also the fallback target (default: {data_dir}/uploads)
    #[serde(default)]
    pub local_dir: Option<String>,

    /// Upper bound on any single backend call (default: 30)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Local,
            bucket: None,
            region: default_region(),
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
            prefix: None,
            allow_http: false,
            local_dir: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_backend() -> BackendKind {
    BackendKind::Local
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

pub const MIB: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Largest declared plaintext size accepted (default: 25 MiB)
    #[serde(default = "default_max_plaintext")]
    pub max_plaintext_bytes: u64,

    /// Largest transmitted ciphertext accepted (default: 50 MiB)
    #[serde(default = "default_max_ciphertext")]
    pub max_ciphertext_bytes: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_plaintext_bytes: default_max_plaintext(),
            max_ciphertext_bytes: default_max_ciphertext(),
        }
    }
}

fn default_max_plaintext() -> u64 {
    25 * MIB
}

fn default_max_ciphertext() -> u64 {
    50 * MIB
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,

    #[serde(default = "default_smtp_port")]
    pub port: u16,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    pub from_address: String,

    #[serde(default = "default_from_name")]
    pub from_name: String,

    /// STARTTLS (default: true)
    #[serde(default = "default_use_tls")]
    pub use_tls: bool,
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from_name() -> String {
    "SecureCloud".to_string()
}

fn default_use_tls() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_rate_limit_enabled")]
    pub enabled: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn default_rate_limit_enabled() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 4000,
            bind_address: "0.0.0.0".to_string(),
            config: "./vault.toml".to_string(),
            json_logs: false,
            generate_config: false,
            data_dir: "./data".to_string(),
            token_ttl_hours: 168,
            frontend_url: "http://localhost:3000".to_string(),
            storage: StorageConfig::default(),
            limits: LimitsConfig::default(),
            smtp: None,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (VAULT_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        let matches = Config::command().get_matches();
        let cli = Config::from_arg_matches(&matches).unwrap_or_else(|e| e.exit());
        let config_path = cli.config.clone();

        // Only flags actually typed on the command line override lower layers;
        // clap's own defaults must not mask the TOML file.
        let mut explicit = serde_json::Map::new();
        if let serde_json::Value::Object(fields) = serde_json::to_value(&cli).unwrap_or_default() {
            for (key, value) in fields {
                if matches.value_source(&key) == Some(ValueSource::CommandLine) {
                    explicit.insert(key, value);
                }
            }
        }

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("VAULT_").split("__"))
            .merge(Serialized::defaults(explicit))
            .extract()
    }

    /// Local blob root: explicit `storage.local_dir`, else `{data_dir}/uploads`.
    pub fn local_blob_dir(&self) -> std::path::PathBuf {
        match &self.storage.local_dir {
            Some(dir) => std::path::PathBuf::from(dir),
            None => std::path::Path::new(&self.data_dir).join("uploads"),
        }
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Vault Server Configuration
# Place this file at ./vault.toml or specify with --config <path>
# All settings can be overridden via environment variables (VAULT_PORT,
# VAULT_STORAGE__BUCKET, etc.) or CLI flags (--port, etc.)

# Server port (default: 4000)
# port = 4000

# Bind address (default: 0.0.0.0, all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Data directory for SQLite database, JWT signing key and local blobs
# data_dir = "./data"

# Session token lifetime in hours (default: 168 = 7 days)
# token_ttl_hours = 168

# Web client base URL, used in verification and reset emails
# frontend_url = "http://localhost:3000"

# ---- Blob Storage ----
# [storage]

# Primary backend: "local" or "s3"
# backend = "local"

# S3 settings (credentials fall back to AWS_* environment variables)
# bucket = "my-vault-bucket"
# region = "us-east-1"
# endpoint = "http://localhost:9000"   # S3-compatible services
# access_key_id = ""
# secret_access_key = ""
# prefix = "uploads"
# allow_http = false

# Local blob directory; also used as fallback when the bucket is missing
# local_dir = "./data/uploads"

# Upper bound on each backend call, in seconds
# timeout_secs = 30

# ---- Upload Limits ----
# [limits]
# max_plaintext_bytes = 26214400    # 25 MiB declared file size
# max_ciphertext_bytes = 52428800   # 50 MiB encrypted payload

# ---- Email (omit to log links instead of sending) ----
# [smtp]
# host = "smtp.example.com"
# port = 587
# username = ""
# password = ""
# from_address = "noreply@example.com"
# from_name = "SecureCloud"
# use_tls = true

# ---- Rate Limiting ----
# [rate_limit]
# enabled = true   # 5 auth requests / 15 min, 3 password requests / hour, per IP
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.port, 4000);
        assert_eq!(config.storage.backend, BackendKind::Local);
        assert_eq!(config.limits.max_plaintext_bytes, 25 * MIB);
        assert_eq!(config.limits.max_ciphertext_bytes, 50 * MIB);
        assert!(config.smtp.is_none());
        assert!(config.rate_limit.enabled);
    }

    #[test]
    fn test_toml_sections_merge_over_defaults() {
        let toml = r#"
            port = 5000
            [storage]
            backend = "s3"
            bucket = "vault"
            [limits]
            max_plaintext_bytes = 10
        "#;
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::string(toml))
            .extract()
            .unwrap();

        assert_eq!(config.port, 5000);
        assert_eq!(config.storage.backend, BackendKind::S3);
        assert_eq!(config.storage.bucket.as_deref(), Some("vault"));
        assert_eq!(config.storage.timeout_secs, 30);
        assert_eq!(config.limits.max_plaintext_bytes, 10);
        assert_eq!(config.limits.max_ciphertext_bytes, 50 * MIB);
    }

    #[test]
    fn test_local_blob_dir_defaults_under_data_dir() {
        let mut config = Config::default();
        config.data_dir = "/srv/vault".into();
        assert_eq!(config.local_blob_dir(), std::path::PathBuf::from("/srv/vault/uploads"));

        config.storage.local_dir = Some("/mnt/blobs".into());
        assert_eq!(config.local_blob_dir(), std::path::PathBuf::from("/mnt/blobs"));
    }

    #[test]
    fn test_template_mentions_every_section() {
        let template = generate_config_template();
        for section in ["[storage]", "[limits]", "[smtp]", "[rate_limit]"] {
            assert!(template.contains(section), "missing {section}");
        }
    }
}
