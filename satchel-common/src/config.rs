//! Configuration loading and root folder resolution
//!
//! Config file resolution order:
//! 1. Command-line `--config` argument
//! 2. `SATCHEL_CONFIG` environment variable
//! 3. `<config_dir>/satchel/satchel.toml`
//! 4. Built-in defaults
//!
//! Secrets may be overridden from the environment after the file is loaded.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const CONFIG_ENV: &str = "SATCHEL_CONFIG";
pub const ROOT_FOLDER_ENV: &str = "SATCHEL_ROOT_FOLDER";
pub const AUTH_SECRET_ENV: &str = "SATCHEL_AUTH_SECRET";
pub const WORKER_SECRET_ENV: &str = "SATCHEL_WORKER_SECRET";
pub const WORKER_PRINCIPAL_ENV: &str = "SATCHEL_WORKER_PRINCIPAL";
pub const CLASSIFIER_URL_ENV: &str = "SATCHEL_CLASSIFIER_URL";

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "satchel.db";
/// Blob directory name inside the root folder
pub const BLOB_DIR: &str = "blobs";

/// Top-level service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Data root folder (database + blobs)
    pub root_folder: Option<PathBuf>,
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub uploads: UploadConfig,
    pub quota: QuotaConfig,
    pub invitations: InvitationConfig,
    pub worker: WorkerConfig,
    pub classifier: ClassifierConfig,
    pub push: PushConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Base URL used when building invitation and calendar feed links
    pub public_base_url: String,
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5780".to_string(),
            public_base_url: "http://localhost:5780".to_string(),
            cors_origins: vec!["http://localhost:3000".to_string()],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HS256 secret for client bearer tokens
    pub token_secret: Option<String>,
    /// Activate brand-new identities at first contact
    pub auto_activate: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub max_bytes: usize,
    pub max_pdf_pages: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_bytes: 10 * 1024 * 1024,
            max_pdf_pages: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Documents per calendar month on the free plan
    pub free_monthly_documents: i64,
    pub enforce: bool,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            free_monthly_documents: 5,
            enforce: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InvitationConfig {
    pub expiry_days: i64,
}

impl Default for InvitationConfig {
    fn default() -> Self {
        Self { expiry_days: 7 }
    }
}

/// Job queue backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueKind {
    /// In-process dispatcher
    Local,
    /// External queue calling back into `/worker/analyze`
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Expected `email` claim of queue-issued worker tokens
    pub principal: Option<String>,
    pub token_secret: Option<String>,
    /// When false (local development) worker tokens are not checked
    pub verify_tokens: bool,
    pub queue: QueueKind,
    /// Worker endpoint for the http queue
    pub endpoint: Option<String>,
    pub concurrency: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            principal: None,
            token_secret: None,
            verify_tokens: true,
            queue: QueueKind::Local,
            endpoint: None,
            concurrency: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub endpoint: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    pub enabled: bool,
    pub ttl_secs: u64,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl_secs: 86_400,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

impl ServiceConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid config: {}", e)))
    }

    /// Load configuration following the resolution order, then apply env overrides
    ///
    /// A missing config file is not an error: defaults are used.
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let mut config = match resolve_config_path(cli_path) {
            Some(path) if path.exists() => {
                let content = std::fs::read_to_string(&path)?;
                info!("Loaded configuration from {}", path.display());
                Self::from_toml_str(&content)?
            }
            Some(path) => {
                warn!("Config file {} not found, using defaults", path.display());
                Self::default()
            }
            None => {
                warn!("No config file location available, using defaults");
                Self::default()
            }
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Override secrets and endpoints from the environment
    pub fn apply_env_overrides(&mut self) {
        if let Ok(secret) = std::env::var(AUTH_SECRET_ENV) {
            self.auth.token_secret = Some(secret);
        }
        if let Ok(secret) = std::env::var(WORKER_SECRET_ENV) {
            self.worker.token_secret = Some(secret);
        }
        if let Ok(principal) = std::env::var(WORKER_PRINCIPAL_ENV) {
            self.worker.principal = Some(principal);
        }
        if let Ok(url) = std::env::var(CLASSIFIER_URL_ENV) {
            self.classifier.endpoint = Some(url);
        }
    }

    /// Public calendar feed URL for a feed token
    pub fn ical_url(&self, token: &str) -> String {
        format!("{}/ical/{}", self.server.public_base_url.trim_end_matches('/'), token)
    }

    /// Redemption URL for an invitation token
    pub fn invite_url(&self, token: &str) -> String {
        format!(
            "{}/invite?token={}",
            self.server.public_base_url.trim_end_matches('/'),
            token
        )
    }
}

/// Resolve the config file path (CLI, env, user config dir)
pub fn resolve_config_path(cli_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_path {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return Some(PathBuf::from(path));
    }

    dirs::config_dir().map(|d| d.join("satchel").join("satchel.toml"))
}

/// Root folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&Path>, config: &ServiceConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        return PathBuf::from(path);
    }

    if let Some(path) = &config.root_folder {
        return path.clone();
    }

    default_root_folder()
}

fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("satchel"))
        .unwrap_or_else(|| PathBuf::from("./satchel_data"))
}
