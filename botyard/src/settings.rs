//! Resolved executor configuration.
//!
//! Most sections are not used by the executor itself: they are forwarded to
//! every tenant container as environment variables (see
//! [`ExecutorSettings::container_env`]).

use std::path::PathBuf;
use std::time::Duration;

use botyard_shared::errors::{BotyardError, BotyardResult};
use dirs::home_dir;
use serde::{Deserialize, Serialize};

/// Directory under `$HOME` holding the default database.
pub const BOTYARD_DIR: &str = ".botyard";

// ============================================================================
// Executor-owned sections
// ============================================================================

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file holding container records.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

fn default_db_path() -> PathBuf {
    let mut path = home_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push(BOTYARD_DIR);
    path.push("botyard.db");
    path
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DockerSettings {
    /// Image every tenant container is created from.
    #[serde(default)]
    pub image_name: String,

    /// Grace period in seconds before the runtime force-kills on stop.
    #[serde(default = "default_stop_timeout")]
    pub timeout: i32,

    /// Pull the image before each container create.
    #[serde(default)]
    pub pull_image: bool,

    /// Daemon unix socket. Local defaults (`DOCKER_HOST` or the standard
    /// socket) are used when unset.
    #[serde(default)]
    pub socket: Option<PathBuf>,
}

fn default_stop_timeout() -> i32 {
    10
}

impl Default for DockerSettings {
    fn default() -> Self {
        Self {
            image_name: String::new(),
            timeout: default_stop_timeout(),
            pull_image: false,
            socket: None,
        }
    }
}

impl DockerSettings {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout.max(0) as u64)
    }
}

// ============================================================================
// Forwarded sections
// ============================================================================

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PostgresSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub db_name: String,
    pub ssl_mode: String,
    pub migrations_path: String,
}

impl Default for PostgresSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: String::new(),
            password: String::new(),
            db_name: String::new(),
            ssl_mode: "disable".to_string(),
            migrations_path: String::new(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MinioSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub articles_bucket: String,
    pub attachments_bucket: String,
    pub avatars_bucket: String,
    pub use_ssl: bool,
    /// Presigned URL lifetime, passed through verbatim (e.g. `4h`).
    pub url_lifetime: String,
}

impl Default for MinioSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 9000,
            user: String::new(),
            password: String::new(),
            articles_bucket: String::new(),
            attachments_bucket: String::new(),
            avatars_bucket: String::new(),
            use_ssl: false,
            url_lifetime: "4h".to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenRouterSettings {
    pub token: String,
    pub model: String,
    pub url: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GigaChatSettings {
    pub grpc_address: String,
    pub auth_url: String,
    pub authorization_key: String,
    pub scope: String,
    pub model: String,
}

// ============================================================================
// Executor Settings
// ============================================================================

/// Fully resolved settings handed to the orchestrator.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutorSettings {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub docker: DockerSettings,

    #[serde(default)]
    pub postgres: PostgresSettings,

    #[serde(default)]
    pub minio: MinioSettings,

    #[serde(default)]
    pub open_router_ai: OpenRouterSettings,

    #[serde(default)]
    pub gigachat: GigaChatSettings,

    #[serde(default)]
    pub search_url: String,

    /// Upper bound on dispatches in flight across different owners.
    #[serde(default = "default_max_concurrent_dispatch")]
    pub max_concurrent_dispatch: usize,
}

fn default_max_concurrent_dispatch() -> usize {
    1
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            database: DatabaseSettings::default(),
            docker: DockerSettings::default(),
            postgres: PostgresSettings::default(),
            minio: MinioSettings::default(),
            open_router_ai: OpenRouterSettings::default(),
            gigachat: GigaChatSettings::default(),
            search_url: String::new(),
            max_concurrent_dispatch: default_max_concurrent_dispatch(),
        }
    }
}

impl ExecutorSettings {
    /// Reject settings the orchestrator can't run with.
    pub fn validate(&self) -> BotyardResult<()> {
        if self.docker.image_name.trim().is_empty() {
            return Err(BotyardError::Config(
                "docker.image_name must be set".to_string(),
            ));
        }
        if self.docker.timeout <= 0 {
            return Err(BotyardError::Config(format!(
                "docker.timeout must be positive, got {}",
                self.docker.timeout
            )));
        }
        if self.max_concurrent_dispatch == 0 {
            return Err(BotyardError::Config(
                "max_concurrent_dispatch must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Every forwarded setting as `KEY=VALUE`, in a stable order.
    pub fn container_env(&self) -> Vec<String> {
        let pg = &self.postgres;
        let minio = &self.minio;
        let or = &self.open_router_ai;
        let giga = &self.gigachat;
        vec![
            format!("POSTGRES_HOST={}", pg.host),
            format!("POSTGRES_PORT={}", pg.port),
            format!("POSTGRES_USER={}", pg.user),
            format!("POSTGRES_PASSWORD={}", pg.password),
            format!("POSTGRES_DB_NAME={}", pg.db_name),
            format!("POSTGRES_SSL_MODE={}", pg.ssl_mode),
            format!("POSTGRES_MIGRATIONS_PATH={}", pg.migrations_path),
            format!("MINIO_HOST={}", minio.host),
            format!("MINIO_PORT={}", minio.port),
            format!("MINIO_ROOT_USER={}", minio.user),
            format!("MINIO_ROOT_PASSWORD={}", minio.password),
            format!("MINIO_ARTICLES_BUCKET={}", minio.articles_bucket),
            format!("MINIO_ATTACHMENTS_BUCKET={}", minio.attachments_bucket),
            format!("MINIO_AVATARS_BUCKET={}", minio.avatars_bucket),
            format!("MINIO_USE_SSL={}", minio.use_ssl),
            format!("MINIO_URL_LIFETIME={}", minio.url_lifetime),
            format!("SEARCH_URL={}", self.search_url),
            format!("OPEN_ROUTER_API_TOKEN={}", or.token),
            format!("OPEN_ROUTER_API_MODEL={}", or.model),
            format!("OPEN_ROUTER_API_URL={}", or.url),
            format!("GIGACHAT_GRPC_ADDRESS={}", giga.grpc_address),
            format!("GIGACHAT_AUTH_URL={}", giga.auth_url),
            format!("GIGACHAT_AUTHORIZATION_KEY={}", giga.authorization_key),
            format!("GIGACHAT_SCOPE={}", giga.scope),
            format!("GIGACHAT_MODEL={}", giga.model),
        ]
    }
}
