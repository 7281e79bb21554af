//! Configuration loading for the botyard CLI.
//!
//! Handles loading [`ExecutorSettings`] from JSON and YAML files, and the
//! environment variables that override individual file values.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use anyhow::Context;
use botyard::ExecutorSettings;

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml") | Some("yml")
    )
}

/// Load settings from `path`. The extension picks the format; anything other
/// than `.yaml`/`.yml` is read as JSON. Unset fields take their defaults.
pub fn load_config(path: &Path) -> anyhow::Result<ExecutorSettings> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;

    let settings = if is_yaml(path) {
        serde_yaml::from_str::<ExecutorSettings>(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?
    } else {
        serde_json::from_str::<ExecutorSettings>(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?
    };

    tracing::debug!(
        config = %path.display(),
        image = %settings.docker.image_name,
        "Loaded settings"
    );
    Ok(settings)
}

/// Variables read by [`apply_env_overrides`]. Names match the ones the
/// settings are forwarded under, so one environment configures both the
/// executor and its containers.
const ENV_KEYS: &[&str] = &[
    "TELEGRAM_IMAGE_NAME",
    "TELEGRAM_TIMEOUT",
    "POSTGRES_HOST",
    "POSTGRES_PORT",
    "POSTGRES_USER",
    "POSTGRES_PASSWORD",
    "POSTGRES_DB_NAME",
    "POSTGRES_SSL_MODE",
    "POSTGRES_MIGRATIONS_PATH",
    "MINIO_HOST",
    "MINIO_PORT",
    "MINIO_ROOT_USER",
    "MINIO_ROOT_PASSWORD",
    "MINIO_ARTICLES_BUCKET",
    "MINIO_ATTACHMENTS_BUCKET",
    "MINIO_AVATARS_BUCKET",
    "MINIO_USE_SSL",
    "MINIO_URL_LIFETIME",
    "SEARCH_URL",
    "OPEN_ROUTER_API_TOKEN",
    "OPEN_ROUTER_API_MODEL",
    "OPEN_ROUTER_API_URL",
    "GIGACHAT_GRPC_ADDRESS",
    "GIGACHAT_AUTH_URL",
    "GIGACHAT_AUTHORIZATION_KEY",
    "GIGACHAT_SCOPE",
    "GIGACHAT_MODEL",
];

/// Overlay the process environment on `settings`. Set variables win over
/// file values; unset ones leave them alone.
pub fn apply_env_overrides(settings: &mut ExecutorSettings) -> anyhow::Result<()> {
    let mut envs = HashMap::new();
    for key in ENV_KEYS {
        if let Ok(value) = std::env::var(key) {
            envs.insert(key.to_string(), value);
        }
    }
    apply_env_map(settings, &envs)
}

fn apply_env_map(
    settings: &mut ExecutorSettings,
    envs: &HashMap<String, String>,
) -> anyhow::Result<()> {
    let docker = &mut settings.docker;
    set_string(&mut docker.image_name, envs, "TELEGRAM_IMAGE_NAME");
    set_parsed(&mut docker.timeout, envs, "TELEGRAM_TIMEOUT")?;

    let pg = &mut settings.postgres;
    set_string(&mut pg.host, envs, "POSTGRES_HOST");
    set_parsed(&mut pg.port, envs, "POSTGRES_PORT")?;
    set_string(&mut pg.user, envs, "POSTGRES_USER");
    set_string(&mut pg.password, envs, "POSTGRES_PASSWORD");
    set_string(&mut pg.db_name, envs, "POSTGRES_DB_NAME");
    set_string(&mut pg.ssl_mode, envs, "POSTGRES_SSL_MODE");
    set_string(&mut pg.migrations_path, envs, "POSTGRES_MIGRATIONS_PATH");

    let minio = &mut settings.minio;
    set_string(&mut minio.host, envs, "MINIO_HOST");
    set_parsed(&mut minio.port, envs, "MINIO_PORT")?;
    set_string(&mut minio.user, envs, "MINIO_ROOT_USER");
    set_string(&mut minio.password, envs, "MINIO_ROOT_PASSWORD");
    set_string(&mut minio.articles_bucket, envs, "MINIO_ARTICLES_BUCKET");
    set_string(&mut minio.attachments_bucket, envs, "MINIO_ATTACHMENTS_BUCKET");
    set_string(&mut minio.avatars_bucket, envs, "MINIO_AVATARS_BUCKET");
    set_string(&mut minio.url_lifetime, envs, "MINIO_URL_LIFETIME");
    if let Some(raw) = envs.get("MINIO_USE_SSL") {
        minio.use_ssl = parse_bool(raw)
            .with_context(|| format!("invalid MINIO_USE_SSL={:?}", raw))?;
    }

    set_string(&mut settings.search_url, envs, "SEARCH_URL");

    let or = &mut settings.open_router_ai;
    set_string(&mut or.token, envs, "OPEN_ROUTER_API_TOKEN");
    set_string(&mut or.model, envs, "OPEN_ROUTER_API_MODEL");
    set_string(&mut or.url, envs, "OPEN_ROUTER_API_URL");

    let giga = &mut settings.gigachat;
    set_string(&mut giga.grpc_address, envs, "GIGACHAT_GRPC_ADDRESS");
    set_string(&mut giga.auth_url, envs, "GIGACHAT_AUTH_URL");
    set_string(&mut giga.authorization_key, envs, "GIGACHAT_AUTHORIZATION_KEY");
    set_string(&mut giga.scope, envs, "GIGACHAT_SCOPE");
    set_string(&mut giga.model, envs, "GIGACHAT_MODEL");
    Ok(())
}

fn set_string(field: &mut String, envs: &HashMap<String, String>, key: &str) {
    if let Some(value) = envs.get(key) {
        *field = value.clone();
    }
}

fn set_parsed<T>(field: &mut T, envs: &HashMap<String, String>, key: &str) -> anyhow::Result<()>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    if let Some(raw) = envs.get(key) {
        *field = raw
            .trim()
            .parse()
            .with_context(|| format!("invalid {}={:?}", key, raw))?;
    }
    Ok(())
}

fn parse_bool(raw: &str) -> anyhow::Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" | "yes" | "on" => Ok(true),
        "0" | "f" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("expected a boolean, got {:?}", other),
    }
}
