//! Runtime container specification for one tenant.

use std::collections::HashMap;
use std::fmt;

use crate::message::BotPayload;
use crate::settings::ExecutorSettings;

/// Labels that opt the container's JSON logs into the log shipper.
pub const LOG_SHIPPING_LABELS: [(&str, &str); 4] = [
    ("co.elastic.logs/enabled", "true"),
    ("co.elastic.logs/json.overwrite_keys", "true"),
    ("co.elastic.logs/json.add_error_key", "true"),
    ("co.elastic.logs/json.expand_keys", "true"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartPolicy {
    /// Restart after crashes and daemon restarts, but not after an explicit stop.
    UnlessStopped,
}

/// Everything the runtime needs to create a tenant container.
#[derive(Clone, PartialEq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    /// `KEY=VALUE` pairs.
    pub env: Vec<String>,
    pub labels: HashMap<String, String>,
    /// Published TCP port, identical on host and container side.
    pub port: u16,
    pub network_mode: String,
    pub restart_policy: RestartPolicy,
    pub tty: bool,
}

impl ContainerSpec {
    /// Build the spec for a tenant's bot container.
    ///
    /// The environment carries every forwarded setting, then the tenant's
    /// token and identity triple, then its display metadata and port.
    pub fn for_tenant(
        settings: &ExecutorSettings,
        payload: &BotPayload,
        container_name: &str,
        port: u16,
    ) -> Self {
        let mut env = settings.container_env();
        env.extend([
            format!("TELEGRAM_BOT_TOKEN={}", payload.api_token),
            format!("CONTAINER_BOT_ID={}", payload.bot_id),
            format!("CONTAINER_PROJECT_ID={}", payload.project_id),
            format!("CONTAINER_USER_ID={}", payload.user_id),
            format!("CONTAINER_NAME={}", payload.name),
            format!("CONTAINER_DESCRIPTION={}", payload.description),
            format!("CONTAINER_ICON={}", payload.icon),
            format!("CONTAINER_PORT={}", port),
        ]);

        Self {
            name: container_name.to_string(),
            image: settings.docker.image_name.clone(),
            env,
            labels: LOG_SHIPPING_LABELS
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            port,
            network_mode: "host".to_string(),
            restart_policy: RestartPolicy::UnlessStopped,
            tty: true,
        }
    }
}

// Env values hold credentials; only the keys are printed.
impl fmt::Debug for ContainerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let env_keys: Vec<&str> = self
            .env
            .iter()
            .map(|kv| kv.split_once('=').map_or(kv.as_str(), |(k, _)| k))
            .collect();
        f.debug_struct("ContainerSpec")
            .field("name", &self.name)
            .field("image", &self.image)
            .field("env", &env_keys)
            .field("labels", &self.labels)
            .field("port", &self.port)
            .field("network_mode", &self.network_mode)
            .field("restart_policy", &self.restart_policy)
            .field("tty", &self.tty)
            .finish()
    }
}
