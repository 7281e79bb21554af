//! Docker implementation of [`RuntimeClient`] via the daemon's HTTP API.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use bollard::{
    API_DEFAULT_VERSION, Docker,
    errors::Error as BollardError,
    models::{
        ContainerCreateBody, HostConfig, PortBinding, RestartPolicy as DockerRestartPolicy,
        RestartPolicyNameEnum,
    },
    query_parameters::{
        CreateContainerOptionsBuilder, CreateImageOptionsBuilder, InspectContainerOptions,
        LogsOptionsBuilder, StartContainerOptions, StopContainerOptionsBuilder,
    },
};
use futures::{StreamExt, TryStreamExt};

use botyard_shared::errors::{BotyardError, BotyardResult};

use super::{ContainerSpec, LogStream, RestartPolicy, RuntimeClient, RuntimeStatus};

/// Request timeout for an explicitly configured socket.
const DOCKER_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Daemon answer for "already in the requested state".
const NOT_MODIFIED: u16 = 304;
const NOT_FOUND: u16 = 404;

/// Runtime client backed by a Docker daemon.
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect to `socket`, or to the local defaults (`DOCKER_HOST` or the
    /// standard socket) when none is given.
    pub fn connect(socket: Option<&Path>) -> BotyardResult<Self> {
        let docker = match socket {
            Some(path) => Docker::connect_with_socket(
                &path.to_string_lossy(),
                DOCKER_REQUEST_TIMEOUT_SECS,
                API_DEFAULT_VERSION,
            ),
            None => Docker::connect_with_local_defaults(),
        }
        .map_err(|e| BotyardError::Runtime(format!("failed to connect to docker: {}", e)))?;
        Ok(Self { docker })
    }
}

fn status_code(error: &BollardError) -> Option<u16> {
    match error {
        BollardError::DockerResponseServerError { status_code, .. } => Some(*status_code),
        _ => None,
    }
}

/// Map a daemon error on a container operation. 404 becomes the structured
/// `NoSuchContainer` condition.
fn container_error(operation: &'static str, target: &str, source: BollardError) -> BotyardError {
    if status_code(&source) == Some(NOT_FOUND) {
        return BotyardError::NoSuchContainer(target.to_string());
    }
    BotyardError::Runtime(format!("{} {}: {}", operation, target, source))
}

/// Split `registry:5000/repo/image:tag` into image and tag (default `latest`).
fn split_image_ref(image: &str) -> (&str, &str) {
    match image.rsplit_once(':') {
        Some((name, tag)) if !tag.contains('/') => (name, tag),
        _ => (image, "latest"),
    }
}

fn host_config(spec: &ContainerSpec) -> HostConfig {
    let binding = PortBinding {
        host_ip: Some("0.0.0.0".to_string()),
        host_port: Some(spec.port.to_string()),
    };
    let restart_policy = match spec.restart_policy {
        RestartPolicy::UnlessStopped => DockerRestartPolicy {
            name: Some(RestartPolicyNameEnum::UNLESS_STOPPED),
            maximum_retry_count: None,
        },
    };
    HostConfig {
        port_bindings: Some(HashMap::from([(
            format!("{}/tcp", spec.port),
            Some(vec![binding]),
        )])),
        restart_policy: Some(restart_policy),
        network_mode: Some(spec.network_mode.clone()),
        ..HostConfig::default()
    }
}

#[async_trait]
impl RuntimeClient for DockerRuntime {
    async fn create_container(&self, spec: &ContainerSpec) -> BotyardResult<String> {
        let body = ContainerCreateBody {
            image: Some(spec.image.clone()),
            tty: Some(spec.tty),
            env: Some(spec.env.clone()),
            labels: Some(spec.labels.clone()),
            host_config: Some(host_config(spec)),
            ..ContainerCreateBody::default()
        };

        let response = self
            .docker
            .create_container(
                Some(CreateContainerOptionsBuilder::new().name(&spec.name).build()),
                body,
            )
            .await
            .map_err(|e| BotyardError::Runtime(format!("create_container {}: {}", spec.name, e)))?;

        for warning in &response.warnings {
            tracing::warn!(container = %spec.name, "Docker create warning: {}", warning);
        }
        Ok(response.id)
    }

    async fn start_container(&self, runtime_id: &str) -> BotyardResult<()> {
        match self
            .docker
            .start_container(runtime_id, None::<StartContainerOptions>)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if status_code(&e) == Some(NOT_MODIFIED) => {
                tracing::debug!(container_id = %runtime_id, "Container already running");
                Ok(())
            }
            Err(e) => Err(container_error("start_container", runtime_id, e)),
        }
    }

    async fn stop_container(&self, runtime_id: &str, timeout: Duration) -> BotyardResult<()> {
        let grace = i32::try_from(timeout.as_secs()).unwrap_or(i32::MAX);
        match self
            .docker
            .stop_container(
                runtime_id,
                Some(StopContainerOptionsBuilder::new().t(grace).build()),
            )
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if status_code(&e) == Some(NOT_MODIFIED) => {
                tracing::debug!(container_id = %runtime_id, "Container already stopped");
                Ok(())
            }
            Err(e) => Err(container_error("stop_container", runtime_id, e)),
        }
    }

    async fn inspect_container(&self, runtime_id: &str) -> BotyardResult<RuntimeStatus> {
        let response = self
            .docker
            .inspect_container(runtime_id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| container_error("inspect_container", runtime_id, e))?;

        let state = response.state.unwrap_or_default();
        Ok(RuntimeStatus {
            id: response.id.unwrap_or_else(|| runtime_id.to_string()),
            status: state
                .status
                .map(|s| s.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            running: state.running.unwrap_or(false),
        })
    }

    async fn stream_logs(&self, runtime_id: &str) -> BotyardResult<LogStream> {
        let options = LogsOptionsBuilder::new()
            .stdout(true)
            .stderr(true)
            .follow(false)
            .build();
        let target = runtime_id.to_string();
        let stream = self
            .docker
            .logs(runtime_id, Some(options))
            .map(move |chunk| {
                chunk
                    .map(|output| output.into_bytes().to_vec())
                    .map_err(|e| container_error("logs", &target, e))
            })
            .boxed();
        Ok(stream)
    }

    async fn pull_image(&self, image: &str) -> BotyardResult<()> {
        let (from_image, tag) = split_image_ref(image);
        tracing::info!(image = %image, "Pulling image");
        self.docker
            .create_image(
                Some(
                    CreateImageOptionsBuilder::new()
                        .from_image(from_image)
                        .tag(tag)
                        .build(),
                ),
                None,
                None,
            )
            .try_collect::<Vec<_>>()
            .await
            .map_err(|e| BotyardError::Runtime(format!("pull_image {}: {}", image, e)))?;
        Ok(())
    }
}
