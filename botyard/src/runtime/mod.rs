//! Container runtime boundary.
//!
//! The orchestrator only talks to [`RuntimeClient`]; [`DockerRuntime`] is the
//! production implementation.

mod container_spec;
mod docker;
pub mod shutdown;

use std::time::Duration;

use async_trait::async_trait;
use botyard_shared::errors::BotyardResult;
use futures::stream::BoxStream;
use serde::Serialize;

pub use container_spec::{ContainerSpec, LOG_SHIPPING_LABELS, RestartPolicy};
pub use docker::DockerRuntime;

/// Chunks of container output, in the order the runtime produced them.
pub type LogStream = BoxStream<'static, BotyardResult<Vec<u8>>>;

/// What the runtime reports about one container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuntimeStatus {
    pub id: String,
    /// Runtime status word (`created`, `running`, `exited`, ...).
    pub status: String,
    pub running: bool,
}

/// Operations the orchestrator needs from a container runtime.
///
/// Any call naming a container the runtime doesn't know must fail with
/// `BotyardError::NoSuchContainer`. Starting a running container and
/// stopping a stopped one succeed.
#[async_trait]
pub trait RuntimeClient: Send + Sync {
    /// Create (but don't start) a container; returns the runtime id.
    async fn create_container(&self, spec: &ContainerSpec) -> BotyardResult<String>;

    async fn start_container(&self, runtime_id: &str) -> BotyardResult<()>;

    /// Stop with a grace period, after which the runtime kills the container.
    async fn stop_container(&self, runtime_id: &str, timeout: Duration) -> BotyardResult<()>;

    async fn inspect_container(&self, runtime_id: &str) -> BotyardResult<RuntimeStatus>;

    /// Output produced so far by the container.
    async fn stream_logs(&self, runtime_id: &str) -> BotyardResult<LogStream>;

    async fn pull_image(&self, image: &str) -> BotyardResult<()>;
}
