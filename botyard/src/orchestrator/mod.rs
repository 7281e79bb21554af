//! Reconciles `run`/`stop` messages against the store and the runtime.
//!
//! A `run` for an owner key with no live record provisions a new container.
//! A `run` for a known key restarts the recorded container, and when the
//! runtime has lost it the stale record is retired and a fresh container is
//! provisioned. A `stop` halts the container and persists `stopped`.
//!
//! Dispatches for the same owner key are serialized; different owners run
//! concurrently.

mod owner_locks;
mod sweep;

use std::future::Future;
use std::sync::Arc;

use botyard_shared::errors::{BotyardError, BotyardResult};
use chrono::{SecondsFormat, Utc};
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::message::{BotMessage, BotPayload, MessageKind};
use crate::models::{ContainerRecord, ContainerState, NewContainerRecord, OwnerKey};
use crate::naming;
use crate::port;
use crate::repository::ContainersRepository;
use crate::runtime::{ContainerSpec, RuntimeClient};
use crate::settings::ExecutorSettings;

use owner_locks::OwnerLocks;
pub use sweep::{SweepFailure, SweepReport};

/// What a dispatch did.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// No live record existed; a new container was provisioned.
    Created(ContainerRecord),
    /// The recorded container was (re)started.
    Reused(ContainerRecord),
    /// The recorded container was gone from the runtime. `stale_id` is the
    /// retired record, `record` its replacement.
    Recreated {
        stale_id: i64,
        record: ContainerRecord,
    },
    Stopped(ContainerRecord),
}

impl DispatchOutcome {
    pub fn record(&self) -> &ContainerRecord {
        match self {
            Self::Created(record) | Self::Reused(record) | Self::Stopped(record) => record,
            Self::Recreated { record, .. } => record,
        }
    }
}

/// Race `fut` against `cancel`.
async fn cancellable<T, F>(cancel: &CancellationToken, what: &str, fut: F) -> BotyardResult<T>
where
    F: Future<Output = BotyardResult<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(BotyardError::Cancelled(what.to_string())),
        res = fut => res,
    }
}

pub struct Orchestrator {
    settings: Arc<ExecutorSettings>,
    repo: Arc<dyn ContainersRepository>,
    runtime: Arc<dyn RuntimeClient>,
    owner_locks: OwnerLocks,
}

impl Orchestrator {
    pub fn new(
        settings: Arc<ExecutorSettings>,
        repo: Arc<dyn ContainersRepository>,
        runtime: Arc<dyn RuntimeClient>,
    ) -> Self {
        Self {
            settings,
            repo,
            runtime,
            owner_locks: OwnerLocks::default(),
        }
    }

    /// Apply one control message.
    ///
    /// Errors are returned untouched; the caller decides whether the message
    /// is retried. Once `cancel` fires the in-flight runtime call or lookup is
    /// abandoned with `Cancelled`. Store writes and the create-then-record
    /// pair always run to completion, so a created container is never left
    /// without a record.
    pub async fn dispatch(
        &self,
        message: &BotMessage,
        cancel: &CancellationToken,
    ) -> BotyardResult<DispatchOutcome> {
        let owner = message.owner_key();
        let _guard = cancellable(cancel, "waiting for owner lock", async {
            Ok(self.owner_locks.acquire(owner).await)
        })
        .await?;

        debug!(owner = %owner, kind = ?message.kind, "Dispatching message");
        match message.kind {
            MessageKind::Run => self.run(&message.payload, cancel).await,
            MessageKind::Stop => self.stop(owner, cancel).await,
        }
    }

    async fn run(
        &self,
        payload: &BotPayload,
        cancel: &CancellationToken,
    ) -> BotyardResult<DispatchOutcome> {
        let owner = payload.owner_key();
        let seed = Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true);
        let container_name = naming::normalize(&payload.name, &seed);

        match cancellable(cancel, "find record", self.repo.find_by_owner_key(&owner)).await {
            Ok(existing) => self.resume(existing, payload, &container_name, cancel).await,
            Err(e) if e.is_not_found() => {
                let record = self.provision(payload, &container_name, cancel).await?;
                info!(
                    owner = %owner,
                    container_id = %record.runtime_container_id,
                    port = record.port,
                    "Container created"
                );
                Ok(DispatchOutcome::Created(record))
            }
            Err(e) => Err(e),
        }
    }

    /// Found branch: restart the recorded container, or replace it when the
    /// runtime no longer knows it.
    async fn resume(
        &self,
        mut record: ContainerRecord,
        payload: &BotPayload,
        container_name: &str,
        cancel: &CancellationToken,
    ) -> BotyardResult<DispatchOutcome> {
        let started = cancellable(
            cancel,
            "start container",
            self.runtime.start_container(&record.runtime_container_id),
        )
        .await;

        match started {
            Ok(()) => {
                // Display metadata stays as created: the running container
                // still carries it in its environment.
                if record.state != ContainerState::Running {
                    self.repo.set_state(ContainerState::Running, record.id).await?;
                    record.state = ContainerState::Running;
                }
                self.copy_logs(&record.runtime_container_id, cancel).await?;
                info!(
                    owner = %record.owner,
                    container_id = %record.runtime_container_id,
                    "Container started"
                );
                Ok(DispatchOutcome::Reused(record))
            }
            Err(e) if e.is_no_such_container() => {
                warn!(
                    owner = %record.owner,
                    record_id = record.id,
                    container_id = %record.runtime_container_id,
                    "Recorded container is gone from the runtime, recreating"
                );
                self.repo.stop_state(record.id, record.owner.bot_id).await?;
                self.repo.delete_by_id(record.id).await?;

                let fresh = self.provision(payload, container_name, cancel).await?;
                info!(
                    owner = %fresh.owner,
                    stale_id = record.id,
                    container_id = %fresh.runtime_container_id,
                    "Container recreated"
                );
                Ok(DispatchOutcome::Recreated {
                    stale_id: record.id,
                    record: fresh,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Create, record and start a new container.
    async fn provision(
        &self,
        payload: &BotPayload,
        container_name: &str,
        cancel: &CancellationToken,
    ) -> BotyardResult<ContainerRecord> {
        let image = &self.settings.docker.image_name;
        if self.settings.docker.pull_image {
            cancellable(cancel, "pull image", self.runtime.pull_image(image)).await?;
        }

        let reservation = port::reserve_free_port()?;
        let spec =
            ContainerSpec::for_tenant(&self.settings, payload, container_name, reservation.port());
        let port = reservation.release();
        debug!(spec = ?spec, "Creating container");

        if cancel.is_cancelled() {
            return Err(BotyardError::Cancelled("create container".to_string()));
        }

        // Not raced against `cancel`: the daemon may finish a create whose
        // request was dropped, and that container must end up recorded.
        let runtime_id = self.runtime.create_container(&spec).await?;
        let id = self
            .repo
            .create(&NewContainerRecord {
                runtime_container_id: runtime_id.clone(),
                container_name: container_name.to_string(),
                port,
                owner: payload.owner_key(),
                metadata: payload.metadata(),
            })
            .await?;
        self.repo.set_state(ContainerState::Running, id).await?;

        let record = cancellable(cancel, "read record", self.repo.find_by_id(id)).await?;

        cancellable(cancel, "start container", self.runtime.start_container(&runtime_id)).await?;
        self.copy_logs(&runtime_id, cancel).await?;
        Ok(record)
    }

    async fn stop(
        &self,
        owner: OwnerKey,
        cancel: &CancellationToken,
    ) -> BotyardResult<DispatchOutcome> {
        let mut record =
            cancellable(cancel, "find record", self.repo.find_by_owner_key(&owner)).await?;
        self.stop_record(&record, cancel).await?;
        record.state = ContainerState::Stopped;
        info!(
            owner = %owner,
            container_id = %record.runtime_container_id,
            "Container stopped"
        );
        Ok(DispatchOutcome::Stopped(record))
    }

    /// Runtime stop first; state is only persisted once the runtime agreed.
    async fn stop_record(
        &self,
        record: &ContainerRecord,
        cancel: &CancellationToken,
    ) -> BotyardResult<()> {
        cancellable(
            cancel,
            "stop container",
            self.runtime
                .stop_container(&record.runtime_container_id, self.settings.docker.stop_timeout()),
        )
        .await?;
        self.repo.stop_state(record.id, record.owner.bot_id).await
    }

    /// Copy the container's output so far to our stdout.
    async fn copy_logs(&self, runtime_id: &str, cancel: &CancellationToken) -> BotyardResult<()> {
        let mut logs =
            cancellable(cancel, "open logs", self.runtime.stream_logs(runtime_id)).await?;
        let mut stdout = tokio::io::stdout();
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(BotyardError::Cancelled("copy logs".to_string()));
                }
                next = logs.next() => next,
            };
            match next {
                Some(chunk) => stdout.write_all(&chunk?).await?,
                None => break,
            }
        }
        stdout.flush().await?;
        Ok(())
    }

    /// Stop every live container, continuing past individual failures.
    ///
    /// An empty store is an empty report. Cancellation ends the sweep early;
    /// the records not yet visited are reported as cancelled failures.
    pub async fn stop_all(&self, cancel: &CancellationToken) -> BotyardResult<SweepReport> {
        info!("Stopping all containers");
        let records = match cancellable(cancel, "list records", self.repo.list_all()).await {
            Ok(records) => records,
            Err(e) if e.is_not_found() => {
                info!("No containers to stop");
                return Ok(SweepReport::default());
            }
            Err(e) => return Err(e),
        };

        let total = records.len();
        let mut report = SweepReport::default();
        let mut pending = records.into_iter();
        while let Some(record) = pending.next() {
            let result = match cancellable(cancel, "waiting for owner lock", async {
                Ok(self.owner_locks.acquire(record.owner).await)
            })
            .await
            {
                Ok(_guard) => self.stop_record(&record, cancel).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(()) => {
                    info!(
                        container_id = %record.runtime_container_id,
                        "Stopped container {}/{}",
                        report.stopped.len() + report.failures.len() + 1,
                        total
                    );
                    report.stopped.push(record.id);
                }
                Err(e) if e.is_cancelled() => {
                    warn!("Sweep cancelled with {} containers left", pending.len() + 1);
                    for left in std::iter::once(record).chain(pending.by_ref()) {
                        report.failures.push(SweepFailure {
                            record_id: left.id,
                            runtime_container_id: left.runtime_container_id,
                            error: BotyardError::Cancelled("stop all".to_string()),
                        });
                    }
                }
                Err(e) => {
                    warn!(
                        container_id = %record.runtime_container_id,
                        error = %e,
                        "Failed to stop container"
                    );
                    report.failures.push(SweepFailure {
                        record_id: record.id,
                        runtime_container_id: record.runtime_container_id,
                        error: e,
                    });
                }
            }
        }

        info!(
            stopped = report.stopped.len(),
            failed = report.failures.len(),
            "Sweep finished"
        );
        Ok(report)
    }
}
