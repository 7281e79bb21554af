//! Persistence boundary consumed by the orchestrator.

use async_trait::async_trait;
use botyard_shared::errors::BotyardResult;

use crate::models::{ContainerRecord, ContainerState, NewContainerRecord, OwnerKey};

/// Durable CRUD and state transitions for container records.
///
/// Soft-deleted records are invisible to every lookup. Implementations
/// return the typed conditions `NotFound`, `NotCreated`, `NotUpdated` and
/// `NotDeleted` for refusals, and `Database` only for transport or SQL
/// failures, so callers can tell "no such record" from "store unavailable".
#[async_trait]
pub trait ContainersRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> BotyardResult<ContainerRecord>;

    async fn find_by_runtime_id(&self, runtime_id: &str) -> BotyardResult<ContainerRecord>;

    async fn find_by_owner_key(&self, owner: &OwnerKey) -> BotyardResult<ContainerRecord>;

    /// All live records. An empty set is reported as `NotFound`.
    async fn list_all(&self) -> BotyardResult<Vec<ContainerRecord>>;

    /// Persist a freshly created container in state `created`; returns the new id.
    async fn create(&self, record: &NewContainerRecord) -> BotyardResult<i64>;

    async fn set_state(&self, state: ContainerState, id: i64) -> BotyardResult<()>;

    /// Mark the container record and its bot row `stopped` atomically.
    async fn stop_state(&self, id: i64, bot_id: i64) -> BotyardResult<()>;

    /// Soft-delete; refused while the record is running.
    async fn delete_by_id(&self, id: i64) -> BotyardResult<()>;

    /// Soft-delete; refused while the record is running.
    async fn delete_by_owner_key(&self, owner: &OwnerKey) -> BotyardResult<()>;

    /// Soft-delete; refused while the record is running.
    async fn delete_by_runtime_id(&self, runtime_id: &str) -> BotyardResult<()>;
}
