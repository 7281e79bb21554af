//! Persisted container records and their lifecycle.
//!
//! A record is written once when the runtime container is created; afterwards
//! only `state` moves. Soft deletion is the terminal `Deleted` state rather
//! than a side column, so every transition goes through one enum.

use std::fmt;
use std::str::FromStr;

use botyard_shared::errors::{BotyardError, BotyardResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of one provisioned container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Created,
    Running,
    Stopped,
    Deleted,
}

impl ContainerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Deleted => "deleted",
        }
    }

    /// Whether a record in `self` may move to `next`.
    ///
    /// Self-transitions are accepted so that redelivered messages stay
    /// idempotent. Nothing leads back to `Created`, `Deleted` is terminal and
    /// a running record can't be deleted.
    pub fn can_transition_to(self, next: ContainerState) -> bool {
        use ContainerState::*;
        if self == next {
            return self != Deleted;
        }
        matches!(
            (self, next),
            (Created, Running)
                | (Created, Stopped)
                | (Created, Deleted)
                | (Running, Stopped)
                | (Stopped, Running)
                | (Stopped, Deleted)
        )
    }

    /// Validate a transition, returning `InvalidState` when it is not allowed.
    pub fn transition(self, next: ContainerState) -> BotyardResult<ContainerState> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(BotyardError::InvalidState(format!(
                "cannot move container from {} to {}",
                self, next
            )))
        }
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContainerState {
    type Err = BotyardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "running" => Ok(Self::Running),
            "stopped" => Ok(Self::Stopped),
            "deleted" => Ok(Self::Deleted),
            other => Err(BotyardError::InvalidState(format!(
                "unknown container state '{}'",
                other
            ))),
        }
    }
}

/// The (bot, project, owner) triple that identifies one tenant container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerKey {
    pub bot_id: i64,
    pub project_id: i64,
    pub owner_id: i64,
}

impl OwnerKey {
    pub fn new(bot_id: i64, project_id: i64, owner_id: i64) -> Self {
        Self {
            bot_id,
            project_id,
            owner_id,
        }
    }
}

impl fmt::Display for OwnerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bot={} project={} owner={}",
            self.bot_id, self.project_id, self.owner_id
        )
    }
}

/// Display metadata carried through from the tenant; never interpreted here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayMetadata {
    pub name: String,
    pub description: String,
    pub icon: String,
}

/// One persisted row tracking an owner key's container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerRecord {
    pub id: i64,
    pub runtime_container_id: String,
    pub container_name: String,
    pub port: u16,
    pub owner: OwnerKey,
    pub metadata: DisplayMetadata,
    pub state: ContainerState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Fields supplied by the orchestrator when a record is first persisted.
///
/// The repository assigns `id` and the audit timestamps; state starts at
/// `Created`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewContainerRecord {
    pub runtime_container_id: String,
    pub container_name: String,
    pub port: u16,
    pub owner: OwnerKey,
    pub metadata: DisplayMetadata,
}
