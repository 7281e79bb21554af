//! Botyard: keeps one bot container per (bot, project, owner) in step with
//! the `run`/`stop` messages the platform sends.

pub mod db;
pub mod message;
pub mod models;
pub mod naming;
pub mod orchestrator;
pub mod port;
pub mod repository;
pub mod runtime;
pub mod settings;

pub use botyard_shared::errors::{BotyardError, BotyardResult};
pub use db::{Database, SqliteContainersRepository};
pub use message::{BotMessage, BotPayload, MessageKind};
pub use models::{ContainerRecord, ContainerState, DisplayMetadata, NewContainerRecord, OwnerKey};
pub use orchestrator::{DispatchOutcome, Orchestrator, SweepFailure, SweepReport};
pub use repository::ContainersRepository;
pub use runtime::{DockerRuntime, RuntimeClient, RuntimeStatus};
pub use settings::ExecutorSettings;
