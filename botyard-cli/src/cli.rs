//! CLI definition and argument parsing for botyard.
//! Also holds the helpers every subcommand uses to turn global flags into
//! settings, a store and an orchestrator.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use botyard::{
    Database, DockerRuntime, ExecutorSettings, Orchestrator, SqliteContainersRepository,
};
use clap::{Args, Parser, Subcommand};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "botyard", author, version, about = "Botyard tenant container executor")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalFlags,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Consume run/stop messages until input ends or a signal arrives
    Serve(crate::commands::serve::ServeArgs),

    /// Apply a single run/stop message
    Dispatch(crate::commands::dispatch::DispatchArgs),

    /// List live container records
    #[command(visible_alias = "ls", visible_alias = "ps")]
    List(crate::commands::list::ListArgs),

    /// Show one container record
    Inspect(crate::commands::inspect::InspectArgs),

    /// Soft-delete a stopped container record
    Rm(crate::commands::rm::RmArgs),

    /// Stop every live container
    StopAll(crate::commands::stop_all::StopAllArgs),
}

// ============================================================================
// GLOBAL FLAGS
// ============================================================================

#[derive(Args, Debug, Clone)]
pub struct GlobalFlags {
    /// Enable debug output
    #[arg(long, global = true)]
    pub debug: bool,

    /// Settings file (JSON, or YAML for .yaml/.yml)
    #[arg(long, global = true, env = "BOTYARD_CONFIG")]
    pub config: Option<PathBuf>,

    /// SQLite database path, overriding the settings file
    #[arg(long, global = true, env = "BOTYARD_DB")]
    pub db: Option<PathBuf>,
}

impl GlobalFlags {
    /// `--config`/`BOTYARD_CONFIG`, else `CONFIG_PATH`.
    fn config_path(&self) -> Option<PathBuf> {
        self.config
            .clone()
            .or_else(|| std::env::var_os("CONFIG_PATH").map(PathBuf::from))
    }

    /// Settings for commands that only read or edit the store: the settings
    /// file if any, then environment overrides, then `--db`.
    pub fn load_settings(&self) -> anyhow::Result<ExecutorSettings> {
        let mut settings = match self.config_path() {
            Some(path) => crate::config::load_config(&path)?,
            None => ExecutorSettings::default(),
        };
        crate::config::apply_env_overrides(&mut settings)?;
        if let Some(db) = &self.db {
            settings.database.path = db.clone();
        }
        Ok(settings)
    }

    /// Settings for commands that create or stop containers; a config file
    /// naming the image is mandatory.
    pub fn load_executor_settings(&self) -> anyhow::Result<ExecutorSettings> {
        if self.config_path().is_none() {
            anyhow::bail!("a settings file is required (--config, BOTYARD_CONFIG or CONFIG_PATH)");
        }
        let settings = self.load_settings()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn open_repository(
        &self,
        settings: &ExecutorSettings,
    ) -> anyhow::Result<Arc<SqliteContainersRepository>> {
        let db = Database::open(&settings.database.path).with_context(|| {
            format!(
                "failed to open database {}",
                settings.database.path.display()
            )
        })?;
        Ok(Arc::new(SqliteContainersRepository::new(db)))
    }

    pub fn connect_runtime(
        &self,
        settings: &ExecutorSettings,
    ) -> anyhow::Result<Arc<DockerRuntime>> {
        let runtime = DockerRuntime::connect(settings.docker.socket.as_deref())?;
        Ok(Arc::new(runtime))
    }

    pub fn create_orchestrator(&self, settings: ExecutorSettings) -> anyhow::Result<Orchestrator> {
        let repo = self.open_repository(&settings)?;
        let runtime = self.connect_runtime(&settings)?;
        Ok(Orchestrator::new(Arc::new(settings), repo, runtime))
    }
}
