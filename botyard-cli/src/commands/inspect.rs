//! Inspect one container record by record id or runtime container id.

use botyard::{ContainerRecord, ContainersRepository, SqliteContainersRepository};
use clap::Args;

use super::list::{ListEntry, runtime_status};
use crate::cli::GlobalFlags;
use crate::formatter::{self, OutputFormat};

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Record id or runtime container id
    #[arg(value_name = "CONTAINER")]
    pub target: String,

    /// Output format: json or yaml
    #[arg(short, long, default_value = "json")]
    pub format: String,
}

/// A numeric target is tried as a record id first, then as a runtime id.
async fn resolve(
    repo: &SqliteContainersRepository,
    target: &str,
) -> botyard::BotyardResult<ContainerRecord> {
    if let Ok(id) = target.parse::<i64>() {
        match repo.find_by_id(id).await {
            Err(e) if e.is_not_found() => {}
            other => return other,
        }
    }
    repo.find_by_runtime_id(target).await
}

pub async fn execute(args: InspectArgs, global: &GlobalFlags) -> anyhow::Result<()> {
    let format = OutputFormat::parse(&args.format)?;
    if format == OutputFormat::Table {
        anyhow::bail!("inspect output supports json or yaml");
    }

    let settings = global.load_settings()?;
    let repo = global.open_repository(&settings)?;
    let record = resolve(&repo, &args.target).await?;

    let runtime = global.connect_runtime(&settings).ok();
    let runtime_status = runtime_status(runtime.as_ref(), &record.runtime_container_id).await;

    let mut stdout = std::io::stdout().lock();
    formatter::print_output(
        &mut stdout,
        &ListEntry {
            record,
            runtime_status,
        },
        format,
        |_, _| Ok(()),
    )
}
