//! List live container records with the runtime's view of each.

use std::io::Write;
use std::sync::Arc;

use botyard::{ContainerRecord, ContainersRepository, RuntimeClient};
use clap::Args;
use serde::Serialize;
use tabled::Tabled;

use crate::cli::GlobalFlags;
use crate::formatter::{self, OutputFormat};

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Output format: table, json or yaml
    #[arg(short, long, default_value = "table")]
    pub format: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ListEntry {
    #[serde(flatten)]
    pub record: ContainerRecord,
    /// Status reported by the runtime; `missing` if it doesn't know the
    /// container, `unknown` if it couldn't be asked.
    pub runtime_status: String,
}

#[derive(Tabled)]
struct ListRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "CONTAINER ID")]
    container_id: String,
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "BOT/PROJECT/OWNER")]
    owner: String,
    #[tabled(rename = "PORT")]
    port: u16,
    #[tabled(rename = "STATE")]
    state: String,
    #[tabled(rename = "RUNTIME")]
    runtime: String,
    #[tabled(rename = "CREATED")]
    created: String,
}

impl From<&ListEntry> for ListRow {
    fn from(entry: &ListEntry) -> Self {
        let record = &entry.record;
        Self {
            id: record.id,
            container_id: formatter::short_id(&record.runtime_container_id).to_string(),
            name: record.container_name.clone(),
            owner: format!(
                "{}/{}/{}",
                record.owner.bot_id, record.owner.project_id, record.owner.owner_id
            ),
            port: record.port,
            state: record.state.to_string(),
            runtime: entry.runtime_status.clone(),
            created: formatter::format_time(&record.created_at),
        }
    }
}

/// Ask the runtime about one container without failing the listing.
pub(crate) async fn runtime_status(
    runtime: Option<&Arc<botyard::DockerRuntime>>,
    runtime_id: &str,
) -> String {
    let Some(runtime) = runtime else {
        return "unknown".to_string();
    };
    match runtime.inspect_container(runtime_id).await {
        Ok(status) => status.status,
        Err(e) if e.is_no_such_container() => "missing".to_string(),
        Err(e) => {
            tracing::debug!(container_id = %runtime_id, "Inspect failed: {}", e);
            "unknown".to_string()
        }
    }
}

pub async fn execute(args: ListArgs, global: &GlobalFlags) -> anyhow::Result<()> {
    let format = OutputFormat::parse(&args.format)?;
    let settings = global.load_settings()?;
    let repo = global.open_repository(&settings)?;

    let records = match repo.list_all().await {
        Ok(records) => records,
        Err(e) if e.is_not_found() => Vec::new(),
        Err(e) => return Err(e.into()),
    };

    let runtime = if records.is_empty() {
        None
    } else {
        global
            .connect_runtime(&settings)
            .map_err(|e| tracing::debug!("Runtime unavailable: {:#}", e))
            .ok()
    };

    let mut entries = Vec::with_capacity(records.len());
    for record in records {
        let runtime_status =
            runtime_status(runtime.as_ref(), &record.runtime_container_id).await;
        entries.push(ListEntry {
            record,
            runtime_status,
        });
    }

    let mut stdout = std::io::stdout().lock();
    formatter::print_output(&mut stdout, &entries, format, |w, entries| {
        let table = formatter::create_table(entries.iter().map(ListRow::from));
        writeln!(w, "{}", table)?;
        Ok(())
    })
}
