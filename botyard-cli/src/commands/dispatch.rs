//! Apply one message outside the ingestion loop.

use botyard::DispatchOutcome;
use botyard::runtime::shutdown;
use clap::Args;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::cli::GlobalFlags;
use crate::formatter::{self, OutputFormat};

#[derive(Args, Debug)]
pub struct DispatchArgs {
    /// Message as JSON, e.g. '{"type":"run","payload":{...}}'
    #[arg(value_name = "MESSAGE")]
    pub message: String,

    /// Output format: json or yaml
    #[arg(short, long, default_value = "json")]
    pub format: String,
}

#[derive(Debug, Serialize)]
struct OutcomePresenter<'a> {
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    stale_id: Option<i64>,
    record: &'a botyard::ContainerRecord,
}

impl<'a> From<&'a DispatchOutcome> for OutcomePresenter<'a> {
    fn from(outcome: &'a DispatchOutcome) -> Self {
        let (name, stale_id) = match outcome {
            DispatchOutcome::Created(_) => ("created", None),
            DispatchOutcome::Reused(_) => ("reused", None),
            DispatchOutcome::Recreated { stale_id, .. } => ("recreated", Some(*stale_id)),
            DispatchOutcome::Stopped(_) => ("stopped", None),
        };
        Self {
            outcome: name,
            stale_id,
            record: outcome.record(),
        }
    }
}

pub async fn execute(args: DispatchArgs, global: &GlobalFlags) -> anyhow::Result<()> {
    let format = OutputFormat::parse(&args.format)?;
    if format == OutputFormat::Table {
        anyhow::bail!("dispatch output supports json or yaml");
    }
    let message = super::parse_message(&args.message)?;

    let settings = global.load_executor_settings()?;
    let orchestrator = global.create_orchestrator(settings)?;

    let cancel = CancellationToken::new();
    let watcher = shutdown::cancel_on_signal(cancel.clone());
    let outcome = orchestrator.dispatch(&message, &cancel).await;
    watcher.abort();
    let outcome = outcome?;

    let mut stdout = std::io::stdout().lock();
    formatter::print_output(
        &mut stdout,
        &OutcomePresenter::from(&outcome),
        format,
        |_, _| Ok(()),
    )
}
