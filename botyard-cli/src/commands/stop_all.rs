use botyard::runtime::shutdown;
use clap::Args;
use tokio_util::sync::CancellationToken;

use crate::cli::GlobalFlags;

/// Stop every live container and mark it stopped
#[derive(Args, Debug)]
pub struct StopAllArgs {}

pub async fn execute(_args: StopAllArgs, global: &GlobalFlags) -> anyhow::Result<()> {
    let settings = global.load_settings()?;
    if settings.docker.timeout <= 0 {
        anyhow::bail!("docker.timeout must be positive, got {}", settings.docker.timeout);
    }
    let orchestrator = global.create_orchestrator(settings)?;

    // An operator's Ctrl-C may abandon this sweep, unlike the one `serve` runs.
    let cancel = CancellationToken::new();
    let watcher = shutdown::cancel_on_signal(cancel.clone());
    let report = orchestrator.stop_all(&cancel).await;
    watcher.abort();
    let report = report?;

    for id in &report.stopped {
        println!("{}", id);
    }
    super::finish_sweep(report)
}
