pub mod dispatch;
pub mod inspect;
pub mod list;
pub mod rm;
pub mod serve;
pub mod stop_all;

use anyhow::Context;
use botyard::{BotMessage, SweepReport};

/// Decode one JSON control message.
pub(crate) fn parse_message(raw: &str) -> anyhow::Result<BotMessage> {
    serde_json::from_str(raw).context("invalid message")
}

/// Log every sweep failure, then collapse the report into a single result.
pub(crate) fn finish_sweep(report: SweepReport) -> anyhow::Result<()> {
    for failure in &report.failures {
        tracing::error!(
            record_id = failure.record_id,
            container_id = %failure.runtime_container_id,
            "Container left running: {}",
            failure.error
        );
    }
    report.into_result()?;
    Ok(())
}
