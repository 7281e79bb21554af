//! Message ingestion loop.
//!
//! Reads newline-delimited JSON messages and dispatches them with at most
//! `max_concurrent_dispatch` in flight. Ingestion ends at end of input or on
//! SIGINT/SIGTERM; either way every live container is stopped afterwards.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Context;
use botyard::{Orchestrator, OwnerKey};
use botyard::runtime::shutdown;
use clap::Args;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cli::GlobalFlags;

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Read messages from FILE instead of stdin
    #[arg(long, value_name = "FILE")]
    pub input: Option<PathBuf>,
}

/// Counters for one ingestion run.
#[derive(Debug, Default)]
pub struct IngestStats {
    pub dispatched: AtomicUsize,
    pub failed: AtomicUsize,
    pub skipped: AtomicUsize,
}

pub async fn execute(args: ServeArgs, global: &GlobalFlags) -> anyhow::Result<()> {
    let settings = global.load_executor_settings()?;
    let limit = settings.max_concurrent_dispatch;
    let orchestrator = Arc::new(global.create_orchestrator(settings)?);

    let reader: Box<dyn AsyncBufRead + Unpin + Send> = match &args.input {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("failed to open {}", path.display()))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };

    let ingest = CancellationToken::new();
    let watcher = shutdown::cancel_on_signal(ingest.clone());
    info!("Executor started");
    let ingested = ingest_messages(orchestrator.clone(), reader, limit, &ingest).await;
    watcher.abort();

    // The sweep never observes the signal that ended ingestion.
    let report = orchestrator.stop_all(&shutdown::sweep_token()).await?;

    let stats = ingested?;
    info!(
        dispatched = stats.dispatched.load(Ordering::Relaxed),
        failed = stats.failed.load(Ordering::Relaxed),
        skipped = stats.skipped.load(Ordering::Relaxed),
        "Executor stopped"
    );
    super::finish_sweep(report)
}

/// Dispatch every message from `reader` until it ends or `cancel` fires.
///
/// Malformed lines and failed dispatches are logged and skipped: the
/// producer owns redelivery. Messages for different owners run concurrently,
/// while each owner's messages are applied in arrival order. Returns once
/// every spawned dispatch finished.
pub async fn ingest_messages<R>(
    orchestrator: Arc<Orchestrator>,
    reader: R,
    limit: usize,
    cancel: &CancellationToken,
) -> anyhow::Result<Arc<IngestStats>>
where
    R: AsyncBufRead + Unpin,
{
    let limit = limit.max(1);
    let semaphore = Arc::new(Semaphore::new(limit));
    let stats = Arc::new(IngestStats::default());
    // Most recent dispatch per owner; the next one for that owner awaits it.
    let mut tails: HashMap<OwnerKey, JoinHandle<()>> = HashMap::new();
    let mut segments = reader.split(b'\n');

    loop {
        let segment = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Ingestion interrupted");
                break;
            }
            segment = segments.next_segment() => segment.context("failed to read message")?,
        };
        let Some(segment) = segment else {
            info!("End of input");
            break;
        };
        let line = match String::from_utf8(segment) {
            Ok(line) => line,
            Err(e) => {
                warn!("Skipping message: not valid UTF-8: {}", e);
                stats.skipped.fetch_add(1, Ordering::Relaxed);
                continue;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let message = match super::parse_message(line) {
            Ok(message) => message,
            Err(e) => {
                warn!("Skipping message: {:#}", e);
                stats.skipped.fetch_add(1, Ordering::Relaxed);
                continue;
            }
        };

        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            permit = semaphore.clone().acquire_owned() => {
                permit.context("dispatch limiter closed")?
            }
        };

        let owner = message.owner_key();
        tails.retain(|_, tail| !tail.is_finished());
        let previous = tails.remove(&owner);

        let orchestrator = orchestrator.clone();
        let stats = stats.clone();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let _permit = permit;
            if let Some(previous) = previous {
                if let Err(e) = previous.await {
                    warn!(owner = %owner, "Previous dispatch aborted: {}", e);
                }
            }
            match orchestrator.dispatch(&message, &token).await {
                Ok(outcome) => {
                    debug!(owner = %owner, outcome = ?outcome, "Dispatch finished");
                    stats.dispatched.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    error!(owner = %owner, kind = ?message.kind, "Dispatch failed: {}", e);
                    stats.failed.fetch_add(1, Ordering::Relaxed);
                }
            }
        });
        tails.insert(owner, handle);
    }

    // Holding every permit means no dispatch is still running.
    let _drained = semaphore
        .acquire_many(limit as u32)
        .await
        .context("dispatch limiter closed")?;
    Ok(stats)
}
