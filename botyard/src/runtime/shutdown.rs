//! Graceful shutdown support.
//!
//! The executor stops every tenant container when the process receives
//! SIGTERM or SIGINT. The signal only ends ingestion; the sweep itself runs
//! under a fresh cancellation token so the signal that triggered it can't
//! abandon it halfway.

use std::fmt;

use tokio_util::sync::CancellationToken;

/// Which signal asked the process to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupt => f.write_str("SIGINT"),
            Self::Terminate => f.write_str("SIGTERM"),
        }
    }
}

/// Wait for SIGINT or SIGTERM.
#[cfg(unix)]
pub async fn wait_for_signal() -> std::io::Result<ShutdownSignal> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;

    let received = tokio::select! {
        _ = terminate.recv() => ShutdownSignal::Terminate,
        _ = interrupt.recv() => ShutdownSignal::Interrupt,
    };
    tracing::info!("Received {}, initiating graceful shutdown", received);
    Ok(received)
}

/// Non-unix platforms only get Ctrl-C.
#[cfg(not(unix))]
pub async fn wait_for_signal() -> std::io::Result<ShutdownSignal> {
    tokio::signal::ctrl_c().await?;
    tracing::info!("Received Ctrl-C, initiating graceful shutdown");
    Ok(ShutdownSignal::Interrupt)
}

/// Cancel `token` once a shutdown signal arrives.
///
/// Returns the task handle so callers can abort the watcher when ingestion
/// ends on its own.
pub fn cancel_on_signal(
    token: CancellationToken,
) -> tokio::task::JoinHandle<Option<ShutdownSignal>> {
    tokio::spawn(async move {
        match wait_for_signal().await {
            Ok(sig) => {
                token.cancel();
                Some(sig)
            }
            Err(e) => {
                tracing::error!("Failed to register signal handlers: {}", e);
                None
            }
        }
    })
}

/// Token for the shutdown sweep: never linked to the signal that started it.
pub fn sweep_token() -> CancellationToken {
    CancellationToken::new()
}
