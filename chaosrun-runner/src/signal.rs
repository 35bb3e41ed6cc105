//! OS termination signal wiring.

use anyhow::Result;
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;

/// Installs SIGTERM/SIGINT handlers that cancel `token` on the first signal.
///
/// # Errors
///
/// Returns an error if signal handlers cannot be installed.
pub fn forward_termination_signals(token: CancellationToken) -> Result<()> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {e}"))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {e}"))?;

    tokio::spawn(async move {
        let name = tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
            () = token.cancelled() => return,
        };
        tracing::warn!(signal = name, "termination signal received, stopping experiment");
        token.cancel();
    });
    Ok(())
}
