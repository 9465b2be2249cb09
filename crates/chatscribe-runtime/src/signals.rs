//! Process signals → cancellation.

use tokio::task::JoinHandle;
use tracing::{info, warn};

use chatscribe_core::{CancellationSignal, Error, Result};

/// Cancel `cancel` on the first interrupt (Ctrl-C, or SIGTERM on unix).
/// Later signals are logged and otherwise ignored; processors are already
/// winding down.
pub fn install(cancel: CancellationSignal) -> Result<JoinHandle<()>> {
    #[cfg(unix)]
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .map_err(|e| Error::Internal(format!("failed to listen for SIGTERM: {}", e)))?;

    Ok(tokio::spawn(async move {
        loop {
            #[cfg(unix)]
            let received = tokio::select! {
                r = tokio::signal::ctrl_c() => r.map(|_| "interrupt"),
                _ = terminate.recv() => Ok("terminate"),
            };
            #[cfg(not(unix))]
            let received = tokio::signal::ctrl_c().await.map(|_| "interrupt");

            match received {
                Ok(name) => {
                    if cancel.cancel() {
                        info!("{} received, stopping all targets", name);
                    } else {
                        info!("{} received again, shutdown already in progress", name);
                    }
                }
                Err(e) => {
                    warn!("failed to listen for Ctrl-C: {}", e);
                    return;
                }
            }
        }
    }))
}
