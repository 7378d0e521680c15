//! Graceful shutdown handling.
use core::future;
use tokio::signal;

/// Wait for a shutdown signal (Ctrl-C, or SIGTERM on Unix).
///
/// If a handler cannot be installed that signal is simply never observed; the other one still
/// ends the server.
#[allow(
    clippy::missing_inline_in_public_items,
    reason = "Called once at start of program"
)]
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {error}");
            future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(error) => {
                tracing::error!("Failed to install SIGTERM handler: {error}");
                future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
