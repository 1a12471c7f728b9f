use tokio_util::sync::CancellationToken;
use tracing::info;

/// Reasons the process leaves its run loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    Signal,
    Internal,
}

/// Wait for SIGINT/SIGTERM or an internal cancellation.
pub async fn wait_for_shutdown(cancel: &CancellationToken) -> ShutdownReason {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("SIGINT received, shutting down");
                ShutdownReason::Signal
            }
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down");
                ShutdownReason::Signal
            }
            _ = cancel.cancelled() => ShutdownReason::Internal,
        }
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received, shutting down");
                ShutdownReason::Signal
            }
            _ = cancel.cancelled() => ShutdownReason::Internal,
        }
    }
}
