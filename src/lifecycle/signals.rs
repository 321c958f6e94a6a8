use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Cancel `cancel` on the first SIGINT or SIGTERM (ctrl-c only off unix).
/// Further signals are not handled specially.
pub fn shutdown_on_signal(cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    warn!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(unix)]
        tokio::select! {
            _ = ctrl_c => {}
            _ = terminate => {}
            _ = cancel.cancelled() => return,
        }

        #[cfg(not(unix))]
        tokio::select! {
            _ = ctrl_c => {}
            _ = cancel.cancelled() => return,
        }

        info!("Shutdown signal received, stopping all bots");
        cancel.cancel();
    })
}
