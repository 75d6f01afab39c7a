use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Wait for a shutdown signal (SIGINT or SIGTERM).
pub async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown...");
        }
    }
}

/// Resolve on the first shutdown signal after interrupting running agents.
///
/// Agents live in their own process groups and do not see the terminal's
/// Ctrl+C, so they are interrupted through `agents`. In-flight deliveries
/// then finish normally: each waits for its agent to exit and releases its
/// workspace before the server completes its graceful shutdown.
pub async fn shutdown_signal(agents: CancellationToken) {
    wait_for_shutdown().await;
    tracing::info!("Interrupting running agents");
    agents.cancel();
}
