//! Termination signal handling.

use dike_core::Context;
use tokio::signal;
use tracing::{error, info};

/// Spawns a task that cancels `ctx` on SIGINT or SIGTERM.
pub fn cancel_on_signal(ctx: Context) {
    tokio::spawn(async move {
        shutdown_signal().await;
        ctx.cancel();
    });
}

/// Waits for the first SIGINT or SIGTERM.
///
/// A handler that cannot be installed never fires; the other one still does.
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT"),
            Err(e) => {
                error!(error = %e, "failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM");
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
