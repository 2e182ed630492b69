/// Shutdown signal handling for the watch loop.
///
/// SIGINT (Ctrl-C) and SIGTERM both request a graceful stop: the loop
/// abandons its current suspension point, records the stop event and exits.
use tokio::signal::unix::{signal, SignalKind};

/// Which signal asked the watcher to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    Interrupt,
    Terminate,
}

/// Resolve once SIGINT or SIGTERM is delivered to this process.
///
/// If a handler cannot be installed the corresponding branch never fires;
/// the other one still works.
pub async fn shutdown_signal() -> Shutdown {
    let interrupt = async {
        match signal(SignalKind::interrupt()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGINT handler");
                std::future::pending::<()>().await;
            }
        }
    };
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = interrupt => Shutdown::Interrupt,
        _ = terminate => Shutdown::Terminate,
    }
}
