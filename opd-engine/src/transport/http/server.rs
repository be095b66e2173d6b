//! HTTP server lifecycle: bind, serve, stop accepting, drain every slot.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::coordinator::Schedule;
use crate::service::AllocationService;

use super::routes::routes;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Ignore SIGTERM; stop only on SIGINT or `POST /shutdown`.
    pub await_explicit_shutdown: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            await_explicit_shutdown: false,
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

/// What ended the accept loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShutdownCause {
    Interrupt,
    Terminate,
    Requested,
}

impl fmt::Display for ShutdownCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Interrupt => "SIGINT",
            Self::Terminate => "SIGTERM",
            Self::Requested => "/shutdown",
        })
    }
}

/// Bind `config`'s address and serve until shutdown.
///
/// Returns each slot's schedule after draining.
pub async fn serve(
    config: ServerConfig,
    service: Arc<AllocationService>,
) -> anyhow::Result<Vec<Schedule>> {
    let listener = TcpListener::bind(config.addr()?).await?;
    serve_on(listener, config.await_explicit_shutdown, service).await
}

/// Serve on an already bound listener.
///
/// Once the accept loop ends, in-flight HTTP requests finish first. Every
/// slot's lock is then taken in turn, so critical sections whose callers went
/// away also complete before the final schedules are read.
pub async fn serve_on(
    listener: TcpListener,
    await_explicit_shutdown: bool,
    service: Arc<AllocationService>,
) -> anyhow::Result<Vec<Schedule>> {
    info!(addr = %listener.local_addr()?, "Allocation server listening");

    let shutdown_rx = service.shutdown_rx();
    let stopping = Arc::clone(&service);
    axum::serve(listener, routes(Arc::clone(&service)))
        .with_graceful_shutdown(async move {
            let cause = wait_for_shutdown(await_explicit_shutdown, shutdown_rx).await;
            // Flip the flag for signal-driven stops so health checks report DRAINING.
            stopping.trigger_shutdown();
            info!(%cause, "Stopped accepting requests, draining slots");
        })
        .await?;

    let schedules = service.shutdown().await?;
    info!(slots = schedules.len(), "Allocation server stopped");
    Ok(schedules)
}

async fn wait_for_shutdown(
    await_explicit_shutdown: bool,
    mut shutdown_rx: watch::Receiver<bool>,
) -> ShutdownCause {
    let requested = async {
        while !*shutdown_rx.borrow_and_update() {
            if shutdown_rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = interrupt() => ShutdownCause::Interrupt,
        _ = terminate(await_explicit_shutdown) => ShutdownCause::Terminate,
        _ = requested => ShutdownCause::Requested,
    }
}

/// Resolves on SIGINT. A handler that cannot be installed never resolves.
async fn interrupt() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "SIGINT handler unavailable");
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn terminate(await_explicit_shutdown: bool) {
    use tokio::signal::unix::{SignalKind, signal};

    if await_explicit_shutdown {
        info!("Explicit shutdown required, ignoring SIGTERM");
        return std::future::pending().await;
    }
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!(error = %e, "SIGTERM handler unavailable");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate(_await_explicit_shutdown: bool) {
    std::future::pending().await
}
