//! HTTP server startup logic.
//!
//! Binding is split from serving so a busy port fails the process before any
//! background work is spawned.

use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use crate::config::HttpServerConfig;

/// Server startup error
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Invalid listen address {addr}: {reason}")]
    Address { addr: String, reason: String },

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Bind the listener described by `config`.
pub async fn bind(config: &HttpServerConfig) -> Result<TcpListener, ServerError> {
    let addr = config
        .bind_address()
        .map_err(|e| ServerError::Address {
            addr: format!("{}:{}", config.host, config.port),
            reason: e.to_string(),
        })?;

    TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })
}

/// Serve `app` on `listener` until `shutdown` resolves.
///
/// In-flight requests get up to `drain` to finish once shutdown begins; any
/// connection still open after that is dropped.
pub async fn serve<F>(
    listener: TcpListener,
    app: Router,
    shutdown: F,
    drain: Duration,
) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    match listener.local_addr() {
        Ok(addr) => tracing::info!(%addr, "Starting HTTP server"),
        Err(e) => tracing::warn!(error = %e, "Starting HTTP server on unknown address"),
    }

    let (draining_tx, draining_rx) = oneshot::channel::<()>();
    let signal = async move {
        shutdown.await;
        tracing::info!(drain_secs = drain.as_secs(), "HTTP server draining");
        let _ = draining_tx.send(());
    };
    let deadline = async move {
        match draining_rx.await {
            Ok(()) => tokio::time::sleep(drain).await,
            Err(_) => std::future::pending::<()>().await,
        }
    };

    let server = axum::serve(listener, app)
        .with_graceful_shutdown(signal)
        .into_future();

    tokio::select! {
        result = server => result?,
        _ = deadline => {
            tracing::warn!(
                drain_ms = drain.as_millis() as u64,
                "Open connections did not drain in time, closing them"
            );
        }
    }

    tracing::info!("HTTP server stopped");
    Ok(())
}
