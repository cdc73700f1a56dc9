//! Process wiring: bind the listener, start the supervised worker, serve probes
//! and stop everything in order on shutdown.

use std::future::Future;
use std::time::Duration;

use tokio::net::TcpListener;

use crate::config::{AppConfig, SHUTDOWN_DRAIN_SECS};
use crate::error::AppError;
use crate::http;
use crate::routes::create_router;
use crate::state::AppState;
use crate::supervisor::{SupervisorSettings, Worker, WorkerSupervisor};

/// Run until SIGINT/SIGTERM.
///
/// A bind failure is returned before the worker is started.
pub async fn run<W: Worker>(config: AppConfig, worker: W) -> Result<(), AppError> {
    let listener = http::bind(&config.http).await?;
    run_with_listener(config, listener, worker, http::shutdown_signal()).await
}

/// Run on an already bound listener until `shutdown` resolves.
///
/// The worker is stopped after the HTTP server has drained, so probes keep
/// answering for as long as the server accepts requests.
pub async fn run_with_listener<W, F>(
    config: AppConfig,
    listener: TcpListener,
    worker: W,
    shutdown: F,
) -> Result<(), AppError>
where
    W: Worker,
    F: Future<Output = ()> + Send + 'static,
{
    let supervisor = WorkerSupervisor::new(SupervisorSettings::from(&config.worker));
    supervisor.start(worker)?;

    let state = AppState::new(&config, supervisor.status());
    let app = create_router(state);

    let drain = Duration::from_secs(SHUTDOWN_DRAIN_SECS);
    let served = http::serve(listener, app, shutdown, drain).await;

    supervisor.shutdown(drain).await;

    served?;
    Ok(())
}
