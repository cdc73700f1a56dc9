//! Worker supervisor.
//!
//! Owns the lifecycle of the single background worker:
//! - `start` spawns the worker task and a monitor task that classifies how it ends
//! - the worker loop records a heartbeat after every tick
//! - init errors, fatal errors and panics mark the worker `Failed`; there is no restart
//! - `shutdown` stops the loop cleanly and marks the worker `Stopped`
//!
//! Status is published through a `watch` channel so HTTP handlers only ever read
//! a snapshot.

mod status;
mod worker;

pub use status::{Heartbeat, StatusReader, TransitionError, WorkerState, WorkerStatus};
pub use worker::{PulseWorker, Worker, WorkerError};

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::Instrument;

use crate::config::WorkerConfig;

pub(crate) use status::StatusCell;

/// Loop timing used by the supervisor
#[derive(Debug, Clone, Copy)]
pub struct SupervisorSettings {
    /// Sleep between two ticks
    pub tick_interval: Duration,
    /// Upper bound for `Worker::init`
    pub init_timeout: Duration,
}

impl From<&WorkerConfig> for SupervisorSettings {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            tick_interval: config.tick_interval(),
            init_timeout: config.init_timeout(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("worker has already been started")]
    AlreadyStarted,
    #[error("supervisor has been shut down")]
    ShutDown,
}

/// Tasks spawned by `start`
struct Spawned {
    monitor: JoinHandle<()>,
    worker: AbortHandle,
}

/// Supervises exactly one background worker.
pub struct WorkerSupervisor {
    settings: SupervisorSettings,
    cell: StatusCell,
    shutdown_tx: watch::Sender<bool>,
    started: AtomicBool,
    spawned: Mutex<Option<Spawned>>,
}

impl WorkerSupervisor {
    pub fn new(settings: SupervisorSettings) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            settings,
            cell: StatusCell::new("unstarted"),
            shutdown_tx,
            started: AtomicBool::new(false),
            spawned: Mutex::new(None),
        }
    }

    /// Read handle for the published worker status.
    pub fn status(&self) -> StatusReader {
        self.cell.reader()
    }

    /// Spawn `worker` on the current tokio runtime.
    ///
    /// The status stays `Starting` until `Worker::init` returns, then becomes
    /// `Running`. Only the first call starts anything, and nothing starts once
    /// `shutdown` has been called.
    pub fn start<W: Worker>(&self, worker: W) -> Result<(), SupervisorError> {
        if *self.shutdown_tx.borrow() {
            return Err(SupervisorError::ShutDown);
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(SupervisorError::AlreadyStarted);
        }

        let name = worker.name().to_string();
        self.cell.begin(&name);

        let span = tracing::info_span!("worker", worker = %name);
        let worker_task = tokio::spawn(
            run_worker(
                worker,
                self.cell.clone(),
                self.settings,
                self.shutdown_tx.subscribe(),
            )
            .instrument(span.clone()),
        );
        let abort = worker_task.abort_handle();
        let monitor = tokio::spawn(monitor_worker(worker_task, self.cell.clone()).instrument(span));

        *self.lock_spawned() = Some(Spawned {
            monitor,
            worker: abort,
        });

        tracing::info!(
            worker = %name,
            tick_interval_ms = self.settings.tick_interval.as_millis() as u64,
            "Worker started"
        );
        Ok(())
    }

    /// Record a liveness signal for the running worker.
    pub fn report_heartbeat(&self) {
        self.cell.heartbeat();
    }

    /// Mark the worker failed with `err` and stop its loop. It is not restarted.
    pub fn on_failure(&self, err: &WorkerError) {
        record_failure(&self.cell, err);
        // Failed is already published, so the loop exit cannot turn it into Stopped
        self.shutdown_tx.send_replace(true);
    }

    /// Stop the worker, waiting up to `timeout` for the loop to exit.
    ///
    /// A worker that does not exit in time is aborted. Ends in `Stopped` unless
    /// the worker already failed.
    pub async fn shutdown(&self, timeout: Duration) {
        self.shutdown_tx.send_replace(true);

        let spawned = self.lock_spawned().take();
        let Some(Spawned {
            mut monitor,
            worker,
        }) = spawned
        else {
            if let Err(e) = self.cell.transition(WorkerState::Stopped, None) {
                tracing::debug!(error = %e, "Worker was never started");
            }
            return;
        };

        if tokio::time::timeout(timeout, &mut monitor).await.is_err() {
            tracing::warn!(
                timeout_secs = timeout.as_secs(),
                "Worker did not stop in time, aborting"
            );
            worker.abort();
            if let Err(e) = monitor.await {
                tracing::error!(error = %e, "Worker monitor ended abnormally");
            }
        }

        tracing::info!(state = %self.cell.state(), "Worker supervisor shut down");
    }

    fn lock_spawned(&self) -> std::sync::MutexGuard<'_, Option<Spawned>> {
        self.spawned.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn record_failure(cell: &StatusCell, err: &WorkerError) {
    tracing::error!(error = %err, "Worker failed");
    if let Err(e) = cell.transition(WorkerState::Failed, Some(err.to_string())) {
        tracing::warn!(error = %e, "Ignoring failure report");
    }
}

/// Resolves once shutdown has been requested or the supervisor is gone.
async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

async fn run_worker<W: Worker>(
    mut worker: W,
    cell: StatusCell,
    settings: SupervisorSettings,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), WorkerError> {
    tracing::info!("Worker initializing");

    let init = tokio::time::timeout(settings.init_timeout, worker.init());
    let initialized = tokio::select! {
        biased;

        _ = shutdown_requested(&mut shutdown) => None,
        result = init => Some(result),
    };

    match initialized {
        None => {
            tracing::info!("Shutdown requested during initialization");
            worker.shutdown().await;
            return Ok(());
        }
        Some(Ok(Ok(()))) => {}
        Some(Ok(Err(e))) => return Err(e),
        Some(Err(_)) => return Err(WorkerError::TimedOut(settings.init_timeout)),
    }

    if let Err(e) = cell.transition(WorkerState::Running, None) {
        tracing::warn!(error = %e, "Worker initialized after leaving Starting");
        worker.shutdown().await;
        return Ok(());
    }

    let heartbeat = Heartbeat::new(cell.clone());
    loop {
        let outcome = tokio::select! {
            biased;

            _ = shutdown_requested(&mut shutdown) => break,
            outcome = worker.tick(&heartbeat) => outcome,
        };

        match outcome {
            Ok(()) => {}
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => tracing::warn!(error = %e, "Worker iteration failed"),
        }

        // Even a failed iteration proves the loop is alive
        cell.complete_iteration();

        tokio::select! {
            biased;

            _ = shutdown_requested(&mut shutdown) => break,
            _ = tokio::time::sleep(settings.tick_interval) => {}
        }
    }

    worker.shutdown().await;
    Ok(())
}

/// Wait for the worker task and publish how it ended.
async fn monitor_worker(task: JoinHandle<Result<(), WorkerError>>, cell: StatusCell) {
    let failure = match task.await {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(e),
        Err(e) if e.is_panic() => Some(WorkerError::Panicked(panic_message(e.into_panic()))),
        Err(_) => {
            tracing::warn!("Worker task was cancelled");
            None
        }
    };

    match failure {
        Some(err) => record_failure(&cell, &err),
        None => {
            if let Err(e) = cell.transition(WorkerState::Stopped, None) {
                tracing::debug!(error = %e, "Worker already in a final state");
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
