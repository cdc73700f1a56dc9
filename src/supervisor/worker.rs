//! The unit of background work owned by the supervisor.
//!
//! A worker is initialized once and then ticked in a loop. What a tick does is
//! up to the implementation; the supervisor only cares whether it returns, how
//! it fails, and whether it keeps signalling heartbeats.

use std::time::Duration;

use async_trait::async_trait;

use super::status::Heartbeat;

/// Ways a worker can fail.
///
/// New task-specific kinds belong here as real worker logic is added.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum WorkerError {
    #[error("worker initialization failed: {0}")]
    Init(String),

    #[error("worker initialization timed out after {0:?}")]
    TimedOut(Duration),

    /// A failed iteration; the loop keeps running
    #[error("iteration failed: {0}")]
    Transient(String),

    /// Ends the worker
    #[error("fatal worker error: {0}")]
    Fatal(String),

    #[error("worker panicked: {0}")]
    Panicked(String),
}

impl WorkerError {
    /// Whether this error terminates the worker
    pub fn is_fatal(&self) -> bool {
        !matches!(self, WorkerError::Transient(_))
    }
}

#[async_trait]
pub trait Worker: Send + 'static {
    /// Name used in logs and status reports
    fn name(&self) -> &str;

    /// One-time setup before the first tick. An error marks the worker failed.
    async fn init(&mut self) -> Result<(), WorkerError> {
        Ok(())
    }

    /// One loop iteration. The supervisor records a heartbeat after each tick,
    /// and `heartbeat` may be used to signal progress within a long one.
    async fn tick(&mut self, heartbeat: &Heartbeat) -> Result<(), WorkerError>;

    /// Called once when the supervisor stops the worker cleanly.
    async fn shutdown(&mut self) {}
}

/// Worker that performs no task and only proves the loop is alive.
#[derive(Debug, Default)]
pub struct PulseWorker {
    pulses: u64,
}

impl PulseWorker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pulses(&self) -> u64 {
        self.pulses
    }
}

#[async_trait]
impl Worker for PulseWorker {
    fn name(&self) -> &str {
        "pulse"
    }

    async fn tick(&mut self, _heartbeat: &Heartbeat) -> Result<(), WorkerError> {
        self.pulses += 1;
        tracing::debug!(pulse = self.pulses, "Pulse");
        Ok(())
    }

    async fn shutdown(&mut self) {
        tracing::info!(pulses = self.pulses, "Pulse worker stopping");
    }
}
