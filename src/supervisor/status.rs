//! Worker status record and the channel that publishes it.
//!
//! The supervisor holds the only writer (`StatusCell`); HTTP handlers hold
//! `StatusReader`s and clone the latest snapshot out of a `watch` channel, so a
//! probe never waits on the worker.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

/// Lifecycle state of the supervised worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Starting,
    Running,
    Failed,
    Stopped,
}

impl WorkerState {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkerState::Starting => "starting",
            WorkerState::Running => "running",
            WorkerState::Failed => "failed",
            WorkerState::Stopped => "stopped",
        }
    }

    /// `Failed` and `Stopped` are final
    pub fn is_terminal(self) -> bool {
        matches!(self, WorkerState::Failed | WorkerState::Stopped)
    }

    /// Transitions only move forward: Starting -> Running -> {Failed, Stopped}.
    /// A worker may also fail or stop before it ever reaches Running.
    pub fn can_transition_to(self, next: WorkerState) -> bool {
        use WorkerState::*;
        matches!(
            (self, next),
            (Starting, Running)
                | (Starting, Failed)
                | (Starting, Stopped)
                | (Running, Failed)
                | (Running, Stopped)
        )
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal worker state transition {from} -> {to}")]
pub struct TransitionError {
    pub from: WorkerState,
    pub to: WorkerState,
}

/// Snapshot of the worker's liveness as last published by the supervisor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerStatus {
    /// Worker name, used in logs and reports
    pub worker: String,
    pub state: WorkerState,
    /// When the supervisor started the worker
    pub started_at: DateTime<Utc>,
    /// Most recent liveness signal, only recorded while running
    pub last_heartbeat: Option<DateTime<Utc>>,
    /// Reason for the last failure
    pub last_error: Option<String>,
    /// Completed loop iterations
    pub iterations: u64,
}

impl WorkerStatus {
    pub fn new(worker: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            worker: worker.into(),
            state: WorkerState::Starting,
            started_at,
            last_heartbeat: None,
            last_error: None,
            iterations: 0,
        }
    }

    pub fn transition(&mut self, next: WorkerState) -> Result<(), TransitionError> {
        if !self.state.can_transition_to(next) {
            return Err(TransitionError {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    /// Record a heartbeat at `at`. Ignored unless running; never moves backwards.
    pub fn record_heartbeat(&mut self, at: DateTime<Utc>) -> bool {
        if self.state != WorkerState::Running {
            return false;
        }
        match self.last_heartbeat {
            Some(previous) if previous >= at => false,
            _ => {
                self.last_heartbeat = Some(at);
                true
            }
        }
    }
}

/// Write side of the published status. Only the supervisor owns one.
#[derive(Clone)]
pub(crate) struct StatusCell {
    tx: Arc<watch::Sender<WorkerStatus>>,
}

impl StatusCell {
    pub(crate) fn new(worker: impl Into<String>) -> Self {
        let (tx, _rx) = watch::channel(WorkerStatus::new(worker, Utc::now()));
        Self { tx: Arc::new(tx) }
    }

    pub(crate) fn reader(&self) -> StatusReader {
        StatusReader {
            rx: self.tx.subscribe(),
        }
    }

    /// Reset identity and start time. Only meaningful before the worker runs.
    pub(crate) fn begin(&self, worker: &str) {
        self.tx.send_modify(|status| {
            status.worker = worker.to_string();
            status.started_at = Utc::now();
        });
    }

    /// Move to `next`, recording `error` alongside it when given.
    ///
    /// Entering `Running` also records the first heartbeat.
    pub(crate) fn transition(
        &self,
        next: WorkerState,
        error: Option<String>,
    ) -> Result<(), TransitionError> {
        let mut outcome = Ok(());
        self.tx.send_if_modified(|status| {
            let from = status.state;
            if let Err(e) = status.transition(next) {
                outcome = Err(e);
                return false;
            }
            if let Some(error) = error {
                status.last_error = Some(error);
            }
            if next == WorkerState::Running {
                status.record_heartbeat(Utc::now());
            }
            tracing::info!(worker = %status.worker, %from, to = %next, "Worker state changed");
            true
        });
        outcome
    }

    pub(crate) fn heartbeat(&self) -> bool {
        self.tx
            .send_if_modified(|status| status.record_heartbeat(Utc::now()))
    }

    /// Count a finished loop iteration and refresh the heartbeat.
    pub(crate) fn complete_iteration(&self) {
        self.tx.send_if_modified(|status| {
            if status.state != WorkerState::Running {
                return false;
            }
            status.iterations += 1;
            status.record_heartbeat(Utc::now());
            true
        });
    }

    pub(crate) fn state(&self) -> WorkerState {
        self.tx.borrow().state
    }
}

/// Read side of the published status, cheap to clone into request state.
#[derive(Clone, Debug)]
pub struct StatusReader {
    rx: watch::Receiver<WorkerStatus>,
}

impl StatusReader {
    /// Latest published status. Never blocks on the worker.
    pub fn snapshot(&self) -> WorkerStatus {
        self.rx.borrow().clone()
    }

    /// Wait until the published status satisfies `predicate`.
    ///
    /// Returns the last known snapshot if the supervisor goes away first.
    pub async fn wait_for<F>(&self, mut predicate: F) -> WorkerStatus
    where
        F: FnMut(&WorkerStatus) -> bool,
    {
        let mut rx = self.rx.clone();
        let result = rx.wait_for(|status| predicate(status)).await.map(|s| s.clone());
        match result {
            Ok(status) => status,
            Err(_) => rx.borrow().clone(),
        }
    }
}

/// Handle given to the worker so long iterations can signal progress.
#[derive(Clone)]
pub struct Heartbeat {
    cell: StatusCell,
}

impl Heartbeat {
    pub(crate) fn new(cell: StatusCell) -> Self {
        Self { cell }
    }

    /// Record that the worker is still making progress.
    pub fn beat(&self) {
        self.cell.heartbeat();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_forward_transitions_are_allowed() {
        let mut status = WorkerStatus::new("test", Utc::now());
        status.transition(WorkerState::Running).unwrap();
        status.transition(WorkerState::Stopped).unwrap();
        assert_eq!(status.state, WorkerState::Stopped);
    }

    #[test]
    fn test_startup_failure_skips_running() {
        let mut status = WorkerStatus::new("test", Utc::now());
        status.transition(WorkerState::Failed).unwrap();
        assert!(status.state.is_terminal());
    }

    #[test]
    fn test_no_transition_back_to_starting() {
        let mut status = WorkerStatus::new("test", Utc::now());
        status.transition(WorkerState::Running).unwrap();
        let err = status.transition(WorkerState::Starting).unwrap_err();
        assert_eq!(err.from, WorkerState::Running);
        assert_eq!(err.to, WorkerState::Starting);
        assert_eq!(status.state, WorkerState::Running);
    }

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [WorkerState::Failed, WorkerState::Stopped] {
            for next in [
                WorkerState::Starting,
                WorkerState::Running,
                WorkerState::Failed,
                WorkerState::Stopped,
            ] {
                assert!(!terminal.can_transition_to(next), "{terminal} -> {next}");
            }
        }
    }

    #[test]
    fn test_heartbeat_requires_running() {
        let now = Utc::now();
        let mut status = WorkerStatus::new("test", now);
        assert!(!status.record_heartbeat(now));
        assert!(status.last_heartbeat.is_none());

        status.transition(WorkerState::Running).unwrap();
        assert!(status.record_heartbeat(now));
        assert_eq!(status.last_heartbeat, Some(now));
    }

    #[test]
    fn test_heartbeat_never_moves_backwards() {
        let now = Utc::now();
        let mut status = WorkerStatus::new("test", now);
        status.transition(WorkerState::Running).unwrap();
        status.record_heartbeat(now);
        assert!(!status.record_heartbeat(now - Duration::seconds(5)));
        assert_eq!(status.last_heartbeat, Some(now));
    }

    #[test]
    fn test_state_serializes_lowercase() {
        let json = serde_json::to_string(&WorkerState::Running).unwrap();
        assert_eq!(json, "\"running\"");
    }

    #[tokio::test]
    async fn test_cell_publishes_to_readers() {
        let cell = StatusCell::new("test");
        let reader = cell.reader();
        assert_eq!(reader.snapshot().state, WorkerState::Starting);

        cell.transition(WorkerState::Running, None).unwrap();
        let status = reader.snapshot();
        assert_eq!(status.state, WorkerState::Running);
        assert!(status.last_heartbeat.is_some(), "entering Running records a heartbeat");

        cell.complete_iteration();
        assert_eq!(reader.snapshot().iterations, 1);
    }

    #[tokio::test]
    async fn test_cell_rejects_illegal_transition_without_publishing() {
        let cell = StatusCell::new("test");
        let reader = cell.reader();
        cell.transition(WorkerState::Failed, Some("boom".to_string()))
            .unwrap();

        let err = cell
            .transition(WorkerState::Running, None)
            .unwrap_err();
        assert_eq!(err.from, WorkerState::Failed);

        let status = reader.snapshot();
        assert_eq!(status.state, WorkerState::Failed);
        assert_eq!(status.last_error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_wait_for_returns_matching_snapshot() {
        let cell = StatusCell::new("test");
        let reader = cell.reader();

        let writer = cell.clone();
        tokio::spawn(async move {
            writer.transition(WorkerState::Running, None).unwrap();
        });

        let status = reader
            .wait_for(|s| s.state == WorkerState::Running)
            .await;
        assert_eq!(status.state, WorkerState::Running);
    }
}
