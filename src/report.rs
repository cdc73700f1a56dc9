//! Health reports derived from worker status snapshots.
//!
//! A report is assembled on every probe request and never stored. Readiness is
//! purely the worker state; the overall verdict also looks at heartbeat age so a
//! wedged loop is noticed even while the state still says `Running`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::{AppConfig, WorkerConfig};
use crate::supervisor::{WorkerState, WorkerStatus};

/// Thresholds applied when judging heartbeat freshness
#[derive(Debug, Clone, Copy)]
pub struct ProbePolicy {
    /// Heartbeats older than this are stale
    pub stale_after: Duration,
    /// Time after start during which a missing heartbeat is tolerated
    pub startup_grace: Duration,
}

impl From<&WorkerConfig> for ProbePolicy {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            stale_after: config.stale_after(),
            startup_grace: config.startup_grace(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Ok,
    /// No heartbeat yet, still inside the startup grace period
    Booting,
    Unhealthy,
}

/// Identity of the running service
#[derive(Debug, Clone, Serialize)]
pub struct ServiceInfo {
    pub name: String,
    pub environment: String,
    pub version: String,
}

impl From<&AppConfig> for ServiceInfo {
    fn from(config: &AppConfig) -> Self {
        Self {
            name: config.service.name.clone(),
            environment: config.service.environment.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: Verdict,
    /// True exactly when the worker is running
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub heartbeat_age_seconds: Option<u64>,
    pub worker: WorkerStatus,
    pub service: ServiceInfo,
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    pub fn assemble(
        worker: WorkerStatus,
        policy: &ProbePolicy,
        service: ServiceInfo,
        now: DateTime<Utc>,
    ) -> Self {
        let heartbeat_age = worker.last_heartbeat.map(|at| seconds_between(at, now));
        let (status, detail) = judge(&worker, heartbeat_age, policy, now);

        Self {
            status,
            ready: worker.state == WorkerState::Running,
            detail,
            heartbeat_age_seconds: heartbeat_age,
            worker,
            service,
            checked_at: now,
        }
    }
}

fn judge(
    worker: &WorkerStatus,
    heartbeat_age: Option<u64>,
    policy: &ProbePolicy,
    now: DateTime<Utc>,
) -> (Verdict, Option<String>) {
    match worker.state {
        WorkerState::Failed => {
            let reason = worker.last_error.as_deref().unwrap_or("unknown error");
            return (Verdict::Unhealthy, Some(format!("Worker failed: {}", reason)));
        }
        WorkerState::Stopped => {
            return (Verdict::Unhealthy, Some("Worker stopped".to_string()));
        }
        WorkerState::Starting | WorkerState::Running => {}
    }

    let Some(age) = heartbeat_age else {
        let since_start = seconds_between(worker.started_at, now);
        if since_start < policy.startup_grace.as_secs() {
            return (Verdict::Booting, Some("Worker booting".to_string()));
        }
        return (
            Verdict::Unhealthy,
            Some(format!(
                "Worker has not reported a heartbeat {} seconds after start",
                since_start
            )),
        );
    };

    if age > policy.stale_after.as_secs() {
        return (
            Verdict::Unhealthy,
            Some(format!(
                "Worker is unhealthy. Last heartbeat was {} seconds ago",
                age
            )),
        );
    }

    (Verdict::Ok, None)
}

/// Whole seconds from `earlier` to `later`, clamped at zero
fn seconds_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> u64 {
    (later - earlier).num_seconds().max(0) as u64
}
