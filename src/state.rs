//! Shared application state for request handlers.

use std::sync::Arc;

use chrono::Utc;

use crate::config::AppConfig;
use crate::report::{HealthReport, ProbePolicy, ServiceInfo};
use crate::supervisor::StatusReader;

/// Shared application state, cloneable across handlers via Arc-wrapped fields.
///
/// Handlers only get a read handle on the worker status; the supervisor keeps
/// the write side.
#[derive(Clone)]
pub struct AppState {
    pub worker: StatusReader,
    pub policy: ProbePolicy,
    pub service: Arc<ServiceInfo>,
}

impl AppState {
    /// Creates a new application state from the given configuration and status reader.
    pub fn new(config: &AppConfig, worker: StatusReader) -> Self {
        Self {
            worker,
            policy: ProbePolicy::from(&config.worker),
            service: Arc::new(ServiceInfo::from(config)),
        }
    }

    /// Assemble a report from the latest worker snapshot.
    pub fn report(&self) -> HealthReport {
        HealthReport::assemble(
            self.worker.snapshot(),
            &self.policy,
            (*self.service).clone(),
            Utc::now(),
        )
    }
}
