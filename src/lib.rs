//! Vigil: a health-checked process that supervises one background worker.
//!
//! The worker runs as a tokio task next to an Axum server. The server answers
//! liveness (`/health`, `/healthz`), readiness (`/ready`) and status (`/status`)
//! probes from the worker's latest published status and never waits on the
//! worker itself.

pub mod app;
pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod middleware;
pub mod report;
pub mod routes;
pub mod state;
pub mod supervisor;

pub use error::AppError;
