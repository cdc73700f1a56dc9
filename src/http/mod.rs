//! HTTP server module.
//!
//! The server includes:
//! - Fatal bind errors surfaced before the worker starts
//! - Graceful shutdown on SIGTERM/SIGINT

mod server;
mod shutdown;

pub use server::{bind, serve, ServerError};
pub use shutdown::shutdown_signal;
