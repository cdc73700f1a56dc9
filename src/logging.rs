//! Tracing subscriber setup.
//!
//! Filter priority is CLI > RUST_LOG > configured default; output is either
//! human-readable text or one JSON object per line.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Pick the log filter: explicit CLI value, then RUST_LOG, then `default`.
pub fn resolve_filter(cli: Option<String>, env: Option<String>, default: &str) -> String {
    cli.or(env)
        .filter(|filter| !filter.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Install the global subscriber. `format` is "json" or anything else for text.
pub fn init(filter: &str, format: &str) {
    let registry = tracing_subscriber::registry().with(EnvFilter::new(filter));

    if format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
