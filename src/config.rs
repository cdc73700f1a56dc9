//! Configuration loading and constants.
//!
//! Settings come from an optional TOML file and are then overridden by the
//! process environment (`PORT`, `APP_NAME`, `ENV`, `DEBUG`, `LOG_FORMAT`), so a
//! container can run with no file at all. `AppConfig` is the root configuration
//! struct containing all settings.

use const_format::formatcp;
use serde::Deserialize;
use std::net::{AddrParseError, IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

// =============================================================================
// Probe Response Headers
// =============================================================================

/// Probes must always reflect the current worker state
pub const CACHE_CONTROL_PROBE: &str = "no-store";

// =============================================================================
// Worker Loop Defaults
// =============================================================================

/// Delay between two worker loop iterations
pub const DEFAULT_TICK_INTERVAL_SECS: u64 = 60;

/// Upper bound for `Worker::init` before it counts as a startup failure
pub const DEFAULT_INIT_TIMEOUT_SECS: u64 = 60;

/// A heartbeat older than this makes `/healthz` fail (3 minutes)
pub const DEFAULT_STALE_AFTER_SECS: u64 = 180;

/// Time after start during which `/healthz` tolerates a missing heartbeat
pub const DEFAULT_STARTUP_GRACE_SECS: u64 = 180;

/// Bound on each shutdown step: draining open connections, then stopping the worker
pub const SHUTDOWN_DRAIN_SECS: u64 = 30;

// =============================================================================
// Default Paths and Strings
// =============================================================================

/// Default configuration file path (optional, missing file means defaults)
pub const DEFAULT_CONFIG_PATH: &str = "config/vigil.toml";

/// Default bind address; listens on every interface inside a container
pub const DEFAULT_HTTP_HOST: &str = "0.0.0.0";

/// Default HTTP port when `PORT` is unset
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Default service name reported by `/status`
pub const DEFAULT_APP_NAME: &str = "vigil";

/// Default deployment environment label
pub const DEFAULT_ENVIRONMENT: &str = "dev";

/// Tracing target of this crate
pub const LOG_TARGET: &str = "vigil";

/// Default log filter when RUST_LOG is not set
pub const DEFAULT_LOG_FILTER: &str = formatcp!("{}=info,tower_http=info", LOG_TARGET);

/// Log filter used when `DEBUG=true`
pub const DEBUG_LOG_FILTER: &str = formatcp!("{}=debug,tower_http=debug", LOG_TARGET);

/// Default log format (text or json)
pub const DEFAULT_LOG_FORMAT: &str = "text";

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    /// HTTP server configuration
    #[serde(default)]
    pub http: HttpServerConfig,
    /// Worker loop and probe thresholds
    #[serde(default)]
    pub worker: WorkerConfig,
    /// Identity reported by the status endpoint
    #[serde(default)]
    pub service: ServiceConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default = "HttpServerConfig::default_host")]
    pub host: String,
    #[serde(default = "HttpServerConfig::default_port")]
    pub port: u16,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
        }
    }
}

impl HttpServerConfig {
    fn default_host() -> String {
        DEFAULT_HTTP_HOST.to_string()
    }

    fn default_port() -> u16 {
        DEFAULT_HTTP_PORT
    }

    /// Socket address to listen on. `host` is an IPv4 or IPv6 literal, with or
    /// without brackets.
    pub fn bind_address(&self) -> Result<SocketAddr, AddrParseError> {
        let host = self.host.trim();
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        let ip: IpAddr = host.parse()?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Seconds to sleep between loop iterations (default: 60)
    #[serde(default = "WorkerConfig::default_tick_interval")]
    pub tick_interval_seconds: u64,
    /// Seconds `init` may take before the worker is marked failed (default: 60)
    #[serde(default = "WorkerConfig::default_init_timeout")]
    pub init_timeout_seconds: u64,
    /// Heartbeat age in seconds after which `/healthz` reports unhealthy (default: 180)
    #[serde(default = "WorkerConfig::default_stale_after")]
    pub stale_after_seconds: u64,
    /// Seconds after start during which a missing heartbeat is tolerated (default: 180)
    #[serde(default = "WorkerConfig::default_startup_grace")]
    pub startup_grace_seconds: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            tick_interval_seconds: Self::default_tick_interval(),
            init_timeout_seconds: Self::default_init_timeout(),
            stale_after_seconds: Self::default_stale_after(),
            startup_grace_seconds: Self::default_startup_grace(),
        }
    }
}

impl WorkerConfig {
    fn default_tick_interval() -> u64 {
        DEFAULT_TICK_INTERVAL_SECS
    }
    fn default_init_timeout() -> u64 {
        DEFAULT_INIT_TIMEOUT_SECS
    }
    fn default_stale_after() -> u64 {
        DEFAULT_STALE_AFTER_SECS
    }
    fn default_startup_grace() -> u64 {
        DEFAULT_STARTUP_GRACE_SECS
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_seconds)
    }

    pub fn init_timeout(&self) -> Duration {
        Duration::from_secs(self.init_timeout_seconds)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_seconds)
    }

    pub fn startup_grace(&self) -> Duration {
        Duration::from_secs(self.startup_grace_seconds)
    }
}

/// Service identity
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "ServiceConfig::default_name")]
    pub name: String,
    #[serde(default = "ServiceConfig::default_environment")]
    pub environment: String,
    /// Raises the default log filter to debug
    #[serde(default)]
    pub debug: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: Self::default_name(),
            environment: Self::default_environment(),
            debug: false,
        }
    }
}

impl ServiceConfig {
    fn default_name() -> String {
        DEFAULT_APP_NAME.to_string()
    }

    fn default_environment() -> String {
        DEFAULT_ENVIRONMENT.to_string()
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "text" (human-readable, default) or "json" (structured)
    #[serde(default = "LoggingConfig::default_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: DEFAULT_LOG_FORMAT.to_string(),
        }
    }
}

impl LoggingConfig {
    fn default_format() -> String {
        DEFAULT_LOG_FORMAT.to_string()
    }
}

impl AppConfig {
    /// Load configuration from `path` (if given) and the process environment.
    ///
    /// With no explicit path, `DEFAULT_CONFIG_PATH` is read when it exists and
    /// silently skipped otherwise. An explicit path that cannot be read is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_PATH))?
            }
            None => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file without applying environment overrides.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Apply environment overrides using `lookup` to read variables.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT").filter(|v| !v.trim().is_empty()) {
            self.http.port = port.trim().parse().map_err(|_| {
                ConfigError::Validation(format!("PORT must be a port number, got {:?}", port))
            })?;
        }
        if let Some(name) = lookup("APP_NAME") {
            self.service.name = name;
        }
        if let Some(env) = lookup("ENV") {
            self.service.environment = env;
        }
        if let Some(debug) = lookup("DEBUG") {
            self.service.debug = debug.eq_ignore_ascii_case("true");
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            self.logging.format = format;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker.tick_interval_seconds == 0 {
            return Err(ConfigError::Validation(
                "worker.tick_interval_seconds must be greater than zero".to_string(),
            ));
        }
        if self.worker.stale_after_seconds < self.worker.tick_interval_seconds {
            return Err(ConfigError::Validation(
                "worker.stale_after_seconds must be at least worker.tick_interval_seconds".to_string(),
            ));
        }
        match self.logging.format.as_str() {
            "text" | "json" => Ok(()),
            other => Err(ConfigError::Validation(format!(
                "logging.format must be \"text\" or \"json\", got {:?}",
                other
            ))),
        }
    }

    /// Log filter used when neither the CLI nor RUST_LOG provides one
    pub fn default_log_filter(&self) -> &'static str {
        if self.service.debug {
            DEBUG_LOG_FILTER
        } else {
            DEFAULT_LOG_FILTER
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Configuration error: {0}")]
    Validation(String),
}
