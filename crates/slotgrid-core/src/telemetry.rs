//! Telemetry and logging setup
//!
//! Installs a `tracing` subscriber with an `EnvFilter`. Library crates only
//! emit events; binaries call [`init_telemetry`] once at startup.

use crate::error::{Error, Result};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Telemetry configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to the startup event
    pub service_name: String,
    /// Whether to output logs to stdout
    pub stdout_enabled: bool,
    /// Log level filter (used when `RUST_LOG` is unset)
    pub log_level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
    /// Let `RUST_LOG` take precedence over `log_level`
    pub env_filter_enabled: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "slotgrid".to_string(),
            stdout_enabled: true,
            log_level: "info".to_string(),
            json: false,
            env_filter_enabled: true,
        }
    }
}

impl TelemetryConfig {
    /// Create a new configuration with the given service name
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    /// Disable stdout logging
    pub fn without_stdout(mut self) -> Self {
        self.stdout_enabled = false;
        self
    }

    /// Set the log level filter
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Emit JSON formatted logs
    pub fn with_json(mut self) -> Self {
        self.json = true;
        self
    }

    /// Use `log_level` even when `RUST_LOG` is set
    pub fn without_env_filter(mut self) -> Self {
        self.env_filter_enabled = false;
        self
    }

    fn env_filter(&self) -> EnvFilter {
        if self.env_filter_enabled {
            if let Ok(filter) = EnvFilter::try_from_default_env() {
                return filter;
            }
        }
        EnvFilter::new(&self.log_level)
    }

    /// Create from environment variables
    ///
    /// Reads:
    /// - `SLOTGRID_SERVICE_NAME`: Service name (default: "slotgrid")
    /// - `RUST_LOG`: Log level filter (default: "info")
    /// - `SLOTGRID_LOG_JSON`: Emit JSON lines (default: false)
    pub fn from_env() -> Self {
        let service_name =
            std::env::var("SLOTGRID_SERVICE_NAME").unwrap_or_else(|_| "slotgrid".to_string());

        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let json = std::env::var("SLOTGRID_LOG_JSON")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(false);

        Self {
            service_name,
            stdout_enabled: true,
            log_level,
            json,
            env_filter_enabled: true,
        }
    }
}

/// Guard returned by [`init_telemetry`]
///
/// Keep it alive for the lifetime of the process.
#[derive(Debug)]
pub struct TelemetryGuard {
    service_name: String,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::debug!(service = %self.service_name, "Telemetry shutting down");
    }
}

/// Initialize the global tracing subscriber
///
/// # Errors
/// Returns an error if a global subscriber is already installed.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard> {
    let env_filter = config.env_filter();

    let (pretty, json) = match (config.stdout_enabled, config.json) {
        (false, _) => (None, None),
        (true, false) => (Some(tracing_subscriber::fmt::layer()), None),
        (true, true) => (None, Some(tracing_subscriber::fmt::layer().json())),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(pretty)
        .with(json)
        .try_init()
        .map_err(|e| Error::Internal {
            reason: format!("failed to initialize tracing subscriber: {}", e),
        })?;

    tracing::info!(service = %config.service_name, "Telemetry initialized");

    Ok(TelemetryGuard {
        service_name: config.service_name,
    })
}
