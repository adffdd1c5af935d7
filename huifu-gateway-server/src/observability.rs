//! Observability for the gateway server.
//!
//! Structured logging setup and the `/health` report.

use std::io;

use serde_json::{Value, json};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
};

/// Log format configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable pretty format for development.
    Pretty,
    /// JSON format for production log aggregation.
    Json,
}

impl LogFormat {
    /// Determines log format from environment.
    ///
    /// Checks `LOG_FORMAT` environment variable:
    /// - `json` => JSON format
    /// - `pretty` or unset => Pretty format
    #[must_use]
    pub fn from_env() -> Self {
        Self::parse(&std::env::var("LOG_FORMAT").unwrap_or_default())
    }

    fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Installs the global tracing subscriber.
///
/// Output goes to stderr. The level filter comes from `RUST_LOG` and defaults
/// to `info`. Audit events are emitted on the `audit` target, so
/// `RUST_LOG=info,audit=off` silences them.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_observability(format: LogFormat) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let output = match format {
        LogFormat::Pretty => fmt::layer()
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_writer(io::stderr)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_writer(io::stderr)
            .boxed(),
    };

    tracing_subscriber::registry().with(filter).with(output).try_init()
}

/// Health check status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// Serving with the configured backends.
    Healthy,
    /// Serving, but with reduced capability.
    Degraded,
}

impl HealthStatus {
    /// Returns string representation for JSON serialization.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
        }
    }
}

/// Status of an individual check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthCheckStatus {
    /// Check passed.
    Pass,
    /// Degraded but operational.
    Warn,
}

impl HealthCheckStatus {
    /// Returns string representation for JSON serialization.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Warn => "warn",
        }
    }
}

/// Individual health check result.
#[derive(Debug, Clone)]
pub struct HealthCheck {
    /// Check name.
    pub name: String,
    /// Check status.
    pub status: HealthCheckStatus,
    /// Optional message with details.
    pub message: Option<String>,
}

impl HealthCheck {
    /// Creates a passing check with a message.
    #[must_use]
    pub fn pass<N: Into<String>, M: Into<String>>(name: N, message: M) -> Self {
        Self { name: name.into(), status: HealthCheckStatus::Pass, message: Some(message.into()) }
    }

    /// Creates a warning check with a message.
    #[must_use]
    pub fn warn<N: Into<String>, M: Into<String>>(name: N, message: M) -> Self {
        Self { name: name.into(), status: HealthCheckStatus::Warn, message: Some(message.into()) }
    }
}

/// Health report served at `/health`.
#[derive(Debug, Clone)]
pub struct HealthReport {
    /// Overall status.
    pub status: HealthStatus,
    /// Server version.
    pub version: String,
    /// Uptime in seconds.
    pub uptime_secs: u64,
    /// Number of registered tenants.
    pub tenants: usize,
    /// Individual checks.
    pub checks: Vec<HealthCheck>,
}

impl HealthReport {
    /// Builds a report, deriving the overall status from `checks`.
    #[must_use]
    pub fn new(uptime_secs: u64, tenants: usize, checks: Vec<HealthCheck>) -> Self {
        Self {
            status: Self::compute_status(&checks),
            version: env!("CARGO_PKG_VERSION").to_owned(),
            uptime_secs,
            tenants,
            checks,
        }
    }

    /// JSON form of the report.
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            "status": self.status.as_str(),
            "version": self.version,
            "uptime_secs": self.uptime_secs,
            "tenants": self.tenants,
            "checks": self.checks.iter().map(|c| {
                let mut obj = json!({
                    "name": c.name,
                    "status": c.status.as_str(),
                });
                if let Some(msg) = &c.message {
                    obj["message"] = Value::String(msg.clone());
                }
                obj
            }).collect::<Vec<_>>(),
        })
    }

    /// Determines overall status from individual checks.
    #[must_use]
    pub fn compute_status(checks: &[HealthCheck]) -> HealthStatus {
        if checks.iter().any(|c| c.status == HealthCheckStatus::Warn) {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}
