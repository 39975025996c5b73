//! Logging setup for gatekeeper
//!
//! Installs the global `tracing` subscriber. Output is JSON lines by default
//! or a human-readable format for local development.

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Telemetry error types
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Failed to install the subscriber
    #[error("Failed to initialize tracing: {0}")]
    Init(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Output format for log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl std::str::FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "text" => Ok(LogFormat::Pretty),
            other => Err(TelemetryError::Config(format!("unknown log format: {}", other))),
        }
    }
}

/// Map a level name onto a filter; unknown names fall back to `info`
pub fn parse_level(log_level: &str) -> LevelFilter {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    LevelFilter::from_level(level)
}

/// Initialize the global tracing subscriber
pub fn init_tracing(log_level: &str, log_format: &str) -> Result<(), TelemetryError> {
    let filter = parse_level(log_level);
    let format: LogFormat = log_format.parse()?;

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true),
            )
            .try_init()
            .map_err(|e| TelemetryError::Init(e.to_string()))?,
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()
            .map_err(|e| TelemetryError::Init(e.to_string()))?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug"), LevelFilter::DEBUG);
        assert_eq!(parse_level("WARNING"), LevelFilter::WARN);
        assert_eq!(parse_level("bogus"), LevelFilter::INFO);
    }

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("Pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_init_rejects_unknown_format() {
        assert!(matches!(
            init_tracing("info", "xml"),
            Err(TelemetryError::Config(_))
        ));
    }

    #[test]
    fn test_telemetry_error_display() {
        let err = TelemetryError::Init("already set".to_string());
        assert_eq!(err.to_string(), "Failed to initialize tracing: already set");
    }
}
