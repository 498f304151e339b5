//! Error types for Folio Pulse

use thiserror::Error;

/// Errors that can occur while configuring or feeding the telemetry engine.
///
/// Runtime tracking paths never return these: out-of-range input is ignored
/// and rate calculations are guarded. Only operations that accept external
/// input (dimensions, configuration, recorded event logs) can fail.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Invalid grid dimensions: {0}")]
    InvalidDimensions(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Failed to parse event log: {0}")]
    ParseError(String),

    #[error("Event log failed validation: {0}")]
    ValidationError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
