//! Engine configuration.
//!
//! Every field has a default, so a partial JSON document (or `{}`) is a
//! valid configuration.

use crate::error::TelemetryError;
use crate::heatmap::MAX_GRID_CELLS;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration for the telemetry engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub heatmap: HeatmapConfig,
    pub scroll: ScrollConfig,
    pub interaction: InteractionConfig,
    pub device: DeviceConfig,
    pub logging: LoggingConfig,
}

/// Heatmap grid layout and cadence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeatmapConfig {
    /// Fixed number of columns across the surface width
    pub cols: usize,
    /// Fixed cell height in pixels; rows are derived from content height
    pub cell_height: f64,
    /// Upper bound on derived rows
    pub max_rows: usize,
    /// Number of cells kept in the backend payload
    pub top_n: usize,
    /// Minimum interval between redraws
    pub draw_interval_ms: u64,
    /// Minimum interval between heat additions while hovering
    pub heat_interval_ms: u64,
}

impl Default for HeatmapConfig {
    fn default() -> Self {
        Self {
            cols: 25,
            cell_height: 40.0,
            max_rows: 100,
            top_n: 100,
            draw_interval_ms: 100,
            heat_interval_ms: 150,
        }
    }
}

/// Longest accepted scroll idle gap (one hour)
pub const MAX_IDLE_MS: u64 = 3_600_000;

/// Scroll session segmentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrollConfig {
    /// Gap with no qualifying samples that ends a scroll session
    pub idle_ms: u64,
    /// Samples moving this many pixels or fewer are discarded
    pub noise_threshold_px: f64,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            idle_ms: 1000,
            noise_threshold_px: 1.0,
        }
    }
}

/// Exposure tracking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionConfig {
    /// Fraction of an element that must be visible to count as in view
    pub visibility_threshold: f64,
    /// URL of the page hosting the portfolio; used to classify external links
    pub page_url: String,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            visibility_threshold: 0.3,
            page_url: "http://localhost/".to_string(),
        }
    }
}

/// Device classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Viewports narrower than this are treated as mobile
    pub mobile_breakpoint_px: f64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            mobile_breakpoint_px: 768.0,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "folio_pulse=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl TelemetryConfig {
    /// Parse and validate a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self, TelemetryError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String, TelemetryError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self, TelemetryError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Reject values the trackers cannot work with.
    pub fn validate(&self) -> Result<(), TelemetryError> {
        if self.heatmap.cols == 0 {
            return Err(TelemetryError::ConfigError(
                "heatmap.cols must be at least 1".to_string(),
            ));
        }
        if self.heatmap.max_rows == 0 {
            return Err(TelemetryError::ConfigError(
                "heatmap.max_rows must be at least 1".to_string(),
            ));
        }
        match self.heatmap.cols.checked_mul(self.heatmap.max_rows) {
            Some(cells) if cells <= MAX_GRID_CELLS => {}
            _ => {
                return Err(TelemetryError::ConfigError(format!(
                    "heatmap.cols * heatmap.max_rows must not exceed {MAX_GRID_CELLS} cells"
                )));
            }
        }
        if !(self.heatmap.cell_height.is_finite() && self.heatmap.cell_height > 0.0) {
            return Err(TelemetryError::ConfigError(
                "heatmap.cell_height must be a positive number".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.interaction.visibility_threshold) {
            return Err(TelemetryError::ConfigError(format!(
                "interaction.visibility_threshold must be within [0, 1], got {}",
                self.interaction.visibility_threshold
            )));
        }
        if !(1..=MAX_IDLE_MS).contains(&self.scroll.idle_ms) {
            return Err(TelemetryError::ConfigError(format!(
                "scroll.idle_ms must be within [1, {MAX_IDLE_MS}], got {}",
                self.scroll.idle_ms
            )));
        }
        if !(self.scroll.noise_threshold_px.is_finite() && self.scroll.noise_threshold_px >= 0.0) {
            return Err(TelemetryError::ConfigError(
                "scroll.noise_threshold_px must be a non-negative number".to_string(),
            ));
        }
        Ok(())
    }
}
