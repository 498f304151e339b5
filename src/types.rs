//! Telemetry data types
//!
//! Snapshot types produced by the trackers and the two payload shapes emitted
//! by the collector: the diagnostic [`RawMetrics`] and the backend wire
//! contract [`BackendMetrics`]. Field names of the backend payload are part of
//! the ingestion contract and must not change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Heatmap
// ============================================================================

/// Layout of a heatmap grid over its surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridDimensions {
    pub cols: usize,
    pub rows: usize,
    pub cell_width: f64,
    pub cell_height: f64,
}

impl GridDimensions {
    /// Number of cells in the grid, saturating at `usize::MAX`
    pub fn cell_count(&self) -> usize {
        self.cols.saturating_mul(self.rows)
    }

    /// Surface width covered by the grid
    pub fn width(&self) -> f64 {
        self.cols as f64 * self.cell_width
    }

    /// Surface height covered by the grid
    pub fn height(&self) -> f64 {
        self.rows as f64 * self.cell_height
    }
}

/// A non-empty grid cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopCell {
    /// Flat cell index (`row * cols + col`)
    pub index: usize,
    /// Hit count
    pub value: u32,
}

/// Full copy of a grid, handed out by a heatmap data provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeatmapSnapshot {
    pub cols: usize,
    pub rows: usize,
    pub cell_width: f64,
    pub cell_height: f64,
    pub grid: Vec<u32>,
    pub max_count: u32,
}

// ============================================================================
// Scroll
// ============================================================================

/// Dominant scroll direction over a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    Up,
    Down,
    Mixed,
}

/// Scroll aggregates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrollMetrics {
    /// Total distance scrolled, rounded to whole pixels
    pub total_scroll_distance: u64,
    /// Mean sample velocity in px/s (2 decimals)
    pub average_scroll_velocity: f64,
    /// Peak sample velocity in px/s (2 decimals)
    pub max_scroll_velocity: f64,
    /// Number of scroll sessions started
    pub scroll_sessions: u32,
    /// Dominant direction
    pub scroll_direction: ScrollDirection,
    /// Time spent inside scroll sessions in milliseconds
    pub time_spent_scrolling: u64,
}

impl Default for ScrollMetrics {
    fn default() -> Self {
        Self {
            total_scroll_distance: 0,
            average_scroll_velocity: 0.0,
            max_scroll_velocity: 0.0,
            scroll_sessions: 0,
            scroll_direction: ScrollDirection::Mixed,
            time_spent_scrolling: 0,
        }
    }
}

// ============================================================================
// Interaction
// ============================================================================

/// Per-entity exposure and interaction record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExposureRecord {
    /// Start of the current view span; `None` before the first exposure
    pub view_start_ms: Option<u64>,
    /// Completed view time in milliseconds
    pub view_time_ms: u64,
    /// Wall time of this entity's first interaction
    pub first_interaction_ms: Option<u64>,
    /// Number of times the entity entered the viewport
    pub exposures: u32,
    pub total_interactions: u32,
    pub interaction_rate_per_minute: f64,
    pub external_clicks: u32,
    pub is_currently_in_view: bool,
    pub last_seen_ms: u64,
}

/// Interaction tracker snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionMetrics {
    /// When tracking first started; `None` before the first start
    pub session_start_ms: Option<u64>,
    /// Time to first interaction, measured in active time
    pub first_interaction_active_time_ms: Option<u64>,
    pub total_interactions: u32,
    pub total_views: u32,
    pub external_clicks: u32,
    pub entities: BTreeMap<String, ExposureRecord>,
}

// ============================================================================
// Collector payloads
// ============================================================================

/// Click counts per project
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectClicks {
    pub code_views: u32,
    pub live_views: u32,
}

/// Diagnostic snapshot for in-app display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMetrics {
    pub session_id: String,
    pub captured_at: DateTime<Utc>,
    pub active_time_ms: u64,
    pub is_mobile: bool,
    pub email_copied: bool,
    pub social_clicks: u32,
    pub project_interactions: BTreeMap<String, ProjectClicks>,
    pub scroll_metrics: ScrollMetrics,
    pub engagement_score: u8,
    pub interaction_metrics: InteractionMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heatmap_data: Option<HeatmapSnapshot>,
}

/// Backend wire payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendMetrics {
    pub active_time_ms: u64,
    pub is_mobile: bool,
    pub email_copied: bool,
    pub social_clicks: u32,
    pub project_metrics: Vec<BackendProjectMetric>,
    pub scroll_metrics: BackendScrollMetrics,
    pub heatmap_data: BackendHeatmap,
}

/// Per-project entry of the backend payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendProjectMetric {
    pub id: String,
    /// View time in milliseconds
    pub view_time: u64,
    pub exposures: u32,
    pub code_views: u32,
    pub live_views: u32,
}

/// Scroll summary of the backend payload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendScrollMetrics {
    /// Engagement score, 0-100
    pub score: u8,
    pub scroll_time_ms: u64,
}

/// Compressed heatmap of the backend payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendHeatmap {
    pub cols: usize,
    pub rows: usize,
    pub top_cells: TopCellColumns,
}

/// Top cells in columnar form
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopCellColumns {
    pub indices: Vec<usize>,
    pub values: Vec<u32>,
}

impl TopCellColumns {
    pub fn from_cells(cells: &[TopCell]) -> Self {
        Self {
            indices: cells.iter().map(|c| c.index).collect(),
            values: cells.iter().map(|c| c.value).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}
