//! Backend payload encoding
//!
//! Reduces a [`RawMetrics`] snapshot to the compact [`BackendMetrics`] wire
//! payload: per-project rows joined from exposure records and click counts,
//! a two-number scroll summary, and a columnar top-N heatmap.

use crate::collector::clicks::is_social_entity;
use crate::error::TelemetryError;
use crate::types::{
    BackendHeatmap, BackendMetrics, BackendProjectMetric, BackendScrollMetrics, RawMetrics,
    TopCell, TopCellColumns,
};
use std::collections::BTreeSet;

/// Encoder for the backend payload
pub struct BackendEncoder {
    top_n: usize,
}

impl BackendEncoder {
    /// Create an encoder keeping at most `top_n` heatmap cells
    pub fn new(top_n: usize) -> Self {
        Self { top_n }
    }

    pub fn top_n(&self) -> usize {
        self.top_n
    }

    /// Encode a raw snapshot. `top_cells` comes from the top-cells provider,
    /// if one is installed.
    pub fn encode(&self, raw: &RawMetrics, top_cells: Option<Vec<TopCell>>) -> BackendMetrics {
        BackendMetrics {
            active_time_ms: raw.active_time_ms,
            is_mobile: raw.is_mobile,
            email_copied: raw.email_copied,
            social_clicks: raw.social_clicks,
            project_metrics: self.build_project_metrics(raw),
            scroll_metrics: BackendScrollMetrics {
                score: raw.engagement_score,
                scroll_time_ms: raw.scroll_metrics.time_spent_scrolling,
            },
            heatmap_data: self.build_heatmap(raw, top_cells),
        }
    }

    /// Encode to a JSON string
    pub fn encode_to_json(
        &self,
        raw: &RawMetrics,
        top_cells: Option<Vec<TopCell>>,
    ) -> Result<String, TelemetryError> {
        let payload = self.encode(raw, top_cells);
        serde_json::to_string(&payload).map_err(TelemetryError::JsonError)
    }

    /// One row per project that was seen or clicked, ordered by id.
    ///
    /// `view_time` sums closed view spans only. A project still in view when
    /// the payload is built contributes nothing for its open span, so periodic
    /// payloads report 0 for a project that has not left the viewport since it
    /// appeared; the span is counted once it leaves view or the session stops.
    fn build_project_metrics(&self, raw: &RawMetrics) -> Vec<BackendProjectMetric> {
        let entities = &raw.interaction_metrics.entities;

        let ids: BTreeSet<&String> = entities
            .keys()
            .chain(raw.project_interactions.keys())
            .filter(|id| !is_social_entity(id))
            .collect();

        ids.into_iter()
            .map(|id| {
                let clicks = raw
                    .project_interactions
                    .get(id)
                    .copied()
                    .unwrap_or_default();
                let (view_time, exposures) = entities
                    .get(id)
                    .map_or((0, 0), |record| (record.view_time_ms, record.exposures));

                BackendProjectMetric {
                    id: id.clone(),
                    view_time,
                    exposures,
                    code_views: clicks.code_views,
                    live_views: clicks.live_views,
                }
            })
            .collect()
    }

    fn build_heatmap(&self, raw: &RawMetrics, top_cells: Option<Vec<TopCell>>) -> BackendHeatmap {
        // Never ship pointer data from handheld devices.
        if raw.is_mobile {
            return BackendHeatmap::default();
        }

        let (cols, rows) = raw
            .heatmap_data
            .as_ref()
            .map_or((0, 0), |snapshot| (snapshot.cols, snapshot.rows));

        let mut cells = top_cells.unwrap_or_default();
        cells.truncate(self.top_n);

        BackendHeatmap {
            cols,
            rows,
            top_cells: TopCellColumns::from_cells(&cells),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        ExposureRecord, HeatmapSnapshot, InteractionMetrics, ProjectClicks, ScrollMetrics,
    };
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn raw() -> RawMetrics {
        RawMetrics {
            session_id: "s-1".to_string(),
            captured_at: Utc::now(),
            active_time_ms: 12_000,
            is_mobile: false,
            email_copied: false,
            social_clicks: 0,
            project_interactions: BTreeMap::new(),
            scroll_metrics: ScrollMetrics::default(),
            engagement_score: 0,
            interaction_metrics: InteractionMetrics::default(),
            heatmap_data: None,
        }
    }

    fn snapshot(cols: usize, rows: usize) -> HeatmapSnapshot {
        HeatmapSnapshot {
            cols,
            rows,
            cell_width: 40.0,
            cell_height: 40.0,
            grid: vec![0; cols * rows],
            max_count: 0,
        }
    }

    #[test]
    fn test_projects_joined_and_sorted() {
        let mut raw = raw();
        raw.interaction_metrics.entities.insert(
            "beacon".to_string(),
            ExposureRecord {
                view_time_ms: 4000,
                exposures: 2,
                ..Default::default()
            },
        );
        raw.interaction_metrics
            .entities
            .insert("social:github".to_string(), ExposureRecord::default());
        raw.project_interactions.insert(
            "atlas".to_string(),
            ProjectClicks {
                code_views: 1,
                live_views: 0,
            },
        );
        raw.project_interactions.insert(
            "beacon".to_string(),
            ProjectClicks {
                code_views: 0,
                live_views: 3,
            },
        );

        let payload = BackendEncoder::new(100).encode(&raw, None);
        assert_eq!(
            payload.project_metrics,
            vec![
                BackendProjectMetric {
                    id: "atlas".to_string(),
                    view_time: 0,
                    exposures: 0,
                    code_views: 1,
                    live_views: 0,
                },
                BackendProjectMetric {
                    id: "beacon".to_string(),
                    view_time: 4000,
                    exposures: 2,
                    code_views: 0,
                    live_views: 3,
                },
            ]
        );
    }

    #[test]
    fn test_mobile_suppresses_heatmap() {
        let mut raw = raw();
        raw.is_mobile = true;
        raw.heatmap_data = Some(snapshot(25, 10));
        let cells = vec![TopCell { index: 3, value: 9 }];

        let payload = BackendEncoder::new(100).encode(&raw, Some(cells));
        assert_eq!(payload.heatmap_data, BackendHeatmap::default());

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            json["heatmapData"],
            serde_json::json!({"cols": 0, "rows": 0, "topCells": {"indices": [], "values": []}})
        );
    }

    #[test]
    fn test_heatmap_top_cells_truncated() {
        let mut raw = raw();
        raw.heatmap_data = Some(snapshot(25, 10));
        let cells = vec![
            TopCell { index: 7, value: 5 },
            TopCell { index: 2, value: 4 },
            TopCell { index: 9, value: 1 },
        ];

        let payload = BackendEncoder::new(2).encode(&raw, Some(cells));
        assert_eq!(payload.heatmap_data.cols, 25);
        assert_eq!(payload.heatmap_data.rows, 10);
        assert_eq!(payload.heatmap_data.top_cells.indices, vec![7, 2]);
        assert_eq!(payload.heatmap_data.top_cells.values, vec![5, 4]);
    }

    #[test]
    fn test_missing_providers_zero_heatmap() {
        let payload = BackendEncoder::new(100).encode(&raw(), None);
        assert_eq!(payload.heatmap_data, BackendHeatmap::default());
        assert!(payload.heatmap_data.top_cells.is_empty());
    }

    #[test]
    fn test_scroll_summary() {
        let mut raw = raw();
        raw.engagement_score = 64;
        raw.scroll_metrics.time_spent_scrolling = 3300;

        let payload = BackendEncoder::new(100).encode(&raw, None);
        assert_eq!(
            payload.scroll_metrics,
            BackendScrollMetrics {
                score: 64,
                scroll_time_ms: 3300,
            }
        );
    }
}
