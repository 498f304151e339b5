//! Metrics aggregation
//!
//! [`MetricsCollector`] owns the session lifecycle, the scroll and
//! interaction trackers, and the click counters. The heatmap is owned by the
//! host and reached only through the injected providers.

pub mod clicks;
pub mod device;
pub mod encoder;
pub mod session;

pub use clicks::{ClickKind, ClickPath, ElementInfo};
pub use device::DeviceProfile;
pub use encoder::BackendEncoder;
pub use session::ActiveTimer;

use crate::clock::SharedClock;
use crate::config::TelemetryConfig;
use crate::error::TelemetryError;
use crate::tracking::{InteractionTracker, ScrollSurface, ScrollTracker};
use crate::types::{BackendMetrics, HeatmapSnapshot, ProjectClicks, RawMetrics, TopCell};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, trace};
use uuid::Uuid;

/// Full heatmap copy, or `None` while the heatmap has no surface yet
pub type HeatmapDataProvider = Arc<dyn Fn() -> Option<HeatmapSnapshot> + Send + Sync>;

/// Top `n` heatmap cells
pub type TopCellsProvider = Arc<dyn Fn(usize) -> Vec<TopCell> + Send + Sync>;

/// Session-level telemetry aggregator
pub struct MetricsCollector {
    config: TelemetryConfig,
    clock: SharedClock,
    session_id: String,

    timer: ActiveTimer,
    scroll: ScrollTracker,
    interaction: InteractionTracker,
    encoder: BackendEncoder,

    device: DeviceProfile,
    scroll_element: Option<Arc<dyn ScrollSurface>>,
    tracked_ids: Vec<String>,
    heatmap_data: Option<HeatmapDataProvider>,
    top_cells: Option<TopCellsProvider>,

    email_copied: bool,
    social_clicks: u32,
    project_clicks: BTreeMap<String, ProjectClicks>,
    /// Set when a session was paused by the page becoming hidden
    resume_on_visible: bool,
}

impl MetricsCollector {
    /// Create a collector. `window` is the scroll surface used when no
    /// element is configured or the configured one cannot scroll.
    pub fn new(config: TelemetryConfig, clock: SharedClock, window: Arc<dyn ScrollSurface>) -> Self {
        let scroll = ScrollTracker::new(config.scroll.clone(), Arc::clone(&clock), window);
        let interaction = InteractionTracker::new(config.interaction.clone(), Arc::clone(&clock));
        Self {
            timer: ActiveTimer::new(Arc::clone(&clock)),
            encoder: BackendEncoder::new(config.heatmap.top_n),
            config,
            clock,
            session_id: Uuid::new_v4().to_string(),
            scroll,
            interaction,
            device: DeviceProfile::default(),
            scroll_element: None,
            tracked_ids: Vec::new(),
            heatmap_data: None,
            top_cells: None,
            email_copied: false,
            social_clicks: 0,
            project_clicks: BTreeMap::new(),
            resume_on_visible: false,
        }
    }

    /// Replace the generated session id
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Injection
    // ------------------------------------------------------------------

    pub fn set_heatmap_data_provider(&mut self, provider: HeatmapDataProvider) {
        self.heatmap_data = Some(provider);
    }

    pub fn set_top_cells_provider(&mut self, provider: TopCellsProvider) {
        self.top_cells = Some(provider);
    }

    /// Scroll container used by the next session start
    pub fn set_scroll_element(&mut self, element: Option<Arc<dyn ScrollSurface>>) {
        self.scroll_element = element;
    }

    /// Entities observed by the next session start. While a session is
    /// running, new ids are observed immediately.
    pub fn set_tracked_ids<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tracked_ids = ids.into_iter().map(Into::into).collect();
        if self.interaction.is_tracking() {
            for id in &self.tracked_ids {
                self.interaction.observe(id.clone());
            }
        }
    }

    pub fn set_device_profile(&mut self, device: DeviceProfile) {
        self.device = device;
    }

    pub fn device_profile(&self) -> DeviceProfile {
        self.device
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Open an active span and start both trackers. No-op while a session
    /// is already running.
    pub fn start_session(&mut self) {
        if !self.timer.open() {
            return;
        }
        self.resume_on_visible = false;

        self.interaction.set_active_time_provider(self.timer.reader());
        self.scroll.start_tracking(self.scroll_element.clone());
        self.interaction.start_tracking(self.tracked_ids.iter().cloned());

        debug!(
            session_id = %self.session_id,
            tracked = self.tracked_ids.len(),
            "session started"
        );
    }

    /// Close the active span and stop both trackers.
    pub fn pause_session(&mut self) {
        if self.timer.close() {
            debug!(
                session_id = %self.session_id,
                active_time_ms = self.timer.active_time_ms(),
                "session paused"
            );
        }
        self.scroll.stop_tracking();
        self.interaction.stop_tracking();
    }

    /// Pause and forget any pending resume.
    pub fn stop_session(&mut self) {
        self.pause_session();
        self.resume_on_visible = false;
        debug!(session_id = %self.session_id, "session stopped");
    }

    pub fn is_session_active(&self) -> bool {
        self.timer.is_open()
    }

    /// Page visibility changed. Hidden pauses a running session; visible
    /// resumes it only if it was running when the page was hidden.
    pub fn handle_visibility_change(&mut self, hidden: bool) {
        if hidden {
            if self.timer.is_open() {
                self.pause_session();
                self.resume_on_visible = true;
            }
        } else if self.resume_on_visible {
            self.start_session();
        }
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    /// Classify a click and route it to the counters and trackers.
    pub fn handle_click(&mut self, path: &ClickPath) -> ClickKind {
        let kind = ClickKind::classify(path);
        match &kind {
            ClickKind::EmailCopy => {
                self.email_copied = true;
            }
            ClickKind::Social { entity, href } => {
                self.social_clicks += 1;
                self.interaction.record_link_click(entity, href);
            }
            ClickKind::ProjectLive { project_id, href } => {
                self.project_clicks
                    .entry(project_id.clone())
                    .or_default()
                    .live_views += 1;
                self.interaction.record_link_click(project_id, href);
            }
            ClickKind::ProjectCode { project_id } => {
                self.project_clicks
                    .entry(project_id.clone())
                    .or_default()
                    .code_views += 1;
                self.interaction.record_button_click(project_id);
            }
            ClickKind::Ignored => {
                trace!(depth = path.0.len(), "click ignored");
            }
        }
        kind
    }

    /// Close an expired scroll session, if any.
    pub fn poll(&mut self) {
        self.scroll.poll();
    }

    pub fn scroll_tracker(&self) -> &ScrollTracker {
        &self.scroll
    }

    /// Scroll tracker, for forwarding scroll events
    pub fn scroll_tracker_mut(&mut self) -> &mut ScrollTracker {
        &mut self.scroll
    }

    pub fn interaction_tracker(&self) -> &InteractionTracker {
        &self.interaction
    }

    /// Interaction tracker, for forwarding visibility observations
    pub fn interaction_tracker_mut(&mut self) -> &mut InteractionTracker {
        &mut self.interaction
    }

    // ------------------------------------------------------------------
    // Output
    // ------------------------------------------------------------------

    pub fn active_time_ms(&self) -> u64 {
        self.timer.active_time_ms()
    }

    /// Diagnostic snapshot
    pub fn metrics(&self) -> RawMetrics {
        let captured_at = DateTime::<Utc>::from_timestamp_millis(self.clock.now_ms() as i64)
            .unwrap_or_default();

        RawMetrics {
            session_id: self.session_id.clone(),
            captured_at,
            active_time_ms: self.timer.active_time_ms(),
            is_mobile: self.device.is_mobile,
            email_copied: self.email_copied,
            social_clicks: self.social_clicks,
            project_interactions: self.project_clicks.clone(),
            scroll_metrics: self.scroll.metrics(),
            engagement_score: self.scroll.engagement_score(),
            interaction_metrics: self.interaction.metrics(),
            heatmap_data: self.heatmap_data.as_ref().and_then(|provider| provider()),
        }
    }

    /// Backend wire payload
    pub fn backend_metrics(&self) -> BackendMetrics {
        let raw = self.metrics();
        let top_cells = self.requested_top_cells(&raw);
        self.encoder.encode(&raw, top_cells)
    }

    /// Backend wire payload as JSON
    pub fn backend_metrics_json(&self) -> Result<String, TelemetryError> {
        let raw = self.metrics();
        let top_cells = self.requested_top_cells(&raw);
        self.encoder.encode_to_json(&raw, top_cells)
    }

    fn requested_top_cells(&self, raw: &RawMetrics) -> Option<Vec<TopCell>> {
        if raw.is_mobile {
            return None;
        }
        self.top_cells
            .as_ref()
            .map(|provider| provider(self.encoder.top_n()))
    }

    /// Stop everything and zero all counters. Injected providers and
    /// configuration are kept.
    pub fn clear(&mut self) {
        self.stop_session();
        self.scroll.clear();
        self.interaction.clear();
        self.timer.reset();
        self.email_copied = false;
        self.social_clicks = 0;
        self.project_clicks.clear();
        debug!(session_id = %self.session_id, "collector cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::heatmap::HeatmapGrid;
    use crate::tracking::{IntersectionEntry, WindowSurface};
    use crate::types::BackendHeatmap;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    struct Fixture {
        clock: Arc<ManualClock>,
        window: Arc<WindowSurface>,
        collector: MetricsCollector,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(0));
        let window = Arc::new(WindowSurface::new(4000.0, 800.0));
        let config = TelemetryConfig::default();
        let collector = MetricsCollector::new(config, clock.clone(), window.clone())
            .with_session_id("test-session");
        Fixture {
            clock,
            window,
            collector,
        }
    }

    fn live_link(id: &str, href: &str) -> ClickPath {
        ClickPath::new(vec![ElementInfo::new()
            .with_class("project-live-link")
            .with_attr("data-project-id", id)
            .with_attr("href", href)])
    }

    fn code_button(id: &str) -> ClickPath {
        ClickPath::new(vec![ElementInfo::new()
            .with_class("project-code-button")
            .with_attr("data-project-id", id)])
    }

    fn shared_grid(collector: &mut MetricsCollector) -> Arc<Mutex<HeatmapGrid>> {
        let grid = Arc::new(Mutex::new(HeatmapGrid::initialize(4, 4, 10.0, 10.0).unwrap()));
        let data = Arc::clone(&grid);
        collector.set_heatmap_data_provider(Arc::new(move || {
            data.lock().ok().map(|g| g.snapshot())
        }));
        let top = Arc::clone(&grid);
        collector.set_top_cells_provider(Arc::new(move |n| {
            top.lock().map(|g| g.top_cells(n)).unwrap_or_default()
        }));
        grid
    }

    #[test]
    fn test_active_time_across_pause() {
        let mut f = fixture();
        f.collector.start_session();
        f.clock.set(2000);
        f.collector.start_session(); // overlapping start is ignored
        f.clock.set(3000);
        f.collector.pause_session();
        f.clock.set(10_000);
        assert_eq!(f.collector.active_time_ms(), 3000);

        f.collector.start_session();
        f.clock.set(10_500);
        assert_eq!(f.collector.active_time_ms(), 3500);
        assert!(f.collector.is_session_active());
    }

    #[test]
    fn test_visibility_pauses_and_resumes() {
        let mut f = fixture();
        f.collector.handle_visibility_change(false);
        assert!(!f.collector.is_session_active());

        f.collector.start_session();
        f.clock.set(1000);
        f.collector.handle_visibility_change(true);
        assert!(!f.collector.is_session_active());

        f.clock.set(5000);
        f.collector.handle_visibility_change(false);
        assert!(f.collector.is_session_active());
        f.clock.set(5500);
        assert_eq!(f.collector.active_time_ms(), 1500);

        // A stopped session stays stopped when the page becomes visible.
        f.collector.handle_visibility_change(true);
        f.collector.stop_session();
        f.collector.handle_visibility_change(false);
        assert!(!f.collector.is_session_active());
    }

    #[test]
    fn test_click_routing() {
        let mut f = fixture();
        f.collector.start_session();

        let email = ClickPath::new(vec![ElementInfo::new().with_attr("data-copy-email", "")]);
        assert_eq!(f.collector.handle_click(&email), ClickKind::EmailCopy);

        let social = ClickPath::new(vec![ElementInfo::new()
            .with_class("social-link")
            .with_attr("data-social", "github")
            .with_attr("href", "https://github.com/alice")]);
        f.collector.handle_click(&social);
        f.collector.handle_click(&live_link("atlas", "https://atlas.dev"));
        f.collector.handle_click(&code_button("atlas"));
        f.collector.handle_click(&code_button("atlas"));
        let ignored = f
            .collector
            .handle_click(&ClickPath::new(vec![ElementInfo::new().with_class("hero")]));
        assert!(ignored.is_ignored());

        let raw = f.collector.metrics();
        assert!(raw.email_copied);
        assert_eq!(raw.social_clicks, 1);
        assert_eq!(
            raw.project_interactions["atlas"],
            ProjectClicks {
                code_views: 2,
                live_views: 1,
            }
        );
        let interaction = &raw.interaction_metrics;
        assert_eq!(interaction.total_interactions, 4);
        assert_eq!(interaction.external_clicks, 2);
        assert_eq!(interaction.entities["social:github"].total_interactions, 1);
        assert_eq!(interaction.first_interaction_active_time_ms, Some(0));
    }

    #[test]
    fn test_first_interaction_measured_in_active_time() {
        let mut f = fixture();
        f.collector.start_session();
        f.clock.set(1000);
        f.collector.pause_session();
        f.clock.set(60_000);
        f.collector.start_session();
        f.clock.set(60_400);
        f.collector.handle_click(&code_button("atlas"));

        let metrics = f.collector.metrics().interaction_metrics;
        assert_eq!(metrics.first_interaction_active_time_ms, Some(1400));
    }

    #[test]
    fn test_backend_includes_clicked_unviewed_projects() {
        let mut f = fixture();
        f.collector.set_tracked_ids(["atlas", "beacon"]);
        f.collector.start_session();

        f.collector.interaction_tracker_mut().handle_intersections(&[IntersectionEntry {
            id: "beacon".to_string(),
            ratio: 0.8,
        }]);
        f.clock.set(2500);
        f.collector.handle_click(&code_button("atlas"));
        f.collector.stop_session();

        let backend = f.collector.backend_metrics();
        assert_eq!(backend.active_time_ms, 2500);
        let ids: Vec<_> = backend.project_metrics.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["atlas", "beacon"]);
        assert_eq!(backend.project_metrics[0].exposures, 0);
        assert_eq!(backend.project_metrics[0].view_time, 0);
        assert_eq!(backend.project_metrics[0].code_views, 1);
        assert_eq!(backend.project_metrics[1].view_time, 2500);
        assert_eq!(backend.project_metrics[1].exposures, 1);
    }

    #[test]
    fn test_backend_view_time_counts_closed_spans_only() {
        let mut f = fixture();
        f.collector.set_tracked_ids(["atlas"]);
        f.collector.start_session();
        f.collector.interaction_tracker_mut().handle_intersections(&[IntersectionEntry {
            id: "atlas".to_string(),
            ratio: 1.0,
        }]);

        f.clock.set(3000);
        let mid_session = f.collector.backend_metrics();
        assert_eq!(mid_session.project_metrics[0].exposures, 1);
        assert_eq!(mid_session.project_metrics[0].view_time, 0);

        f.collector.stop_session();
        assert_eq!(f.collector.backend_metrics().project_metrics[0].view_time, 3000);
    }

    #[test]
    fn test_mobile_backend_heatmap_empty() {
        let mut f = fixture();
        let grid = shared_grid(&mut f.collector);
        grid.lock().unwrap().add_heat(5.0, 5.0);
        f.collector.set_device_profile(DeviceProfile::mobile());

        let backend = f.collector.backend_metrics();
        assert!(backend.is_mobile);
        assert_eq!(backend.heatmap_data, BackendHeatmap::default());

        // The raw snapshot still carries the grid for local display.
        assert!(f.collector.metrics().heatmap_data.is_some());
    }

    #[test]
    fn test_desktop_backend_heatmap() {
        let mut f = fixture();
        let grid = shared_grid(&mut f.collector);
        {
            let mut grid = grid.lock().unwrap();
            grid.add_heat(5.0, 5.0);
            grid.add_heat(15.0, 5.0);
            grid.add_heat(15.0, 5.0);
        }

        let backend = f.collector.backend_metrics();
        assert_eq!(backend.heatmap_data.cols, 4);
        assert_eq!(backend.heatmap_data.rows, 4);
        assert_eq!(backend.heatmap_data.top_cells.indices, vec![1, 0]);
        assert_eq!(backend.heatmap_data.top_cells.values, vec![2, 1]);
    }

    #[test]
    fn test_raw_heatmap_absent_without_provider() {
        let f = fixture();
        let raw = f.collector.metrics();
        assert!(raw.heatmap_data.is_none());
        let json = serde_json::to_value(&raw).unwrap();
        assert!(json.get("heatmapData").is_none());
        assert_eq!(json["sessionId"], "test-session");
    }

    #[test]
    fn test_scroll_flows_into_backend() {
        let mut f = fixture();
        f.collector.start_session();
        for (t, position) in [(100, 400.0), (200, 900.0), (300, 1500.0)] {
            f.clock.set(t);
            f.window.set_scroll_top(position);
            f.collector.scroll_tracker_mut().handle_scroll();
        }
        f.clock.set(500);

        let backend = f.collector.backend_metrics();
        assert_eq!(backend.scroll_metrics.scroll_time_ms, 400);
        assert_eq!(
            backend.scroll_metrics.score,
            f.collector.scroll_tracker().engagement_score()
        );
        assert!(backend.scroll_metrics.score > 0);
    }

    #[test]
    fn test_backend_json_is_camel_case() {
        let f = fixture();
        let json = f.collector.backend_metrics_json().unwrap();
        assert!(json.contains("\"activeTimeMs\":0"));
        assert!(json.contains("\"projectMetrics\":[]"));
    }

    #[test]
    fn test_clear_resets_counters() {
        let mut f = fixture();
        f.collector.start_session();
        f.collector.handle_click(&code_button("atlas"));
        f.clock.set(900);

        f.collector.clear();
        let raw = f.collector.metrics();
        assert!(!f.collector.is_session_active());
        assert_eq!(raw.active_time_ms, 0);
        assert!(raw.project_interactions.is_empty());
        assert!(raw.interaction_metrics.entities.is_empty());
        assert_eq!(raw.session_id, "test-session");
    }
}
