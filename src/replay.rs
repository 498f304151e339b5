//! Recorded session replay
//!
//! A session can be captured as a log of [`TelemetryEvent`]s (NDJSON or a
//! JSON array) and replayed deterministically: the replayer owns a manual
//! clock, a window surface and a heatmap grid, and drives a
//! [`MetricsCollector`] exactly as a host would.

use crate::clock::{Clock, ManualClock};
use crate::collector::{ClickPath, DeviceProfile, MetricsCollector};
use crate::config::TelemetryConfig;
use crate::error::TelemetryError;
use crate::heatmap::{HeatmapGrid, PointerSampler};
use crate::tracking::{IntersectionEntry, WindowSurface};
use crate::types::{BackendMetrics, GridDimensions, RawMetrics};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// One recorded host event. `t` is the event time in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TelemetryEvent {
    SessionStart {
        t: u64,
    },
    SessionPause {
        t: u64,
    },
    SessionStop {
        t: u64,
    },
    Visibility {
        t: u64,
        hidden: bool,
    },
    /// Container laid out: width, total content height and visible height
    SurfaceResize {
        t: u64,
        width: f64,
        content_height: f64,
        viewport_height: f64,
    },
    Device {
        t: u64,
        user_agent: String,
        viewport_width: f64,
    },
    /// Entities present in the container
    Track {
        t: u64,
        ids: Vec<String>,
    },
    PointerMove {
        t: u64,
        x: f64,
        y: f64,
    },
    PointerLeave {
        t: u64,
    },
    Scroll {
        t: u64,
        position: f64,
    },
    Intersection {
        t: u64,
        entries: Vec<IntersectionEntry>,
    },
    Click {
        t: u64,
        path: ClickPath,
    },
    /// Animation frame
    Tick {
        t: u64,
    },
}

impl TelemetryEvent {
    pub fn t(&self) -> u64 {
        match self {
            TelemetryEvent::SessionStart { t }
            | TelemetryEvent::SessionPause { t }
            | TelemetryEvent::SessionStop { t }
            | TelemetryEvent::Visibility { t, .. }
            | TelemetryEvent::SurfaceResize { t, .. }
            | TelemetryEvent::Device { t, .. }
            | TelemetryEvent::Track { t, .. }
            | TelemetryEvent::PointerMove { t, .. }
            | TelemetryEvent::PointerLeave { t }
            | TelemetryEvent::Scroll { t, .. }
            | TelemetryEvent::Intersection { t, .. }
            | TelemetryEvent::Click { t, .. }
            | TelemetryEvent::Tick { t } => *t,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TelemetryEvent::SessionStart { .. } => "session_start",
            TelemetryEvent::SessionPause { .. } => "session_pause",
            TelemetryEvent::SessionStop { .. } => "session_stop",
            TelemetryEvent::Visibility { .. } => "visibility",
            TelemetryEvent::SurfaceResize { .. } => "surface_resize",
            TelemetryEvent::Device { .. } => "device",
            TelemetryEvent::Track { .. } => "track",
            TelemetryEvent::PointerMove { .. } => "pointer_move",
            TelemetryEvent::PointerLeave { .. } => "pointer_leave",
            TelemetryEvent::Scroll { .. } => "scroll",
            TelemetryEvent::Intersection { .. } => "intersection",
            TelemetryEvent::Click { .. } => "click",
            TelemetryEvent::Tick { .. } => "tick",
        }
    }

    fn check(&self) -> Vec<String> {
        let mut problems = Vec::new();
        match self {
            TelemetryEvent::SurfaceResize {
                width,
                content_height,
                viewport_height,
                ..
            } => {
                if !(width.is_finite() && *width > 0.0) {
                    problems.push(format!("surface width must be positive, got {width}"));
                }
                if !content_height.is_finite() || !viewport_height.is_finite() {
                    problems.push("surface heights must be finite".to_string());
                }
            }
            TelemetryEvent::Device { viewport_width, .. } if !viewport_width.is_finite() => {
                problems.push(format!("viewport width must be finite, got {viewport_width}"));
            }
            TelemetryEvent::Track { ids, .. } if ids.iter().any(String::is_empty) => {
                problems.push("tracked ids must not be empty".to_string());
            }
            TelemetryEvent::PointerMove { x, y, .. } if !(x.is_finite() && y.is_finite()) => {
                problems.push(format!("pointer coordinates must be finite, got ({x}, {y})"));
            }
            TelemetryEvent::Scroll { position, .. } if !position.is_finite() => {
                problems.push(format!("scroll position must be finite, got {position}"));
            }
            TelemetryEvent::Intersection { entries, .. } => {
                for entry in entries {
                    if entry.id.is_empty() {
                        problems.push("intersection id must not be empty".to_string());
                    }
                    if !(0.0..=1.0).contains(&entry.ratio) {
                        problems.push(format!(
                            "intersection ratio for '{}' must be within [0, 1], got {}",
                            entry.id, entry.ratio
                        ));
                    }
                }
            }
            _ => {}
        }
        problems
    }
}

/// A problem found in a recorded log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Position of the event in the log
    pub index: usize,
    pub t: u64,
    pub kind: String,
    pub message: String,
}

/// Ordered list of recorded events
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventLog {
    pub events: Vec<TelemetryEvent>,
}

impl EventLog {
    pub fn new(events: Vec<TelemetryEvent>) -> Self {
        Self { events }
    }

    /// Parse a JSON array of events
    pub fn parse_array(json: &str) -> Result<Self, TelemetryError> {
        let events: Vec<TelemetryEvent> = serde_json::from_str(json)?;
        Ok(Self { events })
    }

    /// Parse NDJSON (one event per line, blank lines skipped)
    pub fn parse_ndjson(ndjson: &str) -> Result<Self, TelemetryError> {
        let mut events = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<TelemetryEvent>(trimmed) {
                Ok(event) => events.push(event),
                Err(e) => {
                    return Err(TelemetryError::ParseError(format!(
                        "Failed to parse line {}: {}",
                        line_num + 1,
                        e
                    )));
                }
            }
        }
        Ok(Self { events })
    }

    /// Parse either format, choosing by the first non-blank character
    pub fn parse(input: &str) -> Result<Self, TelemetryError> {
        if input.trim_start().starts_with('[') {
            Self::parse_array(input)
        } else {
            Self::parse_ndjson(input)
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Report every problem in the log. An empty result means the log is
    /// well formed.
    pub fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        let mut latest = 0u64;

        for (index, event) in self.events.iter().enumerate() {
            let t = event.t();
            let mut issue = |message: String| {
                issues.push(ValidationIssue {
                    index,
                    t,
                    kind: event.kind().to_string(),
                    message,
                });
            };

            if t < latest {
                issue(format!("time went backwards: {t} < {latest}"));
            }
            for problem in event.check() {
                issue(problem);
            }
            latest = latest.max(t);
        }
        issues
    }

    /// Fail with the first problem, if any
    pub fn ensure_valid(&self) -> Result<(), TelemetryError> {
        match self.validate().into_iter().next() {
            Some(issue) => Err(TelemetryError::ValidationError(format!(
                "event {} ({}): {}",
                issue.index, issue.kind, issue.message
            ))),
            None => Ok(()),
        }
    }
}

/// Both payloads at the end of a replay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayOutcome {
    pub raw: RawMetrics,
    pub backend: BackendMetrics,
}

/// Drives a [`MetricsCollector`] from recorded events
pub struct Replayer {
    config: TelemetryConfig,
    clock: Arc<ManualClock>,
    window: Arc<WindowSurface>,
    grid: Arc<Mutex<Option<HeatmapGrid>>>,
    sampler: PointerSampler,
    collector: MetricsCollector,
    events_applied: usize,
}

impl Replayer {
    pub fn new(config: TelemetryConfig) -> Self {
        let clock = Arc::new(ManualClock::new(0));
        let window = Arc::new(WindowSurface::default());
        let grid: Arc<Mutex<Option<HeatmapGrid>>> = Arc::new(Mutex::new(None));

        let mut collector = MetricsCollector::new(config.clone(), clock.clone(), window.clone());

        let data = Arc::clone(&grid);
        collector.set_heatmap_data_provider(Arc::new(move || {
            data.lock()
                .ok()
                .and_then(|grid| grid.as_ref().map(HeatmapGrid::snapshot))
        }));
        let top = Arc::clone(&grid);
        collector.set_top_cells_provider(Arc::new(move |n| {
            top.lock()
                .ok()
                .and_then(|grid| grid.as_ref().map(|g| g.top_cells(n)))
                .unwrap_or_default()
        }));

        Self {
            sampler: PointerSampler::new(&config.heatmap),
            config,
            clock,
            window,
            grid,
            collector,
            events_applied: 0,
        }
    }

    /// Use a fixed session id instead of a generated one
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.collector = self.collector.with_session_id(session_id);
        self
    }

    pub fn collector(&self) -> &MetricsCollector {
        &self.collector
    }

    pub fn events_applied(&self) -> usize {
        self.events_applied
    }

    /// Apply one event at its recorded time. Time never moves backwards;
    /// a late event is applied at the current time.
    pub fn apply(&mut self, event: &TelemetryEvent) {
        self.clock.set(event.t());
        let now = self.clock.now_ms();

        match event {
            TelemetryEvent::SessionStart { .. } => self.collector.start_session(),
            TelemetryEvent::SessionPause { .. } => self.collector.pause_session(),
            TelemetryEvent::SessionStop { .. } => self.collector.stop_session(),
            TelemetryEvent::Visibility { hidden, .. } => {
                self.collector.handle_visibility_change(*hidden)
            }
            TelemetryEvent::SurfaceResize {
                width,
                content_height,
                viewport_height,
                ..
            } => self.resize_surface(*width, *content_height, *viewport_height),
            TelemetryEvent::Device {
                user_agent,
                viewport_width,
                ..
            } => {
                let profile =
                    DeviceProfile::from_user_agent(user_agent, *viewport_width, &self.config.device);
                self.collector.set_device_profile(profile);
            }
            TelemetryEvent::Track { ids, .. } => self.collector.set_tracked_ids(ids.iter().cloned()),
            TelemetryEvent::PointerMove { x, y, .. } => {
                if let Ok(mut guard) = self.grid.lock() {
                    if let Some(grid) = guard.as_mut() {
                        self.sampler.on_pointer_move(grid, *x, *y, now);
                    }
                }
            }
            TelemetryEvent::PointerLeave { .. } => self.sampler.on_pointer_leave(),
            TelemetryEvent::Scroll { position, .. } => {
                self.window.set_scroll_top(*position);
                self.collector.scroll_tracker_mut().handle_scroll();
            }
            TelemetryEvent::Intersection { entries, .. } => self
                .collector
                .interaction_tracker_mut()
                .handle_intersections(entries),
            TelemetryEvent::Click { path, .. } => {
                self.collector.handle_click(path);
            }
            TelemetryEvent::Tick { .. } => {
                if let Ok(mut guard) = self.grid.lock() {
                    if let Some(grid) = guard.as_mut() {
                        self.sampler.tick(grid, now);
                    }
                }
                self.collector.poll();
            }
        }
        self.events_applied += 1;
    }

    fn resize_surface(&mut self, width: f64, content_height: f64, viewport_height: f64) {
        self.window.set_size(content_height, viewport_height);

        let dims = match GridDimensions::from_surface(width, content_height, &self.config.heatmap) {
            Ok(dims) => dims,
            Err(e) => {
                warn!(error = %e, "surface resize ignored");
                return;
            }
        };

        let Ok(mut guard) = self.grid.lock() else {
            return;
        };
        let result = match guard.as_mut() {
            Some(grid) => grid.resize(dims.cols, dims.rows, dims.cell_width, dims.cell_height),
            None => match HeatmapGrid::with_dimensions(dims) {
                Ok(grid) => {
                    *guard = Some(grid);
                    Ok(())
                }
                Err(e) => Err(e),
            },
        };
        if let Err(e) = result {
            warn!(error = %e, "surface resize ignored");
        }
    }

    /// Apply every event of `log` in order
    pub fn feed(&mut self, log: &EventLog) {
        for event in &log.events {
            self.apply(event);
        }
        debug!(
            events = log.len(),
            total = self.events_applied,
            "event log replayed"
        );
    }

    /// Current payloads
    pub fn outcome(&self) -> ReplayOutcome {
        ReplayOutcome {
            raw: self.collector.metrics(),
            backend: self.collector.backend_metrics(),
        }
    }

    /// Feed `log` and return the payloads at its last event
    pub fn replay(&mut self, log: &EventLog) -> ReplayOutcome {
        self.feed(log);
        self.outcome()
    }
}

/// Replay a log with a fresh replayer
pub fn replay_log(config: &TelemetryConfig, log: &EventLog) -> ReplayOutcome {
    Replayer::new(config.clone()).replay(log)
}
