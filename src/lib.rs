//! Folio Pulse - client-side behavioral telemetry engine
//!
//! Pulse turns raw pointer, scroll, visibility and click events from a
//! portfolio page into engagement metrics: a bounded pointer heatmap, scroll
//! sessions with an engagement score, per-entity exposure and interaction
//! records, and a compact backend payload.
//!
//! ## Modules
//!
//! - **Heatmap**: spatial histogram of pointer activity and its sampler
//! - **Tracking**: scroll sessions and viewport exposure
//! - **Collector**: session lifecycle, click routing and payload encoding
//! - **Replay**: deterministic replay of recorded event logs

pub mod clock;
pub mod collector;
pub mod config;
pub mod error;
pub mod heatmap;
pub mod logging;
pub mod replay;
pub mod tracking;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use collector::{ClickKind, ClickPath, DeviceProfile, ElementInfo, MetricsCollector};
pub use config::TelemetryConfig;
pub use error::TelemetryError;
pub use heatmap::{HeatmapGrid, PointerSampler};
pub use replay::{replay_log, EventLog, ReplayOutcome, Replayer, TelemetryEvent};
pub use tracking::{InteractionTracker, ScrollSurface, ScrollTracker, WindowSurface};
pub use types::{BackendMetrics, RawMetrics};

/// Library version
pub const PULSE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported by the CLI
pub const PRODUCER_NAME: &str = "folio-pulse";
