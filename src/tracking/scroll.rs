//! Scroll distance, velocity and session tracking
//!
//! Raw scroll events are reduced to running aggregates. A scroll session is a
//! run of qualifying samples with no gap longer than the idle timeout; the
//! idle timer is a deadline rearmed on every qualifying sample and checked
//! lazily, so nothing fires against a stopped tracker.

use crate::clock::SharedClock;
use crate::config::ScrollConfig;
use crate::tracking::surface::ScrollSurface;
use crate::types::{ScrollDirection, ScrollMetrics};
use std::sync::Arc;
use tracing::{debug, warn};

/// Share of samples one direction needs to be reported as dominant
const DOMINANT_DIRECTION_RATIO: f64 = 0.7;

/// Scroll aggregator for one tracked surface
pub struct ScrollTracker {
    config: ScrollConfig,
    clock: SharedClock,
    window: Arc<dyn ScrollSurface>,
    /// Bound surface; `Some` while listening
    target: Option<Arc<dyn ScrollSurface>>,

    last_position: f64,
    last_time_ms: u64,

    total_distance: f64,
    velocity_sum: f64,
    max_velocity: f64,
    sample_count: u32,
    down_samples: u32,
    up_samples: u32,

    scroll_sessions: u32,
    session_start_ms: Option<u64>,
    idle_deadline_ms: Option<u64>,
    total_scroll_time_ms: u64,
}

impl ScrollTracker {
    /// Create an idle tracker. `window` is the fallback surface.
    pub fn new(config: ScrollConfig, clock: SharedClock, window: Arc<dyn ScrollSurface>) -> Self {
        Self {
            config,
            clock,
            window,
            target: None,
            last_position: 0.0,
            last_time_ms: 0,
            total_distance: 0.0,
            velocity_sum: 0.0,
            max_velocity: 0.0,
            sample_count: 0,
            down_samples: 0,
            up_samples: 0,
            scroll_sessions: 0,
            session_start_ms: None,
            idle_deadline_ms: None,
            total_scroll_time_ms: 0,
        }
    }

    /// Start listening on `element`, or on the window when `None`.
    ///
    /// An element that cannot scroll is replaced by the window with a
    /// warning. Calling this while tracking rebinds to the new surface.
    pub fn start_tracking(&mut self, element: Option<Arc<dyn ScrollSurface>>) {
        if self.is_tracking() {
            self.stop_tracking();
        }

        let target = match element {
            Some(element) if element.is_scrollable() => element,
            Some(element) => {
                warn!(
                    scroll_height = element.scroll_height(),
                    client_height = element.client_height(),
                    "scroll element is not scrollable, falling back to window"
                );
                Arc::clone(&self.window)
            }
            None => Arc::clone(&self.window),
        };

        self.last_position = target.scroll_top();
        self.last_time_ms = self.clock.now_ms();
        self.target = Some(target);
        debug!(position = self.last_position, "scroll tracking started");
    }

    pub fn is_tracking(&self) -> bool {
        self.target.is_some()
    }

    /// Scroll event on the bound surface.
    pub fn handle_scroll(&mut self) {
        let Some(position) = self.target.as_ref().map(|t| t.scroll_top()) else {
            return;
        };
        self.handle_scroll_at(position);
    }

    /// Scroll event with an explicit position.
    pub fn handle_scroll_at(&mut self, position: f64) {
        if !self.is_tracking() || !position.is_finite() {
            return;
        }

        let now = self.clock.now_ms();
        self.expire_session(now);

        let distance = (position - self.last_position).abs();
        let time_diff = now.saturating_sub(self.last_time_ms);

        if time_diff > 0 && distance > self.config.noise_threshold_px {
            let velocity = distance / time_diff as f64;
            self.total_distance += distance;
            self.velocity_sum += velocity;
            self.max_velocity = self.max_velocity.max(velocity);
            self.sample_count += 1;
            if position > self.last_position {
                self.down_samples += 1;
            } else {
                self.up_samples += 1;
            }

            if self.session_start_ms.is_none() {
                self.session_start_ms = Some(now);
                self.scroll_sessions += 1;
            }
            self.idle_deadline_ms = Some(now.saturating_add(self.config.idle_ms));
        }

        self.last_position = position;
        self.last_time_ms = now;
    }

    /// Close the open session if its idle deadline has passed.
    pub fn poll(&mut self) {
        let now = self.clock.now_ms();
        self.expire_session(now);
    }

    fn expire_session(&mut self, now: u64) {
        if let (Some(start), Some(deadline)) = (self.session_start_ms, self.idle_deadline_ms) {
            if now >= deadline {
                self.total_scroll_time_ms += deadline.saturating_sub(start);
                self.session_start_ms = None;
                self.idle_deadline_ms = None;
            }
        }
    }

    /// Elapsed time of the open session, ending at the idle deadline if it
    /// has already passed.
    fn open_session_ms(&self, now: u64) -> u64 {
        match self.session_start_ms {
            Some(start) => {
                let end = self.idle_deadline_ms.map_or(now, |deadline| now.min(deadline));
                end.saturating_sub(start)
            }
            None => 0,
        }
    }

    pub fn metrics(&self) -> ScrollMetrics {
        let now = self.clock.now_ms();
        let average = if self.sample_count > 0 {
            self.velocity_sum / self.sample_count as f64
        } else {
            0.0
        };

        ScrollMetrics {
            total_scroll_distance: self.total_distance.round() as u64,
            average_scroll_velocity: to_px_per_second(average),
            max_scroll_velocity: to_px_per_second(self.max_velocity),
            scroll_sessions: self.scroll_sessions,
            scroll_direction: self.dominant_direction(),
            time_spent_scrolling: self.total_scroll_time_ms + self.open_session_ms(now),
        }
    }

    /// 0-100 summary of scroll behavior
    pub fn engagement_score(&self) -> u8 {
        let metrics = self.metrics();
        engagement_score(
            metrics.total_scroll_distance as f64,
            metrics.average_scroll_velocity,
            metrics.scroll_sessions,
            metrics.time_spent_scrolling,
        )
    }

    fn dominant_direction(&self) -> ScrollDirection {
        let total = self.down_samples + self.up_samples;
        if total == 0 {
            return ScrollDirection::Mixed;
        }
        let down_ratio = self.down_samples as f64 / total as f64;
        if down_ratio > DOMINANT_DIRECTION_RATIO {
            ScrollDirection::Down
        } else if 1.0 - down_ratio > DOMINANT_DIRECTION_RATIO {
            ScrollDirection::Up
        } else {
            ScrollDirection::Mixed
        }
    }

    /// Stop listening and fold the open session into the total.
    pub fn stop_tracking(&mut self) {
        let now = self.clock.now_ms();
        self.total_scroll_time_ms += self.open_session_ms(now);
        self.session_start_ms = None;
        self.idle_deadline_ms = None;
        if self.target.take().is_some() {
            debug!("scroll tracking stopped");
        }
    }

    /// Stop and zero every counter.
    pub fn clear(&mut self) {
        self.stop_tracking();
        self.last_position = 0.0;
        self.last_time_ms = 0;
        self.total_distance = 0.0;
        self.velocity_sum = 0.0;
        self.max_velocity = 0.0;
        self.sample_count = 0;
        self.down_samples = 0;
        self.up_samples = 0;
        self.scroll_sessions = 0;
        self.total_scroll_time_ms = 0;
    }
}

/// Round a px/ms velocity to px/s with two decimals
fn to_px_per_second(px_per_ms: f64) -> f64 {
    (px_per_ms * 1000.0 * 100.0).round() / 100.0
}

/// Weighted engagement score.
///
/// ```text
/// score = min(distance / 5000, 1) * 30
///       + min(velocity_px_s / 100, 1) * 20
///       + min(sessions / 10, 1) * 25
///       + min(time_ms / 60000, 1) * 25
/// ```
pub fn engagement_score(distance_px: f64, velocity_px_s: f64, sessions: u32, time_ms: u64) -> u8 {
    let component = |value: f64, cap: f64| (value.max(0.0) / cap).min(1.0);

    let score = component(distance_px, 5000.0) * 30.0
        + component(velocity_px_s, 100.0) * 20.0
        + component(sessions as f64, 10.0) * 25.0
        + component(time_ms as f64, 60_000.0) * 25.0;

    score.round().clamp(0.0, 100.0) as u8
}
