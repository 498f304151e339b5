//! Time sources and cadence gates.
//!
//! Every tracker reads time through a [`Clock`] so that hosts can drive the
//! engine from wall-clock time while replay and tests drive it from a
//! [`ManualClock`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Millisecond time source.
pub trait Clock: Send + Sync {
    /// Current time in milliseconds.
    fn now_ms(&self) -> u64;
}

/// Clock shared between the collector and its trackers.
pub type SharedClock = Arc<dyn Clock>;

/// Wall-clock time in Unix milliseconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        chrono::Utc::now().timestamp_millis().max(0) as u64
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: AtomicU64::new(start_ms),
        }
    }

    /// Set the current time. Moving backwards is ignored.
    pub fn set(&self, ms: u64) {
        self.now.fetch_max(ms, Ordering::SeqCst);
    }

    /// Advance the current time by `ms`.
    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Interval gate for throttled work (draw cadence, hover heat cadence).
///
/// The first call always fires; afterwards a call fires once at least
/// `interval_ms` has elapsed since the last firing.
#[derive(Debug, Clone)]
pub struct FrameThrottle {
    interval_ms: u64,
    last_fire_ms: Option<u64>,
}

impl FrameThrottle {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            last_fire_ms: None,
        }
    }

    /// Returns true and records the firing if enough time has passed.
    pub fn should_fire(&mut self, now_ms: u64) -> bool {
        match self.last_fire_ms {
            Some(last) if now_ms < last.saturating_add(self.interval_ms) => false,
            _ => {
                self.last_fire_ms = Some(now_ms);
                true
            }
        }
    }

    /// Forget the last firing so the next call fires immediately.
    pub fn reset(&mut self) {
        self.last_fire_ms = None;
    }
}
