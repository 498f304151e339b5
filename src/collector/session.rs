//! Active time accounting
//!
//! Active time is the sum of closed session spans plus the open span, if any.
//! The state lives behind a shared lock so the interaction tracker can read it
//! through an [`ActiveTimeFn`] without holding a reference to the collector.

use crate::clock::SharedClock;
use crate::tracking::ActiveTimeFn;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default, Clone, Copy)]
struct Spans {
    session_start_ms: Option<u64>,
    total_active_ms: u64,
}

impl Spans {
    fn active_at(&self, now: u64) -> u64 {
        let open = self
            .session_start_ms
            .map_or(0, |start| now.saturating_sub(start));
        self.total_active_ms + open
    }
}

/// Session span timer
pub struct ActiveTimer {
    clock: SharedClock,
    spans: Arc<Mutex<Spans>>,
}

impl ActiveTimer {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            clock,
            spans: Arc::new(Mutex::new(Spans::default())),
        }
    }

    fn read(&self) -> Spans {
        self.spans.lock().map(|s| *s).unwrap_or_default()
    }

    /// Open a span. Returns false if one is already open.
    pub fn open(&self) -> bool {
        let now = self.clock.now_ms();
        match self.spans.lock() {
            Ok(mut spans) if spans.session_start_ms.is_none() => {
                spans.session_start_ms = Some(now);
                true
            }
            _ => false,
        }
    }

    /// Fold the open span into the total. Returns false if none was open.
    pub fn close(&self) -> bool {
        let now = self.clock.now_ms();
        match self.spans.lock() {
            Ok(mut spans) => match spans.session_start_ms.take() {
                Some(start) => {
                    spans.total_active_ms += now.saturating_sub(start);
                    true
                }
                None => false,
            },
            Err(_) => false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.read().session_start_ms.is_some()
    }

    /// Start of the open span
    pub fn session_start_ms(&self) -> Option<u64> {
        self.read().session_start_ms
    }

    /// Closed spans plus the open one
    pub fn active_time_ms(&self) -> u64 {
        self.read().active_at(self.clock.now_ms())
    }

    /// Read-only view of the active time for other trackers
    pub fn reader(&self) -> ActiveTimeFn {
        let clock = Arc::clone(&self.clock);
        let spans = Arc::clone(&self.spans);
        Arc::new(move || {
            let snapshot = spans.lock().map(|s| *s).unwrap_or_default();
            snapshot.active_at(clock.now_ms())
        })
    }

    pub fn reset(&self) {
        if let Ok(mut spans) = self.spans.lock() {
            *spans = Spans::default();
        }
    }
}
