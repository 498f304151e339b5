//! Scrollable surfaces
//!
//! The scroll tracker reads positions through [`ScrollSurface`] rather than
//! a DOM element, so any host (browser binding, replay, tests) can supply
//! one.

use std::sync::Mutex;

/// A scrollable region: an element or the window
pub trait ScrollSurface: Send + Sync {
    /// Current vertical scroll offset in pixels
    fn scroll_top(&self) -> f64;

    /// Total scrollable content height
    fn scroll_height(&self) -> f64;

    /// Visible height
    fn client_height(&self) -> f64;

    /// A surface only scrolls when its content overflows it
    fn is_scrollable(&self) -> bool {
        self.scroll_height() > self.client_height()
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Extent {
    scroll_top: f64,
    scroll_height: f64,
    client_height: f64,
}

/// Settable surface used for the window and for hosts that push positions
#[derive(Debug, Default)]
pub struct WindowSurface {
    extent: Mutex<Extent>,
}

impl WindowSurface {
    pub fn new(scroll_height: f64, client_height: f64) -> Self {
        Self {
            extent: Mutex::new(Extent {
                scroll_top: 0.0,
                scroll_height,
                client_height,
            }),
        }
    }

    /// Record a new scroll offset
    pub fn set_scroll_top(&self, position: f64) {
        if let Ok(mut extent) = self.extent.lock() {
            extent.scroll_top = position;
        }
    }

    /// Record a new content/viewport size
    pub fn set_size(&self, scroll_height: f64, client_height: f64) {
        if let Ok(mut extent) = self.extent.lock() {
            extent.scroll_height = scroll_height;
            extent.client_height = client_height;
        }
    }

    fn read(&self) -> Extent {
        self.extent.lock().map(|e| *e).unwrap_or_default()
    }
}

impl ScrollSurface for WindowSurface {
    fn scroll_top(&self) -> f64 {
        self.read().scroll_top
    }

    fn scroll_height(&self) -> f64 {
        self.read().scroll_height
    }

    fn client_height(&self) -> f64 {
        self.read().client_height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scrollable_only_when_overflowing() {
        let surface = WindowSurface::new(800.0, 800.0);
        assert!(!surface.is_scrollable());

        surface.set_size(2400.0, 800.0);
        assert!(surface.is_scrollable());
    }

    #[test]
    fn test_scroll_top_updates() {
        let surface = WindowSurface::new(2400.0, 800.0);
        assert_eq!(surface.scroll_top(), 0.0);
        surface.set_scroll_top(320.5);
        assert_eq!(surface.scroll_top(), 320.5);
    }
}
