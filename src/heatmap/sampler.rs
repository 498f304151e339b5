//! Pointer-to-grid sampling
//!
//! Pointer move events fire far faster than heat is worth recording. The
//! sampler gates heat additions to a fixed cadence, keeps heating a cell
//! while the pointer rests on it, and gates redraws on a separate cadence.

use crate::clock::FrameThrottle;
use crate::config::HeatmapConfig;
use crate::heatmap::grid::HeatmapGrid;

/// Rate-limited feeder for a [`HeatmapGrid`]
#[derive(Debug, Clone)]
pub struct PointerSampler {
    heat_gate: FrameThrottle,
    draw_gate: FrameThrottle,
    position: Option<(f64, f64)>,
}

impl PointerSampler {
    pub fn new(config: &HeatmapConfig) -> Self {
        Self {
            heat_gate: FrameThrottle::new(config.heat_interval_ms),
            draw_gate: FrameThrottle::new(config.draw_interval_ms),
            position: None,
        }
    }

    /// Pointer moved to a surface-relative position.
    ///
    /// Returns whether heat was added.
    pub fn on_pointer_move(&mut self, grid: &mut HeatmapGrid, x: f64, y: f64, now_ms: u64) -> bool {
        if !(x.is_finite() && y.is_finite()) {
            return false;
        }
        self.position = Some((x, y));
        self.heat_at_position(grid, now_ms)
    }

    /// Pointer left the surface.
    pub fn on_pointer_leave(&mut self) {
        self.position = None;
    }

    /// Animation frame: keep heating the hovered cell.
    pub fn tick(&mut self, grid: &mut HeatmapGrid, now_ms: u64) -> bool {
        self.heat_at_position(grid, now_ms)
    }

    /// Whether the renderer should repaint on this frame.
    pub fn should_draw(&mut self, now_ms: u64) -> bool {
        self.draw_gate.should_fire(now_ms)
    }

    fn heat_at_position(&mut self, grid: &mut HeatmapGrid, now_ms: u64) -> bool {
        let Some((x, y)) = self.position else {
            return false;
        };
        if grid.cell_index(x, y).is_none() {
            return false;
        }
        if !self.heat_gate.should_fire(now_ms) {
            return false;
        }
        grid.add_heat(x, y)
    }
}
