//! Pointer heatmap
//!
//! A bounded spatial histogram of pointer activity and the sampler that feeds
//! it from pointer events.

pub mod grid;
pub mod sampler;

pub use grid::{HeatmapGrid, MAX_GRID_CELLS};
pub use sampler::PointerSampler;
