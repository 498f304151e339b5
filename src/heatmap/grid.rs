//! Spatial hit histogram
//!
//! A flat `cols * rows` count array over a rectangular surface. Point
//! insertion is O(1) and allocation-free; top-cell extraction sorts the
//! non-empty cells, which stays cheap because the grid size is bounded by
//! configuration.
//!
//! Resize policy: any change of dimensions discards the accumulated counts
//! and starts a fresh histogram. Rebinning a sparse histogram onto a
//! different partition is lossy, so the grid never attempts it.

use crate::config::HeatmapConfig;
use crate::error::TelemetryError;
use crate::types::{GridDimensions, HeatmapSnapshot, TopCell};
use tracing::debug;

/// Largest grid the histogram will allocate
pub const MAX_GRID_CELLS: usize = 1_000_000;

/// 2D histogram of pointer activity
#[derive(Debug, Clone)]
pub struct HeatmapGrid {
    dims: GridDimensions,
    cells: Vec<u32>,
}

impl GridDimensions {
    /// Derive grid dimensions from the observed surface size.
    ///
    /// Columns are fixed by configuration, rows follow the content height in
    /// fixed-height cells, capped at `max_rows`.
    pub fn from_surface(
        width: f64,
        content_height: f64,
        config: &HeatmapConfig,
    ) -> Result<Self, TelemetryError> {
        if !(width.is_finite() && width > 0.0) {
            return Err(TelemetryError::InvalidDimensions(format!(
                "surface width must be positive, got {width}"
            )));
        }
        let cols = config.cols.max(1);
        let rows = if content_height.is_finite() && content_height > 0.0 {
            ((content_height / config.cell_height).ceil() as usize).clamp(1, config.max_rows.max(1))
        } else {
            1
        };

        Ok(Self {
            cols,
            rows,
            cell_width: width / cols as f64,
            cell_height: config.cell_height,
        })
    }
}

fn check_dimensions(
    cols: usize,
    rows: usize,
    cell_width: f64,
    cell_height: f64,
) -> Result<GridDimensions, TelemetryError> {
    if cols == 0 || rows == 0 {
        return Err(TelemetryError::InvalidDimensions(format!(
            "grid must have at least one cell, got {cols}x{rows}"
        )));
    }
    match cols.checked_mul(rows) {
        Some(cells) if cells <= MAX_GRID_CELLS => {}
        _ => {
            return Err(TelemetryError::InvalidDimensions(format!(
                "grid of {cols}x{rows} exceeds {MAX_GRID_CELLS} cells"
            )));
        }
    }
    if !(cell_width.is_finite() && cell_width > 0.0 && cell_height.is_finite() && cell_height > 0.0)
    {
        return Err(TelemetryError::InvalidDimensions(format!(
            "cell size must be positive, got {cell_width}x{cell_height}"
        )));
    }
    Ok(GridDimensions {
        cols,
        rows,
        cell_width,
        cell_height,
    })
}

impl HeatmapGrid {
    /// Allocate a zeroed grid.
    pub fn initialize(
        cols: usize,
        rows: usize,
        cell_width: f64,
        cell_height: f64,
    ) -> Result<Self, TelemetryError> {
        let dims = check_dimensions(cols, rows, cell_width, cell_height)?;
        Ok(Self {
            dims,
            cells: vec![0; dims.cell_count()],
        })
    }

    /// Allocate a zeroed grid with the given layout.
    pub fn with_dimensions(dims: GridDimensions) -> Result<Self, TelemetryError> {
        Self::initialize(dims.cols, dims.rows, dims.cell_width, dims.cell_height)
    }

    /// Record one hit at a surface-relative point.
    ///
    /// Points outside the surface (or non-finite) are ignored. Returns
    /// whether a cell was incremented.
    pub fn add_heat(&mut self, x: f64, y: f64) -> bool {
        match self.cell_index(x, y) {
            Some(index) => {
                self.cells[index] = self.cells[index].saturating_add(1);
                true
            }
            None => false,
        }
    }

    /// Flat index of the cell containing a point, if the point is on the surface
    pub fn cell_index(&self, x: f64, y: f64) -> Option<usize> {
        if !(x.is_finite() && y.is_finite()) {
            return None;
        }
        if x < 0.0 || y < 0.0 || x >= self.dims.width() || y >= self.dims.height() {
            return None;
        }
        // Floating point division can land exactly on the far edge.
        let col = ((x / self.dims.cell_width).floor() as usize).min(self.dims.cols - 1);
        let row = ((y / self.dims.cell_height).floor() as usize).min(self.dims.rows - 1);
        Some(row * self.dims.cols + col)
    }

    /// Change the grid layout, discarding counts when the layout differs.
    pub fn resize(
        &mut self,
        cols: usize,
        rows: usize,
        cell_width: f64,
        cell_height: f64,
    ) -> Result<(), TelemetryError> {
        let dims = check_dimensions(cols, rows, cell_width, cell_height)?;
        if dims == self.dims {
            return Ok(());
        }

        debug!(
            from_cols = self.dims.cols,
            from_rows = self.dims.rows,
            to_cols = dims.cols,
            to_rows = dims.rows,
            "heatmap grid resized, counts discarded"
        );
        self.dims = dims;
        self.cells = vec![0; dims.cell_count()];
        Ok(())
    }

    /// Non-empty cells ordered by count descending, then index ascending,
    /// truncated to `top_n`.
    pub fn top_cells(&self, top_n: usize) -> Vec<TopCell> {
        let mut cells: Vec<TopCell> = self
            .cells
            .iter()
            .enumerate()
            .filter(|(_, value)| **value > 0)
            .map(|(index, &value)| TopCell { index, value })
            .collect();

        cells.sort_unstable_by(|a, b| b.value.cmp(&a.value).then(a.index.cmp(&b.index)));
        cells.truncate(top_n);
        cells
    }

    /// Zero every cell outside the top `top_n`.
    ///
    /// Later [`add_heat`](Self::add_heat) calls accumulate on the filtered
    /// state and may revive any cell.
    pub fn show_top_cells_only(&mut self, top_n: usize) {
        let keep = self.top_cells(top_n);
        let mut filtered = vec![0; self.cells.len()];
        for cell in keep {
            filtered[cell.index] = cell.value;
        }
        self.cells = filtered;
    }

    pub fn max_count(&self) -> u32 {
        self.cells.iter().copied().max().unwrap_or(0)
    }

    /// Sum of all cell counts
    pub fn total_count(&self) -> u64 {
        self.cells.iter().map(|&c| c as u64).sum()
    }

    /// Raw count array, row-major
    pub fn grid(&self) -> &[u32] {
        &self.cells
    }

    pub fn dimensions(&self) -> GridDimensions {
        self.dims
    }

    /// Zero all cells, keeping the layout
    pub fn reset(&mut self) {
        self.cells.iter_mut().for_each(|c| *c = 0);
    }

    /// Copy of the grid for providers and renderers
    pub fn snapshot(&self) -> HeatmapSnapshot {
        HeatmapSnapshot {
            cols: self.dims.cols,
            rows: self.dims.rows,
            cell_width: self.dims.cell_width,
            cell_height: self.dims.cell_height,
            grid: self.cells.clone(),
            max_count: self.max_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn small_grid() -> HeatmapGrid {
        HeatmapGrid::initialize(2, 2, 10.0, 10.0).unwrap()
    }

    #[test]
    fn test_top_cells_scenario() {
        let mut grid = small_grid();
        grid.add_heat(5.0, 5.0);
        grid.add_heat(5.0, 5.0);
        grid.add_heat(5.0, 5.0);
        grid.add_heat(15.0, 15.0);

        assert_eq!(
            grid.top_cells(2),
            vec![TopCell { index: 0, value: 3 }, TopCell { index: 3, value: 1 }]
        );
    }

    #[test]
    fn test_out_of_surface_points_ignored() {
        let mut grid = small_grid();
        assert!(!grid.add_heat(-0.1, 5.0));
        assert!(!grid.add_heat(5.0, 20.0));
        assert!(!grid.add_heat(20.0, 0.0));
        assert!(!grid.add_heat(f64::NAN, 1.0));
        assert!(!grid.add_heat(1.0, f64::INFINITY));
        assert_eq!(grid.max_count(), 0);

        // Edges: the near edge is inside, the far edge is not.
        assert!(grid.add_heat(0.0, 0.0));
        assert!(grid.add_heat(19.999, 19.999));
        assert_eq!(grid.grid(), &[1, 0, 0, 1]);
    }

    #[test]
    fn test_ties_broken_by_index() {
        let mut grid = small_grid();
        grid.add_heat(15.0, 15.0); // index 3
        grid.add_heat(15.0, 5.0); // index 1
        grid.add_heat(5.0, 15.0); // index 2

        let top = grid.top_cells(10);
        let indices: Vec<usize> = top.iter().map(|c| c.index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
    }

    #[test]
    fn test_show_top_cells_only_then_revive() {
        let mut grid = small_grid();
        for _ in 0..4 {
            grid.add_heat(1.0, 1.0);
        }
        grid.add_heat(11.0, 1.0);
        grid.add_heat(11.0, 1.0);
        grid.add_heat(1.0, 11.0);

        grid.show_top_cells_only(2);
        assert_eq!(grid.grid(), &[4, 2, 0, 0]);

        // Filtered cells can accumulate again.
        grid.add_heat(1.0, 11.0);
        assert_eq!(grid.grid(), &[4, 2, 1, 0]);
    }

    #[test]
    fn test_resize_discards_counts() {
        let mut grid = small_grid();
        grid.add_heat(5.0, 5.0);
        grid.add_heat(15.0, 15.0);

        grid.resize(2, 2, 10.0, 10.0).unwrap();
        assert_eq!(grid.total_count(), 2, "same layout keeps counts");

        grid.resize(4, 3, 5.0, 10.0).unwrap();
        assert_eq!(grid.grid().len(), 12);
        assert_eq!(grid.total_count(), 0);
        assert_eq!(grid.dimensions().cols, 4);
        assert_eq!(grid.dimensions().rows, 3);
    }

    #[test]
    fn test_reset_keeps_dimensions() {
        let mut grid = small_grid();
        grid.add_heat(5.0, 5.0);
        grid.reset();
        assert_eq!(grid.max_count(), 0);
        assert_eq!(grid.dimensions(), small_grid().dimensions());
    }

    #[test]
    fn test_invalid_dimensions_rejected() {
        assert!(HeatmapGrid::initialize(0, 2, 10.0, 10.0).is_err());
        assert!(HeatmapGrid::initialize(2, 2, 0.0, 10.0).is_err());
        assert!(HeatmapGrid::initialize(2, 2, 10.0, f64::NAN).is_err());
        let mut grid = small_grid();
        assert!(grid.resize(2, 0, 10.0, 10.0).is_err());
        assert!(matches!(
            grid.resize(usize::MAX, 2, 10.0, 10.0),
            Err(TelemetryError::InvalidDimensions(_))
        ));
        assert!(HeatmapGrid::initialize(MAX_GRID_CELLS + 1, 1, 1.0, 1.0).is_err());
        assert_eq!(grid.dimensions().rows, 2);
    }

    #[test]
    fn test_dimensions_from_surface() {
        let config = HeatmapConfig::default();
        let dims = GridDimensions::from_surface(1000.0, 410.0, &config).unwrap();
        assert_eq!(dims.cols, 25);
        assert_eq!(dims.rows, 11);
        assert_eq!(dims.cell_width, 40.0);
        assert_eq!(dims.cell_height, 40.0);

        let tall = GridDimensions::from_surface(1000.0, 1_000_000.0, &config).unwrap();
        assert_eq!(tall.rows, 100);

        let empty = GridDimensions::from_surface(1000.0, 0.0, &config).unwrap();
        assert_eq!(empty.rows, 1);

        assert!(GridDimensions::from_surface(0.0, 100.0, &config).is_err());
    }

    #[test]
    fn test_snapshot() {
        let mut grid = small_grid();
        grid.add_heat(5.0, 15.0);
        let snapshot = grid.snapshot();
        assert_eq!(snapshot.cols, 2);
        assert_eq!(snapshot.grid, vec![0, 0, 1, 0]);
        assert_eq!(snapshot.max_count, 1);
    }

    proptest! {
        #[test]
        fn prop_add_heat_stays_in_bounds(
            points in proptest::collection::vec((-50.0f64..250.0, -50.0f64..250.0), 0..200)
        ) {
            let mut grid = HeatmapGrid::initialize(5, 4, 40.0, 50.0).unwrap();
            let mut inside = 0u64;
            for (x, y) in points {
                if let Some(index) = grid.cell_index(x, y) {
                    prop_assert!(index < 20);
                }
                let on_surface = (0.0..200.0).contains(&x) && (0.0..200.0).contains(&y);
                prop_assert_eq!(grid.add_heat(x, y), on_surface);
                if on_surface {
                    inside += 1;
                }
            }
            prop_assert_eq!(grid.total_count(), inside);
        }

        #[test]
        fn prop_top_cells_sorted_and_bounded(
            points in proptest::collection::vec((0.0f64..100.0, 0.0f64..100.0), 0..300),
            n in 0usize..30
        ) {
            let mut grid = HeatmapGrid::initialize(10, 10, 10.0, 10.0).unwrap();
            for (x, y) in points {
                grid.add_heat(x, y);
            }

            let top = grid.top_cells(n);
            prop_assert!(top.len() <= n);
            prop_assert!(top.iter().all(|c| c.value > 0));
            for pair in top.windows(2) {
                prop_assert!(pair[0].value >= pair[1].value);
            }
            prop_assert_eq!(&top, &grid.top_cells(n));
        }

        #[test]
        fn prop_filter_keeps_exactly_top_cells(
            points in proptest::collection::vec((0.0f64..100.0, 0.0f64..100.0), 0..300),
            n in 0usize..30
        ) {
            let mut grid = HeatmapGrid::initialize(10, 10, 10.0, 10.0).unwrap();
            for (x, y) in points {
                grid.add_heat(x, y);
            }

            let expected = grid.top_cells(n);
            grid.show_top_cells_only(n);
            prop_assert_eq!(&grid.top_cells(n), &expected);

            let retained: u64 = expected.iter().map(|c| c.value as u64).sum();
            prop_assert_eq!(grid.total_count(), retained);
        }
    }
}
