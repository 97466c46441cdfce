//! Index window of the native grid that covers a reference grid.
//!
//! The window is what the spectral analysis and synthesis operate on, so its
//! shape is constrained: square, at least [`MIN_WINDOW_PIXELS`] cells per
//! side, even, and divisible by the spatial ratio.

use std::fmt;

use tracing::{debug, info, warn};

use super::axis::{AxisCoords, RegularGrid};
use super::nearest::NearestIndex;
use crate::constants::{COORD_TOLERANCE, EARTH_RADIUS_KM, MIN_WINDOW_PIXELS};
use crate::error::{RainfarmError, Result};

/// Inclusive index window into the native grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridWindow {
    i_min: usize,
    i_max: usize,
    j_min: usize,
    j_max: usize,
    ratio_s: usize,
}

impl GridWindow {
    /// Create a window, returning an error if any shape invariant is violated.
    pub fn new(i_min: usize, i_max: usize, j_min: usize, j_max: usize, ratio_s: usize) -> Result<Self> {
        if ratio_s == 0 {
            return Err(RainfarmError::config("spatial ratio must be >= 1"));
        }
        if i_min > i_max || j_min > j_max {
            return Err(RainfarmError::geometry(format!(
                "inverted window [{i_min}..={i_max}] x [{j_min}..={j_max}]"
            )));
        }
        let nx = i_max - i_min + 1;
        let ny = j_max - j_min + 1;
        if nx != ny {
            return Err(RainfarmError::geometry(format!(
                "window must be square, got {nx}x{ny}"
            )));
        }
        if nx < MIN_WINDOW_PIXELS {
            return Err(RainfarmError::geometry(format!(
                "window side {nx} is below the minimum of {MIN_WINDOW_PIXELS} cells"
            )));
        }
        let divisor = side_divisor(ratio_s);
        if nx % divisor != 0 {
            return Err(RainfarmError::geometry(format!(
                "window side {nx} is not divisible by {divisor} (spatial ratio {ratio_s}, even FFT length)"
            )));
        }
        Ok(Self {
            i_min,
            i_max,
            j_min,
            j_max,
            ratio_s,
        })
    }

    pub fn i_min(&self) -> usize {
        self.i_min
    }

    pub fn i_max(&self) -> usize {
        self.i_max
    }

    pub fn j_min(&self) -> usize {
        self.j_min
    }

    pub fn j_max(&self) -> usize {
        self.j_max
    }

    pub fn ratio_s(&self) -> usize {
        self.ratio_s
    }

    /// Window side length in native cells.
    pub fn pixels(&self) -> usize {
        self.i_max - self.i_min + 1
    }

    /// Window side length in fine cells.
    pub fn resolution(&self) -> usize {
        self.pixels() * self.ratio_s
    }
}

impl fmt::Display for GridWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}..={}] x [{}..={}]",
            self.i_min, self.i_max, self.j_min, self.j_max
        )
    }
}

/// Sides must be multiples of the spatial ratio and even.
fn side_divisor(ratio_s: usize) -> usize {
    if ratio_s % 2 == 0 {
        ratio_s
    } else {
        2 * ratio_s
    }
}

/// Everything the pipeline needs to know about the request geometry.
#[derive(Debug, Clone)]
pub struct GridMapping {
    pub window: GridWindow,
    /// Native grid restricted to the window.
    pub coarse_grid: RegularGrid,
    /// Window grid refined `ratio_s` times per axis.
    pub fine_grid: RegularGrid,
    /// Reference grid the output is placed on.
    pub reference_grid: RegularGrid,
    /// Fine-grid index nearest to each reference coordinate.
    pub nearest: NearestIndex,
}

/// Compute the window of `native` covering `reference` and the fine grid.
///
/// `buffer_km` extends the reference bounding box in every direction before
/// the search; the extended box never reaches past the native grid.
#[tracing::instrument(skip(native, reference))]
pub fn map_grids(
    native: &RegularGrid,
    reference: &RegularGrid,
    ratio_s: usize,
    buffer_km: f64,
) -> Result<GridMapping> {
    if ratio_s == 0 {
        return Err(RainfarmError::config("spatial ratio must be >= 1"));
    }
    if !buffer_km.is_finite() || buffer_km < 0.0 {
        return Err(RainfarmError::config(format!(
            "buffer must be a non-negative distance in km, got {buffer_km}"
        )));
    }

    let window = if native.approx_eq(reference) {
        debug!("reference grid identical to native grid, using the whole grid");
        let (nx, ny) = native.dim();
        GridWindow::new(0, nx - 1, 0, ny - 1, ratio_s)?
    } else {
        if !native.contains(reference) {
            return Err(RainfarmError::geometry(format!(
                "reference grid x {:?} y {:?} is not contained in native grid x {:?} y {:?}",
                reference.x.extent(),
                reference.y.extent(),
                native.x.extent(),
                native.y.extent()
            )));
        }
        search_window(native, reference, ratio_s, buffer_km)?
    };

    let coarse_grid = RegularGrid::new(
        native.x.slice(window.i_min(), window.i_max())?,
        native.y.slice(window.j_min(), window.j_max())?,
    );
    let fine_grid = RegularGrid::new(coarse_grid.x.refine(ratio_s)?, coarse_grid.y.refine(ratio_s)?);
    let nearest = NearestIndex::between(&fine_grid, reference);

    info!(
        window = %window,
        pixels = window.pixels(),
        resolution = window.resolution(),
        "grid window computed"
    );

    Ok(GridMapping {
        window,
        coarse_grid,
        fine_grid,
        reference_grid: *reference,
        nearest,
    })
}

fn search_window(
    native: &RegularGrid,
    reference: &RegularGrid,
    ratio_s: usize,
    buffer_km: f64,
) -> Result<GridWindow> {
    let (mut x_lo, mut x_hi) = reference.x.extent();
    let (mut y_lo, mut y_hi) = reference.y.extent();

    if buffer_km > 0.0 {
        let dlat = (buffer_km / EARTH_RADIUS_KM).to_degrees();
        let lat_mid = (0.5 * (y_lo + y_hi)).to_radians();
        let dlon = dlat / lat_mid.cos().abs().max(1e-6);
        let (nx_lo, nx_hi) = native.x.extent();
        let (ny_lo, ny_hi) = native.y.extent();
        x_lo = (x_lo - dlon).max(nx_lo);
        x_hi = (x_hi + dlon).min(nx_hi);
        y_lo = (y_lo - dlat).max(ny_lo);
        y_hi = (y_hi + dlat).min(ny_hi);
        debug!(dlon, dlat, "reference box extended by buffer");
    }

    let (mut i_min, mut i_max) = locate(&native.x, x_lo, x_hi);
    let (mut j_min, mut j_max) = locate(&native.y, y_lo, y_hi);
    debug!(i_min, i_max, j_min, j_max, "covering cells located");

    let (nx, ny) = native.dim();
    let divisor = side_divisor(ratio_s);

    grow(&mut i_min, &mut i_max, nx, "x", |n| n >= MIN_WINDOW_PIXELS)?;
    grow(&mut j_min, &mut j_max, ny, "y", |n| n >= MIN_WINDOW_PIXELS)?;
    grow(&mut i_min, &mut i_max, nx, "x", |n| n % divisor == 0)?;
    grow(&mut j_min, &mut j_max, ny, "y", |n| n % divisor == 0)?;

    let side = (i_max - i_min + 1).max(j_max - j_min + 1);
    grow(&mut i_min, &mut i_max, nx, "x", |n| n >= side)?;
    grow(&mut j_min, &mut j_max, ny, "y", |n| n >= side)?;

    GridWindow::new(i_min, i_max, j_min, j_max, ratio_s)
}

/// Native cells covering the coordinate interval `[lo, hi]`.
fn locate(axis: &AxisCoords, lo: f64, hi: f64) -> (usize, usize) {
    let a = axis.fractional_index(lo);
    let b = axis.fractional_index(hi);
    let (edge_lo, edge_hi) = (a.min(b), a.max(b));
    let last = (axis.len() - 1) as f64;

    let mut i_min = (edge_lo + COORD_TOLERANCE).round().clamp(0.0, last) as usize;
    let mut i_max = (edge_hi - COORD_TOLERANCE).round().clamp(0.0, last) as usize;

    if i_min as f64 - 0.5 > edge_lo + COORD_TOLERANCE && i_min > 0 {
        i_min -= 1;
    }
    if i_max as f64 + 0.5 < edge_hi - COORD_TOLERANCE && i_max + 1 < axis.len() {
        i_max += 1;
    }
    (i_min, i_max.max(i_min))
}

/// Widen `[lo, hi]` one cell at a time until `accept(size)` holds.
///
/// Alternates between the low and high bound; when one bound hits the grid
/// edge the other takes over. Fails when both are blocked.
fn grow(
    lo: &mut usize,
    hi: &mut usize,
    len: usize,
    axis: &str,
    accept: impl Fn(usize) -> bool,
) -> Result<()> {
    let mut toward_low = true;
    let mut blocked_reported = false;
    while !accept(*hi - *lo + 1) {
        let can_low = *lo > 0;
        let can_high = *hi + 1 < len;
        if !(can_low && can_high) && !blocked_reported {
            warn!(axis, lo = *lo, hi = *hi, len, "window growth blocked by the native grid edge");
            blocked_reported = true;
        }
        match (can_low, can_high) {
            (false, false) => {
                return Err(RainfarmError::geometry(format!(
                    "cannot grow {axis} window [{}..={}] further: native grid has only {len} cells",
                    *lo, *hi
                )));
            }
            (true, false) => *lo -= 1,
            (false, true) => *hi += 1,
            (true, true) => {
                if toward_low {
                    *lo -= 1;
                } else {
                    *hi += 1;
                }
                toward_low = !toward_low;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(x0: f64, dx: f64, nx: usize, y0: f64, dy: f64, ny: usize) -> RegularGrid {
        RegularGrid::new(
            AxisCoords::new(x0, dx, nx).unwrap(),
            AxisCoords::new(y0, dy, ny).unwrap(),
        )
    }

    fn assert_invariants(w: &GridWindow, nx: usize, ny: usize, ratio: usize) {
        assert!(w.i_min() <= w.i_max() && w.i_max() < nx);
        assert!(w.j_min() <= w.j_max() && w.j_max() < ny);
        assert_eq!(w.pixels() % ratio, 0);
        assert_eq!(w.j_max() - w.j_min() + 1, w.pixels());
        assert!(w.pixels() >= MIN_WINDOW_PIXELS);
    }

    // -- GridWindow invariants --

    #[test]
    fn window_rejects_small_side() {
        assert!(GridWindow::new(0, 3, 0, 3, 2).is_err());
    }

    #[test]
    fn window_rejects_non_square() {
        assert!(GridWindow::new(0, 7, 0, 9, 2).is_err());
    }

    #[test]
    fn window_rejects_odd_side_with_odd_ratio() {
        assert!(GridWindow::new(0, 8, 0, 8, 3).is_err());
        assert!(GridWindow::new(0, 11, 0, 11, 3).is_ok());
    }

    #[test]
    fn window_resolution() {
        let w = GridWindow::new(2, 9, 4, 11, 4).unwrap();
        assert_eq!(w.pixels(), 8);
        assert_eq!(w.resolution(), 32);
    }

    // -- map_grids --

    #[test]
    fn identical_grids_use_whole_grid() {
        let g = grid(0.0, 1.0, 16, 40.0, 1.0, 16);
        let m = map_grids(&g, &g, 4, 0.0).unwrap();
        assert_eq!(m.window, GridWindow::new(0, 15, 0, 15, 4).unwrap());
        assert_eq!(m.fine_grid.dim(), (64, 64));
    }

    #[test]
    fn small_reference_grows_to_minimum() {
        let native = grid(0.0, 1.0, 40, 30.0, 1.0, 40);
        let reference = grid(10.0, 0.25, 8, 45.0, 0.25, 8);
        let m = map_grids(&native, &reference, 2, 0.0).unwrap();
        assert_invariants(&m.window, 40, 40, 2);
        // window must still cover the reference box
        let (rx_lo, rx_hi) = reference.x.extent();
        let (cx_lo, cx_hi) = m.coarse_grid.x.extent();
        assert!(cx_lo <= rx_lo && cx_hi >= rx_hi);
    }

    #[test]
    fn growth_near_edge_uses_other_side() {
        let native = grid(0.0, 1.0, 20, 0.0, 1.0, 20);
        let reference = grid(0.0, 0.5, 4, 0.0, 0.5, 4);
        let m = map_grids(&native, &reference, 4, 0.0).unwrap();
        assert_eq!(m.window.i_min(), 0);
        assert_eq!(m.window.j_min(), 0);
        assert_invariants(&m.window, 20, 20, 4);
    }

    #[test]
    fn odd_ratio_window_is_even_and_divisible() {
        let native = grid(0.0, 1.0, 50, 0.0, 1.0, 50);
        let reference = grid(20.0, 0.5, 10, 20.0, 0.5, 14);
        let m = map_grids(&native, &reference, 3, 0.0).unwrap();
        assert_invariants(&m.window, 50, 50, 3);
        assert_eq!(m.window.pixels() % 2, 0);
    }

    #[test]
    fn buffer_enlarges_window() {
        let native = grid(0.0, 0.1, 200, 40.0, 0.1, 200);
        let reference = grid(8.0, 0.05, 40, 48.0, 0.05, 40);
        let plain = map_grids(&native, &reference, 2, 0.0).unwrap();
        let buffered = map_grids(&native, &reference, 2, 100.0).unwrap();
        assert!(buffered.window.pixels() > plain.window.pixels());
        assert_invariants(&buffered.window, 200, 200, 2);
    }

    #[test]
    fn descending_latitudes_are_supported() {
        let native = grid(0.0, 1.0, 30, 60.0, -1.0, 30);
        let reference = grid(10.0, 0.5, 6, 50.0, -0.5, 6);
        let m = map_grids(&native, &reference, 2, 0.0).unwrap();
        assert_invariants(&m.window, 30, 30, 2);
        let (ry_lo, ry_hi) = reference.y.extent();
        let (cy_lo, cy_hi) = m.coarse_grid.y.extent();
        assert!(cy_lo <= ry_lo && cy_hi >= ry_hi);
    }

    #[test]
    fn reference_outside_native_is_rejected() {
        let native = grid(0.0, 1.0, 20, 0.0, 1.0, 20);
        let reference = grid(18.0, 1.0, 6, 0.0, 1.0, 6);
        let err = map_grids(&native, &reference, 2, 0.0).unwrap_err();
        assert!(matches!(err, RainfarmError::GridGeometry { .. }));
    }

    #[test]
    fn blocked_divisibility_is_an_error() {
        // a 7-cell y axis can never reach the minimum side
        let native = grid(0.0, 1.0, 10, 0.0, 1.0, 7);
        let reference = grid(2.0, 1.0, 4, 2.0, 1.0, 4);
        let err = map_grids(&native, &reference, 4, 0.0).unwrap_err();
        assert!(matches!(err, RainfarmError::GridGeometry { .. }));
    }

    #[test]
    fn negative_buffer_is_rejected() {
        let g = grid(0.0, 1.0, 16, 0.0, 1.0, 16);
        assert!(matches!(
            map_grids(&g, &g, 2, -1.0),
            Err(RainfarmError::InvalidConfig { .. })
        ));
    }

    // -- locate / grow --

    #[test]
    fn locate_aligned_edges_takes_exact_cells() {
        let axis = AxisCoords::new(0.0, 1.0, 20).unwrap();
        assert_eq!(locate(&axis, 2.5, 6.5), (3, 6));
    }

    #[test]
    fn locate_unaligned_edges_covers_box() {
        let axis = AxisCoords::new(0.0, 1.0, 20).unwrap();
        let (lo, hi) = locate(&axis, 2.2, 6.7);
        assert_eq!((lo, hi), (2, 7));
    }

    #[test]
    fn grow_alternates_sides() {
        let (mut lo, mut hi) = (10, 10);
        grow(&mut lo, &mut hi, 40, "x", |n| n >= 5).unwrap();
        assert_eq!((lo, hi), (8, 12));
    }

    #[test]
    fn grow_fails_when_blocked_both_sides() {
        let (mut lo, mut hi) = (0, 3);
        assert!(grow(&mut lo, &mut hi, 4, "x", |n| n >= 8).is_err());
    }
}
