/// Uniformly spaced coordinate axes and the rectilinear grids built from them.
///
/// Cell `i` of an axis is centred on `start + i * step` and spans half a step
/// on either side. Steps may be negative (e.g. latitudes stored north to south).
use serde::{Deserialize, Serialize};

use crate::constants::COORD_TOLERANCE;
use crate::error::{RainfarmError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisCoords {
    start: f64,
    step: f64,
    len: usize,
}

impl AxisCoords {
    /// Create an axis, returning an error for a zero/non-finite step or empty axis.
    pub fn new(start: f64, step: f64, len: usize) -> Result<Self> {
        if !start.is_finite() {
            return Err(RainfarmError::geometry(format!(
                "axis start must be finite, got {start}"
            )));
        }
        if !step.is_finite() || step == 0.0 {
            return Err(RainfarmError::geometry(format!(
                "axis step must be finite and non-zero, got {step}"
            )));
        }
        if len == 0 {
            return Err(RainfarmError::geometry("axis has no cells"));
        }
        Ok(Self { start, step, len })
    }

    /// Build an axis from explicit coordinates, which must be uniformly spaced.
    pub fn from_values(values: &[f64]) -> Result<Self> {
        if values.len() < 2 {
            return Err(RainfarmError::geometry(format!(
                "at least 2 coordinates are needed to infer a step, got {}",
                values.len()
            )));
        }
        let step = (values[values.len() - 1] - values[0]) / (values.len() - 1) as f64;
        let axis = Self::new(values[0], step, values.len())?;
        for (i, &v) in values.iter().enumerate() {
            if (v - axis.coord(i)).abs() > 1e-6 * step.abs() {
                return Err(RainfarmError::geometry(format!(
                    "coordinates are not uniformly spaced at index {i}: {v} vs {}",
                    axis.coord(i)
                )));
            }
        }
        Ok(axis)
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Centre coordinate of cell `i`.
    #[inline]
    pub fn coord(&self, i: usize) -> f64 {
        self.start + i as f64 * self.step
    }

    pub fn values(&self) -> Vec<f64> {
        (0..self.len).map(|i| self.coord(i)).collect()
    }

    /// Position of `v` in index units (cell centres are integers).
    #[inline]
    pub fn fractional_index(&self, v: f64) -> f64 {
        (v - self.start) / self.step
    }

    /// Index of the cell centre closest to `v`, clamped to the axis.
    pub fn nearest_index(&self, v: f64) -> usize {
        let f = self.fractional_index(v).round();
        f.clamp(0.0, (self.len - 1) as f64) as usize
    }

    /// (low, high) coordinate edges of cell `i`.
    #[inline]
    pub fn cell_bounds(&self, i: usize) -> (f64, f64) {
        let a = self.coord(i) - 0.5 * self.step;
        let b = self.coord(i) + 0.5 * self.step;
        (a.min(b), a.max(b))
    }

    /// (low, high) coordinate edges of the whole axis.
    pub fn extent(&self) -> (f64, f64) {
        let (a0, b0) = self.cell_bounds(0);
        let (a1, b1) = self.cell_bounds(self.len - 1);
        (a0.min(a1), b0.max(b1))
    }

    /// Sub-axis covering cells `lo..=hi`.
    pub fn slice(&self, lo: usize, hi: usize) -> Result<Self> {
        if lo > hi || hi >= self.len {
            return Err(RainfarmError::geometry(format!(
                "slice {lo}..={hi} is outside an axis of {} cells",
                self.len
            )));
        }
        Self::new(self.coord(lo), self.step, hi - lo + 1)
    }

    /// Split every cell into `ratio` equal sub-cells.
    pub fn refine(&self, ratio: usize) -> Result<Self> {
        if ratio == 0 {
            return Err(RainfarmError::config("refinement ratio must be >= 1"));
        }
        let fine_step = self.step / ratio as f64;
        let fine_start = self.start - 0.5 * self.step + 0.5 * fine_step;
        Self::new(fine_start, fine_step, self.len * ratio)
    }

    /// Coordinate-for-coordinate equality within a fraction of the step.
    pub fn approx_eq(&self, other: &Self) -> bool {
        let tol = COORD_TOLERANCE * self.step.abs().max(other.step.abs());
        self.len == other.len
            && (self.start - other.start).abs() <= tol
            && (self.step - other.step).abs() <= tol
    }
}

/// Rectilinear grid: axis 0 is x (longitude), axis 1 is y (latitude).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegularGrid {
    pub x: AxisCoords,
    pub y: AxisCoords,
}

impl RegularGrid {
    pub fn new(x: AxisCoords, y: AxisCoords) -> Self {
        Self { x, y }
    }

    /// (nx, ny).
    pub fn dim(&self) -> (usize, usize) {
        (self.x.len(), self.y.len())
    }

    /// Planar area of one cell in squared coordinate units.
    pub fn cell_area(&self) -> f64 {
        (self.x.step() * self.y.step()).abs()
    }

    pub fn approx_eq(&self, other: &Self) -> bool {
        self.x.approx_eq(&other.x) && self.y.approx_eq(&other.y)
    }

    /// `true` when `other`'s outer cell edges lie inside this grid's edges.
    pub fn contains(&self, other: &Self) -> bool {
        let inside = |outer: &AxisCoords, inner: &AxisCoords| {
            let (lo, hi) = outer.extent();
            let (ilo, ihi) = inner.extent();
            let tol = COORD_TOLERANCE * outer.step().abs();
            ilo >= lo - tol && ihi <= hi + tol
        };
        inside(&self.x, &other.x) && inside(&self.y, &other.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    // -- Construction --

    #[test]
    fn rejects_zero_step() {
        assert!(AxisCoords::new(0.0, 0.0, 4).is_err());
    }

    #[test]
    fn rejects_empty_axis() {
        assert!(AxisCoords::new(0.0, 1.0, 0).is_err());
    }

    #[test]
    fn from_values_infers_step() {
        let a = AxisCoords::from_values(&[10.0, 10.5, 11.0, 11.5]).unwrap();
        assert_relative_eq!(a.step(), 0.5);
        assert_eq!(a.len(), 4);
    }

    #[test]
    fn from_values_rejects_irregular_spacing() {
        assert!(AxisCoords::from_values(&[0.0, 1.0, 3.0]).is_err());
    }

    // -- Geometry --

    #[test]
    fn descending_axis_extent_is_ordered() {
        let a = AxisCoords::new(50.0, -1.0, 5).unwrap();
        let (lo, hi) = a.extent();
        assert_relative_eq!(lo, 45.5);
        assert_relative_eq!(hi, 50.5);
    }

    #[test]
    fn nearest_index_clamps() {
        let a = AxisCoords::new(0.0, 1.0, 5).unwrap();
        assert_eq!(a.nearest_index(-3.0), 0);
        assert_eq!(a.nearest_index(2.4), 2);
        assert_eq!(a.nearest_index(99.0), 4);
    }

    #[test]
    fn refine_keeps_extent() {
        let a = AxisCoords::new(0.0, 1.0, 4).unwrap();
        let f = a.refine(4).unwrap();
        assert_eq!(f.len(), 16);
        let (lo, hi) = a.extent();
        let (flo, fhi) = f.extent();
        assert_relative_eq!(lo, flo, epsilon = 1e-12);
        assert_relative_eq!(hi, fhi, epsilon = 1e-12);
        assert_relative_eq!(f.coord(0), -0.375, epsilon = 1e-12);
    }

    #[test]
    fn grid_contains_inner_grid() {
        let outer = RegularGrid::new(
            AxisCoords::new(0.0, 1.0, 10).unwrap(),
            AxisCoords::new(0.0, 1.0, 10).unwrap(),
        );
        let inner = RegularGrid::new(
            AxisCoords::new(2.0, 0.5, 6).unwrap(),
            AxisCoords::new(3.0, 0.5, 6).unwrap(),
        );
        let outside = RegularGrid::new(
            AxisCoords::new(8.0, 1.0, 4).unwrap(),
            AxisCoords::new(0.0, 1.0, 4).unwrap(),
        );
        assert!(outer.contains(&inner));
        assert!(!outer.contains(&outside));
    }
}
