//! Nearest-neighbour placement of fine-grid values onto a reference grid.

use ndarray::{Array3, ArrayView3};

use super::axis::RegularGrid;
use crate::error::{RainfarmError, Result};

/// For each reference coordinate, the index of the closest fine-grid cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NearestIndex {
    pub x: Vec<usize>,
    pub y: Vec<usize>,
}

impl NearestIndex {
    pub fn between(fine: &RegularGrid, reference: &RegularGrid) -> Self {
        let x = reference
            .x
            .values()
            .into_iter()
            .map(|v| fine.x.nearest_index(v))
            .collect();
        let y = reference
            .y
            .values()
            .into_iter()
            .map(|v| fine.y.nearest_index(v))
            .collect();
        Self { x, y }
    }

    /// (nx, ny) of the reference grid.
    pub fn dim(&self) -> (usize, usize) {
        (self.x.len(), self.y.len())
    }

    /// Pick fine cells at the reference locations, keeping every time step.
    pub fn apply(&self, fine: ArrayView3<'_, f64>) -> Result<Array3<f64>> {
        let (fx, fy, nt) = fine.dim();
        let max_x = self.x.iter().copied().max().unwrap_or(0);
        let max_y = self.y.iter().copied().max().unwrap_or(0);
        if max_x >= fx || max_y >= fy {
            return Err(RainfarmError::shape(
                "fine field for nearest-neighbour placement",
                &[max_x + 1, max_y + 1, nt],
                &[fx, fy, nt],
            ));
        }
        Ok(Array3::from_shape_fn(
            (self.x.len(), self.y.len(), nt),
            |(i, j, t)| fine[[self.x[i], self.y[j], t]],
        ))
    }
}
