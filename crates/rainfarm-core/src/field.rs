/// Validated coarse precipitation field.
///
/// A dense (x, y, t) array of accumulated depth per native time step.
/// Non-finite and negative values are rejected, as are empty axes.
use ndarray::{s, Array3, ArrayView3};

use crate::error::{RainfarmError, Result};
use crate::grid::GridWindow;

#[derive(Debug, Clone)]
pub struct SourceField {
    data: Array3<f64>,
}

impl SourceField {
    /// Create a new SourceField with validation.
    ///
    /// Validates:
    /// - no axis has zero length
    /// - no NaN or infinite values
    /// - no negative values
    pub fn new(data: Array3<f64>) -> Result<Self> {
        if data.shape().iter().any(|&n| n == 0) {
            return Err(RainfarmError::InvalidField {
                reason: format!("field has an empty axis: shape {:?}", data.shape()),
            });
        }
        if let Some(v) = data.iter().find(|v| !v.is_finite()) {
            return Err(RainfarmError::InvalidField {
                reason: format!("field contains non-finite values ({v})"),
            });
        }
        if let Some(v) = data.iter().find(|v| **v < 0.0) {
            return Err(RainfarmError::InvalidField {
                reason: format!("field contains negative precipitation ({v})"),
            });
        }
        Ok(Self { data })
    }

    pub fn view(&self) -> ArrayView3<'_, f64> {
        self.data.view()
    }

    pub fn into_inner(self) -> Array3<f64> {
        self.data
    }

    /// (nx, ny, nt).
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// `true` when every cell is exactly zero.
    pub fn is_all_zero(&self) -> bool {
        self.data.iter().all(|&v| v == 0.0)
    }

    /// Copy of the cells inside `window`, all time steps.
    pub fn crop(&self, window: &GridWindow) -> Result<Self> {
        let (nx, ny, _) = self.dim();
        if window.i_max() >= nx || window.j_max() >= ny {
            return Err(RainfarmError::geometry(format!(
                "window {window} exceeds field of {nx}x{ny} cells"
            )));
        }
        let cropped = self
            .data
            .slice(s![
                window.i_min()..=window.i_max(),
                window.j_min()..=window.j_max(),
                ..
            ])
            .to_owned();
        Ok(Self { data: cropped })
    }
}
