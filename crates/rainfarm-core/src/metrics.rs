//! Volume diagnostics for downscaled fields.
//!
//! Advisory only: the ensemble logs them after correction, tests assert on
//! them.

use ndarray::ArrayView3;

use crate::conservation::aggregate;
use crate::error::Result;

/// Sum of every cell.
pub fn total_volume(field: ArrayView3<'_, f64>) -> f64 {
    field.sum()
}

/// Relative difference between the mean of `fine` and the mean of `coarse`.
///
/// Zero when both are zero, infinite when only `coarse` is.
pub fn relative_volume_error(fine: ArrayView3<'_, f64>, coarse: ArrayView3<'_, f64>) -> f64 {
    let mean_fine = fine.mean().unwrap_or(0.0);
    let mean_coarse = coarse.mean().unwrap_or(0.0);
    if mean_coarse == 0.0 {
        return if mean_fine == 0.0 { 0.0 } else { f64::INFINITY };
    }
    (mean_fine - mean_coarse) / mean_coarse
}

/// Largest relative deviation between the block means of `fine` and `coarse`.
///
/// Blocks whose coarse value is zero contribute their absolute deviation.
pub fn max_block_deviation(fine: ArrayView3<'_, f64>, coarse: ArrayView3<'_, f64>) -> Result<f64> {
    let aggregated = aggregate(fine, coarse.dim())?;
    Ok(aggregated
        .iter()
        .zip(coarse.iter())
        .map(|(a, c)| {
            let diff = (a - c).abs();
            if *c == 0.0 {
                diff
            } else {
                diff / c.abs()
            }
        })
        .fold(0.0, f64::max))
}
