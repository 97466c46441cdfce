/// Block aggregation of fine fields onto coarser grids.
///
/// When every axis divides evenly the block mean is taken over exact chunks.
/// Otherwise fine cell `i` belongs to coarse block `floor(i * n_coarse / n_fine)`
/// and each block is averaged over whatever cells it received.
use ndarray::{Array3, ArrayView3};

use crate::error::{RainfarmError, Result};

/// Coarse block of fine index `i`.
#[inline]
pub fn block_of(i: usize, n_fine: usize, n_coarse: usize) -> usize {
    i * n_coarse / n_fine
}

/// Average `fine` down to `coarse_shape`.
pub fn aggregate(
    fine: ArrayView3<'_, f64>,
    coarse_shape: (usize, usize, usize),
) -> Result<Array3<f64>> {
    let (fx, fy, ft) = fine.dim();
    let (cx, cy, ct) = coarse_shape;
    if cx == 0 || cy == 0 || ct == 0 || cx > fx || cy > fy || ct > ft {
        return Err(RainfarmError::shape(
            "aggregation target (must be non-empty and no larger than the field)",
            &[fx, fy, ft],
            &[cx, cy, ct],
        ));
    }
    if fx % cx == 0 && fy % cy == 0 && ft % ct == 0 {
        block_mean(fine, (fx / cx, fy / cy, ft / ct))
    } else {
        Ok(mapped_mean(fine, coarse_shape))
    }
}

/// Mean over non-overlapping blocks of `factors` cells. Every axis must divide.
pub fn block_average(fine: ArrayView3<'_, f64>, factors: (usize, usize, usize)) -> Result<Array3<f64>> {
    let (fx, fy, ft) = fine.dim();
    let (bx, by, bt) = factors;
    if bx == 0 || by == 0 || bt == 0 || fx % bx != 0 || fy % by != 0 || ft % bt != 0 {
        return Err(RainfarmError::config(format!(
            "field of shape {:?} cannot be split into blocks of {factors:?}",
            fine.dim()
        )));
    }
    block_mean(fine, factors)
}

fn block_mean(fine: ArrayView3<'_, f64>, block: (usize, usize, usize)) -> Result<Array3<f64>> {
    let (fx, fy, ft) = fine.dim();
    let shape = (fx / block.0, fy / block.1, ft / block.2);
    let values: Vec<f64> = fine
        .exact_chunks(block)
        .into_iter()
        .map(|chunk| chunk.mean().unwrap_or(0.0))
        .collect();
    let len = values.len();
    Array3::from_shape_vec(shape, values)
        .map_err(|_| RainfarmError::shape("block means", &[shape.0, shape.1, shape.2], &[len]))
}

fn mapped_mean(fine: ArrayView3<'_, f64>, coarse_shape: (usize, usize, usize)) -> Array3<f64> {
    let (fx, fy, ft) = fine.dim();
    let (cx, cy, ct) = coarse_shape;
    let mut sum = Array3::<f64>::zeros(coarse_shape);
    let mut count = Array3::<f64>::zeros(coarse_shape);
    for ((i, j, t), &v) in fine.indexed_iter() {
        let b = [block_of(i, fx, cx), block_of(j, fy, cy), block_of(t, ft, ct)];
        sum[b] += v;
        count[b] += 1.0;
    }
    sum.zip_mut_with(&count, |s, &c| {
        if c > 0.0 {
            *s /= c;
        }
    });
    sum
}
