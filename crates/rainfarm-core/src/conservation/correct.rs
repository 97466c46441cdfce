//! Volume-conserving correction of a stochastic fine field.
//!
//! The fine field is aggregated to the coarse shape, the ratio between the
//! target coarse field and that aggregate is expanded back to full
//! resolution, and the product is returned. Aggregating the result with the
//! same block mapping reproduces the coarse field.

use std::path::Path;

use ndarray::{Array3, ArrayView3};
use serde::{Deserialize, Serialize};

use super::aggregate::{aggregate, block_of};
use crate::error::{RainfarmError, Result};
use crate::store::{self, FileKind};

/// Flat coarse index of every fine cell (row-major), built once per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatherIndex {
    fine_shape: (usize, usize, usize),
    coarse_shape: (usize, usize, usize),
    index: Vec<usize>,
}

#[derive(Serialize, Deserialize)]
struct GatherHeader {
    fine_shape: [usize; 3],
    coarse_shape: [usize; 3],
}

impl GatherIndex {
    pub fn new(fine_shape: (usize, usize, usize), coarse_shape: (usize, usize, usize)) -> Result<Self> {
        let (fx, fy, ft) = fine_shape;
        let (cx, cy, ct) = coarse_shape;
        if cx == 0 || cy == 0 || ct == 0 || cx > fx || cy > fy || ct > ft {
            return Err(RainfarmError::shape("gather index coarse shape", &[fx, fy, ft], &[cx, cy, ct]));
        }
        let mut index = Vec::with_capacity(fx * fy * ft);
        for i in 0..fx {
            let bi = block_of(i, fx, cx);
            for j in 0..fy {
                let bj = block_of(j, fy, cy);
                for t in 0..ft {
                    let bt = block_of(t, ft, ct);
                    index.push((bi * cy + bj) * ct + bt);
                }
            }
        }
        Ok(Self {
            fine_shape,
            coarse_shape,
            index,
        })
    }

    pub fn fine_shape(&self) -> (usize, usize, usize) {
        self.fine_shape
    }

    pub fn coarse_shape(&self) -> (usize, usize, usize) {
        self.coarse_shape
    }

    /// Expand `coarse` to the fine shape in a single gather.
    pub fn apply(&self, coarse: ArrayView3<'_, f64>) -> Result<Array3<f64>> {
        if coarse.dim() != self.coarse_shape {
            let (a, b, c) = self.coarse_shape;
            return Err(RainfarmError::shape("coarse field for gather", &[a, b, c], coarse.shape()));
        }
        let flat: Vec<f64> = coarse.iter().copied().collect();
        let values: Vec<f64> = self.index.iter().map(|&k| flat[k]).collect();
        let (a, b, c) = self.fine_shape;
        Array3::from_shape_vec(self.fine_shape, values)
            .map_err(|_| RainfarmError::shape("gathered field", &[a, b, c], &[self.index.len()]))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let (fx, fy, ft) = self.fine_shape;
        let (cx, cy, ct) = self.coarse_shape;
        let header = GatherHeader {
            fine_shape: [fx, fy, ft],
            coarse_shape: [cx, cy, ct],
        };
        store::write_file(path, FileKind::Gather, &header, |w| {
            store::write_u64s(w, self.index.iter().map(|&k| k as u64))
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let (header, (raw, coarse_cells)) =
            store::read_file(path, FileKind::Gather, |h: &GatherHeader, r| {
                let coarse_cells = store::element_count(&h.coarse_shape)?;
                Ok((store::read_u64s(r, store::element_count(&h.fine_shape)?)?, coarse_cells))
            })?;
        let [fx, fy, ft] = header.fine_shape;
        let [cx, cy, ct] = header.coarse_shape;
        let limit = coarse_cells as u64;
        if let Some(bad) = raw.iter().find(|&&k| k >= limit) {
            return Err(RainfarmError::CorruptFile {
                path: path.to_path_buf(),
                reason: format!("gather entry {bad} exceeds {limit} coarse cells"),
            });
        }
        Ok(Self {
            fine_shape: (fx, fy, ft),
            coarse_shape: (cx, cy, ct),
            index: raw.into_iter().map(|k| k as usize).collect(),
        })
    }
}

/// Replicate each coarse value over the fine cells of its block.
pub fn expand(coarse: ArrayView3<'_, f64>, fine_shape: (usize, usize, usize)) -> Result<Array3<f64>> {
    let (fx, fy, ft) = fine_shape;
    let (cx, cy, ct) = coarse.dim();
    if cx == 0 || cy == 0 || ct == 0 || cx > fx || cy > fy || ct > ft {
        return Err(RainfarmError::shape("expansion target", &[cx, cy, ct], &[fx, fy, ft]));
    }
    Ok(Array3::from_shape_fn(fine_shape, |(i, j, t)| {
        coarse[[block_of(i, fx, cx), block_of(j, fy, cy), block_of(t, ft, ct)]]
    }))
}

/// Scale `fine` so that its block means reproduce `coarse`.
///
/// An all-zero `coarse` short-circuits to zeros. With `gather` the ratio is
/// expanded through the cached index, otherwise by block replication.
pub fn conserve(
    mut fine: Array3<f64>,
    coarse: ArrayView3<'_, f64>,
    gather: Option<&GatherIndex>,
) -> Result<Array3<f64>> {
    if coarse.iter().all(|&v| v == 0.0) {
        return Ok(Array3::zeros(fine.dim()));
    }
    let aggregated = aggregate(fine.view(), coarse.dim())?;
    let mut ratio = coarse.to_owned();
    ratio.zip_mut_with(&aggregated, |c, &g| {
        *c = if g != 0.0 { *c / g } else { 0.0 };
    });
    let expanded = match gather {
        Some(index) => {
            if index.fine_shape() != fine.dim() {
                let (a, b, c) = index.fine_shape();
                return Err(RainfarmError::shape("gather index fine shape", &[a, b, c], fine.shape()));
            }
            index.apply(ratio.view())?
        }
        None => expand(ratio.view(), fine.dim())?,
    };
    fine *= &expanded;
    Ok(fine)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn bumpy(shape: (usize, usize, usize)) -> Array3<f64> {
        Array3::from_shape_fn(shape, |(i, j, t)| 1.0 + ((i * 13 + j * 7 + t * 3) % 5) as f64)
    }

    // -- Expansion --

    #[test]
    fn expand_replicates_blocks() {
        let coarse = Array3::from_shape_fn((2, 2, 1), |(i, j, _)| (i * 2 + j) as f64);
        let fine = expand(coarse.view(), (4, 4, 2)).unwrap();
        assert_eq!(fine[[1, 1, 1]], 0.0);
        assert_eq!(fine[[2, 1, 0]], 2.0);
        assert_eq!(fine[[3, 3, 1]], 3.0);
    }

    #[test]
    fn gather_matches_replication() {
        let coarse = bumpy((3, 2, 2));
        let index = GatherIndex::new((7, 4, 5), (3, 2, 2)).unwrap();
        let a = index.apply(coarse.view()).unwrap();
        let b = expand(coarse.view(), (7, 4, 5)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn gather_rejects_wrong_coarse_shape() {
        let index = GatherIndex::new((4, 4, 2), (2, 2, 1)).unwrap();
        assert!(index.apply(Array3::zeros((2, 2, 2)).view()).is_err());
    }

    // -- Conservation --

    #[test]
    fn corrected_field_reproduces_coarse_means() {
        let coarse = bumpy((4, 4, 2));
        let fine = bumpy((16, 16, 8)).mapv(|v| v * 0.37);
        let x = conserve(fine, coarse.view(), None).unwrap();
        let back = aggregate(x.view(), (4, 4, 2)).unwrap();
        for (a, b) in back.iter().zip(coarse.iter()) {
            assert_relative_eq!(*a, *b, max_relative = 1e-10);
        }
        assert_relative_eq!(x.sum(), coarse.sum() * 4.0 * 4.0 * 4.0, max_relative = 1e-10);
    }

    #[test]
    fn conservation_holds_for_uneven_blocks() {
        let coarse = bumpy((3, 3, 2));
        let fine = bumpy((8, 8, 5));
        let x = conserve(fine, coarse.view(), None).unwrap();
        let back = aggregate(x.view(), (3, 3, 2)).unwrap();
        for (a, b) in back.iter().zip(coarse.iter()) {
            assert_relative_eq!(*a, *b, max_relative = 1e-10);
        }
    }

    #[test]
    fn gather_and_replication_agree() {
        let coarse = bumpy((4, 4, 2));
        let fine = bumpy((8, 8, 4));
        let index = GatherIndex::new((8, 8, 4), (4, 4, 2)).unwrap();
        let a = conserve(fine.clone(), coarse.view(), Some(&index)).unwrap();
        let b = conserve(fine, coarse.view(), None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn mismatched_gather_is_rejected() {
        let coarse = bumpy((4, 4, 2));
        let index = GatherIndex::new((16, 16, 4), (4, 4, 2)).unwrap();
        let err = conserve(bumpy((8, 8, 4)), coarse.view(), Some(&index)).unwrap_err();
        assert!(matches!(err, RainfarmError::ShapeMismatch { .. }));
    }

    #[test]
    fn zero_coarse_gives_zero_field() {
        let x = conserve(bumpy((16, 16, 8)), Array3::zeros((8, 8, 4)).view(), None).unwrap();
        assert_eq!(x.dim(), (16, 16, 8));
        assert!(x.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn zero_blocks_stay_zero() {
        let mut coarse = bumpy((2, 2, 1));
        coarse[[0, 1, 0]] = 0.0;
        let x = conserve(bumpy((4, 4, 2)), coarse.view(), None).unwrap();
        assert_eq!(x[[0, 2, 0]], 0.0);
        assert_eq!(x[[1, 3, 1]], 0.0);
    }

    // -- Cache --

    #[test]
    fn gather_cache_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gather.rfm");
        let index = GatherIndex::new((8, 8, 4), (4, 4, 2)).unwrap();
        index.save(&path).unwrap();
        assert_eq!(GatherIndex::load(&path).unwrap(), index);
    }

    #[test]
    fn overflowing_gather_shapes_are_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gather.rfm");
        let forged = [
            ([1 << 32, 1 << 32, 1 << 32], [2, 2, 2]),
            ([2, 2, 2], [usize::MAX, 2, 2]),
        ];
        for (fine_shape, coarse_shape) in forged {
            let header = GatherHeader {
                fine_shape,
                coarse_shape,
            };
            store::write_file(&path, FileKind::Gather, &header, |w| {
                store::write_u64s(w, [0u64; 8])
            })
            .unwrap();
            assert!(matches!(
                GatherIndex::load(&path),
                Err(RainfarmError::CorruptFile { .. })
            ));
        }
    }
}
