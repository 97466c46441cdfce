//! Area-weighted, volume-preserving regridding between rectilinear grids.
//!
//! Weights are the planar overlap of each destination cell with the source
//! cells under it, normalised to sum to one per destination cell. A mapping is
//! computed once per grid pair and applied to every time slice.

use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use ndarray::{Array2, Array3, ArrayView2, ArrayView3, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{RainfarmError, Result};
use crate::grid::{AxisCoords, RegularGrid};
use crate::store::{self, FileKind};

/// Sparse weights: entries of destination cell `c` (row-major over
/// (x, y)) live in `offsets[c]..offsets[c + 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct RegridMapping {
    source_dim: (usize, usize),
    dest_dim: (usize, usize),
    offsets: Vec<usize>,
    weights: Vec<f64>,
    source_i: Vec<usize>,
    source_j: Vec<usize>,
}

#[derive(Serialize, Deserialize)]
struct RegridHeader {
    source_dim: [usize; 2],
    dest_dim: [usize; 2],
    entries: usize,
}

type CellWeights = Vec<(f64, usize, usize)>;

impl RegridMapping {
    /// Compute overlap weights from `source` to `dest`.
    #[tracing::instrument(skip(source, dest), fields(source_dim = ?source.dim(), dest_dim = ?dest.dim()))]
    pub fn build(source: &RegularGrid, dest: &RegularGrid) -> Result<Self> {
        let (dnx, dny) = dest.dim();
        let rows: Vec<Vec<CellWeights>> = (0..dnx)
            .into_par_iter()
            .map(|di| {
                let x_bounds = dest.x.cell_bounds(di);
                let x_overlaps = overlaps(&source.x, x_bounds);
                (0..dny)
                    .map(|dj| {
                        let y_overlaps = overlaps(&source.y, dest.y.cell_bounds(dj));
                        cell_weights(&x_overlaps, &y_overlaps)
                    })
                    .collect()
            })
            .collect();

        let mut offsets = Vec::with_capacity(dnx * dny + 1);
        let mut weights = Vec::new();
        let mut source_i = Vec::new();
        let mut source_j = Vec::new();
        offsets.push(0);
        for cell in rows.into_iter().flatten() {
            for (w, i, j) in cell {
                weights.push(w);
                source_i.push(i);
                source_j.push(j);
            }
            offsets.push(weights.len());
        }

        let mapping = Self {
            source_dim: source.dim(),
            dest_dim: dest.dim(),
            offsets,
            weights,
            source_i,
            source_j,
        };
        let uncovered = mapping.uncovered_cells().len();
        if uncovered > 0 {
            warn!(uncovered, "destination cells outside the source grid will be NaN");
        }
        info!(entries = mapping.weights.len(), uncovered, "regrid mapping built");
        Ok(mapping)
    }

    pub fn source_dim(&self) -> (usize, usize) {
        self.source_dim
    }

    pub fn dest_dim(&self) -> (usize, usize) {
        self.dest_dim
    }

    /// Destination cells (x, y) that overlap no source cell.
    pub fn uncovered_cells(&self) -> Vec<(usize, usize)> {
        let ny = self.dest_dim.1;
        self.offsets
            .windows(2)
            .enumerate()
            .filter(|(_, w)| w[0] == w[1])
            .map(|(c, _)| (c / ny, c % ny))
            .collect()
    }

    /// Weighted gather-sum of one 2-D slice.
    pub fn apply(&self, source: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        if source.dim() != self.source_dim {
            let (a, b) = self.source_dim;
            return Err(RainfarmError::shape("regrid source", &[a, b], source.shape()));
        }
        let ny = self.dest_dim.1;
        Ok(Array2::from_shape_fn(self.dest_dim, |(di, dj)| {
            let c = di * ny + dj;
            let range = self.offsets[c]..self.offsets[c + 1];
            if range.is_empty() {
                return f64::NAN;
            }
            range
                .map(|e| self.weights[e] * source[[self.source_i[e], self.source_j[e]]])
                .sum()
        }))
    }

    /// Apply to every time slice of an (x, y, t) field.
    pub fn apply3(&self, source: ArrayView3<'_, f64>) -> Result<Array3<f64>> {
        let (sx, sy, nt) = source.dim();
        if (sx, sy) != self.source_dim {
            let (a, b) = self.source_dim;
            return Err(RainfarmError::shape("regrid source", &[a, b, nt], &[sx, sy, nt]));
        }
        let (dx, dy) = self.dest_dim;
        let mut out = Array3::<f64>::zeros((dx, dy, nt));
        for (t, slice) in source.axis_iter(Axis(2)).enumerate() {
            let regridded = self.apply(slice)?;
            out.index_axis_mut(Axis(2), t).assign(&regridded);
        }
        Ok(out)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let header = RegridHeader {
            source_dim: [self.source_dim.0, self.source_dim.1],
            dest_dim: [self.dest_dim.0, self.dest_dim.1],
            entries: self.weights.len(),
        };
        store::write_file(path, FileKind::Regrid, &header, |w| {
            store::write_u64s(w, self.offsets.iter().map(|&v| v as u64))?;
            store::write_f64s(w, self.weights.iter().copied())?;
            store::write_u64s(w, self.source_i.iter().map(|&v| v as u64))?;
            store::write_u64s(w, self.source_j.iter().map(|&v| v as u64))
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let (header, (offsets, weights, source_i, source_j)) =
            store::read_file(path, FileKind::Regrid, |h: &RegridHeader, r| {
                let cells = store::element_count(&h.dest_dim)?;
                let entries = store::element_count(&[h.entries])?;
                let offsets = to_usize(store::read_u64s(r, cells + 1)?);
                if offsets.last() != Some(&entries) {
                    return Err(io::Error::new(
                        ErrorKind::InvalidData,
                        format!(
                            "offsets end at {:?}, header announces {entries} entries",
                            offsets.last()
                        ),
                    )
                    .into());
                }
                let weights = store::read_f64s(r, h.entries)?;
                let source_i = to_usize(store::read_u64s(r, h.entries)?);
                let source_j = to_usize(store::read_u64s(r, h.entries)?);
                Ok((offsets, weights, source_i, source_j))
            })?;
        let mapping = Self {
            source_dim: (header.source_dim[0], header.source_dim[1]),
            dest_dim: (header.dest_dim[0], header.dest_dim[1]),
            offsets,
            weights,
            source_i,
            source_j,
        };
        mapping.check(path)?;
        Ok(mapping)
    }

    fn check(&self, path: &Path) -> Result<()> {
        let corrupt = |reason: &str| RainfarmError::CorruptFile {
            path: PathBuf::from(path),
            reason: reason.to_string(),
        };
        if self.offsets.first() != Some(&0)
            || self.offsets.last() != Some(&self.weights.len())
            || self.offsets.windows(2).any(|w| w[0] > w[1])
        {
            return Err(corrupt("offsets are not a valid partition of the entries"));
        }
        let (sx, sy) = self.source_dim;
        if self.source_i.iter().any(|&i| i >= sx) || self.source_j.iter().any(|&j| j >= sy) {
            return Err(corrupt("source index out of range"));
        }
        Ok(())
    }
}

/// Convenience wrapper: build a mapping and apply it to `field`.
pub fn conservative_regrid(
    field: ArrayView3<'_, f64>,
    source: &RegularGrid,
    dest: &RegularGrid,
) -> Result<Array3<f64>> {
    RegridMapping::build(source, dest)?.apply3(field)
}

fn to_usize(values: Vec<u64>) -> Vec<usize> {
    values.into_iter().map(|v| v as usize).collect()
}

/// (source index, overlap length) of every source cell intersecting `bounds`.
fn overlaps(axis: &AxisCoords, bounds: (f64, f64)) -> Vec<(usize, f64)> {
    let (lo, hi) = bounds;
    let a = axis.fractional_index(lo);
    let b = axis.fractional_index(hi);
    let (fa, fb) = (a.min(b), a.max(b));
    let last = axis.len() as f64 - 1.0;
    if fb < -0.5 || fa > last + 0.5 {
        return Vec::new();
    }
    let first = (fa - 0.5).floor().clamp(0.0, last) as usize;
    let end = (fb + 0.5).ceil().clamp(0.0, last) as usize;
    (first..=end)
        .filter_map(|i| {
            let (s0, s1) = axis.cell_bounds(i);
            let len = hi.min(s1) - lo.max(s0);
            (len > 0.0).then_some((i, len))
        })
        .collect()
}

fn cell_weights(x: &[(usize, f64)], y: &[(usize, f64)]) -> CellWeights {
    let total: f64 = x.iter().map(|(_, a)| a).sum::<f64>() * y.iter().map(|(_, b)| b).sum::<f64>();
    if total <= 0.0 {
        return Vec::new();
    }
    x.iter()
        .flat_map(|&(i, ox)| y.iter().map(move |&(j, oy)| (ox * oy / total, i, j)))
        .collect()
}
