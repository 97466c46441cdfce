//! Reusable 3-D FFT workspace.
//!
//! The transform is separable: each axis is processed lane by lane with a
//! planned 1-D FFT. Plans and scratch buffers are allocated once, so one
//! `Fft3` per worker thread serves every member of an ensemble.

use std::sync::Arc;

use ndarray::{Array3, ArrayView3, Axis};
use num_complex::Complex64;
use rustfft::{Fft, FftPlanner};

use crate::error::{RainfarmError, Result};

pub struct Fft3 {
    shape: (usize, usize, usize),
    forward: [Arc<dyn Fft<f64>>; 3],
    inverse: [Arc<dyn Fft<f64>>; 3],
    lane: Vec<Complex64>,
    scratch: Vec<Complex64>,
}

impl Fft3 {
    /// Plan transforms for arrays of `shape`.
    pub fn new(shape: (usize, usize, usize)) -> Result<Self> {
        let (nx, ny, nt) = shape;
        if nx == 0 || ny == 0 || nt == 0 {
            return Err(RainfarmError::config(format!(
                "cannot plan an FFT for shape {shape:?}"
            )));
        }
        let mut planner = FftPlanner::<f64>::new();
        let forward = [
            planner.plan_fft_forward(nx),
            planner.plan_fft_forward(ny),
            planner.plan_fft_forward(nt),
        ];
        let inverse = [
            planner.plan_fft_inverse(nx),
            planner.plan_fft_inverse(ny),
            planner.plan_fft_inverse(nt),
        ];
        let scratch_len = forward
            .iter()
            .chain(inverse.iter())
            .map(|p| p.get_inplace_scratch_len())
            .max()
            .unwrap_or(0);
        Ok(Self {
            shape,
            forward,
            inverse,
            lane: vec![Complex64::default(); nx.max(ny).max(nt)],
            scratch: vec![Complex64::default(); scratch_len],
        })
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        self.shape
    }

    /// Unnormalised forward transform in place.
    pub fn forward(&mut self, data: &mut Array3<Complex64>) -> Result<()> {
        self.check(data)?;
        self.transform(data, false);
        Ok(())
    }

    /// Inverse transform in place, scaled by `1/N`.
    pub fn inverse(&mut self, data: &mut Array3<Complex64>) -> Result<()> {
        self.check(data)?;
        self.transform(data, true);
        let scale = 1.0 / data.len() as f64;
        data.mapv_inplace(|c| c * scale);
        Ok(())
    }

    /// Forward transform of a real field.
    pub fn forward_real(&mut self, data: ArrayView3<'_, f64>) -> Result<Array3<Complex64>> {
        let mut spectrum = data.mapv(|v| Complex64::new(v, 0.0));
        self.forward(&mut spectrum)?;
        Ok(spectrum)
    }

    fn check(&self, data: &Array3<Complex64>) -> Result<()> {
        if data.dim() != self.shape {
            let (a, b, c) = self.shape;
            return Err(RainfarmError::shape("FFT input", &[a, b, c], data.shape()));
        }
        Ok(())
    }

    fn transform(&mut self, data: &mut Array3<Complex64>, inverse: bool) {
        for axis in 0..3 {
            let plan = if inverse {
                &self.inverse[axis]
            } else {
                &self.forward[axis]
            };
            let n = data.len_of(Axis(axis));
            let buf = &mut self.lane[..n];
            for mut lane in data.lanes_mut(Axis(axis)) {
                for (b, v) in buf.iter_mut().zip(lane.iter()) {
                    *b = *v;
                }
                plan.process_with_scratch(buf, &mut self.scratch);
                for (v, b) in lane.iter_mut().zip(buf.iter()) {
                    *v = *b;
                }
            }
        }
    }
}

/// Signed integer frequency of FFT bin `k` for a transform of length `n`.
#[inline]
pub fn signed_freq(k: usize, n: usize) -> i64 {
    if k <= n / 2 {
        k as i64
    } else {
        k as i64 - n as i64
    }
}
