/// Fourier amplitude template of a power-law space-time field.
///
/// The template only depends on the target resolution and the slopes, so it
/// is built once per request and shared read-only by every member.
use std::path::Path;

use ndarray::{Array3, ArrayView3};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RainfarmError, Result};
use crate::fft::signed_freq;
use crate::spectral::SpectralSlopes;
use crate::store::{self, FileKind};

#[derive(Debug, Clone, PartialEq)]
pub struct AmplitudeTemplate {
    data: Array3<f64>,
    slopes: SpectralSlopes,
}

#[derive(Serialize, Deserialize)]
struct TemplateHeader {
    ns: usize,
    nt: usize,
    slopes: SpectralSlopes,
}

impl AmplitudeTemplate {
    /// Build the (ns, ns, nt) template for `slopes`.
    ///
    /// Amplitude is `(kx^2 + ky^2)^(-(sx+1)/4) * (kt^2)^(-st/4)`, zero on the
    /// spatial mean column and the temporal mean plane, scaled so that the
    /// synthesized field has unit variance.
    pub fn new(ns: usize, nt: usize, slopes: SpectralSlopes) -> Result<Self> {
        if ns < 2 || nt < 2 {
            return Err(RainfarmError::config(format!(
                "template needs at least 2 cells per axis, got ns={ns}, nt={nt}"
            )));
        }
        let spatial_exp = -(slopes.sx() + 1.0) / 4.0;
        let temporal_exp = -slopes.st() / 4.0;

        let mut data = Array3::from_shape_fn((ns, ns, nt), |(kx, ky, kt)| {
            let fx = signed_freq(kx, ns) as f64;
            let fy = signed_freq(ky, ns) as f64;
            let ft = signed_freq(kt, nt) as f64;
            let k2 = fx * fx + fy * fy;
            if k2 == 0.0 || ft == 0.0 {
                0.0
            } else {
                k2.powf(spatial_exp) * (ft * ft).powf(temporal_exp)
            }
        });

        let norm = data.iter().map(|a| a * a).sum::<f64>().sqrt();
        let target = (ns * ns * nt) as f64;
        data.mapv_inplace(|a| a * target / norm);
        debug!(ns, nt, sx = slopes.sx(), st = slopes.st(), "amplitude template built");
        Ok(Self { data, slopes })
    }

    pub fn view(&self) -> ArrayView3<'_, f64> {
        self.data.view()
    }

    pub fn slopes(&self) -> SpectralSlopes {
        self.slopes
    }

    /// (ns, ns, nt).
    pub fn shape(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Error unless the template was built for an (ns, ns, nt) target.
    pub fn ensure_shape(&self, ns: usize, nt: usize) -> Result<()> {
        if self.shape() != (ns, ns, nt) {
            let (a, b, c) = self.shape();
            return Err(RainfarmError::shape("amplitude template", &[ns, ns, nt], &[a, b, c]));
        }
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let (ns, _, nt) = self.shape();
        let header = TemplateHeader {
            ns,
            nt,
            slopes: self.slopes,
        };
        store::write_file(path, FileKind::Template, &header, |w| {
            store::write_f64s(w, self.data.iter().copied())
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let (header, data) = store::read_file(path, FileKind::Template, |h: &TemplateHeader, r| {
            let values = store::read_f64s(r, store::element_count(&[h.ns, h.ns, h.nt])?)?;
            let len = values.len();
            Array3::from_shape_vec((h.ns, h.ns, h.nt), values)
                .map_err(|_| RainfarmError::shape("cached template", &[h.ns, h.ns, h.nt], &[len]))
        })?;
        debug!(path = %path.display(), ns = header.ns, nt = header.nt, "amplitude template loaded");
        Ok(Self {
            data,
            slopes: header.slopes,
        })
    }
}
