/// Power spectrum of a space-time field and its log-log slopes.
///
/// The spatial spectrum is the radially averaged power (summed over time),
/// the temporal spectrum is the power summed over both spatial axes. Both
/// are fit with a power law over an inclusive band of wavenumbers.
use ndarray::{Array2, ArrayView3};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::regression::power_law;
use crate::constants::{Band, SPATIAL_BAND, TEMPORAL_BAND};
use crate::error::{RainfarmError, Result};
use crate::fft::{signed_freq, Fft3};

/// Spectral slopes of a field. `sy` always equals `sx`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSlopes")]
pub struct SpectralSlopes {
    sx: f64,
    sy: f64,
    st: f64,
}

/// Serialized form; checked by [`SpectralSlopes::new`] on the way in.
#[derive(Deserialize)]
struct RawSlopes {
    sx: f64,
    #[serde(default)]
    sy: Option<f64>,
    st: f64,
}

impl TryFrom<RawSlopes> for SpectralSlopes {
    type Error = RainfarmError;

    fn try_from(raw: RawSlopes) -> Result<Self> {
        match raw.sy {
            Some(sy) if sy != raw.sx => Err(RainfarmError::config(format!(
                "spectral slope sy={sy} must equal sx={}",
                raw.sx
            ))),
            _ => Self::new(raw.sx, raw.st),
        }
    }
}

impl SpectralSlopes {
    /// Create slopes, returning an error for negative or non-finite values.
    pub fn new(sx: f64, st: f64) -> Result<Self> {
        if !(sx.is_finite() && sx >= 0.0) || !(st.is_finite() && st >= 0.0) {
            return Err(RainfarmError::config(format!(
                "spectral slopes must be finite and non-negative, got sx={sx}, st={st}"
            )));
        }
        Ok(Self { sx, sy: sx, st })
    }

    pub fn sx(&self) -> f64 {
        self.sx
    }

    pub fn sy(&self) -> f64 {
        self.sy
    }

    pub fn st(&self) -> f64 {
        self.st
    }
}

/// Wavenumber ranges used for the slope fits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpectralFitBands {
    pub spatial: Band,
    pub temporal: Band,
}

impl Default for SpectralFitBands {
    fn default() -> Self {
        Self {
            spatial: SPATIAL_BAND,
            temporal: TEMPORAL_BAND,
        }
    }
}

impl SpectralFitBands {
    pub fn validate(&self) -> Result<()> {
        for (name, band) in [("spatial", self.spatial), ("temporal", self.temporal)] {
            if band.min == 0 || band.min > band.max {
                return Err(RainfarmError::config(format!(
                    "{name} fit band {}..={} must satisfy 1 <= min <= max",
                    band.min, band.max
                )));
            }
        }
        Ok(())
    }
}

/// One-sided 1-D power spectra. Index = integer wavenumber/frequency.
#[derive(Debug, Clone, PartialEq)]
pub struct PowerSpectra {
    /// Radial mean over spatial wavenumbers `0..=n/2`.
    pub spatial: Vec<f64>,
    /// Sum over space for frequencies `0..=t/2`.
    pub temporal: Vec<f64>,
}

/// Spatial and temporal power spectra of an (n, n, t) field with `n` even.
pub fn power_spectra(field: ArrayView3<'_, f64>, fft: &mut Fft3) -> Result<PowerSpectra> {
    let (nx, ny, nt) = field.dim();
    if nx != ny {
        return Err(RainfarmError::shape("spectral analysis input", &[nx, nx, nt], &[nx, ny, nt]));
    }
    if nx < 2 || nx % 2 != 0 {
        return Err(RainfarmError::InvalidField {
            reason: format!("spectral analysis needs an even spatial side, got {nx}"),
        });
    }
    let n = nx;
    let spectrum = fft.forward_real(field)?;
    let norm = ((n * n * nt) as f64).powi(2);
    let t_nyquist = (nt % 2 == 0).then_some(nt / 2);

    let mut spatial_power = Array2::<f64>::zeros((n, n));
    let mut temporal = vec![0.0; nt / 2 + 1];

    for ((kx, ky, kt), c) in spectrum.indexed_iter() {
        let mut p = c.norm_sqr() / norm;
        if kx == n / 2 {
            p *= 0.5;
        }
        if ky == n / 2 {
            p *= 0.5;
        }
        if Some(kt) == t_nyquist {
            p *= 0.5;
        }
        spatial_power[[kx, ky]] += p;
        if kt <= nt / 2 {
            temporal[kt] += p;
        }
    }

    let bins = n / 2 + 1;
    let mut sum = vec![0.0; bins];
    let mut count = vec![0usize; bins];
    for ((kx, ky), &p) in spatial_power.indexed_iter() {
        let fx = signed_freq(kx, n) as f64;
        let fy = signed_freq(ky, n) as f64;
        let bin = (fx * fx + fy * fy).sqrt().round() as usize;
        if bin < bins {
            sum[bin] += p;
            count[bin] += 1;
        }
    }
    let spatial = sum
        .iter()
        .zip(&count)
        .map(|(&s, &c)| if c > 0 { s / c as f64 } else { 0.0 })
        .collect();

    Ok(PowerSpectra { spatial, temporal })
}

/// Fit slopes to both spectra and convert them to (sx, sy, st).
pub fn fit_slopes(spectra: &PowerSpectra, bands: &SpectralFitBands) -> Result<SpectralSlopes> {
    bands.validate()?;
    let spatial = fit_band(&spectra.spatial, bands.spatial, "spatial")?;
    let temporal = fit_band(&spectra.temporal, bands.temporal, "temporal")?;
    SpectralSlopes::new((-spatial - 1.0).abs(), (-temporal).abs())
}

/// Power spectra then slope fit, with a workspace planned for `field`.
#[tracing::instrument(skip(field), fields(shape = ?field.dim()))]
pub fn analyze(field: ArrayView3<'_, f64>, bands: &SpectralFitBands) -> Result<SpectralSlopes> {
    let mut fft = Fft3::new(field.dim())?;
    let spectra = power_spectra(field, &mut fft)?;
    let slopes = fit_slopes(&spectra, bands)?;
    info!(sx = slopes.sx(), sy = slopes.sy(), st = slopes.st(), "spectral slopes fitted");
    Ok(slopes)
}

/// Log-log slope of `spectrum` over `band`, clamped to `len - 1`.
fn fit_band(spectrum: &[f64], band: Band, axis: &'static str) -> Result<f64> {
    let len = spectrum.len().saturating_sub(1);
    let hi = band.max.min(len.saturating_sub(1));
    if hi < band.min || hi - band.min + 1 < 2 {
        return Err(RainfarmError::InsufficientSpectrum {
            axis,
            reason: format!(
                "band {}..={} leaves fewer than 2 points in a spectrum of length {len}",
                band.min, band.max
            ),
        });
    }
    let ks: Vec<f64> = (band.min..=hi).map(|k| k as f64).collect();
    let power = &spectrum[band.min..=hi];
    if let Some((i, p)) = power.iter().enumerate().find(|(_, p)| **p <= 0.0 || !p.is_finite()) {
        return Err(RainfarmError::InsufficientSpectrum {
            axis,
            reason: format!("non-positive power {p} at wavenumber {}", band.min + i),
        });
    }
    power_law(&ks, power)
        .map(|fit| fit.slope)
        .ok_or_else(|| RainfarmError::InsufficientSpectrum {
            axis,
            reason: "least-squares fit is degenerate".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array3;

    fn ripple(n: usize, nt: usize) -> Array3<f64> {
        Array3::from_shape_fn((n, n, nt), |(i, j, t)| {
            let x = i as f64 / n as f64;
            let y = j as f64 / n as f64;
            let s = t as f64 / nt as f64;
            2.0 + (2.0 * std::f64::consts::PI * (x + 3.0 * y + 2.0 * s)).sin()
        })
    }

    // -- Power spectra --

    #[test]
    fn spectra_lengths() {
        let f = ripple(8, 6);
        let mut fft = Fft3::new(f.dim()).unwrap();
        let s = power_spectra(f.view(), &mut fft).unwrap();
        assert_eq!(s.spatial.len(), 5);
        assert_eq!(s.temporal.len(), 4);
    }

    #[test]
    fn constant_field_has_only_dc_power() {
        let f = Array3::from_elem((8, 8, 4), 3.0);
        let mut fft = Fft3::new(f.dim()).unwrap();
        let s = power_spectra(f.view(), &mut fft).unwrap();
        // DC power is mean^2 after normalisation
        assert_relative_eq!(s.spatial[0], 9.0, epsilon = 1e-10);
        assert_relative_eq!(s.temporal[0], 9.0, epsilon = 1e-10);
        assert!(s.spatial[1..].iter().all(|&p| p.abs() < 1e-20));
        assert!(s.temporal[1..].iter().all(|&p| p.abs() < 1e-20));
    }

    #[test]
    fn single_mode_lands_in_its_bins() {
        let f = ripple(16, 8);
        let mut fft = Fft3::new(f.dim()).unwrap();
        let s = power_spectra(f.view(), &mut fft).unwrap();
        // radius sqrt(1 + 9) rounds to 3, temporal frequency 2
        let (peak_k, _) = s.spatial[1..]
            .iter()
            .enumerate()
            .fold((0, 0.0), |acc, (k, &p)| if p > acc.1 { (k + 1, p) } else { acc });
        assert_eq!(peak_k, 3);
        assert!(s.temporal[2] > 0.1);
        assert!(s.temporal[1] < 1e-20);
    }

    #[test]
    fn rejects_odd_side() {
        let f = Array3::from_elem((7, 7, 4), 1.0);
        let mut fft = Fft3::new(f.dim()).unwrap();
        assert!(power_spectra(f.view(), &mut fft).is_err());
    }

    #[test]
    fn rejects_non_square() {
        let f = Array3::from_elem((8, 6, 4), 1.0);
        let mut fft = Fft3::new(f.dim()).unwrap();
        assert!(matches!(
            power_spectra(f.view(), &mut fft),
            Err(RainfarmError::ShapeMismatch { .. })
        ));
    }

    // -- Slope fits --

    #[test]
    fn fit_recovers_synthetic_power_laws() {
        let spatial: Vec<f64> = (0..=16)
            .map(|k| if k == 0 { 1.0 } else { (k as f64).powf(-3.2) })
            .collect();
        let temporal: Vec<f64> = (0..=8)
            .map(|k| if k == 0 { 1.0 } else { (k as f64).powf(-1.4) })
            .collect();
        let slopes = fit_slopes(&PowerSpectra { spatial, temporal }, &SpectralFitBands::default()).unwrap();
        assert_relative_eq!(slopes.sx(), 2.2, epsilon = 1e-10);
        assert_relative_eq!(slopes.sy(), 2.2, epsilon = 1e-10);
        assert_relative_eq!(slopes.st(), 1.4, epsilon = 1e-10);
    }

    #[test]
    fn short_spectrum_is_insufficient() {
        let spectra = PowerSpectra {
            spatial: vec![1.0, 0.5, 0.25],
            temporal: vec![1.0, 0.5, 0.25, 0.1, 0.05],
        };
        let err = fit_slopes(&spectra, &SpectralFitBands::default()).unwrap_err();
        assert!(matches!(err, RainfarmError::InsufficientSpectrum { axis: "spatial", .. }));
    }

    #[test]
    fn zero_power_in_band_is_insufficient() {
        let spectra = PowerSpectra {
            spatial: vec![1.0, 0.5, 0.25, 0.0, 0.1, 0.05],
            temporal: vec![1.0, 0.5, 0.25, 0.1, 0.05],
        };
        let err = fit_slopes(&spectra, &SpectralFitBands::default()).unwrap_err();
        assert!(err.to_string().contains("non-positive"));
    }

    #[test]
    fn small_field_cannot_be_analyzed() {
        let f = ripple(4, 4);
        let err = analyze(f.view(), &SpectralFitBands::default()).unwrap_err();
        assert!(matches!(err, RainfarmError::InsufficientSpectrum { .. }));
    }

    #[test]
    fn bands_validate() {
        let mut bands = SpectralFitBands::default();
        assert!(bands.validate().is_ok());
        bands.temporal = Band { min: 5, max: 3 };
        assert!(bands.validate().is_err());
    }

    #[test]
    fn slopes_reject_negative() {
        assert!(SpectralSlopes::new(-0.1, 1.0).is_err());
        assert!(SpectralSlopes::new(1.0, f64::NAN).is_err());
    }
}
