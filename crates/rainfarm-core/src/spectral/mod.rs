//! Spectral analysis: 1-D power spectra and power-law slope fits.

pub mod analyzer;
pub mod regression;

pub use analyzer::{analyze, fit_slopes, power_spectra, PowerSpectra, SpectralFitBands, SpectralSlopes};
