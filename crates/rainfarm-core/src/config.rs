//! Configuration of a downscaling request.

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_QUEUE_DEPTH;
use crate::error::{RainfarmError, Result};
use crate::spectral::{SpectralFitBands, SpectralSlopes};

/// Parameters of a downscaling request.
///
/// Use the builder methods to customise parameters. Missing fields take
/// their defaults when deserialized.
///
/// # Example
///
/// ```
/// use rainfarm_core::DownscaleConfig;
///
/// let config = DownscaleConfig::new()
///     .with_ratios(4, 2)
///     .with_ensemble(0, 9)
///     .with_seed(42);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownscaleConfig {
    ensemble_start: u32,
    ensemble_end: u32,
    ratio_s: usize,
    ratio_t: usize,
    cs_sf: usize,
    ct_sf: usize,
    fixed_slopes: Option<SpectralSlopes>,
    bands: SpectralFitBands,
    buffer_km: f64,
    seed: Option<u64>,
    workers: Option<usize>,
    queue_depth: usize,
    output_stride: usize,
}

impl Default for DownscaleConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl DownscaleConfig {
    /// Creates a new configuration with defaults.
    ///
    /// Defaults: a single member (id 0), `ratio_s = 4`, `ratio_t = 1`,
    /// `cs_sf = ct_sf = 1`, slopes fitted from the data over the default
    /// bands, no buffer, a seed drawn from the OS, one worker per core,
    /// `queue_depth = 2`, `output_stride = 1`.
    pub fn new() -> Self {
        Self {
            ensemble_start: 0,
            ensemble_end: 0,
            ratio_s: 4,
            ratio_t: 1,
            cs_sf: 1,
            ct_sf: 1,
            fixed_slopes: None,
            bands: SpectralFitBands::default(),
            buffer_km: 0.0,
            seed: None,
            workers: None,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            output_stride: 1,
        }
    }

    /// Sets the inclusive range of ensemble member ids.
    pub fn with_ensemble(mut self, start: u32, end: u32) -> Self {
        self.ensemble_start = start;
        self.ensemble_end = end;
        self
    }

    /// Sets the spatial and temporal refinement ratios.
    pub fn with_ratios(mut self, ratio_s: usize, ratio_t: usize) -> Self {
        self.ratio_s = ratio_s;
        self.ratio_t = ratio_t;
        self
    }

    /// Sets the reliable spatial and temporal scales, in native cells.
    pub fn with_reliable_scales(mut self, cs_sf: usize, ct_sf: usize) -> Self {
        self.cs_sf = cs_sf;
        self.ct_sf = ct_sf;
        self
    }

    /// Skips the spectral fit and uses these slopes.
    pub fn with_fixed_slopes(mut self, slopes: SpectralSlopes) -> Self {
        self.fixed_slopes = Some(slopes);
        self
    }

    pub fn with_bands(mut self, bands: SpectralFitBands) -> Self {
        self.bands = bands;
        self
    }

    /// Sets the buffer added around the reference grid [km].
    pub fn with_buffer_km(mut self, km: f64) -> Self {
        self.buffer_km = km;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Sets the worker pool size.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Sets how many finished members may wait for the writer.
    pub fn with_queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth;
        self
    }

    /// Sets the number of fine time steps averaged into one output step.
    pub fn with_output_stride(mut self, stride: usize) -> Self {
        self.output_stride = stride;
        self
    }

    // -- Accessors --

    pub fn ensemble_start(&self) -> u32 {
        self.ensemble_start
    }

    pub fn ensemble_end(&self) -> u32 {
        self.ensemble_end
    }

    pub fn ratio_s(&self) -> usize {
        self.ratio_s
    }

    pub fn ratio_t(&self) -> usize {
        self.ratio_t
    }

    pub fn cs_sf(&self) -> usize {
        self.cs_sf
    }

    pub fn ct_sf(&self) -> usize {
        self.ct_sf
    }

    pub fn fixed_slopes(&self) -> Option<SpectralSlopes> {
        self.fixed_slopes
    }

    pub fn bands(&self) -> &SpectralFitBands {
        &self.bands
    }

    pub fn buffer_km(&self) -> f64 {
        self.buffer_km
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    pub fn workers(&self) -> Option<usize> {
        self.workers
    }

    pub fn queue_depth(&self) -> usize {
        self.queue_depth
    }

    pub fn output_stride(&self) -> usize {
        self.output_stride
    }

    /// Validates this configuration.
    ///
    /// An ensemble range with `end < start` is accepted here; the
    /// orchestrator clamps it to a single member.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("ratio_s", self.ratio_s),
            ("ratio_t", self.ratio_t),
            ("cs_sf", self.cs_sf),
            ("ct_sf", self.ct_sf),
            ("queue_depth", self.queue_depth),
            ("output_stride", self.output_stride),
        ] {
            if value == 0 {
                return Err(RainfarmError::config(format!("{name} must be >= 1")));
            }
        }
        if self.workers == Some(0) {
            return Err(RainfarmError::config("workers must be >= 1"));
        }
        if !self.buffer_km.is_finite() || self.buffer_km < 0.0 {
            return Err(RainfarmError::config(format!(
                "buffer_km must be finite and non-negative, got {}",
                self.buffer_km
            )));
        }
        self.bands.validate()
    }
}
