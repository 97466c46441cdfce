/// RainFARM numerical constants and default parameter values.
///
/// Centralises all fixed values used throughout the downscaling pipeline.
use serde::{Deserialize, Serialize};

// -- Geometry --

/// Earth radius used to convert buffer distances to degrees [km].
pub const EARTH_RADIUS_KM: f64 = 6378.137;

/// Smallest window side accepted for FFT work [cells].
pub const MIN_WINDOW_PIXELS: usize = 8;

/// Tolerance, as a fraction of the axis step, for coordinate comparisons.
pub const COORD_TOLERANCE: f64 = 1e-9;

// -- Spectral fit bands --

/// Inclusive wavenumber/frequency range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Band {
    pub min: usize,
    pub max: usize,
}

/// Default spatial fit band; the upper end is clamped to `len - 1`.
pub const SPATIAL_BAND: Band = Band { min: 2, max: 15 };

/// Default temporal fit band; the upper end is clamped to `len - 1`.
pub const TEMPORAL_BAND: Band = Band { min: 2, max: 9 };

// -- Synthesis --

/// Exponent of the log-normal transform `exp(alpha * g)`.
pub const LOGNORMAL_ALPHA: f64 = 1.0;

// -- Ensemble --

/// Members held in memory waiting for the writer.
pub const DEFAULT_QUEUE_DEPTH: usize = 2;

/// Relative tolerance of the post-correction volume check.
pub const VOLUME_TOLERANCE: f64 = 1e-6;

// -- Persistence --

/// Magic bytes opening every cache and member file.
pub const FILE_MAGIC: &[u8; 4] = b"RFRM";

/// Binary format version.
pub const FORMAT_VERSION: u32 = 1;

/// Extension of persisted ensemble members.
pub const MEMBER_EXTENSION: &str = "rfm";
