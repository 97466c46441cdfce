/// rainfarm-core: stochastic space-time rainfall downscaling in Rust.
///
/// Takes a coarse (x, y, t) precipitation field, fits its spatial and
/// temporal power-law slopes, and generates an ensemble of fine-resolution
/// fields that share the extrapolated spectrum and exactly reproduce the
/// coarse volumes at the reliable scales.
pub mod config;
pub mod conservation;
pub mod constants;
pub mod ensemble;
pub mod error;
pub mod fft;
pub mod field;
pub mod grid;
pub mod metrics;
pub mod regrid;
pub mod spectral;
pub mod store;
pub mod synthesis;
pub mod time;

pub use config::DownscaleConfig;
pub use conservation::GatherIndex;
pub use ensemble::{
    DirectorySink, DownscaleRequest, Downscaler, EnsembleSummary, MemberRecord, MemberSink,
    OutputGrid,
};
pub use error::{RainfarmError, Result};
pub use field::SourceField;
pub use grid::{AxisCoords, RegularGrid};
pub use regrid::RegridMapping;
pub use spectral::{SpectralFitBands, SpectralSlopes};
pub use synthesis::AmplitudeTemplate;
pub use time::TimeSchedule;
