//! Ensemble preparation, parallel realization and persistence.

pub mod orchestrator;
pub mod sink;

pub use orchestrator::{
    DownscaleRequest, Downscaler, EnsembleSummary, OutputAxes, OutputGrid, Placement,
};
pub use sink::{DirectorySink, MemberHeader, MemberRecord, MemberSink};
