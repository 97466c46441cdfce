//! Error type shared by every stage of the downscaling pipeline.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RainfarmError>;

/// Errors raised while preparing or running a downscaling request.
///
/// Configuration and geometry problems are detected before any FFT work is
/// spent; persistence problems surface from the ensemble writer.
#[derive(Debug, Error)]
pub enum RainfarmError {
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("invalid source field: {reason}")]
    InvalidField { reason: String },

    #[error("{what}: expected shape {expected:?}, got {got:?}")]
    ShapeMismatch {
        what: String,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("grid geometry: {reason}")]
    GridGeometry { reason: String },

    #[error("cannot fit {axis} spectral slope: {reason}")]
    InsufficientSpectrum { axis: &'static str, reason: String },

    #[error("ensemble member {id} not found at {}", path.display())]
    MissingMember { id: u32, path: PathBuf },

    #[error("corrupt file {}: {reason}", path.display())]
    CorruptFile { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("header error: {0}")]
    Header(#[from] serde_json::Error),

    #[error("ensemble writer stopped before all members were persisted")]
    WriterDisconnected,
}

impl RainfarmError {
    pub(crate) fn config(reason: impl Into<String>) -> Self {
        RainfarmError::InvalidConfig {
            reason: reason.into(),
        }
    }

    pub(crate) fn geometry(reason: impl Into<String>) -> Self {
        RainfarmError::GridGeometry {
            reason: reason.into(),
        }
    }

    pub(crate) fn shape(what: impl Into<String>, expected: &[usize], got: &[usize]) -> Self {
        RainfarmError::ShapeMismatch {
            what: what.into(),
            expected: expected.to_vec(),
            got: got.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_mismatch_message_lists_both_shapes() {
        let err = RainfarmError::shape("template", &[8, 8, 4], &[16, 16, 8]);
        let msg = err.to_string();
        assert!(msg.contains("template"));
        assert!(msg.contains("[8, 8, 4]"));
        assert!(msg.contains("[16, 16, 8]"));
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: RainfarmError = io.into();
        assert!(matches!(err, RainfarmError::Io(_)));
    }
}
