use numpy::{PyArray1, PyReadonlyArray3};
use pyo3::prelude::*;

use crate::convert::to_py_err;
use rainfarm_core::constants::Band;
use rainfarm_core::fft::Fft3;
use rainfarm_core::spectral::{self, SpectralFitBands, SpectralSlopes};

define_accessor_result! {
    /// Fitted or prescribed spectral slopes.
    pub struct Slopes from SpectralSlopes {
        sx: f64, sy: f64, st: f64,
    }
}

#[pymethods]
impl Slopes {
    fn __repr__(&self) -> String {
        format!("Slopes(sx={:.4}, sy={:.4}, st={:.4})", self.sx, self.sy, self.st)
    }
}

#[pyfunction]
#[pyo3(signature = (field, spatial_band=(2, 15), temporal_band=(2, 9)))]
fn fit_slopes(
    field: PyReadonlyArray3<'_, f64>,
    spatial_band: (usize, usize),
    temporal_band: (usize, usize),
) -> PyResult<Slopes> {
    let bands = SpectralFitBands {
        spatial: Band {
            min: spatial_band.0,
            max: spatial_band.1,
        },
        temporal: Band {
            min: temporal_band.0,
            max: temporal_band.1,
        },
    };
    let slopes = spectral::analyze(field.as_array(), &bands).map_err(to_py_err)?;
    Ok(Slopes::from_core(&slopes))
}

/// Radially averaged spatial and summed temporal power spectra.
#[pyfunction]
fn power_spectra<'py>(
    py: Python<'py>,
    field: PyReadonlyArray3<'py, f64>,
) -> PyResult<(Bound<'py, PyArray1<f64>>, Bound<'py, PyArray1<f64>>)> {
    let view = field.as_array();
    let mut fft = Fft3::new(view.dim()).map_err(to_py_err)?;
    let spectra = spectral::power_spectra(view, &mut fft).map_err(to_py_err)?;
    Ok((
        PyArray1::from_vec(py, spectra.spatial),
        PyArray1::from_vec(py, spectra.temporal),
    ))
}

pub fn register(parent: &Bound<'_, PyModule>) -> PyResult<()> {
    let m = PyModule::new(parent.py(), "spectral")?;
    m.add_function(wrap_pyfunction!(fit_slopes, &m)?)?;
    m.add_function(wrap_pyfunction!(power_spectra, &m)?)?;
    m.add_class::<Slopes>()?;
    parent.add_submodule(&m)?;
    Ok(())
}
