use numpy::{IntoPyArray, PyArray3};
use pyo3::prelude::*;

use crate::convert::to_py_err;
use rainfarm_core::fft::Fft3;
use rainfarm_core::synthesis::{self, member_rng, AmplitudeTemplate};
use rainfarm_core::SpectralSlopes;

fn template(ns: usize, nt: usize, sx: f64, st: f64) -> PyResult<AmplitudeTemplate> {
    let slopes = SpectralSlopes::new(sx, st).map_err(to_py_err)?;
    AmplitudeTemplate::new(ns, nt, slopes).map_err(to_py_err)
}

/// Fourier amplitude template of shape (ns, ns, nt).
#[pyfunction]
fn amplitude_template<'py>(
    py: Python<'py>,
    ns: usize,
    nt: usize,
    sx: f64,
    st: f64,
) -> PyResult<Bound<'py, PyArray3<f64>>> {
    let t = template(ns, nt, sx, st)?;
    Ok(t.view().to_owned().into_pyarray(py))
}

#[pyfunction]
#[pyo3(signature = (ns, nt, sx, st, seed, member_id=0))]
fn metagauss<'py>(
    py: Python<'py>,
    ns: usize,
    nt: usize,
    sx: f64,
    st: f64,
    seed: u64,
    member_id: u32,
) -> PyResult<Bound<'py, PyArray3<f64>>> {
    let t = template(ns, nt, sx, st)?;
    let mut fft = Fft3::new(t.shape()).map_err(to_py_err)?;
    let g = synthesis::gaussian_field(&t, &mut member_rng(seed, member_id), &mut fft)
        .map_err(to_py_err)?;
    Ok(g.into_pyarray(py))
}

/// Positive log-normal field `exp(g)` before volume correction.
#[pyfunction]
#[pyo3(signature = (ns, nt, sx, st, seed, member_id=0))]
fn realize<'py>(
    py: Python<'py>,
    ns: usize,
    nt: usize,
    sx: f64,
    st: f64,
    seed: u64,
    member_id: u32,
) -> PyResult<Bound<'py, PyArray3<f64>>> {
    let t = template(ns, nt, sx, st)?;
    let mut fft = Fft3::new(t.shape()).map_err(to_py_err)?;
    let r = synthesis::realize(&t, &mut member_rng(seed, member_id), &mut fft).map_err(to_py_err)?;
    Ok(r.into_pyarray(py))
}

pub fn register(parent: &Bound<'_, PyModule>) -> PyResult<()> {
    let m = PyModule::new(parent.py(), "synthesis")?;
    m.add_function(wrap_pyfunction!(amplitude_template, &m)?)?;
    m.add_function(wrap_pyfunction!(metagauss, &m)?)?;
    m.add_function(wrap_pyfunction!(realize, &m)?)?;
    parent.add_submodule(&m)?;
    Ok(())
}
