use numpy::{IntoPyArray, PyArray3, PyReadonlyArray3};
use pyo3::prelude::*;

use crate::convert::{owned_field, to_py_err};
use rainfarm_core::conservation;

/// Block means of `fine` on a grid of `coarse_shape`.
#[pyfunction]
fn aggregate<'py>(
    py: Python<'py>,
    fine: PyReadonlyArray3<'py, f64>,
    coarse_shape: (usize, usize, usize),
) -> PyResult<Bound<'py, PyArray3<f64>>> {
    let out = conservation::aggregate(fine.as_array(), coarse_shape).map_err(to_py_err)?;
    Ok(out.into_pyarray(py))
}

#[pyfunction]
fn expand<'py>(
    py: Python<'py>,
    coarse: PyReadonlyArray3<'py, f64>,
    fine_shape: (usize, usize, usize),
) -> PyResult<Bound<'py, PyArray3<f64>>> {
    let out = conservation::expand(coarse.as_array(), fine_shape).map_err(to_py_err)?;
    Ok(out.into_pyarray(py))
}

/// Rescale `fine` so its block means reproduce `coarse`.
#[pyfunction]
fn conserve<'py>(
    py: Python<'py>,
    fine: PyReadonlyArray3<'py, f64>,
    coarse: PyReadonlyArray3<'py, f64>,
) -> PyResult<Bound<'py, PyArray3<f64>>> {
    let fine = owned_field(&fine, "fine")?;
    let out = conservation::conserve(fine, coarse.as_array(), None).map_err(to_py_err)?;
    Ok(out.into_pyarray(py))
}

pub fn register(parent: &Bound<'_, PyModule>) -> PyResult<()> {
    let m = PyModule::new(parent.py(), "conservation")?;
    m.add_function(wrap_pyfunction!(aggregate, &m)?)?;
    m.add_function(wrap_pyfunction!(expand, &m)?)?;
    m.add_function(wrap_pyfunction!(conserve, &m)?)?;
    parent.add_submodule(&m)?;
    Ok(())
}
