use numpy::PyReadonlyArray3;
use pyo3::prelude::*;

use crate::convert::to_py_err;
use rainfarm_core::metrics;

#[pyfunction]
fn total_volume(field: PyReadonlyArray3<'_, f64>) -> f64 {
    metrics::total_volume(field.as_array())
}

#[pyfunction]
fn relative_volume_error(fine: PyReadonlyArray3<'_, f64>, coarse: PyReadonlyArray3<'_, f64>) -> f64 {
    metrics::relative_volume_error(fine.as_array(), coarse.as_array())
}

#[pyfunction]
fn max_block_deviation(fine: PyReadonlyArray3<'_, f64>, coarse: PyReadonlyArray3<'_, f64>) -> PyResult<f64> {
    metrics::max_block_deviation(fine.as_array(), coarse.as_array()).map_err(to_py_err)
}

pub fn register(parent: &Bound<'_, PyModule>) -> PyResult<()> {
    let m = PyModule::new(parent.py(), "metrics")?;
    m.add_function(wrap_pyfunction!(total_volume, &m)?)?;
    m.add_function(wrap_pyfunction!(relative_volume_error, &m)?)?;
    m.add_function(wrap_pyfunction!(max_block_deviation, &m)?)?;
    parent.add_submodule(&m)?;
    Ok(())
}
