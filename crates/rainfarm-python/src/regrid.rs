use numpy::{IntoPyArray, PyArray3, PyReadonlyArray1, PyReadonlyArray3};
use pyo3::prelude::*;

use crate::convert::{grid, to_py_err};
use rainfarm_core::RegridMapping;

/// Area-weighted regridding of an (x, y, t) field; uncovered cells are NaN.
#[pyfunction]
fn conservative_regrid<'py>(
    py: Python<'py>,
    field: PyReadonlyArray3<'py, f64>,
    source_x: PyReadonlyArray1<'py, f64>,
    source_y: PyReadonlyArray1<'py, f64>,
    dest_x: PyReadonlyArray1<'py, f64>,
    dest_y: PyReadonlyArray1<'py, f64>,
) -> PyResult<Bound<'py, PyArray3<f64>>> {
    let source = grid(&source_x, &source_y, "source")?;
    let dest = grid(&dest_x, &dest_y, "dest")?;
    let out = RegridMapping::build(&source, &dest)
        .and_then(|mapping| mapping.apply3(field.as_array()))
        .map_err(to_py_err)?;
    Ok(out.into_pyarray(py))
}

pub fn register(parent: &Bound<'_, PyModule>) -> PyResult<()> {
    let m = PyModule::new(parent.py(), "regrid")?;
    m.add_function(wrap_pyfunction!(conservative_regrid, &m)?)?;
    parent.add_submodule(&m)?;
    Ok(())
}
