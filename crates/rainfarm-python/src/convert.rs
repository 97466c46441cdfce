use ndarray::Array3;
use numpy::{PyReadonlyArray1, PyReadonlyArray3};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use rainfarm_core::{AxisCoords, RainfarmError, RegularGrid, SpectralSlopes};

/// Map a core error onto `ValueError`, keeping its message.
pub fn to_py_err(err: RainfarmError) -> PyErr {
    PyValueError::new_err(err.to_string())
}

/// Validate that a numpy array is C-contiguous and return its slice.
pub fn contiguous_slice<'py>(arr: &'py PyReadonlyArray1<'py, f64>) -> PyResult<&'py [f64]> {
    arr.as_slice()
        .map_err(|_| PyValueError::new_err("array must be C-contiguous"))
}

/// Owned copy of an (x, y, t) array after checking its dimensions are non-empty.
pub fn owned_field(arr: &PyReadonlyArray3<'_, f64>, name: &str) -> PyResult<Array3<f64>> {
    let view = arr.as_array();
    if view.shape().iter().any(|&n| n == 0) {
        return Err(PyValueError::new_err(format!(
            "{} must have non-empty axes, got shape {:?}",
            name,
            view.shape()
        )));
    }
    Ok(view.to_owned())
}

/// Uniformly spaced axis from a 1-D coordinate array.
pub fn axis(arr: &PyReadonlyArray1<'_, f64>, name: &str) -> PyResult<AxisCoords> {
    let values = contiguous_slice(arr)?;
    AxisCoords::from_values(values)
        .map_err(|e| PyValueError::new_err(format!("{}: {}", name, e)))
}

/// Rectilinear grid from x and y coordinate arrays.
pub fn grid(
    x: &PyReadonlyArray1<'_, f64>,
    y: &PyReadonlyArray1<'_, f64>,
    name: &str,
) -> PyResult<RegularGrid> {
    Ok(RegularGrid::new(
        axis(x, &format!("{name} x"))?,
        axis(y, &format!("{name} y"))?,
    ))
}

/// Slopes from an optional `(sx, st)` pair.
pub fn slopes(pair: Option<(f64, f64)>) -> PyResult<Option<SpectralSlopes>> {
    pair.map(|(sx, st)| SpectralSlopes::new(sx, st).map_err(to_py_err))
        .transpose()
}
