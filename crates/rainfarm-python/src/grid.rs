use numpy::PyReadonlyArray1;
use pyo3::prelude::*;

use crate::convert::{grid, to_py_err};
use rainfarm_core::grid::{self as core_grid, GridWindow};

define_accessor_result! {
    /// Inclusive index window of the native grid covering a reference grid.
    pub struct Window from GridWindow {
        i_min: usize, i_max: usize, j_min: usize, j_max: usize,
        pixels: usize, resolution: usize,
    }
}

#[pymethods]
impl Window {
    fn __repr__(&self) -> String {
        format!(
            "Window(x=[{}..={}], y=[{}..={}], pixels={}, resolution={})",
            self.i_min, self.i_max, self.j_min, self.j_max, self.pixels, self.resolution
        )
    }
}

#[pyfunction]
#[pyo3(signature = (native_x, native_y, reference_x, reference_y, ratio_s, buffer_km=0.0))]
fn grid_window(
    native_x: PyReadonlyArray1<'_, f64>,
    native_y: PyReadonlyArray1<'_, f64>,
    reference_x: PyReadonlyArray1<'_, f64>,
    reference_y: PyReadonlyArray1<'_, f64>,
    ratio_s: usize,
    buffer_km: f64,
) -> PyResult<Window> {
    let native = grid(&native_x, &native_y, "native")?;
    let reference = grid(&reference_x, &reference_y, "reference")?;
    let mapping = core_grid::map_grids(&native, &reference, ratio_s, buffer_km).map_err(to_py_err)?;
    Ok(Window::from_core(&mapping.window))
}

pub fn register(parent: &Bound<'_, PyModule>) -> PyResult<()> {
    let m = PyModule::new(parent.py(), "grid")?;
    m.add_function(wrap_pyfunction!(grid_window, &m)?)?;
    m.add_class::<Window>()?;
    parent.add_submodule(&m)?;
    Ok(())
}
