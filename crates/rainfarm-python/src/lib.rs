#[macro_use]
mod macros;
mod convert;

mod conservation;
mod downscale;
mod grid;
mod metrics;
mod regrid;
mod spectral;
mod synthesis;

use pyo3::prelude::*;

/// Register a submodule in sys.modules so `from parent.child import ...` works.
fn register_submodule(py: Python<'_>, parent_name: &str, child: &Bound<'_, PyModule>) -> PyResult<()> {
    let child_name = child.name()?;
    let full_name = format!("{}.{}", parent_name, child_name);
    let sys = py.import("sys")?;
    let modules = sys.getattr("modules")?;
    modules.set_item(full_name, child)?;
    Ok(())
}

#[pyfunction]
fn rust_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[pymodule]
fn _core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    let py = m.py();
    let parent_name = m.name()?.to_string();

    m.add_function(wrap_pyfunction!(rust_version, m)?)?;

    conservation::register(m)?;
    downscale::register(m)?;
    grid::register(m)?;
    metrics::register(m)?;
    regrid::register(m)?;
    spectral::register(m)?;
    synthesis::register(m)?;

    // Register submodules in sys.modules for `from rainfarm._core.X import ...`
    for name in &[
        "conservation",
        "downscale",
        "grid",
        "metrics",
        "regrid",
        "spectral",
        "synthesis",
    ] {
        let sub = m.getattr(*name)?;
        register_submodule(py, &parent_name, sub.downcast::<PyModule>()?)?;
    }

    Ok(())
}
