use chrono::{NaiveDateTime, TimeDelta};
use numpy::{IntoPyArray, PyArray1, PyReadonlyArray1, PyReadonlyArray3};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};

use crate::convert::{grid, owned_field, slopes, to_py_err};
use crate::spectral::Slopes;
use rainfarm_core::{
    DirectorySink, DownscaleConfig, DownscaleRequest, Downscaler, EnsembleSummary, MemberRecord,
    OutputGrid, SourceField,
};

#[allow(clippy::too_many_arguments)]
fn build_config(
    ratio_s: usize,
    ratio_t: usize,
    ensemble: (u32, u32),
    seed: Option<u64>,
    fixed_slopes: Option<(f64, f64)>,
    reliable_scales: (usize, usize),
    workers: Option<usize>,
    output_stride: usize,
    buffer_km: f64,
) -> PyResult<DownscaleConfig> {
    let mut config = DownscaleConfig::new()
        .with_ratios(ratio_s, ratio_t)
        .with_ensemble(ensemble.0, ensemble.1)
        .with_reliable_scales(reliable_scales.0, reliable_scales.1)
        .with_output_stride(output_stride)
        .with_buffer_km(buffer_km);
    if let Some(seed) = seed {
        config = config.with_seed(seed);
    }
    if let Some(s) = slopes(fixed_slopes)? {
        config = config.with_fixed_slopes(s);
    }
    if let Some(w) = workers {
        config = config.with_workers(w);
    }
    config.validate().map_err(to_py_err)?;
    Ok(config)
}

fn output_grid(name: &str) -> PyResult<OutputGrid> {
    match name {
        "fine" => Ok(OutputGrid::Fine),
        "nearest" => Ok(OutputGrid::Nearest),
        "conservative" => Ok(OutputGrid::Conservative),
        other => Err(PyValueError::new_err(format!(
            "output must be 'fine', 'nearest' or 'conservative', got '{}'",
            other
        ))),
    }
}

fn summary_dict<'py>(py: Python<'py>, summary: &EnsembleSummary) -> PyResult<Bound<'py, PyDict>> {
    let slopes = summary.slopes.as_ref().map(Slopes::from_core);
    Ok(py_dict!(
        py,
        member_ids => summary.member_ids.clone(),
        seed => summary.base_seed,
        slopes => slopes,
    ))
}

/// Downscale a square (n, n, t) field into an in-memory ensemble.
#[pyfunction]
#[pyo3(signature = (
    field, ratio_s, ratio_t, ensemble=(0, 0), seed=None, slopes=None,
    reliable_scales=(1, 1), workers=None, output_stride=1,
))]
#[allow(clippy::too_many_arguments)]
fn downscale<'py>(
    py: Python<'py>,
    field: PyReadonlyArray3<'py, f64>,
    ratio_s: usize,
    ratio_t: usize,
    ensemble: (u32, u32),
    seed: Option<u64>,
    slopes: Option<(f64, f64)>,
    reliable_scales: (usize, usize),
    workers: Option<usize>,
    output_stride: usize,
) -> PyResult<Bound<'py, PyDict>> {
    let config = build_config(
        ratio_s,
        ratio_t,
        ensemble,
        seed,
        slopes,
        reliable_scales,
        workers,
        output_stride,
        0.0,
    )?;
    let source = SourceField::new(owned_field(&field, "field")?).map_err(to_py_err)?;

    let (summary, mut members) = py
        .allow_threads(|| -> rainfarm_core::Result<_> {
            let downscaler = Downscaler::prepare(&source, &config, None, None)?;
            let mut sink: Vec<MemberRecord> = Vec::new();
            let summary = downscaler.run_ensemble(&mut sink)?;
            Ok((summary, sink))
        })
        .map_err(to_py_err)?;
    members.sort_by_key(|r| r.header.member_id);

    let arrays = PyList::empty(py);
    for record in members {
        arrays.append(record.values.into_pyarray(py))?;
    }
    let dict = summary_dict(py, &summary)?;
    dict.set_item("members", arrays)?;
    Ok(dict)
}

/// Downscale a field on a native grid onto a reference grid, writing one
/// file per member into `directory`.
#[pyfunction]
#[pyo3(signature = (
    field, native_x, native_y, reference_x, reference_y, start, step_seconds,
    ratio_s, ratio_t, directory, prefix="rainfarm", output="nearest",
    ensemble=(0, 0), seed=None, slopes=None, reliable_scales=(1, 1),
    buffer_km=0.0, workers=None, output_stride=1,
))]
#[allow(clippy::too_many_arguments)]
fn downscale_to_directory<'py>(
    py: Python<'py>,
    field: PyReadonlyArray3<'py, f64>,
    native_x: PyReadonlyArray1<'py, f64>,
    native_y: PyReadonlyArray1<'py, f64>,
    reference_x: PyReadonlyArray1<'py, f64>,
    reference_y: PyReadonlyArray1<'py, f64>,
    start: &str,
    step_seconds: i64,
    ratio_s: usize,
    ratio_t: usize,
    directory: &str,
    prefix: &str,
    output: &str,
    ensemble: (u32, u32),
    seed: Option<u64>,
    slopes: Option<(f64, f64)>,
    reliable_scales: (usize, usize),
    buffer_km: f64,
    workers: Option<usize>,
    output_stride: usize,
) -> PyResult<Bound<'py, PyDict>> {
    let config = build_config(
        ratio_s,
        ratio_t,
        ensemble,
        seed,
        slopes,
        reliable_scales,
        workers,
        output_stride,
        buffer_km,
    )?;
    let source = SourceField::new(owned_field(&field, "field")?).map_err(to_py_err)?;
    let native_grid = grid(&native_x, &native_y, "native")?;
    let reference_grid = grid(&reference_x, &reference_y, "reference")?;
    let start: NaiveDateTime = start
        .parse()
        .map_err(|e| PyValueError::new_err(format!("start must be an ISO datetime: {}", e)))?;
    let native_step = TimeDelta::try_seconds(step_seconds)
        .ok_or_else(|| PyValueError::new_err("step_seconds is out of range"))?;
    let output = output_grid(output)?;

    let summary = py
        .allow_threads(|| -> rainfarm_core::Result<_> {
            let request = DownscaleRequest {
                field: &source,
                native_grid,
                reference_grid,
                start,
                native_step,
                output,
                template: None,
                gather: None,
                regrid: None,
            };
            let downscaler = Downscaler::from_request(request, &config)?;
            let mut sink = DirectorySink::new(directory, prefix)?;
            downscaler.run_ensemble(&mut sink)
        })
        .map_err(to_py_err)?;
    summary_dict(py, &summary)
}

/// Read one persisted member back.
#[pyfunction]
#[pyo3(signature = (directory, member_id, prefix="rainfarm"))]
fn load_member<'py>(
    py: Python<'py>,
    directory: &str,
    member_id: u32,
    prefix: &str,
) -> PyResult<Bound<'py, PyDict>> {
    let record = DirectorySink::open(directory, prefix)
        .load(member_id)
        .map_err(to_py_err)?;
    let header = record.header;
    let times: Vec<String> = header
        .times
        .iter()
        .map(|t| t.format("%Y-%m-%dT%H:%M:%S").to_string())
        .collect();
    Ok(py_dict!(
        py,
        member_id => header.member_id,
        seed => header.seed,
        values => record.values.into_pyarray(py),
        x => PyArray1::from_vec(py, header.x),
        y => PyArray1::from_vec(py, header.y),
        times => times,
        slopes => header.slopes.as_ref().map(Slopes::from_core),
    ))
}

pub fn register(parent: &Bound<'_, PyModule>) -> PyResult<()> {
    let m = PyModule::new(parent.py(), "downscale")?;
    m.add_function(wrap_pyfunction!(downscale, &m)?)?;
    m.add_function(wrap_pyfunction!(downscale_to_directory, &m)?)?;
    m.add_function(wrap_pyfunction!(load_member, &m)?)?;
    parent.add_submodule(&m)?;
    Ok(())
}
