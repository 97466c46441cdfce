use chrono::{NaiveDate, TimeDelta};
use ndarray::Array3;
use rainfarm_core::grid::AxisCoords;
use rainfarm_core::metrics::relative_volume_error;
use rainfarm_core::{
    DirectorySink, DownscaleConfig, DownscaleRequest, Downscaler, OutputGrid, RegularGrid,
    SourceField,
};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // 0.25 degree native grid, 24 six-hourly steps of a drifting storm (mm/6h)
    let native = RegularGrid::new(AxisCoords::new(5.0, 0.25, 32)?, AxisCoords::new(40.0, 0.25, 32)?);
    let precip = Array3::from_shape_fn((32, 32, 24), |(i, j, t)| {
        let cx = 8.0 + 0.6 * t as f64;
        let cy = 12.0 + 0.3 * t as f64;
        let r2 = (i as f64 - cx).powi(2) + (j as f64 - cy).powi(2);
        12.0 * (-r2 / 30.0).exp()
    });
    let field = SourceField::new(precip)?;

    // 0.05 degree reference grid over the storm track
    let reference = RegularGrid::new(AxisCoords::new(7.0, 0.05, 40)?, AxisCoords::new(43.0, 0.05, 30)?);

    let config = DownscaleConfig::new()
        .with_ratios(4, 3)
        .with_ensemble(0, 5)
        .with_seed(20240601);
    let start = NaiveDate::from_ymd_opt(2024, 6, 1)
        .and_then(|d| d.and_hms_opt(6, 0, 0))
        .ok_or("invalid start date")?;

    let request = DownscaleRequest {
        field: &field,
        native_grid: native,
        reference_grid: reference,
        start,
        native_step: TimeDelta::hours(6),
        output: OutputGrid::Nearest,
        template: None,
        gather: None,
        regrid: None,
    };
    let downscaler = Downscaler::from_request(request, &config)?;

    let dir = tempfile::tempdir()?;
    let mut sink = DirectorySink::new(dir.path(), "storm")?;
    let summary = downscaler.run_ensemble(&mut sink)?;

    if let Some(s) = summary.slopes {
        println!("Slopes: sx={:.3} sy={:.3} st={:.3}", s.sx(), s.sy(), s.st());
    }
    println!("Seed: {}", summary.base_seed);
    println!();
    println!("Member |  Shape        |  Mean  |   Max   | Fine vs window mean");
    println!("-------|---------------|--------|---------|--------------------");
    let reliable = downscaler.reliable();
    for &id in &summary.member_ids {
        let record = sink.load(id)?;
        let values = &record.values;
        let mean = values.mean().unwrap_or(0.0);
        let max = values.iter().copied().fold(0.0, f64::max);
        let (x, y, t) = values.dim();
        println!(
            "  {:>4} | {:>3}x{:>3}x{:>3}   | {:>6.3} | {:>7.3} | {:>+18.2}%",
            id,
            x,
            y,
            t,
            mean,
            max,
            100.0 * relative_volume_error(values.view(), reliable.view())
        );
    }
    println!("\nMembers written to {}", sink.dir().display());
    Ok(())
}
