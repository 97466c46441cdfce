/// Pure Rust core benchmarks for the downscaling pipeline.
///
/// Uses std::time::Instant for timing, a deterministic LCG PRNG for data generation,
/// and std::hint::black_box to prevent dead-code elimination.
use std::hint::black_box;
use std::time::{Duration, Instant};

use ndarray::Array3;
use rainfarm_core::fft::Fft3;
use rainfarm_core::spectral::analyze;
use rainfarm_core::synthesis::{member_rng, realize};
use rainfarm_core::{
    AmplitudeTemplate, DownscaleConfig, Downscaler, MemberRecord, SourceField, SpectralFitBands,
    SpectralSlopes,
};
use tracing_subscriber::EnvFilter;

const REPEATS: usize = 7;

/// Simple LCG PRNG for deterministic data generation.
fn make_field(n: usize, nt: usize, seed: u64) -> Array3<f64> {
    let mut state = seed;
    let mut next_f64 = || -> f64 {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (state >> 33) as f64 / (1u64 << 31) as f64
    };
    Array3::from_shape_simple_fn((n, n, nt), || next_f64() * 10.0)
}

/// Run a closure `REPEATS` times, return the median duration.
fn median_time<F: FnMut()>(mut f: F) -> Duration {
    let mut times: Vec<Duration> = (0..REPEATS)
        .map(|_| {
            let start = Instant::now();
            f();
            start.elapsed()
        })
        .collect();
    times.sort();
    times[REPEATS / 2]
}

fn slopes() -> SpectralSlopes {
    SpectralSlopes::new(1.7, 0.6).expect("valid slopes")
}

fn bench_analyze(sizes: &[(usize, usize)]) -> Vec<(&'static str, String, Duration)> {
    let bands = SpectralFitBands::default();
    let mut results = Vec::new();

    for &(n, nt) in sizes {
        let field = make_field(n, nt, 42);

        // Warmup
        let _ = black_box(analyze(field.view(), &bands));

        let dur = median_time(|| {
            let _ = black_box(analyze(field.view(), &bands));
        });
        results.push(("analyze", format!("{n}x{n}x{nt}"), dur));
    }
    results
}

fn bench_template(sizes: &[(usize, usize)]) -> Vec<(&'static str, String, Duration)> {
    let mut results = Vec::new();

    for &(ns, nt) in sizes {
        black_box(AmplitudeTemplate::new(ns, nt, slopes()).expect("template"));

        let dur = median_time(|| {
            black_box(AmplitudeTemplate::new(ns, nt, slopes()).expect("template"));
        });
        results.push(("template", format!("{ns}x{ns}x{nt}"), dur));
    }
    results
}

fn bench_realize(sizes: &[(usize, usize)]) -> Vec<(&'static str, String, Duration)> {
    let mut results = Vec::new();

    for &(ns, nt) in sizes {
        let template = AmplitudeTemplate::new(ns, nt, slopes()).expect("template");
        let mut fft = Fft3::new((ns, ns, nt)).expect("fft plan");
        let mut id = 0u32;

        black_box(realize(&template, &mut member_rng(1, id), &mut fft).expect("realize"));

        let dur = median_time(|| {
            id += 1;
            black_box(realize(&template, &mut member_rng(1, id), &mut fft).expect("realize"));
        });
        results.push(("realize", format!("{ns}x{ns}x{nt}"), dur));
    }
    results
}

fn bench_ensemble(sizes: &[(usize, usize, u32)]) -> Vec<(&'static str, String, Duration)> {
    let mut results = Vec::new();

    for &(n, nt, members) in sizes {
        let field = SourceField::new(make_field(n, nt, 7)).expect("valid field");
        let config = DownscaleConfig::new()
            .with_ratios(4, 2)
            .with_ensemble(0, members - 1)
            .with_fixed_slopes(slopes())
            .with_seed(3);
        let downscaler = Downscaler::prepare(&field, &config, None, None).expect("prepare");

        let dur = median_time(|| {
            let mut sink: Vec<MemberRecord> = Vec::new();
            black_box(downscaler.run_ensemble(&mut sink).expect("ensemble"));
            black_box(sink);
        });
        results.push(("ensemble", format!("{n}x{n}x{nt} m={members}"), dur));
    }
    results
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("Pure Rust Core Benchmarks");
    println!("============================================================");
    println!("{:<12} {:>18}   {:>12}", "Stage", "Size", "Median (ms)");
    println!("--------------------------------------------");

    let mut all_results: Vec<(&str, String, Duration)> = Vec::new();

    all_results.extend(bench_analyze(&[(32, 16), (64, 32)]));
    all_results.extend(bench_template(&[(64, 32), (128, 64)]));
    all_results.extend(bench_realize(&[(64, 32), (128, 64)]));
    all_results.extend(bench_ensemble(&[(16, 8, 8), (32, 16, 8)]));

    for (stage, size, dur) in &all_results {
        let ms = dur.as_secs_f64() * 1000.0;
        println!("{:<12} {:>18}      {:>8.2}", stage, size, ms);
    }

    println!("============================================================");
}
