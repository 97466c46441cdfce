//! Cross-module properties: conservation, determinism, slope recovery,
//! regrid conservativeness and cache round trips.

use approx::assert_relative_eq;
use ndarray::{Array2, Array3};
use rainfarm_core::conservation::{aggregate, conserve, GatherIndex};
use rainfarm_core::fft::Fft3;
use rainfarm_core::spectral::analyze;
use rainfarm_core::synthesis::{gaussian_field, member_rng, realize};
use rainfarm_core::{
    AmplitudeTemplate, AxisCoords, RainfarmError, RegridMapping, RegularGrid, SpectralFitBands,
    SpectralSlopes,
};

fn slopes() -> SpectralSlopes {
    SpectralSlopes::new(1.5, 0.8).unwrap()
}

fn coarse_field(n: usize, nt: usize) -> Array3<f64> {
    Array3::from_shape_fn((n, n, nt), |(i, j, t)| {
        let v = ((i * 7 + j * 11 + t * 5) % 9) as f64;
        if v < 2.0 {
            0.0
        } else {
            0.4 * v
        }
    })
}

// -- Conservation --

#[test]
fn corrected_realization_reproduces_every_block() {
    let coarse = coarse_field(8, 4);
    let template = AmplitudeTemplate::new(32, 8, slopes()).unwrap();
    let gather = GatherIndex::new((32, 32, 8), coarse.dim()).unwrap();
    let mut fft = Fft3::new(template.shape()).unwrap();

    for member in 0..3 {
        let r = realize(&template, &mut member_rng(99, member), &mut fft).unwrap();
        let x = conserve(r, coarse.view(), Some(&gather)).unwrap();
        let blocks = aggregate(x.view(), coarse.dim()).unwrap();
        for (b, c) in blocks.iter().zip(coarse.iter()) {
            assert_relative_eq!(*b, *c, max_relative = 1e-6, epsilon = 1e-12);
        }
        // s = 4, t = 2
        assert_relative_eq!(x.sum(), coarse.sum() * 16.0 * 2.0, max_relative = 1e-9);
    }
}

#[test]
fn gather_and_replication_agree() {
    let coarse = coarse_field(4, 4);
    let template = AmplitudeTemplate::new(12, 8, slopes()).unwrap();
    let mut fft = Fft3::new(template.shape()).unwrap();
    let r = realize(&template, &mut member_rng(5, 0), &mut fft).unwrap();
    let gather = GatherIndex::new((12, 12, 8), coarse.dim()).unwrap();

    let a = conserve(r.clone(), coarse.view(), Some(&gather)).unwrap();
    let b = conserve(r, coarse.view(), None).unwrap();
    assert_eq!(a, b);
}

// -- Determinism --

#[test]
fn fixed_seed_is_bit_identical_across_workspaces() {
    let template = AmplitudeTemplate::new(16, 8, slopes()).unwrap();
    let mut fft_a = Fft3::new(template.shape()).unwrap();
    let mut fft_b = Fft3::new(template.shape()).unwrap();
    let a = realize(&template, &mut member_rng(2024, 4), &mut fft_a).unwrap();
    let b = realize(&template, &mut member_rng(2024, 4), &mut fft_b).unwrap();
    assert_eq!(a, b);
}

#[test]
fn different_seeds_differ_but_both_conserve() {
    let coarse = coarse_field(4, 4);
    let template = AmplitudeTemplate::new(16, 8, slopes()).unwrap();
    let mut fft = Fft3::new(template.shape()).unwrap();
    let a = realize(&template, &mut member_rng(1, 0), &mut fft).unwrap();
    let b = realize(&template, &mut member_rng(2, 0), &mut fft).unwrap();
    assert_ne!(a, b);

    for r in [a, b] {
        let x = conserve(r, coarse.view(), None).unwrap();
        let blocks = aggregate(x.view(), coarse.dim()).unwrap();
        for (g, c) in blocks.iter().zip(coarse.iter()) {
            assert_relative_eq!(*g, *c, max_relative = 1e-6, epsilon = 1e-12);
        }
    }
}

// -- Spectral slopes --

#[test]
fn slopes_are_recovered_from_synthetic_field() {
    let template = AmplitudeTemplate::new(32, 16, slopes()).unwrap();
    let mut fft = Fft3::new(template.shape()).unwrap();
    let g = gaussian_field(&template, &mut member_rng(31, 0), &mut fft).unwrap();

    let fitted = analyze(g.view(), &SpectralFitBands::default()).unwrap();
    assert!((fitted.sx() - 1.5).abs() <= 0.2, "sx = {}", fitted.sx());
    assert!((fitted.st() - 0.8).abs() <= 0.2, "st = {}", fitted.st());
    assert_eq!(fitted.sx(), fitted.sy());
}

#[test]
fn too_small_field_cannot_be_fitted() {
    let field = coarse_field(4, 4);
    let err = analyze(field.view(), &SpectralFitBands::default()).unwrap_err();
    assert!(matches!(err, RainfarmError::InsufficientSpectrum { .. }));
}

// -- Regridding --

fn unit_grid(n: usize) -> RegularGrid {
    RegularGrid::new(
        AxisCoords::new(0.0, 1.0, n).unwrap(),
        AxisCoords::new(0.0, 1.0, n).unwrap(),
    )
}

fn bumpy_slice(n: usize) -> Array2<f64> {
    Array2::from_shape_fn((n, n), |(i, j)| 1.0 + ((i * 3 + j * 5) % 7) as f64)
}

#[test]
fn regrid_over_full_extent_conserves_volume() {
    let source = unit_grid(8);
    let dest = RegularGrid::new(
        AxisCoords::new(0.5, 2.0, 4).unwrap(),
        AxisCoords::new(0.5, 2.0, 4).unwrap(),
    );
    let values = bumpy_slice(8);
    let out = RegridMapping::build(&source, &dest)
        .unwrap()
        .apply(values.view())
        .unwrap();
    assert_relative_eq!(
        out.sum() * dest.cell_area(),
        values.sum() * source.cell_area(),
        max_relative = 1e-12
    );
}

#[test]
fn regrid_of_interior_patch_matches_supersampled_integral() {
    let source = unit_grid(8);
    // cells [0.25, 1.75], [1.75, 3.25], ... inside the source extent
    let dest = RegularGrid::new(
        AxisCoords::new(1.0, 1.5, 4).unwrap(),
        AxisCoords::new(1.0, 1.5, 4).unwrap(),
    );
    let values = bumpy_slice(8);
    let mapping = RegridMapping::build(&source, &dest).unwrap();
    assert!(mapping.uncovered_cells().is_empty());
    let out = mapping.apply(values.view()).unwrap();

    // quarter-cell supersampling is exact for edges on a 0.25 lattice
    let (lo, hi) = (0.25, 6.25);
    let mut expected = 0.0;
    for si in 0..32 {
        for sj in 0..32 {
            let x = -0.5 + 0.25 * (si as f64 + 0.5);
            let y = -0.5 + 0.25 * (sj as f64 + 0.5);
            if x > lo && x < hi && y > lo && y < hi {
                expected += values[[si / 4, sj / 4]] * 0.0625;
            }
        }
    }
    assert_relative_eq!(out.sum() * dest.cell_area(), expected, max_relative = 1e-12);
}

#[test]
fn uncovered_destination_cells_are_nan() {
    let source = unit_grid(4);
    let dest = RegularGrid::new(
        AxisCoords::new(2.0, 2.0, 3).unwrap(),
        AxisCoords::new(0.5, 2.0, 2).unwrap(),
    );
    let mapping = RegridMapping::build(&source, &dest).unwrap();
    // x cell [5, 7] lies past the source edge at 3.5
    assert_eq!(mapping.uncovered_cells(), vec![(2, 0), (2, 1)]);
    let out = mapping.apply(bumpy_slice(4).view()).unwrap();
    assert!(out[[2, 0]].is_nan());
    assert!(out[[0, 0]].is_finite());
}

// -- Caches --

#[test]
fn cached_template_realizes_identically() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("template.rft");
    let template = AmplitudeTemplate::new(16, 8, slopes()).unwrap();
    template.save(&path).unwrap();
    let loaded = AmplitudeTemplate::load(&path).unwrap();
    assert_eq!(loaded, template);

    let mut fft = Fft3::new(template.shape()).unwrap();
    let a = realize(&template, &mut member_rng(8, 1), &mut fft).unwrap();
    let b = realize(&loaded, &mut member_rng(8, 1), &mut fft).unwrap();
    assert_eq!(a, b);
}

#[test]
fn cached_regrid_mapping_applies_identically() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mapping.rfr");
    let mapping = RegridMapping::build(
        &unit_grid(8),
        &RegularGrid::new(
            AxisCoords::new(1.0, 1.5, 4).unwrap(),
            AxisCoords::new(0.75, 2.5, 3).unwrap(),
        ),
    )
    .unwrap();
    mapping.save(&path).unwrap();
    let loaded = RegridMapping::load(&path).unwrap();
    assert_eq!(loaded, mapping);
    let values = bumpy_slice(8);
    assert_eq!(
        loaded.apply(values.view()).unwrap(),
        mapping.apply(values.view()).unwrap()
    );
}

#[test]
fn cached_gather_index_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gather.rfg");
    let index = GatherIndex::new((12, 12, 6), (3, 3, 2)).unwrap();
    index.save(&path).unwrap();
    assert_eq!(GatherIndex::load(&path).unwrap(), index);
}

#[test]
fn cache_kinds_are_not_interchangeable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("template.rft");
    AmplitudeTemplate::new(8, 4, slopes()).unwrap().save(&path).unwrap();
    assert!(matches!(
        GatherIndex::load(&path),
        Err(RainfarmError::CorruptFile { .. })
    ));
}

#[test]
fn truncated_cache_is_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("template.rft");
    AmplitudeTemplate::new(16, 8, slopes()).unwrap().save(&path).unwrap();
    let bytes = std::fs::read(&path).unwrap();
    std::fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();
    assert!(matches!(
        AmplitudeTemplate::load(&path),
        Err(RainfarmError::CorruptFile { .. })
    ));
}
