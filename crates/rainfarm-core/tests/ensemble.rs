//! Ensemble runs against real and failing sinks.

use ndarray::Array3;
use rainfarm_core::{
    DirectorySink, DownscaleConfig, Downscaler, MemberRecord, MemberSink, RainfarmError,
    SourceField, SpectralSlopes,
};

fn source() -> SourceField {
    SourceField::new(Array3::from_shape_fn((8, 8, 4), |(i, j, t)| {
        0.5 + ((i * 3 + j * 5 + t) % 6) as f64
    }))
    .unwrap()
}

fn config() -> DownscaleConfig {
    DownscaleConfig::new()
        .with_ratios(2, 2)
        .with_ensemble(0, 5)
        .with_fixed_slopes(SpectralSlopes::new(1.8, 0.5).unwrap())
        .with_seed(77)
}

fn run(config: &DownscaleConfig) -> Vec<MemberRecord> {
    let downscaler = Downscaler::prepare(&source(), config, None, None).unwrap();
    let mut sink: Vec<MemberRecord> = Vec::new();
    downscaler.run_ensemble(&mut sink).unwrap();
    sink.sort_by_key(|r| r.header.member_id);
    sink
}

// -- Parallelism --

#[test]
fn parallel_and_sequential_runs_agree() {
    let sequential = run(&config().with_workers(1));
    let parallel = run(&config().with_workers(4).with_queue_depth(1));
    assert_eq!(sequential.len(), 6);
    assert_eq!(sequential, parallel);
}

#[test]
fn members_differ_from_each_other() {
    let members = run(&config().with_workers(2));
    assert_ne!(members[0].values, members[1].values);
    assert_eq!(members[3].header.seed, 80);
}

// -- Sinks --

struct FailAfter {
    remaining: usize,
}

impl MemberSink for FailAfter {
    fn write(&mut self, _record: MemberRecord) -> rainfarm_core::Result<()> {
        if self.remaining == 0 {
            return Err(RainfarmError::Io(std::io::Error::other("disk full")));
        }
        self.remaining -= 1;
        Ok(())
    }
}

#[test]
fn failing_sink_aborts_with_its_error() {
    let downscaler = Downscaler::prepare(&source(), &config().with_workers(3), None, None).unwrap();
    let mut sink = FailAfter { remaining: 2 };
    let err = downscaler.run_ensemble(&mut sink).unwrap_err();
    assert!(err.to_string().contains("disk full"), "unexpected error: {err}");
}

#[test]
fn directory_sink_persists_every_member() {
    let dir = tempfile::tempdir().unwrap();
    let downscaler = Downscaler::prepare(&source(), &config(), None, None).unwrap();
    let mut sink = DirectorySink::new(dir.path().join("members"), "rain").unwrap();
    let summary = downscaler.run_ensemble(&mut sink).unwrap();
    assert_eq!(summary.member_ids, (0..=5).collect::<Vec<u32>>());

    let in_memory = run(&config());
    for (id, expected) in summary.member_ids.iter().zip(&in_memory) {
        let loaded = sink.load(*id).unwrap();
        assert_eq!(&loaded, expected);
    }
}

#[test]
fn referencing_an_unwritten_member_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let downscaler =
        Downscaler::prepare(&source(), &config().with_ensemble(0, 1), None, None).unwrap();
    let mut sink = DirectorySink::new(dir.path(), "rain").unwrap();
    downscaler.run_ensemble(&mut sink).unwrap();

    assert!(sink.load(1).is_ok());
    match sink.load(2) {
        Err(RainfarmError::MissingMember { id, path }) => {
            assert_eq!(id, 2);
            assert!(path.ends_with("rain_0002.rfm"));
        }
        other => panic!("expected a missing member, got {other:?}"),
    }
}
