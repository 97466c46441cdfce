//! Ensemble orchestration.
//!
//! [`Downscaler::prepare`] does all the once-per-request work (slopes,
//! template, reliable-scale field, gather index). [`Downscaler::run_ensemble`]
//! then realizes members on a rayon pool, each worker owning its own FFT
//! workspace, and streams them through a bounded channel to a single writer
//! thread. The first failure stops the ensemble and is returned.

use std::ops::RangeInclusive;
use std::sync::mpsc::sync_channel;
use std::sync::Arc;
use std::thread;

use chrono::{NaiveDateTime, TimeDelta};
use ndarray::Array3;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use super::sink::{MemberHeader, MemberRecord, MemberSink};
use crate::config::DownscaleConfig;
use crate::conservation::{block_average, conserve, GatherIndex};
use crate::constants::VOLUME_TOLERANCE;
use crate::error::{RainfarmError, Result};
use crate::fft::Fft3;
use crate::field::SourceField;
use crate::grid::{map_grids, NearestIndex, RegularGrid};
use crate::metrics::max_block_deviation;
use crate::regrid::RegridMapping;
use crate::spectral::{analyze, SpectralSlopes};
use crate::synthesis::{member_rng, realize, AmplitudeTemplate};
use crate::time::TimeSchedule;

/// How a member is put on the output grid before it is persisted.
#[derive(Debug, Clone)]
pub enum Placement {
    /// Keep the fine grid.
    Fine,
    /// Sample the fine grid at the nearest cells of a reference grid.
    Nearest(NearestIndex),
    /// Conservatively regrid from the fine grid.
    Regrid(Arc<RegridMapping>),
}

/// Which [`Placement`] a full request should build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputGrid {
    Fine,
    #[default]
    Nearest,
    Conservative,
}

/// Coordinates written into every member header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputAxes {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub times: Vec<NaiveDateTime>,
}

/// A complete request on native and reference grids.
#[derive(Debug, Clone)]
pub struct DownscaleRequest<'a> {
    pub field: &'a SourceField,
    pub native_grid: RegularGrid,
    pub reference_grid: RegularGrid,
    /// Timestamp of the first native step.
    pub start: NaiveDateTime,
    pub native_step: TimeDelta,
    pub output: OutputGrid,
    /// Previously saved template for the same resolution and slopes.
    pub template: Option<AmplitudeTemplate>,
    pub gather: Option<GatherIndex>,
    /// Previously saved fine-to-reference mapping, used by `Conservative`.
    pub regrid: Option<RegridMapping>,
}

/// What an ensemble run produced.
#[derive(Debug, Clone)]
pub struct EnsembleSummary {
    /// Ids of persisted members, ascending.
    pub member_ids: Vec<u32>,
    pub base_seed: u64,
    pub slopes: Option<SpectralSlopes>,
    pub template: Option<Arc<AmplitudeTemplate>>,
}

/// Shared, read-only state of a downscaling request.
#[derive(Debug)]
pub struct Downscaler {
    config: DownscaleConfig,
    slopes: Option<SpectralSlopes>,
    template: Option<Arc<AmplitudeTemplate>>,
    gather: Option<Arc<GatherIndex>>,
    reliable: Array3<f64>,
    fine_shape: (usize, usize, usize),
    base_seed: u64,
    zero_source: bool,
    placement: Placement,
    axes: OutputAxes,
}

impl Downscaler {
    /// Validate the request and compute everything members share.
    ///
    /// `source` is the (n, n, t) field to downscale. A supplied `template` or
    /// `gather` index must match the target shapes.
    #[tracing::instrument(skip(source, config, template, gather), fields(shape = ?source.dim()))]
    pub fn prepare(
        source: &SourceField,
        config: &DownscaleConfig,
        template: Option<AmplitudeTemplate>,
        gather: Option<GatherIndex>,
    ) -> Result<Self> {
        config.validate()?;
        let (nx, ny, nt) = source.dim();
        if nx != ny {
            return Err(RainfarmError::shape("source window (must be square)", &[nx, nx, nt], &[nx, ny, nt]));
        }
        let (cs, ct) = (config.cs_sf(), config.ct_sf());
        if nx % cs != 0 || nt % ct != 0 {
            return Err(RainfarmError::config(format!(
                "source of {nx}x{ny}x{nt} cells is not divisible by the reliable scales cs_sf={cs}, ct_sf={ct}"
            )));
        }
        let ns = nx * config.ratio_s();
        let fine_nt = nt * config.ratio_t();
        if fine_nt % config.output_stride() != 0 {
            return Err(RainfarmError::config(format!(
                "{fine_nt} fine steps cannot be grouped by an output stride of {}",
                config.output_stride()
            )));
        }
        let fine_shape = (ns, ns, fine_nt);
        let reliable = block_average(source.view(), (cs, cs, ct))?;
        let base_seed = config.seed().unwrap_or_else(|| {
            let seed = rand::random::<u64>();
            info!(seed, "no seed configured, drew one from the OS");
            seed
        });

        let zero_source = source.is_all_zero();
        let (slopes, template, gather) = if zero_source {
            info!("source field is all zero, members will be zero");
            (config.fixed_slopes(), None, None)
        } else {
            let slopes = match config.fixed_slopes() {
                Some(s) => s,
                None => analyze(source.view(), config.bands())?,
            };
            let template = match template {
                Some(t) => {
                    t.ensure_shape(ns, fine_nt)?;
                    t
                }
                None => AmplitudeTemplate::new(ns, fine_nt, slopes)?,
            };
            let gather = match gather {
                Some(g) => {
                    for (what, expected, got) in [
                        ("gather index fine shape", fine_shape, g.fine_shape()),
                        ("gather index coarse shape", reliable.dim(), g.coarse_shape()),
                    ] {
                        if expected != got {
                            return Err(RainfarmError::shape(
                                what,
                                &[expected.0, expected.1, expected.2],
                                &[got.0, got.1, got.2],
                            ));
                        }
                    }
                    g
                }
                None => GatherIndex::new(fine_shape, reliable.dim())?,
            };
            (Some(slopes), Some(Arc::new(template)), Some(Arc::new(gather)))
        };

        info!(
            fine_shape = ?fine_shape,
            reliable_shape = ?reliable.dim(),
            base_seed,
            "downscaling prepared"
        );
        Ok(Self {
            config: config.clone(),
            slopes,
            template,
            gather,
            reliable,
            fine_shape,
            base_seed,
            zero_source,
            placement: Placement::Fine,
            axes: OutputAxes::default(),
        })
    }

    /// Map grids, build the time schedule, crop the source and prepare.
    #[tracing::instrument(skip(request, config))]
    pub fn from_request(request: DownscaleRequest<'_>, config: &DownscaleConfig) -> Result<Self> {
        config.validate()?;
        let mapping = map_grids(
            &request.native_grid,
            &request.reference_grid,
            config.ratio_s(),
            config.buffer_km(),
        )?;
        let (nx, ny, nt) = request.field.dim();
        if (nx, ny) != request.native_grid.dim() {
            let (gx, gy) = request.native_grid.dim();
            return Err(RainfarmError::shape("source field vs native grid", &[gx, gy, nt], &[nx, ny, nt]));
        }
        let end = i32::try_from(nt - 1)
            .ok()
            .and_then(|steps| request.native_step.checked_mul(steps))
            .and_then(|span| request.start.checked_add_signed(span))
            .ok_or_else(|| RainfarmError::config("request time span overflows"))?;
        let schedule = TimeSchedule::new(
            request.start,
            end,
            request.native_step,
            config.ct_sf(),
            config.ratio_t(),
            config.output_stride(),
        )?;
        let cropped = request.field.crop(&mapping.window)?;
        let downscaler = Self::prepare(&cropped, config, request.template, request.gather)?;

        let (placement, grid) = match request.output {
            OutputGrid::Fine => (Placement::Fine, mapping.fine_grid),
            OutputGrid::Nearest => (Placement::Nearest(mapping.nearest.clone()), mapping.reference_grid),
            OutputGrid::Conservative => {
                let regrid = match request.regrid {
                    Some(r) => r,
                    None => RegridMapping::build(&mapping.fine_grid, &mapping.reference_grid)?,
                };
                (Placement::Regrid(Arc::new(regrid)), mapping.reference_grid)
            }
        };
        downscaler.with_placement(placement)?.with_output_axes(OutputAxes {
            x: grid.x.values(),
            y: grid.y.values(),
            times: schedule.output().to_vec(),
        })
    }

    /// Use `placement` before persisting members.
    pub fn with_placement(mut self, placement: Placement) -> Result<Self> {
        let (ns, _, _) = self.fine_shape;
        match &placement {
            Placement::Fine => {}
            Placement::Nearest(index) => {
                if index.x.iter().chain(&index.y).any(|&i| i >= ns) {
                    return Err(RainfarmError::geometry(format!(
                        "nearest index points outside the {ns}x{ns} fine grid"
                    )));
                }
            }
            Placement::Regrid(mapping) => {
                if mapping.source_dim() != (ns, ns) {
                    let (a, b) = mapping.source_dim();
                    return Err(RainfarmError::shape("regrid mapping source", &[ns, ns], &[a, b]));
                }
            }
        }
        self.placement = placement;
        Ok(self)
    }

    /// Coordinates recorded in member headers; lengths must match the output.
    pub fn with_output_axes(mut self, axes: OutputAxes) -> Result<Self> {
        let (ox, oy, ot) = self.output_shape();
        let check = |what: &str, len: usize, want: usize| {
            if len != 0 && len != want {
                Err(RainfarmError::shape(format!("output {what} axis"), &[want], &[len]))
            } else {
                Ok(())
            }
        };
        check("x", axes.x.len(), ox)?;
        check("y", axes.y.len(), oy)?;
        check("time", axes.times.len(), ot)?;
        self.axes = axes;
        Ok(self)
    }

    pub fn slopes(&self) -> Option<SpectralSlopes> {
        self.slopes
    }

    pub fn template(&self) -> Option<&Arc<AmplitudeTemplate>> {
        self.template.as_ref()
    }

    pub fn gather(&self) -> Option<&Arc<GatherIndex>> {
        self.gather.as_ref()
    }

    pub fn base_seed(&self) -> u64 {
        self.base_seed
    }

    pub fn fine_shape(&self) -> (usize, usize, usize) {
        self.fine_shape
    }

    /// Source block-averaged to the reliable scales.
    pub fn reliable(&self) -> &Array3<f64> {
        &self.reliable
    }

    /// Shape of every persisted member.
    pub fn output_shape(&self) -> (usize, usize, usize) {
        let (ns, _, nt) = self.fine_shape;
        let t = nt / self.config.output_stride();
        match &self.placement {
            Placement::Fine => (ns, ns, t),
            Placement::Nearest(index) => {
                let (x, y) = index.dim();
                (x, y, t)
            }
            Placement::Regrid(mapping) => {
                let (x, y) = mapping.dest_dim();
                (x, y, t)
            }
        }
    }

    /// Member ids to run; an inverted range collapses to its start.
    pub fn member_ids(&self) -> RangeInclusive<u32> {
        let (start, end) = (self.config.ensemble_start(), self.config.ensemble_end());
        if end < start {
            warn!(start, end, "ensemble end before start, running a single member");
            start..=start
        } else {
            start..=end
        }
    }

    /// Synthesize, correct and place member `member_id`.
    pub fn realize_member(&self, member_id: u32, fft: &mut Fft3) -> Result<MemberRecord> {
        let seed = self.base_seed.wrapping_add(u64::from(member_id));
        let fine = match (&self.template, &self.gather) {
            (Some(template), Some(gather)) if !self.zero_source => {
                let mut rng = member_rng(self.base_seed, member_id);
                let r = realize(template, &mut rng, fft)?;
                let x = conserve(r, self.reliable.view(), Some(gather.as_ref()))?;
                let deviation = max_block_deviation(x.view(), self.reliable.view())?;
                if deviation > VOLUME_TOLERANCE {
                    warn!(member_id, deviation, "volume check exceeded tolerance");
                } else {
                    debug!(member_id, deviation, "volume check passed");
                }
                x
            }
            _ => Array3::zeros(self.fine_shape),
        };

        let placed = match &self.placement {
            Placement::Fine => fine,
            Placement::Nearest(index) => index.apply(fine.view())?,
            Placement::Regrid(mapping) => mapping.apply3(fine.view())?,
        };
        let stride = self.config.output_stride();
        let values = if stride > 1 {
            block_average(placed.view(), (1, 1, stride))?
        } else {
            placed
        };

        let (x, y, t) = values.dim();
        Ok(MemberRecord {
            header: MemberHeader {
                member_id,
                seed,
                slopes: self.slopes,
                times: self.axes.times.clone(),
                x: self.axes.x.clone(),
                y: self.axes.y.clone(),
                shape: [x, y, t],
            },
            values,
        })
    }

    /// Realize every member in the configured range and hand each to `sink`.
    #[tracing::instrument(skip(self, sink))]
    pub fn run_ensemble<S>(&self, sink: &mut S) -> Result<EnsembleSummary>
    where
        S: MemberSink + ?Sized,
    {
        let ids = self.member_ids();
        let mut builder = rayon::ThreadPoolBuilder::new();
        if let Some(workers) = self.config.workers() {
            builder = builder.num_threads(workers);
        }
        let pool = builder
            .build()
            .map_err(|e| RainfarmError::config(format!("cannot build worker pool: {e}")))?;
        info!(
            first = *ids.start(),
            last = *ids.end(),
            workers = pool.current_num_threads(),
            "running ensemble"
        );

        let (tx, rx) = sync_channel::<MemberRecord>(self.config.queue_depth());
        let shape = self.fine_shape;

        let (produced, written) = thread::scope(|scope| {
            let writer = thread::Builder::new()
                .name("rainfarm-writer".to_string())
                .spawn_scoped(scope, move || -> Result<Vec<u32>> {
                    let mut written = Vec::new();
                    for record in rx {
                        let id = record.header.member_id;
                        sink.write(record)?;
                        debug!(member_id = id, "member persisted");
                        written.push(id);
                    }
                    sink.finish()?;
                    Ok(written)
                });
            let writer = match writer {
                Ok(handle) => handle,
                Err(e) => return (Err(RainfarmError::Io(e)), Err(RainfarmError::WriterDisconnected)),
            };

            let tx_ref = &tx;
            let produced: Result<()> = pool.install(|| {
                ids.into_par_iter()
                    .map_init(
                        || Fft3::new(shape),
                        |fft, id| {
                            let fft = fft.as_mut().map_err(|e| RainfarmError::config(e.to_string()))?;
                            let record = self.realize_member(id, fft)?;
                            debug!(member_id = id, "member realized");
                            tx_ref.send(record).map_err(|_| RainfarmError::WriterDisconnected)
                        },
                    )
                    .collect()
            });
            drop(tx);
            let written = writer
                .join()
                .unwrap_or(Err(RainfarmError::WriterDisconnected));
            (produced, written)
        });

        let mut member_ids = match (produced, written) {
            (Ok(()), Ok(ids)) => ids,
            // the writer stopped first; its error is the cause
            (Err(RainfarmError::WriterDisconnected), Err(e)) => return Err(e),
            (Err(e), _) | (Ok(()), Err(e)) => return Err(e),
        };
        member_ids.sort_unstable();
        info!(members = member_ids.len(), "ensemble complete");
        Ok(EnsembleSummary {
            member_ids,
            base_seed: self.base_seed,
            slopes: self.slopes,
            template: self.template.clone(),
        })
    }
}
