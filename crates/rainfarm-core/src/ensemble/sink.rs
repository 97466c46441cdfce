/// Persistence of finished ensemble members.
///
/// The orchestrator hands every member to a single writer thread that owns
/// a [`MemberSink`]. [`DirectorySink`] writes one compressed file per
/// member; a plain `Vec<MemberRecord>` keeps them in memory.
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use ndarray::Array3;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::MEMBER_EXTENSION;
use crate::error::{RainfarmError, Result};
use crate::spectral::SpectralSlopes;
use crate::store::{self, FileKind};

/// Metadata stored alongside the values of a member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberHeader {
    pub member_id: u32,
    pub seed: u64,
    /// `None` for an all-zero source without fixed slopes.
    pub slopes: Option<SpectralSlopes>,
    /// Output time axis; empty when the request carried no timestamps.
    pub times: Vec<NaiveDateTime>,
    /// Output x coordinates; empty when unknown.
    pub x: Vec<f64>,
    /// Output y coordinates; empty when unknown.
    pub y: Vec<f64>,
    pub shape: [usize; 3],
}

/// One downscaled realization, as persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberRecord {
    pub header: MemberHeader,
    /// (x, y, t) values on the output grid.
    pub values: Array3<f64>,
}

/// Destination of finished members.
///
/// `write` is called from a single writer thread, once per member, in
/// completion order. An error aborts the ensemble.
pub trait MemberSink: Send {
    fn write(&mut self, record: MemberRecord) -> Result<()>;

    /// Called once after the last member was written.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

impl MemberSink for Vec<MemberRecord> {
    fn write(&mut self, record: MemberRecord) -> Result<()> {
        self.push(record);
        Ok(())
    }
}

/// Writes `<prefix>_<id:04>.rfm` files into a directory.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
    prefix: String,
}

impl DirectorySink {
    /// Create the sink, creating `dir` if needed.
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            prefix: prefix.into(),
        })
    }

    /// Sink over an existing directory, for reading members back.
    ///
    /// Nothing is created on disk; a missing directory surfaces as
    /// [`RainfarmError::MissingMember`] on load.
    pub fn open(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File that holds member `id`.
    pub fn path_for(&self, id: u32) -> PathBuf {
        self.dir
            .join(format!("{}_{id:04}.{MEMBER_EXTENSION}", self.prefix))
    }

    /// Read member `id` back.
    pub fn load(&self, id: u32) -> Result<MemberRecord> {
        let path = self.path_for(id);
        if !path.is_file() {
            return Err(RainfarmError::MissingMember { id, path });
        }
        let (header, values) = store::read_file(&path, FileKind::Member, |h: &MemberHeader, r| {
            let [nx, ny, nt] = h.shape;
            let data = store::read_f64s(r, store::element_count(&h.shape)?)?;
            let len = data.len();
            Array3::from_shape_vec((nx, ny, nt), data)
                .map_err(|_| RainfarmError::shape("member values", &h.shape, &[len]))
        })?;
        if header.member_id != id {
            return Err(RainfarmError::CorruptFile {
                path,
                reason: format!("file holds member {}", header.member_id),
            });
        }
        Ok(MemberRecord { header, values })
    }
}

impl MemberSink for DirectorySink {
    fn write(&mut self, record: MemberRecord) -> Result<()> {
        let path = self.path_for(record.header.member_id);
        store::write_file(&path, FileKind::Member, &record.header, |w| {
            store::write_f64s(w, record.values.iter().copied())
        })?;
        debug!(member_id = record.header.member_id, path = %path.display(), "member written");
        Ok(())
    }
}
