//! Compressed binary codec shared by member files and caches.
//!
//! Layout (inside a gzip stream): magic `RFRM`, format version (u32 LE),
//! file kind (u8), JSON header length (u32 LE), JSON header, then a payload
//! of little-endian numbers whose size the header describes.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::constants::{FILE_MAGIC, FORMAT_VERSION};
use crate::error::{RainfarmError, Result};

const MAX_HEADER_BYTES: u32 = 64 << 20;
/// Upper bound on the number of payload values a header may announce.
const MAX_PAYLOAD_VALUES: usize = 1 << 30;
/// Payloads are read in chunks so a forged count cannot force a large allocation.
const READ_CHUNK: usize = 1 << 16;

/// What a file holds; checked on load so caches cannot be mixed up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FileKind {
    Member = 1,
    Template = 2,
    Regrid = 3,
    Gather = 4,
}

impl FileKind {
    fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(Self::Member),
            2 => Some(Self::Template),
            3 => Some(Self::Regrid),
            4 => Some(Self::Gather),
            _ => None,
        }
    }
}

/// Write `header` and the payload produced by `body` to `path`.
pub fn write_file<H, F>(path: &Path, kind: FileKind, header: &H, body: F) -> Result<()>
where
    H: Serialize,
    F: FnOnce(&mut dyn Write) -> io::Result<()>,
{
    let json = serde_json::to_vec(header)?;
    let json_len = u32::try_from(json.len())
        .ok()
        .filter(|&n| n <= MAX_HEADER_BYTES)
        .ok_or_else(|| RainfarmError::CorruptFile {
            path: path.to_path_buf(),
            reason: format!("header of {} bytes is too large", json.len()),
        })?;

    let mut enc = GzEncoder::new(BufWriter::new(File::create(path)?), Compression::default());
    enc.write_all(FILE_MAGIC)?;
    enc.write_u32::<LittleEndian>(FORMAT_VERSION)?;
    enc.write_u8(kind as u8)?;
    enc.write_u32::<LittleEndian>(json_len)?;
    enc.write_all(&json)?;
    body(&mut enc)?;
    enc.finish()?.flush()?;
    Ok(())
}

/// Read a file written by [`write_file`], decoding the payload with `body`.
pub fn read_file<H, T, F>(path: &Path, kind: FileKind, body: F) -> Result<(H, T)>
where
    H: DeserializeOwned,
    F: FnOnce(&H, &mut dyn Read) -> Result<T>,
{
    read_inner(path, kind, body).map_err(|e| classify(path, e))
}

fn read_inner<H, T, F>(path: &Path, kind: FileKind, body: F) -> Result<(H, T)>
where
    H: DeserializeOwned,
    F: FnOnce(&H, &mut dyn Read) -> Result<T>,
{
    let corrupt = |reason: String| RainfarmError::CorruptFile {
        path: path.to_path_buf(),
        reason,
    };
    let mut dec = GzDecoder::new(BufReader::new(File::open(path)?));

    let mut magic = [0u8; 4];
    dec.read_exact(&mut magic)?;
    if &magic != FILE_MAGIC {
        return Err(corrupt(format!("bad magic {magic:?}")));
    }
    let version = dec.read_u32::<LittleEndian>()?;
    if version != FORMAT_VERSION {
        return Err(corrupt(format!(
            "format version {version}, expected {FORMAT_VERSION}"
        )));
    }
    let found = dec.read_u8()?;
    if FileKind::from_u8(found) != Some(kind) {
        return Err(corrupt(format!("file kind {found}, expected {kind:?}")));
    }
    let json_len = dec.read_u32::<LittleEndian>()?;
    if json_len > MAX_HEADER_BYTES {
        return Err(corrupt(format!("header length {json_len} is implausible")));
    }
    let mut json = vec![0u8; json_len as usize];
    dec.read_exact(&mut json)?;
    let header: H = serde_json::from_slice(&json)?;
    let value = body(&header, &mut dec)?;
    Ok((header, value))
}

/// Truncated or undecodable streams and rejected headers are reported as
/// corrupt files.
fn classify(path: &Path, err: RainfarmError) -> RainfarmError {
    match err {
        RainfarmError::Header(e) => RainfarmError::CorruptFile {
            path: path.to_path_buf(),
            reason: format!("unreadable header: {e}"),
        },
        RainfarmError::Io(e)
            if matches!(
                e.kind(),
                ErrorKind::UnexpectedEof | ErrorKind::InvalidData | ErrorKind::InvalidInput
            ) =>
        {
            RainfarmError::CorruptFile {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        }
        other => other,
    }
}

/// Product of the dimensions in a header, rejected when it overflows or is implausible.
pub fn element_count(dims: &[usize]) -> io::Result<usize> {
    dims.iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .filter(|&n| n <= MAX_PAYLOAD_VALUES)
        .ok_or_else(|| {
            io::Error::new(
                ErrorKind::InvalidData,
                format!("header dimensions {dims:?} describe an implausible payload"),
            )
        })
}

pub fn write_f64s(w: &mut dyn Write, values: impl IntoIterator<Item = f64>) -> io::Result<()> {
    for v in values {
        w.write_f64::<LittleEndian>(v)?;
    }
    Ok(())
}

pub fn read_f64s(r: &mut dyn Read, n: usize) -> io::Result<Vec<f64>> {
    read_chunked(n, |buf: &mut [f64]| r.read_f64_into::<LittleEndian>(buf))
}

pub fn write_u64s(w: &mut dyn Write, values: impl IntoIterator<Item = u64>) -> io::Result<()> {
    for v in values {
        w.write_u64::<LittleEndian>(v)?;
    }
    Ok(())
}

pub fn read_u64s(r: &mut dyn Read, n: usize) -> io::Result<Vec<u64>> {
    read_chunked(n, |buf: &mut [u64]| r.read_u64_into::<LittleEndian>(buf))
}

fn read_chunked<T, F>(n: usize, mut fill: F) -> io::Result<Vec<T>>
where
    T: Copy + Default,
    F: FnMut(&mut [T]) -> io::Result<()>,
{
    element_count(&[n])?;
    let mut out = Vec::with_capacity(n.min(READ_CHUNK));
    while out.len() < n {
        let start = out.len();
        let take = (n - start).min(READ_CHUNK);
        out.resize(start + take, T::default());
        fill(&mut out[start..])?;
    }
    Ok(out)
}
