//! Versioned binary format for a persisted segment store.
//!
//! # Layout
//!
//! All integers and floats are little-endian.
//!
//! ```text
//! magic            8 bytes  "TSCACHE\0"
//! format version   u16
//! header length    u32
//! header           JSON (CacheFileHeader: fingerprint, writer, unit count)
//! unit records     repeated `unit_count` times:
//!     index        i64
//!     span begin   f64
//!     span end     f64
//!     kind         u8   (0 = empty marker, 1 = samples)
//!     resolution   u8 flag, then f64 if the flag is 1
//!     [samples]    u32 sample count, u16 column count,
//!                  times, then each column, as f64
//! ```
//!
//! Decoding is all-or-nothing: a fingerprint mismatch, a short buffer,
//! trailing bytes, or a record that breaks the unit contract rejects the
//! whole file.

use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::{
    discretize::{Discretizer, TimeSpan, UnitIndex},
    fetch::DatasetDescriptor,
    unit::{CacheUnit, FieldSpec, SampleBlock},
};

/// File signature.
pub const MAGIC: &[u8; 8] = b"TSCACHE\0";

/// Current record format version.
pub const FORMAT_VERSION: u16 = 1;

const KIND_EMPTY: u8 = 0;
const KIND_SAMPLES: u8 = 1;

/// Everything that must match for a cache file to be trusted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Dataset identifier.
    pub dataset_id: String,
    /// Unit size of the discretizer.
    pub unit_size: f64,
    /// Inclusive start of the global boundary.
    pub global_begin: f64,
    /// Exclusive end of the global boundary.
    pub global_end: f64,
    /// Field identities in column order.
    pub fields: Vec<FieldSpec>,
    /// Bit pattern of the fill sentinel (NaN is not representable in JSON).
    pub fill_value_bits: u64,
}

impl Fingerprint {
    /// Fingerprint of a live dataset.
    pub fn of(descriptor: &DatasetDescriptor, discretizer: &Discretizer) -> Self {
        Self {
            dataset_id: descriptor.id.clone(),
            unit_size: discretizer.unit_size(),
            global_begin: descriptor.bounds.begin(),
            global_end: descriptor.bounds.end(),
            fields: descriptor.schema.fields().to_vec(),
            fill_value_bits: descriptor.schema.fill_value().to_bits(),
        }
    }
}

/// JSON header preceding the unit records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheFileHeader {
    /// Dataset fingerprint.
    pub fingerprint: Fingerprint,
    /// Name and version of the writing library.
    pub writer: String,
    /// Number of unit records that follow.
    pub unit_count: u64,
}

/// Summary of a cache file, readable without a live dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheFileSummary {
    /// Format version found in the file.
    pub format_version: u16,
    /// Parsed header.
    pub header: CacheFileHeader,
    /// Per-unit `(index, sample count, is empty marker)`.
    pub units: Vec<(UnitIndex, usize, bool)>,
}

/// Errors from encoding or decoding a cache file.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CodecError {
    /// The file does not start with the cache signature.
    #[snafu(display("Not a cache file (bad magic)"))]
    BadMagic,

    /// The file was written by an incompatible format version.
    #[snafu(display("Unsupported cache format version {found} (expected {FORMAT_VERSION})"))]
    UnsupportedVersion {
        /// Version found in the file.
        found: u16,
    },

    /// The JSON header could not be read or written.
    #[snafu(display("Invalid cache file header: {source}"))]
    Header {
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// The file belongs to a differently shaped dataset.
    #[snafu(display("Cache fingerprint mismatch: expected {expected:?}, found {found:?}"))]
    FingerprintMismatch {
        /// Fingerprint of the live dataset.
        expected: Box<Fingerprint>,
        /// Fingerprint stored in the file.
        found: Box<Fingerprint>,
    },

    /// The buffer ended in the middle of a record.
    #[snafu(display("Cache file truncated while reading {what}"))]
    Truncated {
        /// Element being read.
        what: &'static str,
    },

    /// A record breaks the unit contract.
    #[snafu(display("Inconsistent cache record: {message}"))]
    Inconsistent {
        /// What was wrong.
        message: String,
    },

    /// Bytes remain after the declared number of records.
    #[snafu(display("{count} trailing bytes after the last unit record"))]
    TrailingBytes {
        /// Number of unread bytes.
        count: usize,
    },
}

impl CodecError {
    /// True when the file is well-formed but belongs to another dataset
    /// shape or format version.
    pub fn is_incompatible(&self) -> bool {
        matches!(
            self,
            CodecError::FingerprintMismatch { .. } | CodecError::UnsupportedVersion { .. }
        )
    }
}

/// Encode `units` (in index order) under `fingerprint`.
pub fn encode<'a>(
    fingerprint: &Fingerprint,
    units: impl ExactSizeIterator<Item = &'a CacheUnit>,
) -> Result<Vec<u8>, CodecError> {
    let header = CacheFileHeader {
        fingerprint: fingerprint.clone(),
        writer: concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION")).to_string(),
        unit_count: units.len() as u64,
    };
    let header_json = serde_json::to_vec(&header).context(HeaderSnafu)?;

    let mut buf = BytesMut::with_capacity(MAGIC.len() + 6 + header_json.len());
    buf.put_slice(MAGIC);
    buf.put_u16_le(FORMAT_VERSION);
    buf.put_u32_le(header_json.len() as u32);
    buf.put_slice(&header_json);

    for unit in units {
        put_unit(&mut buf, unit)?;
    }
    Ok(buf.to_vec())
}

fn put_unit(buf: &mut BytesMut, unit: &CacheUnit) -> Result<(), CodecError> {
    buf.put_i64_le(unit.index());
    buf.put_f64_le(unit.span().begin());
    buf.put_f64_le(unit.span().end());

    match unit.samples() {
        None => buf.put_u8(KIND_EMPTY),
        Some(_) => buf.put_u8(KIND_SAMPLES),
    }

    match unit.resolution() {
        Some(r) => {
            buf.put_u8(1);
            buf.put_f64_le(r);
        }
        None => buf.put_u8(0),
    }

    if let Some(block) = unit.samples() {
        let n = u32::try_from(block.len()).map_err(|_| CodecError::Inconsistent {
            message: format!("unit {} has too many samples to encode", unit.index()),
        })?;
        let cols = u16::try_from(block.columns().len()).map_err(|_| CodecError::Inconsistent {
            message: format!("unit {} has too many columns to encode", unit.index()),
        })?;
        buf.put_u32_le(n);
        buf.put_u16_le(cols);
        for t in block.times() {
            buf.put_f64_le(*t);
        }
        for col in block.columns() {
            for v in col {
                buf.put_f64_le(*v);
            }
        }
    }
    Ok(())
}

fn need(buf: &&[u8], n: usize, what: &'static str) -> Result<(), CodecError> {
    ensure!(buf.remaining() >= n, TruncatedSnafu { what });
    Ok(())
}

fn read_header(buf: &mut &[u8]) -> Result<(u16, CacheFileHeader), CodecError> {
    need(buf, MAGIC.len(), "magic")?;
    ensure!(&buf[..MAGIC.len()] == MAGIC, BadMagicSnafu);
    buf.advance(MAGIC.len());

    need(buf, 2, "format version")?;
    let version = buf.get_u16_le();
    ensure!(
        version == FORMAT_VERSION,
        UnsupportedVersionSnafu { found: version }
    );

    need(buf, 4, "header length")?;
    let header_len = buf.get_u32_le() as usize;
    need(buf, header_len, "header")?;
    let header: CacheFileHeader =
        serde_json::from_slice(&buf[..header_len]).context(HeaderSnafu)?;
    buf.advance(header_len);

    Ok((version, header))
}

fn read_f64s(buf: &mut &[u8], n: usize, what: &'static str) -> Result<Vec<f64>, CodecError> {
    need(buf, n.saturating_mul(8), what)?;
    Ok((0..n).map(|_| buf.get_f64_le()).collect())
}

fn read_unit(buf: &mut &[u8], discretizer: &Discretizer) -> Result<CacheUnit, CodecError> {
    need(buf, 8 + 8 + 8 + 1 + 1, "unit record")?;
    let index = buf.get_i64_le();
    let begin = buf.get_f64_le();
    let end = buf.get_f64_le();
    let kind = buf.get_u8();
    let has_resolution = buf.get_u8();

    let resolution = match has_resolution {
        0 => None,
        1 => {
            need(buf, 8, "unit resolution")?;
            Some(buf.get_f64_le())
        }
        other => {
            return InconsistentSnafu {
                message: format!("unit {index} has resolution flag {other}"),
            }
            .fail();
        }
    };

    let span = TimeSpan::try_new(begin, end).context(InconsistentSnafu {
        message: format!("unit {index} has invalid span [{begin}, {end})"),
    })?;
    let expected_span = discretizer.try_span_of(index).context(InconsistentSnafu {
        message: format!("unit {index} lies outside the representable time range"),
    })?;
    ensure!(
        span == expected_span,
        InconsistentSnafu {
            message: format!("unit {index} span {span:?} does not match the unit size"),
        }
    );

    let unit = match kind {
        KIND_EMPTY => CacheUnit::empty(index, span),
        KIND_SAMPLES => {
            need(buf, 4 + 2, "sample counts")?;
            let n = buf.get_u32_le() as usize;
            let cols = buf.get_u16_le() as usize;
            let times = read_f64s(buf, n, "sample times")?;
            let columns = (0..cols)
                .map(|_| read_f64s(buf, n, "sample column"))
                .collect::<Result<Vec<_>, _>>()?;
            let block = SampleBlock::new(times, columns).map_err(|message| {
                CodecError::Inconsistent {
                    message: format!("unit {index}: {message}"),
                }
            })?;
            ensure!(
                block.times().iter().all(|t| span.contains(*t)),
                InconsistentSnafu {
                    message: format!("unit {index} holds samples outside its span"),
                }
            );
            CacheUnit::with_samples(index, span, block)
        }
        other => {
            return InconsistentSnafu {
                message: format!("unit {index} has unknown kind {other}"),
            }
            .fail();
        }
    };

    Ok(match resolution {
        Some(r) => unit.at_resolution(r),
        None => unit,
    })
}

/// Decode a cache file written for `expected`.
///
/// Returns the units in index order, or an error if anything about the
/// file is off; a partially decoded store is never returned.
pub fn decode(bytes: &[u8], expected: &Fingerprint) -> Result<Vec<CacheUnit>, CodecError> {
    let mut buf = bytes;
    let (_, header) = read_header(&mut buf)?;

    ensure!(
        header.fingerprint == *expected,
        FingerprintMismatchSnafu {
            expected: Box::new(expected.clone()),
            found: Box::new(header.fingerprint.clone()),
        }
    );

    let discretizer =
        Discretizer::new(expected.unit_size).map_err(|e| CodecError::Inconsistent {
            message: e.to_string(),
        })?;

    let mut units: Vec<CacheUnit> = Vec::new();
    for _ in 0..header.unit_count {
        let unit = read_unit(&mut buf, &discretizer)?;
        ensure!(
            unit.span().end() > expected.global_begin && unit.span().begin() < expected.global_end,
            InconsistentSnafu {
                message: format!("unit {} lies outside the dataset bounds", unit.index()),
            }
        );
        if let Some(prev) = units.last() {
            ensure!(
                prev.index() < unit.index(),
                InconsistentSnafu {
                    message: format!("unit {} follows unit {}", unit.index(), prev.index()),
                }
            );
        }
        if let Some(block) = unit.samples() {
            ensure!(
                block.columns().len() == expected.fields.iter().map(|f| f.components).sum::<usize>(),
                InconsistentSnafu {
                    message: format!("unit {} has the wrong column count", unit.index()),
                }
            );
        }
        units.push(unit);
    }

    ensure!(
        buf.is_empty(),
        TrailingBytesSnafu {
            count: buf.remaining()
        }
    );
    Ok(units)
}

/// Read the header and unit summary without checking the fingerprint.
pub fn inspect(bytes: &[u8]) -> Result<CacheFileSummary, CodecError> {
    let mut buf = bytes;
    let (format_version, header) = read_header(&mut buf)?;

    let discretizer = Discretizer::new(header.fingerprint.unit_size).map_err(|e| {
        CodecError::Inconsistent {
            message: e.to_string(),
        }
    })?;

    let mut units = Vec::new();
    for _ in 0..header.unit_count {
        let unit = read_unit(&mut buf, &discretizer)?;
        units.push((unit.index(), unit.sample_count(), unit.is_empty_marker()));
    }
    ensure!(
        buf.is_empty(),
        TrailingBytesSnafu {
            count: buf.remaining()
        }
    );

    Ok(CacheFileSummary {
        format_version,
        header,
        units,
    })
}
