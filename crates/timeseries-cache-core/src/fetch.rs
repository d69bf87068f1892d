//! The seam between the cache core and slow data sources.
//!
//! A [`FetchAdapter`] turns a contiguous run of unit indices into exactly one
//! [`CacheUnit`] per index. The cache batches adjacent misses into one call,
//! so adapters should make their per-call cost, not their per-unit cost,
//! as small as possible.
//!
//! Adapters own their timeout and retry policy: every call must end in a
//! definite success or a [`FetchError`].

use std::ops::RangeInclusive;

use async_trait::async_trait;
use snafu::prelude::*;

use crate::{
    discretize::{Discretizer, TimeSpan, UnitIndex},
    storage::StorageError,
    unit::{CacheUnit, DatasetSchema, SampleBlock},
};

/// Result alias for adapter calls.
pub type FetchResult<T> = Result<T, FetchError>;

/// Static description of the dataset an adapter serves.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetDescriptor {
    /// Stable dataset identifier (persisted in the cache fingerprint).
    pub id: String,
    /// Fields and fill sentinel.
    pub schema: DatasetSchema,
    /// Global valid time boundary.
    pub bounds: TimeSpan,
}

/// Failures raised by fetch adapters.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum FetchError {
    /// The HTTP request could not be completed.
    #[snafu(display("Failed to download {url}: {source}"))]
    Download {
        /// Requested URL.
        url: String,
        /// Underlying client error.
        source: reqwest::Error,
    },

    /// The server answered with a non-success status.
    #[snafu(display("Download of {url} returned HTTP {status}"))]
    HttpStatus {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// Downloads are disabled and no local copy exists.
    #[snafu(display("No local copy of {path} and downloads are disabled"))]
    Offline {
        /// Local path that was missing.
        path: String,
    },

    /// Local source file storage failed.
    #[snafu(display("Source file storage failed: {source}"))]
    SourceStorage {
        /// Underlying storage error.
        source: StorageError,
    },

    /// A source file could not be interpreted.
    #[snafu(display("Cannot interpret {path} line {line}: {message}"))]
    Parse {
        /// File being parsed.
        path: String,
        /// 1-based line number.
        line: usize,
        /// What was wrong.
        message: String,
    },

    /// A remote service reported a failure.
    #[snafu(display("Data service failed: {message}"))]
    Service {
        /// Service-provided description.
        message: String,
    },
}

impl FetchError {
    /// Short stable failure kind, for warning deduplication.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Download { .. } | FetchError::HttpStatus { .. } => "download",
            FetchError::Offline { .. } => "offline",
            FetchError::SourceStorage { .. } => "storage",
            FetchError::Parse { .. } => "parse",
            FetchError::Service { .. } => "service",
        }
    }

    /// True when the source has no file to offer (as opposed to a broken
    /// connection or local I/O failure).
    pub fn is_missing_source(&self) -> bool {
        matches!(
            self,
            FetchError::HttpStatus { status: 404, .. } | FetchError::Offline { .. }
        )
    }

    /// Build a service failure from any message.
    pub fn service(message: impl Into<String>) -> Self {
        FetchError::Service {
            message: message.into(),
        }
    }
}

/// A data source that can produce cache units on demand.
#[async_trait]
pub trait FetchAdapter: Send + Sync {
    /// Per-call argument forwarded from the query (resolution, say).
    type Context: Send + Sync;

    /// Identity, schema and global boundary of the served dataset.
    fn descriptor(&self) -> DatasetDescriptor;

    /// Produce one unit per index in `run`, in ascending index order.
    ///
    /// Each unit's span must equal `discretizer.span_of(index)`, and every
    /// sample time must lie inside it. Indices with no source data get an
    /// empty unit, not an error.
    async fn fetch_units(
        &self,
        run: RangeInclusive<UnitIndex>,
        discretizer: &Discretizer,
        ctx: &Self::Context,
    ) -> FetchResult<Vec<CacheUnit>>;

    /// Whether `unit` may be written to and restored from the cache file.
    ///
    /// Units whose source may still change (data for the last few days,
    /// say) return `false`; they are served for the session only and
    /// fetched again after a reload.
    fn is_persistent(&self, _unit: &CacheUnit) -> bool {
        true
    }
}

/// Split time-sorted samples into one unit per index of `run`.
///
/// Samples outside the run are dropped. Units with no samples get an empty
/// `SampleBlock` when `keep_zero_sample_units` is set, and an empty marker
/// otherwise.
pub fn partition_into_units(
    run: RangeInclusive<UnitIndex>,
    discretizer: &Discretizer,
    times: &[f64],
    columns: &[Vec<f64>],
    keep_zero_sample_units: bool,
) -> FetchResult<Vec<CacheUnit>> {
    if let Some(col) = columns.iter().find(|c| c.len() != times.len()) {
        return Err(FetchError::service(format!(
            "column has {} values but there are {} times",
            col.len(),
            times.len()
        )));
    }

    let mut out = Vec::new();
    let mut cursor = 0;

    for index in run {
        let span = discretizer.span_of(index);
        let start = cursor + times[cursor..].partition_point(|t| *t < span.begin());
        let end = start + times[start..].partition_point(|t| *t < span.end());
        cursor = end;

        if start == end && !keep_zero_sample_units {
            out.push(CacheUnit::empty(index, span));
            continue;
        }

        let block_columns = columns.iter().map(|c| c[start..end].to_vec()).collect();
        let block = SampleBlock::new(times[start..end].to_vec(), block_columns)
            .map_err(FetchError::service)?;
        out.push(CacheUnit::with_samples(index, span, block));
    }
    Ok(out)
}
