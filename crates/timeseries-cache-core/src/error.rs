//! Error taxonomy for cache queries.
//!
//! Callers mostly care about three questions, answered by helper methods:
//!
//! - Can I retry later? ([`CacheError::is_retryable`])
//! - Is this a bug rather than a data condition? ([`CacheError::is_fatal`])
//! - Should the user hear about it once per action?
//!   ([`CacheError::warning_cause`])

use std::fmt;

use snafu::prelude::*;

use crate::{
    codec::CodecError, discretize::UnitIndex, fetch::FetchError, storage::StorageError,
    warnings::WarningCause,
};

/// Result alias used throughout the crate.
pub type CacheResult<T> = Result<T, CacheError>;

/// Why a point query found no usable sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GapCause {
    /// No sample lies within the allowed distance.
    NoSamples,
    /// Samples lie within the allowed distance but all carry the fill value.
    FillOnly,
    /// The unit containing the requested time holds no samples at all.
    EmptyUnit,
}

impl GapCause {
    /// Short stable identifier, used in warning keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            GapCause::NoSamples => "no-samples",
            GapCause::FillOnly => "fill-only",
            GapCause::EmptyUnit => "empty-unit",
        }
    }
}

impl fmt::Display for GapCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            GapCause::NoSamples => "no sample within the allowed distance",
            GapCause::FillOnly => "only fill values within the allowed distance",
            GapCause::EmptyUnit => "the source has no data for this time",
        };
        f.write_str(text)
    }
}

/// Errors returned by range and point queries and by cache lifecycle calls.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CacheError {
    /// Requested time lies outside the dataset's global time boundary.
    #[snafu(display("Time {time} is outside the dataset boundary [{begin}, {end})"))]
    OutOfBounds {
        /// Offending time.
        time: f64,
        /// Inclusive start of the global boundary.
        begin: f64,
        /// Exclusive end of the global boundary.
        end: f64,
    },

    /// The fetch adapter failed for a run of units. Nothing was stored.
    #[snafu(display("Fetching units {first}..={last} failed: {source}"))]
    Fetch {
        /// First unit of the failed run.
        first: UnitIndex,
        /// Last unit of the failed run.
        last: UnitIndex,
        /// Adapter failure.
        source: FetchError,
    },

    /// No valid sample was found near the requested time.
    #[snafu(display("No valid '{field}' value near time {time}: {cause}"))]
    Gap {
        /// Field that was queried.
        field: String,
        /// Requested time.
        time: f64,
        /// Unit containing the requested time.
        unit: UnitIndex,
        /// What kind of gap was hit.
        cause: GapCause,
    },

    /// A fetch adapter or cache file broke the unit contract.
    #[snafu(display("Cache invariant violated: {message}"))]
    InvariantViolation {
        /// Description of the violated contract.
        message: String,
    },

    /// The request itself is malformed (for example `begin > end`).
    #[snafu(display("Invalid request: {message}"))]
    InvalidRequest {
        /// What was wrong.
        message: String,
    },

    /// The queried field is not part of the dataset schema.
    #[snafu(display("Unknown field '{field}'"))]
    UnknownField {
        /// Requested field name.
        field: String,
    },

    /// Configuration values are unusable.
    #[snafu(display("Invalid cache configuration: {message}"))]
    InvalidConfig {
        /// What was wrong.
        message: String,
    },

    /// Configuration file could not be parsed.
    #[snafu(display("Failed to parse cache configuration: {source}"))]
    ConfigParse {
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// Reading or writing the cache file failed.
    #[snafu(display("Cache file storage failed: {source}"))]
    Storage {
        /// Underlying storage error.
        source: StorageError,
    },

    /// The cache file could not be encoded.
    #[snafu(display("Cache file encoding failed: {source}"))]
    Codec {
        /// Underlying codec error.
        source: CodecError,
    },
}

impl CacheError {
    /// True for failures a caller may retry on a later call.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CacheError::Fetch { .. } | CacheError::Storage { .. })
    }

    /// True for contract violations that indicate a bug.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CacheError::InvariantViolation { .. })
    }

    /// True for the non-fatal "no valid sample" outcome of a point query.
    pub fn is_gap(&self) -> bool {
        matches!(self, CacheError::Gap { .. })
    }

    /// Identity of this error for once-per-action user warnings.
    ///
    /// Gaps are keyed by field and cause; fetch failures by the adapter's
    /// message. Other errors are not meant to be shown as soft warnings.
    pub fn warning_cause(&self) -> Option<WarningCause> {
        match self {
            CacheError::Gap { field, cause, .. } => {
                Some(WarningCause::new(format!("gap:{field}:{}", cause.as_str())))
            }
            CacheError::Fetch { source, .. } => {
                Some(WarningCause::new(format!("fetch:{}", source.kind())))
            }
            _ => None,
        }
    }
}

pub(crate) fn invariant(message: impl Into<String>) -> CacheError {
    CacheError::InvariantViolation {
        message: message.into(),
    }
}
