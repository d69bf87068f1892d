use timeseries_cache_core::{CacheError, codec::CodecError};

use snafu::Snafu;

pub type CliResult<T> = std::result::Result<T, CliError>;

/// Exit code for a lookup that found no usable value.
pub const EXIT_GAP: i32 = 2;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CliError {
    #[snafu(display(
        "Invalid time '{text}'. Use days since 1950-01-01, an RFC 3339 \
         timestamp or a YYYY-MM-DD date."
    ))]
    InvalidTime { text: String },

    #[snafu(display("Unknown OMNI2 field '{field}'. Known fields: {known}"))]
    UnknownField { field: String, known: String },

    #[snafu(display("Invalid --max-distance {value}: must be a finite, non-negative number of hours"))]
    InvalidDistance { value: f64 },

    #[snafu(display("Failed to open the OMNI2 cache in {dir}"))]
    OpenCache {
        dir: String,
        #[snafu(source(from(CacheError, Box::new)))]
        source: Box<CacheError>,
    },

    #[snafu(display("{source}"))]
    Query {
        #[snafu(source(from(CacheError, Box::new)))]
        source: Box<CacheError>,
    },

    #[snafu(display("Failed to save the cache file: {source}"))]
    SaveCache {
        #[snafu(source(from(CacheError, Box::new)))]
        source: Box<CacheError>,
    },

    #[snafu(display("Cache file not found or not accessible: {path}"))]
    CacheFileMissing {
        path: String,
        source: std::io::Error,
    },

    #[snafu(display("Not a readable cache file: {path}: {source}"))]
    InspectCacheFile { path: String, source: CodecError },

    #[snafu(display("Failed to write output: {source}"))]
    WriteOutput { source: std::io::Error },
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Query { source } if source.is_gap() => EXIT_GAP,
            _ => 1,
        }
    }
}
