//! Segmented cache for slow time-series data sources.
//!
//! This crate keeps data fetched from expensive sources (yearly text files
//! on a web server, a remote ephemeris service) in fixed-size units of time
//! and serves range and point queries from them:
//!
//! - A `Discretizer` mapping times to unit indices (`discretize` module).
//! - A `SegmentStore` holding at most one unit per index (`store` module),
//!   with RoaringBitmap-based coverage to find missing runs (`coverage`).
//! - A `SegmentCache` that batches missing units into one `FetchAdapter`
//!   call per run, merges units into owned arrays, reports gaps, and answers
//!   nearest-valid-sample lookups (`cache` module).
//! - A versioned, fingerprinted cache file so a cache survives restarts
//!   (`codec` and `storage` modules).
//! - Two adapters: OMNI2 hourly averages and satellite ephemerides
//!   (`adapters` module).
//!
//! Callers that show soft warnings to users can deduplicate them per
//! logical action with `WarningDeduplicationContext` (`warnings` module).
#![deny(missing_docs)]
pub mod adapters;
pub mod cache;
pub mod codec;
pub mod config;
pub mod coverage;
pub mod discretize;
pub mod error;
pub mod fetch;
pub mod helpers;
pub mod storage;
pub mod store;
pub mod unit;
pub mod warnings;

pub use cache::{
    CacheStats, LoadOutcome, SegmentCache, accept_all,
    point::PointValue,
    query::{Gap, QueryResult, RangeRequest},
};
pub use config::{CacheConfig, MarginPolicy};
pub use discretize::{Discretizer, TimeSpan, UnitIndex};
pub use error::{CacheError, CacheResult, GapCause};
pub use fetch::{DatasetDescriptor, FetchAdapter, FetchError, FetchResult};
pub use unit::{CacheUnit, DatasetSchema, FieldSpec, SampleBlock, UnitContent};
pub use warnings::{OperationId, WarningCause, WarningDeduplicationContext};
