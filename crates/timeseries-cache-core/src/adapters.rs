//! Fetch adapters for the datasets this crate ships with.
//!
//! - [`omni2`]: hourly averaged solar-wind and activity indices read from
//!   fixed-column yearly text files that are downloaded on demand.
//! - [`ephemeris`]: satellite positions obtained from a trajectory service
//!   per time range and sampling resolution.
pub mod ephemeris;
pub mod omni2;
