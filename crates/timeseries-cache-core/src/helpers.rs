//! Small helpers shared by the adapters and the CLI.
//!
//! Current helpers:
//! - Conversions between calendar time and the "days since 1950-01-01"
//!   time axis used by the bundled adapters.
pub mod day_time;
