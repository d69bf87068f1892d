//! Cache configuration.
//!
//! `CacheConfig` is plain serde data so it can live in a JSON file next to
//! the application's other settings:
//!
//! ```json
//! {
//!   "unit_size": 30.0,
//!   "margin": { "kind": "fixed", "units": 2 },
//!   "max_units_per_fetch": 24,
//!   "max_sample_spacing": 0.0834,
//!   "cache_file": "omni2.tscache"
//! }
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use snafu::{ResultExt, ensure};

use crate::{
    discretize::Discretizer,
    error::{CacheResult, ConfigParseSnafu, InvalidConfigSnafu},
};

/// How many extra units to fetch on each side of a request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MarginPolicy {
    /// Constant number of units.
    Fixed {
        /// Units added on each side.
        units: u32,
    },
    /// A fraction of the request length, clamped to `[min_units, max_units]`.
    Proportional {
        /// Margin per side as a fraction of the requested unit count.
        ratio: f64,
        /// Lower clamp.
        min_units: u32,
        /// Upper clamp.
        max_units: u32,
    },
}

impl Default for MarginPolicy {
    fn default() -> Self {
        MarginPolicy::Fixed { units: 0 }
    }
}

impl MarginPolicy {
    /// Margin per side for a request spanning `requested_units` units.
    pub fn margin_units(&self, requested_units: u64) -> u32 {
        match *self {
            MarginPolicy::Fixed { units } => units,
            MarginPolicy::Proportional {
                ratio,
                min_units,
                max_units,
            } => {
                let raw = (requested_units as f64 * ratio).ceil();
                let raw = if raw.is_finite() && raw > 0.0 {
                    raw.min(u32::MAX as f64) as u32
                } else {
                    0
                };
                raw.clamp(min_units, max_units.max(min_units))
            }
        }
    }
}

/// Settings of one segment cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Length of one cache unit on the time axis.
    pub unit_size: f64,

    /// Proactive fill margin used by `SegmentCache::request`.
    #[serde(default)]
    pub margin: MarginPolicy,

    /// Longest run of units handed to the adapter in one call.
    #[serde(default)]
    pub max_units_per_fetch: Option<u64>,

    /// Consecutive samples further apart than this are reported as a gap.
    #[serde(default)]
    pub max_sample_spacing: Option<f64>,

    /// Where the store is persisted; `None` keeps it in memory only.
    #[serde(default)]
    pub cache_file: Option<PathBuf>,
}

impl CacheConfig {
    /// In-memory config with the given unit size and defaults otherwise.
    pub fn new(unit_size: f64) -> Self {
        Self {
            unit_size,
            margin: MarginPolicy::default(),
            max_units_per_fetch: None,
            max_sample_spacing: None,
            cache_file: None,
        }
    }

    /// Set the margin policy.
    pub fn with_margin(mut self, margin: MarginPolicy) -> Self {
        self.margin = margin;
        self
    }

    /// Cap the number of units per adapter call.
    pub fn with_max_units_per_fetch(mut self, max: u64) -> Self {
        self.max_units_per_fetch = Some(max);
        self
    }

    /// Report gaps between samples further apart than `spacing`.
    pub fn with_max_sample_spacing(mut self, spacing: f64) -> Self {
        self.max_sample_spacing = Some(spacing);
        self
    }

    /// Persist the store at `path`.
    pub fn with_cache_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_file = Some(path.into());
        self
    }

    /// Parse and validate a JSON config.
    pub fn from_json(text: &str) -> CacheResult<Self> {
        let config: CacheConfig = serde_json::from_str(text).context(ConfigParseSnafu)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the cache cannot work with.
    pub fn validate(&self) -> CacheResult<()> {
        Discretizer::new(self.unit_size)?;

        if let Some(spacing) = self.max_sample_spacing {
            ensure!(
                spacing.is_finite() && spacing > 0.0,
                InvalidConfigSnafu {
                    message: format!("max_sample_spacing must be positive, got {spacing}"),
                }
            );
        }

        ensure!(
            self.max_units_per_fetch != Some(0),
            InvalidConfigSnafu {
                message: "max_units_per_fetch must be at least 1",
            }
        );

        if let MarginPolicy::Proportional {
            ratio,
            min_units,
            max_units,
        } = self.margin
        {
            ensure!(
                ratio.is_finite() && ratio >= 0.0,
                InvalidConfigSnafu {
                    message: format!("margin ratio must be non-negative, got {ratio}"),
                }
            );
            ensure!(
                min_units <= max_units,
                InvalidConfigSnafu {
                    message: format!("margin min_units {min_units} exceeds max_units {max_units}"),
                }
            );
        }
        Ok(())
    }
}
