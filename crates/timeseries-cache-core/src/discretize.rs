//! Mapping a continuous time axis onto fixed-size cache units.
//!
//! The mapping is deliberately tiny and stable:
//!
//! - Unit indices are signed (`i64`); unit 0 starts at time 0 and negative
//!   times map to negative indices.
//! - `unit_index_of` uses floor division, never truncation, so the mapping
//!   is monotonic across zero.
//! - `span_of` returns the half-open span `[index * size, (index + 1) * size)`
//!   of a unit. Every `t` satisfies
//!   `span_of(unit_index_of(t)).begin() <= t < span_of(unit_index_of(t)).end()`.
//!
//! The time axis itself is epoch-agnostic; callers pick the unit of time.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};
use snafu::ensure;

use crate::error::{CacheResult, InvalidConfigSnafu};

/// Integer address of one cache unit.
pub type UnitIndex = i64;

/// Half-open time interval `[begin, end)` with `begin < end`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSpan {
    begin: f64,
    end: f64,
}

impl TimeSpan {
    /// Build a span, returning `None` unless `begin < end` (NaN never is).
    pub fn try_new(begin: f64, end: f64) -> Option<Self> {
        (begin < end).then_some(Self { begin, end })
    }

    /// Build a span.
    ///
    /// # Panics
    ///
    /// Panics if `begin < end` does not hold.
    pub fn new(begin: f64, end: f64) -> Self {
        assert!(begin < end, "invalid time span [{begin}, {end})");
        Self { begin, end }
    }

    /// Inclusive start.
    pub fn begin(&self) -> f64 {
        self.begin
    }

    /// Exclusive end.
    pub fn end(&self) -> f64 {
        self.end
    }

    /// Length of the span.
    pub fn len(&self) -> f64 {
        self.end - self.begin
    }

    /// True if `t` lies inside `[begin, end)`.
    pub fn contains(&self, t: f64) -> bool {
        self.begin <= t && t < self.end
    }

    /// Smallest span containing both `self` and `other`.
    pub fn hull(&self, other: &TimeSpan) -> TimeSpan {
        TimeSpan {
            begin: self.begin.min(other.begin),
            end: self.end.max(other.end),
        }
    }

    /// Intersection with `other`, if non-empty.
    pub fn intersect(&self, other: &TimeSpan) -> Option<TimeSpan> {
        TimeSpan::try_new(self.begin.max(other.begin), self.end.min(other.end))
    }
}

/// Converts between times and unit indices for one fixed unit size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Discretizer {
    unit_size: f64,
}

impl Discretizer {
    /// Create a discretizer for positive, finite `unit_size`.
    pub fn new(unit_size: f64) -> CacheResult<Self> {
        ensure!(
            unit_size.is_finite() && unit_size > 0.0,
            InvalidConfigSnafu {
                message: format!("unit size must be positive and finite, got {unit_size}"),
            }
        );
        Ok(Self { unit_size })
    }

    /// Length of one unit on the time axis.
    pub fn unit_size(&self) -> f64 {
        self.unit_size
    }

    /// Index of the unit containing `t`.
    ///
    /// # Panics
    ///
    /// Panics if `t` is not finite or lies so far from zero that its index
    /// does not fit in an `i64`. Such a time is a caller bug.
    pub fn unit_index_of(&self, t: f64) -> UnitIndex {
        let q = (t / self.unit_size).floor();
        assert!(
            q.is_finite() && q > i64::MIN as f64 && q < i64::MAX as f64,
            "time {t} is outside the representable unit index range"
        );
        let mut index = q as i64;

        // `t / size` can round across a unit boundary; settle on the unit
        // whose computed span actually contains `t`.
        if t < index as f64 * self.unit_size {
            index -= 1;
        } else if t >= (index + 1) as f64 * self.unit_size {
            index += 1;
        }
        index
    }

    /// The half-open span covered by unit `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is `i64::MAX` or so large that neighbouring unit
    /// boundaries round to the same `f64`. Indices derived from
    /// [`Self::unit_index_of`] on finite times never hit this; use
    /// [`Self::try_span_of`] for indices read from untrusted input.
    pub fn span_of(&self, index: UnitIndex) -> TimeSpan {
        TimeSpan::new(
            index as f64 * self.unit_size,
            (index + 1) as f64 * self.unit_size,
        )
    }

    /// Like [`Self::span_of`], but `None` when unit `index` has no
    /// representable span.
    pub fn try_span_of(&self, index: UnitIndex) -> Option<TimeSpan> {
        let next = index.checked_add(1)?;
        TimeSpan::try_new(index as f64 * self.unit_size, next as f64 * self.unit_size)
    }

    /// Inclusive range of unit indices intersecting the half-open `span`.
    pub fn index_range(&self, span: &TimeSpan) -> RangeInclusive<UnitIndex> {
        let first = self.unit_index_of(span.begin());
        let mut last = self.unit_index_of(span.end());
        // The unit starting exactly at `end` does not intersect `[begin, end)`.
        if last > first && self.span_of(last).begin() >= span.end() {
            last -= 1;
        }
        first..=last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floor_not_truncation_for_negative_times() -> CacheResult<()> {
        let d = Discretizer::new(1.0)?;
        assert_eq!(d.unit_index_of(0.0), 0);
        assert_eq!(d.unit_index_of(0.999), 0);
        assert_eq!(d.unit_index_of(-0.001), -1);
        assert_eq!(d.unit_index_of(-1.0), -1);
        assert_eq!(d.unit_index_of(-1.5), -2);
        Ok(())
    }

    #[test]
    fn try_span_of_rejects_unrepresentable_indices() -> CacheResult<()> {
        let d = Discretizer::new(1.0)?;
        assert_eq!(d.try_span_of(3), Some(d.span_of(3)));
        assert_eq!(d.try_span_of(i64::MAX), None);
        // Above 2^53 neighbouring boundaries collapse to the same f64.
        assert_eq!(d.try_span_of(1 << 60), None);
        Ok(())
    }

    #[test]
    fn span_contains_its_times() -> CacheResult<()> {
        for size in [1.0, 0.1, 1.0 / 24.0, 30.0, 7.3] {
            let d = Discretizer::new(size)?;
            let mut t = -50.0;
            while t < 50.0 {
                let span = d.span_of(d.unit_index_of(t));
                assert!(
                    span.begin() <= t && t < span.end(),
                    "t={t} size={size} span={span:?}"
                );
                t += 0.0137;
            }
        }
        Ok(())
    }

    #[test]
    fn span_of_is_adjacent() -> CacheResult<()> {
        let d = Discretizer::new(0.25)?;
        for i in -10..10 {
            assert_eq!(d.span_of(i).end(), d.span_of(i + 1).begin());
        }
        Ok(())
    }

    #[test]
    fn index_range_excludes_unit_at_end_boundary() -> CacheResult<()> {
        let d = Discretizer::new(1.0)?;
        assert_eq!(d.index_range(&TimeSpan::new(0.0, 10.0)), 0..=9);
        assert_eq!(d.index_range(&TimeSpan::new(0.5, 0.6)), 0..=0);
        assert_eq!(d.index_range(&TimeSpan::new(-2.5, 1.5)), -3..=1);
        Ok(())
    }

    #[test]
    fn rejects_bad_unit_sizes() {
        assert!(Discretizer::new(0.0).is_err());
        assert!(Discretizer::new(-1.0).is_err());
        assert!(Discretizer::new(f64::NAN).is_err());
        assert!(Discretizer::new(f64::INFINITY).is_err());
    }

    #[test]
    #[should_panic]
    fn non_finite_time_panics() {
        let d = Discretizer { unit_size: 1.0 };
        let _ = d.unit_index_of(f64::NAN);
    }

    #[test]
    #[should_panic]
    fn overflowing_time_panics() {
        let d = Discretizer { unit_size: 1e-300 };
        let _ = d.unit_index_of(1e300);
    }

    #[test]
    fn span_helpers() {
        let a = TimeSpan::new(0.0, 2.0);
        let b = TimeSpan::new(1.0, 3.0);
        assert_eq!(a.hull(&b), TimeSpan::new(0.0, 3.0));
        assert_eq!(a.intersect(&b), Some(TimeSpan::new(1.0, 2.0)));
        assert_eq!(a.intersect(&TimeSpan::new(2.0, 3.0)), None);
        assert!(TimeSpan::try_new(1.0, 1.0).is_none());
        assert!(TimeSpan::try_new(f64::NAN, 1.0).is_none());
    }
}
