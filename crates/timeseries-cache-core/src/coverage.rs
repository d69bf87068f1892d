//! Which units of a query window are present, and which runs are missing.
//!
//! Unit indices are signed 64-bit, while `RoaringBitmap` stores `u32`.
//! A [`WindowCoverage`] therefore stores offsets relative to the first unit
//! of a window; windows longer than `u32::MAX` units are rejected by
//! [`WindowCoverage::new`].
//!
//! ```
//! use timeseries_cache_core::coverage::WindowCoverage;
//!
//! let mut cov = WindowCoverage::new(-2..=7).unwrap();
//! for i in [-2, -1, 3, 4, 7] {
//!     cov.insert(i);
//! }
//! assert_eq!(cov.missing_runs(None), vec![0..=2, 5..=6]);
//! assert_eq!(cov.missing_runs(Some(2)), vec![0..=1, 2..=2, 5..=6]);
//! ```

use std::ops::RangeInclusive;

use roaring::RoaringBitmap;

use crate::discretize::UnitIndex;

/// Present units within one inclusive window of unit indices.
#[derive(Debug, Clone)]
pub struct WindowCoverage {
    window: RangeInclusive<UnitIndex>,
    bitmap: RoaringBitmap,
}

impl WindowCoverage {
    /// Empty coverage over `window`, or `None` if the window is empty or
    /// longer than `u32::MAX` units.
    pub fn new(window: RangeInclusive<UnitIndex>) -> Option<Self> {
        let (start, end) = (*window.start(), *window.end());
        if start > end || end.checked_sub(start)? > u32::MAX as i64 - 1 {
            return None;
        }
        Some(Self {
            window,
            bitmap: RoaringBitmap::new(),
        })
    }

    /// The window this coverage describes.
    pub fn window(&self) -> RangeInclusive<UnitIndex> {
        self.window.clone()
    }

    /// Number of units in the window.
    pub fn window_len(&self) -> u64 {
        (*self.window.end() - *self.window.start()) as u64 + 1
    }

    fn offset(&self, index: UnitIndex) -> Option<u32> {
        self.window
            .contains(&index)
            .then(|| (index - *self.window.start()) as u32)
    }

    /// Mark `index` present. Indices outside the window are ignored.
    pub fn insert(&mut self, index: UnitIndex) {
        if let Some(off) = self.offset(index) {
            self.bitmap.insert(off);
        }
    }

    /// True if `index` is marked present.
    pub fn contains(&self, index: UnitIndex) -> bool {
        self.offset(index)
            .is_some_and(|off| self.bitmap.contains(off))
    }

    /// Number of present units.
    pub fn cardinality(&self) -> u64 {
        self.bitmap.len()
    }

    /// Group missing units into contiguous runs, optionally splitting long
    /// runs into chunks of at most `max_run_len` units.
    ///
    /// Runs are inclusive and returned in ascending order.
    pub fn missing_runs(&self, max_run_len: Option<u64>) -> Vec<RangeInclusive<UnitIndex>> {
        let mut missing = RoaringBitmap::new();
        missing.insert_range(0..self.window_len() as u32);
        missing -= &self.bitmap;

        let origin = *self.window.start();
        let base_runs: Vec<RangeInclusive<UnitIndex>> = runs_from_bitmap(&missing)
            .into_iter()
            .map(|r| origin + *r.start() as i64..=origin + *r.end() as i64)
            .collect();

        match max_run_len {
            Some(max_len) => split_runs_by_len(base_runs, max_len),
            None => base_runs,
        }
    }

    /// Fraction of the window that is present, in `[0.0, 1.0]`.
    pub fn coverage_ratio(&self) -> f64 {
        self.bitmap.len() as f64 / self.window_len() as f64
    }
}

/// Convert a bitmap into contiguous runs of offsets.
fn runs_from_bitmap(bitmap: &RoaringBitmap) -> Vec<RangeInclusive<u32>> {
    let mut out = Vec::new();
    let mut iter = bitmap.iter();

    let Some(mut start) = iter.next() else {
        return out;
    };
    let mut prev = start;

    for v in iter {
        if v == prev + 1 {
            prev = v;
        } else {
            out.push(start..=prev);
            start = v;
            prev = v;
        }
    }

    out.push(start..=prev);
    out
}

/// Split runs into smaller runs of at most `max_len` units.
fn split_runs_by_len(
    runs: Vec<RangeInclusive<UnitIndex>>,
    max_len: u64,
) -> Vec<RangeInclusive<UnitIndex>> {
    if max_len == 0 {
        return Vec::new();
    }
    let step = max_len.min(i64::MAX as u64) as i64;

    let mut out = Vec::new();
    for range in runs {
        let (start, end) = (*range.start(), *range.end());
        let mut cur = start;
        loop {
            let chunk_end = cur.saturating_add(step - 1).min(end);
            out.push(cur..=chunk_end);
            if chunk_end == end {
                break;
            }
            cur = chunk_end + 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_coverage_has_no_missing_runs() {
        let mut cov = WindowCoverage::new(0..=9).unwrap();
        for i in 0..=9 {
            cov.insert(i);
        }
        assert!(cov.missing_runs(None).is_empty());
        assert!((cov.coverage_ratio() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn empty_coverage_is_one_run() {
        let cov = WindowCoverage::new(-5..=-1).unwrap();
        assert_eq!(cov.missing_runs(None), vec![-5..=-1]);
        assert_eq!(cov.coverage_ratio(), 0.0);
    }

    #[test]
    fn multiple_gaps_and_run_splitting() {
        let mut cov = WindowCoverage::new(100..=119).unwrap();
        for i in 100..=119 {
            if ![103, 104, 110, 111, 112, 118].contains(&i) {
                cov.insert(i);
            }
        }

        let runs = cov.missing_runs(None);
        assert_eq!(runs, vec![103..=104, 110..=112, 118..=118]);

        let split = cov.missing_runs(Some(2));
        assert_eq!(split, vec![103..=104, 110..=111, 112..=112, 118..=118]);

        assert!(cov.missing_runs(Some(0)).is_empty());
    }

    #[test]
    fn inserts_outside_window_are_ignored() {
        let mut cov = WindowCoverage::new(0..=2).unwrap();
        cov.insert(-1);
        cov.insert(3);
        assert_eq!(cov.cardinality(), 0);
        assert!(!cov.contains(3));
    }

    #[test]
    fn rejects_inverted_and_oversized_windows() {
        assert!(WindowCoverage::new(3..=2).is_none());
        assert!(WindowCoverage::new(0..=u32::MAX as i64).is_none());
        assert!(WindowCoverage::new(i64::MIN..=i64::MAX).is_none());
        assert!(WindowCoverage::new(0..=u32::MAX as i64 - 1).is_some());
    }
}
