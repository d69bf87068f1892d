//! Sparse, index-addressed collection of cache units.
//!
//! An absent index means "not fetched yet"; a unit that is present but
//! empty means "fetched, the source has nothing there". The store never
//! mutates a unit in place: `put` inserts or replaces wholesale.
//!
//! Every unit passes [`SegmentStore::validate`] before it is stored:
//!
//! - its index and span match the discretizer exactly;
//! - all sample times lie inside the span;
//! - it has one column per schema column.

use std::{collections::BTreeMap, ops::RangeInclusive, sync::Arc};

use crate::{
    coverage::WindowCoverage,
    discretize::{Discretizer, TimeSpan, UnitIndex},
    error::{CacheResult, invariant},
    unit::{CacheUnit, DatasetSchema},
};

/// Index-addressed units of one dataset.
#[derive(Debug, Clone)]
pub struct SegmentStore {
    discretizer: Discretizer,
    bounds: TimeSpan,
    schema: Arc<DatasetSchema>,
    units: BTreeMap<UnitIndex, CacheUnit>,
}

impl SegmentStore {
    /// Empty store for a dataset valid over `bounds`.
    pub fn new(discretizer: Discretizer, bounds: TimeSpan, schema: Arc<DatasetSchema>) -> Self {
        Self {
            discretizer,
            bounds,
            schema,
            units: BTreeMap::new(),
        }
    }

    /// The discretizer used for unit spans.
    pub fn discretizer(&self) -> &Discretizer {
        &self.discretizer
    }

    /// Global valid time boundary `[begin, end)`.
    pub fn bounds(&self) -> TimeSpan {
        self.bounds
    }

    /// Dataset schema.
    pub fn schema(&self) -> &Arc<DatasetSchema> {
        &self.schema
    }

    /// Unit indices implied by the global boundary.
    pub fn index_bounds(&self) -> RangeInclusive<UnitIndex> {
        self.discretizer.index_range(&self.bounds)
    }

    /// Unit at `index`, if fetched.
    pub fn get(&self, index: UnitIndex) -> Option<&CacheUnit> {
        self.units.get(&index)
    }

    /// True if a unit exists at `index`.
    pub fn has(&self, index: UnitIndex) -> bool {
        self.units.contains_key(&index)
    }

    /// Check `unit` against the contract for slot `index`.
    pub fn validate(&self, index: UnitIndex, unit: &CacheUnit) -> CacheResult<()> {
        if unit.index() != index {
            return Err(invariant(format!(
                "unit for slot {index} reports index {}",
                unit.index()
            )));
        }

        let expected = self.discretizer.span_of(index);
        if unit.span() != expected {
            return Err(invariant(format!(
                "unit {index} declares span {:?}, expected {expected:?}",
                unit.span()
            )));
        }

        if let Some(block) = unit.samples() {
            if block.columns().len() != self.schema.column_count() {
                return Err(invariant(format!(
                    "unit {index} has {} columns, schema has {}",
                    block.columns().len(),
                    self.schema.column_count()
                )));
            }
            if let Some(t) = block.times().iter().find(|t| !expected.contains(**t)) {
                return Err(invariant(format!(
                    "unit {index} holds time {t} outside its span {expected:?}"
                )));
            }
        }
        Ok(())
    }

    /// Insert or replace the unit at `index`, returning the previous one.
    pub fn put(&mut self, index: UnitIndex, unit: CacheUnit) -> CacheResult<Option<CacheUnit>> {
        self.validate(index, &unit)?;
        Ok(self.units.insert(index, unit))
    }

    /// Number of stored units.
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// True when nothing has been fetched.
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Stored units in index order.
    pub fn units(&self) -> impl Iterator<Item = &CacheUnit> {
        self.units.values()
    }

    /// Units stored within `window`, in index order.
    pub fn range(&self, window: RangeInclusive<UnitIndex>) -> impl Iterator<Item = &CacheUnit> {
        self.units.range(window).map(|(_, u)| u)
    }

    /// Coverage of `window` by units accepted by `accept`.
    ///
    /// Returns `None` if the window is too long to describe.
    pub fn coverage<F>(&self, window: RangeInclusive<UnitIndex>, accept: F) -> Option<WindowCoverage>
    where
        F: Fn(&CacheUnit) -> bool,
    {
        let mut cov = WindowCoverage::new(window.clone())?;
        for unit in self.range(window).filter(|u| accept(u)) {
            cov.insert(unit.index());
        }
        Some(cov)
    }

    /// Drop every unit.
    pub fn clear(&mut self) {
        self.units.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::CacheError,
        unit::{FieldSpec, SampleBlock},
    };

    fn store() -> SegmentStore {
        let schema = DatasetSchema::new(vec![FieldSpec::scalar("v")], f64::NAN);
        SegmentStore::new(
            Discretizer::new(1.0).unwrap(),
            TimeSpan::new(0.0, 10.0),
            Arc::new(schema),
        )
    }

    fn unit(d: &Discretizer, index: UnitIndex, times: &[f64]) -> CacheUnit {
        let block = SampleBlock::new(times.to_vec(), vec![times.to_vec()]).unwrap();
        CacheUnit::with_samples(index, d.span_of(index), block)
    }

    #[test]
    fn put_get_has_and_replace() -> CacheResult<()> {
        let mut s = store();
        let d = *s.discretizer();
        assert!(!s.has(3));

        assert!(s.put(3, unit(&d, 3, &[3.0, 3.5]))?.is_none());
        assert!(s.has(3));
        assert_eq!(s.get(3).map(CacheUnit::sample_count), Some(2));

        let old = s.put(3, CacheUnit::empty(3, d.span_of(3)))?;
        assert_eq!(old.map(|u| u.sample_count()), Some(2));
        assert!(s.get(3).is_some_and(CacheUnit::is_empty_marker));
        assert_eq!(s.len(), 1);
        Ok(())
    }

    #[test]
    fn rejects_span_mismatch() {
        let mut s = store();
        let bad = CacheUnit::empty(3, TimeSpan::new(3.0, 3.5));
        match s.put(3, bad) {
            Err(CacheError::InvariantViolation { .. }) => {}
            other => panic!("expected InvariantViolation, got {other:?}"),
        }
        assert!(s.is_empty());
    }

    #[test]
    fn rejects_times_outside_span_and_wrong_slot() {
        let mut s = store();
        let d = *s.discretizer();

        let outside = unit(&d, 2, &[2.5, 3.0]);
        assert!(s.put(2, outside).is_err());

        let wrong_slot = unit(&d, 2, &[2.5]);
        assert!(s.put(4, wrong_slot).is_err());

        let d2 = Discretizer::new(1.0).unwrap();
        let block = SampleBlock::new(vec![5.5], vec![vec![1.0], vec![2.0]]).unwrap();
        let wide = CacheUnit::with_samples(5, d2.span_of(5), block);
        assert!(s.put(5, wide).is_err());
        assert!(s.is_empty());
    }

    #[test]
    fn coverage_respects_acceptance() -> CacheResult<()> {
        let mut s = store();
        let d = *s.discretizer();
        s.put(1, unit(&d, 1, &[1.0]))?;
        s.put(2, CacheUnit::empty(2, d.span_of(2)))?;

        let all = s.coverage(0..=3, |_| true).unwrap();
        assert_eq!(all.missing_runs(None), vec![0..=0, 3..=3]);

        let only_samples = s.coverage(0..=3, |u| !u.is_empty_marker()).unwrap();
        assert_eq!(only_samples.missing_runs(None), vec![0..=0, 2..=3]);
        Ok(())
    }

    #[test]
    fn index_bounds_follow_global_boundary() {
        let s = store();
        assert_eq!(s.index_bounds(), 0..=9);
    }
}
