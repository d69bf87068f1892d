//! Nearest-valid-sample lookups on top of range queries.

use snafu::prelude::*;

use crate::{
    cache::{SegmentCache, accept_all, query::QueryPlan},
    error::{CacheResult, GapCause, GapSnafu, InvalidRequestSnafu, UnknownFieldSnafu},
    fetch::FetchAdapter,
    unit::CacheUnit,
};

/// The sample chosen by a point query.
#[derive(Debug, Clone, PartialEq)]
pub struct PointValue {
    /// Time of the chosen sample.
    pub time: f64,
    /// One value per field component.
    pub values: Vec<f64>,
}

impl PointValue {
    /// The value of a scalar field.
    pub fn scalar(&self) -> Option<f64> {
        match self.values.as_slice() {
            [v] => Some(*v),
            _ => None,
        }
    }
}

impl<A: FetchAdapter> SegmentCache<A> {
    /// Closest valid sample of `field` within `max_distance` of `t`.
    pub async fn nearest_value(
        &self,
        t: f64,
        field: &str,
        max_distance: f64,
        ctx: &A::Context,
    ) -> CacheResult<PointValue> {
        self.nearest_value_with(t, field, max_distance, accept_all, ctx)
            .await
    }

    /// Like [`SegmentCache::nearest_value`] with a custom acceptance
    /// predicate for cached units.
    ///
    /// Fill values are skipped; for a vector field a fill in any component
    /// invalidates the whole sample. Equally distant samples resolve to the
    /// earlier one.
    pub async fn nearest_value_with<F>(
        &self,
        t: f64,
        field: &str,
        max_distance: f64,
        accept: F,
        ctx: &A::Context,
    ) -> CacheResult<PointValue>
    where
        F: Fn(&CacheUnit) -> bool + Send + Sync,
    {
        let schema = &self.descriptor.schema;
        let cols = schema
            .columns_of(field)
            .context(UnknownFieldSnafu { field })?;
        ensure!(
            max_distance.is_finite() && max_distance >= 0.0,
            InvalidRequestSnafu {
                message: format!("max distance must be finite and non-negative, got {max_distance}"),
            }
        );
        self.check_in_bounds(t)?;

        let unit = self.discretizer.unit_index_of(t);
        let reach = (max_distance / self.discretizer.unit_size()).ceil();
        let reach = reach.clamp(1.0, u32::MAX as f64) as u32;
        let plan = QueryPlan {
            window: self.window_around(unit, unit, reach, reach),
            clip_begin: None,
            clip_end: None,
        };
        let result = self.execute(plan, &accept, ctx).await?;

        let gap = |cause| GapSnafu {
            field,
            time: t,
            unit,
            cause,
        };

        let times = result.times();
        let span = self.discretizer.span_of(unit);
        let lo = times.partition_point(|x| *x < span.begin());
        let hi = times.partition_point(|x| *x < span.end());
        ensure!(lo < hi, gap(GapCause::EmptyUnit));

        let columns = &result.columns()[cols];
        let valid = |i: usize| columns.iter().all(|c| !schema.is_fill(c[i]));

        let mut left = times.partition_point(|x| *x < t);
        let mut right = left;
        let mut saw_fill = false;
        loop {
            let before = left
                .checked_sub(1)
                .map(|i| (i, t - times[i]))
                .filter(|(_, d)| *d <= max_distance);
            let after = (right < times.len())
                .then(|| (right, times[right] - t))
                .filter(|(_, d)| *d <= max_distance);

            let i = match (before, after) {
                (Some((i, db)), Some((_, da))) if db <= da => {
                    left = i;
                    i
                }
                (_, Some((i, _))) => {
                    right = i + 1;
                    i
                }
                (Some((i, _)), None) => {
                    left = i;
                    i
                }
                (None, None) => break,
            };

            if valid(i) {
                return Ok(PointValue {
                    time: times[i],
                    values: columns.iter().map(|c| c[i]).collect(),
                });
            }
            saw_fill = true;
        }

        let cause = if saw_fill {
            GapCause::FillOnly
        } else {
            GapCause::NoSamples
        };
        gap(cause).fail()
    }
}
