//! Range queries: fill missing units, then merge them into one array set.
//!
//! A query walks these steps under the store lock:
//!
//! 1. Widen the requested unit range by the begin/end margins (in units)
//!    and clip it to the dataset boundary.
//! 2. Find runs of units that are absent or rejected by the caller's
//!    acceptance predicate.
//! 3. Fetch each run with one adapter call, validate every returned unit,
//!    and insert them only after all runs succeeded.
//! 4. Concatenate the window's samples. Only an edge unit of the literal
//!    request that is also the edge of the window is clipped to the
//!    requested time; margin units are returned whole.
//!
//! Gaps are reported alongside the data rather than as errors.

use std::{ops::RangeInclusive, sync::Arc, sync::atomic::Ordering};

use log::debug;
use snafu::prelude::*;

use crate::{
    cache::{SegmentCache, accept_all},
    discretize::{TimeSpan, UnitIndex},
    error::{
        CacheResult, FetchSnafu, InvalidRequestSnafu, OutOfBoundsSnafu, invariant,
    },
    fetch::FetchAdapter,
    store::SegmentStore,
    unit::{CacheUnit, DatasetSchema},
};

/// Inclusive time range plus proactive fill margins (in units).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeRequest {
    /// Inclusive start time.
    pub begin: f64,
    /// Inclusive end time.
    pub end: f64,
    /// Extra units before the first requested unit.
    pub begin_margin: u32,
    /// Extra units after the last requested unit.
    pub end_margin: u32,
}

impl RangeRequest {
    /// Request `[begin, end]` without margins.
    pub fn new(begin: f64, end: f64) -> Self {
        Self {
            begin,
            end,
            begin_margin: 0,
            end_margin: 0,
        }
    }

    /// Set the margins.
    pub fn with_margins(mut self, begin_margin: u32, end_margin: u32) -> Self {
        self.begin_margin = begin_margin;
        self.end_margin = end_margin;
        self
    }
}

/// A stretch of the result with no samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gap {
    /// Index of the first sample after the gap (equal to the sample count
    /// for a trailing gap).
    pub position: usize,
    /// Time covered by the gap.
    pub span: TimeSpan,
}

/// Merged, owned data for a range query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    schema: Arc<DatasetSchema>,
    units: RangeInclusive<UnitIndex>,
    times: Vec<f64>,
    columns: Vec<Vec<f64>>,
    gaps: Vec<Gap>,
    fetched_units: usize,
    fetch_calls: usize,
}

impl QueryResult {
    /// Units that contributed to the result (margins included).
    pub fn units(&self) -> RangeInclusive<UnitIndex> {
        self.units.clone()
    }

    /// Sample times, ascending.
    pub fn times(&self) -> &[f64] {
        &self.times
    }

    /// All data columns in schema order.
    pub fn columns(&self) -> &[Vec<f64>] {
        &self.columns
    }

    /// Columns of one field (several for a vector field).
    pub fn field(&self, name: &str) -> Option<&[Vec<f64>]> {
        let cols = self.schema.columns_of(name)?;
        Some(&self.columns[cols])
    }

    /// Detected gaps, ordered by position.
    pub fn gaps(&self) -> &[Gap] {
        &self.gaps
    }

    /// Units fetched by this query.
    pub fn fetched_units(&self) -> usize {
        self.fetched_units
    }

    /// Adapter calls made by this query.
    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.times.len()
    }

    /// True when no sample was returned.
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Dataset schema.
    pub fn schema(&self) -> &DatasetSchema {
        &self.schema
    }
}

/// Resolved unit window and edge clipping of one query.
#[derive(Debug, Clone)]
pub(crate) struct QueryPlan {
    pub(crate) window: RangeInclusive<UnitIndex>,
    pub(crate) clip_begin: Option<f64>,
    pub(crate) clip_end: Option<f64>,
}

impl<A: FetchAdapter> SegmentCache<A> {
    pub(crate) fn check_in_bounds(&self, t: f64) -> CacheResult<()> {
        let bounds = self.descriptor.bounds;
        ensure!(
            bounds.contains(t),
            OutOfBoundsSnafu {
                time: t,
                begin: bounds.begin(),
                end: bounds.end(),
            }
        );
        Ok(())
    }

    /// Unit window `[center_first - before, center_last + after]` clipped to
    /// the dataset boundary.
    pub(crate) fn window_around(
        &self,
        first: UnitIndex,
        last: UnitIndex,
        before: u32,
        after: u32,
    ) -> RangeInclusive<UnitIndex> {
        let limits = self.discretizer.index_range(&self.descriptor.bounds);
        let start = first.saturating_sub(before as i64).max(*limits.start());
        let end = last.saturating_add(after as i64).min(*limits.end());
        start..=end
    }

    fn plan_range(&self, request: &RangeRequest) -> CacheResult<QueryPlan> {
        self.check_in_bounds(request.begin)?;
        self.check_in_bounds(request.end)?;
        ensure!(
            request.begin <= request.end,
            InvalidRequestSnafu {
                message: format!(
                    "begin {} is after end {}",
                    request.begin, request.end
                ),
            }
        );

        let first = self.discretizer.unit_index_of(request.begin);
        let last = self.discretizer.unit_index_of(request.end);
        let window = self.window_around(first, last, request.begin_margin, request.end_margin);

        Ok(QueryPlan {
            clip_begin: (*window.start() == first).then_some(request.begin),
            clip_end: (*window.end() == last).then_some(request.end),
            window,
        })
    }

    /// Query `[begin, end]` with explicit margins and acceptance predicate.
    ///
    /// Any adapter failure aborts the whole query and leaves the store
    /// untouched.
    pub async fn query<F>(
        &self,
        request: &RangeRequest,
        accept: F,
        ctx: &A::Context,
    ) -> CacheResult<QueryResult>
    where
        F: Fn(&CacheUnit) -> bool + Send + Sync,
    {
        let plan = self.plan_range(request)?;
        self.execute(plan, &accept, ctx).await
    }

    /// Query `[begin, end]` using the configured margin policy and trusting
    /// all cached units.
    pub async fn request(&self, begin: f64, end: f64, ctx: &A::Context) -> CacheResult<QueryResult> {
        self.check_in_bounds(begin)?;
        self.check_in_bounds(end)?;
        let requested_units = if begin <= end {
            (self.discretizer.unit_index_of(end) - self.discretizer.unit_index_of(begin)) as u64 + 1
        } else {
            0
        };
        let margin = self.config.margin.margin_units(requested_units);
        let request = RangeRequest::new(begin, end).with_margins(margin, margin);
        self.query(&request, accept_all, ctx).await
    }

    pub(crate) async fn execute<F>(
        &self,
        plan: QueryPlan,
        accept: &F,
        ctx: &A::Context,
    ) -> CacheResult<QueryResult>
    where
        F: Fn(&CacheUnit) -> bool + Send + Sync,
    {
        let mut store = self.store.lock().await;

        let coverage = store
            .coverage(plan.window.clone(), accept)
            .context(InvalidRequestSnafu {
                message: format!("query window {:?} spans too many units", plan.window),
            })?;
        let runs = coverage.missing_runs(self.config.max_units_per_fetch);

        let mut staged: Vec<CacheUnit> = Vec::new();
        for run in &runs {
            let (first, last) = (*run.start(), *run.end());
            debug!(
                "Fetching units {first}..={last} for '{}'",
                self.descriptor.id
            );
            self.fetch_calls.fetch_add(1, Ordering::Relaxed);

            let units = self
                .adapter
                .fetch_units(run.clone(), store.discretizer(), ctx)
                .await
                .context(FetchSnafu { first, last })?;

            let expected = (last - first) as usize + 1;
            if units.len() != expected {
                return Err(invariant(format!(
                    "adapter returned {} units for run {first}..={last}",
                    units.len()
                )));
            }
            for (offset, unit) in units.iter().enumerate() {
                store.validate(first + offset as i64, unit)?;
            }
            staged.extend(units);
        }

        let fetched_units = staged.len();
        for unit in staged {
            store.put(unit.index(), unit)?;
        }

        let (times, columns, gaps) =
            assemble(&store, &plan, self.config.max_sample_spacing)?;

        Ok(QueryResult {
            schema: store.schema().clone(),
            units: plan.window,
            times,
            columns,
            gaps,
            fetched_units,
            fetch_calls: runs.len(),
        })
    }
}

type Assembled = (Vec<f64>, Vec<Vec<f64>>, Vec<Gap>);

fn assemble(
    store: &SegmentStore,
    plan: &QueryPlan,
    max_sample_spacing: Option<f64>,
) -> CacheResult<Assembled> {
    let column_count = store.schema().column_count();
    let mut times = Vec::new();
    let mut columns: Vec<Vec<f64>> = vec![Vec::new(); column_count];
    let mut gaps: Vec<Gap> = Vec::new();

    let (first, last) = (*plan.window.start(), *plan.window.end());
    for index in plan.window.clone() {
        let unit = store
            .get(index)
            .ok_or_else(|| invariant(format!("unit {index} missing after fetch")))?;

        let lower = plan.clip_begin.filter(|_| index == first);
        let upper = plan.clip_end.filter(|_| index == last);

        let (start, end) = match unit.samples() {
            Some(block) => {
                let t = block.times();
                let start = lower.map_or(0, |lo| t.partition_point(|x| *x < lo));
                let end = upper.map_or(t.len(), |hi| t.partition_point(|x| *x <= hi));
                (start, end.max(start))
            }
            None => (0, 0),
        };

        if start == end {
            push_gap(&mut gaps, times.len(), unit.span());
            continue;
        }

        if let Some(block) = unit.samples() {
            times.extend_from_slice(&block.times()[start..end]);
            for (dst, src) in columns.iter_mut().zip(block.columns()) {
                dst.extend_from_slice(&src[start..end]);
            }
        }
    }

    if let Some(spacing) = max_sample_spacing {
        for (i, pair) in times.windows(2).enumerate() {
            if pair[1] - pair[0] > spacing {
                push_gap(&mut gaps, i + 1, TimeSpan::new(pair[0], pair[1]));
            }
        }
        gaps.sort_by(|a, b| {
            a.position
                .cmp(&b.position)
                .then(a.span.begin().total_cmp(&b.span.begin()))
        });
        gaps = merge_same_position(gaps);
    }

    Ok((times, columns, gaps))
}

fn push_gap(gaps: &mut Vec<Gap>, position: usize, span: TimeSpan) {
    match gaps.last_mut() {
        Some(prev) if prev.position == position => prev.span = prev.span.hull(&span),
        _ => gaps.push(Gap { position, span }),
    }
}

fn merge_same_position(gaps: Vec<Gap>) -> Vec<Gap> {
    let mut out: Vec<Gap> = Vec::with_capacity(gaps.len());
    for gap in gaps {
        push_gap(&mut out, gap.position, gap.span);
    }
    out
}
