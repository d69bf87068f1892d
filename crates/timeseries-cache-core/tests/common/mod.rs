#![allow(dead_code)]

use std::{
    ops::RangeInclusive,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use timeseries_cache_core::{
    DatasetDescriptor, DatasetSchema, Discretizer, FetchAdapter, FetchError, FetchResult,
    FieldSpec, TimeSpan, UnitIndex, adapters::omni2::COLUMN_WIDTHS, fetch::partition_into_units,
    unit::CacheUnit,
};

pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// Fill value of the in-memory test dataset.
pub const FILL: f64 = -999.0;

/// In-memory adapter that records every run it is asked for and can be told
/// to fail specific calls.
pub struct RecordingAdapter {
    descriptor: DatasetDescriptor,
    times: Vec<f64>,
    columns: Vec<Vec<f64>>,
    runs: Mutex<Vec<RangeInclusive<UnitIndex>>>,
    failing_calls: Mutex<Vec<usize>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl RecordingAdapter {
    /// Dataset with one scalar field `value` over `[begin, end)`.
    pub fn scalar(begin: f64, end: f64, samples: &[(f64, f64)]) -> Self {
        let schema = DatasetSchema::new(vec![FieldSpec::scalar("value")], FILL);
        Self::new(
            "test-scalar",
            schema,
            TimeSpan::new(begin, end),
            samples.iter().map(|(t, _)| *t).collect(),
            vec![samples.iter().map(|(_, v)| *v).collect()],
        )
    }

    /// Dataset with any schema; `columns` follow schema column order.
    pub fn new(
        id: &str,
        schema: DatasetSchema,
        bounds: TimeSpan,
        times: Vec<f64>,
        columns: Vec<Vec<f64>>,
    ) -> Self {
        Self {
            descriptor: DatasetDescriptor {
                id: id.to_string(),
                schema,
                bounds,
            },
            times,
            columns,
            runs: Mutex::new(Vec::new()),
            failing_calls: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            delay: None,
        }
    }

    /// Sleep this long inside every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make the `n`-th call from now (0-based) fail.
    pub fn fail_call(&self, n: usize) {
        let next = self.calls.load(Ordering::SeqCst);
        self.failing_calls
            .lock()
            .expect("failing_calls lock")
            .push(next + n);
    }

    /// Every run requested so far, failed ones included.
    pub fn runs(&self) -> Vec<RangeInclusive<UnitIndex>> {
        self.runs.lock().expect("runs lock").clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FetchAdapter for RecordingAdapter {
    type Context = ();

    fn descriptor(&self) -> DatasetDescriptor {
        self.descriptor.clone()
    }

    async fn fetch_units(
        &self,
        run: RangeInclusive<UnitIndex>,
        discretizer: &Discretizer,
        _ctx: &(),
    ) -> FetchResult<Vec<CacheUnit>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.runs.lock().expect("runs lock").push(run.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let fail = self
            .failing_calls
            .lock()
            .expect("failing_calls lock")
            .contains(&call);
        if fail {
            return Err(FetchError::service(format!("injected failure on call {call}")));
        }

        partition_into_units(run, discretizer, &self.times, &self.columns, false)
    }
}

/// Samples `(t, 10 * t)` every `step` in `[from, to)`.
pub fn grid(from: f64, to: f64, step: f64) -> Vec<(f64, f64)> {
    let n = ((to - from) / step).round() as usize;
    (0..n)
        .map(|i| from + i as f64 * step)
        .map(|t| (t, t * 10.0))
        .collect()
}

/// One OMNI2 hourly line with zeros everywhere except the given cells.
pub fn omni2_row(year: i32, doy: u32, hour: u32, cells: &[(usize, &str)]) -> String {
    COLUMN_WIDTHS
        .iter()
        .enumerate()
        .map(|(i, &width)| {
            let col = i + 1;
            let text = match col {
                1 => year.to_string(),
                2 => doy.to_string(),
                3 => hour.to_string(),
                _ => cells
                    .iter()
                    .find(|(c, _)| *c == col)
                    .map_or_else(|| "0".to_string(), |(_, t)| t.to_string()),
            };
            format!("{text:>width$}")
        })
        .collect()
}
