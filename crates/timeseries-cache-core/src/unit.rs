//! Cache units and the dataset schema they follow.
//!
//! A [`CacheUnit`] covers exactly one discretizer span and holds either an
//! explicit empty marker or a [`SampleBlock`]: a time array plus one
//! column per field component, all of equal length. Vector fields occupy
//! several consecutive columns.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::discretize::{TimeSpan, UnitIndex};

/// One logical field of a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Field identifier used in queries.
    pub name: String,
    /// Number of components (1 for scalars, 3 for a 3-vector).
    pub components: usize,
}

impl FieldSpec {
    /// A single-component field.
    pub fn scalar(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            components: 1,
        }
    }

    /// A field with `components` columns sharing one timestamp.
    pub fn vector(name: impl Into<String>, components: usize) -> Self {
        Self {
            name: name.into(),
            components,
        }
    }
}

/// Ordered field list plus the in-band fill sentinel.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetSchema {
    fields: Vec<FieldSpec>,
    fill_value: f64,
}

impl DatasetSchema {
    /// Schema with the given fields. `fill_value` may be NaN.
    pub fn new(fields: Vec<FieldSpec>, fill_value: f64) -> Self {
        Self { fields, fill_value }
    }

    /// Fields in column order.
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// The fill sentinel.
    pub fn fill_value(&self) -> f64 {
        self.fill_value
    }

    /// Total number of data columns.
    pub fn column_count(&self) -> usize {
        self.fields.iter().map(|f| f.components).sum()
    }

    /// Columns occupied by `name`, if the field exists.
    pub fn columns_of(&self, name: &str) -> Option<Range<usize>> {
        let mut start = 0;
        for field in &self.fields {
            if field.name == name {
                return Some(start..start + field.components);
            }
            start += field.components;
        }
        None
    }

    /// True if `v` is the fill sentinel. NaN matches a NaN sentinel.
    pub fn is_fill(&self, v: f64) -> bool {
        if self.fill_value.is_nan() {
            v.is_nan()
        } else {
            v.to_bits() == self.fill_value.to_bits()
        }
    }
}

/// Samples of one unit: sorted times plus parallel data columns.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBlock {
    times: Vec<f64>,
    columns: Vec<Vec<f64>>,
}

impl SampleBlock {
    /// Build a block, checking column lengths and time ordering.
    ///
    /// Returns a description of the problem on failure.
    pub fn new(times: Vec<f64>, columns: Vec<Vec<f64>>) -> Result<Self, String> {
        if let Some((i, col)) = columns
            .iter()
            .enumerate()
            .find(|(_, c)| c.len() != times.len())
        {
            return Err(format!(
                "column {i} has {} values but there are {} times",
                col.len(),
                times.len()
            ));
        }
        if let Some(t) = times.iter().find(|t| !t.is_finite()) {
            return Err(format!("non-finite sample time {t}"));
        }
        if let Some(w) = times.windows(2).find(|w| w[0] > w[1]) {
            return Err(format!("times are not sorted: {} then {}", w[0], w[1]));
        }
        Ok(Self { times, columns })
    }

    /// Block with no samples and `column_count` empty columns.
    pub fn empty(column_count: usize) -> Self {
        Self {
            times: Vec::new(),
            columns: vec![Vec::new(); column_count],
        }
    }

    /// Sample times.
    pub fn times(&self) -> &[f64] {
        &self.times
    }

    /// Data columns.
    pub fn columns(&self) -> &[Vec<f64>] {
        &self.columns
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.times.len()
    }

    /// True when there are no samples.
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }
}

/// What a unit holds.
#[derive(Debug, Clone, PartialEq)]
pub enum UnitContent {
    /// The source has no data for this span.
    Empty,
    /// Samples (possibly zero of them).
    Samples(SampleBlock),
}

/// One fetched, immutable unit of the time axis.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheUnit {
    index: UnitIndex,
    span: TimeSpan,
    content: UnitContent,
    resolution: Option<f64>,
}

impl CacheUnit {
    /// Unit with an explicit empty marker.
    pub fn empty(index: UnitIndex, span: TimeSpan) -> Self {
        Self {
            index,
            span,
            content: UnitContent::Empty,
            resolution: None,
        }
    }

    /// Unit holding `block`.
    pub fn with_samples(index: UnitIndex, span: TimeSpan, block: SampleBlock) -> Self {
        Self {
            index,
            span,
            content: UnitContent::Samples(block),
            resolution: None,
        }
    }

    /// Tag the unit with the sampling resolution it was fetched at.
    pub fn at_resolution(mut self, resolution: f64) -> Self {
        self.resolution = Some(resolution);
        self
    }

    /// Unit index.
    pub fn index(&self) -> UnitIndex {
        self.index
    }

    /// Declared span.
    pub fn span(&self) -> TimeSpan {
        self.span
    }

    /// Content.
    pub fn content(&self) -> &UnitContent {
        &self.content
    }

    /// Sampling resolution tag, if any.
    pub fn resolution(&self) -> Option<f64> {
        self.resolution
    }

    /// Samples, or `None` for an empty unit.
    pub fn samples(&self) -> Option<&SampleBlock> {
        match &self.content {
            UnitContent::Empty => None,
            UnitContent::Samples(block) => Some(block),
        }
    }

    /// Number of samples (0 for empty units).
    pub fn sample_count(&self) -> usize {
        self.samples().map_or(0, SampleBlock::len)
    }

    /// True for an explicit empty marker.
    pub fn is_empty_marker(&self) -> bool {
        matches!(self.content, UnitContent::Empty)
    }
}
