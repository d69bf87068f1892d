//! Satellite positions from a trajectory service.
//!
//! The service is asked once per missing run of units, at the sampling
//! resolution carried in the query context. Every unit produced is tagged
//! with that resolution so a later query asking for finer sampling can
//! reject it through [`accept_resolution`] and have it fetched again.

use std::{collections::BTreeMap, ops::RangeInclusive};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    discretize::{Discretizer, TimeSpan, UnitIndex},
    fetch::{DatasetDescriptor, FetchAdapter, FetchError, FetchResult, partition_into_units},
    unit::{CacheUnit, DatasetSchema, FieldSpec},
};

/// Name of the 3-component position field.
pub const POSITION_FIELD: &str = "position";

/// Positions sampled over time. All vectors have the same length.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    /// Sample times, ascending.
    pub times: Vec<f64>,
    /// X coordinates.
    pub x: Vec<f64>,
    /// Y coordinates.
    pub y: Vec<f64>,
    /// Z coordinates.
    pub z: Vec<f64>,
}

impl Trajectory {
    /// Number of samples.
    pub fn len(&self) -> usize {
        self.times.len()
    }

    /// True when there are no samples.
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }
}

/// A remote (or simulated) source of satellite locations.
#[async_trait]
pub trait TrajectoryService: Send + Sync {
    /// Locations of `satellite` within `span`, sampled about every
    /// `resolution` time units.
    async fn locations(
        &self,
        satellite: &str,
        span: TimeSpan,
        resolution: f64,
    ) -> FetchResult<Trajectory>;
}

/// Per-query argument of [`EphemerisAdapter`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EphemerisRequest {
    /// Requested sampling interval.
    pub resolution: f64,
}

/// Acceptance predicate: trust a cached unit only if it was fetched at
/// `requested` resolution or finer.
pub fn accept_resolution(requested: f64) -> impl Fn(&CacheUnit) -> bool + Copy + Send + Sync {
    move |unit| unit.resolution().is_some_and(|r| r <= requested)
}

/// [`FetchAdapter`] over one satellite of a [`TrajectoryService`].
#[derive(Debug, Clone)]
pub struct EphemerisAdapter<S> {
    service: S,
    satellite: String,
    bounds: TimeSpan,
}

impl<S: TrajectoryService> EphemerisAdapter<S> {
    /// Serve `satellite` within its availability window `bounds`.
    pub fn new(service: S, satellite: impl Into<String>, bounds: TimeSpan) -> Self {
        Self {
            service,
            satellite: satellite.into(),
            bounds,
        }
    }

    /// The wrapped service.
    pub fn service(&self) -> &S {
        &self.service
    }
}

/// Schema with the single `position` vector field.
pub fn schema() -> DatasetSchema {
    DatasetSchema::new(vec![FieldSpec::vector(POSITION_FIELD, 3)], f64::NAN)
}

#[async_trait]
impl<S: TrajectoryService> FetchAdapter for EphemerisAdapter<S> {
    type Context = EphemerisRequest;

    fn descriptor(&self) -> DatasetDescriptor {
        DatasetDescriptor {
            id: format!("ephemeris:{}", self.satellite),
            schema: schema(),
            bounds: self.bounds,
        }
    }

    async fn fetch_units(
        &self,
        run: RangeInclusive<UnitIndex>,
        discretizer: &Discretizer,
        ctx: &EphemerisRequest,
    ) -> FetchResult<Vec<CacheUnit>> {
        let span = discretizer
            .span_of(*run.start())
            .hull(&discretizer.span_of(*run.end()));
        let trajectory = self
            .service
            .locations(&self.satellite, span, ctx.resolution)
            .await?;

        let Trajectory { times, x, y, z } = trajectory;
        let units = partition_into_units(run, discretizer, &times, &[x, y, z], false)?;
        Ok(units
            .into_iter()
            .map(|u| u.at_resolution(ctx.resolution))
            .collect())
    }
}

/// In-memory [`TrajectoryService`] over pre-tabulated trajectories.
///
/// Requests are answered by thinning the stored samples so consecutive
/// returned samples are at least `resolution` apart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TabulatedTrajectory {
    /// Trajectories keyed by satellite name.
    pub satellites: BTreeMap<String, Trajectory>,
}

impl TabulatedTrajectory {
    /// Add or replace one satellite's trajectory.
    pub fn with_satellite(mut self, name: impl Into<String>, trajectory: Trajectory) -> Self {
        self.satellites.insert(name.into(), trajectory);
        self
    }
}

#[async_trait]
impl TrajectoryService for TabulatedTrajectory {
    async fn locations(
        &self,
        satellite: &str,
        span: TimeSpan,
        resolution: f64,
    ) -> FetchResult<Trajectory> {
        let source = self
            .satellites
            .get(satellite)
            .ok_or_else(|| FetchError::service(format!("unknown satellite '{satellite}'")))?;

        let mut out = Trajectory::default();
        let mut last_kept: Option<f64> = None;
        for (i, &t) in source.times.iter().enumerate() {
            if !span.contains(t) || last_kept.is_some_and(|prev| t - prev < resolution) {
                continue;
            }
            let (Some(x), Some(y), Some(z)) = (source.x.get(i), source.y.get(i), source.z.get(i))
            else {
                return Err(FetchError::service(format!(
                    "trajectory of '{satellite}' has fewer coordinates than times"
                )));
            };
            out.times.push(t);
            out.x.push(*x);
            out.y.push(*y);
            out.z.push(*z);
            last_kept = Some(t);
        }
        Ok(out)
    }
}
