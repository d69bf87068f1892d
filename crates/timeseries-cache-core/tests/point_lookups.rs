#![allow(missing_docs)]

mod common;

use common::{FILL, RecordingAdapter, TestResult, grid};
use timeseries_cache_core::{
    CacheConfig, CacheError, DatasetSchema, FieldSpec, GapCause, SegmentCache, TimeSpan,
    WarningDeduplicationContext,
};

fn cache(
    unit_size: f64,
    adapter: RecordingAdapter,
) -> Result<SegmentCache<RecordingAdapter>, CacheError> {
    SegmentCache::new(adapter, CacheConfig::new(unit_size))
}

#[tokio::test]
async fn nearest_valid_sample_skips_fill() -> TestResult {
    let cache = cache(1.0, RecordingAdapter::scalar(0.0, 10.0, &[(0.0, FILL), (1.0, 5.0)]))?;

    let value = cache.nearest_value(0.0, "value", 2.0, &()).await?;
    assert_eq!(value.scalar(), Some(5.0));
    assert_eq!(value.time, 1.0);
    Ok(())
}

#[tokio::test]
async fn empty_unit_is_a_gap_whatever_the_distance() -> TestResult {
    let mut samples = grid(0.0, 2.0, 0.5);
    samples.extend(grid(3.0, 5.0, 0.5));
    let cache = cache(1.0, RecordingAdapter::scalar(0.0, 10.0, &samples))?;

    for max_distance in [0.1, 1.0, 50.0] {
        match cache.nearest_value(2.5, "value", max_distance, &()).await {
            Err(e @ CacheError::Gap {
                unit: 2,
                cause: GapCause::EmptyUnit,
                ..
            }) => {
                assert!(e.is_gap());
                assert!(!e.is_fatal());
            }
            other => panic!("expected EmptyUnit gap, got {other:?}"),
        }
    }
    Ok(())
}

#[tokio::test]
async fn equal_distance_prefers_the_earlier_sample() -> TestResult {
    let cache = cache(10.0, RecordingAdapter::scalar(0.0, 100.0, &[(1.0, 10.0), (3.0, 30.0)]))?;

    let value = cache.nearest_value(2.0, "value", 1.0, &()).await?;
    assert_eq!(value.time, 1.0);
    assert_eq!(value.scalar(), Some(10.0));

    let value = cache.nearest_value(2.5, "value", 1.0, &()).await?;
    assert_eq!(value.time, 3.0);
    Ok(())
}

#[tokio::test]
async fn gap_causes_distinguish_absence_from_fill() -> TestResult {
    let cache = cache(10.0, RecordingAdapter::scalar(0.0, 100.0, &[(1.0, FILL), (9.0, 90.0)]))?;

    match cache.nearest_value(1.2, "value", 0.5, &()).await {
        Err(CacheError::Gap {
            cause: GapCause::FillOnly,
            field,
            ..
        }) => assert_eq!(field, "value"),
        other => panic!("expected FillOnly gap, got {other:?}"),
    }
    match cache.nearest_value(5.0, "value", 1.0, &()).await {
        Err(CacheError::Gap {
            cause: GapCause::NoSamples,
            ..
        }) => {}
        other => panic!("expected NoSamples gap, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn neighbour_units_are_searched() -> TestResult {
    let samples = [(1.9, 19.0), (3.5, FILL), (4.2, 42.0)];
    let cache = cache(1.0, RecordingAdapter::scalar(0.0, 10.0, &samples))?;

    let value = cache.nearest_value(3.4, "value", 1.0, &()).await?;
    assert_eq!(value.time, 4.2);

    // Closest valid sample lies two units away.
    let value = cache.nearest_value(3.0, "value", 1.6, &()).await?;
    assert_eq!(value.time, 1.9);
    assert_eq!(cache.adapter().runs(), vec![2..=4, 1..=1, 5..=5]);
    Ok(())
}

#[tokio::test]
async fn fill_in_any_component_invalidates_a_vector() -> TestResult {
    let schema = DatasetSchema::new(
        vec![FieldSpec::scalar("speed"), FieldSpec::vector("b", 2)],
        FILL,
    );
    let adapter = RecordingAdapter::new(
        "test-vector",
        schema,
        TimeSpan::new(0.0, 10.0),
        vec![1.0, 2.0],
        vec![vec![400.0, 410.0], vec![1.0, 2.0], vec![FILL, 3.0]],
    );
    let cache = cache(1.0, adapter)?;

    let b = cache.nearest_value(1.0, "b", 2.0, &()).await?;
    assert_eq!(b.time, 2.0);
    assert_eq!(b.values, vec![2.0, 3.0]);
    assert_eq!(b.scalar(), None);

    let speed = cache.nearest_value(1.0, "speed", 2.0, &()).await?;
    assert_eq!(speed.scalar(), Some(400.0));
    Ok(())
}

#[tokio::test]
async fn point_lookups_reuse_cached_units() -> TestResult {
    let cache = cache(1.0, RecordingAdapter::scalar(0.0, 10.0, &grid(0.0, 10.0, 0.25)))?;

    cache.nearest_value(5.1, "value", 0.2, &()).await?;
    assert_eq!(cache.adapter().runs(), vec![4..=6]);
    cache.nearest_value(5.6, "value", 0.2, &()).await?;
    assert_eq!(cache.adapter().call_count(), 1);
    Ok(())
}

#[tokio::test]
async fn invalid_point_requests_are_rejected() -> TestResult {
    let cache = cache(1.0, RecordingAdapter::scalar(0.0, 10.0, &grid(0.0, 10.0, 1.0)))?;

    assert!(matches!(
        cache.nearest_value(1.0, "nope", 1.0, &()).await,
        Err(CacheError::UnknownField { .. })
    ));
    assert!(matches!(
        cache.nearest_value(1.0, "value", -1.0, &()).await,
        Err(CacheError::InvalidRequest { .. })
    ));
    assert!(matches!(
        cache.nearest_value(12.0, "value", 1.0, &()).await,
        Err(CacheError::OutOfBounds { .. })
    ));
    assert_eq!(cache.adapter().call_count(), 0);
    Ok(())
}

#[tokio::test]
async fn gap_warnings_are_reported_once_per_operation() -> TestResult {
    let cache = cache(1.0, RecordingAdapter::scalar(0.0, 10.0, &[(5.0, 1.0)]))?;
    let mut warnings = WarningDeduplicationContext::new();

    let mut reported = 0;
    for _ in 0..2 {
        warnings.begin_operation();
        for t in [1.0, 1.5, 2.0] {
            let err = match cache.nearest_value(t, "value", 0.1, &()).await {
                Err(e) => e,
                Ok(v) => panic!("expected a gap, got {v:?}"),
            };
            let cause = err.warning_cause().ok_or("gap has a warning cause")?;
            if warnings.report(&cause, &err) {
                reported += 1;
            }
        }
        warnings.end_operation();
    }
    assert_eq!(reported, 2);
    Ok(())
}
