#![allow(missing_docs)]

mod common;

use common::{RecordingAdapter, TestResult, grid};
use tempfile::TempDir;
use timeseries_cache_core::{
    CacheConfig, LoadOutcome, RangeRequest, SegmentCache, accept_all, codec,
};

fn config(dir: &TempDir) -> CacheConfig {
    CacheConfig::new(1.0).with_cache_file(dir.path().join("cache").join("test.tscache"))
}

fn adapter(end: f64) -> RecordingAdapter {
    let mut samples = grid(0.0, 3.0, 0.5);
    samples.extend(grid(5.0, end, 0.5));
    RecordingAdapter::scalar(0.0, end, &samples)
}

#[tokio::test]
async fn save_then_open_restores_the_store() -> TestResult {
    let tmp = TempDir::new()?;

    let cache = SegmentCache::new(adapter(10.0), config(&tmp))?;
    let first = cache
        .query(&RangeRequest::new(1.0, 7.0), accept_all, &())
        .await?;
    assert!(cache.save().await?);
    let saved_units = cache.units().await;

    let reopened = SegmentCache::open(adapter(10.0), config(&tmp)).await?;
    assert_eq!(reopened.units().await, saved_units);

    let again = reopened
        .query(&RangeRequest::new(1.0, 7.0), accept_all, &())
        .await?;
    assert_eq!(reopened.adapter().call_count(), 0);
    assert_eq!(again.times(), first.times());
    assert_eq!(again.gaps(), first.gaps());

    let stats = reopened.stats().await;
    assert_eq!(stats.units, 7);
    assert_eq!(stats.empty_units, 2);
    assert_eq!(stats.fetch_calls, 0);
    Ok(())
}

#[tokio::test]
async fn fingerprint_mismatch_starts_empty() -> TestResult {
    let tmp = TempDir::new()?;

    let cache = SegmentCache::new(adapter(10.0), config(&tmp))?;
    cache
        .query(&RangeRequest::new(0.0, 9.0), accept_all, &())
        .await?;
    cache.save().await?;

    // Same dataset id, different global boundary.
    let other = SegmentCache::new(adapter(20.0), config(&tmp))?;
    match other.load().await? {
        LoadOutcome::Discarded { .. } => {}
        outcome => panic!("expected Discarded, got {outcome:?}"),
    }
    assert!(other.units().await.is_empty());

    // A different unit size is a different fingerprint too.
    let resized = SegmentCache::new(adapter(10.0), config(&tmp).with_max_units_per_fetch(4))?;
    assert!(matches!(resized.load().await?, LoadOutcome::Loaded { units: 10 }));
    let coarse = CacheConfig {
        unit_size: 2.0,
        ..config(&tmp)
    };
    let coarse = SegmentCache::new(adapter(10.0), coarse)?;
    assert!(matches!(coarse.load().await?, LoadOutcome::Discarded { .. }));
    Ok(())
}

#[tokio::test]
async fn truncated_file_is_rejected_as_a_whole() -> TestResult {
    let tmp = TempDir::new()?;
    let cfg = config(&tmp);
    let path = cfg.cache_file.clone().ok_or("cache file")?;

    let cache = SegmentCache::new(adapter(10.0), cfg.clone())?;
    cache
        .query(&RangeRequest::new(0.0, 9.0), accept_all, &())
        .await?;
    cache.save().await?;

    let bytes = std::fs::read(&path)?;
    std::fs::write(&path, &bytes[..bytes.len() - 5])?;

    let reopened = SegmentCache::new(adapter(10.0), cfg)?;
    assert!(matches!(reopened.load().await?, LoadOutcome::Discarded { .. }));
    assert!(reopened.units().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn garbage_and_missing_files_start_cold() -> TestResult {
    let tmp = TempDir::new()?;
    let cfg = config(&tmp);

    let cache = SegmentCache::new(adapter(10.0), cfg.clone())?;
    assert_eq!(cache.load().await?, LoadOutcome::Missing);

    let path = cfg.cache_file.clone().ok_or("cache file")?;
    std::fs::create_dir_all(path.parent().ok_or("parent")?)?;
    std::fs::write(&path, b"definitely not a cache file")?;
    assert!(matches!(cache.load().await?, LoadOutcome::Discarded { .. }));

    let in_memory = SegmentCache::new(adapter(10.0), CacheConfig::new(1.0))?;
    assert_eq!(in_memory.load().await?, LoadOutcome::NotConfigured);
    assert!(!in_memory.save().await?);
    Ok(())
}

#[tokio::test]
async fn inspect_reads_any_cache_file() -> TestResult {
    let tmp = TempDir::new()?;
    let cfg = config(&tmp);
    let path = cfg.cache_file.clone().ok_or("cache file")?;

    let cache = SegmentCache::new(adapter(10.0), cfg)?;
    cache
        .query(&RangeRequest::new(2.0, 5.5), accept_all, &())
        .await?;
    cache.save().await?;

    let summary = codec::inspect(&std::fs::read(&path)?)?;
    assert_eq!(summary.header.fingerprint, *cache.fingerprint());
    assert_eq!(summary.header.unit_count, 4);
    let indices: Vec<i64> = summary.units.iter().map(|(i, _, _)| *i).collect();
    assert_eq!(indices, vec![2, 3, 4, 5]);
    Ok(())
}

/// Save unit 3 (an empty marker) alone, then let `corrupt` rewrite its
/// record in place.
async fn saved_with_corrupt_record<F>(tmp: &TempDir, corrupt: F) -> TestResult
where
    F: FnOnce(&mut [u8]),
{
    let cfg = config(tmp);
    let path = cfg.cache_file.clone().ok_or("cache file")?;

    let cache = SegmentCache::new(adapter(10.0), cfg)?;
    cache
        .query(&RangeRequest::new(3.0, 3.5), accept_all, &())
        .await?;
    cache.save().await?;

    let mut bytes = std::fs::read(&path)?;
    // magic (8) + version (2) + header length (4) + header
    let header_len = u32::from_le_bytes(bytes[10..14].try_into()?) as usize;
    corrupt(&mut bytes[14 + header_len..]);
    std::fs::write(&path, &bytes)?;
    Ok(())
}

#[tokio::test]
async fn well_formed_but_invalid_records_are_discarded_on_open() -> TestResult {
    let cases: Vec<(&str, Box<dyn FnOnce(&mut [u8])>)> = vec![
        (
            "index beyond f64 precision",
            Box::new(|record: &mut [u8]| record[..8].copy_from_slice(&(1i64 << 60).to_le_bytes())),
        ),
        (
            "index at i64::MAX",
            Box::new(|record: &mut [u8]| record[..8].copy_from_slice(&i64::MAX.to_le_bytes())),
        ),
        (
            "unit outside the dataset bounds",
            Box::new(|record: &mut [u8]| {
                record[..8].copy_from_slice(&20i64.to_le_bytes());
                record[8..16].copy_from_slice(&20.0f64.to_le_bytes());
                record[16..24].copy_from_slice(&21.0f64.to_le_bytes());
            }),
        ),
        (
            "span not matching the index",
            Box::new(|record: &mut [u8]| record[8..16].copy_from_slice(&3.25f64.to_le_bytes())),
        ),
        ("unknown kind byte", Box::new(|record: &mut [u8]| record[24] = 7)),
    ];

    for (name, corrupt) in cases {
        let tmp = TempDir::new()?;
        saved_with_corrupt_record(&tmp, corrupt).await?;

        let reopened = SegmentCache::open(adapter(10.0), config(&tmp)).await?;
        assert!(reopened.units().await.is_empty(), "{name}");
        assert!(
            matches!(reopened.load().await?, LoadOutcome::Discarded { .. }),
            "{name}"
        );

        // The store still serves queries from the source.
        let result = reopened
            .query(&RangeRequest::new(0.0, 0.75), accept_all, &())
            .await?;
        assert_eq!(result.times(), &[0.0, 0.5], "{name}");
    }
    Ok(())
}
