//! `SegmentCache`: a segment store bound to one fetch adapter.
//!
//! This module owns the cache lifecycle:
//!
//! - construction (cold, or warm from a persisted cache file);
//! - saving the store at a quiescent point (shutdown, disposal);
//! - statistics.
//!
//! Range queries live in `query`, point lookups in `point`.
//!
//! The store sits behind an async mutex that is held across the whole
//! "find missing units, fetch, insert" sequence, so two concurrent queries
//! never fetch the same unit twice.

pub mod point;
pub mod query;

use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use log::{debug, info, warn};
use snafu::prelude::*;
use tokio::sync::Mutex;

use crate::{
    codec::{self, Fingerprint},
    config::CacheConfig,
    discretize::Discretizer,
    error::{CacheResult, CodecSnafu, StorageSnafu},
    fetch::{DatasetDescriptor, FetchAdapter},
    storage::{self, CacheLocation},
    store::SegmentStore,
    unit::CacheUnit,
};

/// Acceptance predicate that trusts every cached unit.
pub fn accept_all(_: &CacheUnit) -> bool {
    true
}

/// What happened when a persisted cache file was loaded.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// No cache file is configured.
    NotConfigured,
    /// The cache file does not exist yet.
    Missing,
    /// The file was accepted and this many units were restored.
    Loaded {
        /// Restored unit count.
        units: usize,
    },
    /// The file was rejected as a whole and the store starts empty.
    Discarded {
        /// Human-readable reason.
        reason: String,
    },
}

/// Point-in-time counters for a cache.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    /// Units present in the store.
    pub units: usize,
    /// Present units carrying the empty marker.
    pub empty_units: usize,
    /// Total samples across all units.
    pub samples: usize,
    /// Adapter calls made since construction.
    pub fetch_calls: u64,
    /// Fraction of the global unit range that is present, if computable.
    pub coverage_ratio: Option<f64>,
}

/// A lazily filled, persistable cache over one dataset.
pub struct SegmentCache<A: FetchAdapter> {
    adapter: A,
    config: CacheConfig,
    descriptor: DatasetDescriptor,
    discretizer: Discretizer,
    fingerprint: Fingerprint,
    store: Mutex<SegmentStore>,
    fetch_calls: AtomicU64,
}

impl<A: FetchAdapter> SegmentCache<A> {
    /// Create an empty cache. The cache file, if configured, is not read.
    pub fn new(adapter: A, config: CacheConfig) -> CacheResult<Self> {
        config.validate()?;
        let discretizer = Discretizer::new(config.unit_size)?;
        let descriptor = adapter.descriptor();
        let fingerprint = Fingerprint::of(&descriptor, &discretizer);
        let store = SegmentStore::new(
            discretizer,
            descriptor.bounds,
            Arc::new(descriptor.schema.clone()),
        );

        Ok(Self {
            adapter,
            config,
            descriptor,
            discretizer,
            fingerprint,
            store: Mutex::new(store),
            fetch_calls: AtomicU64::new(0),
        })
    }

    /// Create a cache and warm it from the configured cache file.
    ///
    /// A missing, incompatible or corrupt file is not an error: the cache
    /// starts cold and the reason is logged.
    pub async fn open(adapter: A, config: CacheConfig) -> CacheResult<Self> {
        let cache = Self::new(adapter, config)?;
        cache.load().await?;
        Ok(cache)
    }

    /// The adapter backing this cache.
    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Active configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Dataset identity, schema and boundary.
    pub fn descriptor(&self) -> &DatasetDescriptor {
        &self.descriptor
    }

    /// Mapping between times and unit indices.
    pub fn discretizer(&self) -> &Discretizer {
        &self.discretizer
    }

    /// Fingerprint written to and expected from the cache file.
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Adapter calls made so far.
    pub fn fetch_calls(&self) -> u64 {
        self.fetch_calls.load(Ordering::Relaxed)
    }

    fn cache_file(&self) -> Option<(CacheLocation, PathBuf)> {
        let path = self.config.cache_file.as_deref()?;
        Some(split_path(path))
    }

    /// Replace the store contents with the configured cache file.
    ///
    /// The file is applied all-or-nothing; on any problem the store is left
    /// empty and the outcome says why.
    pub async fn load(&self) -> CacheResult<LoadOutcome> {
        let Some((location, rel)) = self.cache_file() else {
            return Ok(LoadOutcome::NotConfigured);
        };
        let shown = location.join(&rel).display().to_string();

        let mut store = self.store.lock().await;
        store.clear();

        let bytes = match storage::read_all_bytes(&location, &rel).await {
            Ok(bytes) => bytes,
            Err(e) if e.is_not_found() => {
                info!("No cache file at {shown}; starting with an empty cache");
                return Ok(LoadOutcome::Missing);
            }
            Err(e) => {
                warn!("Failed to read cache file {shown}: {e}. Starting with an empty cache.");
                return Ok(LoadOutcome::Discarded {
                    reason: e.to_string(),
                });
            }
        };

        let units = match codec::decode(&bytes, &self.fingerprint) {
            Ok(units) => units,
            Err(e) => {
                if e.is_incompatible() {
                    warn!("Cache file {shown} belongs to another dataset shape; discarding it");
                } else {
                    warn!("Cache file {shown} is corrupt: {e}. Starting with an empty cache.");
                }
                return Ok(LoadOutcome::Discarded {
                    reason: e.to_string(),
                });
            }
        };

        let mut count = 0;
        for unit in units {
            if !self.adapter.is_persistent(&unit) {
                debug!("Skipping volatile unit {} from {shown}", unit.index());
                continue;
            }
            count += 1;
            if let Err(e) = store.put(unit.index(), unit) {
                store.clear();
                warn!("Cache file {shown} holds an invalid unit: {e}. Starting with an empty cache.");
                return Ok(LoadOutcome::Discarded {
                    reason: e.to_string(),
                });
            }
        }

        debug!("Loaded {count} units from {shown}");
        Ok(LoadOutcome::Loaded { units: count })
    }

    /// Write the store to the configured cache file.
    ///
    /// Units the adapter reports as not persistent are left out.
    /// Call from a quiescent point; returns `Ok(false)` when no cache file
    /// is configured.
    pub async fn save(&self) -> CacheResult<bool> {
        let Some((location, rel)) = self.cache_file() else {
            return Ok(false);
        };

        let bytes = {
            let store = self.store.lock().await;
            let units: Vec<&CacheUnit> = store
                .units()
                .filter(|u| self.adapter.is_persistent(u))
                .collect();
            let skipped = store.len() - units.len();
            if skipped > 0 {
                debug!("Leaving {skipped} volatile units out of the cache file");
            }
            codec::encode(&self.fingerprint, units.into_iter()).context(CodecSnafu)?
        };

        storage::write_atomic(&location, &rel, &bytes)
            .await
            .context(StorageSnafu)?;
        debug!(
            "Saved cache for '{}' to {}",
            self.descriptor.id,
            location.join(&rel).display()
        );
        Ok(true)
    }

    /// Copies of all stored units, in index order.
    pub async fn units(&self) -> Vec<CacheUnit> {
        self.store.lock().await.units().cloned().collect()
    }

    /// Current counters.
    pub async fn stats(&self) -> CacheStats {
        let store = self.store.lock().await;
        let coverage_ratio = store
            .coverage(store.index_bounds(), accept_all)
            .map(|c| c.coverage_ratio());

        CacheStats {
            units: store.len(),
            empty_units: store.units().filter(|u| u.is_empty_marker()).count(),
            samples: store.units().map(CacheUnit::sample_count).sum(),
            fetch_calls: self.fetch_calls(),
            coverage_ratio,
        }
    }
}

fn split_path(path: &Path) -> (CacheLocation, PathBuf) {
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) if !parent.as_os_str().is_empty() => {
            (CacheLocation::local(parent), PathBuf::from(name))
        }
        _ => (CacheLocation::local("."), path.to_path_buf()),
    }
}
