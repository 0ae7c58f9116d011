use dashmap::DashMap;
use parking_lot::RwLock;
use sc_types::ScResult;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::experiment::CalibrationResult;

type Slot = Arc<OnceCell<CalibrationResult>>;

/// Concurrent memo of calibrations keyed by training-set `ivhash`.
///
/// The slot for a key is inserted atomically before any work starts, so
/// concurrent callers asking for the same key share one computation.
#[derive(Debug, Default)]
pub struct CalibrationCache {
    slots: DashMap<String, Slot>,
    stats: RwLock<CacheStats>,
}

impl CalibrationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached calibration for `ivhash`, running `compute` only if
    /// no caller has produced it yet. A failed computation leaves the slot
    /// empty so a later call can retry.
    pub async fn get_or_calibrate<F, Fut>(&self, ivhash: &str, compute: F) -> ScResult<CalibrationResult>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ScResult<CalibrationResult>>,
    {
        let slot: Slot = self
            .slots
            .entry(ivhash.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        if let Some(result) = slot.get() {
            self.stats.write().hits += 1;
            debug!(ivhash, "calibration cache hit");
            return Ok(result.clone());
        }

        let mut computed = false;
        let result = slot
            .get_or_try_init(|| {
                computed = true;
                compute()
            })
            .await?
            .clone();

        {
            let mut stats = self.stats.write();
            if computed {
                stats.misses += 1;
            } else {
                stats.hits += 1;
            }
        }
        Ok(result)
    }

    pub fn get(&self, ivhash: &str) -> Option<CalibrationResult> {
        self.slots.get(ivhash).and_then(|slot| slot.get().cloned())
    }

    /// Seed the cache with a calibration loaded from elsewhere. Returns false
    /// if a value was already present.
    pub fn insert(&self, ivhash: &str, result: CalibrationResult) -> bool {
        let slot: Slot = self
            .slots
            .entry(ivhash.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();
        slot.set(result).is_ok()
    }

    pub fn evict(&self, ivhash: &str) -> bool {
        let removed = self.slots.remove(ivhash).is_some();
        if removed {
            self.stats.write().evictions += 1;
            info!(ivhash, "evicted cached calibration");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.value().initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.slots.clear();

        // Reset stats
        {
            let mut stats = self.stats.write();
            *stats = CacheStats::default();
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.read().clone()
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
