use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::constants::{CACHE_HIT_RATE_TARGET, MIN_HIT_RATE_OBSERVATIONS};
use crate::error::Result;

#[derive(Debug)]
struct Slot<T> {
    value: Arc<T>,
    computed_at: DateTime<Utc>,
}

/// Hit/miss counters and snapshot age, surfaced through /health.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub computed_at: Option<DateTime<Utc>>,
    pub age_secs: Option<i64>,
}

/// Single-slot cache for one expensive aggregate computation.
///
/// The slot is the only mutable state shared across concurrent requests. A
/// `tokio::sync::Mutex` is held across the whole compute-if-missing section,
/// so concurrent misses collapse into a single computation and the upstream
/// fetch runs exactly once per expiry. The stored value is recomputed
/// wholesale, never patched incrementally.
#[derive(Debug)]
pub struct SnapshotCache<T> {
    slot: Mutex<Option<Slot<T>>>,
    ttl: Duration,
    hit_count: AtomicU64,
    miss_count: AtomicU64,
}

impl<T> SnapshotCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            slot: Mutex::new(None),
            ttl,
            hit_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
        }
    }

    /// Return the cached value, or run `compute` to refill the slot. The
    /// returned bool is true on a cache hit.
    ///
    /// A compute error leaves the slot untouched, so the next caller retries.
    pub async fn get_or_compute<F, Fut>(&self, compute: F) -> Result<(Arc<T>, bool)>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut slot = self.slot.lock().await;
        let now = Utc::now();

        if let Some(existing) = slot.as_ref() {
            if now - existing.computed_at < self.ttl {
                let hits = self.hit_count.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(hits, "Snapshot cache hit");
                self.check_hit_rate(hits, self.miss_count.load(Ordering::Relaxed));
                return Ok((existing.value.clone(), true));
            }
        }

        let misses = self.miss_count.fetch_add(1, Ordering::Relaxed) + 1;
        info!(misses, "Snapshot cache miss, recomputing aggregate");

        let value = Arc::new(compute().await?);
        *slot = Some(Slot {
            value: value.clone(),
            computed_at: Utc::now(),
        });

        self.check_hit_rate(self.hit_count.load(Ordering::Relaxed), misses);
        Ok((value, false))
    }

    /// Degradation signal, not an error: a sustained low hit rate means the
    /// TTL or traffic pattern needs attention, while individual requests are
    /// still served.
    ///
    /// This log is the immediate alert only. The queryable hit-rate series
    /// lives in `MetricsRecorder`: the request handler records a
    /// `PerformanceSample` with the hit/miss outcome of every
    /// `get_or_compute`, and `health_status` applies the banded thresholds
    /// there.
    fn check_hit_rate(&self, hits: u64, misses: u64) {
        let total = hits + misses;
        if total < MIN_HIT_RATE_OBSERVATIONS {
            return;
        }
        let hit_rate = hits as f64 / total as f64;
        if hit_rate < CACHE_HIT_RATE_TARGET {
            warn!(
                hit_rate,
                threshold = CACHE_HIT_RATE_TARGET,
                total,
                "Performance alert: snapshot cache hit rate below target"
            );
        }
    }

    pub async fn stats(&self) -> SnapshotStats {
        let hits = self.hit_count.load(Ordering::Relaxed);
        let misses = self.miss_count.load(Ordering::Relaxed);
        let total = hits + misses;

        let computed_at = self.slot.lock().await.as_ref().map(|s| s.computed_at);

        SnapshotStats {
            hits,
            misses,
            hit_rate: if total > 0 {
                hits as f64 / total as f64
            } else {
                0.0
            },
            computed_at,
            age_secs: computed_at.map(|t| (Utc::now() - t).num_seconds()),
        }
    }

    /// Drop the cached value so the next request recomputes.
    pub async fn invalidate(&self) {
        *self.slot.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_first_call_computes_second_call_hits() {
        let cache: SnapshotCache<Vec<u32>> = SnapshotCache::new(Duration::hours(12));
        let calls = AtomicUsize::new(0);

        let (value, hit) = cache
            .get_or_compute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec![1, 2, 3])
            })
            .await
            .unwrap();
        assert!(!hit);
        assert_eq!(*value, vec![1, 2, 3]);

        let (_, hit) = cache
            .get_or_compute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec![9])
            })
            .await
            .unwrap();
        assert!(hit);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_expired_snapshot_recomputes() {
        let cache: SnapshotCache<u32> = SnapshotCache::new(Duration::seconds(0));
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let (_, hit) = cache
                .get_or_compute(|| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(0u32)
                })
                .await
                .unwrap();
            assert!(!hit);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_compute_error_leaves_slot_empty() {
        let cache: SnapshotCache<u32> = SnapshotCache::new(Duration::hours(12));

        let result = cache
            .get_or_compute(|| async { Err(AppError::Other("boom".to_string())) })
            .await;
        assert!(result.is_err());

        // Next caller retries the computation rather than seeing a poisoned slot.
        let (value, hit) = cache.get_or_compute(|| async { Ok(5u32) }).await.unwrap();
        assert!(!hit);
        assert_eq!(*value, 5);
    }

    #[tokio::test]
    async fn test_concurrent_misses_collapse_into_one_computation() {
        let cache: Arc<SnapshotCache<u32>> = Arc::new(SnapshotCache::new(Duration::hours(12)));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_compute(|| async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                        Ok(42u32)
                    })
                    .await
                    .unwrap()
            }));
        }

        let mut hits = 0;
        for handle in handles {
            let (value, hit) = handle.await.unwrap();
            assert_eq!(*value, 42);
            if hit {
                hits += 1;
            }
        }

        // Exactly one task computed; the rest waited on the lock and hit.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(hits, 3);
    }

    #[tokio::test]
    async fn test_invalidate_forces_recompute() {
        let cache: SnapshotCache<u32> = SnapshotCache::new(Duration::hours(12));
        cache.get_or_compute(|| async { Ok(1u32) }).await.unwrap();
        cache.invalidate().await;

        let (value, hit) = cache.get_or_compute(|| async { Ok(2u32) }).await.unwrap();
        assert!(!hit);
        assert_eq!(*value, 2);
    }
}
