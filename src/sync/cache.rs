//! Request dedup cache
//!
//! Keyed, TTL-bound cache of resolved values with in-flight collapse:
//! concurrent reads of a key that is already loading share the pending load
//! instead of starting another one.
//!
//! ## Invariants
//!
//! - A value younger than the caller's TTL is returned without calling the loader.
//! - At most one load per key is in flight; every caller arriving meanwhile
//!   awaits that same load.
//! - Failures are never cached. The next caller after a failed load retries.
//!
//! The slot lookup and the in-flight registration happen under one shard lock
//! of the map, with no await in between.
//!
//! Expired entries are swept whenever a miss starts a new load, so the map
//! stays bounded by the keys read within one TTL.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::clock::{default_clock, Clock};
use crate::error::{AgentboardError, Result};

type LoadResult<V> = std::result::Result<V, Arc<AgentboardError>>;
type SharedLoad<V> = Shared<BoxFuture<'static, LoadResult<V>>>;

enum Slot<V> {
    /// `ttl` is the TTL of the read that started the load; used for sweeping
    Ready {
        value: V,
        stored_at: Instant,
        ttl: Duration,
    },
    Loading { load_id: u64, load: SharedLoad<V> },
}

/// Cache counters
#[derive(Debug, Default)]
struct CacheCounters {
    hits: AtomicU64,
    loads: AtomicU64,
    collapsed: AtomicU64,
    failures: AtomicU64,
}

/// Snapshot of cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads served from a live entry
    pub hits: u64,
    /// Loader invocations
    pub loads: u64,
    /// Reads that joined an in-flight load
    pub collapsed: u64,
    /// Loads that failed
    pub failures: u64,
}

impl CacheStats {
    /// Fraction of reads that did not trigger a load (0.0 when unused).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.collapsed + self.loads;
        if total == 0 {
            0.0
        } else {
            (self.hits + self.collapsed) as f64 / total as f64
        }
    }
}

/// TTL cache with in-flight collapse
pub struct DedupCache<K, V> {
    slots: Arc<DashMap<K, Slot<V>>>,
    clock: Arc<dyn Clock>,
    next_load_id: AtomicU64,
    counters: Arc<CacheCounters>,
}

impl<K, V> DedupCache<K, V>
where
    K: Eq + Hash + Clone + fmt::Display + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::with_clock(default_clock())
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            slots: Arc::new(DashMap::new()),
            clock,
            next_load_id: AtomicU64::new(1),
            counters: Arc::new(CacheCounters::default()),
        }
    }

    /// Resolve `key`, calling `loader` only when no live entry and no
    /// in-flight load exist.
    ///
    /// `loader` is invoked while the key's shard is locked, so it must only
    /// build the future and not touch this cache synchronously.
    pub async fn get<F, Fut>(&self, key: K, ttl: Duration, loader: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let now = self.clock.now();
        let mut started = false;

        let load = match self.slots.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let pending = match occupied.get() {
                    Slot::Ready {
                        value, stored_at, ..
                    } if now.duration_since(*stored_at) < ttl => {
                        self.counters.hits.fetch_add(1, Ordering::Relaxed);
                        return Ok(value.clone());
                    }
                    Slot::Loading { load, .. } => Some(load.clone()),
                    Slot::Ready { .. } => None,
                };
                match pending {
                    Some(load) => {
                        self.counters.collapsed.fetch_add(1, Ordering::Relaxed);
                        debug!(%key, "joining in-flight load");
                        load
                    }
                    None => {
                        let (load_id, load) = self.spawn_load(key.clone(), ttl, loader());
                        occupied.insert(Slot::Loading {
                            load_id,
                            load: load.clone(),
                        });
                        started = true;
                        load
                    }
                }
            }
            Entry::Vacant(vacant) => {
                let (load_id, load) = self.spawn_load(key.clone(), ttl, loader());
                vacant.insert(Slot::Loading {
                    load_id,
                    load: load.clone(),
                });
                started = true;
                load
            }
        };

        // shard guard is released here; retain() locks every shard
        if started {
            self.purge_expired();
        }

        load.await.map_err(AgentboardError::Shared)
    }

    /// Run the load on its own task so settlement bookkeeping happens even if
    /// every caller stops awaiting.
    fn spawn_load<Fut>(&self, key: K, ttl: Duration, fut: Fut) -> (u64, SharedLoad<V>)
    where
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let load_id = self.next_load_id.fetch_add(1, Ordering::Relaxed);
        self.counters.loads.fetch_add(1, Ordering::Relaxed);
        debug!(%key, load_id, "cache miss, loading");

        let slots = Arc::clone(&self.slots);
        let clock = Arc::clone(&self.clock);
        let counters = Arc::clone(&self.counters);

        let task = tokio::spawn(async move {
            let result = fut.await;

            // Only settle the slot if it still belongs to this load; an
            // invalidate() may have replaced it meanwhile.
            if let Entry::Occupied(mut occupied) = slots.entry(key.clone()) {
                let owned = matches!(
                    occupied.get(),
                    Slot::Loading { load_id: current, .. } if *current == load_id
                );
                if owned {
                    match &result {
                        Ok(value) => {
                            occupied.insert(Slot::Ready {
                                value: value.clone(),
                                stored_at: clock.now(),
                                ttl,
                            });
                        }
                        Err(_) => {
                            occupied.remove();
                        }
                    }
                }
            }

            if let Err(e) = &result {
                counters.failures.fetch_add(1, Ordering::Relaxed);
                warn!(%key, load_id, error = %e, "cache load failed");
            }

            result.map_err(Arc::new)
        });

        let load = async move {
            match task.await {
                Ok(result) => result,
                Err(join_error) => Err(Arc::new(AgentboardError::Internal(format!(
                    "cache loader task failed: {join_error}"
                )))),
            }
        }
        .boxed()
        .shared();

        (load_id, load)
    }

    /// Drop any entry or in-flight registration for `key`.
    pub fn invalidate(&self, key: &K) {
        self.slots.remove(key);
    }

    /// Remove ready entries older than their TTL; returns how many went.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.slots.len();
        self.slots.retain(|_, slot| match slot {
            Slot::Ready { stored_at, ttl, .. } => now.duration_since(*stored_at) < *ttl,
            Slot::Loading { .. } => true,
        });
        let purged = before.saturating_sub(self.slots.len());
        if purged > 0 {
            debug!(purged, "expired cache entries swept");
        }
        purged
    }

    pub fn clear(&self) {
        self.slots.clear();
    }

    /// Number of live-or-loading slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            loads: self.counters.loads.load(Ordering::Relaxed),
            collapsed: self.counters.collapsed.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
        }
    }
}

impl<K, V> Default for DedupCache<K, V>
where
    K: Eq + Hash + Clone + fmt::Display + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_loader(
        calls: &Arc<AtomicUsize>,
        value: u32,
        delay: Duration,
    ) -> impl FnOnce() -> BoxFuture<'static, Result<u32>> {
        let calls = Arc::clone(calls);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                tokio::time::sleep(delay).await;
                Ok(value)
            }
            .boxed()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_reads_collapse_into_one_load() {
        let cache: Arc<DedupCache<String, u32>> = Arc::new(DedupCache::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let cache = Arc::clone(&cache);
            let loader = counting_loader(&calls, 42, Duration::from_millis(50));
            handles.push(tokio::spawn(async move {
                cache
                    .get("user:7".to_string(), Duration::from_millis(5000), loader)
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let stats = cache.stats();
        assert_eq!(stats.loads, 1);
        assert_eq!(stats.collapsed, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_entry_skips_loader() {
        let cache: DedupCache<String, u32> = DedupCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let ttl = Duration::from_millis(100);

        let first = cache
            .get("id:1".to_string(), ttl, counting_loader(&calls, 1, Duration::ZERO))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_millis(50)).await;
        let second = cache
            .get("id:1".to_string(), ttl, counting_loader(&calls, 2, Duration::ZERO))
            .await
            .unwrap();

        assert_eq!((first, second), (1, 1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().hits, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_reloads() {
        let cache: DedupCache<String, u32> = DedupCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let ttl = Duration::from_millis(100);

        cache
            .get("id:1".to_string(), ttl, counting_loader(&calls, 1, Duration::ZERO))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_millis(150)).await;
        let reloaded = cache
            .get("id:1".to_string(), ttl, counting_loader(&calls, 2, Duration::ZERO))
            .await
            .unwrap();

        assert_eq!(reloaded, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_are_not_cached() {
        let cache: DedupCache<String, u32> = DedupCache::new();
        let ttl = Duration::from_secs(5);

        let err = cache
            .get("user:9".to_string(), ttl, || async {
                Err(AgentboardError::Http {
                    status: 502,
                    message: None,
                })
            })
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(502));
        assert!(cache.is_empty());

        let calls = Arc::new(AtomicUsize::new(0));
        let value = cache
            .get("user:9".to_string(), ttl, counting_loader(&calls, 9, Duration::ZERO))
            .await
            .unwrap();
        assert_eq!(value, 9);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_collapsed_callers_share_failure() {
        let cache: Arc<DedupCache<String, u32>> = Arc::new(DedupCache::new());

        let slow_failure = || async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Err(AgentboardError::Http {
                status: 401,
                message: None,
            })
        };
        let (a, b) = tokio::join!(
            cache.get("id:3".to_string(), Duration::from_secs(5), slow_failure),
            cache.get("id:3".to_string(), Duration::from_secs(5), slow_failure),
        );
        assert!(a.unwrap_err().is_unauthorized());
        assert!(b.unwrap_err().is_unauthorized());
        assert_eq!(cache.stats().loads, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_forces_reload() {
        let cache: DedupCache<String, u32> = DedupCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let ttl = Duration::from_secs(5);

        cache
            .get("id:4".to_string(), ttl, counting_loader(&calls, 4, Duration::ZERO))
            .await
            .unwrap();
        cache.invalidate(&"id:4".to_string());
        cache
            .get("id:4".to_string(), ttl, counting_loader(&calls, 5, Duration::ZERO))
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entries_swept_on_miss() {
        let cache: DedupCache<String, u32> = DedupCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let ttl = Duration::from_millis(100);

        for (idx, key) in ["id:10", "id:11", "id:12"].iter().enumerate() {
            cache
                .get(key.to_string(), ttl, counting_loader(&calls, idx as u32, Duration::ZERO))
                .await
                .unwrap();
        }
        assert_eq!(cache.len(), 3);

        // none of the old keys is read again; a miss on a new key sweeps them
        tokio::time::advance(Duration::from_millis(150)).await;
        cache
            .get("id:13".to_string(), ttl, counting_loader(&calls, 13, Duration::ZERO))
            .await
            .unwrap();
        assert_eq!(cache.len(), 1);

        // live entries survive an explicit sweep
        assert_eq!(cache.purge_expired(), 0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_hit_rate() {
        let stats = CacheStats {
            hits: 3,
            loads: 1,
            collapsed: 0,
            failures: 0,
        };
        assert!((stats.hit_rate() - 0.75).abs() < f64::EPSILON);
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }
}
