//! End-to-end properties of the polling core, on paused tokio time.

use agentboard::sync::{self, CancellationToken, DedupCache, DriverOptions, DriverState, Feed, StaleGuard};
use agentboard::{merge, Result, Series, SeriesPoint};
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

/// Answers call `n` with `n` after the n-th scripted delay, ignoring
/// cancellation so superseded attempts really do resolve late.
struct DelayedFeed {
    delays: Mutex<VecDeque<Duration>>,
    calls: AtomicUsize,
    published: Arc<Mutex<Vec<usize>>>,
}

impl DelayedFeed {
    fn new(delays: &[u64]) -> (Self, Arc<Mutex<Vec<usize>>>) {
        let published = Arc::new(Mutex::new(Vec::new()));
        let feed = Self {
            delays: Mutex::new(delays.iter().map(|ms| Duration::from_millis(*ms)).collect()),
            calls: AtomicUsize::new(0),
            published: Arc::clone(&published),
        };
        (feed, published)
    }
}

#[async_trait]
impl Feed for DelayedFeed {
    type Payload = usize;

    fn key(&self) -> &str {
        "delayed"
    }

    fn interval(&self) -> Duration {
        Duration::from_secs(60)
    }

    async fn fetch(&self, _token: CancellationToken) -> Result<usize> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = self.delays.lock().unwrap().pop_front().unwrap_or_default();
        tokio::time::sleep(delay).await;
        Ok(n)
    }

    fn publish(&self, payload: usize) {
        self.published.lock().unwrap().push(payload);
    }
}

#[tokio::test]
async fn sequence_numbers_are_strictly_increasing() {
    let guard = Arc::new(StaleGuard::new());
    let mut tasks = Vec::new();
    for _ in 0..8 {
        let guard = Arc::clone(&guard);
        tasks.push(tokio::spawn(async move {
            let mut issued = Vec::new();
            for _ in 0..100 {
                issued.push(guard.next());
                tokio::task::yield_now().await;
            }
            issued
        }));
    }

    let mut all = HashSet::new();
    for task in tasks {
        let issued = task.await.unwrap();
        assert!(issued.windows(2).all(|w| w[0] < w[1]));
        all.extend(issued);
    }
    assert_eq!(all.len(), 800);
    assert_eq!(guard.latest(), 800);
    assert!(guard.is_current(800));
    assert!(!guard.is_current(799));
}

#[tokio::test(start_paused = true)]
async fn overtaken_response_is_never_published() {
    // first attempt takes 500ms, the forced second one 10ms
    let (feed, published) = DelayedFeed::new(&[500, 10]);
    let handle = sync::start(feed, DriverOptions::default());
    settle().await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    handle.force_now();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(*published.lock().unwrap(), vec![2]);

    // the first response lands at t=500ms and is dropped
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(*published.lock().unwrap(), vec![2]);
    assert_eq!(handle.stats().stale, 1);
    assert_eq!(handle.latest_seq(), 2);
    handle.stop();
}

#[tokio::test(start_paused = true)]
async fn stop_discards_in_flight_response() {
    let (feed, published) = DelayedFeed::new(&[1_000]);
    let handle = sync::start(feed, DriverOptions::default());
    settle().await;

    tokio::time::sleep(Duration::from_millis(500)).await;
    handle.stop();
    assert_eq!(handle.state(), DriverState::Stopped);
    assert_eq!(*handle.next_fire().borrow(), None);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert!(published.lock().unwrap().is_empty());
    assert_eq!(handle.stats().attempts, 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_cache_reads_collapse_into_one_load() {
    let cache: DedupCache<String, u32> = DedupCache::new();
    let loads = Arc::new(AtomicUsize::new(0));

    let reads = (0..5).map(|_| {
        let loads = Arc::clone(&loads);
        cache.get("agent:7".to_string(), Duration::from_secs(5), move || async move {
            loads.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(7)
        })
    });
    let results = futures::future::join_all(reads).await;

    assert!(results.iter().all(|r| matches!(r, Ok(7))));
    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert_eq!(cache.stats().collapsed, 4);
}

#[tokio::test(start_paused = true)]
async fn cache_entry_expires_after_ttl() {
    let cache: DedupCache<String, u32> = DedupCache::new();
    let loads = Arc::new(AtomicUsize::new(0));
    let ttl = Duration::from_millis(100);

    let read = || {
        let loads = Arc::clone(&loads);
        cache.get("k".to_string(), ttl, move || async move {
            Ok(loads.fetch_add(1, Ordering::SeqCst) as u32 + 1)
        })
    };

    assert_eq!(read().await.unwrap(), 1);
    tokio::time::advance(Duration::from_millis(50)).await;
    assert_eq!(read().await.unwrap(), 1);
    tokio::time::advance(Duration::from_millis(100)).await;
    assert_eq!(read().await.unwrap(), 2);
    assert_eq!(loads.load(Ordering::SeqCst), 2);
}

#[test]
fn merged_timeline_forward_fills_without_backfill() {
    let a = Series::new("a", vec![SeriesPoint::new(0, 10.0), SeriesPoint::new(2, 30.0)]);
    let b = Series::new("b", vec![SeriesPoint::new(1, 5.0)]);
    let merged = merge(&[a, b], 1, None).unwrap();

    assert_eq!(merged.timestamps(), vec![0, 1, 2]);
    assert_eq!(merged.column("a").unwrap(), vec![Some(10.0), Some(10.0), Some(30.0)]);
    assert_eq!(merged.column("b").unwrap(), vec![None, Some(5.0), Some(5.0)]);
}

#[test]
fn merged_timeline_keeps_most_recent_rows() {
    let points = (0..1_000).map(|i| SeriesPoint::new(i, i as f64)).collect();
    let merged = merge(&[Series::new("a", points)], 1, Some(500)).unwrap();

    assert_eq!(merged.len(), 500);
    assert_eq!(merged.timestamps().first(), Some(&500));
    assert_eq!(merged.timestamps().last(), Some(&999));
}
