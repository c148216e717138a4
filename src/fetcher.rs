//! Batch fetch orchestration.
//!
//! Splits large id sets into super-batches (store parameter cap) and
//! sub-batches (feed per-call cap), acquires a rate-limiter slot per
//! call, and merges results into the position cache and tracking store.
//! A failing sub-batch is logged and skipped; the rest of the run
//! proceeds and the failed ids stay pending/stale for the next cycle.
//! Identical concurrent id sets are coalesced single-flight so a second
//! caller shares the in-flight result instead of burning rate budget.

use crate::cache::PositionCache;
use crate::feed::StateVectorSource;
use crate::models::{normalize_icao24, AircraftPosition};
use crate::rate_limit::RateLimiter;
use crate::store::TrackingStore;
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

pub struct BatchFetcher {
    feed: Arc<dyn StateVectorSource>,
    rate_limiter: Arc<RateLimiter>,
    positions: Arc<PositionCache>,
    store: Arc<TrackingStore>,
    super_batch_size: usize,
    sub_batch_size: usize,
    inter_batch_delay: Duration,
    acquire_timeout: Duration,
    inflight: Mutex<HashMap<String, broadcast::Sender<Vec<AircraftPosition>>>>,
}

impl BatchFetcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        feed: Arc<dyn StateVectorSource>,
        rate_limiter: Arc<RateLimiter>,
        positions: Arc<PositionCache>,
        store: Arc<TrackingStore>,
        super_batch_size: usize,
        sub_batch_size: usize,
        inter_batch_delay: Duration,
    ) -> Self {
        Self {
            feed,
            rate_limiter,
            positions,
            store,
            super_batch_size: super_batch_size.max(1),
            sub_batch_size: sub_batch_size.max(1),
            inter_batch_delay,
            acquire_timeout: Duration::from_secs(90),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch fresh state vectors for `ids` and merge them into the cache
    /// and store. Malformed ids are dropped silently; duplicates are
    /// collapsed. Sub-batch failures are soft - the returned set holds
    /// whatever was fetched.
    pub async fn fetch_and_update(&self, ids: &[String]) -> Result<Vec<AircraftPosition>> {
        let mut valid: Vec<String> = ids.iter().filter_map(|id| normalize_icao24(id)).collect();
        valid.sort();
        valid.dedup();

        if valid.is_empty() {
            return Ok(Vec::new());
        }

        // Single-flight: identical pending id sets share one run.
        let key = valid.join(",");
        let rx = {
            let mut inflight = self.inflight.lock().await;
            match inflight.get(&key) {
                Some(tx) => Some(tx.subscribe()),
                None => {
                    let (tx, _) = broadcast::channel(1);
                    inflight.insert(key.clone(), tx);
                    None
                }
            }
        };

        if let Some(mut rx) = rx {
            debug!("Coalescing duplicate fetch for {} ids", valid.len());
            // A closed channel means the in-flight run failed; callers
            // still get best-effort (empty) data rather than an error.
            return Ok(rx.recv().await.unwrap_or_default());
        }

        let result = self.run(&valid).await;

        let tx = self.inflight.lock().await.remove(&key);
        if let (Some(tx), Ok(fetched)) = (&tx, &result) {
            let _ = tx.send(fetched.clone());
        }

        result
    }

    async fn run(&self, ids: &[String]) -> Result<Vec<AircraftPosition>> {
        let total_subs = ids
            .chunks(self.super_batch_size)
            .map(|sb| sb.chunks(self.sub_batch_size).count())
            .sum::<usize>();

        let mut all = Vec::with_capacity(ids.len());
        let mut sub_index = 0usize;
        let mut budget_exhausted = false;

        for super_batch in ids.chunks(self.super_batch_size) {
            let mut fetched: Vec<AircraftPosition> = Vec::with_capacity(super_batch.len());

            for sub in super_batch.chunks(self.sub_batch_size) {
                sub_index += 1;

                if let Err(e) = self.rate_limiter.acquire(sub.len(), self.acquire_timeout).await {
                    // Daily exhaustion or an oversized batch: report and
                    // stop the run, keeping what we already have.
                    warn!("Stopping fetch run after {} calls: {}", sub_index - 1, e);
                    budget_exhausted = true;
                    break;
                }

                match self.feed.fetch_states(None, sub).await {
                    Ok(states) => {
                        for p in &states {
                            self.positions.update(p.clone());
                        }
                        fetched.extend(states);
                    }
                    Err(e) => {
                        // Soft failure: these ids stay pending/stale and
                        // get retried next poll cycle.
                        warn!("Sub-batch of {} ids failed, skipping: {}", sub.len(), e);
                    }
                }

                if sub_index < total_subs && !self.inter_batch_delay.is_zero() {
                    tokio::time::sleep(self.inter_batch_delay).await;
                }
            }

            if !fetched.is_empty() {
                if let Err(e) = self.store.upsert_batch(&fetched).await {
                    warn!("Failed to persist {} records: {}", fetched.len(), e);
                }
            }
            all.extend(fetched);

            if budget_exhausted {
                break;
            }
        }

        info!(
            "📡 Fetch run: {} positions for {} ids across {} calls",
            all.len(),
            ids.len(),
            sub_index
        );
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    struct MockFeed {
        calls: AtomicUsize,
        max_seen_batch: AtomicUsize,
        delay: Duration,
    }

    impl MockFeed {
        fn new(delay: Duration) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                max_seen_batch: AtomicUsize::new(0),
                delay,
            }
        }
    }

    #[async_trait]
    impl StateVectorSource for MockFeed {
        async fn fetch_states(
            &self,
            _time_cursor: Option<i64>,
            ids: &[String],
        ) -> Result<Vec<AircraftPosition>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.max_seen_batch.fetch_max(ids.len(), Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            let now = Utc::now().timestamp();
            Ok(ids
                .iter()
                .map(|id| AircraftPosition {
                    icao24: id.clone(),
                    latitude: 52.0,
                    longitude: 13.0,
                    altitude: 10_000.0,
                    velocity: 200.0,
                    heading: 90.0,
                    on_ground: false,
                    last_contact: now,
                })
                .collect())
        }
    }

    fn fetcher(
        dir: &tempfile::TempDir,
        feed: Arc<MockFeed>,
        rpm: u32,
    ) -> (BatchFetcher, Arc<TrackingStore>) {
        let store = Arc::new(
            TrackingStore::new(
                dir.path().join("test.db").to_str().unwrap(),
                RetryPolicy::new(3),
                600,
                86_400,
            )
            .unwrap(),
        );
        let positions = Arc::new(PositionCache::new(10, 1, 10.0, Duration::from_secs(300)));
        let limiter = Arc::new(RateLimiter::new(rpm, 100_000, 50).unwrap());

        let fetcher = BatchFetcher::new(
            feed,
            limiter,
            positions,
            store.clone(),
            1000,
            50,
            Duration::ZERO, // no inter-batch delay in tests
        );
        (fetcher, store)
    }

    #[tokio::test]
    async fn test_chunking_issues_exactly_43_calls_for_2137_ids() {
        let dir = tempdir().unwrap();
        let feed = Arc::new(MockFeed::new(Duration::ZERO));
        let (fetcher, store) = fetcher(&dir, feed.clone(), 10_000);

        let ids: Vec<String> = (0..2137u32).map(|i| format!("{:06x}", i)).collect();
        let fetched = fetcher.fetch_and_update(&ids).await.unwrap();

        // ceil(2137 / 50) = 43 feed calls across 3 super-batches.
        assert_eq!(feed.calls.load(Ordering::SeqCst), 43);
        assert!(feed.max_seen_batch.load(Ordering::SeqCst) <= 50);
        assert_eq!(fetched.len(), 2137);

        let state = store.database_state().await.unwrap();
        assert_eq!(state.active, 2137);
    }

    #[tokio::test]
    async fn test_invalid_ids_dropped_and_duplicates_collapsed() {
        let dir = tempdir().unwrap();
        let feed = Arc::new(MockFeed::new(Duration::ZERO));
        let (fetcher, _store) = fetcher(&dir, feed.clone(), 100);

        let ids = vec![
            "A1B2C3".to_string(),
            "a1b2c3".to_string(),
            "not-hex".to_string(),
        ];
        let fetched = fetcher.fetch_and_update(&ids).await.unwrap();

        assert_eq!(feed.calls.load(Ordering::SeqCst), 1);
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].icao24, "a1b2c3");
    }

    #[tokio::test]
    async fn test_all_invalid_ids_issues_no_calls() {
        let dir = tempdir().unwrap();
        let feed = Arc::new(MockFeed::new(Duration::ZERO));
        let (fetcher, _store) = fetcher(&dir, feed.clone(), 100);

        let fetched = fetcher
            .fetch_and_update(&["bogus".to_string(), "".to_string()])
            .await
            .unwrap();
        assert!(fetched.is_empty());
        assert_eq!(feed.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_concurrent_identical_fetches_coalesce() {
        let dir = tempdir().unwrap();
        let feed = Arc::new(MockFeed::new(Duration::from_millis(100)));
        let (fetcher, _store) = fetcher(&dir, feed.clone(), 100);
        let fetcher = Arc::new(fetcher);

        let ids = vec!["a1b2c3".to_string(), "d4e5f6".to_string()];
        let (a, b) = tokio::join!(
            fetcher.fetch_and_update(&ids),
            fetcher.fetch_and_update(&ids)
        );

        // One feed call served both callers.
        assert_eq!(feed.calls.load(Ordering::SeqCst), 1);
        assert_eq!(a.unwrap().len(), 2);
        assert_eq!(b.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_daily_budget_stops_run_with_partial_results() {
        let dir = tempdir().unwrap();
        let feed = Arc::new(MockFeed::new(Duration::ZERO));

        let store = Arc::new(
            TrackingStore::new(
                dir.path().join("test.db").to_str().unwrap(),
                RetryPolicy::new(3),
                600,
                86_400,
            )
            .unwrap(),
        );
        let positions = Arc::new(PositionCache::new(10, 1, 10.0, Duration::from_secs(300)));
        // Two calls allowed today, then the budget is gone.
        let limiter = Arc::new(RateLimiter::new(10_000, 2, 50).unwrap());
        let fetcher = BatchFetcher::new(
            feed.clone(),
            limiter,
            positions,
            store,
            1000,
            50,
            Duration::ZERO,
        );

        let ids: Vec<String> = (0..200u32).map(|i| format!("{:06x}", i)).collect();
        let fetched = fetcher.fetch_and_update(&ids).await.unwrap();

        // 2 of the 4 sub-batches went out before exhaustion.
        assert_eq!(feed.calls.load(Ordering::SeqCst), 2);
        assert_eq!(fetched.len(), 100);
    }
}
