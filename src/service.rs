//! Tracker service facade.
//!
//! Owns every component explicitly - no singletons, no module-level
//! state. Construction is fatal on misconfiguration (rate limiter, store
//! init); after that the service is fully usable and `spawn_background_tasks`
//! starts the poll and maintenance loops. Reads serve best-effort
//! cached/stored data and never propagate fetch errors.

use crate::cache::{PositionCache, TtlCache};
use crate::feed::StateVectorSource;
use crate::fetcher::BatchFetcher;
use crate::models::{
    AircraftPosition, Config, DatabaseState, MaintenanceReport, TrackedRecord, TrackingStatus,
};
use crate::rate_limit::RateLimiter;
use crate::retry::RetryPolicy;
use crate::store::TrackingStore;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{info, warn};

// Read-through cache lifetimes: model lists barely move, id sets churn
// with registrations.
const MODELS_CACHE_TTL: Duration = Duration::from_secs(300);
const IDS_CACHE_TTL: Duration = Duration::from_secs(60);

pub struct TrackerService {
    config: Config,
    store: Arc<TrackingStore>,
    positions: Arc<PositionCache>,
    rate_limiter: Arc<RateLimiter>,
    fetcher: Arc<BatchFetcher>,
    manufacturer_models: TtlCache<String, Vec<String>>,
    manufacturer_ids: TtlCache<String, Vec<String>>,
}

impl TrackerService {
    pub fn new(config: Config, feed: Arc<dyn StateVectorSource>) -> Result<Arc<Self>> {
        let retry = RetryPolicy::new(config.retry_limit);

        let rate_limiter = Arc::new(
            RateLimiter::new(
                config.requests_per_minute,
                config.requests_per_day,
                config.max_batch_size,
            )
            .context("Failed to initialize rate limiter")?,
        );

        let store = Arc::new(
            TrackingStore::new(
                &config.database_path,
                retry,
                config.stale_after_secs,
                config.purge_after_secs,
            )
            .context("Failed to initialize tracking store")?,
        );

        let positions = Arc::new(PositionCache::new(
            config.history_max_len,
            config.suppress_min_secs,
            config.suppress_min_meters,
            Duration::from_secs(config.position_cache_ttl_secs),
        ));

        let fetcher = Arc::new(BatchFetcher::new(
            feed,
            rate_limiter.clone(),
            positions.clone(),
            store.clone(),
            config.super_batch_size,
            config.max_batch_size,
            Duration::from_millis(config.inter_batch_delay_ms),
        ));

        Ok(Arc::new(Self {
            config,
            store,
            positions,
            rate_limiter,
            fetcher,
            manufacturer_models: TtlCache::new(),
            manufacturer_ids: TtlCache::new(),
        }))
    }

    /// Latest cached position, if any. Synchronous and non-blocking.
    pub fn get_position(&self, icao24: &str) -> Option<AircraftPosition> {
        self.positions.get(icao24)
    }

    /// Bounded history snapshot, oldest first.
    pub fn get_position_history(&self, icao24: &str) -> Vec<AircraftPosition> {
        self.positions.history(icao24)
    }

    /// On-demand refresh for a specific id set.
    pub async fn fetch_and_update_positions(
        &self,
        ids: &[String],
    ) -> Result<Vec<AircraftPosition>> {
        self.fetcher.fetch_and_update(ids).await
    }

    pub async fn get_tracked_aircraft(
        &self,
        manufacturer: Option<&str>,
    ) -> Result<Vec<TrackedRecord>> {
        self.store.get_tracked(manufacturer).await
    }

    /// Pre-register ids for tracking. Invalidates the manufacturer id
    /// cache so the next read sees the new registrations.
    pub async fn add_pending_aircraft(
        &self,
        ids: &[String],
        manufacturer: Option<&str>,
    ) -> Result<usize> {
        let count = self.store.add_pending(ids, manufacturer).await?;
        if let Some(m) = manufacturer {
            self.manufacturer_ids.invalidate(&m.to_string());
        }
        Ok(count)
    }

    pub async fn perform_maintenance(&self) -> Result<MaintenanceReport> {
        let report = self.store.perform_maintenance().await?;
        self.positions.sweep_expired();
        Ok(report)
    }

    pub async fn get_database_state(&self) -> Result<DatabaseState> {
        self.store.database_state().await
    }

    /// Models for a manufacturer, read-through with a TTL.
    pub async fn models_for_manufacturer(&self, manufacturer: &str) -> Result<Vec<String>> {
        let key = manufacturer.to_string();
        if let Some(models) = self.manufacturer_models.get(&key) {
            return Ok(models);
        }

        let models = self.store.models_for_manufacturer(manufacturer).await?;
        self.manufacturer_models
            .set(key, models.clone(), MODELS_CACHE_TTL);
        Ok(models)
    }

    /// Tracked ids for a manufacturer, read-through with a TTL.
    pub async fn ids_for_manufacturer(&self, manufacturer: &str) -> Result<Vec<String>> {
        let key = manufacturer.to_string();
        if let Some(ids) = self.manufacturer_ids.get(&key) {
            return Ok(ids);
        }

        let ids = self.store.ids_for_manufacturer(manufacturer).await?;
        self.manufacturer_ids.set(key, ids.clone(), IDS_CACHE_TTL);
        Ok(ids)
    }

    /// Spawn the poll and maintenance loops. Abort the returned handles
    /// to stop the service.
    pub fn spawn_background_tasks(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        vec![
            tokio::spawn(poll_loop(self.clone())),
            tokio::spawn(maintenance_loop(self.clone())),
        ]
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// Ids currently needing a refresh: pending registrations plus rows
    /// that have gone stale.
    async fn ids_needing_refresh(&self) -> Result<Vec<String>> {
        let mut ids = self
            .store
            .get_ids_by_status(TrackingStatus::Pending, None)
            .await?;
        ids.extend(
            self.store
                .get_ids_by_status(TrackingStatus::Stale, None)
                .await?,
        );
        // Active rows refresh too once they age past the poll interval -
        // the status sweep moves them to stale and the next cycle picks
        // them up.
        Ok(ids)
    }
}

async fn poll_loop(service: Arc<TrackerService>) {
    let mut ticker = interval(Duration::from_secs(service.config.poll_secs));
    info!(
        "📡 Poll loop started (every {}s)",
        service.config.poll_secs
    );

    loop {
        ticker.tick().await;

        let ids = match service.ids_needing_refresh().await {
            Ok(ids) => ids,
            Err(e) => {
                warn!("Poll cycle: failed to select ids: {}", e);
                continue;
            }
        };
        if ids.is_empty() {
            continue;
        }

        match service.fetcher.fetch_and_update(&ids).await {
            Ok(fetched) => {
                let (minute, today) = service.rate_limiter.usage();
                info!(
                    "✈️  Poll cycle: {} of {} ids refreshed (budget {}/min, {}/day)",
                    fetched.len(),
                    ids.len(),
                    minute,
                    today
                );
            }
            Err(e) => warn!("Poll cycle failed: {}", e),
        }
    }
}

async fn maintenance_loop(service: Arc<TrackerService>) {
    let mut ticker = interval(Duration::from_secs(service.config.maintenance_secs));
    info!(
        "🧹 Maintenance loop started (every {}s)",
        service.config.maintenance_secs
    );

    loop {
        ticker.tick().await;

        match service.store.perform_maintenance().await {
            Ok(report) => {
                if report.marked > 0 || report.cleaned > 0 {
                    info!(
                        "🧹 Sweep: {} reclassified, {} purged",
                        report.marked, report.cleaned
                    );
                }
            }
            Err(e) => warn!("Maintenance sweep failed: {}", e),
        }

        service.positions.sweep_expired();
    }
}
