//! In-memory latest-position cache with bounded per-aircraft history.
//!
//! Feed snapshots arrive in bulk every poll cycle and most of them are
//! near-duplicates of the previous fix. History only grows when a new
//! position differs materially from the last accepted one - either enough
//! time has passed or the aircraft has actually moved. The latest-value
//! slot always refreshes (last write wins).
//!
//! Purely in-memory: rebuilt empty at process start, trimmed by a
//! periodic expiry sweep driven from the maintenance loop.

use crate::models::{normalize_icao24, AircraftPosition};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tracing::debug;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two fixes, in meters.
pub fn haversine_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);

    2.0 * a.sqrt().asin() * EARTH_RADIUS_M
}

struct TrackedPosition {
    latest: AircraftPosition,
    history: VecDeque<AircraftPosition>,
    /// Wall-clock time of the last update() call, for the expiry sweep.
    refreshed_at: Instant,
}

pub struct PositionCache {
    entries: Mutex<HashMap<String, TrackedPosition>>,
    max_history: usize,
    min_update_secs: i64,
    min_distance_m: f64,
    expire_after: Duration,
}

impl PositionCache {
    pub fn new(
        max_history: usize,
        min_update_secs: i64,
        min_distance_m: f64,
        expire_after: Duration,
    ) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_history: max_history.max(1),
            min_update_secs,
            min_distance_m,
            expire_after,
        }
    }

    /// Latest known position, if any.
    pub fn get(&self, icao24: &str) -> Option<AircraftPosition> {
        let key = normalize_icao24(icao24)?;
        self.entries.lock().get(&key).map(|t| t.latest.clone())
    }

    /// Snapshot of the bounded history, oldest first.
    pub fn history(&self, icao24: &str) -> Vec<AircraftPosition> {
        let Some(key) = normalize_icao24(icao24) else {
            return Vec::new();
        };
        self.entries
            .lock()
            .get(&key)
            .map(|t| t.history.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Accept a new observation.
    ///
    /// The latest slot is overwritten unconditionally. History appends
    /// only when the fix is materially different from the last accepted
    /// one: time delta over `min_update_secs` OR great-circle distance
    /// over `min_distance_m`. One lock scope per id keeps the
    /// latest+history pair from interleaving under concurrent writers.
    pub fn update(&self, position: AircraftPosition) {
        let Some(key) = normalize_icao24(&position.icao24) else {
            debug!("Dropping position with invalid id: {:?}", position.icao24);
            return;
        };

        let mut entries = self.entries.lock();
        let now = Instant::now();

        match entries.get_mut(&key) {
            Some(tracked) => {
                let material = tracked
                    .history
                    .back()
                    .map(|last| self.is_material(last, &position))
                    .unwrap_or(true);

                if material {
                    tracked.history.push_back(position.clone());
                    while tracked.history.len() > self.max_history {
                        tracked.history.pop_front();
                    }
                }

                tracked.latest = position;
                tracked.refreshed_at = now;
            }
            None => {
                let mut history = VecDeque::with_capacity(self.max_history);
                history.push_back(position.clone());
                entries.insert(
                    key,
                    TrackedPosition {
                        latest: position,
                        history,
                        refreshed_at: now,
                    },
                );
            }
        }
    }

    fn is_material(&self, last: &AircraftPosition, new: &AircraftPosition) -> bool {
        let dt = new.last_contact - last.last_contact;
        if dt > self.min_update_secs {
            return true;
        }

        let dist = haversine_meters(last.latitude, last.longitude, new.latitude, new.longitude);
        dist > self.min_distance_m
    }

    /// Drop entries idle past the cache TTL - latest value and history
    /// together. Called from the maintenance loop.
    pub fn sweep_expired(&self) -> usize {
        let mut entries = self.entries.lock();
        let now = Instant::now();
        let before = entries.len();

        entries.retain(|_, t| now.duration_since(t.refreshed_at) <= self.expire_after);

        let removed = before - entries.len();
        if removed > 0 {
            debug!("🧹 Position cache sweep removed {} expired entries", removed);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
