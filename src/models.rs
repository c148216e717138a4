use serde::{Deserialize, Serialize};

/// Normalize a raw aircraft identifier to canonical form.
///
/// ICAO 24-bit addresses are 6 hex chars, case-insensitive. Anything else
/// is invalid and gets dropped by callers before any feed call or write.
pub fn normalize_icao24(raw: &str) -> Option<String> {
    let s = raw.trim().to_ascii_lowercase();
    if s.len() == 6 && s.bytes().all(|b| b.is_ascii_hexdigit()) {
        Some(s)
    } else {
        None
    }
}

/// Point-in-time state vector for one aircraft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AircraftPosition {
    pub icao24: String,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub velocity: f64,
    pub heading: f64,
    pub on_ground: bool,
    /// Unix seconds of the most recent confirmed observation.
    pub last_contact: i64,
}

/// Tracking lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingStatus {
    Pending,
    Active,
    Stale,
}

impl TrackingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackingStatus::Pending => "pending",
            TrackingStatus::Active => "active",
            TrackingStatus::Stale => "stale",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TrackingStatus::Pending),
            "active" => Some(TrackingStatus::Active),
            "stale" => Some(TrackingStatus::Stale),
            _ => None,
        }
    }
}

/// Persisted row: one per icao24.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedRecord {
    pub icao24: String,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub registration: Option<String>,
    pub operator: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub velocity: f64,
    pub heading: f64,
    pub on_ground: bool,
    /// None until the first confirmed sighting.
    pub last_contact: Option<i64>,
    pub status: TrackingStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Readiness + per-status counts, served to collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseState {
    pub ready: bool,
    pub pending: i64,
    pub active: i64,
    pub stale: i64,
    pub total: i64,
}

/// What a maintenance sweep did.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MaintenanceReport {
    /// Rows whose status was reclassified.
    pub marked: usize,
    /// Rows deleted past the retention window.
    pub cleaned: usize,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub feed_base_url: String,
    pub requests_per_minute: u32,
    pub requests_per_day: u32,
    /// Feed per-call id cap (sub-batch size).
    pub max_batch_size: usize,
    /// Store parameter cap (super-batch size).
    pub super_batch_size: usize,
    pub min_poll_secs: u64,
    pub max_poll_secs: u64,
    pub poll_secs: u64,
    pub maintenance_secs: u64,
    pub retry_limit: u32,
    pub feed_timeout_secs: u64,
    pub inter_batch_delay_ms: u64,
    pub position_cache_ttl_secs: u64,
    pub history_max_len: usize,
    pub suppress_min_secs: i64,
    pub suppress_min_meters: f64,
    pub stale_after_secs: i64,
    pub purge_after_secs: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: "./skywatch.db".to_string(),
            feed_base_url: "https://opensky-network.org/api".to_string(),
            requests_per_minute: 60,
            requests_per_day: 4000,
            max_batch_size: 50,
            super_batch_size: 1000,
            min_poll_secs: 15,
            max_poll_secs: 300,
            poll_secs: 30,
            maintenance_secs: 60,
            retry_limit: 3,
            feed_timeout_secs: 30,
            inter_batch_delay_ms: 1000,
            position_cache_ttl_secs: 300,
            history_max_len: 10,
            suppress_min_secs: 1,
            suppress_min_meters: 10.0,
            stale_after_secs: 600,
            purge_after_secs: 86_400,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Config::default();

        let database_path = std::env::var("DATABASE_PATH").unwrap_or(defaults.database_path);
        let feed_base_url = std::env::var("FEED_BASE_URL").unwrap_or(defaults.feed_base_url);

        let min_poll_secs = env_u64("MIN_POLL_SECS", defaults.min_poll_secs);
        let max_poll_secs = env_u64("MAX_POLL_SECS", defaults.max_poll_secs).max(min_poll_secs);
        let poll_secs =
            env_u64("POLL_SECS", defaults.poll_secs).clamp(min_poll_secs, max_poll_secs);

        Ok(Self {
            database_path,
            feed_base_url,
            requests_per_minute: env_u64("REQUESTS_PER_MINUTE", defaults.requests_per_minute as u64)
                as u32,
            requests_per_day: env_u64("REQUESTS_PER_DAY", defaults.requests_per_day as u64) as u32,
            max_batch_size: env_u64("MAX_BATCH_SIZE", defaults.max_batch_size as u64) as usize,
            super_batch_size: env_u64("SUPER_BATCH_SIZE", defaults.super_batch_size as u64)
                as usize,
            min_poll_secs,
            max_poll_secs,
            poll_secs,
            maintenance_secs: env_u64("MAINTENANCE_SECS", defaults.maintenance_secs),
            retry_limit: env_u64("RETRY_LIMIT", defaults.retry_limit as u64) as u32,
            feed_timeout_secs: env_u64("FEED_TIMEOUT_SECS", defaults.feed_timeout_secs),
            inter_batch_delay_ms: env_u64("INTER_BATCH_DELAY_MS", defaults.inter_batch_delay_ms),
            position_cache_ttl_secs: env_u64(
                "POSITION_CACHE_TTL_SECS",
                defaults.position_cache_ttl_secs,
            ),
            history_max_len: env_u64("HISTORY_MAX_LEN", defaults.history_max_len as u64) as usize,
            suppress_min_secs: env_u64("SUPPRESS_MIN_SECS", defaults.suppress_min_secs as u64)
                as i64,
            suppress_min_meters: std::env::var("SUPPRESS_MIN_METERS")
                .ok()
                .and_then(|v| v.parse::<f64>().ok())
                .unwrap_or(defaults.suppress_min_meters),
            stale_after_secs: env_u64("STALE_AFTER_SECS", defaults.stale_after_secs as u64) as i64,
            purge_after_secs: env_u64("PURGE_AFTER_SECS", defaults.purge_after_secs as u64) as i64,
        })
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}
