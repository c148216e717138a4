//! Persistent aircraft tracking store.
//!
//! One row per icao24 with the pending -> active -> stale lifecycle.
//! Status is never pushed by writers beyond the fresh-sighting reset to
//! active: a periodic re-derivation computes every row's status from its
//! `last_contact` age. Multi-row writes run inside a single BEGIN
//! IMMEDIATE transaction; busy/locked engine errors are retried through
//! the shared retry policy before surfacing.

use crate::models::{
    normalize_icao24, AircraftPosition, DatabaseState, MaintenanceReport, TrackedRecord,
    TrackingStatus,
};
use crate::retry::RetryPolicy;
use anyhow::{Context, Result};
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode, OpenFlags};
use std::sync::Arc;
use tracing::{debug, info, warn};

const SCHEMA_SQL: &str = r#"
-- WAL for concurrent reads during writes
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA temp_store = MEMORY;

CREATE TABLE IF NOT EXISTS aircraft (
    icao24 TEXT PRIMARY KEY CHECK (length(icao24) = 6),
    manufacturer TEXT,
    model TEXT,
    registration TEXT,
    operator TEXT,
    latitude REAL NOT NULL DEFAULT 0,
    longitude REAL NOT NULL DEFAULT 0,
    altitude REAL NOT NULL DEFAULT 0,
    velocity REAL NOT NULL DEFAULT 0,
    heading REAL NOT NULL DEFAULT 0,
    on_ground INTEGER NOT NULL DEFAULT 0,
    last_contact INTEGER,
    status TEXT NOT NULL DEFAULT 'pending',
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_aircraft_manufacturer ON aircraft(manufacturer);
CREATE INDEX IF NOT EXISTS idx_aircraft_last_contact ON aircraft(last_contact);
CREATE INDEX IF NOT EXISTS idx_aircraft_status ON aircraft(status, manufacturer);
"#;

// Status re-derivation is a pure function of (now - last_contact), so the
// same CASE appears in SET and WHERE: only rows whose derived status
// differs get touched.
const DERIVE_STATUS_SQL: &str = r#"
UPDATE aircraft
SET status = CASE
        WHEN last_contact IS NULL THEN 'pending'
        WHEN ?1 - last_contact <= ?2 THEN 'active'
        ELSE 'stale'
    END,
    updated_at = ?1
WHERE status <> CASE
        WHEN last_contact IS NULL THEN 'pending'
        WHEN ?1 - last_contact <= ?2 THEN 'active'
        ELSE 'stale'
    END
"#;

pub struct TrackingStore {
    conn: Arc<Mutex<Connection>>,
    retry: RetryPolicy,
    stale_after_secs: i64,
    purge_after_secs: i64,
}

impl TrackingStore {
    /// Open (or create) the database. Failure here is fatal - the service
    /// must not run half-initialized.
    pub fn new(
        db_path: &str,
        retry: RetryPolicy,
        stale_after_secs: i64,
        purge_after_secs: i64,
    ) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX; // we serialize access ourselves

        let conn = Connection::open_with_flags(db_path, flags)
            .with_context(|| format!("Failed to open database at {}", db_path))?;

        conn.execute_batch(SCHEMA_SQL)
            .context("Failed to initialize database schema")?;

        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap_or_default();
        if journal_mode.to_lowercase() != "wal" {
            warn!("WAL mode not active, journal_mode = {}", journal_mode);
        }

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM aircraft", [], |row| row.get(0))
            .unwrap_or(0);
        info!("📊 Tracking store initialized at {} ({} aircraft)", db_path, count);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            retry,
            stale_after_secs,
            purge_after_secs,
        })
    }

    /// Pre-register ids as pending. Idempotent: re-registering refreshes
    /// the manufacturer but never demotes an existing row's status
    /// (active rows stay active). Malformed ids are dropped silently.
    /// Returns the number of rows touched.
    pub async fn add_pending(&self, ids: &[String], manufacturer: Option<&str>) -> Result<usize> {
        let valid: Vec<String> = ids.iter().filter_map(|id| normalize_icao24(id)).collect();
        if valid.is_empty() {
            return Ok(0);
        }

        let now = Utc::now().timestamp();
        let manufacturer = manufacturer.map(|m| m.to_string());

        self.with_retry("add_pending", move |conn| {
            conn.execute("BEGIN IMMEDIATE", [])?;

            let mut touched = 0usize;
            for id in &valid {
                let res = conn.execute(
                    "INSERT INTO aircraft (icao24, manufacturer, status, created_at, updated_at)
                     VALUES (?1, ?2, 'pending', ?3, ?3)
                     ON CONFLICT(icao24) DO UPDATE SET
                         manufacturer = COALESCE(excluded.manufacturer, aircraft.manufacturer),
                         updated_at = excluded.updated_at",
                    params![id, manufacturer.as_deref(), now],
                );
                match res {
                    Ok(changes) => touched += changes,
                    Err(e) if is_constraint_violation(&e) => {
                        warn!("Skipping pending registration for {}: {}", id, e);
                    }
                    Err(e) => {
                        conn.execute("ROLLBACK", []).ok();
                        return Err(e);
                    }
                }
            }

            conn.execute("COMMIT", [])?;
            Ok(touched)
        })
        .await
    }

    /// Write a batch of confirmed observations in one all-or-nothing
    /// transaction. A single row's constraint violation is logged and
    /// skipped; any other failure rolls the whole batch back and
    /// propagates. A successful position write resets status to active
    /// (fresh sighting). Last write wins - no ordering check against the
    /// stored `last_contact`.
    pub async fn upsert_batch(&self, records: &[AircraftPosition]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let now = Utc::now().timestamp();
        let records = records.to_vec();

        let written = self
            .with_retry("upsert_batch", move |conn| {
                conn.execute("BEGIN IMMEDIATE", [])?;

                let mut written = 0usize;
                for r in &records {
                    let res = conn.execute(
                        "INSERT INTO aircraft
                             (icao24, latitude, longitude, altitude, velocity, heading,
                              on_ground, last_contact, status, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'active', ?9, ?9)
                         ON CONFLICT(icao24) DO UPDATE SET
                             latitude = excluded.latitude,
                             longitude = excluded.longitude,
                             altitude = excluded.altitude,
                             velocity = excluded.velocity,
                             heading = excluded.heading,
                             on_ground = excluded.on_ground,
                             last_contact = excluded.last_contact,
                             status = 'active',
                             updated_at = excluded.updated_at",
                        params![
                            r.icao24,
                            r.latitude,
                            r.longitude,
                            r.altitude,
                            r.velocity,
                            r.heading,
                            r.on_ground,
                            r.last_contact,
                            now,
                        ],
                    );
                    match res {
                        Ok(changes) => written += changes,
                        Err(e) if is_constraint_violation(&e) => {
                            warn!("Skipping record {} in batch: {}", r.icao24, e);
                        }
                        Err(e) => {
                            conn.execute("ROLLBACK", []).ok();
                            return Err(e);
                        }
                    }
                }

                conn.execute("COMMIT", [])?;
                Ok(written)
            })
            .await?;

        debug!("📦 Batch upserted {} aircraft records", written);
        Ok(written)
    }

    pub async fn get_ids_by_status(
        &self,
        status: TrackingStatus,
        manufacturer: Option<&str>,
    ) -> Result<Vec<String>> {
        let status = status.as_str();
        let manufacturer = manufacturer.map(|m| m.to_string());

        self.with_retry("get_ids_by_status", move |conn| {
            let mut ids = Vec::new();
            match &manufacturer {
                Some(m) => {
                    let mut stmt = conn.prepare_cached(
                        "SELECT icao24 FROM aircraft
                         WHERE status = ?1 AND manufacturer = ?2
                         ORDER BY icao24",
                    )?;
                    let rows = stmt.query_map(params![status, m], |row| row.get(0))?;
                    for row in rows {
                        ids.push(row?);
                    }
                }
                None => {
                    let mut stmt = conn.prepare_cached(
                        "SELECT icao24 FROM aircraft WHERE status = ?1 ORDER BY icao24",
                    )?;
                    let rows = stmt.query_map(params![status], |row| row.get(0))?;
                    for row in rows {
                        ids.push(row?);
                    }
                }
            }
            Ok(ids)
        })
        .await
    }

    pub async fn get_tracked(&self, manufacturer: Option<&str>) -> Result<Vec<TrackedRecord>> {
        let manufacturer = manufacturer.map(|m| m.to_string());

        self.with_retry("get_tracked", move |conn| {
            let mut records = Vec::new();
            match &manufacturer {
                Some(m) => {
                    let mut stmt = conn.prepare_cached(
                        "SELECT icao24, manufacturer, model, registration, operator,
                                latitude, longitude, altitude, velocity, heading,
                                on_ground, last_contact, status, created_at, updated_at
                         FROM aircraft WHERE manufacturer = ?1 ORDER BY icao24",
                    )?;
                    let rows = stmt.query_map(params![m], row_to_record)?;
                    for row in rows {
                        records.push(row?);
                    }
                }
                None => {
                    let mut stmt = conn.prepare_cached(
                        "SELECT icao24, manufacturer, model, registration, operator,
                                latitude, longitude, altitude, velocity, heading,
                                on_ground, last_contact, status, created_at, updated_at
                         FROM aircraft ORDER BY icao24",
                    )?;
                    let rows = stmt.query_map([], row_to_record)?;
                    for row in rows {
                        records.push(row?);
                    }
                }
            }
            Ok(records)
        })
        .await
    }

    pub async fn get_record(&self, icao24: &str) -> Result<Option<TrackedRecord>> {
        let Some(id) = normalize_icao24(icao24) else {
            return Ok(None);
        };

        self.with_retry("get_record", move |conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT icao24, manufacturer, model, registration, operator,
                        latitude, longitude, altitude, velocity, heading,
                        on_ground, last_contact, status, created_at, updated_at
                 FROM aircraft WHERE icao24 = ?1",
            )?;
            let mut rows = stmt.query_map(params![id], row_to_record)?;
            rows.next().transpose()
        })
        .await
    }

    /// Re-derive every row's status from its `last_contact` age,
    /// independent of any write path. Returns how many rows changed.
    pub async fn update_statuses(&self) -> Result<usize> {
        let now = Utc::now().timestamp();
        let stale_after = self.stale_after_secs;

        self.with_retry("update_statuses", move |conn| {
            conn.execute(DERIVE_STATUS_SQL, params![now, stale_after])
        })
        .await
    }

    /// Reclassify statuses, purge stale rows past retention, then let the
    /// engine re-optimize its statistics.
    pub async fn perform_maintenance(&self) -> Result<MaintenanceReport> {
        let marked = self.update_statuses().await?;

        let now = Utc::now().timestamp();
        let purge_after = self.purge_after_secs;
        let cleaned = self
            .with_retry("purge_stale", move |conn| {
                conn.execute(
                    "DELETE FROM aircraft
                     WHERE status = 'stale'
                       AND last_contact IS NOT NULL
                       AND ?1 - last_contact > ?2",
                    params![now, purge_after],
                )
            })
            .await?;

        self.with_retry("optimize", |conn| {
            conn.execute_batch("ANALYZE; PRAGMA optimize;")
        })
        .await?;

        if marked > 0 || cleaned > 0 {
            info!("🧹 Maintenance: {} reclassified, {} purged", marked, cleaned);
        }
        Ok(MaintenanceReport { marked, cleaned })
    }

    /// Readiness plus per-status counts.
    pub async fn database_state(&self) -> Result<DatabaseState> {
        self.with_retry("database_state", |conn| {
            let mut state = DatabaseState {
                ready: true,
                pending: 0,
                active: 0,
                stale: 0,
                total: 0,
            };

            let mut stmt =
                conn.prepare_cached("SELECT status, COUNT(*) FROM aircraft GROUP BY status")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;

            for row in rows {
                let (status, count) = row?;
                state.total += count;
                match status.as_str() {
                    "pending" => state.pending = count,
                    "active" => state.active = count,
                    "stale" => state.stale = count,
                    _ => {}
                }
            }
            Ok(state)
        })
        .await
    }

    /// Attach registry metadata to an existing row. Returns false when
    /// the id is unknown (or malformed).
    pub async fn set_metadata(
        &self,
        icao24: &str,
        model: Option<&str>,
        registration: Option<&str>,
        operator: Option<&str>,
    ) -> Result<bool> {
        let Some(id) = normalize_icao24(icao24) else {
            return Ok(false);
        };
        let now = Utc::now().timestamp();
        let model = model.map(|s| s.to_string());
        let registration = registration.map(|s| s.to_string());
        let operator = operator.map(|s| s.to_string());

        let changed = self
            .with_retry("set_metadata", move |conn| {
                conn.execute(
                    "UPDATE aircraft SET
                         model = COALESCE(?2, model),
                         registration = COALESCE(?3, registration),
                         operator = COALESCE(?4, operator),
                         updated_at = ?5
                     WHERE icao24 = ?1",
                    params![
                        id,
                        model.as_deref(),
                        registration.as_deref(),
                        operator.as_deref(),
                        now
                    ],
                )
            })
            .await?;
        Ok(changed > 0)
    }

    /// Distinct models seen for a manufacturer. Fronted by a TTL cache in
    /// the service layer.
    pub async fn models_for_manufacturer(&self, manufacturer: &str) -> Result<Vec<String>> {
        let manufacturer = manufacturer.to_string();
        self.with_retry("models_for_manufacturer", move |conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT DISTINCT model FROM aircraft
                 WHERE manufacturer = ?1 AND model IS NOT NULL
                 ORDER BY model",
            )?;
            let rows = stmt.query_map(params![manufacturer], |row| row.get(0))?;
            let mut models = Vec::new();
            for row in rows {
                models.push(row?);
            }
            Ok(models)
        })
        .await
    }

    pub async fn ids_for_manufacturer(&self, manufacturer: &str) -> Result<Vec<String>> {
        let manufacturer = manufacturer.to_string();
        self.with_retry("ids_for_manufacturer", move |conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT icao24 FROM aircraft WHERE manufacturer = ?1 ORDER BY icao24",
            )?;
            let rows = stmt.query_map(params![manufacturer], |row| row.get(0))?;
            let mut ids = Vec::new();
            for row in rows {
                ids.push(row?);
            }
            Ok(ids)
        })
        .await
    }

    /// Run one store operation, retrying transient busy/locked errors
    /// with backoff + jitter up to the policy's attempt budget. Any other
    /// error surfaces immediately.
    async fn with_retry<T, F>(&self, what: &str, f: F) -> Result<T>
    where
        F: Fn(&Connection) -> rusqlite::Result<T>,
    {
        let mut attempt = 0u32;
        loop {
            let result = {
                let conn = self.conn.lock();
                f(&conn)
            };

            match result {
                Ok(v) => return Ok(v),
                Err(e) if is_busy(&e) && !self.retry.is_exhausted(attempt) => {
                    // A busy COMMIT can leave the transaction open; clear
                    // it so the retry's BEGIN doesn't nest.
                    self.conn.lock().execute("ROLLBACK", []).ok();
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        "{}: database busy (attempt {}), retrying in {}ms",
                        what,
                        attempt + 1,
                        delay.as_millis()
                    );
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("{} failed", what));
                }
            }
        }
    }
}

fn is_busy(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == ErrorCode::DatabaseBusy || err.code == ErrorCode::DatabaseLocked
    )
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation
    )
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<TrackedRecord> {
    let status: String = row.get(12)?;
    Ok(TrackedRecord {
        icao24: row.get(0)?,
        manufacturer: row.get(1)?,
        model: row.get(2)?,
        registration: row.get(3)?,
        operator: row.get(4)?,
        latitude: row.get(5)?,
        longitude: row.get(6)?,
        altitude: row.get(7)?,
        velocity: row.get(8)?,
        heading: row.get(9)?,
        on_ground: row.get(10)?,
        last_contact: row.get(11)?,
        status: TrackingStatus::from_str(&status).unwrap_or(TrackingStatus::Pending),
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_store(dir: &tempfile::TempDir) -> TrackingStore {
        let path = dir.path().join("test.db");
        TrackingStore::new(
            path.to_str().unwrap(),
            RetryPolicy::new(3),
            600,    // active window: 10 minutes
            86_400, // retention: 24 hours stale
        )
        .unwrap()
    }

    fn observation(icao24: &str, last_contact: i64) -> AircraftPosition {
        AircraftPosition {
            icao24: icao24.to_string(),
            latitude: 52.0,
            longitude: 13.0,
            altitude: 11_000.0,
            velocity: 240.0,
            heading: 180.0,
            on_ground: false,
            last_contact,
        }
    }

    #[tokio::test]
    async fn test_add_pending_idempotent_and_drops_invalid() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir);

        let ids = vec![
            "a1b2c3".to_string(),
            "D4E5F6".to_string(),
            "not-hex".to_string(),
        ];
        let count = store.add_pending(&ids, Some("ACME")).await.unwrap();
        assert_eq!(count, 2);

        // Second registration touches the same two rows, adds nothing.
        store.add_pending(&ids, Some("ACME")).await.unwrap();
        let state = store.database_state().await.unwrap();
        assert_eq!(state.pending, 2);
        assert_eq!(state.total, 2);
    }

    #[tokio::test]
    async fn test_upsert_batch_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir);
        let now = Utc::now().timestamp();

        let records = vec![observation("a1b2c3", now), observation("d4e5f6", now)];
        store.upsert_batch(&records).await.unwrap();
        store.upsert_batch(&records).await.unwrap();

        let state = store.database_state().await.unwrap();
        assert_eq!(state.total, 2);
        assert_eq!(state.active, 2);

        let rec = store.get_record("a1b2c3").await.unwrap().unwrap();
        assert_eq!(rec.last_contact, Some(now));
        assert_eq!(rec.status, TrackingStatus::Active);
        assert!((rec.latitude - 52.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_pending_flips_active_only_for_sighted_ids() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir);

        let ids = vec!["a1b2c3".to_string(), "d4e5f6".to_string()];
        store.add_pending(&ids, Some("ACME")).await.unwrap();

        // Feed response contains only a1b2c3 with a fresh last_contact.
        let now = Utc::now().timestamp();
        store
            .upsert_batch(&[observation("a1b2c3", now)])
            .await
            .unwrap();

        let a = store.get_record("a1b2c3").await.unwrap().unwrap();
        let d = store.get_record("d4e5f6").await.unwrap().unwrap();
        assert_eq!(a.status, TrackingStatus::Active);
        assert_eq!(a.manufacturer.as_deref(), Some("ACME"));
        assert_eq!(d.status, TrackingStatus::Pending);
        assert_eq!(d.last_contact, None);
    }

    #[tokio::test]
    async fn test_add_pending_never_demotes_active() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir);
        let now = Utc::now().timestamp();

        store
            .upsert_batch(&[observation("a1b2c3", now)])
            .await
            .unwrap();
        store
            .add_pending(&["a1b2c3".to_string()], Some("ACME"))
            .await
            .unwrap();

        let rec = store.get_record("a1b2c3").await.unwrap().unwrap();
        assert_eq!(rec.status, TrackingStatus::Active);
        assert_eq!(rec.manufacturer.as_deref(), Some("ACME"));
    }

    #[tokio::test]
    async fn test_status_derivation_is_pure_function_of_age() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir);
        let now = Utc::now().timestamp();

        store
            .upsert_batch(&[
                observation("aaaaaa", now - 60),      // fresh -> active
                observation("bbbbbb", now - 2_400),   // 40 min -> stale
                observation("cccccc", now - 700_000), // 8+ days -> stale (until purged)
            ])
            .await
            .unwrap();

        // upsert marked everything active; re-derivation corrects it.
        let changed = store.update_statuses().await.unwrap();
        assert_eq!(changed, 2);

        assert_eq!(
            store.get_record("aaaaaa").await.unwrap().unwrap().status,
            TrackingStatus::Active
        );
        assert_eq!(
            store.get_record("bbbbbb").await.unwrap().unwrap().status,
            TrackingStatus::Stale
        );

        // Running it again is a no-op: status depends only on age.
        assert_eq!(store.update_statuses().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_maintenance_marks_and_purges() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir);
        let now = Utc::now().timestamp();

        store
            .upsert_batch(&[
                observation("aaaaaa", now - 60),          // stays active
                observation("bbbbbb", now - 2_400),       // 40 min -> stale
                observation("cccccc", now - 8 * 86_400),  // 8 days -> purged
            ])
            .await
            .unwrap();

        let report = store.perform_maintenance().await.unwrap();
        assert_eq!(report.marked, 2);
        assert_eq!(report.cleaned, 1);

        let state = store.database_state().await.unwrap();
        assert_eq!(state.active, 1);
        assert_eq!(state.stale, 1);
        assert_eq!(state.total, 2);
        assert!(store.get_record("cccccc").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_constraint_violation_skips_row_not_batch() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir);
        let now = Utc::now().timestamp();

        // Middle record violates the icao24 length check; neighbours land.
        let records = vec![
            observation("a1b2c3", now),
            observation("toolong7", now),
            observation("d4e5f6", now),
        ];
        let written = store.upsert_batch(&records).await.unwrap();
        assert_eq!(written, 2);

        let state = store.database_state().await.unwrap();
        assert_eq!(state.total, 2);
    }

    #[tokio::test]
    async fn test_get_ids_by_status_with_manufacturer_filter() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir);

        store
            .add_pending(&["a1b2c3".to_string()], Some("ACME"))
            .await
            .unwrap();
        store
            .add_pending(&["d4e5f6".to_string()], Some("Globex"))
            .await
            .unwrap();

        let acme = store
            .get_ids_by_status(TrackingStatus::Pending, Some("ACME"))
            .await
            .unwrap();
        assert_eq!(acme, vec!["a1b2c3".to_string()]);

        let all = store
            .get_ids_by_status(TrackingStatus::Pending, None)
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        assert!(store
            .get_ids_by_status(TrackingStatus::Active, None)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_get_tracked_and_manufacturer_queries() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir);

        store
            .add_pending(
                &["a1b2c3".to_string(), "d4e5f6".to_string()],
                Some("ACME"),
            )
            .await
            .unwrap();

        let tracked = store.get_tracked(Some("ACME")).await.unwrap();
        assert_eq!(tracked.len(), 2);
        assert_eq!(tracked[0].icao24, "a1b2c3");

        assert!(store.get_tracked(Some("Globex")).await.unwrap().is_empty());

        let ids = store.ids_for_manufacturer("ACME").await.unwrap();
        assert_eq!(ids.len(), 2);

        // No models recorded yet for these rows.
        assert!(store
            .models_for_manufacturer("ACME")
            .await
            .unwrap()
            .is_empty());

        assert!(store
            .set_metadata("a1b2c3", Some("707"), Some("N12345"), None)
            .await
            .unwrap());
        assert_eq!(
            store.models_for_manufacturer("ACME").await.unwrap(),
            vec!["707".to_string()]
        );
        assert!(!store
            .set_metadata("ffffff", Some("707"), None, None)
            .await
            .unwrap());
    }
}
