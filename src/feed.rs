//! External state-vector feed client.
//!
//! The feed returns fixed-position JSON arrays; the index mapping is part
//! of the data contract and must be preserved exactly:
//! `[0]=icao24, [4]=last_contact, [5]=longitude, [6]=latitude,
//! [7]=altitude, [8]=on_ground, [9]=velocity, [10]=heading`.
//! Missing or null fields default to 0 / false. Calls carry a time
//! cursor and a comma-joined id list capped at the feed's per-call limit.

use crate::models::{normalize_icao24, AircraftPosition};
use crate::retry::RetryPolicy;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

const IDX_ICAO24: usize = 0;
const IDX_LAST_CONTACT: usize = 4;
const IDX_LONGITUDE: usize = 5;
const IDX_LATITUDE: usize = 6;
const IDX_ALTITUDE: usize = 7;
const IDX_ON_GROUND: usize = 8;
const IDX_VELOCITY: usize = 9;
const IDX_HEADING: usize = 10;

/// Seam between the poller and whatever transport actually serves the
/// state vectors. Tests substitute a mock.
#[async_trait]
pub trait StateVectorSource: Send + Sync {
    async fn fetch_states(
        &self,
        time_cursor: Option<i64>,
        ids: &[String],
    ) -> Result<Vec<AircraftPosition>>;
}

#[derive(Debug, Deserialize)]
struct StatesResponse {
    #[allow(dead_code)]
    time: Option<i64>,
    states: Option<Vec<Vec<Value>>>,
}

pub struct FeedClient {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
    request_timeout: Duration,
}

impl FeedClient {
    pub fn new(base_url: &str, retry: RetryPolicy, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .user_agent("Skywatch/1.0 (Aircraft Tracker)")
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry,
            request_timeout: Duration::from_secs(timeout_secs.max(1)),
        })
    }

    /// Execute request with bounded retry. 429 and 5xx back off through
    /// the shared policy; other client errors don't retry.
    async fn execute_with_retry(&self, url: &str, params: &[(&str, String)]) -> Result<reqwest::Response> {
        for attempt in 0..self.retry.max_attempts {
            let request = self.client.get(url).query(params);

            match timeout(self.request_timeout, request.send()).await {
                Ok(Ok(response)) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    } else if status == StatusCode::TOO_MANY_REQUESTS {
                        warn!("Feed rate limited (429) on attempt {}, backing off", attempt + 1);
                    } else if status.is_server_error() {
                        warn!("Feed server error {} on attempt {}", status, attempt + 1);
                    } else {
                        let body = response.text().await.unwrap_or_default();
                        bail!("Feed error {}: {}", status, body);
                    }
                }
                Ok(Err(e)) => {
                    warn!("Feed request failed (attempt {}): {}", attempt + 1, e);
                }
                Err(_) => {
                    warn!("Feed request timeout (attempt {})", attempt + 1);
                }
            }

            if !self.retry.is_exhausted(attempt) {
                let delay = self.retry.delay_for(attempt);
                debug!("Retrying feed call in {}ms", delay.as_millis());
                sleep(delay).await;
            }
        }

        bail!("Max retries exceeded for {}", url)
    }
}

#[async_trait]
impl StateVectorSource for FeedClient {
    async fn fetch_states(
        &self,
        time_cursor: Option<i64>,
        ids: &[String],
    ) -> Result<Vec<AircraftPosition>> {
        let url = format!("{}/states/all", self.base_url);

        let mut params = vec![("icao24", ids.join(","))];
        if let Some(t) = time_cursor {
            params.push(("time", t.to_string()));
        }

        let response = self.execute_with_retry(&url, &params).await?;
        let payload: StatesResponse = response
            .json()
            .await
            .context("Failed to parse states response")?;

        let positions: Vec<AircraftPosition> = payload
            .states
            .unwrap_or_default()
            .iter()
            .filter_map(|row| parse_state_vector(row))
            .collect();

        debug!("📡 Feed returned {} state vectors for {} ids", positions.len(), ids.len());
        Ok(positions)
    }
}

/// Decode one fixed-position state vector. Rows without a valid icao24
/// are dropped; every other missing/null field defaults to 0 / false.
pub(crate) fn parse_state_vector(row: &[Value]) -> Option<AircraftPosition> {
    let icao24 = normalize_icao24(row.get(IDX_ICAO24)?.as_str()?)?;

    Some(AircraftPosition {
        icao24,
        latitude: value_f64(row, IDX_LATITUDE),
        longitude: value_f64(row, IDX_LONGITUDE),
        altitude: value_f64(row, IDX_ALTITUDE),
        velocity: value_f64(row, IDX_VELOCITY),
        heading: value_f64(row, IDX_HEADING),
        on_ground: value_bool(row, IDX_ON_GROUND),
        last_contact: value_i64(row, IDX_LAST_CONTACT),
    })
}

fn value_f64(row: &[Value], idx: usize) -> f64 {
    row.get(idx).and_then(Value::as_f64).unwrap_or(0.0)
}

fn value_i64(row: &[Value], idx: usize) -> i64 {
    // Some feeds serialize timestamps as floats.
    row.get(idx)
        .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
        .unwrap_or(0)
}

fn value_bool(row: &[Value], idx: usize) -> bool {
    row.get(idx).and_then(Value::as_bool).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn full_row() -> Vec<Value> {
        // [icao24, callsign, origin_country, time_position, last_contact,
        //  longitude, latitude, altitude, on_ground, velocity, heading]
        vec![
            json!("A1B2C3"),
            json!("ACME123"),
            json!("Germany"),
            json!(1700000000),
            json!(1700000042),
            json!(13.405),
            json!(52.52),
            json!(11277.6),
            json!(false),
            json!(231.4),
            json!(87.3),
        ]
    }

    #[test]
    fn test_parse_preserves_index_mapping() {
        let pos = parse_state_vector(&full_row()).unwrap();
        assert_eq!(pos.icao24, "a1b2c3");
        assert_eq!(pos.last_contact, 1700000042);
        assert!((pos.longitude - 13.405).abs() < 1e-9);
        assert!((pos.latitude - 52.52).abs() < 1e-9);
        assert!((pos.altitude - 11277.6).abs() < 1e-9);
        assert!(!pos.on_ground);
        assert!((pos.velocity - 231.4).abs() < 1e-9);
        assert!((pos.heading - 87.3).abs() < 1e-9);
    }

    #[test]
    fn test_null_fields_default_to_zero_false() {
        let mut row = full_row();
        for idx in [
            IDX_LAST_CONTACT,
            IDX_LONGITUDE,
            IDX_LATITUDE,
            IDX_ALTITUDE,
            IDX_ON_GROUND,
            IDX_VELOCITY,
            IDX_HEADING,
        ] {
            row[idx] = Value::Null;
        }

        let pos = parse_state_vector(&row).unwrap();
        assert_eq!(pos.last_contact, 0);
        assert_eq!(pos.longitude, 0.0);
        assert_eq!(pos.latitude, 0.0);
        assert_eq!(pos.altitude, 0.0);
        assert!(!pos.on_ground);
        assert_eq!(pos.velocity, 0.0);
        assert_eq!(pos.heading, 0.0);
    }

    #[test]
    fn test_short_row_still_parses() {
        // Only the identifier present: everything else defaults.
        let row = vec![json!("a1b2c3")];
        let pos = parse_state_vector(&row).unwrap();
        assert_eq!(pos.icao24, "a1b2c3");
        assert_eq!(pos.last_contact, 0);
    }

    #[test]
    fn test_invalid_id_row_dropped() {
        let mut row = full_row();
        row[IDX_ICAO24] = json!("tooshort-and-not-hex");
        assert!(parse_state_vector(&row).is_none());

        row[IDX_ICAO24] = Value::Null;
        assert!(parse_state_vector(&row).is_none());
    }

    #[tokio::test]
    async fn test_client_creation() {
        let client = FeedClient::new(
            "https://opensky-network.org/api/",
            RetryPolicy::new(3),
            30,
        );
        assert!(client.is_ok());
        assert_eq!(client.unwrap().base_url, "https://opensky-network.org/api");
    }

    #[tokio::test]
    #[ignore] // Only run against the real feed
    async fn test_fetch_states_real() {
        let client = FeedClient::new(
            "https://opensky-network.org/api",
            RetryPolicy::new(3),
            30,
        )
        .unwrap();

        match client.fetch_states(None, &["3c675a".to_string()]).await {
            Ok(states) => println!("✅ Fetched {} states", states.len()),
            Err(e) => println!("⚠️ Feed call failed (expected if rate limited): {}", e),
        }
    }
}
