//! Telraam road traffic counts
//!
//! Requests the hourly segment report covering the last complete interval.

use chrono::{DateTime, Duration as ChronoDuration, DurationRound, Utc};
use noisebuster_core::collector::{TrafficCount, TrafficSource};
use noisebuster_core::config::TelraamConfig;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%SZ";

#[derive(Error, Debug)]
pub enum TelraamError {
    #[error("Telraam request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Telraam returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed Telraam report: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Invalid report date '{0}'")]
    BadDate(String),
}

#[derive(Debug, Deserialize)]
struct Report {
    #[serde(default)]
    report: Vec<Row>,
}

#[derive(Debug, Deserialize)]
struct Row {
    date: String,
    #[serde(default)]
    heavy: f64,
    #[serde(default)]
    car: f64,
    #[serde(default)]
    bike: f64,
    #[serde(default)]
    pedestrian: f64,
    #[serde(default)]
    v85: Option<f64>,
}

/// Parse a `/reports/traffic` response into counts for `segment_id`
pub fn parse_report(body: &str, segment_id: &str) -> Result<Vec<TrafficCount>, TelraamError> {
    let report: Report = serde_json::from_str(body)?;
    report
        .report
        .into_iter()
        .map(|row| {
            let timestamp = DateTime::parse_from_rfc3339(&row.date)
                .map_err(|_| TelraamError::BadDate(row.date.clone()))?
                .with_timezone(&Utc);
            Ok(TrafficCount {
                timestamp,
                segment_id: segment_id.to_string(),
                heavy: row.heavy,
                car: row.car,
                bike: row.bike,
                pedestrian: row.pedestrian,
                v85: row.v85,
            })
        })
        .collect()
}

/// Start and end of the last complete `interval` before `now`, on hour bounds
pub fn report_window(now: DateTime<Utc>, interval: Duration) -> (DateTime<Utc>, DateTime<Utc>) {
    let end = now.duration_trunc(ChronoDuration::hours(1)).unwrap_or(now);
    let span = ChronoDuration::from_std(interval).unwrap_or_else(|_| ChronoDuration::hours(1));
    (end - span, end)
}

/// Telraam API client for one road segment
pub struct TelraamClient {
    client: Client,
    api_url: String,
    api_key: String,
    segment_id: String,
    interval: Duration,
}

impl TelraamClient {
    pub fn new(config: &TelraamConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(HTTP_TIMEOUT).build()?,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            segment_id: config.segment_id.clone(),
            interval: config.interval(),
        })
    }

    fn request_body(&self, now: DateTime<Utc>) -> serde_json::Value {
        let (start, end) = report_window(now, self.interval);
        json!({
            "level": "segments",
            "format": "per-hour",
            "id": self.segment_id,
            "time_start": start.format(TIME_FORMAT).to_string(),
            "time_end": end.format(TIME_FORMAT).to_string(),
        })
    }

    fn request(&self) -> Result<Vec<TrafficCount>, TelraamError> {
        let response = self
            .client
            .post(&self.api_url)
            .header("X-Api-Key", &self.api_key)
            .json(&self.request_body(Utc::now()))
            .send()?;

        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(TelraamError::Status {
                status: status.as_u16(),
                body,
            });
        }
        parse_report(&body, &self.segment_id)
    }
}

impl TrafficSource for TelraamClient {
    fn fetch(&mut self) -> anyhow::Result<Vec<TrafficCount>> {
        let counts = self.request()?;
        tracing::info!(segment = %self.segment_id, rows = counts.len(), "Fetched Telraam report");
        Ok(counts)
    }
}
