//! InfluxDB v2 writer
//!
//! Points are encoded as line protocol with second precision and posted to
//! `/api/v2/write`. Each call is one HTTP request; retries are the caller's
//! job (see `RetryQueue`).

use noisebuster_core::config::InfluxConfig;
use noisebuster_core::event::{FieldValue, Point};
use noisebuster_core::sink::{SinkError, TelemetrySink};
use reqwest::blocking::Client;
use std::time::Duration;

const SINK: &str = "influxdb";

fn escape(text: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn escape_measurement(text: &str) -> String {
    escape(text, &[',', ' '])
}

fn escape_key(text: &str) -> String {
    escape(text, &[',', '=', ' '])
}

fn encode_field(value: &FieldValue) -> String {
    match value {
        FieldValue::Float(v) => format!("{}", v),
        FieldValue::Integer(v) => format!("{}i", v),
        FieldValue::Boolean(v) => v.to_string(),
        FieldValue::Text(v) => format!("\"{}\"", escape(v, &['"', '\\'])),
    }
}

/// Encode one point as a line-protocol line
///
/// Non-finite floats are skipped since InfluxDB rejects them. Returns `None`
/// when no field is left.
pub fn encode_point(point: &Point) -> Option<String> {
    let fields: Vec<String> = point
        .fields
        .iter()
        .filter(|(_, v)| !matches!(v, FieldValue::Float(f) if !f.is_finite()))
        .map(|(k, v)| format!("{}={}", escape_key(k), encode_field(v)))
        .collect();
    if fields.is_empty() {
        return None;
    }

    let mut line = escape_measurement(&point.measurement);
    for (key, value) in &point.tags {
        if value.is_empty() {
            continue;
        }
        line.push(',');
        line.push_str(&escape_key(key));
        line.push('=');
        line.push_str(&escape_key(value));
    }
    line.push(' ');
    line.push_str(&fields.join(","));
    line.push(' ');
    line.push_str(&point.timestamp.timestamp().to_string());
    Some(line)
}

/// Blocking InfluxDB v2 client
pub struct InfluxWriter {
    client: Client,
    write_url: String,
    org: String,
    token: String,
}

impl InfluxWriter {
    pub fn new(config: &InfluxConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout))
            .build()?;
        Ok(Self {
            client,
            write_url: format!("{}/api/v2/write", config.base_url()),
            org: config.org.clone(),
            token: config.token.clone(),
        })
    }
}

impl TelemetrySink for InfluxWriter {
    fn write(&self, target: &str, points: &[Point]) -> Result<(), SinkError> {
        let body: Vec<String> = points.iter().filter_map(encode_point).collect();
        if body.is_empty() {
            return Ok(());
        }

        let response = self
            .client
            .post(&self.write_url)
            .query(&[
                ("org", self.org.as_str()),
                ("bucket", target),
                ("precision", "s"),
            ])
            .header("Authorization", format!("Token {}", self.token))
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(body.join("\n"))
            .send()
            .map_err(|e| SinkError::Delivery {
                sink: SINK,
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SinkError::Rejected {
                sink: SINK,
                status: status.as_u16(),
                body: response.text().unwrap_or_default(),
            });
        }

        tracing::debug!(bucket = target, points = body.len(), "Wrote points to InfluxDB");
        Ok(())
    }
}
