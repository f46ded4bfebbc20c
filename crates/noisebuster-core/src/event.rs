//! Noise events and telemetry points
//!
//! A [`NoiseEvent`] is produced for every closed window. It turns into a
//! realtime [`Point`] (peak only) for every window and an enriched point
//! (peak plus weather) for windows at or above the threshold.

use crate::aggregator::ClosedWindow;
use crate::enrichment::Conditions;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// A single field value of a telemetry point
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Float(f64),
    Integer(i64),
    Text(String),
    Boolean(bool),
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Boolean(v)
    }
}

/// One time-series record: `{timestamp, tags, fields}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Point {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, FieldValue>,
    pub timestamp: DateTime<Utc>,
}

impl Point {
    pub fn new(measurement: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            measurement: measurement.into(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            timestamp,
        }
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// JSON object of the fields, used as the pub/sub payload
    pub fn fields_json(&self) -> String {
        serde_json::to_string(&self.fields).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Measurement name and location tag of noise points
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointSchema {
    pub measurement: String,
    pub location: String,
}

impl Default for PointSchema {
    fn default() -> Self {
        Self {
            measurement: "noise_buster_events".to_string(),
            location: "noise_buster".to_string(),
        }
    }
}

/// Round to one decimal place
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Immutable record of one closed window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NoiseEvent {
    /// Window close time
    pub timestamp: DateTime<Utc>,
    /// Window peak, one decimal
    pub peak_db: f64,
    pub exceeds_threshold: bool,
    pub temperature: Option<f64>,
    pub weather_description: Option<String>,
    pub precipitation: f64,
}

impl NoiseEvent {
    /// Classify a closed window against the threshold
    ///
    /// The raw peak is compared; only the reported value is rounded, so a
    /// 79.96 dB peak reports as 80.0 without exceeding an 80 dB threshold.
    pub fn classify(window: ClosedWindow, threshold_db: f64, timestamp: DateTime<Utc>) -> Self {
        let exceeds_threshold = window.peak_db >= threshold_db;
        let peak_db = round1(window.peak_db);
        let Conditions {
            temperature,
            description,
            precipitation,
        } = window.conditions;
        Self {
            timestamp,
            peak_db,
            exceeds_threshold,
            temperature,
            weather_description: description,
            precipitation,
        }
    }

    /// Peak-only point delivered for every window
    pub fn realtime_point(&self, schema: &PointSchema) -> Point {
        Point::new(&schema.measurement, self.timestamp)
            .tag("location", &schema.location)
            .field("noise_level", self.peak_db)
    }

    /// Peak plus weather; unknown values become `0.0` and `""`
    pub fn enriched_point(&self, schema: &PointSchema) -> Point {
        self.realtime_point(schema)
            .field("temperature", self.temperature.unwrap_or(0.0))
            .field(
                "weather_description",
                self.weather_description.clone().unwrap_or_default(),
            )
            .field("precipitation", self.precipitation)
    }

    /// Human-readable line for chat notifiers
    pub fn summary(&self) -> String {
        let mut line = format!(
            "Noise event: {:.1} dB at {}",
            self.peak_db,
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
        );
        if let Some(description) = &self.weather_description {
            line.push_str(&format!(", {}", description));
        }
        if let Some(temperature) = self.temperature {
            line.push_str(&format!(", {:.1} °C", temperature));
        }
        if self.precipitation > 0.0 {
            line.push_str(&format!(", {:.1} mm", self.precipitation));
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn closed(peak_db: f64, conditions: Conditions) -> ClosedWindow {
        ClosedWindow {
            peak_db,
            conditions,
            duration: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_classify_rounds_and_compares() {
        let event = NoiseEvent::classify(closed(85.04, Conditions::default()), 80.0, ts());
        assert_eq!(event.peak_db, 85.0);
        assert!(event.exceeds_threshold);
        assert_eq!(event.timestamp, ts());
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let event = NoiseEvent::classify(closed(80.0, Conditions::default()), 80.0, ts());
        assert!(event.exceeds_threshold);
        let event = NoiseEvent::classify(closed(79.9, Conditions::default()), 80.0, ts());
        assert!(!event.exceeds_threshold);
    }

    #[test]
    fn test_threshold_uses_raw_peak() {
        let event = NoiseEvent::classify(closed(79.96, Conditions::default()), 80.0, ts());
        assert_eq!(event.peak_db, 80.0);
        assert!(!event.exceeds_threshold);
    }

    #[test]
    fn test_enriched_point_defaults_unknown_weather() {
        let event = NoiseEvent::classify(closed(90.0, Conditions::default()), 80.0, ts());
        let point = event.enriched_point(&PointSchema::default());
        assert_eq!(point.fields["temperature"], FieldValue::Float(0.0));
        assert_eq!(
            point.fields["weather_description"],
            FieldValue::Text(String::new())
        );
        assert_eq!(point.tags["location"], "noise_buster");
    }

    #[test]
    fn test_realtime_point_has_only_noise_level() {
        let event = NoiseEvent::classify(closed(42.0, Conditions::default()), 80.0, ts());
        let point = event.realtime_point(&PointSchema::default());
        assert_eq!(point.fields.len(), 1);
        assert_eq!(point.fields_json(), r#"{"noise_level":42.0}"#);
    }

    #[test]
    fn test_summary_mentions_weather() {
        let conditions = Conditions {
            temperature: Some(18.5),
            description: Some("light rain".into()),
            precipitation: 0.4,
        };
        let event = NoiseEvent::classify(closed(91.2, conditions), 80.0, ts());
        let summary = event.summary();
        assert!(summary.contains("91.2 dB"));
        assert!(summary.contains("light rain"));
        assert!(summary.contains("18.5"));
    }
}
