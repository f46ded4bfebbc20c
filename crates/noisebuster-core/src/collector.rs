//! Periodic tasks run by the scheduler
//!
//! - [`RetryDrain`] replays the retry queue
//! - [`WeatherRefresh`] records a standalone weather point
//! - [`TrafficCollector`] pulls road traffic counts into the traffic target
//! - [`ImageRetention`] prunes old camera snapshots

use crate::enrichment::EnrichmentProvider;
use crate::event::{round1, Point};
use crate::retry::{write_or_enqueue, RetryQueue};
use crate::scheduler::PeriodicTask;
use crate::sink::TelemetrySink;
use anyhow::Context;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Drains the retry queue once per run
pub struct RetryDrain {
    queue: Arc<RetryQueue>,
    sink: Arc<dyn TelemetrySink>,
}

impl RetryDrain {
    pub fn new(queue: Arc<RetryQueue>, sink: Arc<dyn TelemetrySink>) -> Self {
        Self { queue, sink }
    }
}

impl PeriodicTask for RetryDrain {
    fn name(&self) -> &str {
        "retry_drain"
    }

    fn run(&mut self) -> anyhow::Result<()> {
        if self.queue.is_empty() {
            return Ok(());
        }
        let report = self.queue.drain(self.sink.as_ref());
        tracing::info!(
            delivered = report.delivered,
            remaining = report.remaining,
            "Retry queue processed"
        );
        Ok(())
    }
}

/// Writes the current weather as its own point
pub struct WeatherRefresh {
    provider: Box<dyn EnrichmentProvider>,
    sink: Arc<dyn TelemetrySink>,
    queue: Arc<RetryQueue>,
    target: String,
    location: String,
}

impl WeatherRefresh {
    pub fn new(
        provider: Box<dyn EnrichmentProvider>,
        sink: Arc<dyn TelemetrySink>,
        queue: Arc<RetryQueue>,
        target: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            sink,
            queue,
            target: target.into(),
            location: location.into(),
        }
    }
}

impl PeriodicTask for WeatherRefresh {
    fn name(&self) -> &str {
        "weather_refresh"
    }

    fn run(&mut self) -> anyhow::Result<()> {
        let conditions = self.provider.fetch().context("Weather refresh failed")?;
        let mut point = Point::new("weather", Utc::now())
            .tag("location", &self.location)
            .field("precipitation", conditions.precipitation);
        if let Some(temperature) = conditions.temperature {
            point = point.field("temperature", temperature);
        }
        if let Some(description) = conditions.description {
            point = point.field("weather_description", description);
        }

        // Queued on failure; the error is already logged
        let _ = write_or_enqueue(self.sink.as_ref(), &self.queue, &self.target, vec![point]);
        Ok(())
    }
}

/// Hourly road-user counts for one road segment
#[derive(Debug, Clone, PartialEq)]
pub struct TrafficCount {
    pub timestamp: DateTime<Utc>,
    pub segment_id: String,
    pub heavy: f64,
    pub car: f64,
    pub bike: f64,
    pub pedestrian: f64,
    /// 85th percentile speed in km/h
    pub v85: Option<f64>,
}

impl TrafficCount {
    pub fn to_point(&self) -> Point {
        let mut point = Point::new("telraam_traffic", self.timestamp)
            .tag("segment_id", &self.segment_id)
            .field("heavy", round1(self.heavy))
            .field("car", round1(self.car))
            .field("bike", round1(self.bike))
            .field("pedestrian", round1(self.pedestrian));
        if let Some(v85) = self.v85 {
            point = point.field("v85", round1(v85));
        }
        point
    }
}

/// Source of traffic counts
pub trait TrafficSource: Send {
    fn fetch(&mut self) -> anyhow::Result<Vec<TrafficCount>>;
}

/// Pulls traffic counts into the traffic target
pub struct TrafficCollector {
    source: Box<dyn TrafficSource>,
    sink: Arc<dyn TelemetrySink>,
    queue: Arc<RetryQueue>,
    target: String,
}

impl TrafficCollector {
    pub fn new(
        source: Box<dyn TrafficSource>,
        sink: Arc<dyn TelemetrySink>,
        queue: Arc<RetryQueue>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            source,
            sink,
            queue,
            target: target.into(),
        }
    }
}

impl PeriodicTask for TrafficCollector {
    fn name(&self) -> &str {
        "traffic"
    }

    fn run(&mut self) -> anyhow::Result<()> {
        let counts = self.source.fetch().context("Traffic request failed")?;
        if counts.is_empty() {
            tracing::info!("No traffic data for the requested period");
            return Ok(());
        }

        let points: Vec<Point> = counts.iter().map(TrafficCount::to_point).collect();
        tracing::info!(points = points.len(), "Writing traffic data");
        let _ = write_or_enqueue(self.sink.as_ref(), &self.queue, &self.target, points);
        Ok(())
    }
}

/// Deletes files older than `max_age` from a directory
pub struct ImageRetention {
    dir: PathBuf,
    max_age: Duration,
}

impl ImageRetention {
    pub fn new(dir: impl Into<PathBuf>, max_age: Duration) -> Self {
        Self {
            dir: dir.into(),
            max_age,
        }
    }

    /// Remove expired files as of `now`; returns how many were deleted
    pub fn prune(&self, now: SystemTime) -> anyhow::Result<usize> {
        if !self.dir.exists() {
            return Ok(0);
        }

        let mut removed = 0;
        let entries = std::fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to list {}", self.dir.display()))?;
        for entry in entries {
            let entry = entry?;
            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }
            let age = now
                .duration_since(metadata.modified()?)
                .unwrap_or(Duration::ZERO);
            if age > self.max_age {
                match std::fs::remove_file(entry.path()) {
                    Ok(()) => {
                        removed += 1;
                        tracing::debug!(path = %entry.path().display(), "Deleted old image");
                    }
                    Err(e) => {
                        tracing::warn!(path = %entry.path().display(), error = %e, "Failed to delete image");
                    }
                }
            }
        }
        Ok(removed)
    }
}

impl PeriodicTask for ImageRetention {
    fn name(&self) -> &str {
        "image_retention"
    }

    fn run(&mut self) -> anyhow::Result<()> {
        let removed = self.prune(SystemTime::now())?;
        if removed > 0 {
            tracing::info!(removed, dir = %self.dir.display(), "Pruned old images");
        }
        Ok(())
    }
}
