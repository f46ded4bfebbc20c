//! Event fan-out to every sink
//!
//! Each closed window is delivered independently to:
//! - the time-series realtime target and the realtime topic (every window)
//! - the time-series main target, the event topic, the camera and the event
//!   notifier (threshold-exceeding windows only)
//!
//! A failure in one sink never skips another. Failed time-series writes go
//! to the [`RetryQueue`]; other failures are logged and dropped.

use crate::config::Config;
use crate::event::{NoiseEvent, PointSchema};
use crate::retry::{write_or_enqueue, RetryQueue};
use crate::sink::{ImageCapturer, Notifier, NullSink, Publisher, TelemetrySink};
use std::sync::Arc;

/// Where each payload goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routes {
    /// Time-series target for threshold-exceeding events
    pub main_target: String,
    /// Time-series target for every window
    pub realtime_target: String,
    pub realtime_topic: String,
    pub event_topic: String,
    pub schema: PointSchema,
}

impl Routes {
    pub fn from_config(config: &Config) -> Self {
        let device = &config.device.device_name;
        Self {
            main_target: config.influxdb.bucket.clone(),
            realtime_target: config.influxdb.realtime_bucket.clone(),
            realtime_topic: format!(
                "homeassistant/sensor/{}/realtime_noise_levels/state",
                device
            ),
            event_topic: format!("homeassistant/sensor/{}/noise_levels/state", device),
            schema: PointSchema {
                measurement: config.influxdb.measurement.clone(),
                location: config.influxdb.location.clone(),
            },
        }
    }
}

/// Per-event delivery tally
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: u32,
    /// Time-series writes parked in the retry queue
    pub queued: u32,
    /// Failed non-durable deliveries
    pub dropped: u32,
}

impl DispatchReport {
    fn record<E: std::fmt::Display>(&mut self, sink: &str, result: Result<(), E>) {
        match result {
            Ok(()) => self.delivered += 1,
            Err(e) => {
                tracing::error!(sink, error = %e, "Delivery failed, dropping");
                self.dropped += 1;
            }
        }
    }
}

/// The set of output channels for noise events
pub struct SinkSet {
    telemetry: Arc<dyn TelemetrySink>,
    publisher: Box<dyn Publisher>,
    notifier: Arc<dyn Notifier>,
    capturer: Box<dyn ImageCapturer>,
    retry: Arc<RetryQueue>,
    routes: Routes,
}

impl SinkSet {
    /// Sink set writing to `telemetry`; every other channel starts as a no-op
    pub fn new(telemetry: Arc<dyn TelemetrySink>, retry: Arc<RetryQueue>, routes: Routes) -> Self {
        Self {
            telemetry,
            publisher: Box::new(NullSink),
            notifier: Arc::new(NullSink),
            capturer: Box::new(NullSink),
            retry,
            routes,
        }
    }

    pub fn with_publisher(mut self, publisher: Box<dyn Publisher>) -> Self {
        self.publisher = publisher;
        self
    }

    /// Notifier receiving a line per threshold-exceeding event
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_capturer(mut self, capturer: Box<dyn ImageCapturer>) -> Self {
        self.capturer = capturer;
        self
    }

    pub fn routes(&self) -> &Routes {
        &self.routes
    }

    pub fn retry_queue(&self) -> &Arc<RetryQueue> {
        &self.retry
    }

    /// Deliver one event to every applicable sink
    pub fn dispatch(&self, event: &NoiseEvent) -> DispatchReport {
        let mut report = DispatchReport::default();
        let routes = &self.routes;

        tracing::info!(peak_db = event.peak_db, "Time window elapsed");

        let realtime = event.realtime_point(&routes.schema);
        let realtime_payload = realtime.fields_json();
        self.write_durable(&mut report, &routes.realtime_target, vec![realtime]);
        report.record(
            "pubsub",
            self.publisher
                .publish(&routes.realtime_topic, realtime_payload.as_bytes()),
        );

        if !event.exceeds_threshold {
            return report;
        }

        tracing::info!(peak_db = event.peak_db, "Noise level exceeded threshold");

        let enriched = event.enriched_point(&routes.schema);
        let enriched_payload = enriched.fields_json();
        self.write_durable(&mut report, &routes.main_target, vec![enriched]);
        report.record(
            "pubsub",
            self.publisher
                .publish(&routes.event_topic, enriched_payload.as_bytes()),
        );
        report.record("camera", self.capturer.capture(event));
        report.record("notifier", self.notifier.notify(&event.summary()));

        report
    }

    fn write_durable(&self, report: &mut DispatchReport, target: &str, points: Vec<crate::event::Point>) {
        match write_or_enqueue(self.telemetry.as_ref(), &self.retry, target, points) {
            Ok(_) => report.delivered += 1,
            Err(_) => report.queued += 1,
        }
    }
}
