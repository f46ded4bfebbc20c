//! E2E tests for event fan-out
//!
//! Verifies which channels see each closed window and that a failing channel
//! never blocks the others.

mod common;

use chrono::{TimeZone, Utc};
use common::{RecordingBroker, RecordingCamera, RecordingNotifier, RecordingTsdb};
use noisebuster::fanout::{DispatchReport, Routes};
use noisebuster::sink::{ImageCapturer, Notifier, Publisher, SinkError};
use noisebuster::{Config, NoiseEvent, RetryQueue, SinkSet};
use std::sync::Arc;

fn event(peak_db: f64, exceeds_threshold: bool) -> NoiseEvent {
    NoiseEvent {
        timestamp: Utc.with_ymd_and_hms(2024, 6, 1, 21, 5, 9).unwrap(),
        peak_db,
        exceeds_threshold,
        temperature: Some(14.2),
        weather_description: Some("light rain".into()),
        precipitation: 0.4,
    }
}

struct Down;

impl Publisher for Down {
    fn publish(&self, _topic: &str, _payload: &[u8]) -> Result<(), SinkError> {
        Err(SinkError::Unavailable("mqtt"))
    }
}

impl Notifier for Down {
    fn notify(&self, _message: &str) -> Result<(), SinkError> {
        Err(SinkError::Delivery {
            sink: "discord",
            reason: "timed out".into(),
        })
    }
}

impl ImageCapturer for Down {
    fn capture(&self, _event: &NoiseEvent) -> Result<(), SinkError> {
        Err(SinkError::Rejected {
            sink: "camera",
            status: 503,
            body: String::new(),
        })
    }
}

struct Rig {
    tsdb: Arc<RecordingTsdb>,
    queue: Arc<RetryQueue>,
    broker: RecordingBroker,
    camera: RecordingCamera,
    notifier: Arc<RecordingNotifier>,
    sinks: SinkSet,
}

impl Rig {
    fn new() -> Self {
        let tsdb = Arc::new(RecordingTsdb::default());
        let queue = Arc::new(RetryQueue::new());
        let broker = RecordingBroker::default();
        let camera = RecordingCamera::default();
        let notifier = Arc::new(RecordingNotifier::default());
        let sinks = SinkSet::new(
            tsdb.clone(),
            Arc::clone(&queue),
            Routes::from_config(&Config::default()),
        )
        .with_publisher(Box::new(broker.clone()))
        .with_capturer(Box::new(camera.clone()))
        .with_notifier(notifier.clone());
        Self {
            tsdb,
            queue,
            broker,
            camera,
            notifier,
            sinks,
        }
    }
}

/// A loud window reaches every channel, realtime before event
#[test]
fn test_loud_window_reaches_every_channel() {
    let rig = Rig::new();
    let report = rig.sinks.dispatch(&event(91.3, true));

    assert_eq!(
        report,
        DispatchReport {
            delivered: 6,
            queued: 0,
            dropped: 0
        }
    );
    assert_eq!(
        rig.tsdb.targets(),
        ["noise_buster_realtime", "noise_buster"]
    );

    let messages = rig.broker.messages.lock().unwrap().clone();
    let topics: Vec<_> = messages.iter().map(|(t, _)| t.as_str()).collect();
    assert_eq!(
        topics,
        [
            "homeassistant/sensor/noise_buster/realtime_noise_levels/state",
            "homeassistant/sensor/noise_buster/noise_levels/state",
        ]
    );
    let payload: serde_json::Value = serde_json::from_str(&messages[1].1).unwrap();
    assert_eq!(payload["noise_level"], 91.3);
    assert_eq!(payload["weather_description"], "light rain");
    assert_eq!(payload["precipitation"], 0.4);

    assert_eq!(rig.camera.events.lock().unwrap().len(), 1);
    let notes = rig.notifier.messages.lock().unwrap().clone();
    assert_eq!(notes.len(), 1);
    assert!(notes[0].starts_with("Noise event: 91.3 dB at 2024-06-01 21:05:09 UTC"));
    assert!(notes[0].contains("light rain"));
}

/// A quiet window only feeds the realtime channels
#[test]
fn test_quiet_window_skips_event_channels() {
    let rig = Rig::new();
    let report = rig.sinks.dispatch(&event(64.0, false));

    assert_eq!(report.delivered, 2);
    assert_eq!(rig.tsdb.targets(), ["noise_buster_realtime"]);
    assert_eq!(rig.broker.messages.lock().unwrap().len(), 1);
    assert!(rig.camera.events.lock().unwrap().is_empty());
    assert!(rig.notifier.messages.lock().unwrap().is_empty());
}

/// Broken broker, camera and notifier are dropped; the store still gets both writes
#[test]
fn test_failing_channels_do_not_block_store() {
    let tsdb = Arc::new(RecordingTsdb::default());
    let queue = Arc::new(RetryQueue::new());
    let sinks = SinkSet::new(
        tsdb.clone(),
        Arc::clone(&queue),
        Routes::from_config(&Config::default()),
    )
    .with_publisher(Box::new(Down))
    .with_capturer(Box::new(Down))
    .with_notifier(Arc::new(Down));

    let report = sinks.dispatch(&event(88.0, true));
    assert_eq!(report.delivered, 2);
    assert_eq!(report.dropped, 4);
    assert_eq!(tsdb.targets(), ["noise_buster_realtime", "noise_buster"]);
    assert!(queue.is_empty());
}

/// With the store down the other channels still fire and both writes are parked
#[test]
fn test_store_outage_queues_and_continues() {
    let rig = Rig::new();
    rig.tsdb.set_down(true);

    let report = rig.sinks.dispatch(&event(85.0, true));
    assert_eq!(report.queued, 2);
    assert_eq!(report.delivered, 4);
    assert_eq!(rig.queue.len(), 2);
    assert_eq!(rig.broker.messages.lock().unwrap().len(), 2);
    assert_eq!(rig.notifier.messages.lock().unwrap().len(), 1);
}
