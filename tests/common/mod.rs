//! In-memory meters, sinks and providers shared by the e2e tests

#![allow(dead_code)]

use noisebuster::enrichment::{Conditions, EnrichmentError, EnrichmentProvider};
use noisebuster::event::{NoiseEvent, Point};
use noisebuster::meter::{MeasurementSource, MeterError, SourceKind};
use noisebuster::sink::{ImageCapturer, Notifier, Publisher, SinkError, TelemetrySink};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Meter replaying a fixed script, then repeating `idle_db` forever
pub struct ScriptedMeter {
    pub reads: VecDeque<Result<f64, MeterError>>,
    pub reconnects: VecDeque<bool>,
    pub idle_db: Option<f64>,
    pub reconnect_calls: Arc<AtomicUsize>,
}

impl ScriptedMeter {
    pub fn levels(levels: &[f64]) -> Self {
        Self {
            reads: levels.iter().map(|&l| Ok(l)).collect(),
            reconnects: VecDeque::new(),
            idle_db: None,
            reconnect_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn idle(mut self, db: f64) -> Self {
        self.idle_db = Some(db);
        self
    }
}

impl MeasurementSource for ScriptedMeter {
    fn sample(&mut self) -> Result<f64, MeterError> {
        match self.reads.pop_front() {
            Some(read) => read,
            None => self
                .idle_db
                .ok_or_else(|| MeterError::DeviceUnavailable("unplugged".into())),
        }
    }

    fn reconnect(&mut self) -> Result<(), MeterError> {
        self.reconnect_calls.fetch_add(1, Ordering::SeqCst);
        if self.reconnects.pop_front().unwrap_or(false) {
            Ok(())
        } else {
            Err(MeterError::DeviceUnavailable("unplugged".into()))
        }
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Usb
    }
}

/// Time-series store that records writes and can be switched off
#[derive(Default)]
pub struct RecordingTsdb {
    pub writes: Mutex<Vec<(String, Vec<Point>)>>,
    pub down: AtomicBool,
    pub attempts: AtomicUsize,
}

impl RecordingTsdb {
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn targets(&self) -> Vec<String> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .map(|(t, _)| t.clone())
            .collect()
    }

    pub fn points_for(&self, target: &str) -> Vec<Point> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| t == target)
            .flat_map(|(_, p)| p.clone())
            .collect()
    }
}

impl TelemetrySink for RecordingTsdb {
    fn write(&self, target: &str, points: &[Point]) -> Result<(), SinkError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.down.load(Ordering::SeqCst) {
            return Err(SinkError::Unavailable("tsdb"));
        }
        self.writes
            .lock()
            .unwrap()
            .push((target.to_string(), points.to_vec()));
        Ok(())
    }
}

/// Broker recording `(topic, payload)` pairs
#[derive(Default, Clone)]
pub struct RecordingBroker {
    pub messages: Arc<Mutex<Vec<(String, String)>>>,
}

impl Publisher for RecordingBroker {
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), SinkError> {
        self.messages.lock().unwrap().push((
            topic.to_string(),
            String::from_utf8_lossy(payload).into_owned(),
        ));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub messages: Mutex<Vec<String>>,
}

impl Notifier for RecordingNotifier {
    fn notify(&self, message: &str) -> Result<(), SinkError> {
        self.messages.lock().unwrap().push(message.to_string());
        Ok(())
    }
}

#[derive(Default, Clone)]
pub struct RecordingCamera {
    pub events: Arc<Mutex<Vec<NoiseEvent>>>,
}

impl ImageCapturer for RecordingCamera {
    fn capture(&self, event: &NoiseEvent) -> Result<(), SinkError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Weather whose temperature is the number of calls so far
#[derive(Default, Clone)]
pub struct CountingWeather {
    pub calls: Arc<AtomicUsize>,
}

impl EnrichmentProvider for CountingWeather {
    fn fetch(&mut self) -> Result<Conditions, EnrichmentError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Conditions {
            temperature: Some(n as f64),
            description: Some(format!("reading {}", n)),
            precipitation: 0.0,
        })
    }
}

/// Weather service that is always down
pub struct FailingWeather;

impl EnrichmentProvider for FailingWeather {
    fn fetch(&mut self) -> Result<Conditions, EnrichmentError> {
        Err(EnrichmentError::Unavailable("timeout".into()))
    }
}
