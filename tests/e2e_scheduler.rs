//! E2E tests for scheduled maintenance tasks
//!
//! Weather refresh, traffic collection, image retention and retry draining
//! wired into one scheduler, the way the monitor runs them.

mod common;

use chrono::{TimeZone, Utc};
use common::{CountingWeather, FailingWeather, RecordingTsdb};
use noisebuster::collector::{
    ImageRetention, RetryDrain, TrafficCollector, TrafficCount, TrafficSource, WeatherRefresh,
};
use noisebuster::event::FieldValue;
use noisebuster::scheduler::{FnTask, Scheduler};
use noisebuster::RetryQueue;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

struct OneHour {
    calls: Arc<AtomicUsize>,
}

impl TrafficSource for OneHour {
    fn fetch(&mut self) -> anyhow::Result<Vec<TrafficCount>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![TrafficCount {
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
            segment_id: "9000001234".into(),
            heavy: 2.0,
            car: 88.0,
            bike: 9.0,
            pedestrian: 14.0,
            v85: Some(38.5),
        }])
    }
}

/// Traffic runs on the first tick; weather waits for its interval
#[test]
fn test_traffic_immediate_weather_delayed() {
    let tsdb = Arc::new(RecordingTsdb::default());
    let queue = Arc::new(RetryQueue::new());
    let traffic_calls = Arc::new(AtomicUsize::new(0));
    let weather = CountingWeather::default();
    let weather_calls = weather.calls.clone();

    let mut scheduler = Scheduler::new(Duration::from_secs(1));
    scheduler.register(
        Box::new(WeatherRefresh::new(
            Box::new(weather),
            tsdb.clone(),
            Arc::clone(&queue),
            "noise_buster",
            "noise_buster",
        )),
        Duration::from_secs(300),
    );
    scheduler.register_immediate(
        Box::new(TrafficCollector::new(
            Box::new(OneHour {
                calls: Arc::clone(&traffic_calls),
            }),
            tsdb.clone(),
            Arc::clone(&queue),
            "telraam",
        )),
        Duration::from_secs(3600),
    );

    let now = Instant::now();
    assert_eq!(scheduler.run_pending(now), 1);
    assert_eq!(traffic_calls.load(Ordering::SeqCst), 1);
    assert_eq!(weather_calls.load(Ordering::SeqCst), 0);

    let traffic = tsdb.points_for("telraam");
    assert_eq!(traffic[0].measurement, "telraam_traffic");
    assert_eq!(traffic[0].fields["car"], FieldValue::Float(88.0));

    assert_eq!(scheduler.run_pending(now + Duration::from_secs(301)), 1);
    let weather_points = tsdb.points_for("noise_buster");
    assert_eq!(weather_points[0].measurement, "weather");
    assert_eq!(weather_points[0].fields["temperature"], FieldValue::Float(1.0));
}

/// A failing weather task is logged and the retry drain still runs
#[test]
fn test_failing_task_isolated() {
    let tsdb = Arc::new(RecordingTsdb::default());
    let queue = Arc::new(RetryQueue::new());
    queue.enqueue("noise_buster", vec![]);

    let mut scheduler = Scheduler::new(Duration::from_secs(1));
    scheduler.register_immediate(
        Box::new(WeatherRefresh::new(
            Box::new(FailingWeather),
            tsdb.clone(),
            Arc::clone(&queue),
            "noise_buster",
            "noise_buster",
        )),
        Duration::from_secs(300),
    );
    scheduler.register_immediate(
        Box::new(RetryDrain::new(Arc::clone(&queue), tsdb.clone())),
        Duration::from_secs(60),
    );

    assert_eq!(scheduler.run_pending(Instant::now()), 2);
    assert!(queue.is_empty());
}

/// Image retention removes files past the retention age
#[test]
fn test_image_retention_task() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["2024-06-01_21-05-09_clear_14.0C.jpg", "2024-06-01_22-00-00_rain_12.0C.jpg"] {
        std::fs::write(dir.path().join(name), b"jpg").unwrap();
    }

    let retention = ImageRetention::new(dir.path(), Duration::from_secs(24 * 3600));
    assert_eq!(retention.prune(SystemTime::now()).unwrap(), 0);
    let two_days = SystemTime::now() + Duration::from_secs(48 * 3600);
    assert_eq!(retention.prune(two_days).unwrap(), 2);
}

/// The scheduler loop stops promptly when shutdown is signalled
#[test]
fn test_run_until_shutdown() {
    let ticks = Arc::new(AtomicUsize::new(0));
    let mut scheduler = Scheduler::new(Duration::from_millis(10));
    {
        let ticks = Arc::clone(&ticks);
        scheduler.register_immediate(
            Box::new(FnTask::new("heartbeat", move || {
                ticks.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })),
            Duration::from_millis(10),
        );
    }

    let (tx, rx) = crossbeam_channel::bounded(1);
    let started = Instant::now();
    let handle = std::thread::spawn(move || scheduler.run(&rx));
    std::thread::sleep(Duration::from_millis(100));
    tx.send(()).unwrap();
    handle.join().unwrap();

    assert!(ticks.load(Ordering::SeqCst) >= 2);
    assert!(started.elapsed() < Duration::from_secs(2));
}
