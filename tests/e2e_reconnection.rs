//! E2E tests for meter auto-reconnection
//!
//! Verifies connection state tracking and that the open window keeps its
//! peak while the meter is gone.

mod common;

use approx::assert_relative_eq;
use common::{RecordingTsdb, ScriptedMeter};
use noisebuster::enrichment::NoEnrichment;
use noisebuster::fanout::Routes;
use noisebuster::meter::MeterError;
use noisebuster::sampling::{ConnectionState, SampleOutcome};
use noisebuster::{Config, RetryQueue, SamplingLoop, SinkSet, WindowAggregator};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn sampler(meter: ScriptedMeter, start: Instant) -> (SamplingLoop, Arc<RecordingTsdb>) {
    let tsdb = Arc::new(RecordingTsdb::default());
    let sinks = SinkSet::new(
        tsdb.clone(),
        Arc::new(RetryQueue::new()),
        Routes::from_config(&Config::default()),
    );
    let sampler = SamplingLoop::new(
        Box::new(meter),
        WindowAggregator::new(Duration::from_secs(10), Box::new(NoEnrichment), start),
        sinks,
        80.0,
        Duration::from_millis(100),
    );
    (sampler, tsdb)
}

/// Test ConnectionState values
#[test]
fn test_connection_state_values() {
    assert_eq!(ConnectionState::Connected, ConnectionState::Connected);
    assert_ne!(
        ConnectionState::Reconnecting { attempt: 1 },
        ConnectionState::Reconnecting { attempt: 2 }
    );
}

/// Unplug after 78 dB, replug later: the window still reports 78 dB
#[test]
fn test_peak_survives_disconnect() {
    let start = Instant::now();
    let mut meter = ScriptedMeter::levels(&[60.0, 78.0]).idle(50.0);
    meter.reads.extend([
        Err(MeterError::DeviceUnavailable("no device".into())),
        Err(MeterError::DeviceUnavailable("no device".into())),
        Err(MeterError::DeviceUnavailable("no device".into())),
    ]);
    meter.reconnects.extend([false, false, true]);
    let reconnect_calls = meter.reconnect_calls.clone();
    let (mut sampler, tsdb) = sampler(meter, start);

    for tick in 0..100u64 {
        sampler.step(start + Duration::from_millis(tick * 100));
    }
    assert_eq!(reconnect_calls.load(Ordering::SeqCst), 3);
    assert_eq!(sampler.state(), ConnectionState::Connected);

    let (event, _) = sampler
        .step(start + Duration::from_secs(10))
        .closed
        .unwrap();
    assert_relative_eq!(event.peak_db, 78.0);
    assert_eq!(tsdb.targets(), ["noise_buster_realtime"]);
}

/// Reconnect attempts keep counting while the meter is missing
#[test]
fn test_attempts_count_up_while_missing() {
    let start = Instant::now();
    let (mut sampler, _) = sampler(ScriptedMeter::levels(&[]), start);

    for (i, tick) in (0..5u64).enumerate() {
        let outcome = sampler.step(start + Duration::from_millis(tick * 100));
        assert_eq!(outcome.sample, SampleOutcome::Disconnected);
        assert_eq!(
            sampler.state(),
            ConnectionState::Reconnecting {
                attempt: i as u32 + 1
            }
        );
    }
}

/// Windows keep closing on schedule while the meter is missing
#[test]
fn test_window_closes_during_outage() {
    let start = Instant::now();
    let (mut sampler, tsdb) = sampler(ScriptedMeter::levels(&[91.0]), start);

    for tick in 0..100u64 {
        sampler.step(start + Duration::from_millis(tick * 100));
    }
    let outcome = sampler.step(start + Duration::from_secs(10));
    let (event, _) = outcome.closed.unwrap();
    assert_relative_eq!(event.peak_db, 91.0);
    assert!(event.exceeds_threshold);
    assert_eq!(outcome.sample, SampleOutcome::Disconnected);
    assert_eq!(tsdb.targets(), ["noise_buster_realtime", "noise_buster"]);
}

/// A successful read after reconnecting resets the state
#[test]
fn test_readings_resume_after_reconnect() {
    let start = Instant::now();
    let mut meter = ScriptedMeter::levels(&[]);
    meter.reads.extend([
        Err(MeterError::Transport("pipe error".into())),
        Ok(65.0),
    ]);
    meter.reconnects.push_back(true);
    let (mut sampler, _) = sampler(meter, start);

    assert_eq!(sampler.step(start).sample, SampleOutcome::Reconnected);
    let outcome = sampler.step(start + Duration::from_millis(100));
    assert_eq!(
        outcome.sample,
        SampleOutcome::Level {
            db: 65.0,
            new_peak: true
        }
    );
    assert_eq!(sampler.state(), ConnectionState::Connected);
}
