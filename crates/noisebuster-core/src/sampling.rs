//! High-frequency sampling loop
//!
//! Runs on its own thread at the meter's poll interval. Each iteration first
//! closes the window if it has elapsed (classify, then fan out), then reads
//! one sample. A failed read triggers an immediate reconnect attempt; the
//! open window keeps its peak across the gap.

use crate::aggregator::WindowAggregator;
use crate::event::NoiseEvent;
use crate::fanout::{DispatchReport, SinkSet};
use crate::meter::{MeasurementSource, MeterError};
use chrono::Utc;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

/// Meter link state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    /// Reads are failing; `attempt` counts reconnects tried so far (1-based)
    Reconnecting { attempt: u32 },
}

/// What happened to the sample of one iteration
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleOutcome {
    /// A level was read and fed to the window
    Level { db: f64, new_peak: bool },
    /// The read failed and the device was found again
    Reconnected,
    /// The read failed and the device is still missing
    Disconnected,
}

/// Result of one loop iteration
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    /// Event emitted when the window closed this iteration
    pub closed: Option<(NoiseEvent, DispatchReport)>,
    pub sample: SampleOutcome,
}

/// Meter, aggregator and sinks driven at a fixed cadence
pub struct SamplingLoop {
    source: Box<dyn MeasurementSource>,
    aggregator: WindowAggregator,
    sinks: SinkSet,
    threshold_db: f64,
    poll_interval: Duration,
    state: ConnectionState,
}

impl SamplingLoop {
    pub fn new(
        source: Box<dyn MeasurementSource>,
        aggregator: WindowAggregator,
        sinks: SinkSet,
        threshold_db: f64,
        poll_interval: Duration,
    ) -> Self {
        Self {
            source,
            aggregator,
            sinks,
            threshold_db,
            poll_interval,
            state: ConnectionState::Connected,
        }
    }

    pub fn aggregator(&self) -> &WindowAggregator {
        &self.aggregator
    }

    pub fn sinks(&self) -> &SinkSet {
        &self.sinks
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// One iteration at monotonic time `now`
    pub fn step(&mut self, now: Instant) -> StepOutcome {
        let closed = self.aggregator.poll(now).map(|window| {
            let event = NoiseEvent::classify(window, self.threshold_db, Utc::now());
            let report = self.sinks.dispatch(&event);
            if report.queued > 0 || report.dropped > 0 {
                tracing::warn!(
                    delivered = report.delivered,
                    queued = report.queued,
                    dropped = report.dropped,
                    "Event partially delivered"
                );
            }
            (event, report)
        });

        let sample = match self.source.sample() {
            Ok(db) => {
                if let ConnectionState::Reconnecting { attempt } = self.state {
                    tracing::info!(attempts = attempt, "Meter readings resumed");
                }
                self.state = ConnectionState::Connected;
                let new_peak = self.aggregator.observe(db);
                tracing::trace!(level_db = db, new_peak, "Sample");
                SampleOutcome::Level { db, new_peak }
            }
            Err(e) => self.handle_read_error(e),
        };

        StepOutcome { closed, sample }
    }

    fn handle_read_error(&mut self, error: MeterError) -> SampleOutcome {
        let attempt = match self.state {
            ConnectionState::Connected => {
                tracing::error!(error = %error, transport = %self.source.kind(), "Meter read failed, reconnecting");
                1
            }
            ConnectionState::Reconnecting { attempt } => attempt + 1,
        };

        match self.source.reconnect() {
            Ok(()) => {
                tracing::info!(attempt, "Meter reconnected");
                self.state = ConnectionState::Connected;
                SampleOutcome::Reconnected
            }
            Err(e) => {
                // Only the first failure of a streak is loud
                if attempt == 1 {
                    tracing::warn!(error = %e, "Meter not found, will keep trying");
                } else {
                    tracing::debug!(attempt, error = %e, "Reconnect attempt failed");
                }
                self.state = ConnectionState::Reconnecting { attempt };
                SampleOutcome::Disconnected
            }
        }
    }

    /// Step at the poll interval until `stop` fires or disconnects
    pub fn run(mut self, stop: Receiver<()>) {
        tracing::info!(
            transport = %self.source.kind(),
            poll_ms = self.poll_interval.as_millis() as u64,
            window_secs = self.aggregator.duration().as_secs_f64(),
            "Sampling started"
        );

        loop {
            self.step(Instant::now());
            match stop.recv_timeout(self.poll_interval) {
                Err(RecvTimeoutError::Timeout) => continue,
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        tracing::info!("Sampling stopped");
    }
}
