//! NoiseBuster Core - Sampling loop, peak-hold windows, and resilient telemetry
//!
//! This library reads a sound level meter continuously, holds the peak level
//! over fixed time windows, classifies each closed window against a noise
//! threshold, and fans the resulting event out to independent sinks. Failed
//! time-series writes are parked in a FIFO retry queue that a low-frequency
//! scheduler drains alongside weather, traffic and housekeeping tasks.

pub mod aggregator;
pub mod collector;
pub mod config;
pub mod enrichment;
pub mod event;
pub mod fanout;
pub mod meter;
pub mod monitor;
pub mod retry;
pub mod sampling;
pub mod scheduler;
pub mod sink;

pub use aggregator::WindowAggregator;
pub use config::Config;
pub use event::{NoiseEvent, Point};
pub use fanout::SinkSet;
pub use monitor::{Collaborators, Monitor, ShutdownReport};
pub use retry::RetryQueue;
pub use sampling::SamplingLoop;
pub use scheduler::Scheduler;

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default sampling cadence of the meter (10 Hz)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Default scheduler tick (1 Hz)
pub const DEFAULT_TICK_MS: u64 = 1000;

/// Level a fresh window starts from, in dB
pub const PEAK_FLOOR_DB: f64 = 0.0;
