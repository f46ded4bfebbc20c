//! NoiseBuster - Sound level meter monitor
//!
//! This library re-exports the sampling pipeline from `noisebuster-core` and
//! the network collaborators from `noisebuster-sinks`.

pub use noisebuster_core::{
    aggregator, collector, config, enrichment, event, fanout, meter, monitor, retry, sampling,
    scheduler, sink,
};
pub use noisebuster_sinks as sinks;

pub use noisebuster_core::{
    Collaborators, Config, Monitor, NoiseEvent, Point, RetryQueue, SamplingLoop, Scheduler,
    ShutdownReport, SinkSet, WindowAggregator,
};
pub use noisebuster_core::{DEFAULT_POLL_INTERVAL_MS, DEFAULT_TICK_MS, PEAK_FLOOR_DB, VERSION};
