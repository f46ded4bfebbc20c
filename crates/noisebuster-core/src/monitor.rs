//! Process wiring
//!
//! [`Monitor`] owns the configuration and the external collaborators, opens
//! the meter, starts the sampling thread and runs the scheduler on the
//! calling thread until shutdown.

use crate::aggregator::WindowAggregator;
use crate::collector::{ImageRetention, RetryDrain, TrafficCollector, TrafficSource, WeatherRefresh};
use crate::config::Config;
use crate::enrichment::{EnrichmentProvider, NoEnrichment};
use crate::fanout::{Routes, SinkSet};
use crate::meter::{open_source, MeasurementSource, MeterError, SourceKind};
use crate::retry::RetryQueue;
use crate::sampling::SamplingLoop;
use crate::scheduler::Scheduler;
use crate::sink::{ImageCapturer, Notifier, NullSink, Publisher, TelemetrySink};
use chrono::Utc;
use crossbeam_channel::Receiver;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Fatal errors before the pipeline is running
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("No measurement source available: {0}")]
    NoMeasurementSource(#[from] MeterError),

    #[error("Failed to start sampling thread: {0}")]
    Thread(#[source] std::io::Error),
}

/// External services the pipeline talks to
///
/// Every field defaults to a no-op so tests and partial deployments only
/// set what they use.
pub struct Collaborators {
    pub telemetry: Arc<dyn TelemetrySink>,
    pub publisher: Box<dyn Publisher>,
    pub notifier: Arc<dyn Notifier>,
    pub capturer: Box<dyn ImageCapturer>,
    /// Looked up on every peak raise
    pub enrichment: Box<dyn EnrichmentProvider>,
    /// Separate provider for the periodic weather point
    pub weather: Option<Box<dyn EnrichmentProvider>>,
    pub traffic: Option<Box<dyn TrafficSource>>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            telemetry: Arc::new(NullSink),
            publisher: Box::new(NullSink),
            notifier: Arc::new(NullSink),
            capturer: Box::new(NullSink),
            enrichment: Box::new(NoEnrichment),
            weather: None,
            traffic: None,
        }
    }
}

/// Summary returned after a clean shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Retry jobs still queued; these are not persisted
    pub lost_jobs: usize,
}

pub struct Monitor {
    config: Config,
    collaborators: Collaborators,
}

impl Monitor {
    pub fn new(config: Config, collaborators: Collaborators) -> Self {
        Self {
            config,
            collaborators,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Open the configured meter and run until `shutdown` fires
    pub fn run(self, shutdown: &Receiver<()>) -> Result<ShutdownReport, StartupError> {
        let source = open_source(&self.config.device)?;
        self.run_with_source(source, shutdown)
    }

    /// Run with an already opened meter
    pub fn run_with_source(
        self,
        source: Box<dyn MeasurementSource>,
        shutdown: &Receiver<()>,
    ) -> Result<ShutdownReport, StartupError> {
        let Monitor {
            config,
            collaborators,
        } = self;
        let Collaborators {
            telemetry,
            publisher,
            notifier,
            capturer,
            enrichment,
            weather,
            traffic,
        } = collaborators;

        let retry = Arc::new(RetryQueue::with_backlog_warning(
            config.scheduler.retry_backlog_warn,
        ));
        let event_notifier: Arc<dyn Notifier> = if config.notifications.on_event {
            Arc::clone(&notifier)
        } else {
            Arc::new(NullSink)
        };
        let sinks = SinkSet::new(
            Arc::clone(&telemetry),
            Arc::clone(&retry),
            Routes::from_config(&config),
        )
        .with_publisher(publisher)
        .with_notifier(event_notifier)
        .with_capturer(capturer);

        let source_kind = source.kind();
        let aggregator = WindowAggregator::new(
            config.device.window_duration(),
            enrichment,
            Instant::now(),
        );
        let sampler = SamplingLoop::new(
            source,
            aggregator,
            sinks,
            config.device.minimum_noise_level,
            config.device.poll_interval(),
        );

        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
        let sampling_thread = std::thread::Builder::new()
            .name("sampling".into())
            .spawn(move || sampler.run(stop_rx))
            .map_err(StartupError::Thread)?;

        let mut scheduler = build_scheduler(&config, &telemetry, &retry, weather, traffic);

        if config.notifications.on_start {
            let message = startup_message(&config, source_kind);
            if let Err(e) = notifier.notify(&message) {
                tracing::warn!(error = %e, "Failed to send startup notification");
            }
        }

        tracing::info!(
            threshold_db = config.device.minimum_noise_level,
            window_secs = config.device.time_window_duration,
            "Noise monitoring started"
        );

        scheduler.run(shutdown);

        drop(stop_tx);
        if sampling_thread.join().is_err() {
            tracing::error!("Sampling thread panicked");
        }

        let lost_jobs = retry.len();
        if lost_jobs > 0 {
            tracing::warn!(lost_jobs, "Shutting down with undelivered writes");
        }
        tracing::info!("Noise monitoring stopped");
        Ok(ShutdownReport { lost_jobs })
    }
}

fn build_scheduler(
    config: &Config,
    telemetry: &Arc<dyn TelemetrySink>,
    retry: &Arc<RetryQueue>,
    weather: Option<Box<dyn EnrichmentProvider>>,
    traffic: Option<Box<dyn TrafficSource>>,
) -> Scheduler {
    let intervals = &config.scheduler;
    let mut scheduler = Scheduler::new(intervals.tick());

    scheduler.register(
        Box::new(RetryDrain::new(Arc::clone(retry), Arc::clone(telemetry))),
        intervals.retry_interval(),
    );

    if let Some(provider) = weather {
        scheduler.register_immediate(
            Box::new(WeatherRefresh::new(
                provider,
                Arc::clone(telemetry),
                Arc::clone(retry),
                config.influxdb.bucket.clone(),
                config.influxdb.location.clone(),
            )),
            intervals.weather_refresh(),
        );
    }

    if let Some(source) = traffic {
        scheduler.register_immediate(
            Box::new(TrafficCollector::new(
                source,
                Arc::clone(telemetry),
                Arc::clone(retry),
                config.influxdb.traffic_bucket.clone(),
            )),
            config.telraam.interval(),
        );
    }

    if config.camera.enabled {
        scheduler.register(
            Box::new(ImageRetention::new(
                config.camera.image_save_path.clone(),
                config.camera.retention(),
            )),
            intervals.image_retention(),
        );
    }

    scheduler
}

/// Names of the enabled output channels
pub fn enabled_sinks(config: &Config) -> Vec<&'static str> {
    [
        (config.influxdb.enabled, "InfluxDB"),
        (config.mqtt.enabled, "MQTT"),
        (config.discord.enabled, "Discord"),
        (config.pushover.enabled, "Pushover"),
        (config.camera.enabled, "Camera"),
        (config.telraam.enabled, "Telraam"),
    ]
    .into_iter()
    .filter_map(|(enabled, name)| enabled.then_some(name))
    .collect()
}

/// Text of the notification sent once at startup
pub fn startup_message(config: &Config, source: SourceKind) -> String {
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown host".to_string());
    let sinks = enabled_sinks(config);
    let sinks = if sinks.is_empty() {
        "none".to_string()
    } else {
        sinks.join(", ")
    };

    format!(
        "NoiseBuster {} started on {}\nMeter: {}\nThreshold: {} dB over {} s windows\nOutputs: {}\nTime: {}",
        crate::VERSION,
        host,
        source,
        config.device.minimum_noise_level,
        config.device.time_window_duration,
        sinks,
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
    )
}
