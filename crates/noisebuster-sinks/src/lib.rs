//! NoiseBuster Sinks - Network collaborators for the monitor
//!
//! Concrete implementations of the core sink and provider traits:
//! InfluxDB v2, MQTT with Home Assistant discovery, Discord and Pushover,
//! OpenWeatherMap, Telraam and an HTTP snapshot camera. [`build_collaborators`]
//! turns a [`Config`] into the set the monitor runs with; disabled sections
//! stay as no-op sinks.

pub mod camera;
pub mod influx;
pub mod mqtt;
pub mod notify;
pub mod telraam;
pub mod weather;

use anyhow::Context;
use noisebuster_core::config::Config;
use noisebuster_core::monitor::Collaborators;
use noisebuster_core::sink::NotifierGroup;
use std::sync::Arc;

pub use camera::SnapshotCamera;
pub use influx::InfluxWriter;
pub use mqtt::MqttPublisher;
pub use notify::{DiscordNotifier, PushoverNotifier};
pub use telraam::TelraamClient;
pub use weather::OpenWeatherProvider;

/// Build every enabled collaborator from `config`
pub fn build_collaborators(config: &Config) -> anyhow::Result<Collaborators> {
    let mut collaborators = Collaborators::default();

    if config.influxdb.enabled {
        let writer = InfluxWriter::new(&config.influxdb).context("Failed to set up InfluxDB")?;
        collaborators.telemetry = Arc::new(writer);
        tracing::info!(url = %config.influxdb.base_url(), "InfluxDB enabled");
    }

    if config.mqtt.enabled {
        let publisher = MqttPublisher::connect(&config.mqtt, &config.device.device_name)
            .context("Failed to set up MQTT")?;
        collaborators.publisher = Box::new(publisher);
    }

    if config.notifications_enabled() {
        let mut notifiers = NotifierGroup::new();
        if config.discord.enabled {
            notifiers.push(Box::new(
                DiscordNotifier::new(&config.discord).context("Failed to set up Discord")?,
            ));
        }
        if config.pushover.enabled {
            notifiers.push(Box::new(
                PushoverNotifier::new(&config.pushover).context("Failed to set up Pushover")?,
            ));
        }
        tracing::info!(notifiers = notifiers.len(), "Notifications enabled");
        collaborators.notifier = Arc::new(notifiers);
    }

    if config.weather.enabled {
        // Two providers so the sampling and scheduler threads never share one
        collaborators.enrichment = Box::new(
            OpenWeatherProvider::new(&config.weather).context("Failed to set up weather")?,
        );
        collaborators.weather = Some(Box::new(OpenWeatherProvider::new(&config.weather)?));
        tracing::info!(location = %config.weather.location, "Weather enrichment enabled");
    }

    if config.camera.enabled {
        collaborators.capturer = Box::new(
            SnapshotCamera::new(&config.camera).context("Failed to set up camera")?,
        );
    }

    if config.telraam.enabled {
        collaborators.traffic = Some(Box::new(
            TelraamClient::new(&config.telraam).context("Failed to set up Telraam")?,
        ));
    }

    Ok(collaborators)
}
