//! MQTT publisher with Home Assistant discovery
//!
//! The rumqttc event loop runs on a background thread. Every (re)connect
//! republishes the retained discovery config and marks the sensor online;
//! the broker's last will flips it offline when the process goes away.

use noisebuster_core::config::MqttConfig;
use noisebuster_core::sink::{Publisher, SinkError};
use rumqttc::{Client, Connection, Event, LastWill, MqttOptions, Packet, QoS};
use serde_json::json;
use std::time::Duration;

const SINK: &str = "mqtt";

/// Pause between reconnect attempts after a connection error
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Topic holding the sensor's retained `online`/`offline` state
pub fn availability_topic(device_name: &str) -> String {
    format!("homeassistant/sensor/{}/availability", device_name)
}

pub fn discovery_topic(device_name: &str) -> String {
    format!("homeassistant/sensor/{}/noise_level/config", device_name)
}

/// Home Assistant discovery payload for the noise sensor
pub fn discovery_payload(device_name: &str) -> serde_json::Value {
    json!({
        "device_class": "sound_pressure",
        "name": format!("{} Noise Level", device_name),
        "state_topic": format!("homeassistant/sensor/{}/noise_levels/state", device_name),
        "unit_of_measurement": "dB",
        "value_template": "{{ value_json.noise_level }}",
        "unique_id": format!("{}_noise_level_sensor", device_name),
        "availability_topic": availability_topic(device_name),
        "device": {
            "identifiers": [format!("{}_sensor", device_name)],
            "name": format!("{} Noise Sensor", device_name),
            "model": "NoiseBuster",
            "manufacturer": "NoiseBuster",
        },
    })
}

/// Fire-and-forget MQTT publisher
pub struct MqttPublisher {
    client: Client,
}

impl MqttPublisher {
    /// Configure the client and start the event loop thread
    ///
    /// Connection happens in the background; publishes made before the
    /// broker answers are queued by the client.
    pub fn connect(config: &MqttConfig, device_name: &str) -> anyhow::Result<Self> {
        let client_id = format!("noisebuster-{}", device_name);
        let mut options = MqttOptions::new(client_id, config.server.clone(), config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs.max(5)));
        if let Some(user) = &config.user {
            options.set_credentials(user.clone(), config.password.clone().unwrap_or_default());
        }
        options.set_last_will(LastWill::new(
            availability_topic(device_name),
            "offline",
            QoS::AtLeastOnce,
            true,
        ));

        let (client, connection) = Client::new(options, 64);
        let loop_client = client.clone();
        let device_name = device_name.to_string();
        std::thread::Builder::new()
            .name("mqtt".into())
            .spawn(move || drive(connection, loop_client, device_name))?;

        tracing::info!(server = %config.server, port = config.port, "MQTT client started");
        Ok(Self { client })
    }
}

fn announce(client: &Client, device_name: &str) -> Result<(), rumqttc::ClientError> {
    client.try_publish(
        discovery_topic(device_name),
        QoS::AtLeastOnce,
        true,
        discovery_payload(device_name).to_string(),
    )?;
    client.try_publish(availability_topic(device_name), QoS::AtLeastOnce, true, "online")
}

fn drive(mut connection: Connection, client: Client, device_name: String) {
    for notification in connection.iter() {
        match notification {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                tracing::info!("Connected to MQTT broker");
                if let Err(e) = announce(&client, &device_name) {
                    tracing::warn!(error = %e, "Failed to publish sensor discovery");
                } else {
                    tracing::info!(topic = %discovery_topic(&device_name), "Sensor configuration published");
                }
            }
            Ok(_) => {}
            Err(rumqttc::ConnectionError::RequestsDone) => break,
            Err(e) => {
                tracing::warn!(error = %e, "MQTT connection error, retrying");
                std::thread::sleep(RECONNECT_DELAY);
            }
        }
    }
    tracing::debug!("MQTT event loop finished");
}

impl Publisher for MqttPublisher {
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), SinkError> {
        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload.to_vec())
            .map_err(|e| SinkError::Delivery {
                sink: SINK,
                reason: e.to_string(),
            })?;
        tracing::debug!(topic, bytes = payload.len(), "Published to MQTT");
        Ok(())
    }
}
