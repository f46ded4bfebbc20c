//! Application configuration
//!
//! Loaded once from a JSON file and treated as read-only afterwards. Every
//! field has a default so a partial file is enough to get started; sections
//! follow the layout of the historical `config.json`.

use crate::meter::SourceKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, alias = "DEVICE_AND_NOISE_MONITORING_CONFIG")]
    pub device: DeviceConfig,
    #[serde(default, alias = "INFLUXDB_CONFIG")]
    pub influxdb: InfluxConfig,
    #[serde(default, alias = "MQTT_CONFIG")]
    pub mqtt: MqttConfig,
    #[serde(default, alias = "DISCORD_CONFIG")]
    pub discord: DiscordConfig,
    #[serde(default, alias = "PUSHOVER_CONFIG")]
    pub pushover: PushoverConfig,
    #[serde(default, alias = "WEATHER_CONFIG")]
    pub weather: WeatherConfig,
    #[serde(default, alias = "CAMERA_CONFIG")]
    pub camera: CameraConfig,
    #[serde(default, alias = "TELRAAM_API_CONFIG")]
    pub telraam: TelraamConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_device_name() -> String {
    "noise_buster".to_string()
}

fn default_minimum_noise_level() -> f64 {
    80.0
}

fn default_window_secs() -> f64 {
    10.0
}

fn default_poll_interval_ms() -> u64 {
    crate::DEFAULT_POLL_INTERVAL_MS
}

fn default_usb_ids_path() -> PathBuf {
    PathBuf::from("usb_ids")
}

fn default_usb_timeout_ms() -> u64 {
    1000
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_true() -> bool {
    true
}

/// Meter selection and noise classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Name used for MQTT topics and notifications
    #[serde(default = "default_device_name")]
    pub device_name: String,
    /// Threshold in dB at which a window becomes a reportable event
    #[serde(default = "default_minimum_noise_level")]
    pub minimum_noise_level: f64,
    /// Window length in seconds
    #[serde(default = "default_window_secs")]
    pub time_window_duration: f64,
    /// Meter poll interval in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Preferred meter transport
    #[serde(default)]
    pub source: SourceKind,
    /// Try the other transport when the preferred one is unavailable
    #[serde(default = "default_true")]
    pub fallback: bool,
    /// Forced USB vendor id, hex (empty = use the known id table)
    #[serde(default)]
    pub usb_vendor_id: String,
    /// Forced USB product id, hex (empty = use the known id table)
    #[serde(default)]
    pub usb_product_id: String,
    /// Path of the known USB id table
    #[serde(default = "default_usb_ids_path")]
    pub usb_ids_path: PathBuf,
    /// USB control transfer timeout in milliseconds
    #[serde(default = "default_usb_timeout_ms")]
    pub usb_timeout_ms: u64,
    /// Serial port path for serial-line meters
    #[serde(default)]
    pub serial_port: Option<String>,
    /// Serial baud rate
    #[serde(default = "default_baud_rate")]
    pub serial_baud_rate: u32,
    /// Constant added to every reading (distance/calibration correction)
    #[serde(default)]
    pub calibration_offset_db: f64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device_name: default_device_name(),
            minimum_noise_level: default_minimum_noise_level(),
            time_window_duration: default_window_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            source: SourceKind::default(),
            fallback: true,
            usb_vendor_id: String::new(),
            usb_product_id: String::new(),
            usb_ids_path: default_usb_ids_path(),
            usb_timeout_ms: default_usb_timeout_ms(),
            serial_port: None,
            serial_baud_rate: default_baud_rate(),
            calibration_offset_db: 0.0,
        }
    }
}

impl DeviceConfig {
    pub fn window_duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.time_window_duration.max(0.0)).unwrap_or(Duration::MAX)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn usb_timeout(&self) -> Duration {
        Duration::from_millis(self.usb_timeout_ms)
    }

    /// Forced vendor/product pair, if both ids are set
    pub fn usb_id_pair(&self) -> Result<Option<(u16, u16)>, ConfigError> {
        let vendor = self.usb_vendor_id.trim();
        let product = self.usb_product_id.trim();
        if vendor.is_empty() || product.is_empty() {
            return Ok(None);
        }
        Ok(Some((parse_hex_id(vendor)?, parse_hex_id(product)?)))
    }
}

/// Parse a USB id such as `16c0` or `0x16C0`
pub fn parse_hex_id(text: &str) -> Result<u16, ConfigError> {
    let digits = text
        .trim()
        .trim_start_matches("0x")
        .trim_start_matches("0X");
    u16::from_str_radix(digits, 16)
        .map_err(|_| ConfigError::Invalid(format!("'{}' is not a hex USB id", text)))
}

fn default_influx_host() -> String {
    "localhost".to_string()
}

fn default_influx_port() -> u16 {
    8086
}

fn default_bucket() -> String {
    "noise_buster".to_string()
}

fn default_realtime_bucket() -> String {
    "noise_buster_realtime".to_string()
}

fn default_traffic_bucket() -> String {
    "telraam".to_string()
}

fn default_influx_timeout_ms() -> u64 {
    20000
}

fn default_measurement() -> String {
    "noise_buster_events".to_string()
}

fn default_location() -> String {
    "noise_buster".to_string()
}

/// InfluxDB v2 time-series store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfluxConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_influx_host")]
    pub host: String,
    #[serde(default = "default_influx_port")]
    pub port: u16,
    #[serde(default)]
    pub ssl: bool,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub org: String,
    /// Bucket for threshold-exceeding events and weather points
    #[serde(default = "default_bucket")]
    pub bucket: String,
    /// Bucket for every window's peak
    #[serde(default = "default_realtime_bucket")]
    pub realtime_bucket: String,
    /// Bucket for traffic counts
    #[serde(default = "default_traffic_bucket")]
    pub traffic_bucket: String,
    /// Request timeout in milliseconds
    #[serde(default = "default_influx_timeout_ms")]
    pub timeout: u64,
    #[serde(default = "default_measurement")]
    pub measurement: String,
    #[serde(default = "default_location")]
    pub location: String,
}

impl Default for InfluxConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_influx_host(),
            port: default_influx_port(),
            ssl: false,
            token: String::new(),
            org: String::new(),
            bucket: default_bucket(),
            realtime_bucket: default_realtime_bucket(),
            traffic_bucket: default_traffic_bucket(),
            timeout: default_influx_timeout_ms(),
            measurement: default_measurement(),
            location: default_location(),
        }
    }
}

impl InfluxConfig {
    pub fn base_url(&self) -> String {
        let scheme = if self.ssl { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_keep_alive() -> u64 {
    60
}

/// MQTT broker (Home Assistant)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_influx_host")]
    pub server: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            server: default_influx_host(),
            port: default_mqtt_port(),
            user: None,
            password: None,
            keep_alive_secs: default_keep_alive(),
        }
    }
}

/// Discord webhook notifications
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscordConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub webhook_url: String,
}

fn default_pushover_title() -> String {
    "Noise Buster".to_string()
}

fn default_pushover_url() -> String {
    "https://api.pushover.net/1/messages.json".to_string()
}

/// Pushover notifications
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushoverConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub user_key: String,
    #[serde(default)]
    pub api_token: String,
    #[serde(default = "default_pushover_title")]
    pub title: String,
    #[serde(default = "default_pushover_url")]
    pub api_url: String,
}

impl Default for PushoverConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            user_key: String::new(),
            api_token: String::new(),
            title: default_pushover_title(),
            api_url: default_pushover_url(),
        }
    }
}

fn default_weather_url() -> String {
    "https://api.openweathermap.org/data/2.5/weather".to_string()
}

fn default_weather_cache() -> u64 {
    60
}

/// OpenWeatherMap enrichment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_weather_url")]
    pub api_url: String,
    /// City query, e.g. `Brussels,BE`
    #[serde(default)]
    pub location: String,
    /// Reuse a reading for this many seconds before asking the API again
    #[serde(default = "default_weather_cache")]
    pub cache_seconds: u64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            api_url: default_weather_url(),
            location: String::new(),
            cache_seconds: default_weather_cache(),
        }
    }
}

fn default_image_path() -> PathBuf {
    PathBuf::from("images")
}

fn default_retention_hours() -> u64 {
    24
}

fn default_camera_timeout_ms() -> u64 {
    5000
}

/// Snapshot camera
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    #[serde(default, alias = "use_ip_camera")]
    pub enabled: bool,
    /// URL returning a single JPEG frame
    #[serde(default, alias = "ip_camera_url")]
    pub snapshot_url: String,
    #[serde(default = "default_image_path")]
    pub image_save_path: PathBuf,
    #[serde(default = "default_retention_hours")]
    pub image_retention_hours: u64,
    #[serde(default = "default_camera_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            snapshot_url: String::new(),
            image_save_path: default_image_path(),
            image_retention_hours: default_retention_hours(),
            timeout_ms: default_camera_timeout_ms(),
        }
    }
}

impl CameraConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.image_retention_hours.saturating_mul(3600))
    }
}

fn default_telraam_url() -> String {
    "https://telraam-api.net/v1/reports/traffic".to_string()
}

fn default_telraam_interval() -> u64 {
    60
}

/// Telraam traffic counts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelraamConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub segment_id: String,
    #[serde(default = "default_telraam_url")]
    pub api_url: String,
    #[serde(default = "default_telraam_interval")]
    pub request_interval_minutes: u64,
}

impl Default for TelraamConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            segment_id: String::new(),
            api_url: default_telraam_url(),
            request_interval_minutes: default_telraam_interval(),
        }
    }
}

impl TelraamConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.request_interval_minutes.max(1) * 60)
    }
}

/// What gets pushed to the notifiers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Send a summary when monitoring starts
    #[serde(default = "default_true")]
    pub on_start: bool,
    /// Send a line for every threshold-exceeding window
    #[serde(default)]
    pub on_event: bool,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            on_start: true,
            on_event: false,
        }
    }
}

fn default_tick_ms() -> u64 {
    crate::DEFAULT_TICK_MS
}

fn default_retry_secs() -> u64 {
    60
}

fn default_weather_refresh_secs() -> u64 {
    300
}

fn default_retention_sweep_secs() -> u64 {
    3600
}

fn default_backlog_warn() -> usize {
    1000
}

/// Cadences of the periodic tasks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    #[serde(default = "default_retry_secs")]
    pub retry_interval_secs: u64,
    #[serde(default = "default_weather_refresh_secs")]
    pub weather_refresh_secs: u64,
    #[serde(default = "default_retention_sweep_secs")]
    pub image_retention_secs: u64,
    /// Retry backlog size that triggers a warning on every enqueue
    #[serde(default = "default_backlog_warn")]
    pub retry_backlog_warn: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            retry_interval_secs: default_retry_secs(),
            weather_refresh_secs: default_weather_refresh_secs(),
            image_retention_secs: default_retention_sweep_secs(),
            retry_backlog_warn: default_backlog_warn(),
        }
    }
}

impl SchedulerConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }

    pub fn weather_refresh(&self) -> Duration {
        Duration::from_secs(self.weather_refresh_secs)
    }

    pub fn image_retention(&self) -> Duration {
        Duration::from_secs(self.image_retention_secs)
    }
}

/// Log output
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directory for a daily rolling log file (None = stderr only)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl Config {
    /// Default config location: `./config.json` when present, otherwise
    /// `<data_dir>/noisebuster/config.json`
    pub fn default_path() -> PathBuf {
        let local = PathBuf::from("config.json");
        if local.exists() {
            return local;
        }
        dirs::data_dir()
            .map(|dir| dir.join("noisebuster").join("config.json"))
            .unwrap_or(local)
    }

    /// Load and validate a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&contents)?;
        tracing::info!(path = %path.display(), "Loaded config from disk");
        Ok(config)
    }

    /// Parse and validate config from a JSON string
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let device = &self.device;
        if device.time_window_duration.is_nan() || device.time_window_duration <= 0.0 {
            return Err(ConfigError::Invalid(
                "device.time_window_duration must be positive".into(),
            ));
        }
        if Duration::try_from_secs_f64(device.time_window_duration).is_err() {
            return Err(ConfigError::Invalid(format!(
                "device.time_window_duration {} is out of range",
                device.time_window_duration
            )));
        }
        if device.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "device.poll_interval_ms must be positive".into(),
            ));
        }
        if self.scheduler.tick_ms == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.tick_ms must be positive".into(),
            ));
        }
        device.usb_id_pair()?;

        let required = [
            (self.influxdb.enabled, self.influxdb.host.as_str(), "influxdb.host"),
            (self.mqtt.enabled, self.mqtt.server.as_str(), "mqtt.server"),
            (
                self.discord.enabled,
                self.discord.webhook_url.as_str(),
                "discord.webhook_url",
            ),
            (
                self.pushover.enabled,
                self.pushover.api_token.as_str(),
                "pushover.api_token",
            ),
            (
                self.weather.enabled,
                self.weather.api_key.as_str(),
                "weather.api_key",
            ),
            (
                self.camera.enabled,
                self.camera.snapshot_url.as_str(),
                "camera.snapshot_url",
            ),
            (
                self.telraam.enabled,
                self.telraam.segment_id.as_str(),
                "telraam.segment_id",
            ),
        ];
        for (enabled, value, key) in required {
            if enabled && value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "{} is required when the section is enabled",
                    key
                )));
            }
        }

        Ok(())
    }

    /// Whether any outbound notifier is configured
    pub fn notifications_enabled(&self) -> bool {
        self.discord.enabled || self.pushover.enabled
    }
}
