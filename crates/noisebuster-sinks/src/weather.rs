//! OpenWeatherMap current conditions

use noisebuster_core::config::WeatherConfig;
use noisebuster_core::enrichment::{Conditions, EnrichmentError, EnrichmentProvider};
use reqwest::blocking::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct CurrentWeather {
    main: Main,
    #[serde(default)]
    weather: Vec<Description>,
    #[serde(default)]
    rain: Option<Volume>,
    #[serde(default)]
    snow: Option<Volume>,
}

#[derive(Debug, Deserialize)]
struct Main {
    temp: f64,
}

#[derive(Debug, Deserialize)]
struct Description {
    description: String,
}

#[derive(Debug, Deserialize)]
struct Volume {
    #[serde(rename = "1h", default)]
    one_hour: f64,
}

/// Parse an OpenWeatherMap `/weather` response body
///
/// Precipitation is rain plus snow over the last hour.
pub fn parse_conditions(body: &str) -> Result<Conditions, EnrichmentError> {
    let current: CurrentWeather =
        serde_json::from_str(body).map_err(|e| EnrichmentError::Malformed(e.to_string()))?;

    let precipitation: f64 = [current.rain, current.snow]
        .iter()
        .flatten()
        .map(|v| v.one_hour)
        .sum();

    Ok(Conditions {
        temperature: Some(current.main.temp),
        description: current.weather.into_iter().next().map(|w| w.description),
        precipitation,
    })
}

/// Conditions from OpenWeatherMap, cached for `cache_seconds`
pub struct OpenWeatherProvider {
    client: Client,
    api_url: String,
    api_key: String,
    location: String,
    ttl: Duration,
    cached: Option<(Instant, Conditions)>,
}

impl OpenWeatherProvider {
    pub fn new(config: &WeatherConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(HTTP_TIMEOUT).build()?,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            location: config.location.clone(),
            ttl: Duration::from_secs(config.cache_seconds),
            cached: None,
        })
    }

    fn cached_at(&self, now: Instant) -> Option<Conditions> {
        match &self.cached {
            Some((at, conditions)) if now.saturating_duration_since(*at) < self.ttl => {
                Some(conditions.clone())
            }
            _ => None,
        }
    }

    fn request(&self) -> Result<Conditions, EnrichmentError> {
        let response = self
            .client
            .get(&self.api_url)
            .query(&[
                ("q", self.location.as_str()),
                ("appid", self.api_key.as_str()),
                ("units", "metric"),
            ])
            .send()
            .map_err(|e| EnrichmentError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EnrichmentError::Unavailable(format!(
                "OpenWeatherMap returned status {}",
                status
            )));
        }
        let body = response
            .text()
            .map_err(|e| EnrichmentError::Unavailable(e.to_string()))?;
        parse_conditions(&body)
    }
}

impl EnrichmentProvider for OpenWeatherProvider {
    fn fetch(&mut self) -> Result<Conditions, EnrichmentError> {
        let now = Instant::now();
        if let Some(conditions) = self.cached_at(now) {
            return Ok(conditions);
        }

        let conditions = self.request()?;
        tracing::debug!(
            temperature = ?conditions.temperature,
            description = ?conditions.description,
            precipitation = conditions.precipitation,
            "Fetched weather"
        );
        self.cached = Some((now, conditions.clone()));
        Ok(conditions)
    }
}
