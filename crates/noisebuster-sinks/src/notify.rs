//! Chat and push notifiers

use noisebuster_core::config::{DiscordConfig, PushoverConfig};
use noisebuster_core::sink::{Notifier, SinkError};
use reqwest::blocking::{Client, Response};
use serde_json::json;
use std::time::Duration;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

fn http_client() -> anyhow::Result<Client> {
    Ok(Client::builder().timeout(HTTP_TIMEOUT).build()?)
}

fn check(sink: &'static str, result: reqwest::Result<Response>) -> Result<(), SinkError> {
    let response = result.map_err(|e| SinkError::Delivery {
        sink,
        reason: e.to_string(),
    })?;
    let status = response.status();
    if !status.is_success() {
        return Err(SinkError::Rejected {
            sink,
            status: status.as_u16(),
            body: response.text().unwrap_or_default(),
        });
    }
    tracing::info!(sink, "Notification sent");
    Ok(())
}

/// Discord webhook
pub struct DiscordNotifier {
    client: Client,
    webhook_url: String,
}

impl DiscordNotifier {
    pub fn new(config: &DiscordConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: http_client()?,
            webhook_url: config.webhook_url.clone(),
        })
    }
}

impl Notifier for DiscordNotifier {
    fn notify(&self, message: &str) -> Result<(), SinkError> {
        check(
            "discord",
            self.client
                .post(&self.webhook_url)
                .json(&json!({ "content": message }))
                .send(),
        )
    }
}

/// Pushover message API
pub struct PushoverNotifier {
    client: Client,
    api_url: String,
    token: String,
    user: String,
    title: String,
}

impl PushoverNotifier {
    pub fn new(config: &PushoverConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: http_client()?,
            api_url: config.api_url.clone(),
            token: config.api_token.clone(),
            user: config.user_key.clone(),
            title: config.title.clone(),
        })
    }

    fn form<'a>(&'a self, message: &'a str) -> [(&'static str, &'a str); 4] {
        [
            ("token", self.token.as_str()),
            ("user", self.user.as_str()),
            ("message", message),
            ("title", self.title.as_str()),
        ]
    }
}

impl Notifier for PushoverNotifier {
    fn notify(&self, message: &str) -> Result<(), SinkError> {
        check(
            "pushover",
            self.client.post(&self.api_url).form(&self.form(message)).send(),
        )
    }
}
