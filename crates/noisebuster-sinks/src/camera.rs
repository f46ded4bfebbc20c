//! HTTP snapshot camera

use noisebuster_core::config::CameraConfig;
use noisebuster_core::event::NoiseEvent;
use noisebuster_core::sink::{ImageCapturer, SinkError};
use reqwest::blocking::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;

const SINK: &str = "camera";

/// `<YYYY-MM-DD_HH-MM-SS>_<description>_<temp>C.jpg`
///
/// Unknown weather becomes `unknown`; characters that are unsafe in file
/// names are replaced with `_`.
pub fn snapshot_file_name(event: &NoiseEvent) -> String {
    let description: String = event
        .weather_description
        .as_deref()
        .unwrap_or("unknown")
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    let temperature = event
        .temperature
        .map(|t| format!("{:.1}", t))
        .unwrap_or_else(|| "NA".to_string());
    format!(
        "{}_{}_{}C.jpg",
        event.timestamp.format("%Y-%m-%d_%H-%M-%S"),
        description,
        temperature
    )
}

/// Fetches one JPEG frame per noisy window
pub struct SnapshotCamera {
    client: Client,
    snapshot_url: String,
    save_dir: PathBuf,
}

impl SnapshotCamera {
    pub fn new(config: &CameraConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: Client::builder()
                .timeout(Duration::from_millis(config.timeout_ms))
                .build()?,
            snapshot_url: config.snapshot_url.clone(),
            save_dir: config.image_save_path.clone(),
        })
    }

    pub fn save_dir(&self) -> &Path {
        &self.save_dir
    }

    fn fetch_frame(&self) -> Result<Vec<u8>, SinkError> {
        let delivery = |e: reqwest::Error| SinkError::Delivery {
            sink: SINK,
            reason: e.to_string(),
        };
        let response = self.client.get(&self.snapshot_url).send().map_err(delivery)?;
        let status = response.status();
        if !status.is_success() {
            return Err(SinkError::Rejected {
                sink: SINK,
                status: status.as_u16(),
                body: String::new(),
            });
        }
        Ok(response.bytes().map_err(delivery)?.to_vec())
    }
}

/// Write `frame` under `dir`, creating the directory when missing
pub fn save_frame(dir: &Path, file_name: &str, frame: &[u8]) -> std::io::Result<PathBuf> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
        tracing::info!(dir = %dir.display(), "Image directory created");
    }
    let path = dir.join(file_name);
    std::fs::write(&path, frame)?;
    Ok(path)
}

impl ImageCapturer for SnapshotCamera {
    fn capture(&self, event: &NoiseEvent) -> Result<(), SinkError> {
        let frame = self.fetch_frame()?;
        let path = save_frame(&self.save_dir, &snapshot_file_name(event), &frame).map_err(|e| {
            SinkError::Delivery {
                sink: SINK,
                reason: e.to_string(),
            }
        })?;
        tracing::info!(path = %path.display(), bytes = frame.len(), "Image saved");
        Ok(())
    }
}
