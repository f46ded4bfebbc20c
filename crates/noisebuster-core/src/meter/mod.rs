//! Sound level meter access
//!
//! This module contains everything needed to obtain decibel readings:
//! - The [`MeasurementSource`] capability shared by all meter transports
//! - Known USB id table parsing ([`usb_ids`])
//! - USB meters read through vendor control transfers ([`usb`])
//! - Serial-line meters emitting one reading per line ([`serial`])
//!
//! [`open_source`] picks the configured transport at startup and optionally
//! falls back to the other one.

pub mod serial;
pub mod usb;
pub mod usb_ids;

use crate::config::DeviceConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors raised while reading a meter
#[derive(Error, Debug)]
pub enum MeterError {
    #[error("Measuring device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

/// Meter transport
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    Usb,
    Serial,
}

impl SourceKind {
    /// The transport tried when this one is unavailable
    pub fn other(self) -> Self {
        match self {
            SourceKind::Usb => SourceKind::Serial,
            SourceKind::Serial => SourceKind::Usb,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Usb => write!(f, "USB"),
            SourceKind::Serial => write!(f, "serial"),
        }
    }
}

/// A physical meter producing instantaneous levels in dB
pub trait MeasurementSource: Send {
    /// Read one instantaneous level in dB, calibration offset included
    fn sample(&mut self) -> Result<f64, MeterError>;

    /// Drop the current handle and look for the device again
    fn reconnect(&mut self) -> Result<(), MeterError>;

    fn kind(&self) -> SourceKind;
}

/// Convert a raw two-byte meter payload to dB
///
/// The low byte holds the lower 8 bits and the two lowest bits of the high
/// byte extend it to a 10-bit count of 0.1 dB steps above 30 dB.
///
/// # Example
/// ```
/// use noisebuster_core::meter::decode_level;
///
/// assert!((decode_level(0, 0) - 30.0).abs() < 1e-9);
/// assert!((decode_level(0x2c, 0x01) - 60.0).abs() < 1e-9);
/// ```
pub fn decode_level(low: u8, high: u8) -> f64 {
    let raw = low as u32 + (high as u32 & 0x03) * 256;
    raw as f64 * 0.1 + 30.0
}

/// Open the configured meter, falling back to the other transport if allowed
///
/// Returns [`MeterError::DeviceUnavailable`] listing every attempt when no
/// meter could be opened.
pub fn open_source(config: &DeviceConfig) -> Result<Box<dyn MeasurementSource>, MeterError> {
    let mut kinds = vec![config.source];
    if config.fallback {
        kinds.push(config.source.other());
    }

    let mut failures = Vec::new();
    for kind in kinds {
        match open_kind(kind, config) {
            Ok(source) => {
                if kind != config.source {
                    tracing::warn!(
                        preferred = %config.source,
                        using = %kind,
                        "Preferred meter unavailable, using fallback"
                    );
                }
                return Ok(source);
            }
            Err(e) => {
                tracing::warn!(transport = %kind, error = %e, "Meter not available");
                failures.push(format!("{}: {}", kind, e));
            }
        }
    }

    Err(MeterError::DeviceUnavailable(failures.join("; ")))
}

fn open_kind(kind: SourceKind, config: &DeviceConfig) -> Result<Box<dyn MeasurementSource>, MeterError> {
    match kind {
        SourceKind::Usb => {
            let selector = usb::DeviceSelector::from_config(config)?;
            let meter = usb::UsbMeter::open(selector, config.usb_timeout(), config.calibration_offset_db)?;
            Ok(Box::new(meter))
        }
        SourceKind::Serial => {
            let path = config.serial_port.clone().ok_or_else(|| {
                MeterError::DeviceUnavailable("no serial_port configured".to_string())
            })?;
            let meter = serial::SerialMeter::open(
                path,
                config.serial_baud_rate,
                config.calibration_offset_db,
            )?;
            Ok(Box::new(meter))
        }
    }
}
