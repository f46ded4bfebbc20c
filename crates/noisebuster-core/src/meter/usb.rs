//! USB sound level meters
//!
//! Supported meters answer a vendor control-IN request with a two-byte
//! payload that [`decode_level`] turns into dB. Discovery accepts either the
//! vendor/product pair forced in the config or any pair from the known id
//! table.

use super::usb_ids::UsbIdTable;
use super::{decode_level, MeasurementSource, MeterError, SourceKind};
use crate::config::DeviceConfig;
use rusb::{DeviceHandle, GlobalContext};
use std::time::Duration;

/// bmRequestType: device-to-host, vendor, device recipient
const REQUEST_TYPE: u8 = 0xC0;

/// Vendor request returning the current level
const REQUEST_READ_LEVEL: u8 = 4;

/// wLength of the level request
const RESPONSE_BUFFER_LEN: usize = 200;

/// Outcome of matching one enumerated device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceMatch {
    /// Forced pair that also appears in the table
    Configured { model: String },
    /// Forced pair missing from the table
    UserDefined,
    /// Pair found in the known id table
    Known { model: String },
}

/// Decides which enumerated devices are sound meters
#[derive(Debug, Clone)]
pub struct DeviceSelector {
    forced: Option<(u16, u16)>,
    table: UsbIdTable,
}

impl DeviceSelector {
    pub fn new(forced: Option<(u16, u16)>, table: UsbIdTable) -> Self {
        Self { forced, table }
    }

    /// Build from config, loading the known id table from disk
    pub fn from_config(config: &DeviceConfig) -> Result<Self, MeterError> {
        let forced = config
            .usb_id_pair()
            .map_err(|e| MeterError::DeviceUnavailable(e.to_string()))?;
        Ok(Self::new(forced, UsbIdTable::load(&config.usb_ids_path)))
    }

    /// Classify a vendor/product pair; `None` means not a meter
    ///
    /// A forced pair disables the table entirely. Model names never gate
    /// acceptance.
    pub fn classify(&self, vendor_id: u16, product_id: u16) -> Option<DeviceMatch> {
        let model = self
            .table
            .find(vendor_id, product_id)
            .map(|d| d.model.clone());

        match self.forced {
            Some(pair) if pair == (vendor_id, product_id) => Some(match model {
                Some(model) => DeviceMatch::Configured { model },
                None => DeviceMatch::UserDefined,
            }),
            Some(_) => None,
            None => model.map(|model| DeviceMatch::Known { model }),
        }
    }

    fn not_found_message(&self) -> String {
        if self.forced.is_some() {
            "device not found, ensure USB is connected and the configured ids are correct"
                .to_string()
        } else {
            "device not found in known USB ids, set usb_vendor_id and usb_product_id to force one"
                .to_string()
        }
    }
}

/// Visible USB device, for listings
#[derive(Debug, Clone)]
pub struct UsbDeviceInfo {
    pub vendor_id: u16,
    pub product_id: u16,
    pub matched: Option<DeviceMatch>,
}

/// List every visible USB device and whether it would be accepted
pub fn list_devices(selector: &DeviceSelector) -> Result<Vec<UsbDeviceInfo>, MeterError> {
    let devices = rusb::devices().map_err(|e| MeterError::Transport(e.to_string()))?;
    Ok(devices
        .iter()
        .filter_map(|device| device.device_descriptor().ok())
        .map(|desc| UsbDeviceInfo {
            vendor_id: desc.vendor_id(),
            product_id: desc.product_id(),
            matched: selector.classify(desc.vendor_id(), desc.product_id()),
        })
        .collect())
}

/// Sound level meter read through USB control transfers
pub struct UsbMeter {
    selector: DeviceSelector,
    timeout: Duration,
    offset_db: f64,
    handle: Option<DeviceHandle<GlobalContext>>,
    identified: bool,
}

impl UsbMeter {
    /// Find and open a meter
    pub fn open(selector: DeviceSelector, timeout: Duration, offset_db: f64) -> Result<Self, MeterError> {
        let mut meter = Self {
            selector,
            timeout,
            offset_db,
            handle: None,
            identified: false,
        };
        meter.handle = Some(meter.find()?);
        Ok(meter)
    }

    fn find(&mut self) -> Result<DeviceHandle<GlobalContext>, MeterError> {
        let devices = rusb::devices().map_err(|e| MeterError::Transport(e.to_string()))?;

        let candidates = devices.iter().filter_map(|device| {
            let desc = device.device_descriptor().ok()?;
            let (vendor_id, product_id) = (desc.vendor_id(), desc.product_id());
            match self.selector.classify(vendor_id, product_id) {
                Some(matched) => Some((device, vendor_id, product_id, matched)),
                None => {
                    tracing::debug!(
                        "Ignoring non-sound meter device: vendor {:#06x}, product {:#06x}",
                        vendor_id,
                        product_id
                    );
                    None
                }
            }
        });

        let opened = open_first(candidates, |(device, _, _, _)| {
            device
                .open()
                .map_err(|e| MeterError::Transport(format!("failed to open meter: {}", e)))
        })?;

        let Some(((_, vendor_id, product_id, matched), handle)) = opened else {
            return Err(MeterError::DeviceUnavailable(self.selector.not_found_message()));
        };

        if !self.identified {
            match matched {
                DeviceMatch::Configured { model } => tracing::info!(
                    "Detected specified device: {} (vendor {:#06x}, product {:#06x})",
                    model,
                    vendor_id,
                    product_id
                ),
                DeviceMatch::UserDefined => tracing::info!(
                    "User defined USB sound device detected (vendor {:#06x}, product {:#06x}), \
                     consider reporting it so it can be added to the known list",
                    vendor_id,
                    product_id
                ),
                DeviceMatch::Known { model } => tracing::info!(
                    "{} sound meter detected: vendor {:#06x}, product {:#06x}",
                    model,
                    vendor_id,
                    product_id
                ),
            }
            self.identified = true;
        }

        Ok(handle)
    }
}

/// Open the first candidate that accepts, skipping ones that fail
///
/// `Ok(None)` means there were no candidates; when every candidate failed
/// the last error is returned.
fn open_first<C, H>(
    candidates: impl IntoIterator<Item = C>,
    mut open: impl FnMut(&C) -> Result<H, MeterError>,
) -> Result<Option<(C, H)>, MeterError> {
    let mut last_error = None;
    for candidate in candidates {
        match open(&candidate) {
            Ok(handle) => return Ok(Some((candidate, handle))),
            Err(e) => {
                tracing::warn!(error = %e, "Matching USB device could not be opened, trying next");
                last_error = Some(e);
            }
        }
    }
    match last_error {
        Some(e) => Err(e),
        None => Ok(None),
    }
}

impl MeasurementSource for UsbMeter {
    fn sample(&mut self) -> Result<f64, MeterError> {
        let handle = self
            .handle
            .as_ref()
            .ok_or_else(|| MeterError::DeviceUnavailable("USB meter not connected".to_string()))?;

        let mut buf = [0u8; RESPONSE_BUFFER_LEN];
        let read = handle
            .read_control(REQUEST_TYPE, REQUEST_READ_LEVEL, 0, 0, &mut buf, self.timeout)
            .map_err(|e| match e {
                rusb::Error::NoDevice => MeterError::DeviceUnavailable(e.to_string()),
                other => MeterError::Transport(other.to_string()),
            })?;

        if read < 2 {
            return Err(MeterError::Transport(format!(
                "short control response: {} byte(s)",
                read
            )));
        }

        Ok(decode_level(buf[0], buf[1]) + self.offset_db)
    }

    fn reconnect(&mut self) -> Result<(), MeterError> {
        self.handle = None;
        self.handle = Some(self.find()?);
        Ok(())
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Usb
    }
}
