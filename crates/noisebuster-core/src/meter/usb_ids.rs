//! Known USB sound level meters
//!
//! The id table is a plain text file with one `VID,PID  # Model name` entry
//! per line, ids in hex. Model names are only used for log lines.

use crate::config::parse_hex_id;
use std::path::Path;

/// One known meter model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownDevice {
    pub vendor_id: u16,
    pub product_id: u16,
    pub model: String,
}

/// Table of known vendor/product pairs
#[derive(Debug, Clone, Default)]
pub struct UsbIdTable {
    devices: Vec<KnownDevice>,
}

impl UsbIdTable {
    /// Parse table contents, skipping blank, comment-only and malformed lines
    pub fn parse(contents: &str) -> Self {
        let mut devices = Vec::new();

        for line in contents.lines() {
            let (entry, comment) = match line.split_once('#') {
                Some((entry, comment)) => (entry.trim(), Some(comment.trim())),
                None => (line.trim(), None),
            };
            if entry.is_empty() {
                continue;
            }

            let mut parts = entry.split(',');
            let ids = match (parts.next(), parts.next()) {
                (Some(vendor), Some(product)) => parse_hex_id(vendor)
                    .and_then(|v| parse_hex_id(product).map(|p| (v, p))),
                _ => {
                    tracing::warn!(line = line.trim(), "Incorrect format in USB IDs file");
                    continue;
                }
            };

            match ids {
                Ok((vendor_id, product_id)) => devices.push(KnownDevice {
                    vendor_id,
                    product_id,
                    model: comment
                        .filter(|c| !c.is_empty())
                        .unwrap_or("Unknown model")
                        .to_string(),
                }),
                Err(e) => {
                    tracing::warn!(line = line.trim(), error = %e, "Incorrect format in USB IDs file");
                }
            }
        }

        Self { devices }
    }

    /// Load the table from disk; a missing file yields an empty table
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                let table = Self::parse(&contents);
                tracing::info!(path = %path.display(), known = table.len(), "Loaded USB id table");
                table
            }
            Err(_) => {
                tracing::warn!(
                    path = %path.display(),
                    "USB IDs file not found, automatic detection may fail for unknown devices"
                );
                Self::default()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn devices(&self) -> &[KnownDevice] {
        &self.devices
    }

    /// Look up a vendor/product pair
    pub fn find(&self, vendor_id: u16, product_id: u16) -> Option<&KnownDevice> {
        self.devices
            .iter()
            .find(|d| d.vendor_id == vendor_id && d.product_id == product_id)
    }
}
