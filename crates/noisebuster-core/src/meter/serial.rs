//! Serial-line sound level meters
//!
//! Meters without a supported USB protocol can be bridged with a small
//! microcontroller that measures the meter's PWM output and prints one
//! decimal dB value per line.

use super::{MeasurementSource, MeterError, SourceKind};
use serialport::SerialPort;
use std::io::{BufRead, BufReader};
use std::time::Duration;

/// Read timeout; bridges print roughly every 250ms
const READ_TIMEOUT: Duration = Duration::from_millis(1000);

/// Parse one line emitted by a serial bridge
pub fn parse_line(line: &str) -> Result<f64, MeterError> {
    let text = line.trim();
    let level: f64 = text
        .parse()
        .map_err(|_| MeterError::Transport(format!("unreadable serial line: {:?}", text)))?;
    if !level.is_finite() {
        return Err(MeterError::Transport(format!(
            "non-finite serial reading: {}",
            text
        )));
    }
    Ok(level)
}

/// Meter attached to a serial port
pub struct SerialMeter {
    path: String,
    baud_rate: u32,
    offset_db: f64,
    reader: Option<BufReader<Box<dyn SerialPort>>>,
    line: String,
}

impl SerialMeter {
    pub fn open(path: String, baud_rate: u32, offset_db: f64) -> Result<Self, MeterError> {
        let reader = Self::connect(&path, baud_rate)?;
        tracing::info!(port = %path, baud_rate, "Serial sound meter connected");
        Ok(Self {
            path,
            baud_rate,
            offset_db,
            reader: Some(reader),
            line: String::new(),
        })
    }

    fn connect(path: &str, baud_rate: u32) -> Result<BufReader<Box<dyn SerialPort>>, MeterError> {
        let port = serialport::new(path, baud_rate)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|e| MeterError::DeviceUnavailable(format!("{}: {}", path, e)))?;
        Ok(BufReader::new(port))
    }
}

impl MeasurementSource for SerialMeter {
    fn sample(&mut self) -> Result<f64, MeterError> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| MeterError::DeviceUnavailable("serial meter not connected".to_string()))?;

        self.line.clear();
        let read = reader
            .read_line(&mut self.line)
            .map_err(|e| MeterError::Transport(e.to_string()))?;
        if read == 0 {
            return Err(MeterError::Transport("serial port closed".to_string()));
        }

        Ok(parse_line(&self.line)? + self.offset_db)
    }

    fn reconnect(&mut self) -> Result<(), MeterError> {
        self.reader = None;
        self.reader = Some(Self::connect(&self.path, self.baud_rate)?);
        Ok(())
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Serial
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_parse_plain_value() {
        assert_relative_eq!(parse_line("72.60\r\n").unwrap(), 72.6);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(parse_line("ERR"), Err(MeterError::Transport(_))));
        assert!(parse_line("").is_err());
        assert!(parse_line("inf").is_err());
    }

    #[test]
    fn test_open_missing_port_is_unavailable() {
        let result = SerialMeter::open("/dev/noisebuster-missing".to_string(), 9600, 0.0);
        assert!(matches!(result, Err(MeterError::DeviceUnavailable(_))));
    }
}
