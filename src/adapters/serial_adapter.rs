//! Serial transport for the USB meter.
//!
//! The meter enumerates as a USB CDC serial device. It only streams while the
//! host asserts DTR, so [`SerialAdapter::open`] raises DTR and RTS after the
//! port is opened. The returned port is handed to the ingest reader as a
//! plain `std::io::Read`.

use crate::config::SerialSettings;
use crate::error::{AppResult, PicovaError};
use std::io::Read;
use std::time::Duration;

#[cfg(feature = "instrument_serial")]
use tracing::{debug, info};

/// Serial adapter for the meter.
#[derive(Debug, Clone)]
pub struct SerialAdapter {
    /// Port name (e.g., "/dev/ttyACM0", "COM3")
    port_name: String,

    /// Baud rate. USB CDC ignores it, but the OS driver still wants one.
    baud_rate: u32,

    /// Per-read timeout; the reader retries on timeout.
    timeout: Duration,

    /// Assert DTR/RTS after opening
    assert_dtr_rts: bool,
}

impl SerialAdapter {
    /// Create a new serial adapter with default settings
    ///
    /// # Arguments
    /// * `port_name` - Serial port path (e.g., "/dev/ttyACM0", "COM3")
    /// * `baud_rate` - Communication speed (e.g., 115200)
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            timeout: Duration::from_millis(100),
            assert_dtr_rts: true,
        }
    }

    /// Build an adapter from the `[serial]` configuration section.
    ///
    /// # Errors
    ///
    /// `Configuration` if no port is configured.
    pub fn from_settings(settings: &SerialSettings) -> AppResult<Self> {
        let port = settings.port.clone().ok_or_else(|| {
            PicovaError::Configuration("no serial port configured".to_string())
        })?;
        Ok(Self::new(port, settings.baud_rate)
            .with_timeout(settings.read_timeout)
            .with_dtr_rts(settings.assert_dtr_rts))
    }

    /// Set read timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enable or disable asserting DTR/RTS on open
    pub fn with_dtr_rts(mut self, enabled: bool) -> Self {
        self.assert_dtr_rts = enabled;
        self
    }

    /// Port this adapter opens.
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Open the port and return it as a byte source.
    #[cfg(feature = "instrument_serial")]
    pub fn open(&self) -> AppResult<Box<dyn Read + Send>> {
        let mut port = serialport::new(&self.port_name, self.baud_rate)
            .timeout(self.timeout)
            .open()?;

        if self.assert_dtr_rts {
            port.write_data_terminal_ready(true)?;
            port.write_request_to_send(true)?;
            debug!(port = %self.port_name, "Asserted DTR/RTS");
        }

        info!(port = %self.port_name, baud = self.baud_rate, "Serial port opened");
        Ok(Box::new(port))
    }

    #[cfg(not(feature = "instrument_serial"))]
    pub fn open(&self) -> AppResult<Box<dyn Read + Send>> {
        Err(PicovaError::SerialFeatureDisabled)
    }
}

/// Names of the serial ports currently present on the system.
#[cfg(feature = "instrument_serial")]
pub fn list_ports() -> AppResult<Vec<String>> {
    let ports = serialport::available_ports()?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}

#[cfg(not(feature = "instrument_serial"))]
pub fn list_ports() -> AppResult<Vec<String>> {
    Err(PicovaError::SerialFeatureDisabled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_adapter_creation() {
        let adapter = SerialAdapter::new("/dev/ttyACM0", 115200)
            .with_timeout(Duration::from_millis(250))
            .with_dtr_rts(false);
        assert_eq!(adapter.port_name(), "/dev/ttyACM0");
        assert_eq!(adapter.timeout, Duration::from_millis(250));
        assert!(!adapter.assert_dtr_rts);
    }

    #[test]
    fn test_from_settings_requires_port() {
        let settings = SerialSettings::default();
        assert!(matches!(
            SerialAdapter::from_settings(&settings),
            Err(PicovaError::Configuration(_))
        ));

        let settings = SerialSettings {
            port: Some("COM3".into()),
            ..SerialSettings::default()
        };
        let adapter = SerialAdapter::from_settings(&settings).unwrap();
        assert_eq!(adapter.port_name(), "COM3");
        assert_eq!(adapter.baud_rate, 115200);
    }

    #[cfg(feature = "instrument_serial")]
    #[test]
    fn test_open_missing_port_fails() {
        let adapter = SerialAdapter::new("/dev/picova-does-not-exist", 115200);
        assert!(matches!(adapter.open(), Err(PicovaError::Serial(_))));
    }
}
