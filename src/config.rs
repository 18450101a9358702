//! Configuration using Figment
//!
//! Configuration is loaded from:
//! 1. Built-in defaults
//! 2. A TOML file (default `config/picova.toml`, optional)
//! 3. Environment variables prefixed with `PICOVA_`, nested keys separated by `__`
//!
//! # Example
//! ```no_run
//! use picova::config::PicovaConfig;
//!
//! let config = PicovaConfig::load()?;
//! config.validate()?;
//! println!("Window: {:?}", config.acquisition.time_window);
//! # Ok::<(), picova::error::PicovaError>(())
//! ```
//!
//! Environment override example: `PICOVA_SERIAL__PORT=/dev/ttyACM0`.

use crate::data::filter::FilterKind;
use crate::data::windowed_buffer::DEFAULT_TIME_WINDOW;
use crate::error::{AppResult, PicovaError};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/picova.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PicovaConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Serial transport settings
    pub serial: SerialSettings,
    /// Buffering, batching and filtering
    pub acquisition: AcquisitionSettings,
    /// CSV export settings
    pub export: ExportSettings,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
}

/// Serial port configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    /// Port to open (e.g., "/dev/ttyACM0", "COM3")
    pub port: Option<String>,
    /// Baud rate
    pub baud_rate: u32,
    /// Per-read timeout; reads that time out are retried
    #[serde(with = "humantime_serde")]
    pub read_timeout: Duration,
    /// Raise DTR/RTS after opening; the firmware only streams while DTR is set
    pub assert_dtr_rts: bool,
}

/// Acquisition pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionSettings {
    /// Trailing duration of device time kept in the buffer
    #[serde(with = "humantime_serde")]
    pub time_window: Duration,
    /// How often collected records are delivered to the buffer as one batch
    #[serde(with = "humantime_serde")]
    pub batch_interval: Duration,
    /// Filter applied to each channel
    pub filter: FilterKind,
    /// Fail the session when this many bytes arrive without a line delimiter
    pub max_pending_bytes: Option<usize>,
}

/// Export configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    /// Directory for exported CSV files
    pub output_dir: PathBuf,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "Picova".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: 115_200,
            read_timeout: Duration::from_millis(100),
            assert_dtr_rts: true,
        }
    }
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            time_window: DEFAULT_TIME_WINDOW,
            batch_interval: Duration::from_millis(100),
            filter: FilterKind::Identity,
            max_pending_bytes: None,
        }
    }
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("data"),
        }
    }
}

impl PicovaConfig {
    /// Load configuration from `config/picova.toml` and environment variables
    ///
    /// A missing file is not an error; defaults apply.
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        Ok(Self::figment(path.as_ref()).extract()?)
    }

    /// The provider stack used by [`load_from`](Self::load_from).
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(PicovaConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("PICOVA_").split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(PicovaError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.serial.baud_rate == 0 {
            return Err(PicovaError::Configuration(
                "baud_rate must be greater than zero".to_string(),
            ));
        }

        self.acquisition.validate()
    }
}

impl AcquisitionSettings {
    /// Reject settings the pipeline cannot run with.
    ///
    /// Called by [`PicovaConfig::validate`] and again when a pipeline starts,
    /// so settings built in code are checked too.
    pub fn validate(&self) -> AppResult<()> {
        if self.time_window.as_micros() == 0 {
            return Err(PicovaError::InvalidTimeWindow(self.time_window));
        }

        if self.batch_interval.is_zero() {
            return Err(PicovaError::Configuration(
                "batch_interval must be greater than zero".to_string(),
            ));
        }

        if self.max_pending_bytes == Some(0) {
            return Err(PicovaError::Configuration(
                "max_pending_bytes must be greater than zero".to_string(),
            ));
        }

        self.filter.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PicovaConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.acquisition.time_window, Duration::from_secs(5));
        assert_eq!(config.acquisition.batch_interval, Duration::from_millis(100));
    }

    #[test]
    fn test_load_from_toml_and_env() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "picova.toml",
                r#"
                [application]
                log_level = "debug"

                [serial]
                port = "/dev/ttyACM0"

                [acquisition]
                time_window = "10s"
                batch_interval = "50ms"
                filter = { median = 5 }
                "#,
            )?;
            jail.set_env("PICOVA_SERIAL__BAUD_RATE", "9600");

            let config = PicovaConfig::load_from("picova.toml").expect("config loads");
            assert_eq!(config.application.log_level, "debug");
            assert_eq!(config.serial.port.as_deref(), Some("/dev/ttyACM0"));
            assert_eq!(config.serial.baud_rate, 9600);
            assert_eq!(config.acquisition.time_window, Duration::from_secs(10));
            assert_eq!(config.acquisition.batch_interval, Duration::from_millis(50));
            assert_eq!(config.acquisition.filter, FilterKind::Median(5));
            assert_eq!(config.export.output_dir, PathBuf::from("data"));
            Ok(())
        });
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        figment::Jail::expect_with(|_jail| {
            let config = PicovaConfig::load_from("absent.toml").expect("defaults");
            assert_eq!(config, PicovaConfig::default());
            Ok(())
        });
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = PicovaConfig::default();
        config.application.log_level = "verbose".to_string();
        assert!(matches!(config.validate(), Err(PicovaError::Configuration(_))));
    }

    #[test]
    fn test_zero_window_rejected() {
        let mut config = PicovaConfig::default();
        config.acquisition.time_window = Duration::ZERO;
        assert!(matches!(
            config.validate(),
            Err(PicovaError::InvalidTimeWindow(_))
        ));
    }

    #[test]
    fn test_zero_batch_interval_and_median_rejected() {
        let mut config = PicovaConfig::default();
        config.acquisition.batch_interval = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = PicovaConfig::default();
        config.acquisition.filter = FilterKind::Median(0);
        assert!(matches!(
            config.validate(),
            Err(PicovaError::InvalidMedianWindow)
        ));
    }
}
