//! Custom error types for the crate.
//!
//! `PicovaError` is the primary error type. It is built with `thiserror` and
//! covers everything that can fail at a boundary of the acquisition core:
//! configuration loading and validation, the byte transport, the frame
//! decoder guard, CSV export, and the buffer actor going away.
//!
//! ## Error Hierarchy
//!
//! - **`Config`**: Wraps errors from `figment`, typically a malformed TOML file or an
//!   environment override with the wrong type.
//! - **`Configuration`**: Semantic errors in an otherwise well-formed configuration
//!   (unknown log level, zero batch interval, ...). Caught by `PicovaConfig::validate`.
//! - **`InvalidTimeWindow`** / **`InvalidMedianWindow`**: Runtime configuration changes
//!   rejected before they reach the buffer.
//! - **`Io`** / **`Serial`**: Transport failures. These end the current producer but
//!   never corrupt already-buffered data.
//! - **`FrameOverflow`**: The decoder's pending-byte guard tripped.
//!
//! Malformed wire lines are *not* represented here. They produce a [`RecordError`],
//! which the ingest loop logs and drops.

use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type AppResult<T> = std::result::Result<T, PicovaError>;

/// Errors raised at the crate's boundaries.
#[derive(Error, Debug)]
pub enum PicovaError {
    /// The figment provider stack failed to extract.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// A loaded or built setting has an unusable value.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Zero or sub-microsecond retention window.
    #[error("Time window must be greater than zero (got {0:?})")]
    InvalidTimeWindow(Duration),

    /// Median filter of size zero.
    #[error("Median filter window must hold at least one sample")]
    InvalidMedianWindow,

    /// Transport or file I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Opening or configuring a serial port failed.
    #[cfg(feature = "instrument_serial")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Built without the `instrument_serial` feature.
    #[error("Serial support not enabled. Rebuild with --features instrument_serial")]
    SerialFeatureDisabled,

    /// The frame decoder's pending-byte guard tripped.
    #[error("No line delimiter within {limit} buffered bytes")]
    FrameOverflow {
        /// Configured pending-byte guard.
        limit: usize,
    },

    /// Writing CSV failed.
    #[cfg(feature = "storage_csv")]
    #[error("CSV export error: {0}")]
    Csv(#[from] csv::Error),

    /// `connect` while a source is still streaming.
    #[error("Session is already connected")]
    AlreadyConnected,

    /// The buffer actor has shut down.
    #[error("Buffer actor is no longer running")]
    BufferClosed,

    /// The reader thread could not be joined.
    #[error("Reader thread terminated abnormally: {0}")]
    ReaderPanicked(String),
}

impl From<figment::Error> for PicovaError {
    fn from(err: figment::Error) -> Self {
        PicovaError::Config(Box::new(err))
    }
}

/// Reason a decoded line was rejected by the record parser.
///
/// Rejection is never fatal: the ingest loop logs the reason and keeps reading.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("expected 4 comma-separated fields, found {0}")]
    FieldCount(usize),

    #[error("invalid timestamp field '{0}'")]
    Timestamp(String),

    #[error("invalid {field} field '{raw}'")]
    Value { field: &'static str, raw: String },
}
