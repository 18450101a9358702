//! Measurement data model for the meter.
//!
//! A [`Measurement`] is one sample as reported by the device: a microsecond
//! timestamp from the device clock plus bus voltage, current and power.
//! Values are passed through unchanged; no unit conversion happens here.
//!
//! Lines on the wire are turned into measurements by [`record::parse_record`].

pub mod record;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use record::parse_record;

/// One sample from the meter.
///
/// Equality is plain value equality. Arrival order is the only ordering the
/// rest of the crate relies on; timestamps are expected, but not guaranteed,
/// to be non-decreasing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Device-local timestamp in microseconds.
    pub timestamp: u64,
    /// Bus voltage in volts.
    pub voltage: f32,
    /// Current in milliamps.
    pub current: f32,
    /// Power in milliwatts.
    pub power: f32,
}

impl Measurement {
    /// Record from its four wire fields.
    pub fn new(timestamp: u64, voltage: f32, current: f32, power: f32) -> Self {
        Self {
            timestamp,
            voltage,
            current,
            power,
        }
    }

    /// Raw value for one channel.
    pub fn value(&self, channel: Channel) -> f32 {
        match channel {
            Channel::Voltage => self.voltage,
            Channel::Current => self.current,
            Channel::Power => self.power,
        }
    }

    /// Display label for the latest-value readout, e.g. `"3.300 V"`.
    pub fn label(&self, channel: Channel) -> String {
        format!("{:.3} {}", self.value(channel), channel.unit())
    }
}

/// The three independently filtered channels of a measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Volts.
    Voltage,
    /// Milliamperes.
    Current,
    /// Milliwatts.
    Power,
}

impl Channel {
    /// All channels in wire order.
    pub const ALL: [Channel; 3] = [Channel::Voltage, Channel::Current, Channel::Power];

    /// Position of the channel in per-channel arrays.
    pub fn index(self) -> usize {
        match self {
            Channel::Voltage => 0,
            Channel::Current => 1,
            Channel::Power => 2,
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Channel::Voltage => "V",
            Channel::Current => "mA",
            Channel::Power => "mW",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Channel::Voltage => "voltage",
            Channel::Current => "current",
            Channel::Power => "power",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_indices_match_all_order() {
        for (i, channel) in Channel::ALL.iter().enumerate() {
            assert_eq!(channel.index(), i);
        }
    }

    #[test]
    fn test_value_and_label() {
        let m = Measurement::new(100, 3.3, 250.0, 825.0);
        assert_eq!(m.value(Channel::Current), 250.0);
        assert_eq!(m.label(Channel::Voltage), "3.300 V");
        assert_eq!(m.label(Channel::Current), "250.000 mA");
        assert_eq!(m.label(Channel::Power), "825.000 mW");
    }
}
