//! Online (causal, sample-by-sample) filters applied per channel.
//!
//! Each channel of the windowed buffer owns one [`OnlineFilter`] instance.
//! Filters see samples in arrival order and never look ahead. Which filter
//! is used is described by a [`FilterKind`], deserialised from configuration
//! or parsed from the command line.
//!
//! # Example Configuration (`.toml`)
//!
//! ```toml
//! [acquisition]
//! filter = { median = 7 }   # or filter = "identity"
//! ```

use crate::error::{AppResult, PicovaError};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

/// Window used by `median` without an explicit size.
pub const DEFAULT_MEDIAN_WINDOW: usize = 7;

/// A causal filter consuming one sample at a time.
pub trait OnlineFilter: Send {
    /// Feed one sample and return the filtered value for it.
    fn process_sample(&mut self, sample: f64) -> f64;

    /// Forget all history.
    fn reset(&mut self);
}

/// The filter selected for a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    /// Pass samples through unchanged.
    #[default]
    Identity,
    /// Median of the most recent `n` samples.
    Median(usize),
}

impl FilterKind {
    /// Median filter with the default window.
    pub fn median() -> Self {
        FilterKind::Median(DEFAULT_MEDIAN_WINDOW)
    }

    /// Reject kinds that cannot be built.
    pub fn validate(&self) -> AppResult<()> {
        match self {
            FilterKind::Median(0) => Err(PicovaError::InvalidMedianWindow),
            _ => Ok(()),
        }
    }

    /// Build a fresh filter instance with empty history.
    pub fn build(&self) -> Box<dyn OnlineFilter> {
        match *self {
            FilterKind::Identity => Box::new(IdentityFilter),
            FilterKind::Median(size) => Box::new(MedianFilter::new(size)),
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterKind::Identity => f.write_str("identity"),
            FilterKind::Median(n) => write!(f, "median:{n}"),
        }
    }
}

/// Accepts `identity`, `median` and `median:N`.
impl FromStr for FilterKind {
    type Err = PicovaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        let kind = match s.split_once(':') {
            None if s == "identity" || s == "none" => FilterKind::Identity,
            None if s == "median" => FilterKind::median(),
            Some(("median", n)) => FilterKind::Median(n.parse().map_err(|_| {
                PicovaError::Configuration(format!("invalid median window '{n}'"))
            })?),
            _ => {
                return Err(PicovaError::Configuration(format!(
                    "unknown filter '{s}'. Must be one of: identity, median, median:N"
                )))
            }
        };
        kind.validate()?;
        Ok(kind)
    }
}

/// Stateless pass-through.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityFilter;

impl OnlineFilter for IdentityFilter {
    fn process_sample(&mut self, sample: f64) -> f64 {
        sample
    }

    fn reset(&mut self) {}
}

/// Sliding median over the last `window_size` samples.
///
/// Until the window fills, the median is taken over the samples seen so far.
/// With an even number of samples the two middle values are averaged.
#[derive(Debug, Clone)]
pub struct MedianFilter {
    window_size: usize,
    history: VecDeque<f64>,
    scratch: Vec<f64>,
}

impl MedianFilter {
    /// A zero window is treated as one; use [`FilterKind::validate`] to reject it up front.
    pub fn new(window_size: usize) -> Self {
        let window_size = window_size.max(1);
        Self {
            window_size,
            history: VecDeque::with_capacity(window_size),
            scratch: Vec::with_capacity(window_size),
        }
    }

    /// Number of samples the median is taken over.
    pub fn window_size(&self) -> usize {
        self.window_size
    }
}

impl OnlineFilter for MedianFilter {
    fn process_sample(&mut self, sample: f64) -> f64 {
        if self.history.len() == self.window_size {
            self.history.pop_front();
        }
        self.history.push_back(sample);

        self.scratch.clear();
        self.scratch.extend(self.history.iter().copied());
        self.scratch.sort_by(f64::total_cmp);

        let mid = self.scratch.len() / 2;
        if self.scratch.len() % 2 == 0 {
            (self.scratch[mid - 1] + self.scratch[mid]) / 2.0
        } else {
            self.scratch[mid]
        }
    }

    fn reset(&mut self) {
        self.history.clear();
    }
}
