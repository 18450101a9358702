//! Time-bounded sliding buffer of measurements with per-channel filtering.
//!
//! [`WindowedBuffer`] keeps the raw records of the current session, oldest
//! first, together with one filtered series per channel. The three series
//! always have the same length as the record list and are index-aligned to it.
//!
//! Eviction is lazy: it only runs at the end of [`WindowedBuffer::add_measurements`].
//! With `last_t` the timestamp of the newest record, every record before the
//! first one with `timestamp >= last_t - time_window` is dropped. When
//! `last_t < time_window` nothing can be old enough and nothing is evicted.
//!
//! Changing the filter replays all retained raw records through fresh filter
//! instances, so the filtered series only ever depends on the raw history and
//! the selected [`FilterKind`].

use super::filter::{FilterKind, OnlineFilter};
use crate::error::{AppResult, PicovaError};
use crate::measurement::{Channel, Measurement};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, trace};

/// Window used until configured otherwise.
pub const DEFAULT_TIME_WINDOW: Duration = Duration::from_secs(5);

/// A point of a filtered series: device time in microseconds and the filtered value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    /// Device time in microseconds.
    pub time: u64,
    /// Filtered value.
    pub value: f64,
}

/// Time span a renderer should show for the current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBounds {
    /// `newest - window`, floored at zero.
    pub min: u64,
    /// Timestamp of the newest record.
    pub max: u64,
}

/// Fill state of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BufferState {
    /// No records.
    Empty,
    /// Records present, none evicted yet since the last clear.
    Accumulating,
    /// The window has been exceeded; each batch may evict.
    SteadyState,
}

/// Result of one [`WindowedBuffer::add_measurements`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AddOutcome {
    /// Records appended from the batch.
    pub appended: usize,
    /// Records dropped from the front afterwards.
    pub evicted: usize,
}

/// Ordered, time-bounded store of measurements and their filtered projections.
pub struct WindowedBuffer {
    records: Vec<Measurement>,
    series: [Vec<SeriesPoint>; 3],
    filters: [Box<dyn OnlineFilter>; 3],
    filter_kind: FilterKind,
    time_window_us: u64,
    evicting: bool,
    revision: u64,
}

impl WindowedBuffer {
    /// Empty buffer with the identity filter and a 5 s window.
    pub fn new() -> Self {
        let kind = FilterKind::default();
        Self {
            records: Vec::new(),
            series: Default::default(),
            filters: Self::build_filters(kind),
            filter_kind: kind,
            time_window_us: DEFAULT_TIME_WINDOW.as_micros() as u64,
            evicting: false,
            revision: 0,
        }
    }

    /// Empty buffer with the given filter and window.
    ///
    /// # Errors
    ///
    /// Same as [`set_filter_kind`](Self::set_filter_kind) and
    /// [`set_time_window`](Self::set_time_window).
    pub fn with_settings(kind: FilterKind, window: Duration) -> AppResult<Self> {
        let mut buffer = Self::new();
        buffer.set_time_window(window)?;
        buffer.set_filter_kind(kind)?;
        Ok(buffer)
    }

    fn build_filters(kind: FilterKind) -> [Box<dyn OnlineFilter>; 3] {
        [kind.build(), kind.build(), kind.build()]
    }

    /// Append a batch in order, filter each new record, then evict stale records.
    pub fn add_measurements(&mut self, batch: &[Measurement]) -> AddOutcome {
        if batch.is_empty() {
            return AddOutcome::default();
        }

        self.records.reserve(batch.len());
        for m in batch {
            self.push_filtered(m);
            self.records.push(*m);
        }

        let evicted = self.evict();
        self.revision += 1;
        trace!(appended = batch.len(), evicted, retained = self.records.len(), "Batch applied");

        AddOutcome {
            appended: batch.len(),
            evicted,
        }
    }

    fn push_filtered(&mut self, m: &Measurement) {
        for channel in Channel::ALL {
            let i = channel.index();
            let value = self.filters[i].process_sample(f64::from(m.value(channel)));
            self.series[i].push(SeriesPoint {
                time: m.timestamp,
                value,
            });
        }
    }

    fn evict(&mut self) -> usize {
        let Some(last) = self.records.last() else {
            return 0;
        };
        let Some(min_t) = last.timestamp.checked_sub(self.time_window_us) else {
            return 0;
        };

        let n = self
            .records
            .iter()
            .position(|m| m.timestamp >= min_t)
            .unwrap_or(0);

        if n > 0 {
            self.records.drain(..n);
            for series in &mut self.series {
                series.drain(..n);
            }
            if !self.evicting {
                debug!(min_t, "Window filled, evicting from now on");
            }
            self.evicting = true;
        }
        n
    }

    /// Remove all records and filtered points. Filter kind and window are kept.
    pub fn clear(&mut self) {
        self.records.clear();
        for series in &mut self.series {
            series.clear();
        }
        for filter in &mut self.filters {
            filter.reset();
        }
        self.evicting = false;
        self.revision += 1;
        debug!("Buffer cleared");
    }

    /// Select a filter and regenerate all three series from the raw records.
    ///
    /// # Errors
    ///
    /// `InvalidMedianWindow` for a zero-sized median; the buffer is left untouched.
    pub fn set_filter_kind(&mut self, kind: FilterKind) -> AppResult<()> {
        kind.validate()?;
        self.filter_kind = kind;
        self.refilter();
        Ok(())
    }

    /// Reset the filters and replay every retained record through them.
    pub fn refilter(&mut self) {
        self.filters = Self::build_filters(self.filter_kind);
        for series in &mut self.series {
            series.clear();
        }

        let records = std::mem::take(&mut self.records);
        for m in &records {
            self.push_filtered(m);
        }
        self.records = records;
        self.revision += 1;
        debug!(filter = %self.filter_kind, records = self.records.len(), "Refiltered");
    }

    /// Change the retention window. Takes effect on the next batch.
    ///
    /// # Errors
    ///
    /// `InvalidTimeWindow` if `window` is shorter than one microsecond.
    pub fn set_time_window(&mut self, window: Duration) -> AppResult<()> {
        let micros = u64::try_from(window.as_micros()).unwrap_or(u64::MAX);
        if micros == 0 {
            return Err(PicovaError::InvalidTimeWindow(window));
        }
        self.time_window_us = micros;
        Ok(())
    }

    /// Current retention window.
    pub fn time_window(&self) -> Duration {
        Duration::from_micros(self.time_window_us)
    }

    /// Filter applied to every channel.
    pub fn filter_kind(&self) -> FilterKind {
        self.filter_kind
    }

    /// Raw records, oldest first.
    pub fn records(&self) -> &[Measurement] {
        &self.records
    }

    /// Filtered series for one channel, aligned with [`records`](Self::records).
    pub fn series(&self, channel: Channel) -> &[SeriesPoint] {
        &self.series[channel.index()]
    }

    /// Most recent raw record.
    pub fn latest(&self) -> Option<&Measurement> {
        self.records.last()
    }

    /// Span the current window covers, if there is any data.
    pub fn time_bounds(&self) -> Option<TimeBounds> {
        self.latest().map(|m| TimeBounds {
            min: m.timestamp.saturating_sub(self.time_window_us),
            max: m.timestamp,
        })
    }

    /// Fill state, derived from contents and eviction history.
    pub fn state(&self) -> BufferState {
        if self.records.is_empty() {
            BufferState::Empty
        } else if self.evicting {
            BufferState::SteadyState
        } else {
            BufferState::Accumulating
        }
    }

    /// Incremented by every batch, clear and refilter.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Number of retained records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no records are retained.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for WindowedBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for WindowedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowedBuffer")
            .field("records", &self.records.len())
            .field("filter_kind", &self.filter_kind)
            .field("time_window_us", &self.time_window_us)
            .field("state", &self.state())
            .finish()
    }
}
