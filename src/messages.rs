//! Message types for the buffer actor.
//!
//! The [`WindowedBuffer`](crate::data::WindowedBuffer) has exactly one owner,
//! the [`BufferActor`](crate::buffer_actor::BufferActor). Everything else talks
//! to it through [`BufferCommand`]s sent over an `mpsc` channel, so batch
//! delivery and configuration changes are applied strictly one after another.
//!
//! Commands that can fail or return data carry a `oneshot::Sender` for the
//! response. Use the helper constructors to create a command together with
//! its receiver.

use crate::buffer_actor::BufferSnapshot;
use crate::data::FilterKind;
use crate::error::AppResult;
use crate::measurement::Measurement;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// Commands accepted by the buffer actor.
#[derive(Debug)]
pub enum BufferCommand {
    /// Append one batch in arrival order, then evict.
    ///
    /// Fire-and-forget: batches from the ingest pipeline are never rejected.
    AddMeasurements(Vec<Measurement>),

    /// Drop all records and filtered points. Sent when a new session starts.
    Clear,

    /// Select a filter and regenerate all series from the retained records.
    ///
    /// # Response
    ///
    /// - `Ok(())`: Filter applied and series refiltered
    /// - `Err`: Invalid filter; buffer unchanged
    SetFilter {
        /// Filter to select.
        kind: FilterKind,
        /// Reply channel.
        response: oneshot::Sender<AppResult<()>>,
    },

    /// Change the retention window; applied at the next batch.
    ///
    /// # Response
    ///
    /// - `Ok(())`: Window updated
    /// - `Err(InvalidTimeWindow)`: Window was zero; buffer unchanged
    SetTimeWindow {
        /// New retention window.
        window: Duration,
        /// Reply channel.
        response: oneshot::Sender<AppResult<()>>,
    },

    /// Copy of the raw retained records, oldest first (for export).
    Records {
        /// Reply channel.
        response: oneshot::Sender<Vec<Measurement>>,
    },

    /// Current immutable snapshot.
    Snapshot {
        /// Reply channel.
        response: oneshot::Sender<Arc<BufferSnapshot>>,
    },

    /// Stop the actor after processing everything queued before this command.
    Shutdown {
        /// Acknowledged once the actor stops.
        response: oneshot::Sender<()>,
    },
}

impl BufferCommand {
    /// `SetFilter` plus its reply receiver.
    pub fn set_filter(kind: FilterKind) -> (Self, oneshot::Receiver<AppResult<()>>) {
        let (response, rx) = oneshot::channel();
        (Self::SetFilter { kind, response }, rx)
    }

    /// `SetTimeWindow` plus its reply receiver.
    pub fn set_time_window(window: Duration) -> (Self, oneshot::Receiver<AppResult<()>>) {
        let (response, rx) = oneshot::channel();
        (Self::SetTimeWindow { window, response }, rx)
    }

    /// `Records` plus its reply receiver.
    pub fn records() -> (Self, oneshot::Receiver<Vec<Measurement>>) {
        let (response, rx) = oneshot::channel();
        (Self::Records { response }, rx)
    }

    /// `Snapshot` plus its reply receiver.
    pub fn snapshot() -> (Self, oneshot::Receiver<Arc<BufferSnapshot>>) {
        let (response, rx) = oneshot::channel();
        (Self::Snapshot { response }, rx)
    }

    /// `Shutdown` plus its acknowledgement receiver.
    pub fn shutdown() -> (Self, oneshot::Receiver<()>) {
        let (response, rx) = oneshot::channel();
        (Self::Shutdown { response }, rx)
    }
}
