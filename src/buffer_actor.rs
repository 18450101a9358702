//! Single-owner task around the [`WindowedBuffer`].
//!
//! The actor applies [`BufferCommand`]s in the order they arrive and, after
//! every mutation, publishes an immutable [`BufferSnapshot`] on a `watch`
//! channel. Renderers borrow the latest snapshot without ever observing a
//! half-applied batch; slow subscribers simply skip intermediate revisions.

use crate::data::{BufferState, FilterKind, SeriesPoint, TimeBounds, WindowedBuffer};
use crate::error::{AppResult, PicovaError};
use crate::measurement::{Channel, Measurement};
use crate::messages::BufferCommand;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Command queue depth; batches arrive about ten times per second.
const COMMAND_CAPACITY: usize = 64;

/// Immutable view of the buffer after one mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferSnapshot {
    /// Filtered series, indexed by [`Channel::index`].
    pub series: [Vec<SeriesPoint>; 3],
    /// Newest raw record.
    pub latest: Option<Measurement>,
    /// Span the window covers.
    pub time_bounds: Option<TimeBounds>,
    pub state: BufferState,
    pub filter_kind: FilterKind,
    pub time_window: Duration,
    /// Buffer revision this snapshot was taken at.
    pub revision: u64,
}

impl BufferSnapshot {
    fn capture(buffer: &WindowedBuffer) -> Self {
        Self {
            series: Channel::ALL.map(|ch| buffer.series(ch).to_vec()),
            latest: buffer.latest().copied(),
            time_bounds: buffer.time_bounds(),
            state: buffer.state(),
            filter_kind: buffer.filter_kind(),
            time_window: buffer.time_window(),
            revision: buffer.revision(),
        }
    }

    /// Filtered series for one channel.
    pub fn series(&self, channel: Channel) -> &[SeriesPoint] {
        &self.series[channel.index()]
    }

    /// Points per series.
    pub fn len(&self) -> usize {
        self.series[0].len()
    }

    /// Whether the buffer held no records.
    pub fn is_empty(&self) -> bool {
        self.series[0].is_empty()
    }

    /// Display strings for the newest record, e.g. `["3.301 V", "250.000 mA", "825.250 mW"]`.
    pub fn labels(&self) -> Option<[String; 3]> {
        self.latest
            .map(|m| Channel::ALL.map(|channel| m.label(channel)))
    }
}

/// The task that owns the buffer.
pub struct BufferActor {
    buffer: WindowedBuffer,
    commands: mpsc::Receiver<BufferCommand>,
    snapshots: watch::Sender<Arc<BufferSnapshot>>,
}

impl BufferActor {
    /// Create an actor and the handle that talks to it. Call [`run`](Self::run)
    /// (or use [`BufferHandle::spawn`]) to start processing.
    pub fn new(buffer: WindowedBuffer) -> (Self, BufferHandle) {
        let (tx, rx) = mpsc::channel(COMMAND_CAPACITY);
        let (snapshots, snapshot_rx) = watch::channel(Arc::new(BufferSnapshot::capture(&buffer)));
        let actor = Self {
            buffer,
            commands: rx,
            snapshots,
        };
        let handle = BufferHandle {
            commands: tx,
            snapshots: snapshot_rx,
        };
        (actor, handle)
    }

    /// Process commands until every handle is dropped or `Shutdown` arrives.
    pub async fn run(mut self) {
        debug!("Buffer actor started");
        while let Some(command) = self.commands.recv().await {
            if !self.handle_command(command) {
                break;
            }
        }
        debug!(records = self.buffer.len(), "Buffer actor stopped");
    }

    /// Returns `false` when the actor should stop.
    fn handle_command(&mut self, command: BufferCommand) -> bool {
        match command {
            BufferCommand::AddMeasurements(batch) => {
                if self.buffer.add_measurements(&batch).appended > 0 {
                    self.publish();
                }
            }
            BufferCommand::Clear => {
                self.buffer.clear();
                self.publish();
            }
            BufferCommand::SetFilter { kind, response } => {
                let result = self.buffer.set_filter_kind(kind);
                match &result {
                    Ok(()) => {
                        info!(filter = %kind, "Filter changed");
                        self.publish();
                    }
                    Err(e) => warn!(filter = %kind, error = %e, "Filter rejected"),
                }
                let _ = response.send(result);
            }
            BufferCommand::SetTimeWindow { window, response } => {
                let result = self.buffer.set_time_window(window);
                match &result {
                    Ok(()) => {
                        info!(window = ?window, "Time window changed");
                        self.publish();
                    }
                    Err(e) => warn!(window = ?window, error = %e, "Time window rejected"),
                }
                let _ = response.send(result);
            }
            BufferCommand::Records { response } => {
                let _ = response.send(self.buffer.records().to_vec());
            }
            BufferCommand::Snapshot { response } => {
                let _ = response.send(self.snapshots.borrow().clone());
            }
            BufferCommand::Shutdown { response } => {
                let _ = response.send(());
                return false;
            }
        }
        true
    }

    fn publish(&self) {
        // send_replace keeps the value current even with no subscribers.
        self.snapshots
            .send_replace(Arc::new(BufferSnapshot::capture(&self.buffer)));
    }
}

/// Cloneable handle to a running [`BufferActor`].
///
/// # Example
///
/// ```
/// use picova::{BufferHandle, Measurement, WindowedBuffer};
///
/// # tokio_test::block_on(async {
/// let (buffer, _task) = BufferHandle::spawn(WindowedBuffer::new());
/// buffer
///     .add_measurements(vec![Measurement::new(0, 5.0, 100.0, 500.0)])
///     .await?;
///
/// let snapshot = buffer.snapshot().await?;
/// assert_eq!(snapshot.len(), 1);
/// # Ok::<(), picova::PicovaError>(())
/// # }).unwrap();
/// ```
#[derive(Clone)]
pub struct BufferHandle {
    commands: mpsc::Sender<BufferCommand>,
    snapshots: watch::Receiver<Arc<BufferSnapshot>>,
}

impl std::fmt::Debug for BufferHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferHandle")
            .field("closed", &self.commands.is_closed())
            .field("revision", &self.snapshots.borrow().revision)
            .finish()
    }
}

impl BufferHandle {
    /// Spawn an actor for `buffer` on the current runtime.
    pub fn spawn(buffer: WindowedBuffer) -> (Self, JoinHandle<()>) {
        let (actor, handle) = BufferActor::new(buffer);
        let task = tokio::spawn(actor.run());
        (handle, task)
    }

    async fn send(&self, command: BufferCommand) -> AppResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| PicovaError::BufferClosed)
    }

    /// Deliver one batch. Empty batches are not forwarded.
    pub async fn add_measurements(&self, batch: Vec<Measurement>) -> AppResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        self.send(BufferCommand::AddMeasurements(batch)).await
    }

    /// Drop all records and series.
    pub async fn clear(&self) -> AppResult<()> {
        self.send(BufferCommand::Clear).await
    }

    /// Select a filter; all series are regenerated before this returns.
    pub async fn set_filter(&self, kind: FilterKind) -> AppResult<()> {
        let (command, rx) = BufferCommand::set_filter(kind);
        self.send(command).await?;
        rx.await.map_err(|_| PicovaError::BufferClosed)?
    }

    /// Change the retention window; takes effect at the next batch.
    pub async fn set_time_window(&self, window: Duration) -> AppResult<()> {
        let (command, rx) = BufferCommand::set_time_window(window);
        self.send(command).await?;
        rx.await.map_err(|_| PicovaError::BufferClosed)?
    }

    /// Raw retained records, oldest first.
    pub async fn records(&self) -> AppResult<Vec<Measurement>> {
        let (command, rx) = BufferCommand::records();
        self.send(command).await?;
        rx.await.map_err(|_| PicovaError::BufferClosed)
    }

    /// Snapshot after every command queued before this call has been applied.
    pub async fn snapshot(&self) -> AppResult<Arc<BufferSnapshot>> {
        let (command, rx) = BufferCommand::snapshot();
        self.send(command).await?;
        rx.await.map_err(|_| PicovaError::BufferClosed)
    }

    /// Most recently published snapshot, without a round trip.
    pub fn latest_snapshot(&self) -> Arc<BufferSnapshot> {
        self.snapshots.borrow().clone()
    }

    /// Receiver that is notified whenever a new snapshot is published.
    pub fn subscribe(&self) -> watch::Receiver<Arc<BufferSnapshot>> {
        self.snapshots.clone()
    }

    /// Ask the actor to stop once queued commands are done.
    pub async fn shutdown(&self) -> AppResult<()> {
        let (command, rx) = BufferCommand::shutdown();
        self.send(command).await?;
        rx.await.map_err(|_| PicovaError::BufferClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(t: u64, v: f32) -> Measurement {
        Measurement::new(t, v, v * 2.0, v * 3.0)
    }

    #[tokio::test]
    async fn test_batches_are_applied_in_order() {
        let (handle, _task) = BufferHandle::spawn(WindowedBuffer::new());

        handle.add_measurements(vec![m(0, 1.0), m(10, 2.0)]).await.unwrap();
        handle.add_measurements(vec![m(20, 3.0)]).await.unwrap();

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot.latest, Some(m(20, 3.0)));
        assert_eq!(snapshot.state, BufferState::Accumulating);
        let times: Vec<u64> = snapshot.series(Channel::Voltage).iter().map(|p| p.time).collect();
        assert_eq!(times, vec![0, 10, 20]);
    }

    #[tokio::test]
    async fn test_subscribers_see_new_revisions() {
        let (handle, _task) = BufferHandle::spawn(WindowedBuffer::new());
        let mut rx = handle.subscribe();
        let initial = rx.borrow_and_update().revision;

        handle.add_measurements(vec![m(5, 1.0)]).await.unwrap();
        rx.changed().await.unwrap();

        let snapshot = rx.borrow_and_update().clone();
        assert!(snapshot.revision > initial);
        assert_eq!(
            snapshot.labels(),
            Some(["1.000 V".to_string(), "2.000 mA".to_string(), "3.000 mW".to_string()])
        );
    }

    #[tokio::test]
    async fn test_set_filter_refilters_and_rejects_invalid() {
        let (handle, _task) = BufferHandle::spawn(WindowedBuffer::new());
        handle
            .add_measurements(vec![m(0, 1.0), m(1, 9.0), m(2, 2.0)])
            .await
            .unwrap();

        handle.set_filter(FilterKind::Median(3)).await.unwrap();
        let snapshot = handle.snapshot().await.unwrap();
        let values: Vec<f64> = snapshot.series(Channel::Voltage).iter().map(|p| p.value).collect();
        assert_eq!(values, vec![1.0, 5.0, 2.0]);
        assert_eq!(snapshot.filter_kind, FilterKind::Median(3));

        let err = handle.set_filter(FilterKind::Median(0)).await.unwrap_err();
        assert!(matches!(err, PicovaError::InvalidMedianWindow));
        assert_eq!(handle.snapshot().await.unwrap().filter_kind, FilterKind::Median(3));
    }

    #[tokio::test]
    async fn test_set_time_window_and_clear() {
        let (handle, _task) = BufferHandle::spawn(WindowedBuffer::new());
        assert!(matches!(
            handle.set_time_window(Duration::ZERO).await,
            Err(PicovaError::InvalidTimeWindow(_))
        ));
        handle.set_time_window(Duration::from_micros(10)).await.unwrap();
        handle
            .add_measurements(vec![m(0, 1.0), m(5, 1.0), m(20, 1.0)])
            .await
            .unwrap();
        assert_eq!(handle.records().await.unwrap(), vec![m(20, 1.0)]);

        handle.clear().await.unwrap();
        let snapshot = handle.snapshot().await.unwrap();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.state, BufferState::Empty);
        assert_eq!(snapshot.time_window, Duration::from_micros(10));
    }

    #[tokio::test]
    async fn test_empty_batch_publishes_nothing() {
        let (handle, _task) = BufferHandle::spawn(WindowedBuffer::new());
        let before = handle.snapshot().await.unwrap().revision;
        handle.add_measurements(Vec::new()).await.unwrap();
        assert_eq!(handle.snapshot().await.unwrap().revision, before);
    }

    #[tokio::test]
    async fn test_shutdown_closes_handle() {
        let (handle, task) = BufferHandle::spawn(WindowedBuffer::new());
        handle.shutdown().await.unwrap();
        task.await.unwrap();
        assert!(matches!(handle.clear().await, Err(PicovaError::BufferClosed)));
    }
}
