//! Ingestion pipeline: transport bytes to buffered batches.
//!
//! Two stages run per connection:
//!
//! 1. A reader thread (`picova-reader`) performs blocking reads on the
//!    transport, feeds the bytes to a [`FrameDecoder`], parses every complete
//!    line and forwards the valid records over an unbounded channel. It never
//!    waits on the consumer.
//! 2. A batcher task collects those records and, once per batch interval,
//!    delivers everything collected as one `AddMeasurements` command.
//!
//! When the reader stops (end of stream, transport error or a stop request)
//! it drops its sender; the batcher then delivers whatever is still pending
//! as a final batch and exits.

use crate::adapters::FrameDecoder;
use crate::buffer_actor::BufferHandle;
use crate::config::AcquisitionSettings;
use crate::error::{AppResult, PicovaError};
use crate::measurement::{parse_record, Measurement};
use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace, warn};

/// Name of the blocking reader thread.
pub const READER_THREAD_NAME: &str = "picova-reader";

const READ_CHUNK: usize = 1024;

/// Counters updated by the reader thread; readable at any time.
#[derive(Debug, Default)]
pub struct IngestStats {
    lines: AtomicU64,
    records: AtomicU64,
    rejected: AtomicU64,
}

impl IngestStats {
    /// Complete lines produced by the decoder.
    pub fn lines(&self) -> u64 {
        self.lines.load(Ordering::Relaxed)
    }

    /// Lines that parsed into a record.
    pub fn records(&self) -> u64 {
        self.records.load(Ordering::Relaxed)
    }

    /// Lines dropped by the parser.
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

/// Decoder and parser for one connection.
pub struct LineProcessor {
    decoder: FrameDecoder,
    stats: Arc<IngestStats>,
}

impl LineProcessor {
    /// Processor counting into `stats`.
    pub fn new(decoder: FrameDecoder, stats: Arc<IngestStats>) -> Self {
        Self { decoder, stats }
    }

    /// Decode `chunk` and append every valid record to `out`, in wire order.
    ///
    /// Malformed lines are counted and logged, never returned as errors.
    ///
    /// # Errors
    ///
    /// `FrameOverflow` if the decoder's pending-byte guard trips. Records from
    /// lines completed before the oversized tail are still appended to `out`.
    pub fn process(&mut self, chunk: &[u8], out: &mut Vec<Measurement>) -> AppResult<()> {
        let overflow = match self.decoder.feed(chunk) {
            Ok(lines) => {
                parse_lines(lines, &self.stats, out);
                None
            }
            Err(e) => Some(e),
        };

        match overflow {
            None => Ok(()),
            Some(e) => {
                parse_lines(self.decoder.feed(&[])?, &self.stats, out);
                Err(e)
            }
        }
    }
}

fn parse_lines(
    lines: impl Iterator<Item = String>,
    stats: &IngestStats,
    out: &mut Vec<Measurement>,
) {
    for line in lines {
        stats.lines.fetch_add(1, Ordering::Relaxed);
        match parse_record(&line) {
            Ok(record) => {
                stats.records.fetch_add(1, Ordering::Relaxed);
                out.push(record);
            }
            Err(err) => {
                stats.rejected.fetch_add(1, Ordering::Relaxed);
                trace!(line = %line, reason = %err, "Rejected line");
            }
        }
    }
}

/// The two running stages of one connection.
pub struct IngestPipeline {
    stop: Arc<AtomicBool>,
    reader: thread::JoinHandle<AppResult<()>>,
    batcher: JoinHandle<()>,
    stats: Arc<IngestStats>,
}

impl IngestPipeline {
    /// Start reading `source` into `buffer`.
    ///
    /// `running` is set to `false` once the batcher has delivered its final
    /// batch, whichever way the connection ended.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Invalid `settings` are rejected before anything is spawned.
    pub fn start(
        source: Box<dyn Read + Send>,
        buffer: BufferHandle,
        settings: &AcquisitionSettings,
        running: Arc<watch::Sender<bool>>,
    ) -> AppResult<Self> {
        settings.validate()?;

        let stats = Arc::new(IngestStats::default());
        let stop = Arc::new(AtomicBool::new(false));

        let mut decoder = FrameDecoder::new();
        if let Some(limit) = settings.max_pending_bytes {
            decoder = decoder.with_max_pending(limit);
        }
        let processor = LineProcessor::new(decoder, stats.clone());

        let (tx, rx) = mpsc::unbounded_channel();
        let reader_stop = stop.clone();
        let reader = thread::Builder::new()
            .name(READER_THREAD_NAME.to_string())
            .spawn(move || {
                let result = read_loop(source, processor, tx, &reader_stop);
                match &result {
                    Ok(()) => debug!("Reader finished"),
                    Err(e) => error!(error = %e, "Reader failed"),
                }
                result
            })?;

        let batcher = tokio::spawn(run_batcher(rx, buffer, settings.batch_interval, running));

        Ok(Self {
            stop,
            reader,
            batcher,
            stats,
        })
    }

    /// Counters of this connection.
    pub fn stats(&self) -> Arc<IngestStats> {
        self.stats.clone()
    }

    /// Ask the reader to stop after its current read.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Whether both stages have ended.
    pub fn is_finished(&self) -> bool {
        self.reader.is_finished() && self.batcher.is_finished()
    }

    /// Wait for the final batch to be delivered and the reader to exit.
    ///
    /// Returns the reader's outcome: `Ok` for end of stream or a stop
    /// request, otherwise the transport or decoder error that ended it.
    pub async fn join(self) -> AppResult<()> {
        if let Err(e) = self.batcher.await {
            warn!(error = %e, "Batcher task ended abnormally");
        }
        // The batcher only exits after the reader dropped its sender, so this
        // join does not block for long.
        let reader = self.reader;
        tokio::task::spawn_blocking(move || reader.join())
            .await
            .map_err(|e| PicovaError::ReaderPanicked(e.to_string()))?
            .map_err(|_| PicovaError::ReaderPanicked("reader thread panicked".to_string()))?
    }
}

fn read_loop(
    mut source: Box<dyn Read + Send>,
    mut processor: LineProcessor,
    tx: mpsc::UnboundedSender<Vec<Measurement>>,
    stop: &AtomicBool,
) -> AppResult<()> {
    let mut buf = [0u8; READ_CHUNK];
    let mut records = Vec::new();

    while !stop.load(Ordering::Acquire) {
        let n = match source.read(&mut buf) {
            Ok(0) => {
                info!("Transport reached end of stream");
                return Ok(());
            }
            Ok(n) => n,
            Err(e) if is_retryable(&e) => continue,
            Err(e) => return Err(e.into()),
        };

        // Records parsed before a decoder failure are forwarded first.
        let processed = processor.process(&buf[..n], &mut records);
        if !records.is_empty() && tx.send(std::mem::take(&mut records)).is_err() {
            debug!("Batcher gone, stopping reader");
            return processed;
        }
        processed?;
    }

    debug!("Reader stop requested");
    Ok(())
}

fn is_retryable(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
    )
}

async fn run_batcher(
    mut rx: mpsc::UnboundedReceiver<Vec<Measurement>>,
    buffer: BufferHandle,
    interval: Duration,
    running: Arc<watch::Sender<bool>>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut pending: Vec<Measurement> = Vec::new();
    let mut delivered = 0usize;

    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Some(records) => pending.extend(records),
                None => break,
            },
            _ = ticker.tick() => {
                if pending.is_empty() {
                    continue;
                }
                delivered += pending.len();
                if buffer.add_measurements(std::mem::take(&mut pending)).await.is_err() {
                    warn!("Buffer closed, dropping remaining records");
                    break;
                }
            }
        }
    }

    // Drain: whatever arrived before the reader stopped still reaches the buffer.
    if !pending.is_empty() {
        delivered += pending.len();
        if buffer.add_measurements(pending).await.is_err() {
            warn!("Buffer closed before final batch");
        }
    }

    debug!(delivered, "Batcher finished");
    running.send_replace(false);
}
