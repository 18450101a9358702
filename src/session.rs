//! Connection lifecycle of one meter.
//!
//! A [`MeterSession`] owns at most one running [`IngestPipeline`]. Connecting
//! clears the buffer, since the device restarts its microsecond counter on
//! every connection, applies the session's time window and filter to it, and
//! then starts the pipeline. Disconnecting stops the
//! reader and waits until the last collected records reached the buffer.
//!
//! The `connected` flag is published on a `watch` channel. It also drops to
//! `false` on its own when the transport ends or fails.

use crate::adapters::SerialAdapter;
use crate::buffer_actor::BufferHandle;
use crate::config::{AcquisitionSettings, SerialSettings};
use crate::error::{AppResult, PicovaError};
use crate::ingest::{IngestPipeline, IngestStats};
use std::io::Read;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Connect/disconnect lifecycle for one meter feeding one buffer.
pub struct MeterSession {
    buffer: BufferHandle,
    settings: AcquisitionSettings,
    connected: Arc<watch::Sender<bool>>,
    pipeline: Option<IngestPipeline>,
    stats: Option<Arc<IngestStats>>,
}

impl MeterSession {
    /// `settings` are checked and applied to `buffer` on every `connect`.
    pub fn new(buffer: BufferHandle, settings: AcquisitionSettings) -> Self {
        let (connected, _) = watch::channel(false);
        Self {
            buffer,
            settings,
            connected: Arc::new(connected),
            pipeline: None,
            stats: None,
        }
    }

    /// Start ingesting from `source`.
    ///
    /// # Errors
    ///
    /// `AlreadyConnected` while a previous source is still streaming,
    /// a configuration error for invalid settings, `BufferClosed` if the
    /// buffer actor is gone.
    pub async fn connect(&mut self, source: Box<dyn Read + Send>) -> AppResult<()> {
        if self.is_connected() {
            return Err(PicovaError::AlreadyConnected);
        }
        self.settings.validate()?;
        self.reap().await;

        self.buffer.clear().await?;
        self.buffer.set_time_window(self.settings.time_window).await?;
        self.buffer.set_filter(self.settings.filter).await?;
        self.connected.send_replace(true);

        let running = self.connected.clone();
        match IngestPipeline::start(source, self.buffer.clone(), &self.settings, running) {
            Ok(pipeline) => {
                self.stats = Some(pipeline.stats());
                self.pipeline = Some(pipeline);
                info!("Session connected");
                Ok(())
            }
            Err(e) => {
                self.connected.send_replace(false);
                Err(e)
            }
        }
    }

    /// Open the configured serial port and start ingesting from it.
    pub async fn connect_serial(&mut self, serial: &SerialSettings) -> AppResult<()> {
        if self.is_connected() {
            return Err(PicovaError::AlreadyConnected);
        }
        let port = SerialAdapter::from_settings(serial)?.open()?;
        self.connect(port).await
    }

    /// Stop the current source and deliver what it already produced.
    ///
    /// A no-op when nothing is connected. Transport errors that ended the
    /// source earlier are logged, not returned.
    pub async fn disconnect(&mut self) -> AppResult<()> {
        if let Some(pipeline) = self.pipeline.take() {
            pipeline.request_stop();
            if let Err(e) = pipeline.join().await {
                warn!(error = %e, "Source ended with an error");
            }
            info!("Session disconnected");
        }
        self.connected.send_replace(false);
        Ok(())
    }

    /// Whether a source is currently streaming.
    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Receiver for connection state changes.
    pub fn connected(&self) -> watch::Receiver<bool> {
        self.connected.subscribe()
    }

    /// Counters of the current or most recent connection.
    pub fn stats(&self) -> Option<Arc<IngestStats>> {
        self.stats.clone()
    }

    /// Handle of the buffer this session feeds.
    pub fn buffer(&self) -> &BufferHandle {
        &self.buffer
    }

    /// Settings applied on every connect.
    pub fn settings(&self) -> &AcquisitionSettings {
        &self.settings
    }

    /// Join a pipeline whose source already ended on its own.
    async fn reap(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            if let Err(e) = pipeline.join().await {
                warn!(error = %e, "Previous source ended with an error");
            }
        }
    }
}
