//! # Picova Core Library
//!
//! Ingest core for USB power meters that stream CSV lines over a serial
//! link. The crate turns a raw byte stream into a bounded, filtered, in-memory
//! time series that a renderer can read safely while acquisition continues.
//!
//! ## Crate Structure
//!
//! - **`adapters`**: Byte sources and line framing: the CRLF [`FrameDecoder`](adapters::FrameDecoder),
//!   the serial port adapter and a simulated meter.
//! - **`measurement`**: The `Measurement` record and the wire-line parser.
//! - **`data`**: Online filters, the [`WindowedBuffer`](data::WindowedBuffer), and CSV export.
//! - **`messages`** / **`buffer_actor`**: The single task that owns the buffer, its
//!   command protocol and the snapshots it publishes.
//! - **`ingest`**: Reader thread and batcher connecting a transport to the buffer.
//! - **`session`**: Connect/disconnect lifecycle.
//! - **`config`**, **`logging`**, **`error`**: Ambient configuration, tracing setup and the
//!   crate error type.

pub mod adapters;
pub mod buffer_actor;
pub mod config;
pub mod data;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod measurement;
pub mod messages;
pub mod session;

pub use buffer_actor::{BufferHandle, BufferSnapshot};
pub use data::{FilterKind, WindowedBuffer};
pub use error::{AppResult, PicovaError};
pub use measurement::{Channel, Measurement};
pub use session::MeterSession;
