// src/adapters/mod.rs

//! Byte transports and the wire-level frame decoder.

pub mod frame_decoder;
pub use frame_decoder::{FrameDecoder, Frames, DELIMITER};

pub mod serial_adapter;
pub use serial_adapter::{list_ports, SerialAdapter};

pub mod mock_adapter;
pub use mock_adapter::SimulatedMeter;
