//! Data processing and storage modules.
pub mod filter;
pub mod storage;
pub mod windowed_buffer;

pub use filter::{FilterKind, IdentityFilter, MedianFilter, OnlineFilter};
pub use windowed_buffer::{AddOutcome, BufferState, SeriesPoint, TimeBounds, WindowedBuffer};
