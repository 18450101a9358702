//! Frame decoder for the CRLF-delimited wire protocol.
//!
//! Bytes arrive in arbitrary chunks from the transport. [`FrameDecoder`]
//! accumulates them and yields every complete line; a line split across two
//! reads is held back until its delimiter arrives.
//!
//! The pending buffer is unbounded by default. A producer that never sends
//! `\r\n` grows it without limit unless a guard is set with
//! [`FrameDecoder::with_max_pending`].

use crate::error::{AppResult, PicovaError};

/// Line delimiter used by the meter firmware.
pub const DELIMITER: &[u8] = b"\r\n";

/// Accumulates raw bytes and splits them into delimiter-terminated frames.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    pending: Vec<u8>,
    /// Start of the first line not yet yielded.
    start: usize,
    /// No delimiter begins in `start..scanned`.
    scanned: usize,
    max_pending: Option<usize>,
}

impl FrameDecoder {
    /// Decoder without a pending-byte guard.
    pub fn new() -> Self {
        Self {
            pending: Vec::with_capacity(256),
            ..Default::default()
        }
    }

    /// Fail `feed` once more than `limit` bytes are buffered without a delimiter.
    pub fn with_max_pending(mut self, limit: usize) -> Self {
        self.max_pending = Some(limit);
        self
    }

    /// Appends `bytes` and returns a lazy iterator over the lines completed so far.
    ///
    /// Lines are yielded without the delimiter. Trailing bytes after the last
    /// delimiter stay buffered for the next call. Invalid UTF-8 is replaced
    /// lossily; such lines are then rejected by the record parser.
    ///
    /// # Errors
    ///
    /// [`PicovaError::FrameOverflow`] if a guard is set and the unterminated
    /// tail exceeds it. Only that tail is discarded; complete lines before it
    /// stay buffered and are yielded by the next `feed`.
    pub fn feed(&mut self, bytes: &[u8]) -> AppResult<Frames<'_>> {
        self.compact();
        self.pending.extend_from_slice(bytes);

        if let Some(limit) = self.max_pending {
            let terminated = self.terminated_end();
            if self.pending.len() - terminated > limit {
                self.pending.truncate(terminated);
                self.scanned = self.scanned.min(terminated);
                return Err(PicovaError::FrameOverflow { limit });
            }
        }

        Ok(Frames { decoder: self })
    }

    /// Number of bytes buffered and not yet yielded.
    pub fn pending(&self) -> usize {
        self.pending.len() - self.start
    }

    /// Drop everything buffered, e.g. when a new session starts.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.start = 0;
        self.scanned = 0;
    }

    /// Move unyielded bytes to the front, once per `feed`.
    fn compact(&mut self) {
        if self.start > 0 {
            self.pending.drain(..self.start);
            self.scanned -= self.start;
            self.start = 0;
        }
    }

    /// Index just past the last delimiter, or `start` if there is none.
    fn terminated_end(&self) -> usize {
        self.pending[self.start..]
            .windows(DELIMITER.len())
            .rposition(|w| w == DELIMITER)
            .map_or(self.start, |pos| self.start + pos + DELIMITER.len())
    }

    fn next_frame(&mut self) -> Option<String> {
        let found = self.pending[self.scanned..]
            .windows(DELIMITER.len())
            .position(|w| w == DELIMITER);
        let Some(offset) = found else {
            // A delimiter may still straddle the end of the buffer.
            self.scanned = (self.pending.len() + 1)
                .saturating_sub(DELIMITER.len())
                .max(self.start);
            return None;
        };

        let end = self.scanned + offset;
        let line = String::from_utf8_lossy(&self.pending[self.start..end]).into_owned();
        self.start = end + DELIMITER.len();
        self.scanned = self.start;
        Some(line)
    }
}

/// Lines completed by one [`FrameDecoder::feed`] call.
///
/// Dropping the iterator early leaves the remaining lines buffered; they are
/// yielded by the next `feed`.
#[derive(Debug)]
pub struct Frames<'a> {
    decoder: &'a mut FrameDecoder,
}

impl Iterator for Frames<'_> {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        self.decoder.next_frame()
    }
}
