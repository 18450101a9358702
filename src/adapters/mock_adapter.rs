//! Simulated meter for testing and demos.
//!
//! [`SimulatedMeter`] implements `std::io::Read` and produces the same byte
//! stream the firmware prints: `timestamp,voltage,current,power\r\n`, with a
//! microsecond counter that advances by the sample period. It provides:
//! - Reads split at random chunk boundaries, like a USB CDC endpoint
//! - Optional corrupted lines to exercise the reject path
//! - Optional real-time pacing for interactive use
//! - A finite sample count, after which reads return EOF

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::io::{self, Read};
use std::time::Duration;

/// Byte source emulating the meter firmware.
///
/// # Example
///
/// ```
/// use picova::adapters::{FrameDecoder, SimulatedMeter};
/// use std::io::Read;
///
/// let mut meter = SimulatedMeter::new().with_seed(7).with_samples(3);
/// let mut bytes = Vec::new();
/// meter.read_to_end(&mut bytes).unwrap();
///
/// let mut decoder = FrameDecoder::new();
/// assert_eq!(decoder.feed(&bytes).unwrap().count(), 3);
/// ```
pub struct SimulatedMeter {
    clock_us: u64,
    sample_period: Duration,
    remaining: Option<u64>,
    corrupt_ratio: f64,
    max_chunk: usize,
    paced: bool,
    outgoing: VecDeque<u8>,
    rng: StdRng,
    emitted: u64,
}

impl SimulatedMeter {
    /// 1 kHz sampling, unpaced, endless, no corruption.
    pub fn new() -> Self {
        Self {
            clock_us: 0,
            sample_period: Duration::from_millis(1),
            remaining: None,
            corrupt_ratio: 0.0,
            max_chunk: 64,
            paced: false,
            outgoing: VecDeque::new(),
            rng: StdRng::from_entropy(),
            emitted: 0,
        }
    }

    /// Use a deterministic random source.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Time between samples, also the timestamp increment.
    pub fn with_sample_period(mut self, period: Duration) -> Self {
        self.sample_period = period;
        self
    }

    /// Stop after `count` samples; further reads return `Ok(0)`.
    pub fn with_samples(mut self, count: u64) -> Self {
        self.remaining = Some(count);
        self
    }

    /// Fraction of lines (0.0..=1.0) replaced with garbage.
    pub fn with_corrupt_ratio(mut self, ratio: f64) -> Self {
        self.corrupt_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    /// Upper bound on the bytes returned by a single read.
    pub fn with_max_chunk(mut self, max_chunk: usize) -> Self {
        self.max_chunk = max_chunk.max(1);
        self
    }

    /// Sleep for one sample period before producing each sample.
    pub fn paced(mut self, paced: bool) -> Self {
        self.paced = paced;
        self
    }

    /// Samples generated so far, corrupted ones included.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    fn generate(&mut self) -> bool {
        match self.remaining {
            Some(0) => return false,
            Some(ref mut n) => *n -= 1,
            None => {}
        }

        if self.paced {
            std::thread::sleep(self.sample_period);
        }

        let line = if self.rng.gen_bool(self.corrupt_ratio) {
            // Half a line, as seen when the device resets mid-write.
            format!("{},{:.3}\r\n", self.clock_us, self.rng.gen_range(0.0..5.0))
        } else {
            let phase = self.clock_us as f64 / 1_000_000.0;
            let voltage = 5.0 + self.rng.gen_range(-0.02..0.02);
            let current =
                200.0 + 80.0 * (phase * std::f64::consts::TAU).sin() + self.rng.gen_range(-2.0..2.0);
            let power = voltage * current;
            format!(
                "{},{:.3},{:.3},{:.3}\r\n",
                self.clock_us, voltage, current, power
            )
        };

        self.outgoing.extend(line.as_bytes());
        self.clock_us += self.sample_period.as_micros() as u64;
        self.emitted += 1;
        true
    }
}

impl Default for SimulatedMeter {
    fn default() -> Self {
        Self::new()
    }
}

impl Read for SimulatedMeter {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.outgoing.is_empty() && !self.generate() {
            return Ok(0);
        }

        let chunk = self.rng.gen_range(1..=self.max_chunk);
        let n = chunk.min(buf.len()).min(self.outgoing.len());
        for (dst, src) in buf.iter_mut().zip(self.outgoing.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::FrameDecoder;
    use crate::measurement::parse_record;

    fn drain(meter: &mut SimulatedMeter) -> Vec<String> {
        let mut decoder = FrameDecoder::new();
        let mut lines = Vec::new();
        let mut buf = [0u8; 16];
        loop {
            let n = meter.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            lines.extend(decoder.feed(&buf[..n]).unwrap());
        }
        lines
    }

    #[test]
    fn test_finite_stream_parses() {
        let mut meter = SimulatedMeter::new()
            .with_seed(1)
            .with_samples(50)
            .with_sample_period(Duration::from_micros(500));
        let lines = drain(&mut meter);
        assert_eq!(lines.len(), 50);

        let records: Vec<_> = lines.iter().map(|l| parse_record(l).unwrap()).collect();
        assert_eq!(records[0].timestamp, 0);
        assert_eq!(records[49].timestamp, 49 * 500);
        assert!(records.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[test]
    fn test_corrupt_lines_are_rejected() {
        let mut meter = SimulatedMeter::new()
            .with_seed(2)
            .with_samples(20)
            .with_corrupt_ratio(1.0);
        let lines = drain(&mut meter);
        assert_eq!(lines.len(), 20);
        assert!(lines.iter().all(|l| parse_record(l).is_err()));
    }

    #[test]
    fn test_reads_respect_max_chunk() {
        let mut meter = SimulatedMeter::new().with_seed(3).with_samples(5).with_max_chunk(3);
        let mut buf = [0u8; 64];
        for _ in 0..10 {
            let n = meter.read(&mut buf).unwrap();
            assert!((1..=3).contains(&n));
        }
        assert!(meter.emitted() >= 1);
    }
}
