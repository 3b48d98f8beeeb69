// Microsecond to sample conversion and a count of samples written

use std::sync::atomic::{AtomicU64, Ordering};

/// Sample rates tried when opening a soundcard, in order of preference
pub const SUPPORTED_SAMPLE_RATES: [u32; 7] = [44100, 48000, 32000, 22050, 16000, 11025, 8000];

/// Convert microseconds to a sample count.
///
/// Integer arithmetic: `(sample_rate / 100) * usecs / 10_000`, which
/// keeps the intermediate product small (100 * 10_000 = 1_000_000 us/s).
pub fn usecs_to_samples(sample_rate: u32, usecs: i64) -> i64 {
    (i64::from(sample_rate) / 100) * usecs / 10_000
}

/// Running count of samples handed to the sink
/// (incremented by the synthesis thread, read by anyone)
#[derive(Default)]
pub struct SampleClock {
    samples_written: AtomicU64,
}

impl SampleClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of samples written so far
    pub fn samples_written(&self) -> u64 {
        self.samples_written.load(Ordering::Relaxed)
    }

    /// Advance after a buffer write (called from the synthesis thread)
    pub fn advance(&self, frames: usize) {
        self.samples_written
            .fetch_add(frames as u64, Ordering::Relaxed);
    }
}
