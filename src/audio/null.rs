// Null sink - consumes buffers without producing sound

use std::thread;
use std::time::Duration;

use crate::audio::timing::SUPPORTED_SAMPLE_RATES;
use crate::audio::{AudioSystem, Sample, Sink};
use crate::error::SinkError;

/// Sink that discards samples.
///
/// Paced mode sleeps for the playing time of each buffer so tones take as
/// long as they would on a soundcard. Unpaced mode returns at once.
pub struct NullSink {
    paced: bool,
    sample_rate: u32,
    is_open: bool,
}

impl NullSink {
    /// Real-time null sink
    pub fn new() -> Self {
        Self {
            paced: true,
            sample_rate: SUPPORTED_SAMPLE_RATES[0],
            is_open: false,
        }
    }

    /// Null sink that runs as fast as the generator can produce
    pub fn unpaced() -> Self {
        Self {
            paced: false,
            ..Self::new()
        }
    }

    pub fn is_paced(&self) -> bool {
        self.paced
    }
}

impl Default for NullSink {
    fn default() -> Self {
        Self::new()
    }
}

impl Sink for NullSink {
    fn open(&mut self, _device: Option<&str>) -> Result<u32, SinkError> {
        self.is_open = true;
        Ok(self.sample_rate)
    }

    fn close(&mut self) {
        self.is_open = false;
    }

    fn write(&mut self, buffer: &[Sample]) -> Result<(), SinkError> {
        if !self.is_open {
            return Err(SinkError::NotOpen);
        }
        if self.paced {
            let usecs = buffer.len() as u64 * 1_000_000 / u64::from(self.sample_rate);
            thread::sleep(Duration::from_micros(usecs));
        }
        Ok(())
    }

    fn silence(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    fn system(&self) -> AudioSystem {
        AudioSystem::Null
    }
}
