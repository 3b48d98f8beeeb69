// Memory sink - keeps every written sample for later inspection

use parking_lot::Mutex;
use std::sync::Arc;

use crate::audio::timing::SUPPORTED_SAMPLE_RATES;
use crate::audio::{AudioSystem, Sample, Sink};
use crate::error::SinkError;

/// Read side of a `MemorySink`, usable from any thread
#[derive(Clone, Default)]
pub struct MemoryTap {
    samples: Arc<Mutex<Vec<Sample>>>,
    writes: Arc<Mutex<usize>>,
}

impl MemoryTap {
    /// Copy of everything written so far
    pub fn samples(&self) -> Vec<Sample> {
        self.samples.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.lock().is_empty()
    }

    /// Number of buffers written
    pub fn write_count(&self) -> usize {
        *self.writes.lock()
    }

    pub fn clear(&self) {
        self.samples.lock().clear();
        *self.writes.lock() = 0;
    }
}

/// Unpaced sink storing PCM in memory
pub struct MemorySink {
    tap: MemoryTap,
    sample_rate: u32,
    is_open: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::with_sample_rate(SUPPORTED_SAMPLE_RATES[0])
    }

    pub fn with_sample_rate(sample_rate: u32) -> Self {
        Self {
            tap: MemoryTap::default(),
            sample_rate,
            is_open: false,
        }
    }

    /// Handle for reading the captured samples
    pub fn tap(&self) -> MemoryTap {
        self.tap.clone()
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl Sink for MemorySink {
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
        self.tap.samples.lock().extend_from_slice(buffer);
        *self.tap.writes.lock() += 1;
        Ok(())
    }

    fn silence(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    fn system(&self) -> AudioSystem {
        AudioSystem::Null
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tap_sees_writes() {
        let mut sink = MemorySink::with_sample_rate(8000);
        let tap = sink.tap();

        assert_eq!(sink.open(None).unwrap(), 8000);
        sink.write(&[1, 2, 3]).unwrap();
        sink.write(&[4]).unwrap();

        assert_eq!(tap.samples(), vec![1, 2, 3, 4]);
        assert_eq!(tap.write_count(), 2);

        tap.clear();
        assert!(tap.is_empty());
    }
}
