// WAV sink - offline rendering of the generator output to a file
//
// Unlike a soundcard this sink does not block; a generator writing to it
// renders as fast as it can. The file is finalized on close.

use hound::{WavSpec, WavWriter};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use crate::audio::timing::SUPPORTED_SAMPLE_RATES;
use crate::audio::{AudioSystem, Sample, Sink};
use crate::error::SinkError;

/// Mono 16-bit PCM WAV writer
pub struct WavSink {
    path: Option<PathBuf>,
    sample_rate: u32,
    writer: Option<WavWriter<BufWriter<File>>>,
}

impl WavSink {
    /// Sink writing to the path given as device name on open
    pub fn new() -> Self {
        Self {
            path: None,
            sample_rate: SUPPORTED_SAMPLE_RATES[0],
            writer: None,
        }
    }

    /// Sink writing to `path` unless open() names another file
    pub fn with_path<P: AsRef<Path>>(path: P) -> Self {
        let mut sink = Self::new();
        sink.path = Some(path.as_ref().to_path_buf());
        sink
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn spec(&self) -> WavSpec {
        WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        }
    }
}

impl Default for WavSink {
    fn default() -> Self {
        Self::new()
    }
}

impl Sink for WavSink {
    fn open(&mut self, device: Option<&str>) -> Result<u32, SinkError> {
        if let Some(device) = device {
            self.path = Some(PathBuf::from(device));
        }
        let path = self
            .path
            .clone()
            .ok_or_else(|| SinkError::Open("no output file given for WAV sink".to_string()))?;

        let writer = WavWriter::create(&path, self.spec())?;
        self.writer = Some(writer);
        tracing::debug!(path = %path.display(), "WAV file created");

        Ok(self.sample_rate)
    }

    fn close(&mut self) {
        if let Some(writer) = self.writer.take()
            && let Err(e) = writer.finalize()
        {
            tracing::error!("Failed to finalize WAV file: {}", e);
        }
    }

    fn write(&mut self, buffer: &[Sample]) -> Result<(), SinkError> {
        let writer = self.writer.as_mut().ok_or(SinkError::NotOpen)?;
        for &sample in buffer {
            writer.write_sample(sample)?;
        }
        Ok(())
    }

    fn silence(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    fn system(&self) -> AudioSystem {
        AudioSystem::Wav
    }
}

impl Drop for WavSink {
    fn drop(&mut self) {
        self.close();
    }
}
