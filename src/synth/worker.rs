// Thread de synthèse - consomme la file de tons et écrit dans le sink
//
// The buffer is filled in sub-ranges: a tone may cover part of a buffer, or
// span several buffers. Only a full buffer goes to the sink. When the queue
// runs dry, the empty transition pads the partially filled buffer with
// silence so the last tone gets played.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use crate::audio::status::SinkStatus;
use crate::audio::{Sample, Sink};
use crate::error::SinkError;
use crate::synth::generator::GeneratorCore;
use crate::synth::oscillator::{SineOscillator, ToneExpansion};
use crate::synth::queue::DequeueOutcome;
use crate::synth::tone::Tone;

pub(crate) struct SynthesisWorker {
    core: Arc<GeneratorCore>,
    sink: Box<dyn Sink>,
    sample_rate: u32,
    buffer: Vec<Sample>,
    /// First free slot of `buffer`
    sub_start: usize,
    oscillator: SineOscillator,
    no_slope: Arc<[f32]>,
}

impl SynthesisWorker {
    pub(crate) fn new(
        core: Arc<GeneratorCore>,
        sink: Box<dyn Sink>,
        sample_rate: u32,
        buffer_len: usize,
    ) -> Self {
        Self {
            core,
            sink,
            sample_rate,
            buffer: vec![0; buffer_len],
            sub_start: 0,
            oscillator: SineOscillator::new(sample_rate),
            no_slope: Arc::from(Vec::new()),
        }
    }

    /// Give the sink back without running
    pub(crate) fn into_sink(self) -> Box<dyn Sink> {
        self.sink
    }

    /// Thread body. Returns the sink, closed, so the owner can reuse it.
    pub(crate) fn run(mut self) -> Box<dyn Sink> {
        tracing::debug!(
            sample_rate = self.sample_rate,
            buffer_len = self.buffer.len(),
            "synthesis thread started"
        );

        while self.core.running.load(Ordering::Acquire) {
            let tone = match self.core.queue.dequeue() {
                DequeueOutcome::StillEmpty => {
                    self.core.queue.wait_for_tone(&self.core.running);
                    continue;
                }
                DequeueOutcome::EmptyTransition => None,
                DequeueOutcome::Dequeued(tone) => Some(tone),
            };

            let key = self.core.key();
            if let Some(key) = &key {
                key.on_dequeue(tone.as_ref());
            }

            if let Err(e) = self.play(tone.as_ref()) {
                tracing::error!("Audio sink write failed: {}", e);
                self.core.status.set(SinkStatus::Failed);
                self.core.running.store(false, Ordering::Release);
                break;
            }

            if let Some(key) = &key {
                key.on_tone_elapsed();
            }
        }

        if let Err(e) = self.sink.silence() {
            tracing::warn!("Failed to silence sink: {}", e);
        }
        self.sink.close();
        if self.core.status.get() == SinkStatus::Open {
            self.core.status.set(SinkStatus::Closed);
        }
        tracing::debug!("synthesis thread exiting");

        self.sink
    }

    /// Render one tone (or the end-of-queue padding when `tone` is None)
    fn play(&mut self, tone: Option<&Tone>) -> Result<(), SinkError> {
        let buffer_len = self.buffer.len();

        let (mut expansion, table, volume) = match tone {
            Some(tone) => {
                let settings = self.core.settings.lock();
                let table = settings.slope.amplitudes();
                let expansion = ToneExpansion::from_tone(tone, self.sample_rate, table.len());
                (expansion, table, settings.volume_abs as f32)
            }
            None => {
                let padding = if self.sub_start > 0 {
                    buffer_len - self.sub_start
                } else {
                    0
                };
                (ToneExpansion::padding(padding), Arc::clone(&self.no_slope), 0.0)
            }
        };

        while expansion.remaining() > 0 {
            let free = buffer_len - self.sub_start;
            let count = usize::try_from(expansion.remaining()).map_or(free, |n| n.min(free));
            let sub_stop = self.sub_start + count;

            let written = self.oscillator.fill(
                &mut self.buffer[self.sub_start..sub_stop],
                &mut expansion,
                &table,
                volume,
            );
            assert_eq!(written, count, "oscillator wrote a wrong number of samples");

            if sub_stop == buffer_len {
                self.sink.write(&self.buffer)?;
                self.core.clock.advance(buffer_len);
                self.sub_start = 0;
            } else {
                self.sub_start = sub_stop;
            }
            assert!(self.sub_start < buffer_len, "buffer position out of range");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::memory::MemorySink;
    use crate::config::GeneratorConfig;
    use crate::synth::generator::Generator;
    use crate::synth::tone::Envelope;
    use std::time::{Duration, Instant};

    fn wait_for<F: Fn() -> bool>(condition: F) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "timed out");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_padding_completes_last_buffer() {
        let config = GeneratorConfig {
            buffer_len: 100,
            ..GeneratorConfig::default()
        };
        let sink = MemorySink::with_sample_rate(8000);
        let tap = sink.tap();
        let mut generator = Generator::with_sink(config, sink).unwrap();
        generator.start().unwrap();

        // 10 ms at 8 kHz is 80 samples: less than one buffer
        generator
            .enqueue_tone(Tone::new(1000, 10_000, Envelope::None))
            .unwrap();
        wait_for(|| tap.len() == 100);
        generator.stop();

        let samples = tap.samples();
        assert!(samples[..80].iter().any(|&s| s != 0));
        assert!(samples[80..].iter().all(|&s| s == 0));
        assert_eq!(tap.write_count(), 1);
    }

    #[test]
    fn test_long_tone_spans_buffers() {
        let config = GeneratorConfig {
            buffer_len: 64,
            ..GeneratorConfig::default()
        };
        let sink = MemorySink::with_sample_rate(8000);
        let tap = sink.tap();
        let mut generator = Generator::with_sink(config, sink).unwrap();
        generator.start().unwrap();

        // 100 ms at 8 kHz: 800 samples, 12 full buffers plus padding
        generator
            .enqueue_tone(Tone::new(500, 100_000, Envelope::RisingAndFalling))
            .unwrap();
        wait_for(|| tap.len() == 13 * 64);
        generator.stop();

        assert_eq!(generator.samples_written(), 13 * 64);
        assert_eq!(generator.sink_status(), SinkStatus::Closed);
    }
}
