// Générateur - file de tons, thread de synthèse et API d'envoi Morse
//
// The Generator owns its tone queue and, while running, one synthesis thread
// that holds the sink. Producers (the caller, keyers) only touch the queue
// and the settings; the sample buffer, phase and expansion state belong to
// the synthesis thread.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::status::{AtomicSinkStatus, SinkStatus};
use crate::audio::system::{AudioSystem, open_sink};
use crate::audio::timing::{SUPPORTED_SAMPLE_RATES, SampleClock};
use crate::audio::Sink;
use crate::config::GeneratorConfig;
use crate::error::{EnqueueError, GeneratorError, ParameterError, QueueError};
use crate::keying::Key;
use crate::morse::alphabet;
use crate::morse::timing::{SendTimings, TimingSynchronizer, check_range};
use crate::synth::envelope::{SlopeShape, ToneSlope, VOLUME_RANGE};
use crate::synth::queue::ToneQueue;
use crate::synth::tone::{Envelope, QUANTUM_USECS, Tone};
use crate::synth::worker::SynthesisWorker;

pub const FREQUENCY_MIN: i32 = 0;
pub const FREQUENCY_MAX: i32 = 4000;
pub const FREQUENCY_DEFAULT: i32 = 800;

pub const VOLUME_MIN: i32 = 0;
pub const VOLUME_MAX: i32 = 100;
pub const VOLUME_DEFAULT: i32 = 70;

/// Parameters shared by producers and the synthesis thread
pub(crate) struct Settings {
    pub(crate) frequency: i32,
    pub(crate) volume_percent: i32,
    /// Volume as a sample amplitude, 0..=VOLUME_RANGE
    pub(crate) volume_abs: i32,
    pub(crate) sample_rate: u32,
    pub(crate) timing: TimingSynchronizer,
    pub(crate) slope: ToneSlope,
}

impl Settings {
    fn from_config(config: &GeneratorConfig) -> Result<Self, ParameterError> {
        check_range("frequency", config.frequency, FREQUENCY_MIN, FREQUENCY_MAX)?;
        check_range("volume", config.volume, VOLUME_MIN, VOLUME_MAX)?;

        let mut timing = TimingSynchronizer::new();
        timing.set_speed(config.speed)?;
        timing.set_gap(config.gap)?;
        timing.set_weighting(config.weighting)?;

        let sample_rate = SUPPORTED_SAMPLE_RATES[0];
        let volume_abs = volume_to_abs(config.volume);
        let slope = ToneSlope::new(
            config.slope_shape,
            config.slope_length_us,
            sample_rate,
            volume_abs,
        )?;

        Ok(Self {
            frequency: config.frequency,
            volume_percent: config.volume,
            volume_abs,
            sample_rate,
            timing,
            slope,
        })
    }
}

fn volume_to_abs(percent: i32) -> i32 {
    percent * VOLUME_RANGE / 100
}

/// State shared between the Generator handle, its synthesis thread and the
/// attached Key
pub(crate) struct GeneratorCore {
    pub(crate) queue: ToneQueue,
    pub(crate) settings: Mutex<Settings>,
    pub(crate) running: AtomicBool,
    pub(crate) status: AtomicSinkStatus,
    pub(crate) clock: SampleClock,
    active_system: Mutex<AudioSystem>,
    key: Mutex<Weak<Key>>,
}

impl GeneratorCore {
    /// Resynchronize timings if needed and read what an enqueue needs
    pub(crate) fn send_snapshot(&self) -> (SendTimings, i32) {
        let mut settings = self.settings.lock();
        let timings = settings.timing.sync();
        (timings, settings.frequency)
    }

    pub(crate) fn frequency(&self) -> i32 {
        self.settings.lock().frequency
    }

    pub(crate) fn slope_length_us(&self) -> i64 {
        self.settings.lock().slope.length_us()
    }

    pub(crate) fn audio_system(&self) -> AudioSystem {
        *self.active_system.lock()
    }

    pub(crate) fn key(&self) -> Option<Arc<Key>> {
        self.key.lock().upgrade()
    }

    pub(crate) fn attach_key(&self, key: &Arc<Key>) {
        *self.key.lock() = Arc::downgrade(key);
    }

    /// Bring the output to silence.
    ///
    /// Soundcard-like sinks get one quantum of silence through the queue
    /// and a little time to play it. The null sink has nothing to silence.
    pub(crate) fn silence(&self) {
        if !self.running.load(Ordering::Acquire) {
            return;
        }
        if self.audio_system().is_soundcard() {
            if let Err(e) = self.queue.enqueue(Tone::silence(QUANTUM_USECS)) {
                tracing::warn!("Failed to enqueue silence: {}", e);
            }
            thread::sleep(Duration::from_micros(2 * QUANTUM_USECS as u64));
        }
    }
}

/// Morse code tone generator
pub struct Generator {
    core: Arc<GeneratorCore>,
    audio_system: AudioSystem,
    device: Option<String>,
    buffer_len: usize,
    /// Sink injected by the caller, kept across stop/start
    custom_sink: Option<Box<dyn Sink>>,
    has_custom_sink: bool,
    worker: Option<JoinHandle<Option<Box<dyn Sink>>>>,
}

impl Generator {
    /// Create a stopped generator for the configured audio system
    pub fn new(config: GeneratorConfig) -> Result<Self, GeneratorError> {
        let settings = Settings::from_config(&config)?;
        let queue = ToneQueue::with_capacity(config.queue_capacity, config.queue_high_water_mark)?;
        if config.buffer_len == 0 {
            return Err(ParameterError::OutOfRange {
                parameter: "buffer_len",
                value: 0,
                min: 1,
                max: i64::MAX,
            }
            .into());
        }

        let core = GeneratorCore {
            queue,
            settings: Mutex::new(settings),
            running: AtomicBool::new(false),
            status: AtomicSinkStatus::default(),
            clock: SampleClock::new(),
            active_system: Mutex::new(config.audio_system),
            key: Mutex::new(Weak::new()),
        };

        Ok(Self {
            core: Arc::new(core),
            audio_system: config.audio_system,
            device: config.device,
            buffer_len: config.buffer_len,
            custom_sink: None,
            has_custom_sink: false,
            worker: None,
        })
    }

    /// Create a stopped generator writing to a caller-provided sink
    pub fn with_sink<S: Sink + 'static>(config: GeneratorConfig, sink: S) -> Result<Self, GeneratorError> {
        let mut generator = Self::new(config)?;
        *generator.core.active_system.lock() = sink.system();
        generator.custom_sink = Some(Box::new(sink));
        generator.has_custom_sink = true;
        Ok(generator)
    }

    pub(crate) fn core(&self) -> &Arc<GeneratorCore> {
        &self.core
    }

    /// Open the sink and spawn the synthesis thread
    pub fn start(&mut self) -> Result<(), GeneratorError> {
        if self.worker.is_some() {
            return Err(GeneratorError::AlreadyRunning);
        }

        let device = self.device.as_deref();
        let (sink, sample_rate) = match self.custom_sink.take() {
            Some(mut sink) => match sink.open(device) {
                Ok(sample_rate) => (sink, sample_rate),
                Err(e) => {
                    self.custom_sink = Some(sink);
                    return Err(GeneratorError::StartFailed(e.to_string()));
                }
            },
            None => open_sink(self.audio_system, device)
                .map_err(|e| GeneratorError::StartFailed(e.to_string()))?,
        };

        let resampled = {
            let mut settings = self.core.settings.lock();
            if settings.sample_rate == sample_rate {
                Ok(())
            } else {
                let volume_abs = settings.volume_abs;
                let result = settings.slope.recompute(sample_rate, volume_abs);
                if result.is_ok() {
                    settings.sample_rate = sample_rate;
                }
                result
            }
        };
        if let Err(e) = resampled {
            self.release_sink(sink);
            return Err(e.into());
        }
        *self.core.active_system.lock() = sink.system();

        self.core.running.store(true, Ordering::Release);
        self.core.status.set(SinkStatus::Open);

        // The worker goes through a slot so a failed spawn can hand the sink back
        let worker = SynthesisWorker::new(Arc::clone(&self.core), sink, sample_rate, self.buffer_len);
        let pending = Arc::new(Mutex::new(Some(worker)));
        let handoff = Arc::clone(&pending);
        let spawned = thread::Builder::new()
            .name("cw-generator".to_string())
            .spawn(move || handoff.lock().take().map(SynthesisWorker::run));

        match spawned {
            Ok(handle) => {
                self.worker = Some(handle);
                tracing::info!(
                    sink = self.core.audio_system().label(),
                    sample_rate,
                    "generator started"
                );
                Ok(())
            }
            Err(e) => {
                self.core.running.store(false, Ordering::Release);
                self.core.status.set(SinkStatus::Closed);
                if let Some(worker) = pending.lock().take() {
                    self.release_sink(worker.into_sink());
                }
                Err(GeneratorError::StartFailed(e.to_string()))
            }
        }
    }

    /// Close a sink that will not be played, keeping an injected one for
    /// the next start
    fn release_sink(&mut self, mut sink: Box<dyn Sink>) {
        sink.close();
        if self.has_custom_sink {
            self.custom_sink = Some(sink);
        }
    }

    /// Stop the synthesis thread: flush, silence, clear the run flag, wake,
    /// join. Does nothing on a stopped generator.
    pub fn stop(&mut self) {
        let Some(handle) = self.worker.take() else {
            return;
        };

        self.core.queue.flush();
        self.core.silence();
        self.core.running.store(false, Ordering::Release);
        self.core.queue.wake_consumer();

        match handle.join() {
            Ok(Some(sink)) => {
                if self.has_custom_sink {
                    self.custom_sink = Some(sink);
                }
            }
            Ok(None) => {}
            Err(_) => {
                tracing::error!("synthesis thread panicked");
                self.core.status.set(SinkStatus::Failed);
            }
        }
        tracing::info!("generator stopped");
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some() && self.core.running.load(Ordering::Acquire)
    }

    pub fn sink_status(&self) -> SinkStatus {
        self.core.status.get()
    }

    /// Audio system of the open sink (or the requested one before start)
    pub fn audio_system(&self) -> AudioSystem {
        self.core.audio_system()
    }

    pub fn sample_rate(&self) -> u32 {
        self.core.settings.lock().sample_rate
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer_len
    }

    /// Samples written to the sink since creation
    pub fn samples_written(&self) -> u64 {
        self.core.clock.samples_written()
    }

    // ---- Parameters ----

    pub fn set_speed(&self, speed: i32) -> Result<(), ParameterError> {
        self.core.settings.lock().timing.set_speed(speed)
    }

    pub fn set_gap(&self, gap: i32) -> Result<(), ParameterError> {
        self.core.settings.lock().timing.set_gap(gap)
    }

    pub fn set_weighting(&self, weighting: i32) -> Result<(), ParameterError> {
        self.core.settings.lock().timing.set_weighting(weighting)
    }

    pub fn set_frequency(&self, frequency: i32) -> Result<(), ParameterError> {
        check_range("frequency", frequency, FREQUENCY_MIN, FREQUENCY_MAX)?;
        self.core.settings.lock().frequency = frequency;
        tracing::debug!(frequency, "frequency changed");
        Ok(())
    }

    /// Set volume in percent; rebuilds the slope table
    pub fn set_volume(&self, volume: i32) -> Result<(), ParameterError> {
        check_range("volume", volume, VOLUME_MIN, VOLUME_MAX)?;

        let mut settings = self.core.settings.lock();
        let volume_abs = volume_to_abs(volume);
        let sample_rate = settings.sample_rate;
        settings.slope.recompute(sample_rate, volume_abs)?;
        settings.volume_percent = volume;
        settings.volume_abs = volume_abs;
        tracing::debug!(volume, "volume changed");
        Ok(())
    }

    /// Change slope shape and/or length; `None` keeps the current value
    pub fn set_envelope(
        &self,
        shape: Option<SlopeShape>,
        length_us: Option<i64>,
    ) -> Result<(), ParameterError> {
        let mut settings = self.core.settings.lock();
        let sample_rate = settings.sample_rate;
        let volume_abs = settings.volume_abs;
        settings.slope.configure(shape, length_us, sample_rate, volume_abs)
    }

    pub fn speed(&self) -> i32 {
        self.core.settings.lock().timing.speed()
    }

    pub fn gap(&self) -> i32 {
        self.core.settings.lock().timing.gap()
    }

    pub fn weighting(&self) -> i32 {
        self.core.settings.lock().timing.weighting()
    }

    pub fn frequency(&self) -> i32 {
        self.core.frequency()
    }

    pub fn volume(&self) -> i32 {
        self.core.settings.lock().volume_percent
    }

    pub fn slope_shape(&self) -> SlopeShape {
        self.core.settings.lock().slope.shape()
    }

    pub fn slope_length_us(&self) -> i64 {
        self.core.slope_length_us()
    }

    /// Current timings, resynchronized if a parameter changed
    pub fn timings(&self) -> SendTimings {
        self.core.send_snapshot().0
    }

    // ---- Queue access ----

    pub fn queue(&self) -> &ToneQueue {
        &self.core.queue
    }

    /// Enqueue a raw tone
    pub fn enqueue_tone(&self, tone: Tone) -> Result<(), QueueError> {
        self.core.queue.enqueue(tone)
    }

    /// Wait for the tone being played to finish
    pub fn wait_for_tone(&self) {
        self.core.queue.wait_for_any_dequeue();
    }

    pub fn wait_for_queue_drained(&self) {
        self.core.queue.wait_until_len_at_most(0);
    }

    pub fn wait_for_queue_level(&self, level: usize) {
        self.core.queue.wait_until_len_at_most(level);
    }

    pub fn flush_queue(&self) {
        self.core.queue.flush();
    }

    pub fn register_low_water_callback<F>(&self, callback: F, level: usize) -> Result<(), QueueError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.core.queue.register_low_water_callback(callback, level)
    }

    /// Silence the output (see `GeneratorCore::silence`)
    pub fn silence(&self) {
        self.core.silence();
    }

    // ---- Morse enqueue API ----

    /// Enqueue a dot ('.') or dash ('-') followed by the inter-mark space
    pub fn enqueue_mark(&self, symbol: char) -> Result<(), EnqueueError> {
        self.check_key_idle()?;
        self.check_not_nearly_full()?;
        let (timings, frequency) = self.core.send_snapshot();
        self.push_mark(symbol, &timings, frequency)
    }

    /// Enqueue the space completing an inter-character gap
    pub fn enqueue_inter_character_space(&self) -> Result<(), EnqueueError> {
        self.check_key_idle()?;
        let (timings, _) = self.core.send_snapshot();
        self.push_character_space(&timings)
    }

    /// Enqueue the space completing an inter-word gap (two silent tones)
    pub fn enqueue_inter_word_space(&self) -> Result<(), EnqueueError> {
        self.check_key_idle()?;
        let (timings, _) = self.core.send_snapshot();
        self.push_word_space(&timings)
    }

    /// Enqueue a dot/dash string followed by the inter-character space
    pub fn enqueue_representation(&self, representation: &str) -> Result<(), EnqueueError> {
        self.check_key_idle()?;
        self.push_representation(representation, false)
    }

    /// Enqueue a dot/dash string without the trailing inter-character space
    pub fn enqueue_representation_partial(&self, representation: &str) -> Result<(), EnqueueError> {
        self.check_key_idle()?;
        self.push_representation(representation, true)
    }

    /// Enqueue a character and the inter-character space. A space enqueues
    /// an inter-word space.
    pub fn enqueue_character(&self, c: char) -> Result<(), EnqueueError> {
        self.check_key_idle()?;
        self.push_character(c, false)
    }

    /// Enqueue a character without the trailing inter-character space, for
    /// building combined signals
    pub fn enqueue_character_partial(&self, c: char) -> Result<(), EnqueueError> {
        self.check_key_idle()?;
        self.push_character(c, true)
    }

    /// Enqueue a whole string. Nothing is enqueued if any character has no
    /// Morse representation.
    pub fn enqueue_string(&self, text: &str) -> Result<(), EnqueueError> {
        self.check_key_idle()?;
        if let Some(bad) = text.chars().find(|&c| c != ' ' && !alphabet::is_valid_character(c)) {
            return Err(EnqueueError::UnknownCharacter(bad));
        }
        for c in text.chars() {
            self.push_character(c, false)?;
        }
        Ok(())
    }

    fn check_key_idle(&self) -> Result<(), EnqueueError> {
        match self.core.key() {
            Some(key) if key.is_busy() => Err(EnqueueError::SinkBusy),
            _ => Ok(()),
        }
    }

    fn check_not_nearly_full(&self) -> Result<(), EnqueueError> {
        if self.core.queue.is_nearly_full() {
            return Err(EnqueueError::QueueNearlyFull);
        }
        Ok(())
    }

    fn push_mark(&self, symbol: char, timings: &SendTimings, frequency: i32) -> Result<(), EnqueueError> {
        let duration = match symbol {
            '.' => timings.dot_len,
            '-' => timings.dash_len,
            other => return Err(EnqueueError::InvalidRepresentation(other.to_string())),
        };

        let queue = &self.core.queue;
        queue.enqueue(Tone::new(frequency, duration, Envelope::RisingAndFalling).first_in_mark())?;
        queue.enqueue(Tone::silence(timings.eom_space))?;
        Ok(())
    }

    fn push_character_space(&self, timings: &SendTimings) -> Result<(), EnqueueError> {
        self.core
            .queue
            .enqueue(Tone::silence(timings.eoc_space + timings.additional_space))?;
        Ok(())
    }

    fn push_word_space(&self, timings: &SendTimings) -> Result<(), EnqueueError> {
        // Always two tones, so a low-water level of 1 sees the space in flight
        let (first, second) = if timings.adjustment_space > 0 {
            (timings.eow_space, timings.adjustment_space)
        } else {
            let half = timings.eow_space / 2;
            (half, timings.eow_space - half)
        };

        let queue = &self.core.queue;
        queue.enqueue(Tone::silence(first))?;
        queue.enqueue(Tone::silence(second))?;
        Ok(())
    }

    fn push_representation(&self, representation: &str, partial: bool) -> Result<(), EnqueueError> {
        if !alphabet::is_valid_representation(representation) {
            return Err(EnqueueError::InvalidRepresentation(representation.to_string()));
        }
        self.check_not_nearly_full()?;

        let (timings, frequency) = self.core.send_snapshot();
        for symbol in representation.chars() {
            self.push_mark(symbol, &timings, frequency)?;
        }
        if !partial {
            self.push_character_space(&timings)?;
        }
        Ok(())
    }

    fn push_character(&self, c: char, partial: bool) -> Result<(), EnqueueError> {
        if c == ' ' {
            self.check_not_nearly_full()?;
            let (timings, _) = self.core.send_snapshot();
            return self.push_word_space(&timings);
        }
        let representation = alphabet::lookup(c).ok_or(EnqueueError::UnknownCharacter(c))?;
        self.push_representation(representation, partial)
    }
}

impl Drop for Generator {
    fn drop(&mut self) {
        self.stop();
    }
}
