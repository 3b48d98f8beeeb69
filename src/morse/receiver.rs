// Récepteur Morse - durées des marques et des espaces vers caractères
//
// Timestamps are microseconds on any clock that never goes back; the
// logical clock of a Key is one. A mark is classified as a dot or a dash
// by its length, the space after it as inter-mark, end of character or end
// of word. In adaptive mode the dot/dash boundary follows the incoming
// speed through moving averages of the last few dots and dashes.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::error::ReceiveError;
use crate::keying::{Key, KeyState};
use crate::morse::alphabet;
use crate::morse::timing::{
    DOT_CALIBRATION, GAP_DEFAULT, GAP_MAX, GAP_MIN, SPEED_DEFAULT, SPEED_MAX, SPEED_MIN,
    check_range,
};

pub const TOLERANCE_MIN: i32 = 0;
pub const TOLERANCE_MAX: i32 = 90;
pub const TOLERANCE_DEFAULT: i32 = 50;

/// Half a dot at the highest speed
pub const NOISE_SPIKE_THRESHOLD_DEFAULT: i64 = DOT_CALIBRATION / SPEED_MAX as i64 / 2;

/// Marks held in the representation buffer
pub const BUFFER_CAPACITY: usize = 256;

const STATISTICS_CAPACITY: usize = 256;
const AVERAGING_LEN: usize = 4;

/// State of the receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReceiverState {
    #[default]
    Idle,
    Mark,
    /// Between two marks of one character
    Space,
    EndOfCharacter,
    EndOfWord,
    EndOfCharacterError,
    EndOfWordError,
}

impl ReceiverState {
    pub fn is_error(self) -> bool {
        matches!(
            self,
            ReceiverState::EndOfCharacterError | ReceiverState::EndOfWordError
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
    Dot,
    Dash,
}

impl Mark {
    pub fn symbol(self) -> char {
        match self {
            Mark::Dot => '.',
            Mark::Dash => '-',
        }
    }
}

/// A complete representation taken out of the receiver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedRepresentation {
    pub representation: String,
    pub is_end_of_word: bool,
    /// A mark of the character could not be classified
    pub is_error: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceivedCharacter {
    pub character: char,
    pub is_end_of_word: bool,
    pub is_error: bool,
}

/// Length ranges used to classify marks and spaces (µs)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReceiveTimings {
    pub dot_ideal: i64,
    pub dot_min: i64,
    pub dot_max: i64,
    pub dash_ideal: i64,
    pub dash_min: i64,
    pub dash_max: i64,
    pub eom_ideal: i64,
    pub eom_min: i64,
    pub eom_max: i64,
    pub eoc_ideal: i64,
    pub eoc_min: i64,
    pub eoc_max: i64,
    /// Dot/dash boundary, two dots long
    pub adaptive_threshold: i64,
}

/// Root mean square deviation of received lengths from the ideal ones
/// (µs); 0.0 when nothing of that kind was received
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ReceiveStatistics {
    pub dot: f64,
    pub dash: f64,
    pub inter_mark_space: f64,
    pub inter_character_space: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatKind {
    Dot,
    Dash,
    InterMarkSpace,
    InterCharacterSpace,
}

#[derive(Debug, Clone, Copy)]
struct MovingAverage {
    samples: [i64; AVERAGING_LEN],
    cursor: usize,
    sum: i64,
    average: i64,
}

impl MovingAverage {
    fn new(initial: i64) -> Self {
        Self {
            samples: [initial; AVERAGING_LEN],
            cursor: 0,
            sum: initial * AVERAGING_LEN as i64,
            average: initial,
        }
    }

    fn push(&mut self, len: i64) {
        self.sum += len - self.samples[self.cursor];
        self.samples[self.cursor] = len;
        self.cursor = (self.cursor + 1) % AVERAGING_LEN;
        self.average = self.sum / AVERAGING_LEN as i64;
    }
}

/// Morse receiver
pub struct Receiver {
    state: ReceiverState,
    /// Fractional so that adaptive tracking moves smoothly at low speeds
    speed: f32,
    tolerance: i32,
    gap: i32,
    adaptive: bool,
    noise_spike_threshold: i64,
    adaptive_threshold: i64,
    mark_start: i64,
    mark_end: i64,
    representation: String,
    timings: ReceiveTimings,
    dirty: bool,
    /// (kind, actual - ideal) of the most recent marks and spaces
    statistics: VecDeque<(StatKind, i64)>,
    dot_average: MovingAverage,
    dash_average: MovingAverage,
}

impl Receiver {
    pub fn new() -> Self {
        let unit = DOT_CALIBRATION / i64::from(SPEED_DEFAULT);
        let mut receiver = Self {
            state: ReceiverState::Idle,
            speed: SPEED_DEFAULT as f32,
            tolerance: TOLERANCE_DEFAULT,
            gap: GAP_DEFAULT,
            adaptive: false,
            noise_spike_threshold: NOISE_SPIKE_THRESHOLD_DEFAULT,
            adaptive_threshold: 2 * unit,
            mark_start: 0,
            mark_end: 0,
            representation: String::with_capacity(BUFFER_CAPACITY),
            timings: ReceiveTimings::default(),
            dirty: true,
            statistics: VecDeque::with_capacity(STATISTICS_CAPACITY),
            dot_average: MovingAverage::new(unit),
            dash_average: MovingAverage::new(3 * unit),
        };
        receiver.sync();
        receiver
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }

    // ---- Parameters ----

    /// Set the fixed receive speed (WPM).
    ///
    /// Refused while adaptive tracking owns the speed. Changes of less
    /// than half a WPM are ignored.
    pub fn set_speed(&mut self, speed: i32) -> Result<(), ReceiveError> {
        if self.adaptive {
            return Err(ReceiveError::AdaptiveMode);
        }
        check_range("receive speed", speed, SPEED_MIN, SPEED_MAX)?;
        if (speed as f32 - self.speed).abs() >= 0.5 {
            self.speed = speed as f32;
            self.dirty = true;
        }
        Ok(())
    }

    /// Receive speed, measured when adaptive tracking is on
    pub fn speed(&mut self) -> f32 {
        self.sync();
        self.speed
    }

    /// Accepted deviation of marks from their ideal length, in percent
    /// of a dot
    pub fn set_tolerance(&mut self, tolerance: i32) -> Result<(), ReceiveError> {
        check_range("tolerance", tolerance, TOLERANCE_MIN, TOLERANCE_MAX)?;
        if tolerance != self.tolerance {
            self.tolerance = tolerance;
            self.dirty = true;
        }
        Ok(())
    }

    pub fn tolerance(&self) -> i32 {
        self.tolerance
    }

    /// Extra inter-character space expected from a Farnsworth sender
    pub fn set_gap(&mut self, gap: i32) -> Result<(), ReceiveError> {
        check_range("gap", gap, GAP_MIN, GAP_MAX)?;
        if gap != self.gap {
            self.gap = gap;
            self.dirty = true;
        }
        Ok(())
    }

    pub fn gap(&self) -> i32 {
        self.gap
    }

    /// Marks this short or shorter are ignored; 0 turns the filter off
    pub fn set_noise_spike_threshold(&mut self, threshold_us: i64) -> Result<(), ReceiveError> {
        if threshold_us < 0 {
            return Err(ReceiveError::Parameter(
                crate::error::ParameterError::OutOfRange {
                    parameter: "noise spike threshold",
                    value: threshold_us,
                    min: 0,
                    max: i64::MAX,
                },
            ));
        }
        self.noise_spike_threshold = threshold_us;
        Ok(())
    }

    pub fn noise_spike_threshold(&self) -> i64 {
        self.noise_spike_threshold
    }

    /// Switch adaptive speed tracking on or off.
    ///
    /// Turning it on seeds the averages with the current ideal lengths.
    pub fn set_adaptive(&mut self, adaptive: bool) {
        if adaptive == self.adaptive {
            return;
        }
        self.adaptive = adaptive;
        self.dirty = true;
        self.sync();
        if adaptive {
            self.dot_average = MovingAverage::new(self.timings.dot_ideal);
            self.dash_average = MovingAverage::new(self.timings.dash_ideal);
        }
        tracing::debug!(adaptive, speed = self.speed, "receiver tracking mode");
    }

    pub fn is_adaptive(&self) -> bool {
        self.adaptive
    }

    pub fn timings(&mut self) -> ReceiveTimings {
        self.sync();
        self.timings
    }

    /// Back to the initial speed, tolerance, tracking mode and noise
    /// threshold
    pub fn reset_parameters(&mut self) {
        self.speed = SPEED_DEFAULT as f32;
        self.tolerance = TOLERANCE_DEFAULT;
        self.adaptive = false;
        self.noise_spike_threshold = NOISE_SPIKE_THRESHOLD_DEFAULT;
        self.dirty = true;
    }

    fn sync(&mut self) {
        if !self.dirty {
            return;
        }

        // The threshold is always two dots
        if self.adaptive {
            self.speed = DOT_CALIBRATION as f32 / (self.adaptive_threshold.max(2) as f32 / 2.0);
        }
        let unit = (DOT_CALIBRATION as f32 / self.speed) as i64;
        if !self.adaptive {
            self.adaptive_threshold = 2 * unit;
        }

        let additional = i64::from(self.gap) * unit;
        let adjustment = (7 * additional) / 3;

        let mut t = ReceiveTimings {
            dot_ideal: unit,
            dash_ideal: 3 * unit,
            eom_ideal: unit,
            eoc_ideal: 3 * unit,
            adaptive_threshold: self.adaptive_threshold,
            ..ReceiveTimings::default()
        };

        if self.adaptive {
            t.dot_min = 0;
            t.dot_max = 2 * unit;
            t.dash_min = t.dot_max;
            t.dash_max = i64::MAX;
            t.eom_min = t.dot_min;
            t.eom_max = t.dot_max;
            t.eoc_min = t.eom_max;
            t.eoc_max = 5 * unit;
        } else {
            let tolerance = unit * i64::from(self.tolerance) / 100;
            t.dot_min = unit - tolerance;
            t.dot_max = unit + tolerance;
            t.dash_min = 3 * unit - tolerance;
            t.dash_max = 3 * unit + tolerance;
            t.eom_min = t.dot_min;
            t.eom_max = t.dot_max;
            t.eoc_min = t.dash_min;
            t.eoc_max = t.dash_max + additional + adjustment;
        }

        self.timings = t;
        self.dirty = false;
        tracing::debug!(
            speed = self.speed,
            dot_min = t.dot_min,
            dot_max = t.dot_max,
            dash_min = t.dash_min,
            eoc_max = t.eoc_max,
            threshold = t.adaptive_threshold,
            "receive timings resynchronized"
        );
    }

    // ---- Marks ----

    /// Key down at `at_us`
    pub fn mark_begin(&mut self, at_us: i64) -> Result<(), ReceiveError> {
        if !matches!(self.state, ReceiverState::Idle | ReceiverState::Space) {
            return Err(ReceiveError::InvalidState(self.state));
        }
        let in_character = self.state == ReceiverState::Space;
        if at_us < 0 || (in_character && at_us < self.mark_end) {
            return Err(ReceiveError::InvalidTimestamp(at_us));
        }

        if in_character {
            self.record(StatKind::InterMarkSpace, at_us - self.mark_end);
        }
        self.mark_start = at_us;
        self.state = ReceiverState::Mark;
        Ok(())
    }

    /// Key up at `at_us`: classify the mark and add it to the buffer.
    ///
    /// A mark not longer than the noise threshold is dropped and the
    /// receiver goes back to where it was before `mark_begin`.
    pub fn mark_end(&mut self, at_us: i64) -> Result<Mark, ReceiveError> {
        if self.state != ReceiverState::Mark {
            return Err(ReceiveError::InvalidState(self.state));
        }
        if at_us < self.mark_start {
            return Err(ReceiveError::InvalidTimestamp(at_us));
        }

        let len = at_us - self.mark_start;
        if self.noise_spike_threshold > 0 && len <= self.noise_spike_threshold {
            self.state = if self.representation.is_empty() {
                ReceiverState::Idle
            } else {
                ReceiverState::Space
            };
            tracing::trace!(len, threshold = self.noise_spike_threshold, "noise spike");
            return Err(ReceiveError::NoiseSpike(len));
        }

        self.mark_end = at_us;
        let mark = self.identify(len)?;

        if self.adaptive {
            self.update_averages(len, mark);
        }
        // After the averages: the ideals have moved towards this mark
        let kind = match mark {
            Mark::Dot => StatKind::Dot,
            Mark::Dash => StatKind::Dash,
        };
        self.record(kind, len);

        self.push(mark)?;
        Ok(mark)
    }

    /// Add a mark already classified by the caller, ending at `at_us`
    pub fn add_mark(&mut self, at_us: i64, mark: Mark) -> Result<(), ReceiveError> {
        if !matches!(self.state, ReceiverState::Idle | ReceiverState::Space) {
            return Err(ReceiveError::InvalidState(self.state));
        }
        if at_us < 0 || (self.state == ReceiverState::Space && at_us < self.mark_end) {
            return Err(ReceiveError::InvalidTimestamp(at_us));
        }
        self.mark_end = at_us;
        self.push(mark)
    }

    fn identify(&mut self, len: i64) -> Result<Mark, ReceiveError> {
        self.sync();
        let t = &self.timings;
        if (t.dot_min..=t.dot_max).contains(&len) {
            return Ok(Mark::Dot);
        }
        if (t.dash_min..=t.dash_max).contains(&len) {
            return Ok(Mark::Dash);
        }

        self.state = if len > t.eoc_max {
            ReceiverState::EndOfWordError
        } else {
            ReceiverState::EndOfCharacterError
        };
        tracing::debug!(
            len,
            dot_min = t.dot_min,
            dot_max = t.dot_max,
            dash_min = t.dash_min,
            dash_max = t.dash_max,
            "unrecognized mark"
        );
        Err(ReceiveError::UnrecognizedMark(len))
    }

    fn update_averages(&mut self, len: i64, mark: Mark) {
        match mark {
            Mark::Dot => self.dot_average.push(len),
            Mark::Dash => self.dash_average.push(len),
        }
        let dot = self.dot_average.average;
        let dash = self.dash_average.average;
        self.adaptive_threshold = (dash - dot) / 2 + dot;
        self.dirty = true;
        self.sync();

        let (min, max) = (SPEED_MIN as f32, SPEED_MAX as f32);
        if self.speed < min || self.speed > max {
            let clamped = self.speed.clamp(min, max);
            self.adaptive_threshold = 2 * (DOT_CALIBRATION as f32 / clamped) as i64;
            self.dirty = true;
            self.sync();
        }
    }

    fn push(&mut self, mark: Mark) -> Result<(), ReceiveError> {
        self.representation.push(mark.symbol());
        if self.representation.len() >= BUFFER_CAPACITY {
            self.state = ReceiverState::EndOfCharacterError;
            tracing::warn!("receiver representation buffer is full");
            return Err(ReceiveError::BufferFull);
        }
        self.state = ReceiverState::Space;
        Ok(())
    }

    // ---- Polling ----

    /// Take the representation if the space since the last mark, measured
    /// at `at_us`, ends a character or a word.
    ///
    /// `NotReady` while the space is still an inter-mark space. Once a
    /// word end is seen the result no longer changes until the buffer is
    /// cleared.
    pub fn poll_representation(&mut self, at_us: i64) -> Result<ReceivedRepresentation, ReceiveError> {
        match self.state {
            ReceiverState::EndOfWord | ReceiverState::EndOfWordError => {
                return Ok(self.received(true));
            }
            ReceiverState::Idle | ReceiverState::Mark => {
                return Err(ReceiveError::InvalidState(self.state));
            }
            _ => {}
        }
        if at_us < self.mark_end {
            return Err(ReceiveError::InvalidTimestamp(at_us));
        }

        let space = at_us - self.mark_end;
        self.sync();
        let t = self.timings;

        if space < t.eoc_min {
            return Err(ReceiveError::NotReady);
        }

        if space <= t.eoc_max {
            if self.state == ReceiverState::Space {
                self.record(StatKind::InterCharacterSpace, space);
                self.state = ReceiverState::EndOfCharacter;
            }
            return Ok(self.received(false));
        }

        self.state = if self.state == ReceiverState::EndOfCharacterError {
            ReceiverState::EndOfWordError
        } else {
            ReceiverState::EndOfWord
        };
        Ok(self.received(true))
    }

    /// Like `poll_representation`, translated to a character
    pub fn poll_character(&mut self, at_us: i64) -> Result<ReceivedCharacter, ReceiveError> {
        let received = self.poll_representation(at_us)?;
        let character = alphabet::reverse_lookup(&received.representation)
            .ok_or(ReceiveError::UnknownRepresentation(received.representation))?;
        Ok(ReceivedCharacter {
            character,
            is_end_of_word: received.is_end_of_word,
            is_error: received.is_error,
        })
    }

    /// Decode the character pending at `at_us` and clear the buffer.
    ///
    /// Returns None while the character is still being sent, and also when
    /// it cannot be decoded; an undecodable character is discarded.
    pub fn finish_character(&mut self, at_us: i64) -> Option<ReceivedCharacter> {
        if matches!(self.state, ReceiverState::Idle | ReceiverState::Mark) {
            return None;
        }
        match self.poll_character(at_us) {
            Ok(character) => {
                self.clear_buffer();
                Some(character)
            }
            Err(ReceiveError::NotReady) => None,
            Err(e) => {
                tracing::debug!("receiver dropped a character: {}", e);
                if self.state != ReceiverState::Space {
                    self.clear_buffer();
                }
                None
            }
        }
    }

    /// Feed one key transition. A key down that follows a complete
    /// character returns that character.
    pub fn handle_key_event(&mut self, state: KeyState, at_us: i64) -> Option<ReceivedCharacter> {
        match state {
            KeyState::Closed => {
                let decoded = self.finish_character(at_us);
                if let Err(e) = self.mark_begin(at_us) {
                    tracing::debug!("receiver ignored key down: {}", e);
                }
                decoded
            }
            KeyState::Open => {
                if let Err(e) = self.mark_end(at_us) {
                    tracing::debug!("receiver ignored key up: {}", e);
                }
                None
            }
        }
    }

    fn received(&self, is_end_of_word: bool) -> ReceivedRepresentation {
        ReceivedRepresentation {
            representation: self.representation.clone(),
            is_end_of_word,
            is_error: self.state.is_error(),
        }
    }

    /// Empty the representation buffer, ready for the next character
    pub fn clear_buffer(&mut self) {
        self.representation.clear();
        self.state = ReceiverState::Idle;
    }

    /// Marks in the representation buffer
    pub fn buffer_len(&self) -> usize {
        self.representation.len()
    }

    /// Clear the buffer and the statistics
    pub fn reset(&mut self) {
        self.clear_buffer();
        self.reset_statistics();
    }

    // ---- Statistics ----

    fn record(&mut self, kind: StatKind, len: i64) {
        self.sync();
        let ideal = match kind {
            StatKind::Dot => self.timings.dot_ideal,
            StatKind::Dash => self.timings.dash_ideal,
            StatKind::InterMarkSpace => self.timings.eom_ideal,
            StatKind::InterCharacterSpace => self.timings.eoc_ideal,
        };
        if self.statistics.len() == STATISTICS_CAPACITY {
            self.statistics.pop_front();
        }
        self.statistics.push_back((kind, len - ideal));
    }

    fn deviation(&self, kind: StatKind) -> f64 {
        let (sum, count) = self
            .statistics
            .iter()
            .filter(|(k, _)| *k == kind)
            .fold((0.0, 0usize), |(sum, count), &(_, delta)| {
                let delta = delta as f64;
                (sum + delta * delta, count + 1)
            });
        if count == 0 {
            0.0
        } else {
            (sum / count as f64).sqrt()
        }
    }

    pub fn statistics(&self) -> ReceiveStatistics {
        ReceiveStatistics {
            dot: self.deviation(StatKind::Dot),
            dash: self.deviation(StatKind::Dash),
            inter_mark_space: self.deviation(StatKind::InterMarkSpace),
            inter_character_space: self.deviation(StatKind::InterCharacterSpace),
        }
    }

    pub fn reset_statistics(&mut self) {
        self.statistics.clear();
    }
}

impl Default for Receiver {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode everything `key` sends into `receiver`.
///
/// Replaces the key's keying callback. `on_character` runs on the
/// synthesis thread, once per character, when the next character starts.
/// The last character sent must be collected with `finish_character` at
/// the key's current logical time.
pub fn listen<F>(receiver: &Arc<Mutex<Receiver>>, key: &Key, on_character: F)
where
    F: Fn(ReceivedCharacter) + Send + Sync + 'static,
{
    let receiver = Arc::clone(receiver);
    key.register_keying_callback(move |state, at_us| {
        let decoded = receiver.lock().handle_key_event(state, at_us);
        if let Some(character) = decoded {
            on_character(character);
        }
    });
}
