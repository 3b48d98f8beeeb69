// Tone descriptor - the unit of work passed from producers to the synthesis thread

/// Shortest piece of audio the generator produces, in microseconds.
/// A forever tone is played one quantum at a time.
pub const QUANTUM_USECS: i64 = 100;

/// Amplitude envelope applied to a tone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Envelope {
    /// Constant amplitude (or silence) from first to last sample
    #[default]
    None,
    /// Envelope at the beginning only (straight key going down)
    RisingOnly,
    /// Envelope at the end only (straight key going up)
    FallingOnly,
    /// Envelope at both ends, plateau in between (dots and dashes)
    RisingAndFalling,
}

/// Immutable description of a tone to play.
///
/// `frequency == 0` is silence. Silent tones conventionally use
/// `Envelope::None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Tone {
    /// Frequency in Hz, 0 for silence
    pub frequency: i32,
    /// Duration in microseconds. For a forever tone this is the quantum.
    pub duration_us: i64,
    pub envelope: Envelope,
    /// Played until another tone is enqueued behind it
    pub is_forever: bool,
    /// First tone of a mark (the audible part of a dot or dash)
    pub is_first_in_mark: bool,
}

impl Tone {
    pub fn new(frequency: i32, duration_us: i64, envelope: Envelope) -> Self {
        Self {
            frequency,
            duration_us,
            envelope,
            is_forever: false,
            is_first_in_mark: false,
        }
    }

    /// Silent tone without envelope
    pub fn silence(duration_us: i64) -> Self {
        Self::new(0, duration_us, Envelope::None)
    }

    /// Tone played one quantum at a time until something else is queued
    pub fn forever(frequency: i32) -> Self {
        Self {
            frequency,
            duration_us: QUANTUM_USECS,
            envelope: Envelope::None,
            is_forever: true,
            is_first_in_mark: false,
        }
    }

    /// Mark this tone as the start of a dot or dash
    pub fn first_in_mark(mut self) -> Self {
        self.is_first_in_mark = true;
        self
    }

    pub fn is_silent(&self) -> bool {
        self.frequency == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_has_no_envelope() {
        let tone = Tone::silence(60_000);
        assert!(tone.is_silent());
        assert_eq!(tone.envelope, Envelope::None);
        assert!(!tone.is_forever);
    }

    #[test]
    fn test_forever_tone_uses_quantum() {
        let tone = Tone::forever(800);
        assert!(tone.is_forever);
        assert_eq!(tone.duration_us, QUANTUM_USECS);
        assert!(!tone.is_silent());
    }
}
