// Pioche (straight key)
//
// Key down starts a rising edge followed by a forever tone, which plays
// until key up enqueues the falling edge behind it.

use parking_lot::Mutex;

use crate::audio::system::AudioSystem;
use crate::error::KeyerError;
use crate::keying::{Key, KeyState};
use crate::synth::tone::{Envelope, QUANTUM_USECS, Tone};

pub(crate) struct StraightKey {
    state: Mutex<KeyState>,
}

impl StraightKey {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(KeyState::Open),
        }
    }
}

/// Straight key API
impl Key {
    /// Report a straight key event. An unchanged state does nothing.
    pub fn notify_straight_key(&self, state: KeyState) -> Result<(), KeyerError> {
        let mut current = self.straight.state.lock();
        if *current == state {
            return Ok(());
        }
        *current = state;
        tracing::debug!(?state, "straight key");

        let core = self.core();
        let frequency = core.frequency();
        let slope_us = core.slope_length_us();
        let queue = &core.queue;

        match state {
            KeyState::Closed => {
                queue.enqueue(Tone::new(frequency, slope_us, Envelope::RisingOnly))?;
                queue.enqueue(Tone::forever(frequency))?;
            }
            KeyState::Open if core.audio_system() == AudioSystem::Console => {
                queue.enqueue(Tone::silence(QUANTUM_USECS))?;
            }
            KeyState::Open => {
                queue.enqueue(Tone::new(frequency, slope_us, Envelope::FallingOnly))?;
                queue.enqueue(Tone::forever(0))?;
            }
        }
        Ok(())
    }

    pub fn straight_key_state(&self) -> KeyState {
        *self.straight.state.lock()
    }

    /// True while the straight key is down
    pub fn is_straight_key_busy(&self) -> bool {
        self.straight_key_state().is_closed()
    }

    /// Force the straight key up and silence the generator
    pub fn reset_straight_key(&self) {
        *self.straight.state.lock() = KeyState::Open;
        tracing::debug!("straight key reset");
        self.core().silence();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GeneratorConfig;
    use crate::error::EnqueueError;
    use crate::synth::generator::Generator;
    use crate::synth::queue::DequeueOutcome;
    use std::sync::Arc;

    fn setup() -> (Generator, Arc<Key>) {
        let config = GeneratorConfig {
            audio_system: AudioSystem::Null,
            ..GeneratorConfig::default()
        };
        let generator = Generator::new(config).unwrap();
        let key = Key::new(&generator);
        (generator, key)
    }

    fn next(generator: &Generator) -> Tone {
        match generator.queue().dequeue() {
            DequeueOutcome::Dequeued(tone) => tone,
            other => panic!("expected a tone, got {:?}", other),
        }
    }

    #[test]
    fn test_key_down_then_up() {
        let (generator, key) = setup();

        key.notify_straight_key(KeyState::Closed).unwrap();
        assert!(key.is_straight_key_busy());
        assert!(key.is_busy());
        assert_eq!(generator.queue().len(), 2);

        let rising = next(&generator);
        assert_eq!(rising.envelope, Envelope::RisingOnly);
        assert_eq!(rising.duration_us, generator.slope_length_us());

        // The forever tone keeps coming back while it is alone
        let held = next(&generator);
        assert!(held.is_forever);
        assert_eq!(next(&generator), held);
        assert_eq!(generator.queue().len(), 1);

        key.notify_straight_key(KeyState::Open).unwrap();
        assert!(!key.is_straight_key_busy());
        assert!(next(&generator).is_forever);
        let falling = next(&generator);
        assert_eq!(falling.envelope, Envelope::FallingOnly);
        let silent = next(&generator);
        assert!(silent.is_forever && silent.is_silent());
    }

    #[test]
    fn test_repeated_state_is_ignored() {
        let (generator, key) = setup();
        key.notify_straight_key(KeyState::Open).unwrap();
        assert!(generator.queue().is_empty());

        key.notify_straight_key(KeyState::Closed).unwrap();
        key.notify_straight_key(KeyState::Closed).unwrap();
        assert_eq!(generator.queue().len(), 2);
    }

    #[test]
    fn test_text_refused_while_key_is_down() {
        let (generator, key) = setup();
        key.notify_straight_key(KeyState::Closed).unwrap();
        assert_eq!(generator.enqueue_string("CQ"), Err(EnqueueError::SinkBusy));

        key.reset_straight_key();
        assert_eq!(key.straight_key_state(), KeyState::Open);
        assert!(generator.enqueue_string("CQ").is_ok());
    }
}
