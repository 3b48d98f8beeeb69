// Module keying - état logique de la clé, manipulateur iambique et pioche
//
// A Key is attached to one Generator. The synthesis thread reports every
// dequeue to it: that is the only source of the logical key state and of
// the keying callback. The iambic keyer and the straight key are the two
// drivers that enqueue tones on behalf of a human operator.

pub mod iambic;
pub mod straight;

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::synth::generator::{Generator, GeneratorCore};
use crate::synth::tone::Tone;

pub use iambic::KeyerState;

use iambic::IambicKeyer;
use straight::StraightKey;

/// Logical state of a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum KeyState {
    #[default]
    Open,
    Closed,
}

impl KeyState {
    pub fn is_closed(self) -> bool {
        self == KeyState::Closed
    }
}

/// Callback receiving each real key transition and its logical time (µs)
pub type KeyingCallback = Arc<dyn Fn(KeyState, i64) + Send + Sync>;

#[derive(Debug, Clone, Copy, Default)]
struct Transition {
    state: KeyState,
    at_us: i64,
}

/// Key abstraction shared by the generator and the keying drivers
pub struct Key {
    core: Arc<GeneratorCore>,
    transition: Mutex<Transition>,
    /// Logical time: sum of the durations of every dequeued tone
    clock_us: AtomicI64,
    callback: Mutex<Option<KeyingCallback>>,
    pub(crate) keyer: IambicKeyer,
    pub(crate) straight: StraightKey,
}

impl Key {
    /// Create a key and attach it to `generator`.
    ///
    /// The generator keeps only a weak reference; dropping the returned
    /// Arc detaches the key.
    pub fn new(generator: &Generator) -> Arc<Self> {
        let key = Arc::new(Self {
            core: Arc::clone(generator.core()),
            transition: Mutex::new(Transition::default()),
            clock_us: AtomicI64::new(0),
            callback: Mutex::new(None),
            keyer: IambicKeyer::new(),
            straight: StraightKey::new(),
        });
        generator.core().attach_key(&key);
        key
    }

    pub(crate) fn core(&self) -> &GeneratorCore {
        &self.core
    }

    /// Current logical state, as last reported by the synthesis thread
    pub fn state(&self) -> KeyState {
        self.transition.lock().state
    }

    /// Record a new logical state.
    ///
    /// Repeated calls with the same state are filtered out; only a real
    /// change is timestamped and reported to the keying callback.
    pub fn set_state(&self, state: KeyState) {
        let at_us = self.elapsed_us();
        {
            let mut transition = self.transition.lock();
            if transition.state == state {
                return;
            }
            *transition = Transition { state, at_us };
        }

        tracing::debug!(?state, at_us, "key state changed");

        let callback = self.callback.lock().clone();
        if let Some(callback) = callback {
            callback(state, at_us);
        }
    }

    /// Install the keying callback, replacing any previous one
    pub fn register_keying_callback<F>(&self, callback: F)
    where
        F: Fn(KeyState, i64) + Send + Sync + 'static,
    {
        *self.callback.lock() = Some(Arc::new(callback));
    }

    pub fn clear_keying_callback(&self) {
        *self.callback.lock() = None;
    }

    /// Logical time in microseconds
    pub fn elapsed_us(&self) -> i64 {
        self.clock_us.load(Ordering::Acquire)
    }

    /// Logical time of the last recorded transition
    pub fn last_change_us(&self) -> i64 {
        self.transition.lock().at_us
    }

    /// True while a driver owns the generator: straight key down or iambic
    /// keyer not idle
    pub fn is_busy(&self) -> bool {
        self.is_straight_key_busy() || self.is_keyer_busy()
    }

    /// Synthesis thread: a dequeue happened. `None` is the empty transition.
    pub(crate) fn on_dequeue(&self, tone: Option<&Tone>) {
        let state = match tone {
            Some(tone) if tone.frequency != 0 => KeyState::Closed,
            _ => KeyState::Open,
        };
        self.set_state(state);

        if let Some(tone) = tone {
            self.clock_us.fetch_add(tone.duration_us, Ordering::AcqRel);
            tracing::trace!(
                frequency = tone.frequency,
                duration_us = tone.duration_us,
                "tone dequeued"
            );
        }
    }

    /// Synthesis thread: the last dequeued tone has been written out
    pub(crate) fn on_tone_elapsed(&self) {
        if !self.keyer.update(self.core()) {
            std::thread::sleep(std::time::Duration::from_millis(1));
            if !self.keyer.update(self.core()) {
                tracing::warn!("iambic keyer busy, tone notification dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::system::AudioSystem;
    use crate::config::GeneratorConfig;
    use crate::synth::tone::Envelope;

    fn key() -> (Generator, Arc<Key>) {
        let config = GeneratorConfig {
            audio_system: AudioSystem::Null,
            ..GeneratorConfig::default()
        };
        let generator = Generator::new(config).unwrap();
        let key = Key::new(&generator);
        (generator, key)
    }

    #[test]
    fn test_callback_only_on_real_change() {
        let (_generator, key) = key();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        key.register_keying_callback(move |state, at| sink.lock().push((state, at)));

        key.set_state(KeyState::Open);
        key.set_state(KeyState::Closed);
        key.set_state(KeyState::Closed);
        key.set_state(KeyState::Open);

        assert_eq!(
            *events.lock(),
            vec![(KeyState::Closed, 0), (KeyState::Open, 0)],
            "repeated states must be filtered"
        );
    }

    #[test]
    fn test_dequeue_drives_state_and_clock() {
        let (_generator, key) = key();

        key.on_dequeue(Some(&Tone::new(800, 60_000, Envelope::RisingAndFalling)));
        assert_eq!(key.state(), KeyState::Closed);
        assert_eq!(key.last_change_us(), 0);

        key.on_dequeue(Some(&Tone::silence(60_000)));
        assert_eq!(key.state(), KeyState::Open);
        assert_eq!(key.last_change_us(), 60_000);

        key.on_dequeue(None);
        assert_eq!(key.elapsed_us(), 120_000);
    }

    #[test]
    fn test_generator_sees_key_through_weak_reference() {
        let (generator, key) = key();
        assert!(generator.core().key().is_some());
        drop(key);
        assert!(generator.core().key().is_none());
    }
}
