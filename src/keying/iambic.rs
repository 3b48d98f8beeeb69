// Manipulateur iambique (Curtis 8044, modes A et B)
//
// The keyer is timed by the generator: each tone it enqueues comes back as
// a "tone elapsed" notification from the synthesis thread, which moves the
// state machine one step further. Paddle events only record paddle and
// latch states, and nudge the machine out of Idle.

use parking_lot::{Condvar, Mutex};
use std::thread;
use std::time::Duration;

use crate::error::KeyerError;
use crate::keying::{Key, KeyState};
use crate::synth::generator::GeneratorCore;
use crate::synth::tone::{Envelope, Tone};

/// State of the iambic keyer graph
///
/// The `B` variants only occur in Curtis mode B, for the element that
/// follows a squeeze of both paddles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum KeyerState {
    #[default]
    Idle,
    InDotA,
    InDashA,
    AfterDotA,
    AfterDashA,
    InDotB,
    InDashB,
    AfterDotB,
    AfterDashB,
}

impl KeyerState {
    /// A mark is being sent
    pub fn is_in_element(self) -> bool {
        matches!(
            self,
            KeyerState::InDotA | KeyerState::InDotB | KeyerState::InDashA | KeyerState::InDashB
        )
    }

    /// The inter-mark space after a mark is being sent
    pub fn is_after_element(self) -> bool {
        matches!(
            self,
            KeyerState::AfterDotA
                | KeyerState::AfterDotB
                | KeyerState::AfterDashA
                | KeyerState::AfterDashB
        )
    }
}

#[derive(Debug, Default)]
struct KeyerData {
    state: KeyerState,
    dot_paddle: bool,
    dash_paddle: bool,
    dot_latch: bool,
    dash_latch: bool,
    curtis_mode_b: bool,
    curtis_b_latch: bool,
    /// Key value last driven into the generator
    driven: KeyState,
}

pub(crate) struct IambicKeyer {
    /// Held for the duration of one graph update
    update_guard: Mutex<()>,
    data: Mutex<KeyerData>,
    state_changed: Condvar,
}

impl IambicKeyer {
    pub(crate) fn new() -> Self {
        Self {
            update_guard: Mutex::new(()),
            data: Mutex::new(KeyerData::default()),
            state_changed: Condvar::new(),
        }
    }

    /// Advance the graph by one step.
    ///
    /// Returns false without touching anything if another update is in
    /// progress.
    pub(crate) fn update(&self, core: &GeneratorCore) -> bool {
        let Some(_guard) = self.update_guard.try_lock() else {
            return false;
        };

        let mut data = self.data.lock();
        let old_state = data.state;
        if old_state == KeyerState::Idle {
            return true;
        }

        let (timings, frequency) = core.send_snapshot();

        let new_state = match old_state {
            KeyerState::Idle => KeyerState::Idle,

            KeyerState::InDotA | KeyerState::InDotB => {
                drive(core, &mut data, frequency, KeyState::Open, timings.eom_space);
                if old_state == KeyerState::InDotA {
                    KeyerState::AfterDotA
                } else {
                    KeyerState::AfterDotB
                }
            }

            KeyerState::InDashA | KeyerState::InDashB => {
                drive(core, &mut data, frequency, KeyState::Open, timings.eom_space);
                if old_state == KeyerState::InDashA {
                    KeyerState::AfterDashA
                } else {
                    KeyerState::AfterDashB
                }
            }

            KeyerState::AfterDotA | KeyerState::AfterDotB => {
                if !data.dot_paddle {
                    data.dot_latch = false;
                }

                if old_state == KeyerState::AfterDotB {
                    drive(core, &mut data, frequency, KeyState::Closed, timings.dash_len);
                    KeyerState::InDashA
                } else if data.dash_latch {
                    drive(core, &mut data, frequency, KeyState::Closed, timings.dash_len);
                    if data.curtis_b_latch {
                        data.curtis_b_latch = false;
                        KeyerState::InDashB
                    } else {
                        KeyerState::InDashA
                    }
                } else if data.dot_latch {
                    drive(core, &mut data, frequency, KeyState::Closed, timings.dot_len);
                    KeyerState::InDotA
                } else {
                    KeyerState::Idle
                }
            }

            KeyerState::AfterDashA | KeyerState::AfterDashB => {
                if !data.dash_paddle {
                    data.dash_latch = false;
                }

                if old_state == KeyerState::AfterDashB {
                    drive(core, &mut data, frequency, KeyState::Closed, timings.dot_len);
                    KeyerState::InDotA
                } else if data.dot_latch {
                    drive(core, &mut data, frequency, KeyState::Closed, timings.dot_len);
                    if data.curtis_b_latch {
                        data.curtis_b_latch = false;
                        KeyerState::InDotB
                    } else {
                        KeyerState::InDotA
                    }
                } else if data.dash_latch {
                    drive(core, &mut data, frequency, KeyState::Closed, timings.dash_len);
                    KeyerState::InDashA
                } else {
                    KeyerState::Idle
                }
            }
        };
        data.state = new_state;

        if new_state != old_state {
            tracing::debug!(from = ?old_state, to = ?data.state, "keyer state");
            self.state_changed.notify_all();
        }
        true
    }

    /// Update with the single retry allowed after a short delay
    fn update_with_retry(&self, core: &GeneratorCore) -> Result<(), KeyerError> {
        if self.update(core) {
            return Ok(());
        }
        thread::sleep(Duration::from_millis(1));
        if self.update(core) {
            return Ok(());
        }
        tracing::warn!("iambic keyer busy");
        Err(KeyerError::Busy)
    }

    fn state(&self) -> KeyerState {
        self.data.lock().state
    }
}

/// Enqueue a tone for a change of the keyer's own key value; repeated
/// values enqueue nothing
fn drive(
    core: &GeneratorCore,
    data: &mut KeyerData,
    frequency: i32,
    value: KeyState,
    duration_us: i64,
) {
    if data.driven == value {
        return;
    }
    data.driven = value;

    let tone = match value {
        KeyState::Closed => Tone::new(frequency, duration_us, Envelope::RisingAndFalling),
        KeyState::Open => Tone::silence(duration_us),
    };
    if let Err(e) = core.queue.enqueue(tone) {
        tracing::warn!("iambic keyer: failed to enqueue tone: {}", e);
    }
}

/// Iambic keyer API
impl Key {
    /// Record the state of both paddles.
    ///
    /// A pressed paddle sets its latch; latches are only cleared by the
    /// keyer itself once the element has been sent. From Idle, pressing
    /// the dot paddle starts a dot (as if a dash had just ended) and
    /// pressing the dash paddle starts a dash.
    pub fn notify_paddles(&self, dot: bool, dash: bool) -> Result<(), KeyerError> {
        let keyer = &self.keyer;
        {
            let mut data = keyer.data.lock();
            data.dot_paddle = dot;
            data.dash_paddle = dash;
            if dot {
                data.dot_latch = true;
            }
            if dash {
                data.dash_latch = true;
            }
            if data.curtis_mode_b && dot && dash {
                data.curtis_b_latch = true;
            }

            tracing::debug!(
                dot,
                dash,
                dot_latch = data.dot_latch,
                dash_latch = data.dash_latch,
                curtis_b_latch = data.curtis_b_latch,
                "keyer paddles"
            );

            if data.state != KeyerState::Idle {
                return Ok(());
            }

            data.state = match (dot, dash, data.curtis_b_latch) {
                (true, _, true) => KeyerState::AfterDashB,
                (true, _, false) => KeyerState::AfterDashA,
                (false, true, true) => KeyerState::AfterDotB,
                (false, true, false) => KeyerState::AfterDotA,
                (false, false, _) => return Ok(()),
            };
        }

        keyer.update_with_retry(self.core())
    }

    /// Change the dot paddle, keeping the dash paddle as it is
    pub fn notify_dot_paddle(&self, dot: bool) -> Result<(), KeyerError> {
        let dash = self.keyer.data.lock().dash_paddle;
        self.notify_paddles(dot, dash)
    }

    /// Change the dash paddle, keeping the dot paddle as it is
    pub fn notify_dash_paddle(&self, dash: bool) -> Result<(), KeyerError> {
        let dot = self.keyer.data.lock().dot_paddle;
        self.notify_paddles(dot, dash)
    }

    /// (dot, dash) paddle states
    pub fn paddles(&self) -> (bool, bool) {
        let data = self.keyer.data.lock();
        (data.dot_paddle, data.dash_paddle)
    }

    /// (dot, dash) latch states
    pub fn paddle_latches(&self) -> (bool, bool) {
        let data = self.keyer.data.lock();
        (data.dot_latch, data.dash_latch)
    }

    pub fn keyer_state(&self) -> KeyerState {
        self.keyer.state()
    }

    pub fn is_keyer_busy(&self) -> bool {
        self.keyer.state() != KeyerState::Idle
    }

    pub fn set_curtis_mode_b(&self, enabled: bool) {
        self.keyer.data.lock().curtis_mode_b = enabled;
    }

    pub fn curtis_mode_b(&self) -> bool {
        self.keyer.data.lock().curtis_mode_b
    }

    /// Block until the element being sent is over: first wait for Idle or
    /// an after-element state, then for Idle or an in-element state.
    pub fn wait_for_element(&self) {
        let keyer = &self.keyer;
        let mut data = keyer.data.lock();
        while data.state != KeyerState::Idle && !data.state.is_after_element() {
            keyer.state_changed.wait(&mut data);
        }
        while data.state != KeyerState::Idle && !data.state.is_in_element() {
            keyer.state_changed.wait(&mut data);
        }
    }

    /// Block until the keyer is idle.
    ///
    /// Fails with `WouldDeadlock` while a paddle is held, since the keyer
    /// would never get back to Idle.
    pub fn wait_for_keyer(&self) -> Result<(), KeyerError> {
        let keyer = &self.keyer;
        let mut data = keyer.data.lock();
        if data.dot_paddle || data.dash_paddle {
            return Err(KeyerError::WouldDeadlock);
        }
        while data.state != KeyerState::Idle {
            keyer.state_changed.wait(&mut data);
        }
        Ok(())
    }

    /// Clear paddles and latches, return to Curtis mode A and Idle, and
    /// silence the generator
    pub fn reset_keyer(&self) {
        {
            let mut data = self.keyer.data.lock();
            // Nothing the keyer enqueued before the reset will be followed
            // up, so the next element must start from an open key
            *data = KeyerData::default();
            self.keyer.state_changed.notify_all();
        }
        tracing::debug!("keyer reset");
        self.core().silence();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::system::AudioSystem;
    use crate::config::GeneratorConfig;
    use crate::synth::generator::Generator;
    use crate::synth::queue::DequeueOutcome;
    use std::sync::Arc;

    fn setup() -> (Generator, Arc<Key>) {
        let config = GeneratorConfig {
            audio_system: AudioSystem::Null,
            speed: 20,
            ..GeneratorConfig::default()
        };
        let generator = Generator::new(config).unwrap();
        let key = Key::new(&generator);
        (generator, key)
    }

    /// Play one tone the way the synthesis thread would, minus the audio
    fn step(generator: &Generator, key: &Key) -> Option<Tone> {
        match generator.queue().dequeue() {
            DequeueOutcome::Dequeued(tone) => {
                key.on_dequeue(Some(&tone));
                key.on_tone_elapsed();
                Some(tone)
            }
            DequeueOutcome::EmptyTransition => {
                key.on_dequeue(None);
                key.on_tone_elapsed();
                None
            }
            DequeueOutcome::StillEmpty => None,
        }
    }

    /// Marks sent until the keyer goes idle, as '.' and '-'
    fn run_until_idle(generator: &Generator, key: &Key, limit: usize) -> String {
        let mut sent = String::new();
        for _ in 0..limit {
            if let Some(tone) = step(generator, key)
                && tone.frequency != 0
            {
                sent.push(if tone.duration_us == 60_000 { '.' } else { '-' });
            }
            if key.keyer_state() == KeyerState::Idle && generator.queue().is_empty() {
                break;
            }
        }
        sent
    }

    #[test]
    fn test_dot_paddle_from_idle_sends_dot() {
        let (generator, key) = setup();
        key.notify_paddles(true, false).unwrap();

        assert_eq!(key.keyer_state(), KeyerState::InDotA);
        assert_eq!(generator.queue().len(), 1);
        assert!(key.is_keyer_busy());
        assert!(key.is_busy());
    }

    #[test]
    fn test_dash_paddle_from_idle_sends_dash() {
        let (generator, key) = setup();
        key.notify_paddles(false, true).unwrap();
        assert_eq!(key.keyer_state(), KeyerState::InDashA);

        key.notify_paddles(false, false).unwrap();
        assert_eq!(run_until_idle(&generator, &key, 20), "-");
    }

    #[test]
    fn test_release_with_nothing_latched_stays_idle() {
        let (generator, key) = setup();
        key.notify_paddles(false, false).unwrap();
        assert_eq!(key.keyer_state(), KeyerState::Idle);
        assert!(generator.queue().is_empty());
    }

    #[test]
    fn test_held_dot_paddle_repeats_dots() {
        let (generator, key) = setup();
        key.notify_paddles(true, false).unwrap();

        let mut sent = String::new();
        for _ in 0..8 {
            if let Some(tone) = step(&generator, &key)
                && tone.frequency != 0
            {
                sent.push('.');
            }
        }
        assert_eq!(sent, "....");
        assert_eq!(key.wait_for_keyer(), Err(KeyerError::WouldDeadlock));
    }

    #[test]
    fn test_mode_a_squeeze_alternates() {
        let (generator, key) = setup();
        key.notify_paddles(true, true).unwrap();

        let mut marks = Vec::new();
        for _ in 0..12 {
            if let Some(tone) = step(&generator, &key)
                && tone.frequency != 0
            {
                marks.push(tone.duration_us);
            }
        }
        assert_eq!(
            marks,
            vec![60_000, 180_000, 60_000, 180_000, 60_000, 180_000],
            "squeeze must alternate dot and dash without doubling"
        );
    }

    #[test]
    fn test_mode_a_release_mid_dot_completes_pair() {
        let (generator, key) = setup();
        key.notify_paddles(true, true).unwrap();
        key.notify_paddles(false, false).unwrap();

        assert_eq!(run_until_idle(&generator, &key, 20), ".-");
    }

    #[test]
    fn test_mode_b_release_mid_dot_adds_one_element() {
        let (generator, key) = setup();
        key.set_curtis_mode_b(true);
        key.notify_paddles(true, true).unwrap();
        key.notify_paddles(false, false).unwrap();

        assert_eq!(run_until_idle(&generator, &key, 20), ".-.");
        assert_eq!(key.keyer_state(), KeyerState::Idle);
    }

    #[test]
    fn test_latch_survives_short_press() {
        let (generator, key) = setup();
        key.notify_paddles(true, false).unwrap();
        // Dash tapped and released during the dot
        key.notify_dash_paddle(true).unwrap();
        key.notify_dash_paddle(false).unwrap();
        key.notify_dot_paddle(false).unwrap();

        assert_eq!(key.paddles(), (false, false));
        assert_eq!(key.paddle_latches(), (true, true));
        assert_eq!(run_until_idle(&generator, &key, 20), ".-");
        assert_eq!(key.paddle_latches(), (false, false));
    }

    #[test]
    fn test_busy_guard() {
        let (generator, key) = setup();
        key.notify_paddles(true, false).unwrap();

        let guard = key.keyer.update_guard.lock();
        assert!(!key.keyer.update(generator.core()));
        drop(guard);
        assert!(key.keyer.update(generator.core()));
    }

    #[test]
    fn test_generator_refuses_text_while_keying() {
        let (generator, key) = setup();
        key.notify_paddles(true, false).unwrap();
        assert_eq!(
            generator.enqueue_character('E'),
            Err(crate::error::EnqueueError::SinkBusy)
        );
    }

    #[test]
    fn test_reset_keyer() {
        let (_generator, key) = setup();
        key.set_curtis_mode_b(true);
        key.notify_paddles(true, true).unwrap();
        key.reset_keyer();

        assert_eq!(key.keyer_state(), KeyerState::Idle);
        assert_eq!(key.paddles(), (false, false));
        assert_eq!(key.paddle_latches(), (false, false));
        assert!(!key.curtis_mode_b());
        assert_eq!(key.wait_for_keyer(), Ok(()));
    }

    #[test]
    fn test_reset_mid_dot_then_new_dot() {
        let (generator, key) = setup();
        key.notify_paddles(true, false).unwrap();
        key.reset_keyer();
        // The interrupted dot is played out without the keyer seeing it
        generator.flush_queue();

        key.notify_paddles(true, false).unwrap();
        assert_eq!(key.keyer_state(), KeyerState::InDotA);
        assert_eq!(generator.queue().len(), 1, "a new dot must be enqueued");

        key.notify_paddles(false, false).unwrap();
        assert_eq!(run_until_idle(&generator, &key, 20), ".");
        assert_eq!(key.keyer_state(), KeyerState::Idle);
    }

    #[test]
    fn test_paddles_busy_after_retry() {
        let (generator, key) = setup();
        let guard = key.keyer.update_guard.lock();

        assert_eq!(key.notify_paddles(true, false), Err(KeyerError::Busy));
        // Paddle and latch are recorded even though the graph did not move
        assert_eq!(key.paddles(), (true, false));
        assert_eq!(key.keyer_state(), KeyerState::AfterDashA);
        assert!(generator.queue().is_empty());

        drop(guard);
        assert!(key.keyer.update(generator.core()));
        assert_eq!(key.keyer_state(), KeyerState::InDotA);
        assert_eq!(generator.queue().len(), 1);
    }
}
