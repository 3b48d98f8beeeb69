// Integration test: iambic keyer and straight key driving a running
// generator on the real-time null sink

use morse_engine::{
    AudioSystem, EnqueueError, Generator, GeneratorConfig, Key, KeyState, KeyerError, KeyerState,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// 60 wpm: 20 ms dot, 60 ms dash
const DOT_US: i64 = 20_000;
const DASH_US: i64 = 60_000;

fn setup() -> (Generator, Arc<Key>, Arc<Mutex<Vec<(KeyState, i64)>>>) {
    let config = GeneratorConfig {
        audio_system: AudioSystem::Null,
        speed: 60,
        ..GeneratorConfig::default()
    };
    let mut generator = Generator::new(config).unwrap();
    let key = Key::new(&generator);

    let events = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&events);
    key.register_keying_callback(move |state, at_us| recorder.lock().push((state, at_us)));

    generator.start().unwrap();
    (generator, key, events)
}

/// Durations of the closed periods seen by the keying callback
fn marks(events: &[(KeyState, i64)]) -> Vec<i64> {
    events
        .windows(2)
        .filter(|pair| pair[0].0 == KeyState::Closed && pair[1].0 == KeyState::Open)
        .map(|pair| pair[1].1 - pair[0].1)
        .collect()
}

#[test]
fn test_single_dot_tap() {
    let (mut generator, key, events) = setup();

    key.notify_paddles(true, false).unwrap();
    key.notify_paddles(false, false).unwrap();
    key.wait_for_keyer().unwrap();
    assert_eq!(key.keyer_state(), KeyerState::Idle);
    generator.stop();

    assert_eq!(marks(&events.lock()), vec![DOT_US]);
}

#[test]
fn test_curtis_mode_a_squeeze_release() {
    let (mut generator, key, events) = setup();

    key.notify_paddles(true, true).unwrap();
    key.notify_paddles(false, false).unwrap();
    key.wait_for_keyer().unwrap();
    generator.stop();

    assert_eq!(marks(&events.lock()), vec![DOT_US, DASH_US]);
}

#[test]
fn test_curtis_mode_b_squeeze_release() {
    let (mut generator, key, events) = setup();
    key.set_curtis_mode_b(true);

    key.notify_paddles(true, true).unwrap();
    key.notify_paddles(false, false).unwrap();
    key.wait_for_keyer().unwrap();
    generator.stop();

    assert_eq!(marks(&events.lock()), vec![DOT_US, DASH_US, DOT_US]);
}

#[test]
fn test_held_paddle_and_element_waits() {
    let (mut generator, key, events) = setup();

    key.notify_dash_paddle(true).unwrap();
    assert_eq!(key.wait_for_keyer(), Err(KeyerError::WouldDeadlock));
    assert_eq!(generator.enqueue_character('E'), Err(EnqueueError::SinkBusy));

    key.wait_for_element();
    key.wait_for_element();
    key.notify_dash_paddle(false).unwrap();
    key.wait_for_keyer().unwrap();
    generator.stop();

    let marks = marks(&events.lock());
    assert!(marks.len() >= 2, "held paddle must repeat: {:?}", marks);
    assert!(marks.iter().all(|&m| m == DASH_US), "dashes only: {:?}", marks);
}

#[test]
fn test_straight_key_mark() {
    let (mut generator, key, events) = setup();

    key.notify_straight_key(KeyState::Closed).unwrap();
    thread::sleep(Duration::from_millis(50));
    assert!(key.is_busy());
    key.notify_straight_key(KeyState::Open).unwrap();
    thread::sleep(Duration::from_millis(50));
    generator.stop();

    let events = events.lock();
    assert_eq!(events.first().map(|e| e.0), Some(KeyState::Closed));
    let marks = marks(&events);
    assert_eq!(marks.len(), 1, "one mark per key down: {:?}", marks);
    assert!(marks[0] >= generator.slope_length_us());
}

#[test]
fn test_reset_mid_dot_does_not_stall_keyer() {
    let (mut generator, key, events) = setup();

    key.notify_paddles(true, false).unwrap();
    key.reset_keyer();
    thread::sleep(Duration::from_millis(150));

    key.notify_paddles(true, false).unwrap();
    key.notify_paddles(false, false).unwrap();
    key.wait_for_keyer().unwrap();
    assert_eq!(key.keyer_state(), KeyerState::Idle);
    assert!(generator.enqueue_character('E').is_ok());
    generator.wait_for_queue_drained();
    generator.stop();

    assert!(marks(&events.lock()).contains(&DOT_US));
}
