// Integration test: a receiver decoding what a running generator keys

use morse_engine::morse::receiver;
use morse_engine::{AudioSystem, Generator, GeneratorConfig, Key, Receiver};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

fn wait_until_idle(generator: &Generator) {
    generator.wait_for_queue_drained();
    while generator.queue().is_busy() {
        std::thread::sleep(Duration::from_millis(1));
    }
}

fn decode(text: &str) -> String {
    let config = GeneratorConfig {
        audio_system: AudioSystem::Null,
        speed: 60,
        ..GeneratorConfig::default()
    };
    let mut generator = Generator::new(config).unwrap();
    let key = Key::new(&generator);

    let mut rx = Receiver::new();
    rx.set_speed(60).unwrap();
    let rx = Arc::new(Mutex::new(rx));
    let decoded = Arc::new(Mutex::new(String::new()));
    let out = Arc::clone(&decoded);
    receiver::listen(&rx, &key, move |received| {
        let mut out = out.lock();
        out.push(received.character);
        if received.is_end_of_word {
            out.push(' ');
        }
    });

    generator.start().unwrap();
    generator.enqueue_string(text).unwrap();
    wait_until_idle(&generator);
    generator.stop();

    // The last character has no following key down to complete it
    let last = rx.lock().finish_character(key.elapsed_us());
    let mut decoded = decoded.lock().clone();
    if let Some(last) = last {
        decoded.push(last.character);
    }
    decoded
}

#[test]
fn test_receiver_decodes_generated_word() {
    assert_eq!(decode("PARIS"), "PARIS");
}

#[test]
fn test_receiver_sees_word_spaces() {
    assert_eq!(decode("CQ DE"), "CQ DE");
}
