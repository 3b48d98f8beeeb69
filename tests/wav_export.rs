// Integration test: offline rendering to a WAV file

use morse_engine::{AudioSystem, Generator, GeneratorConfig, SlopeShape, WavSink};
use std::path::Path;
use tempfile::tempdir;

/// Block until the queue has gone through its empty transition
fn wait_until_idle(generator: &Generator) {
    generator.wait_for_queue_drained();
    while generator.queue().is_busy() {
        std::thread::sleep(std::time::Duration::from_millis(1));
    }
}

fn read_samples(path: &Path) -> (hound::WavSpec, Vec<i16>) {
    let mut reader = hound::WavReader::open(path).unwrap();
    let spec = reader.spec();
    let samples = reader.samples::<i16>().map(|s| s.unwrap()).collect();
    (spec, samples)
}

#[test]
fn test_render_word_through_wav_system() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("paris.wav");

    let config = GeneratorConfig {
        audio_system: AudioSystem::Wav,
        device: Some(path.to_str().unwrap().to_string()),
        speed: 30,
        ..GeneratorConfig::default()
    };
    let mut generator = Generator::new(config).unwrap();
    generator.start().unwrap();
    assert_eq!(generator.audio_system(), AudioSystem::Wav);

    generator.enqueue_string("PARIS").unwrap();
    wait_until_idle(&generator);
    generator.stop();
    let written = generator.samples_written();

    let (spec, samples) = read_samples(&path);
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.bits_per_sample, 16);
    assert_eq!(spec.sample_rate, 44100);
    assert_eq!(samples.len() as u64, written);
    assert_eq!(samples.len() % generator.buffer_len(), 0);

    // PARIS is 50 units minus the trailing word space: 43 units at 40 ms
    let expected = 43 * 40_000 * 44100 / 1_000_000;
    assert!(
        samples.len() >= expected,
        "{} samples, expected at least {}",
        samples.len(),
        expected
    );

    let peak = samples.iter().map(|s| s.unsigned_abs()).max().unwrap();
    // 70 % volume
    assert!(peak > 20_000 && peak <= 22_938, "peak {}", peak);
}

#[test]
fn test_custom_wav_sink_with_linear_slopes() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("e.wav");

    let config = GeneratorConfig {
        speed: 60,
        volume: 50,
        slope_shape: SlopeShape::Linear,
        slope_length_us: 2000,
        ..GeneratorConfig::default()
    };
    let sink = WavSink::with_path(&path).with_sample_rate(8000);
    let mut generator = Generator::with_sink(config, sink).unwrap();
    generator.start().unwrap();
    assert_eq!(generator.sample_rate(), 8000);

    generator.enqueue_character('E').unwrap();
    wait_until_idle(&generator);
    generator.stop();

    let (spec, samples) = read_samples(&path);
    assert_eq!(spec.sample_rate, 8000);
    // 20 ms dot at 8 kHz, the first sample of the slope is silent
    assert_eq!(samples[0], 0);
    assert!(samples[1..160].iter().any(|&s| s != 0));
    assert!(samples[160..].iter().all(|&s| s == 0));
}
