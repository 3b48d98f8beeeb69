// Sink carte son via CPAL (feature "soundcard")
//
// The cpal stream lives on its own thread: on some platforms `Stream` is not
// Send, and the generator moves its sink into the synthesis thread. Samples
// reach the device callback through a lock-free ring buffer; `write` blocks
// while the ring is full, which paces the generator in real time.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Host, SampleFormat, SizedSample, Stream, StreamConfig};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::timing::SUPPORTED_SAMPLE_RATES;
use crate::audio::{AudioSystem, Sample, Sink};
use crate::error::SinkError;

/// Ring capacity, as a fraction of a second of audio
const RING_FRACTION_OF_SECOND: u32 = 20;

/// Default output device, or the first one named `device_name`
fn find_device(host: &Host, device_name: Option<&str>) -> Option<Device> {
    match device_name {
        None => host.default_output_device(),
        Some(wanted) => host.output_devices().ok()?.find(|device| {
            device
                .name()
                .map(|name| name == wanted)
                .unwrap_or(false)
        }),
    }
}

/// Pick the first supported sample rate the device accepts
fn choose_config(device: &Device) -> Result<(StreamConfig, SampleFormat), String> {
    if let Ok(ranges) = device.supported_output_configs() {
        let ranges: Vec<_> = ranges.collect();
        for rate in SUPPORTED_SAMPLE_RATES {
            let rate = cpal::SampleRate(rate);
            if let Some(range) = ranges
                .iter()
                .find(|r| r.min_sample_rate() <= rate && rate <= r.max_sample_rate())
            {
                let supported = range.clone().with_sample_rate(rate);
                return Ok((supported.config(), supported.sample_format()));
            }
        }
    }

    let supported = device
        .default_output_config()
        .map_err(|e| format!("Erreur de configuration: {}", e))?;
    Ok((supported.config(), supported.sample_format()))
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    mut consumer: HeapCons<f32>,
    drop_pending: Arc<AtomicBool>,
) -> Result<Stream, String>
where
    T: SizedSample + FromSample<f32> + Send + 'static,
{
    let channels = config.channels as usize;
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                if drop_pending.swap(false, Ordering::AcqRel) {
                    consumer.clear();
                }
                for frame in data.chunks_mut(channels) {
                    let value = consumer.try_pop().unwrap_or(0.0);
                    for slot in frame.iter_mut() {
                        *slot = T::from_sample(value);
                    }
                }
            },
            |err| tracing::error!("Audio stream error: {}", err),
            None,
        )
        .map_err(|e| format!("Failed to build output stream: {}", e))
}

/// Soundcard sink on the default cpal host
pub struct CpalSink {
    producer: Option<HeapProd<f32>>,
    stream_thread: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
    drop_pending: Arc<AtomicBool>,
}

impl CpalSink {
    pub fn new() -> Self {
        Self {
            producer: None,
            stream_thread: None,
            stop: Arc::new(AtomicBool::new(false)),
            drop_pending: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Default for CpalSink {
    fn default() -> Self {
        Self::new()
    }
}

impl Sink for CpalSink {
    fn open(&mut self, device_name: Option<&str>) -> Result<u32, SinkError> {
        self.close();

        let host = cpal::default_host();
        let device = find_device(&host, device_name)
            .ok_or_else(|| SinkError::Open("No audio device found".to_string()))?;
        let (config, sample_format) = choose_config(&device).map_err(SinkError::Open)?;
        let sample_rate = config.sample_rate.0;

        let capacity = (sample_rate / RING_FRACTION_OF_SECOND).max(1) as usize;
        let (producer, consumer) = HeapRb::<f32>::new(capacity).split();

        self.stop.store(false, Ordering::Release);
        let stop = Arc::clone(&self.stop);
        let drop_pending = Arc::clone(&self.drop_pending);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), String>>(1);

        let stream_thread = thread::Builder::new()
            .name("cw-cpal-stream".to_string())
            .spawn(move || {
                let stream = match sample_format {
                    SampleFormat::F32 => build_stream::<f32>(&device, &config, consumer, drop_pending),
                    SampleFormat::I16 => build_stream::<i16>(&device, &config, consumer, drop_pending),
                    SampleFormat::U16 => build_stream::<u16>(&device, &config, consumer, drop_pending),
                    other => Err(format!("Unsupported sample format: {:?}", other)),
                };
                let stream = match stream.and_then(|s| {
                    s.play().map_err(|e| format!("Failed to start stream: {}", e))?;
                    Ok(s)
                }) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                while !stop.load(Ordering::Acquire) {
                    thread::sleep(Duration::from_millis(10));
                }
                drop(stream);
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = stream_thread.join();
                return Err(SinkError::Open(e));
            }
            Err(_) => {
                let _ = stream_thread.join();
                return Err(SinkError::Open("audio stream thread exited".to_string()));
            }
        }

        self.producer = Some(producer);
        self.stream_thread = Some(stream_thread);
        Ok(sample_rate)
    }

    fn close(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.stream_thread.take()
            && handle.join().is_err()
        {
            tracing::error!("Audio stream thread panicked");
        }
        self.producer = None;
    }

    fn write(&mut self, buffer: &[Sample]) -> Result<(), SinkError> {
        let producer = self.producer.as_mut().ok_or(SinkError::NotOpen)?;

        for &sample in buffer {
            let value = f32::from(sample) / 32768.0;
            while producer.try_push(value).is_err() {
                if self.stop.load(Ordering::Acquire) {
                    return Err(SinkError::Write("audio stream stopped".to_string()));
                }
                thread::sleep(Duration::from_millis(1));
            }
        }
        Ok(())
    }

    fn silence(&mut self) -> Result<(), SinkError> {
        self.drop_pending.store(true, Ordering::Release);
        Ok(())
    }

    fn system(&self) -> AudioSystem {
        AudioSystem::Alsa
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        self.close();
    }
}
