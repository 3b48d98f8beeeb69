// Audio system selection and sink fallback

use serde::{Deserialize, Serialize};

use crate::audio::Sink;
use crate::audio::export::WavSink;
use crate::audio::null::NullSink;
use crate::error::SinkError;

/// Audio system requested for a generator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AudioSystem {
    /// No audio; buffers are consumed in real time
    Null,
    /// PC speaker buzzer
    Console,
    Oss,
    Alsa,
    PulseAudio,
    /// Any soundcard: PulseAudio, then OSS, then ALSA
    #[default]
    Soundcard,
    /// WAV file named by the device string
    Wav,
}

impl AudioSystem {
    /// Concrete systems to try, in order
    pub fn candidates(self) -> &'static [AudioSystem] {
        match self {
            AudioSystem::Soundcard => &[AudioSystem::PulseAudio, AudioSystem::Oss, AudioSystem::Alsa],
            AudioSystem::Null => &[AudioSystem::Null],
            AudioSystem::Console => &[AudioSystem::Console],
            AudioSystem::Oss => &[AudioSystem::Oss],
            AudioSystem::Alsa => &[AudioSystem::Alsa],
            AudioSystem::PulseAudio => &[AudioSystem::PulseAudio],
            AudioSystem::Wav => &[AudioSystem::Wav],
        }
    }

    /// Sink produces PCM samples (everything but the null sink and the buzzer)
    pub fn is_soundcard(self) -> bool {
        matches!(
            self,
            AudioSystem::Oss
                | AudioSystem::Alsa
                | AudioSystem::PulseAudio
                | AudioSystem::Soundcard
                | AudioSystem::Wav
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            AudioSystem::Null => "null",
            AudioSystem::Console => "console",
            AudioSystem::Oss => "oss",
            AudioSystem::Alsa => "alsa",
            AudioSystem::PulseAudio => "pulseaudio",
            AudioSystem::Soundcard => "soundcard",
            AudioSystem::Wav => "wav",
        }
    }
}

/// Build an unopened sink for one concrete audio system
fn create_sink(system: AudioSystem) -> Result<Box<dyn Sink>, SinkError> {
    match system {
        AudioSystem::Null => Ok(Box::new(NullSink::new())),
        AudioSystem::Wav => Ok(Box::new(WavSink::new())),
        #[cfg(feature = "soundcard")]
        AudioSystem::Alsa => Ok(Box::new(crate::audio::device::CpalSink::new())),
        other => Err(SinkError::Unsupported(other)),
    }
}

/// Open the first sink of `system`'s fallback chain that accepts `device`.
///
/// # Returns
/// The open sink and its sample rate, or the error of the last candidate
pub fn open_sink(
    system: AudioSystem,
    device: Option<&str>,
) -> Result<(Box<dyn Sink>, u32), SinkError> {
    let mut last_error = SinkError::Unsupported(system);

    for &candidate in system.candidates() {
        let attempt = create_sink(candidate).and_then(|mut sink| {
            let sample_rate = sink.open(device)?;
            Ok((sink, sample_rate))
        });

        match attempt {
            Ok((sink, sample_rate)) => {
                tracing::info!(
                    system = candidate.label(),
                    sample_rate,
                    "audio sink opened"
                );
                return Ok((sink, sample_rate));
            }
            Err(err) => {
                tracing::debug!(system = candidate.label(), "audio sink unavailable: {}", err);
                last_error = err;
            }
        }
    }

    tracing::warn!(system = system.label(), "no audio sink could be opened");
    Err(last_error)
}
