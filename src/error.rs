// Error types for the tone queue, generator, keyers, receiver, sinks and configuration

use crate::audio::AudioSystem;
use crate::morse::receiver::ReceiverState;

/// Tone queue errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("Tone queue is full")]
    QueueFull,

    #[error("Invalid queue capacity {capacity} (high water mark {high_water_mark})")]
    InvalidCapacity {
        capacity: usize,
        high_water_mark: usize,
    },

    #[error("Invalid queue level {level} for capacity {capacity}")]
    InvalidLevel { level: usize, capacity: usize },
}

/// Parameter setter errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParameterError {
    #[error("{parameter} = {value} is out of range {min}..={max}")]
    OutOfRange {
        parameter: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("Invalid tone slope: {0}")]
    InvalidSlope(String),
}

/// Errors returned by the symbol/character/string enqueue API
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnqueueError {
    #[error("No Morse representation for character {0:?}")]
    UnknownCharacter(char),

    #[error("Invalid Morse representation {0:?}")]
    InvalidRepresentation(String),

    #[error("Tone queue is nearly full")]
    QueueNearlyFull,

    #[error("Tone queue is full")]
    QueueFull,

    #[error("Generator is busy with a key")]
    SinkBusy,
}

impl From<QueueError> for EnqueueError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::QueueFull => EnqueueError::QueueFull,
            // Only enqueue() is forwarded here, and it never reports capacity problems
            QueueError::InvalidCapacity { .. } | QueueError::InvalidLevel { .. } => {
                EnqueueError::QueueFull
            }
        }
    }
}

/// Generator lifecycle errors
#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    #[error("Failed to start generator: {0}")]
    StartFailed(String),

    #[error("Generator is already running")]
    AlreadyRunning,

    #[error(transparent)]
    Parameter(#[from] ParameterError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Iambic keyer and straight key errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyerError {
    #[error("Keyer is busy")]
    Busy,

    #[error("Waiting would deadlock: a paddle is held down")]
    WouldDeadlock,

    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Morse receiver errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReceiveError {
    #[error("Receiver cannot do that in state {0:?}")]
    InvalidState(ReceiverState),

    #[error("Timestamp {0} us is before the last recorded event")]
    InvalidTimestamp(i64),

    #[error("Mark of {0} us ignored as a noise spike")]
    NoiseSpike(i64),

    #[error("Mark of {0} us is neither a dot nor a dash")]
    UnrecognizedMark(i64),

    #[error("Receiver representation buffer is full")]
    BufferFull,

    #[error("Character not complete yet")]
    NotReady,

    #[error("No character for representation {0:?}")]
    UnknownRepresentation(String),

    #[error("Receive speed is fixed by adaptive tracking")]
    AdaptiveMode,

    #[error(transparent)]
    Parameter(#[from] ParameterError),
}

/// Audio sink errors
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Audio system {0:?} is not supported")]
    Unsupported(AudioSystem),

    #[error("Failed to open audio sink: {0}")]
    Open(String),

    #[error("Failed to write to audio sink: {0}")]
    Write(String),

    #[error("Audio sink is not open")]
    NotOpen,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
}

/// Configuration loading/saving errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("RON error: {0}")]
    Ron(#[from] ron::error::SpannedError),

    #[error("RON serialization error: {0}")]
    RonSerialize(#[from] ron::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported configuration format: {0}")]
    UnsupportedFormat(String),

    #[error(transparent)]
    Parameter(#[from] ParameterError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_full_maps_to_enqueue_error() {
        let err: EnqueueError = QueueError::QueueFull.into();
        assert_eq!(err, EnqueueError::QueueFull);
    }

    #[test]
    fn test_out_of_range_message() {
        let err = ParameterError::OutOfRange {
            parameter: "volume",
            value: 150,
            min: 0,
            max: 100,
        };
        assert_eq!(err.to_string(), "volume = 150 is out of range 0..=100");
    }
}
