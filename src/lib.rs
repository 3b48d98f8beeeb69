// Morse Engine - file de tons, synthèse et manipulation pour la télégraphie
//
// Text or paddle events go in as tone descriptors, a synthesis thread
// turns them into PCM for a sink. A receiver decodes key timings back
// into text.

pub mod audio;
pub mod config;
pub mod error;
pub mod keying;
pub mod morse;
pub mod synth;

// Re-export commonly used types for convenience
pub use audio::{AudioSystem, MemorySink, MemoryTap, NullSink, Sample, Sink, SinkStatus, WavSink};
pub use config::GeneratorConfig;
pub use error::{
    ConfigError, EnqueueError, GeneratorError, KeyerError, ParameterError, QueueError, ReceiveError,
    SinkError,
};
pub use keying::{Key, KeyState, KeyerState};
pub use morse::{ReceivedCharacter, Receiver, ReceiverState, SendTimings, TimingSynchronizer};
pub use synth::{DequeueOutcome, Envelope, Generator, SlopeShape, Tone, ToneQueue};
