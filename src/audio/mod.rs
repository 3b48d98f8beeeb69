// Module audio - Contrat des sinks et backends (null, mémoire, WAV, carte son)

pub mod export;
pub mod memory;
pub mod null;
pub mod status;
pub mod system;
pub mod timing;

#[cfg(feature = "soundcard")]
pub mod device;

pub use export::WavSink;
pub use memory::{MemorySink, MemoryTap};
pub use null::NullSink;
pub use status::{AtomicSinkStatus, SinkStatus};
pub use system::{AudioSystem, open_sink};

use crate::error::SinkError;

/// PCM sample type written to every sink (mono)
pub type Sample = i16;

/// Destination of the generator's PCM buffers.
///
/// `write` is expected to block for roughly as long as the buffer takes to
/// play; that is what paces the synthesis thread (and the iambic keyer).
pub trait Sink: Send {
    /// Open the device and return the sample rate it runs at
    fn open(&mut self, device: Option<&str>) -> Result<u32, SinkError>;

    fn close(&mut self);

    /// Write one full buffer of samples
    fn write(&mut self, buffer: &[Sample]) -> Result<(), SinkError>;

    /// Stop any sound immediately
    fn silence(&mut self) -> Result<(), SinkError>;

    /// Audio system this sink implements
    fn system(&self) -> AudioSystem;

    fn name(&self) -> &'static str {
        self.system().label()
    }
}
