// Module synthèse - file de tons, enveloppes, oscillateur et générateur

pub mod envelope;
pub mod generator;
pub mod oscillator;
pub mod queue;
pub mod tone;
mod worker;

pub use envelope::{SlopeShape, ToneSlope};
pub use generator::Generator;
pub use queue::{DequeueOutcome, ToneQueue};
pub use tone::{Envelope, QUANTUM_USECS, Tone};
