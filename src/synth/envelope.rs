// Tone slope - amplitude table for the rising and falling edges of tones
//
// The table holds the rising edge, from silence up to (almost) the current
// volume. A falling edge reads the same table backwards. It is rebuilt
// whenever shape, length, sample rate or volume change.

use serde::{Deserialize, Serialize};
use std::f32::consts::PI;
use std::sync::Arc;

use crate::audio::timing::usecs_to_samples;
use crate::error::ParameterError;

/// Amplitude of a sample at 100% volume
pub const VOLUME_RANGE: i32 = 32768;
pub const DEFAULT_SLOPE_USECS: i64 = 5000;
/// A slope this long (about 20 s at 48 kHz) is certainly a mistake
pub const MAX_SLOPE_SAMPLES: i64 = 1_000_000;

/// Shape of the amplitude ramp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SlopeShape {
    Linear,
    #[default]
    RaisedCosine,
    Sine,
    /// No ramp at all; the slope length is always 0
    Rectangular,
}

/// Slope parameters and the precomputed amplitude table
#[derive(Debug, Clone)]
pub struct ToneSlope {
    shape: SlopeShape,
    length_us: i64,
    amplitudes: Arc<[f32]>,
}

impl ToneSlope {
    /// Create a slope and compute its table
    pub fn new(
        shape: SlopeShape,
        length_us: i64,
        sample_rate: u32,
        volume_abs: i32,
    ) -> Result<Self, ParameterError> {
        let mut slope = Self {
            shape: SlopeShape::default(),
            length_us: DEFAULT_SLOPE_USECS,
            amplitudes: Arc::from(Vec::new()),
        };
        slope.configure(Some(shape), Some(length_us), sample_rate, volume_abs)?;
        Ok(slope)
    }

    /// Change shape and/or length. `None` leaves that parameter unchanged.
    ///
    /// # Arguments
    /// * `shape` - New shape, or `None` to keep the current one
    /// * `length_us` - New length in microseconds, or `None` to keep it
    ///
    /// # Returns
    /// `ParameterError::InvalidSlope` for a rectangular slope with a
    /// nonzero length, a ramped slope with a zero length, a negative
    /// length, or a slope longer than `MAX_SLOPE_SAMPLES`. On error the
    /// slope is left untouched.
    pub fn configure(
        &mut self,
        shape: Option<SlopeShape>,
        length_us: Option<i64>,
        sample_rate: u32,
        volume_abs: i32,
    ) -> Result<(), ParameterError> {
        if let Some(length) = length_us
            && length < 0
        {
            return Err(ParameterError::InvalidSlope(format!(
                "negative slope length {length} us"
            )));
        }

        // An explicit zero length forces a rectangular slope
        if length_us == Some(0) {
            if let Some(shape) = shape
                && shape != SlopeShape::Rectangular
            {
                return Err(ParameterError::InvalidSlope(format!(
                    "{shape:?} slope needs a nonzero length"
                )));
            }
            self.shape = SlopeShape::Rectangular;
            self.length_us = 0;
            self.amplitudes = Arc::from(Vec::new());
            return Ok(());
        }

        let new_shape = shape.unwrap_or(self.shape);
        let new_length = length_us.unwrap_or(self.length_us);

        if new_shape == SlopeShape::Rectangular {
            if length_us.is_some_and(|length| length > 0) {
                return Err(ParameterError::InvalidSlope(
                    "rectangular slope must have zero length".to_string(),
                ));
            }
            self.shape = SlopeShape::Rectangular;
            self.length_us = 0;
            self.amplitudes = Arc::from(Vec::new());
            return Ok(());
        }

        if new_length == 0 {
            return Err(ParameterError::InvalidSlope(format!(
                "{new_shape:?} slope needs a nonzero length"
            )));
        }

        let amplitudes = compute_amplitudes(new_shape, new_length, sample_rate, volume_abs)?;
        self.shape = new_shape;
        self.length_us = new_length;
        self.amplitudes = amplitudes;
        Ok(())
    }

    /// Rebuild the table after a sample rate or volume change
    pub fn recompute(&mut self, sample_rate: u32, volume_abs: i32) -> Result<(), ParameterError> {
        if self.shape == SlopeShape::Rectangular {
            return Ok(());
        }
        self.amplitudes = compute_amplitudes(self.shape, self.length_us, sample_rate, volume_abs)?;
        Ok(())
    }

    pub fn shape(&self) -> SlopeShape {
        self.shape
    }

    pub fn length_us(&self) -> i64 {
        self.length_us
    }

    /// Length of one edge in samples
    pub fn n_samples(&self) -> usize {
        self.amplitudes.len()
    }

    /// Shared handle on the amplitude table
    pub fn amplitudes(&self) -> Arc<[f32]> {
        Arc::clone(&self.amplitudes)
    }
}

fn compute_amplitudes(
    shape: SlopeShape,
    length_us: i64,
    sample_rate: u32,
    volume_abs: i32,
) -> Result<Arc<[f32]>, ParameterError> {
    let n_samples = usecs_to_samples(sample_rate, length_us);
    if n_samples > MAX_SLOPE_SAMPLES {
        return Err(ParameterError::InvalidSlope(format!(
            "slope of {n_samples} samples is too long"
        )));
    }

    let n = n_samples.max(0) as usize;
    let volume = volume_abs as f32;
    let table: Vec<f32> = (0..n)
        .map(|i| {
            let i = i as f32;
            let n = n as f32;
            match shape {
                SlopeShape::Linear => volume * i / n,
                SlopeShape::Sine => (i * (PI / 2.0) / n).sin() * volume,
                SlopeShape::RaisedCosine => (1.0 - (1.0 + (i * PI / n).cos()) / 2.0) * volume,
                SlopeShape::Rectangular => volume,
            }
        })
        .collect();

    Ok(Arc::from(table))
}
