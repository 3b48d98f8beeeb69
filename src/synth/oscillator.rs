// Oscillateur sinus - continuité de phase entre les buffers

use std::f64::consts::PI;

use crate::audio::Sample;
use crate::audio::timing::usecs_to_samples;
use crate::synth::tone::{Envelope, Tone};

const TWO_PI: f64 = 2.0 * PI;

/// Per-tone state derived at dequeue time: sample counts and the position
/// reached so far. Owned by the synthesis thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToneExpansion {
    pub frequency: i32,
    pub envelope: Envelope,
    /// Total samples of the tone
    pub n_samples: i64,
    /// Samples in one edge (rising or falling)
    pub slope_n_samples: i64,
    /// Next sample to produce, counted from the tone start
    pub sample_index: i64,
}

impl ToneExpansion {
    /// Expand a dequeued tone at `sample_rate`.
    ///
    /// `slope_n_samples` must be the length of the amplitude table the tone
    /// will be rendered with. A forever tone is expanded to one quantum,
    /// and to at least one sample so the consumer always makes progress.
    pub fn from_tone(tone: &Tone, sample_rate: u32, slope_n_samples: usize) -> Self {
        let mut n_samples = usecs_to_samples(sample_rate, tone.duration_us);
        if tone.is_forever {
            n_samples = n_samples.max(1);
        }

        Self {
            frequency: tone.frequency,
            envelope: tone.envelope,
            n_samples,
            slope_n_samples: slope_n_samples as i64,
            sample_index: 0,
        }
    }

    /// Silence used to finish a partially filled buffer
    pub fn padding(n_samples: usize) -> Self {
        Self {
            frequency: 0,
            envelope: Envelope::None,
            n_samples: n_samples as i64,
            slope_n_samples: 0,
            sample_index: 0,
        }
    }

    /// Samples still to produce
    pub fn remaining(&self) -> i64 {
        self.n_samples - self.sample_index
    }

    /// Amplitude of the sample at `sample_index`
    ///
    /// # Arguments
    /// * `table` - Rising edge amplitudes, `slope_n_samples` long
    /// * `volume` - Plateau amplitude
    fn amplitude(&self, table: &[f32], volume: f32) -> f32 {
        if self.frequency <= 0 {
            return 0.0;
        }

        let i = self.sample_index;
        let n = self.n_samples;
        let slope_n = self.slope_n_samples;

        match self.envelope {
            Envelope::None => volume,
            Envelope::RisingOnly => {
                if i < slope_n {
                    table[i as usize]
                } else {
                    volume
                }
            }
            Envelope::FallingOnly => {
                if i >= n - slope_n {
                    table[(n - i - 1) as usize]
                } else {
                    volume
                }
            }
            Envelope::RisingAndFalling => {
                if i < slope_n {
                    table[i as usize]
                } else if i < n - slope_n {
                    volume
                } else {
                    table[(n - i - 1) as usize]
                }
            }
        }
    }
}

/// Sine oscillator keeping its phase across calls
pub struct SineOscillator {
    sample_rate: u32,
    /// Phase of the next sample, always in [0, 2π)
    phase_offset: f64,
}

impl SineOscillator {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            phase_offset: 0.0,
        }
    }

    pub fn phase_offset(&self) -> f64 {
        self.phase_offset
    }

    /// Render the next `out.len()` samples of `tone` into `out`.
    ///
    /// The time index restarts at zero on each call; continuity comes from
    /// `phase_offset`, which holds the phase of the sample that would follow
    /// the last one written.
    ///
    /// # Returns
    /// Number of samples written (always `out.len()`)
    pub fn fill(
        &mut self,
        out: &mut [Sample],
        tone: &mut ToneExpansion,
        table: &[f32],
        volume: f32,
    ) -> usize {
        let step = TWO_PI * f64::from(tone.frequency) / f64::from(self.sample_rate);

        let mut t = 0usize;
        for slot in out.iter_mut() {
            let phase = step * t as f64 + self.phase_offset;
            let amplitude = f64::from(tone.amplitude(table, volume));
            *slot = (amplitude * phase.sin()).clamp(f64::from(Sample::MIN), f64::from(Sample::MAX))
                as Sample;

            tone.sample_index += 1;
            t += 1;
        }

        let phase = step * t as f64 + self.phase_offset;
        self.phase_offset = phase - (phase / TWO_PI).floor() * TWO_PI;

        t
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: u32 = 44100;
    const VOLUME: f32 = 22937.0;

    fn rectangular(frequency: i32, n_samples: i64) -> ToneExpansion {
        ToneExpansion {
            frequency,
            envelope: Envelope::RisingAndFalling,
            n_samples,
            slope_n_samples: 0,
            sample_index: 0,
        }
    }

    #[test]
    fn test_expansion_sample_counts() {
        let tone = Tone::new(800, 60_000, Envelope::RisingAndFalling);
        let expansion = ToneExpansion::from_tone(&tone, SAMPLE_RATE, 220);
        assert_eq!(expansion.n_samples, 2646);
        assert_eq!(expansion.slope_n_samples, 220);
        assert_eq!(expansion.remaining(), 2646);
    }

    #[test]
    fn test_forever_tone_always_progresses() {
        let expansion = ToneExpansion::from_tone(&Tone::forever(800), 8000, 0);
        assert_eq!(expansion.n_samples, 1);
    }

    #[test]
    fn test_phase_offset_stays_normalized() {
        let mut osc = SineOscillator::new(SAMPLE_RATE);
        let mut buffer = vec![0; 512];
        let mut tone = rectangular(997, 1_000_000);

        for _ in 0..200 {
            osc.fill(&mut buffer, &mut tone, &[], VOLUME);
            assert!(osc.phase_offset() >= 0.0 && osc.phase_offset() < TWO_PI);
        }
    }

    #[test]
    fn test_phase_continuity_across_tones() {
        // Deux tons identiques sans pente: pas de saut à la frontière
        let mut osc = SineOscillator::new(SAMPLE_RATE);
        let mut first = vec![0; 300];
        let mut second = vec![0; 300];

        osc.fill(&mut first, &mut rectangular(800, 300), &[], VOLUME);
        osc.fill(&mut second, &mut rectangular(800, 300), &[], VOLUME);

        let max_step = VOLUME as f64 * TWO_PI * 800.0 / SAMPLE_RATE as f64;
        let boundary = (i32::from(second[0]) - i32::from(first[299])).abs() as f64;
        assert!(
            boundary <= max_step + 1.0,
            "Discontinuity at boundary: {} > {}",
            boundary,
            max_step
        );

        // Same result as one long fill
        let mut reference_osc = SineOscillator::new(SAMPLE_RATE);
        let mut reference = vec![0; 600];
        reference_osc.fill(&mut reference, &mut rectangular(800, 600), &[], VOLUME);
        for (i, (&a, &b)) in reference[300..].iter().zip(second.iter()).enumerate() {
            assert!((i32::from(a) - i32::from(b)).abs() <= 1, "Sample {} differs", i);
        }
    }

    #[test]
    fn test_silence_is_zero() {
        let mut osc = SineOscillator::new(SAMPLE_RATE);
        let mut buffer = vec![1; 128];
        osc.fill(&mut buffer, &mut ToneExpansion::padding(128), &[], VOLUME);
        assert!(buffer.iter().all(|&s| s == 0));
    }

    #[test]
    fn test_standard_envelope_shape() {
        let table: Vec<f32> = (0..10).map(|i| VOLUME * i as f32 / 10.0).collect();
        let mut tone = ToneExpansion {
            frequency: 800,
            envelope: Envelope::RisingAndFalling,
            n_samples: 40,
            slope_n_samples: 10,
            sample_index: 0,
        };

        let amplitudes: Vec<f32> = (0..40)
            .map(|i| {
                tone.sample_index = i;
                tone.amplitude(&table, VOLUME)
            })
            .collect();

        assert_eq!(amplitudes[0], 0.0);
        assert_eq!(amplitudes[5], table[5]);
        assert_eq!(amplitudes[20], VOLUME);
        assert_eq!(amplitudes[39], 0.0, "Falling edge ends at silence");
        assert_eq!(amplitudes[30], table[9]);
    }

    #[test]
    fn test_one_sided_envelopes() {
        let table: Vec<f32> = (0..10).map(|i| i as f32).collect();
        let mut rising = ToneExpansion {
            frequency: 800,
            envelope: Envelope::RisingOnly,
            n_samples: 20,
            slope_n_samples: 10,
            sample_index: 3,
        };
        assert_eq!(rising.amplitude(&table, 100.0), 3.0);
        rising.sample_index = 19;
        assert_eq!(rising.amplitude(&table, 100.0), 100.0);

        let mut falling = ToneExpansion {
            envelope: Envelope::FallingOnly,
            ..rising.clone()
        };
        falling.sample_index = 0;
        assert_eq!(falling.amplitude(&table, 100.0), 100.0);
        falling.sample_index = 19;
        assert_eq!(falling.amplitude(&table, 100.0), 0.0);
    }
}
