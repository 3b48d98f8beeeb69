// Timing synchronizer - speed/gap/weighting to microsecond timings
//
// All arithmetic is integer, on microseconds. The spaces are layered:
// `eoc_space` is what must be added after an `eom_space` to make a full
// inter-character gap, and `eow_space` what must be added after that to
// make a full inter-word gap. Enqueue the layers in sequence, never the
// absolute gap.

use crate::error::ParameterError;

/// Dot length in microseconds at 1 WPM (PARIS calibration)
pub const DOT_CALIBRATION: i64 = 1_200_000;

pub const SPEED_MIN: i32 = 5;
pub const SPEED_MAX: i32 = 60;
pub const SPEED_DEFAULT: i32 = 12;

pub const GAP_MIN: i32 = 0;
pub const GAP_MAX: i32 = 60;
pub const GAP_DEFAULT: i32 = 0;

pub const WEIGHTING_MIN: i32 = 20;
pub const WEIGHTING_MAX: i32 = 80;
pub const WEIGHTING_DEFAULT: i32 = 50;

/// Microsecond timings derived from the sending parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendTimings {
    /// Length of one Morse unit
    pub unit: i64,
    pub dot_len: i64,
    pub dash_len: i64,
    /// Space after each mark
    pub eom_space: i64,
    /// Added to `eom_space` to complete an inter-character gap
    pub eoc_space: i64,
    /// Added to `eom_space + eoc_space` to complete an inter-word gap
    pub eow_space: i64,
    /// Farnsworth extension of the inter-character gap
    pub additional_space: i64,
    /// Farnsworth extension of the inter-word gap
    pub adjustment_space: i64,
}

impl SendTimings {
    /// Compute timings for a speed (WPM), a gap (units) and a weighting (%)
    pub fn compute(speed: i32, gap: i32, weighting: i32) -> Self {
        let unit = DOT_CALIBRATION / i64::from(speed);
        let weight_adj = 2 * (i64::from(weighting) - 50) * unit / 100;

        let dot_len = unit + weight_adj;
        let dash_len = 3 * dot_len;

        let eom_space = unit - (28 * weight_adj) / 22;
        let eoc_space = 3 * unit - eom_space;
        let eow_space = 7 * unit - eoc_space;

        let additional_space = i64::from(gap) * unit;
        let adjustment_space = (7 * additional_space) / 3;

        Self {
            unit,
            dot_len,
            dash_len,
            eom_space,
            eoc_space,
            eow_space,
            additional_space,
            adjustment_space,
        }
    }
}

impl Default for SendTimings {
    fn default() -> Self {
        Self::compute(SPEED_DEFAULT, GAP_DEFAULT, WEIGHTING_DEFAULT)
    }
}

/// Sending parameters with a lazily recomputed timing cache
#[derive(Debug, Clone)]
pub struct TimingSynchronizer {
    speed: i32,
    gap: i32,
    weighting: i32,
    timings: SendTimings,
    dirty: bool,
}

impl TimingSynchronizer {
    pub fn new() -> Self {
        Self {
            speed: SPEED_DEFAULT,
            gap: GAP_DEFAULT,
            weighting: WEIGHTING_DEFAULT,
            timings: SendTimings::default(),
            dirty: false,
        }
    }

    pub fn set_speed(&mut self, speed: i32) -> Result<(), ParameterError> {
        check_range("speed", speed, SPEED_MIN, SPEED_MAX)?;
        if speed != self.speed {
            self.speed = speed;
            self.dirty = true;
        }
        Ok(())
    }

    pub fn set_gap(&mut self, gap: i32) -> Result<(), ParameterError> {
        check_range("gap", gap, GAP_MIN, GAP_MAX)?;
        if gap != self.gap {
            self.gap = gap;
            self.dirty = true;
        }
        Ok(())
    }

    pub fn set_weighting(&mut self, weighting: i32) -> Result<(), ParameterError> {
        check_range("weighting", weighting, WEIGHTING_MIN, WEIGHTING_MAX)?;
        if weighting != self.weighting {
            self.weighting = weighting;
            self.dirty = true;
        }
        Ok(())
    }

    pub fn speed(&self) -> i32 {
        self.speed
    }

    pub fn gap(&self) -> i32 {
        self.gap
    }

    pub fn weighting(&self) -> i32 {
        self.weighting
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Recompute the cached timings if a parameter changed since the last call
    pub fn sync(&mut self) -> SendTimings {
        if self.dirty {
            self.timings = SendTimings::compute(self.speed, self.gap, self.weighting);
            self.dirty = false;
            tracing::debug!(
                speed = self.speed,
                gap = self.gap,
                weighting = self.weighting,
                dot_len = self.timings.dot_len,
                "timings resynchronized"
            );
        }
        self.timings
    }
}

impl Default for TimingSynchronizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Range check shared by every parameter setter
pub(crate) fn check_range(
    parameter: &'static str,
    value: i32,
    min: i32,
    max: i32,
) -> Result<(), ParameterError> {
    if value < min || value > max {
        return Err(ParameterError::OutOfRange {
            parameter,
            value: i64::from(value),
            min: i64::from(min),
            max: i64::from(max),
        });
    }
    Ok(())
}
