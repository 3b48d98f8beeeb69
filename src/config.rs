// Configuration du générateur - persistance RON/JSON

use ron::ser::PrettyConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::audio::system::AudioSystem;
use crate::error::{ConfigError, ParameterError, QueueError};
use crate::morse::timing::{
    GAP_DEFAULT, GAP_MAX, GAP_MIN, SPEED_DEFAULT, SPEED_MAX, SPEED_MIN, WEIGHTING_DEFAULT,
    WEIGHTING_MAX, WEIGHTING_MIN, check_range,
};
use crate::synth::envelope::{DEFAULT_SLOPE_USECS, SlopeShape, ToneSlope};
use crate::synth::generator::{
    FREQUENCY_DEFAULT, FREQUENCY_MAX, FREQUENCY_MIN, VOLUME_DEFAULT, VOLUME_MAX, VOLUME_MIN,
};
use crate::synth::queue::{DEFAULT_CAPACITY, DEFAULT_HIGH_WATER_MARK, MAX_CAPACITY};

pub const DEFAULT_BUFFER_LEN: usize = 512;

/// Everything needed to build a Generator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub audio_system: AudioSystem,
    /// Device name, or output path for the WAV sink
    pub device: Option<String>,
    pub speed: i32,
    pub frequency: i32,
    pub volume: i32,
    pub gap: i32,
    pub weighting: i32,
    pub slope_shape: SlopeShape,
    pub slope_length_us: i64,
    /// Samples per sink write
    pub buffer_len: usize,
    pub queue_capacity: usize,
    pub queue_high_water_mark: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            audio_system: AudioSystem::default(),
            device: None,
            speed: SPEED_DEFAULT,
            frequency: FREQUENCY_DEFAULT,
            volume: VOLUME_DEFAULT,
            gap: GAP_DEFAULT,
            weighting: WEIGHTING_DEFAULT,
            slope_shape: SlopeShape::default(),
            slope_length_us: DEFAULT_SLOPE_USECS,
            buffer_len: DEFAULT_BUFFER_LEN,
            queue_capacity: DEFAULT_CAPACITY,
            queue_high_water_mark: DEFAULT_HIGH_WATER_MARK,
        }
    }
}

impl GeneratorConfig {
    /// Check every value against its allowed range
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("speed", self.speed, SPEED_MIN, SPEED_MAX)?;
        check_range("frequency", self.frequency, FREQUENCY_MIN, FREQUENCY_MAX)?;
        check_range("volume", self.volume, VOLUME_MIN, VOLUME_MAX)?;
        check_range("gap", self.gap, GAP_MIN, GAP_MAX)?;
        check_range("weighting", self.weighting, WEIGHTING_MIN, WEIGHTING_MAX)?;

        // Any supported rate will do: only the shape/length pairing is checked here
        ToneSlope::new(self.slope_shape, self.slope_length_us, 8000, 0)?;

        if self.buffer_len == 0 {
            return Err(ParameterError::OutOfRange {
                parameter: "buffer_len",
                value: 0,
                min: 1,
                max: i64::MAX,
            }
            .into());
        }

        if self.queue_capacity == 0
            || self.queue_capacity > MAX_CAPACITY
            || self.queue_high_water_mark == 0
            || self.queue_high_water_mark > self.queue_capacity
        {
            return Err(QueueError::InvalidCapacity {
                capacity: self.queue_capacity,
                high_water_mark: self.queue_high_water_mark,
            }
            .into());
        }

        Ok(())
    }

    pub fn from_ron_str(data: &str) -> Result<Self, ConfigError> {
        let config: Self = ron::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_ron_string(&self) -> Result<String, ConfigError> {
        Ok(ron::ser::to_string_pretty(self, PrettyConfig::default())?)
    }

    pub fn from_json_str(data: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load from a `.ron` or `.json` file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let format = ConfigFormat::from_path(path)?;
        let data = fs::read_to_string(path)?;

        let config = match format {
            ConfigFormat::Ron => Self::from_ron_str(&data)?,
            ConfigFormat::Json => Self::from_json_str(&data)?,
        };
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Save to a `.ron` or `.json` file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let data = match ConfigFormat::from_path(path)? {
            ConfigFormat::Ron => self.to_ron_string()?,
            ConfigFormat::Json => self.to_json_string()?,
        };
        fs::write(path, data)?;
        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigFormat {
    Ron,
    Json,
}

impl ConfigFormat {
    fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("ron") => Ok(ConfigFormat::Ron),
            Some("json") => Ok(ConfigFormat::Json),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }
}
