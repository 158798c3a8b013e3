use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, EngineKind, Result};

/// Number of manual taps expected before automatic output resumes.
pub const DEFAULT_COUNT_IN: u32 = 4;
/// Neutral tempo the count-in history is seeded with.
pub const DEFAULT_SEED_TEMPO_BPM: f64 = 120.0;

/// Top-level configuration for a single tracked stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub sample_rate: u32,
    /// Host audio block size; becomes the engine hop size.
    pub block_size: usize,
    pub count_in: u32,
    pub seed_tempo_bpm: f64,
    pub tap_unit: TapUnit,
    pub engine: EngineKind,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            block_size: 512,
            count_in: DEFAULT_COUNT_IN,
            seed_tempo_bpm: DEFAULT_SEED_TEMPO_BPM,
            tap_unit: TapUnit::default(),
            engine: EngineKind::default(),
        }
    }
}

impl TrackerConfig {
    /// Checks every field, reporting the first one that is out of range.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::InvalidSampleRate(self.sample_rate));
        }
        if self.block_size == 0 {
            return Err(ConfigError::InvalidBlockSize(self.block_size));
        }
        if self.count_in == 0 {
            return Err(ConfigError::InvalidCountIn(self.count_in));
        }
        if !self.seed_tempo_bpm.is_finite() || self.seed_tempo_bpm <= 0.0 {
            return Err(ConfigError::InvalidSeedTempo(self.seed_tempo_bpm));
        }
        Ok(())
    }

    /// Parses and validates a JSON document. Missing fields take their
    /// default values.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}

/// Unit convention for the interval between two manual taps.
///
/// Timestamps always arrive in milliseconds. Two conventions exist for turning
/// the difference into a beat period before the `(0, 1)` trust window and the
/// `60 / period` conversion are applied, and they disagree by a factor of
/// 1000 in the tap rates they accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TapUnit {
    /// Divide the millisecond delta by 1000. The trust window accepts taps
    /// faster than 60 BPM and the result is a true BPM value.
    #[default]
    Seconds,
    /// Use the millisecond delta as-is. Only sub-millisecond spacing passes
    /// the trust window.
    Raw,
}

impl TapUnit {
    /// Converts a millisecond delta into the beat period used by the
    /// estimator.
    pub fn period(self, delta_ms: f64) -> f64 {
        match self {
            Self::Seconds => delta_ms / 1000.0,
            Self::Raw => delta_ms,
        }
    }
}
