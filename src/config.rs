// Engine configuration - Defaults and tolerances for grid analysis and solving
// Threaded explicitly through the model, solver and engine constructors

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{TransformError, TransformResult};
use crate::midi::{TimeSignature, MIN_BPM};

/// Configuration shared by grid analysis, solving and regeneration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Tempo assumed when the source has no tempo event
    pub default_bpm: f64,

    /// Time base used when the source declares none (0 ticks per beat)
    pub default_ticks_per_beat: u16,

    /// Length of the synthetic segment used for sources with fewer than
    /// two distinct timestamps
    pub fallback_segment_ticks: f64,

    /// Timestamps closer than this (in ticks) collapse into one grid line
    pub grid_merge_tolerance: f64,

    /// Events further than this (in ticks) from every grid line and past the
    /// source end are forced into the terminal bucket
    pub bucket_match_tolerance: f64,

    /// Drift below this many milliseconds is graded tight
    pub drift_tight_ms: f64,

    /// Drift below this many milliseconds is graded loose
    pub drift_loose_ms: f64,

    /// Time signature written when the source has none
    pub default_time_signature: TimeSignature,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            default_bpm: 120.0,
            default_ticks_per_beat: 960,
            fallback_segment_ticks: 960.0,
            grid_merge_tolerance: 0.001,
            bucket_match_tolerance: 1.0,
            drift_tight_ms: 10.0,
            drift_loose_ms: 30.0,
            default_time_signature: TimeSignature::four_four(),
        }
    }
}

impl EngineConfig {
    /// Load a configuration from a JSON file; missing fields keep their defaults
    pub fn from_json_file(path: &Path) -> TransformResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            TransformError::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> TransformResult<Self> {
        let config: EngineConfig = serde_json::from_str(text)
            .map_err(|e| TransformError::Config(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the numeric paths meaningless
    pub fn validate(&self) -> TransformResult<()> {
        if !(self.default_bpm.is_finite() && self.default_bpm >= MIN_BPM) {
            return Err(TransformError::Config(format!(
                "default_bpm must be a finite tempo of at least {:.3} BPM",
                MIN_BPM
            )));
        }
        if self.default_ticks_per_beat == 0 {
            return Err(TransformError::Config(
                "default_ticks_per_beat must be > 0".to_string(),
            ));
        }
        if !(self.fallback_segment_ticks > 0.0) {
            return Err(TransformError::Config(
                "fallback_segment_ticks must be > 0".to_string(),
            ));
        }
        if self.grid_merge_tolerance < 0.0 || self.bucket_match_tolerance < 0.0 {
            return Err(TransformError::Config(
                "tolerances must not be negative".to_string(),
            ));
        }
        if self.drift_loose_ms < self.drift_tight_ms {
            return Err(TransformError::Config(
                "drift_loose_ms must be >= drift_tight_ms".to_string(),
            ));
        }
        Ok(())
    }

    /// Source time base, or the default when unknown
    pub fn effective_ticks_per_beat(&self, declared: u16) -> u16 {
        if declared > 0 {
            declared
        } else {
            self.default_ticks_per_beat
        }
    }
}
