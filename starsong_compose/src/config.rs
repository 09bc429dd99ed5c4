// Data-driven compose configuration.
//
// Every tunable the orchestrator reads lives in `ComposeConfig`, loaded from
// JSON once at startup: piece duration, render sample rate, the artifact
// version strings echoed in every response, and the gate policy. Missing
// fields fall back to `Default`, so `{}` is a valid config.
//
// Validation runs when a `ComposeContext` is built. A gate policy whose
// strict thresholds sit below the calibrated ones is rejected there; it can
// never reach a request.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use starsong_music::compose::DEFAULT_DURATION_SECS;
use starsong_music::gates::GatePolicy;
use starsong_music::render::DEFAULT_SAMPLE_RATE;
use std::path::Path;

/// Version strings of the upstream artifacts, echoed in `artifacts`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactVersions {
    /// The chart-to-vector model.
    pub model: String,
    /// The audio encoder consuming rendered buffers.
    pub encoder: String,
    /// The snapshot set the model was calibrated against.
    pub snapset: String,
}

impl Default for ArtifactVersions {
    fn default() -> Self {
        ArtifactVersions {
            model: "vector-model-v3".to_string(),
            encoder: "pcm16-mono-v1".to_string(),
            snapset: "snapset-2024.2".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposeConfig {
    /// Total piece duration in seconds.
    pub duration_secs: f64,
    /// Render sample rate in Hz.
    pub sample_rate: u32,
    pub artifacts: ArtifactVersions,
    /// Calibrated and strict thresholds; `gates.version` is reported as the
    /// `gate` artifact.
    pub gates: GatePolicy,
}

impl Default for ComposeConfig {
    fn default() -> Self {
        ComposeConfig {
            duration_secs: DEFAULT_DURATION_SECS,
            sample_rate: DEFAULT_SAMPLE_RATE,
            artifacts: ArtifactVersions::default(),
            gates: GatePolicy::default(),
        }
    }
}

impl ComposeConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Check every field. Called by `ComposeContext::new`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.duration_secs.is_finite() || self.duration_secs <= 0.0 {
            return Err(ConfigError::InvalidDuration(self.duration_secs));
        }
        if self.sample_rate == 0 {
            return Err(ConfigError::InvalidSampleRate(self.sample_rate));
        }
        self.gates.validate()?;
        Ok(())
    }
}
