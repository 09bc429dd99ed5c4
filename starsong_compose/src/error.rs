// Error types for the compose orchestrator.
//
// `ConfigError` covers everything that can go wrong while building a
// `ComposeContext` at startup (bad config JSON, invalid mapping tables, a gate
// policy whose strict thresholds sit below the calibrated ones). These are
// fatal: the process should refuse to serve.
//
// `ComposeError` covers per-request rejections (invalid controls, missing or
// malformed overlay parameters). They carry the offending field and never
// produce partial output. A failing quality gate is not an error; it is a
// normal fail-closed response.

use starsong_explain::MappingError;
use starsong_music::controls::ControlError;
use starsong_music::gates::GatePolicyError;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("duration_secs must be positive and finite, got {0}")]
    InvalidDuration(f64),

    #[error("sample_rate must be positive, got {0}")]
    InvalidSampleRate(u32),

    #[error("invalid gate policy: {0}")]
    Gates(#[from] GatePolicyError),

    #[error("invalid mapping tables: {0}")]
    Mapping(#[from] MappingError),
}

#[derive(Debug, thiserror::Error)]
pub enum ComposeError {
    #[error("invalid controls: {0}")]
    InvalidControls(#[from] ControlError),

    #[error("overlay mode requires overlayParams")]
    MissingOverlayParams,

    #[error("overlay parameter {field} is {value}, expected {expected}")]
    InvalidOverlayParam {
        field: &'static str,
        value: f64,
        expected: &'static str,
    },

    #[error("invalid request JSON: {0}")]
    Request(#[from] serde_json::Error),

    #[error("failed to encode output for hashing: {0}")]
    Encode(#[source] serde_json::Error),
}

impl ComposeError {
    /// Name of the offending input field, when there is one.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            ComposeError::InvalidControls(ControlError::NonFinite { field })
            | ComposeError::InvalidControls(ControlError::OutOfRange { field, .. }) => Some(*field),
            ComposeError::MissingOverlayParams => Some("overlayParams"),
            ComposeError::InvalidOverlayParam { field, .. } => Some(*field),
            ComposeError::Request(_) | ComposeError::Encode(_) => None,
        }
    }
}
