// Request and response types for the compose orchestrator.
//
// Wire names follow the external contract: request keys are camelCase
// (`overlayParams`, `natalLatitude`), response sections snake_case
// (`gate_report`, `mapping_tables_version`). Control-surface fields keep
// their snake_case names in both directions.

use crate::error::ComposeError;
use crate::upstream::ChartPoint;
use serde::{Deserialize, Serialize};
use starsong_explain::realize::TextOutput;
use starsong_music::controls::{ControlSurface, Element, Modality};
use starsong_music::event::StructureMode;
use starsong_music::gates::GateReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestMode {
    Sandbox,
    Overlay,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayParams {
    pub natal_latitude: f64,
    pub natal_longitude: f64,
    pub natal_datetime: String,
    pub current_latitude: f64,
    pub current_longitude: f64,
    pub current_datetime: String,
}

impl OverlayParams {
    /// Reject coordinates that are non-finite or off the globe.
    pub fn validate(&self) -> Result<(), ComposeError> {
        let checks = [
            ("natalLatitude", self.natal_latitude, 90.0, "[-90, 90]"),
            ("natalLongitude", self.natal_longitude, 180.0, "[-180, 180]"),
            ("currentLatitude", self.current_latitude, 90.0, "[-90, 90]"),
            ("currentLongitude", self.current_longitude, 180.0, "[-180, 180]"),
        ];
        for (field, value, limit, expected) in checks {
            if !value.is_finite() || value.abs() > limit {
                return Err(ComposeError::InvalidOverlayParam {
                    field,
                    value,
                    expected,
                });
            }
        }
        Ok(())
    }

    pub fn natal(&self) -> ChartPoint {
        ChartPoint {
            latitude: self.natal_latitude,
            longitude: self.natal_longitude,
            datetime: self.natal_datetime.clone(),
        }
    }

    pub fn current(&self) -> ChartPoint {
        ChartPoint {
            latitude: self.current_latitude,
            longitude: self.current_longitude,
            datetime: self.current_datetime.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposeRequest {
    pub mode: RequestMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controls: Option<ControlSurface>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlay_params: Option<OverlayParams>,
    /// Jitter seed for sandbox requests without controls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Composition structure; house order when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structure: Option<StructureMode>,
}

impl ComposeRequest {
    pub fn from_json(json: &str) -> Result<Self, ComposeError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Sandbox request with explicit controls.
    pub fn sandbox(controls: ControlSurface) -> Self {
        ComposeRequest {
            mode: RequestMode::Sandbox,
            controls: Some(controls),
            overlay_params: None,
            seed: None,
            structure: None,
        }
    }

    pub fn overlay(params: OverlayParams) -> Self {
        ComposeRequest {
            mode: RequestMode::Overlay,
            controls: None,
            overlay_params: Some(params),
            seed: None,
            structure: None,
        }
    }

    pub fn with_structure(mut self, structure: StructureMode) -> Self {
        self.structure = Some(structure);
        self
    }
}

/// The categorical astro fields echoed back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AstroEcho {
    pub element_dominance: Element,
    pub aspect_tension: f64,
    pub modality: Modality,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioRef {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifacts {
    pub model: String,
    pub encoder: String,
    pub snapset: String,
    pub gate: String,
    pub mapping_tables_version: String,
    /// Wall-clock time of the request. Excluded from determinism checks.
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposeResponse {
    pub controls: ControlSurface,
    pub astro: AstroEcho,
    pub gate_report: GateReport,
    pub audio: AudioRef,
    pub text: TextOutput,
    pub artifacts: Artifacts,
}
