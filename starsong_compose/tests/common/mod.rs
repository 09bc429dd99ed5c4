// Shared fixtures for the compose integration tests.
//
// The gate tier can be forced from the config: all thresholds at 0.0 makes
// every piece PASS, all thresholds at 1.0 makes every realistic piece FAIL,
// so text-state behavior is testable without hunting for control values
// that land on one side of a calibrated threshold.

#![allow(dead_code)]

use starsong_compose::upstream::{ChartPoint, Ephemeris, UpstreamError, VectorModel};
use starsong_compose::{ComposeConfig, ComposeContext, OverlayParams};
use starsong_music::astro::{AstroSummary, ElementWeights};
use starsong_music::controls::{ControlSurface, ControlVector};
use starsong_music::gates::{GatePolicy, GateThresholds};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const NATAL_DATETIME: &str = "1990-04-01T12:00:00Z";
pub const CURRENT_DATETIME: &str = "2024-06-01T12:00:00Z";

/// The reference sandbox surface.
pub fn seed_a() -> ControlSurface {
    ControlSurface {
        step_bias: 0.62,
        leap_cap: 3,
        rhythm_template_id: 4,
        syncopation_bias: 0.28,
        density_level: 0.5,
        arc_shape: 0.45,
        motif_rate: 0.4,
        hash: "seed-A".into(),
        ..ControlSurface::default()
    }
}

pub fn default_context() -> ComposeContext {
    ComposeContext::with_default_tables(ComposeConfig::default()).unwrap()
}

/// Context whose calibrated and strict thresholds are all `threshold`.
pub fn context_with_thresholds(threshold: f64) -> ComposeContext {
    let tier = GateThresholds {
        melody_arc: threshold,
        melody_step_leap: threshold,
        melody_narrative: threshold,
        rhythm_diversity: threshold,
    };
    let config = ComposeConfig {
        duration_secs: 30.0,
        gates: GatePolicy {
            version: format!("test-{threshold}"),
            calibrated: tier,
            strict: tier,
        },
        ..ComposeConfig::default()
    };
    ComposeContext::with_default_tables(config).unwrap()
}

/// Ephemeris that stamps the chart datetime into the summary and favors
/// water, with Venus leading.
pub struct StampingEphemeris;

impl Ephemeris for StampingEphemeris {
    fn summarize(&self, point: &ChartPoint) -> Result<AstroSummary, UpstreamError> {
        Ok(AstroSummary {
            elements: ElementWeights::favoring(starsong_music::controls::Element::Water),
            dominant_planets: vec!["venus".into(), "moon".into()],
            timestamp: point.datetime.clone(),
            ..AstroSummary::neutral()
        })
    }
}

/// Model returning a fixed vector per chart datetime, neutral otherwise.
pub struct TableModel(pub BTreeMap<String, ControlVector>);

impl TableModel {
    pub fn natal_current(natal: ControlVector, current: ControlVector) -> Self {
        let mut map = BTreeMap::new();
        map.insert(NATAL_DATETIME.to_string(), natal);
        map.insert(CURRENT_DATETIME.to_string(), current);
        TableModel(map)
    }
}

impl VectorModel for TableModel {
    fn infer(&self, astro: &AstroSummary) -> Result<ControlVector, UpstreamError> {
        Ok(self
            .0
            .get(&astro.timestamp)
            .copied()
            .unwrap_or_else(ControlVector::neutral))
    }
}

/// Ephemeris and model that always fail.
pub struct Offline;

impl Ephemeris for Offline {
    fn summarize(&self, _: &ChartPoint) -> Result<AstroSummary, UpstreamError> {
        Err(UpstreamError::Unavailable("connection refused".into()))
    }
}

impl VectorModel for Offline {
    fn infer(&self, _: &AstroSummary) -> Result<ControlVector, UpstreamError> {
        Err(UpstreamError::Unavailable("model not loaded".into()))
    }
}

/// Vector with melodic activity and rhythm density both at `level`, so the
/// lifted surface has `density_level == level`.
pub fn dense_vector(level: f64) -> ControlVector {
    ControlVector {
        melodic_activity: level,
        rhythm_density: level,
        ..ControlVector::neutral()
    }
}

/// Forced-PASS overlay context with the given natal and current vectors.
pub fn overlay_context(natal: ControlVector, current: ControlVector) -> ComposeContext {
    context_with_thresholds(0.0)
        .with_ephemeris(Arc::new(StampingEphemeris))
        .with_model(Arc::new(TableModel::natal_current(natal, current)))
}

pub fn overlay_params() -> OverlayParams {
    OverlayParams {
        natal_latitude: 40.7,
        natal_longitude: -74.0,
        natal_datetime: NATAL_DATETIME.into(),
        current_latitude: 40.7,
        current_longitude: -74.0,
        current_datetime: CURRENT_DATETIME.into(),
    }
}
