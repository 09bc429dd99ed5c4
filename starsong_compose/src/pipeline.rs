// The compose pipeline: request -> response plus all intermediate products.
//
// Stages, in order:
// 1. Resolve the control surface. Sandbox requests use the supplied controls
//    (validated) or, without controls, the neutral vector jittered by
//    `seed`. Overlay requests cast natal and current charts through the
//    ephemeris, infer both vectors through the model (neutral fallbacks on
//    any upstream failure) and lift them to surfaces.
// 2. Compose the piece for the requested structure, finalize densities.
// 3. Render audio, measure features, evaluate both gate tiers.
// 4. Realize text (PASS or FAIL-CLOSED; overlay contrast natal vs current).
// 5. Assemble the response and content hashes.
//
// Every stage is a pure function of its inputs. The only impure input is the
// wall-clock timestamp, which `compose` reads and `compose_at` takes as an
// argument.

use crate::context::ComposeContext;
use crate::error::ComposeError;
use crate::hashing::{ContentHashes, audio_url};
use crate::request::{Artifacts, AstroEcho, AudioRef, ComposeRequest, ComposeResponse, RequestMode};
use crate::upstream::{Provenance, astro_or_neutral, vector_or_neutral};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use starsong_explain::realize::{RealizeInput, realize};
use starsong_music::astro::AstroSummary;
use starsong_music::compose::{CompositionInput, compose_piece};
use starsong_music::controls::{ControlSurface, ControlVector};
use starsong_music::event::Piece;
use starsong_music::features::{Features, measure};
use starsong_music::finalize::{FinalizeReport, finalize};
use starsong_music::gates::evaluate;
use starsong_music::render::{AudioBuffer, render};
use starsong_prng::SeedRng;
use tracing::{debug, info, info_span};

/// Largest per-dimension jitter applied to the neutral sandbox vector.
pub const SANDBOX_JITTER: f64 = 0.15;

/// Everything one request produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComposeOutput {
    pub response: ComposeResponse,
    pub piece: Piece,
    pub audio: AudioBuffer,
    pub features: Features,
    pub finalize: FinalizeReport,
    pub hashes: ContentHashes,
}

/// Surfaces and chart data for one request.
struct Resolved {
    controls: ControlSurface,
    vector: ControlVector,
    astro: AstroSummary,
    /// Whether `astro` came from the ephemeris rather than the fallback.
    charted: bool,
    natal: Option<ControlSurface>,
}

/// Run the pipeline, stamping the response with the current UTC time.
pub fn compose(
    ctx: &ComposeContext,
    request: &ComposeRequest,
) -> Result<ComposeOutput, ComposeError> {
    let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    compose_at(ctx, request, &timestamp)
}

/// Run the pipeline with an explicit timestamp.
pub fn compose_at(
    ctx: &ComposeContext,
    request: &ComposeRequest,
    timestamp: &str,
) -> Result<ComposeOutput, ComposeError> {
    let structure = request.structure.unwrap_or_default();
    let span = info_span!(
        "compose",
        mode = ?request.mode,
        structure = structure.as_str(),
        seed = tracing::field::Empty,
    );
    let _guard = span.enter();

    let resolved = resolve(ctx, request)?;
    let controls = &resolved.controls;
    span.record("seed", controls.hash.as_str());

    let config = ctx.config();
    let draft = compose_piece(&CompositionInput {
        controls,
        vector: &resolved.vector,
        mode: structure,
        duration: config.duration_secs,
        astro: resolved.charted.then_some(&resolved.astro),
    });
    let (piece, finalize_report) = finalize(&draft, controls, &resolved.vector);

    let audio = render(&piece, config.sample_rate);
    let features = measure(&piece, controls.arc_shape);
    let gate_report = evaluate(&features, &config.gates);

    let text = realize(
        ctx.tables(),
        &RealizeInput {
            controls,
            astro: &resolved.astro,
            gates: &gate_report,
            natal: resolved.natal.as_ref(),
        },
    );

    let hashes = ContentHashes::compute(&audio, &piece, &text).map_err(ComposeError::Encode)?;
    info!(
        events = piece.event_count(),
        calibrated = gate_report.calibrated.overall,
        strict = gate_report.strict.overall,
        audio_sha256 = %hashes.audio,
        "composed"
    );

    let response = ComposeResponse {
        controls: controls.clone(),
        astro: AstroEcho {
            element_dominance: controls.element_dominance,
            aspect_tension: controls.aspect_tension,
            modality: controls.modality,
        },
        gate_report,
        audio: AudioRef {
            url: audio_url(&controls.hash, structure),
        },
        text,
        artifacts: Artifacts {
            model: config.artifacts.model.clone(),
            encoder: config.artifacts.encoder.clone(),
            snapset: config.artifacts.snapset.clone(),
            gate: config.gates.version.clone(),
            mapping_tables_version: ctx.tables().version().to_string(),
            timestamp: timestamp.to_string(),
        },
    };

    Ok(ComposeOutput {
        response,
        piece,
        audio,
        features,
        finalize: finalize_report,
        hashes,
    })
}

fn resolve(ctx: &ComposeContext, request: &ComposeRequest) -> Result<Resolved, ComposeError> {
    match request.mode {
        RequestMode::Sandbox => resolve_sandbox(request),
        RequestMode::Overlay => resolve_overlay(ctx, request),
    }
}

fn resolve_sandbox(request: &ComposeRequest) -> Result<Resolved, ComposeError> {
    if let Some(controls) = &request.controls {
        let controls = controls.clone().validated()?;
        return Ok(Resolved {
            vector: controls.vector(),
            controls,
            astro: AstroSummary::neutral(),
            charted: false,
            natal: None,
        });
    }

    let vector = sandbox_vector(request.seed);
    let astro = AstroSummary::neutral();
    debug!(seed = ?request.seed, "sandbox request without controls, using neutral vector");
    Ok(Resolved {
        controls: ControlSurface::from_vector(&vector, &astro),
        vector,
        astro,
        charted: false,
        natal: None,
    })
}

/// The neutral vector, jittered per dimension by up to `SANDBOX_JITTER`
/// when a seed is given.
pub fn sandbox_vector(seed: Option<u64>) -> ControlVector {
    let neutral = ControlVector::neutral();
    let Some(seed) = seed else {
        return neutral;
    };
    let mut rng = SeedRng::derive(&seed.to_string(), "sandbox");
    let mut dims = neutral.as_array();
    for d in &mut dims {
        *d += rng.range_f64(-SANDBOX_JITTER, SANDBOX_JITTER);
    }
    ControlVector::from_array(dims)
}

fn resolve_overlay(
    ctx: &ComposeContext,
    request: &ComposeRequest,
) -> Result<Resolved, ComposeError> {
    let params = request
        .overlay_params
        .as_ref()
        .ok_or(ComposeError::MissingOverlayParams)?;
    params.validate()?;
    if request.controls.is_some() {
        debug!("overlay request carries controls; they are ignored");
    }

    let (natal_astro, _) = astro_or_neutral(ctx.ephemeris(), &params.natal());
    let (current_astro, provenance) = astro_or_neutral(ctx.ephemeris(), &params.current());
    let (natal_vector, _) = vector_or_neutral(ctx.model(), &natal_astro);
    let (current_vector, _) = vector_or_neutral(ctx.model(), &current_astro);

    Ok(Resolved {
        controls: ControlSurface::from_vector(&current_vector, &current_astro),
        natal: Some(ControlSurface::from_vector(&natal_vector, &natal_astro)),
        vector: current_vector,
        astro: current_astro,
        charted: provenance == Provenance::Upstream,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sandbox_vector_without_seed_is_neutral() {
        assert_eq!(sandbox_vector(None), ControlVector::neutral());
    }

    #[test]
    fn test_sandbox_vector_jitter_is_bounded_and_seeded() {
        let a = sandbox_vector(Some(7));
        assert_eq!(a, sandbox_vector(Some(7)));
        assert_ne!(a, sandbox_vector(Some(8)));
        for x in a.as_array() {
            assert!((x - 0.5).abs() <= SANDBOX_JITTER);
        }
    }

    #[test]
    fn test_overlay_without_params_is_rejected() {
        let ctx = ComposeContext::with_default_tables(Default::default()).unwrap();
        let request = ComposeRequest {
            mode: RequestMode::Overlay,
            controls: None,
            overlay_params: None,
            seed: None,
            structure: None,
        };
        let err = compose_at(&ctx, &request, "t").unwrap_err();
        assert!(matches!(err, ComposeError::MissingOverlayParams));
    }
}
