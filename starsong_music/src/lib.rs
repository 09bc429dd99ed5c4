// Starsong Music Engine
//
// Turns a validated control surface into a finished, measured piece of music.
// Every stage is a pure function of its inputs: generators are seeded from the
// control-surface hash plus a per-stage purpose string, so identical inputs
// produce identical events, identical audio bytes and identical verdicts.
//
// Architecture:
// - controls.rs: Control surface and control vector, validation, canonical hash
// - astro.rs: Astrological summary (element/modality weights, clusters)
// - event.rs: Core piece representation (segments of timed note events)
// - scale.rs: Scale modes and tonic selection, degree <-> pitch mapping
// - compose.rs: Structure planning per mode plus melody/rhythm/harmony filling
// - finalize.rs: Density banding, adds events until targets are met
// - render.rs: Mono PCM16 renderer with byte-identical output
// - features.rs: Step/leap ratio, arc adherence, narrative flow, rhythm diversity
// - gates.rs: Calibrated and strict quality gates over the features
//
// Typical flow: `ControlSurface` -> `compose::compose_piece` ->
// `finalize::finalize` -> `render::render` + `features::measure` ->
// `gates::evaluate`. The starsong_compose crate wires these together.

pub mod astro;
pub mod compose;
pub mod controls;
pub mod event;
pub mod features;
pub mod finalize;
pub mod gates;
pub mod render;
pub mod scale;
