// Composition generator: control surface + structure mode -> segmented piece.
//
// Generation happens in two passes:
// 1. Plan the segment boundaries for the requested mode (house order,
//    cluster, elemental, lunar). Boundaries come from cumulative weights
//    with the final end pinned to the requested duration, so the segments
//    always tile the piece exactly. Cluster spans are clamped to
//    [CLUSTER_MIN_SECS, CLUSTER_MAX_SECS]; when they overrun the piece, a
//    tail shorter than the minimum is merged into the previous cluster
//    instead of becoming a cluster of its own.
// 2. Fill every segment with one shared routine. Candidate onsets sit on a
//    global beat grid (melody per beat, rhythm per eighth, harmony per bar)
//    and each candidate is accepted by an independent generator draw against
//    the role's rate. A segment that drew no melody gets one injected at its
//    midpoint, so no segment is ever melodically empty.
//
// Melody pitches come from `MelodyWalker`, which walks scale degrees toward a
// triangle arc target peaking at `arc_shape`, stepping with probability
// `step_bias` and otherwise leaping up to `leap_cap` degrees. The finalizer
// reuses the walker so synthesized melody obeys the same rules.
//
// All randomness comes from `SeedRng::derive(hash, "compose:<mode>")`
// (and `"clusters"` for the cluster fallback). The event list is a pure
// function of (control surface, mode, duration, astro summary).

use crate::astro::{AstroSummary, ElementWeights};
use crate::controls::{ControlSurface, ControlVector, Element};
use crate::event::{Event, Instrument, Piece, Role, Segment, StructureMode, event_order};
use crate::scale::Scale;
use starsong_prng::SeedRng;

/// Default piece length in seconds.
pub const DEFAULT_DURATION_SECS: f64 = 60.0;

/// Cluster segments are bounded to this span, in seconds.
pub const CLUSTER_MIN_SECS: f64 = 3.0;
pub const CLUSTER_MAX_SECS: f64 = 15.0;

/// Density multipliers for the four lunar phases: the sinusoid
/// `0.25 + 0.75 * (1 - cos(pi * k / 2)) / 2` sampled at k = 0..4.
pub const LUNAR_INTENSITY: [f64; 4] = [0.25, 0.625, 1.0, 0.625];

const LUNAR_LABELS: [&str; 4] = ["new moon", "first quarter", "full moon", "last quarter"];

/// Accent weight per eighth-note step of a bar, one row per template.
pub const RHYTHM_TEMPLATES: [[f64; 8]; 8] = [
    [1.0, 0.1, 0.5, 0.1, 1.0, 0.1, 0.5, 0.1], // four on the floor
    [0.9, 0.2, 0.3, 0.2, 0.9, 0.2, 0.3, 0.6], // backbeat with pickup
    [1.0, 0.0, 0.0, 0.7, 0.0, 0.0, 0.8, 0.0], // tresillo 3+3+2
    [0.8, 0.4, 0.8, 0.4, 0.8, 0.4, 0.8, 0.4], // running eighths
    [1.0, 0.3, 0.6, 0.3, 0.9, 0.5, 0.6, 0.5], // pop shuffle
    [0.7, 0.0, 0.5, 0.6, 0.0, 0.5, 0.7, 0.0], // broken clave
    [1.0, 0.0, 0.0, 0.0, 0.6, 0.0, 0.0, 0.0], // half-time
    [0.9, 0.6, 0.7, 0.6, 0.9, 0.6, 0.7, 0.6], // busy
];

/// Extra off-beat acceptance per unit of syncopation bias.
const SYNCOPATION_WEIGHT: f64 = 0.35;

/// Scale degrees spanned by the arc, tonic to peak.
const ARC_SPAN: f64 = 7.0;

/// Everything the generator reads.
#[derive(Debug, Clone, Copy)]
pub struct CompositionInput<'a> {
    pub controls: &'a ControlSurface,
    pub vector: &'a ControlVector,
    pub mode: StructureMode,
    /// Total duration in seconds; must be positive.
    pub duration: f64,
    /// Source of cluster sizes and element weights, when available.
    pub astro: Option<&'a AstroSummary>,
}

/// How an element colors the instrumentation and articulation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Voicing {
    pub melody: Instrument,
    pub rhythm: Instrument,
    pub harmony: Instrument,
    /// Multiplier on melody/harmony durations.
    pub sustain: f64,
    /// Multiplier on the rhythm acceptance rate.
    pub rhythm_scale: f64,
}

impl Voicing {
    pub fn for_element(element: Element) -> Self {
        match element {
            // Percussive and short.
            Element::Fire => Voicing {
                melody: Instrument::Pluck,
                rhythm: Instrument::Drum,
                harmony: Instrument::Strings,
                sustain: 0.5,
                rhythm_scale: 1.25,
            },
            Element::Earth => Voicing {
                melody: Instrument::Lead,
                rhythm: Instrument::Drum,
                harmony: Instrument::Pad,
                sustain: 1.0,
                rhythm_scale: 1.0,
            },
            Element::Air => Voicing {
                melody: Instrument::Bell,
                rhythm: Instrument::Shaker,
                harmony: Instrument::Chime,
                sustain: 0.8,
                rhythm_scale: 0.9,
            },
            // Sustained and long.
            Element::Water => Voicing {
                melody: Instrument::Strings,
                rhythm: Instrument::Shaker,
                harmony: Instrument::Pad,
                sustain: 1.6,
                rhythm_scale: 0.6,
            },
        }
    }
}

/// A planned segment before it is filled.
#[derive(Debug, Clone, PartialEq)]
struct SegmentPlan {
    label: String,
    start: f64,
    end: f64,
    density_scale: f64,
    element: Element,
}

/// Triangle contour in [0, 1] peaking at `peak` (both in piece-relative time).
pub fn arc_target(t: f64, peak: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    if t <= peak {
        if peak <= 0.0 { 1.0 } else { t / peak }
    } else if peak >= 1.0 {
        1.0
    } else {
        (1.0 - t) / (1.0 - peak)
    }
}

/// Scale-degree walker shared by the generator and the finalizer.
#[derive(Debug, Clone)]
pub(crate) struct MelodyWalker {
    scale: Scale,
    degree: i32,
    step_bias: f64,
    leap_cap: i64,
    arc_peak: f64,
    duration: f64,
}

impl MelodyWalker {
    pub(crate) fn new(controls: &ControlSurface, duration: f64) -> Self {
        MelodyWalker {
            scale: Scale::for_controls(controls),
            degree: 0,
            step_bias: controls.step_bias,
            leap_cap: controls.leap_cap,
            arc_peak: controls.arc_shape,
            duration,
        }
    }

    /// Restart the walk from an existing pitch.
    pub(crate) fn resume_from(&mut self, pitch: u8) {
        self.degree = self.scale.degree_of(pitch);
    }

    /// Advance the walk for a note at time `t` and return its pitch.
    pub(crate) fn next_pitch(&mut self, t: f64, rng: &mut SeedRng) -> u8 {
        let target = (ARC_SPAN * arc_target(t / self.duration, self.arc_peak)).round() as i32;
        let direction = match (target - self.degree).signum() {
            0 => {
                if rng.random_bool(0.5) {
                    1
                } else {
                    -1
                }
            }
            d => d,
        };
        let size = if rng.random_bool(self.step_bias) || self.leap_cap < 2 {
            1
        } else {
            rng.range_usize_inclusive(2, self.leap_cap as usize) as i32
        };
        self.degree = (self.degree + direction * size).clamp(-7, 14);
        self.scale.pitch_of(self.degree)
    }

    /// Pitch one octave below the current degree, used as a harmony root.
    pub(crate) fn harmony_pitch(&self) -> u8 {
        self.scale.pitch_of(self.degree - 7)
    }
}

/// Generate the segmented piece for one control surface and mode.
///
/// Panics if `input.duration` is not positive.
pub fn compose_piece(input: &CompositionInput) -> Piece {
    assert!(
        input.duration > 0.0 && input.duration.is_finite(),
        "compose_piece: duration must be positive"
    );
    let controls = input.controls;
    let plans = plan_segments(input);

    let mut rng = SeedRng::derive(&controls.hash, &format!("compose:{}", input.mode.as_str()));
    let mut walker = MelodyWalker::new(controls, input.duration);
    let tempo_bpm = controls.tempo_bpm();

    let segments = plans
        .iter()
        .map(|plan| Segment {
            label: plan.label.clone(),
            start: plan.start,
            end: plan.end,
            events: fill_segment(plan, input, tempo_bpm, &mut walker, &mut rng),
        })
        .collect();

    Piece {
        mode: input.mode,
        duration: input.duration,
        tempo_bpm,
        segments,
    }
}

/// Turn relative weights into contiguous `[start, end)` spans covering
/// `[0, duration]`. Weights must be positive.
fn spans_from_weights(weights: &[f64], duration: f64) -> Vec<(f64, f64)> {
    let total: f64 = weights.iter().sum();
    let mut spans = Vec::with_capacity(weights.len());
    let mut cumulative = 0.0;
    let mut start = 0.0;
    for (i, w) in weights.iter().enumerate() {
        cumulative += w;
        let end = if i + 1 == weights.len() {
            duration
        } else {
            duration * cumulative / total
        };
        spans.push((start, end));
        start = end;
    }
    spans
}

fn plan_segments(input: &CompositionInput) -> Vec<SegmentPlan> {
    let element = input.controls.element_dominance;
    match input.mode {
        StructureMode::HouseOrder => spans_from_weights(&[1.0; 12], input.duration)
            .into_iter()
            .enumerate()
            .map(|(i, (start, end))| SegmentPlan {
                label: format!("house {}", i + 1),
                start,
                end,
                density_scale: 1.0,
                element,
            })
            .collect(),
        StructureMode::Lunar => spans_from_weights(&[1.0; 4], input.duration)
            .into_iter()
            .enumerate()
            .map(|(i, (start, end))| SegmentPlan {
                label: LUNAR_LABELS[i].to_string(),
                start,
                end,
                density_scale: LUNAR_INTENSITY[i],
                element,
            })
            .collect(),
        StructureMode::Elemental => plan_elemental(input),
        StructureMode::Cluster => plan_clusters(input),
    }
}

fn plan_elemental(input: &CompositionInput) -> Vec<SegmentPlan> {
    let weights = match input.astro {
        Some(astro) if astro.elements.total() > 0.0 => astro.elements.normalized(),
        _ => ElementWeights::favoring(input.controls.element_dominance),
    };
    // Heaviest element first; a small floor keeps every segment non-empty.
    let mut order: Vec<(Element, f64)> = Element::ALL
        .iter()
        .map(|&e| (e, weights.get(e).max(0.05)))
        .collect();
    order.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

    let raw: Vec<f64> = order.iter().map(|(_, w)| *w).collect();
    spans_from_weights(&raw, input.duration)
        .into_iter()
        .zip(order)
        .map(|((start, end), (element, _))| SegmentPlan {
            label: element.as_str().to_string(),
            start,
            end,
            density_scale: 1.0,
            element,
        })
        .collect()
}

fn cluster_sizes(input: &CompositionInput) -> Vec<u32> {
    let from_astro: Vec<u32> = input
        .astro
        .map(|a| a.clusters.iter().copied().filter(|&c| c > 0).collect())
        .unwrap_or_default();
    if !from_astro.is_empty() {
        return from_astro;
    }
    let mut rng = SeedRng::derive(&input.controls.hash, "clusters");
    (0..5).map(|_| rng.range_usize_inclusive(1, 4) as u32).collect()
}

fn plan_clusters(input: &CompositionInput) -> Vec<SegmentPlan> {
    let sizes = cluster_sizes(input);
    let total_size: u32 = sizes.iter().sum();
    let element = input.controls.element_dominance;
    let mut plans: Vec<SegmentPlan> = Vec::new();
    let mut t = 0.0;

    for (i, &size) in sizes.iter().enumerate() {
        let remaining = input.duration - t;
        if remaining <= 0.0 {
            break;
        }
        if remaining < CLUSTER_MIN_SECS {
            if let Some(last) = plans.last_mut() {
                last.end = input.duration;
                t = input.duration;
                break;
            }
        }
        let proportional = input.duration * size as f64 / total_size as f64;
        let span = proportional.clamp(CLUSTER_MIN_SECS, CLUSTER_MAX_SECS);
        let end = if span >= remaining {
            input.duration
        } else {
            t + span
        };
        plans.push(SegmentPlan {
            label: format!("cluster {}", i + 1),
            start: t,
            end,
            density_scale: 0.7 + 0.1 * size.min(6) as f64,
            element,
        });
        t = end;
    }

    if t < input.duration {
        plans.push(SegmentPlan {
            label: "fill".to_string(),
            start: t,
            end: input.duration,
            density_scale: 0.5,
            element,
        });
    }
    plans
}

/// Grid points `(index, onset)` of step `step` with onsets in `[start, end)`.
///
/// Onsets are always `index * step`, so neighbouring segments agree on which
/// side of a boundary a grid point falls.
fn grid_onsets(start: f64, end: f64, step: f64) -> impl Iterator<Item = (u64, f64)> {
    let first = ((start / step).floor().max(0.0) as u64).saturating_sub(1);
    (first..)
        .map(move |idx| (idx, idx as f64 * step))
        .skip_while(move |&(_, onset)| onset < start)
        .take_while(move |&(_, onset)| onset < end)
}

fn fill_segment(
    plan: &SegmentPlan,
    input: &CompositionInput,
    tempo_bpm: f64,
    walker: &mut MelodyWalker,
    rng: &mut SeedRng,
) -> Vec<Event> {
    let v = input.vector;
    let controls = input.controls;
    let voicing = Voicing::for_element(plan.element);
    let beat = 60.0 / tempo_bpm;
    let end_of_piece = input.duration;
    let mut events = Vec::new();

    // Melody: one candidate per beat.
    let melody_rate = (v.melodic_activity * plan.density_scale).clamp(0.0, 1.0);
    for (_, onset) in grid_onsets(plan.start, plan.end, beat) {
        if rng.random_bool(melody_rate) {
            events.push(melody_event(onset, beat, &voicing, input, walker, rng));
        }
    }

    if events.is_empty() && plan.end > plan.start {
        let mid = (plan.start + plan.end) / 2.0;
        events.push(melody_event(mid, beat, &voicing, input, walker, rng));
    }

    // Rhythm: one candidate per eighth, weighted by the template.
    let template = &RHYTHM_TEMPLATES[controls.rhythm_template_id.clamp(0, 7) as usize];
    let eighth = beat / 2.0;
    for (idx, onset) in grid_onsets(plan.start, plan.end, eighth) {
        let step = (idx % 8) as usize;
        let offbeat = if step % 2 == 1 {
            controls.syncopation_bias * SYNCOPATION_WEIGHT
        } else {
            0.0
        };
        let rate = ((v.rhythm_density * template[step] + offbeat)
            * plan.density_scale
            * voicing.rhythm_scale)
            .clamp(0.0, 1.0);
        if rng.random_bool(rate) {
            events.push(Event {
                role: Role::Rhythm,
                pitch: if step % 4 == 0 { 36 } else { 42 },
                onset,
                duration: (0.12f64).min(eighth).min(end_of_piece - onset),
                intensity: 0.3 + 0.6 * template[step],
                instrument: voicing.rhythm,
            });
        }
    }

    // Harmony: one candidate per bar of four beats.
    let bar = beat * 4.0;
    let harmony_rate = (v.harmonic_tension * plan.density_scale).clamp(0.0, 1.0);
    for (_, onset) in grid_onsets(plan.start, plan.end, bar) {
        if rng.random_bool(harmony_rate) {
            events.push(Event {
                role: Role::Harmony,
                pitch: walker.harmony_pitch(),
                onset,
                duration: (bar * voicing.sustain.min(1.0)).min(end_of_piece - onset),
                intensity: 0.25 + 0.3 * v.harmonic_tension,
                instrument: voicing.harmony,
            });
        }
    }

    events.sort_by(event_order);
    events
}

fn melody_event(
    onset: f64,
    beat: f64,
    voicing: &Voicing,
    input: &CompositionInput,
    walker: &mut MelodyWalker,
    rng: &mut SeedRng,
) -> Event {
    let pitch = walker.next_pitch(onset, rng);
    let length = beat * voicing.sustain * rng.range_f64(0.6, 1.0);
    Event {
        role: Role::Melody,
        pitch,
        onset,
        duration: length.min(input.duration - onset),
        intensity: 0.45 + 0.35 * arc_target(onset / input.duration, input.controls.arc_shape),
        instrument: voicing.melody,
    }
}
