// Finalizer: bring rhythm and melody densities up to their target bands.
//
// Targets are linear in the control vector: rhythm events per beat follow
// `rhythm_density`, melody events per beat follow `melodic_activity`. Each
// target becomes a [min, max] count band (+-15%) over the piece's beats. A
// role that undershoots its minimum is topped up with synthesized events on
// free grid slots (sixteenths for rhythm, eighths for melody), drawn from
// `SeedRng::derive(hash, "finalize")`. Synthesized melody continues the scale
// walk from the nearest earlier melody note.
//
// The finalizer never removes or edits an event. Overshooting the maximum is
// reported in `FinalizeReport`, not corrected. The augmented list is then
// re-partitioned into the original segment boundaries by onset.

use crate::compose::{MelodyWalker, Voicing};
use crate::controls::{ControlSurface, ControlVector};
use crate::event::{Event, Instrument, Piece, Role, Segment, event_order};
use serde::{Deserialize, Serialize};
use starsong_prng::SeedRng;
use std::collections::BTreeSet;

/// Allowed deviation from the target count, each side.
pub const BAND_TOLERANCE: f64 = 0.15;

/// Slot-matching tolerance, in seconds.
const SLOT_EPSILON: f64 = 1e-6;

/// Target density and count band for one role.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DensityBand {
    pub per_beat: f64,
    pub min: usize,
    pub max: usize,
}

impl DensityBand {
    fn new(per_beat: f64, beats: f64) -> Self {
        let target = per_beat * beats;
        DensityBand {
            per_beat,
            min: (target * (1.0 - BAND_TOLERANCE)).floor() as usize,
            max: (target * (1.0 + BAND_TOLERANCE)).ceil() as usize,
        }
    }

    pub fn contains(&self, count: usize) -> bool {
        (self.min..=self.max).contains(&count)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DensityTargets {
    pub beats: f64,
    pub rhythm: DensityBand,
    pub melody: DensityBand,
}

/// Compute the density bands for a vector, tempo and duration.
pub fn density_targets(vector: &ControlVector, tempo_bpm: f64, duration: f64) -> DensityTargets {
    let beats = duration * tempo_bpm / 60.0;
    DensityTargets {
        beats,
        rhythm: DensityBand::new(0.5 + 1.5 * vector.rhythm_density, beats),
        melody: DensityBand::new(0.25 + 0.75 * vector.melodic_activity, beats),
    }
}

/// What the finalizer did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalizeReport {
    pub targets: DensityTargets,
    pub rhythm_before: usize,
    pub melody_before: usize,
    pub rhythm_added: usize,
    pub melody_added: usize,
    pub rhythm_in_band: bool,
    pub melody_in_band: bool,
}

/// Augment `piece` until both roles reach their minimum counts.
pub fn finalize(
    piece: &Piece,
    controls: &ControlSurface,
    vector: &ControlVector,
) -> (Piece, FinalizeReport) {
    let targets = density_targets(vector, piece.tempo_bpm, piece.duration);
    let mut rng = SeedRng::derive(&controls.hash, "finalize");
    let mut events: Vec<Event> = piece.events().copied().collect();

    let rhythm_before = piece.count_role(Role::Rhythm);
    let melody_before = piece.count_role(Role::Melody);

    let rhythm_added = add_rhythm(
        piece,
        controls,
        &mut events,
        targets.rhythm.min.saturating_sub(rhythm_before),
        &mut rng,
    );
    let melody_added = add_melody(
        piece,
        controls,
        &mut events,
        targets.melody.min.saturating_sub(melody_before),
        &mut rng,
    );

    if rhythm_added + melody_added > 0 {
        tracing::debug!(
            seed = %controls.hash,
            rhythm_added,
            melody_added,
            "finalizer topped up event density"
        );
    }

    let finalized = repartition(piece, events);
    let report = FinalizeReport {
        targets,
        rhythm_before,
        melody_before,
        rhythm_added,
        melody_added,
        rhythm_in_band: targets.rhythm.contains(finalized.count_role(Role::Rhythm)),
        melody_in_band: targets.melody.contains(finalized.count_role(Role::Melody)),
    };
    (finalized, report)
}

/// Grid slots of length `slot` inside the piece that no `role` event occupies.
fn free_slots(piece: &Piece, events: &[Event], role: Role, slot: f64) -> Vec<u64> {
    let occupied: BTreeSet<u64> = events
        .iter()
        .filter(|e| e.role == role)
        .filter_map(|e| {
            let idx = (e.onset / slot).round();
            ((e.onset - idx * slot).abs() < SLOT_EPSILON).then_some(idx as u64)
        })
        .collect();
    (0u64..)
        .take_while(|&i| (i as f64) * slot < piece.duration)
        .filter(|i| !occupied.contains(i))
        .collect()
}

/// Instrument already used for `role` in the segment containing `onset`,
/// falling back to the dominant element's voicing.
fn instrument_near(piece: &Piece, controls: &ControlSurface, role: Role, onset: f64) -> Instrument {
    let seg = &piece.segments[piece.segment_index_at(onset)];
    seg.events
        .iter()
        .find(|e| e.role == role)
        .map(|e| e.instrument)
        .unwrap_or_else(|| {
            let voicing = Voicing::for_element(controls.element_dominance);
            match role {
                Role::Melody => voicing.melody,
                Role::Rhythm => voicing.rhythm,
                Role::Harmony => voicing.harmony,
            }
        })
}

fn add_rhythm(
    piece: &Piece,
    controls: &ControlSurface,
    events: &mut Vec<Event>,
    needed: usize,
    rng: &mut SeedRng,
) -> usize {
    if needed == 0 {
        return 0;
    }
    let sixteenth = piece.beat_len() / 4.0;
    let mut free = free_slots(piece, events, Role::Rhythm, sixteenth);
    let mut added = 0;
    while added < needed && !free.is_empty() {
        let idx = free.remove(rng.range_usize(0, free.len()));
        let onset = idx as f64 * sixteenth;
        events.push(Event {
            role: Role::Rhythm,
            pitch: if idx % 8 == 0 { 36 } else { 42 },
            onset,
            duration: sixteenth.min(0.08).min(piece.duration - onset),
            intensity: 0.35,
            instrument: instrument_near(piece, controls, Role::Rhythm, onset),
        });
        added += 1;
    }
    if added < needed {
        tracing::warn!(needed, added, "rhythm grid exhausted before reaching target band");
    }
    added
}

fn add_melody(
    piece: &Piece,
    controls: &ControlSurface,
    events: &mut Vec<Event>,
    needed: usize,
    rng: &mut SeedRng,
) -> usize {
    if needed == 0 {
        return 0;
    }
    let eighth = piece.beat_len() / 2.0;
    let mut free = free_slots(piece, events, Role::Melody, eighth);
    let mut walker = MelodyWalker::new(controls, piece.duration);
    let mut added = 0;
    while added < needed && !free.is_empty() {
        let idx = free.remove(rng.range_usize(0, free.len()));
        let onset = idx as f64 * eighth;
        let previous = events
            .iter()
            .filter(|e| e.role == Role::Melody && e.onset < onset)
            .max_by(|a, b| event_order(a, b));
        if let Some(prev) = previous {
            walker.resume_from(prev.pitch);
        }
        let pitch = walker.next_pitch(onset, rng);
        events.push(Event {
            role: Role::Melody,
            pitch,
            onset,
            duration: eighth.min(piece.duration - onset),
            intensity: 0.4,
            instrument: instrument_near(piece, controls, Role::Melody, onset),
        });
        added += 1;
    }
    if added < needed {
        tracing::warn!(needed, added, "melody grid exhausted before reaching target band");
    }
    added
}

/// Put every event back into the segment whose span contains its onset.
fn repartition(piece: &Piece, events: Vec<Event>) -> Piece {
    let mut out = Piece {
        segments: piece
            .segments
            .iter()
            .map(|s| Segment {
                events: Vec::new(),
                ..s.clone()
            })
            .collect(),
        ..piece.clone()
    };
    for event in events {
        let idx = piece.segment_index_at(event.onset);
        out.segments[idx].events.push(event);
    }
    for seg in &mut out.segments {
        seg.events.sort_by(event_order);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::{CompositionInput, DEFAULT_DURATION_SECS, compose_piece};
    use crate::event::StructureMode;

    fn controls() -> ControlSurface {
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

    fn sparse_piece() -> Piece {
        let melody = |onset: f64, pitch: u8| Event {
            role: Role::Melody,
            pitch,
            onset,
            duration: 0.5,
            intensity: 0.5,
            instrument: Instrument::Lead,
        };
        Piece {
            mode: StructureMode::Lunar,
            duration: 20.0,
            tempo_bpm: 120.0,
            segments: vec![
                Segment {
                    label: "a".into(),
                    start: 0.0,
                    end: 10.0,
                    events: vec![melody(1.0, 60)],
                },
                Segment {
                    label: "b".into(),
                    start: 10.0,
                    end: 20.0,
                    events: vec![melody(12.0, 64)],
                },
            ],
        }
    }

    #[test]
    fn test_targets_linear_in_vector() {
        let mut v = ControlVector::neutral();
        let low = density_targets(&v, 120.0, 60.0);
        v.rhythm_density = 1.0;
        v.melodic_activity = 1.0;
        let high = density_targets(&v, 120.0, 60.0);
        assert_eq!(low.beats, 120.0);
        assert_eq!(low.rhythm.per_beat, 1.25);
        assert_eq!(high.rhythm.per_beat, 2.0);
        assert_eq!(high.melody.per_beat, 1.0);
        // 2.0/beat * 120 beats = 240 -> [204, 276]
        assert_eq!(high.rhythm.min, 204);
        assert_eq!(high.rhythm.max, 276);
    }

    #[test]
    fn test_sparse_piece_reaches_minimum() {
        let piece = sparse_piece();
        let c = controls();
        let v = ControlVector::neutral();
        let (out, report) = finalize(&piece, &c, &v);
        assert!(out.count_role(Role::Rhythm) >= report.targets.rhythm.min);
        assert!(out.count_role(Role::Melody) >= report.targets.melody.min);
        assert!(report.rhythm_in_band);
        assert!(report.melody_in_band);
        assert_eq!(report.melody_before, 2);
        assert!(report.rhythm_added > 0);
    }

    #[test]
    fn test_never_removes_events() {
        let piece = sparse_piece();
        let (out, _) = finalize(&piece, &controls(), &ControlVector::neutral());
        assert!(out.event_count() >= piece.event_count());
        for original in piece.events() {
            assert!(out.events().any(|e| e == original));
        }
    }

    #[test]
    fn test_segments_preserved_and_events_repartitioned() {
        let piece = sparse_piece();
        let (out, _) = finalize(&piece, &controls(), &ControlVector::neutral());
        assert_eq!(out.segments.len(), piece.segments.len());
        for (a, b) in out.segments.iter().zip(&piece.segments) {
            assert_eq!(a.start, b.start);
            assert_eq!(a.end, b.end);
            for e in &a.events {
                assert!(e.onset >= a.start && e.onset < a.end);
            }
            assert!(a.events.windows(2).all(|w| event_order(&w[0], &w[1]).is_le()));
        }
    }

    #[test]
    fn test_dense_piece_is_left_alone() {
        let c = ControlSurface {
            density_level: 0.0,
            motif_rate: 0.0,
            ..controls()
        };
        let mut piece = sparse_piece();
        // Fill every sixteenth with rhythm and every eighth with melody.
        for i in 0..160 {
            let onset = i as f64 * 0.125;
            let seg = if onset < 10.0 { 0 } else { 1 };
            piece.segments[seg].events.push(Event {
                role: Role::Rhythm,
                pitch: 42,
                onset,
                duration: 0.05,
                intensity: 0.5,
                instrument: Instrument::Drum,
            });
        }
        let before = piece.event_count();
        let (out, report) = finalize(&piece, &c, &c.vector());
        assert_eq!(report.rhythm_added, 0);
        assert_eq!(out.event_count(), before + report.melody_added);
    }

    #[test]
    fn test_finalize_is_deterministic() {
        let c = controls();
        let v = c.vector();
        let piece = compose_piece(&CompositionInput {
            controls: &c,
            vector: &v,
            mode: StructureMode::HouseOrder,
            duration: DEFAULT_DURATION_SECS,
            astro: None,
        });
        let (a, ra) = finalize(&piece, &c, &v);
        let (b, rb) = finalize(&piece, &c, &v);
        assert_eq!(a, b);
        assert_eq!(ra, rb);
        assert!(a.covers_exactly());
        assert!(a.event_count() >= piece.event_count());
    }
}
