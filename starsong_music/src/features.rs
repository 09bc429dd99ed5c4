// Musical feature measurements feeding the quality gates.
//
// All four features are deterministic functions of the finalized piece (plus
// `arc_shape`, which defines the target contour) and lie in [0, 1]:
//
// - `step_leap_ratio`: share of consecutive melody intervals of at most two
//   semitones. Rises with `step_bias`.
// - `arc`: Pearson correlation between the mean melody pitch in eight time
//   bins and the triangle contour peaking at `arc_shape`, mapped from
//   [-1, 1] to [0, 1]. 0.5 when the correlation is undefined.
// - `narrative_flow`: how smoothly the mean melody pitch moves between
//   adjacent segments, weighted by the share of segments carrying melody.
// - `rhythm_diversity`: normalized Gini-Simpson diversity of rhythm
//   inter-onset intervals quantized to sixteenth notes. Pure arithmetic, so
//   it is platform independent.
//
// Consumed by gates.rs.

use crate::compose::arc_target;
use crate::event::{Event, Piece, Role};
use serde::{Deserialize, Serialize};

/// Time bins used by the arc measurement.
const ARC_BINS: usize = 8;

/// Largest inter-onset class, in sixteenth notes.
const IOI_CLASSES: usize = 8;

/// Largest interval, in semitones, that still counts as a step.
pub const STEP_SEMITONES: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Features {
    pub step_leap_ratio: f64,
    pub arc: f64,
    pub narrative_flow: f64,
    pub rhythm_diversity: f64,
}

/// Measure all four features.
pub fn measure(piece: &Piece, arc_shape: f64) -> Features {
    let melody: Vec<&Event> = piece.events().filter(|e| e.role == Role::Melody).collect();
    Features {
        step_leap_ratio: step_leap_ratio(&melody),
        arc: arc_adherence(&melody, piece.duration, arc_shape),
        narrative_flow: narrative_flow(piece),
        rhythm_diversity: rhythm_diversity(piece),
    }
}

fn step_leap_ratio(melody: &[&Event]) -> f64 {
    if melody.len() < 2 {
        return 0.0;
    }
    let steps = melody
        .windows(2)
        .filter(|w| w[0].pitch.abs_diff(w[1].pitch) <= STEP_SEMITONES)
        .count();
    steps as f64 / (melody.len() - 1) as f64
}

fn arc_adherence(melody: &[&Event], duration: f64, arc_shape: f64) -> f64 {
    let mut sums = [0.0f64; ARC_BINS];
    let mut counts = [0usize; ARC_BINS];
    for e in melody {
        let bin = ((e.onset / duration * ARC_BINS as f64) as usize).min(ARC_BINS - 1);
        sums[bin] += e.pitch as f64;
        counts[bin] += 1;
    }
    let (observed, target): (Vec<f64>, Vec<f64>) = (0..ARC_BINS)
        .filter(|&b| counts[b] > 0)
        .map(|b| {
            let center = (b as f64 + 0.5) / ARC_BINS as f64;
            (sums[b] / counts[b] as f64, arc_target(center, arc_shape))
        })
        .unzip();
    match pearson(&observed, &target) {
        Some(r) => ((r + 1.0) / 2.0).clamp(0.0, 1.0),
        None => 0.5,
    }
}

/// Pearson correlation, or `None` with fewer than three points or zero variance.
fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    let n = xs.len();
    if n < 3 || ys.len() != n {
        return None;
    }
    let mx = xs.iter().sum::<f64>() / n as f64;
    let my = ys.iter().sum::<f64>() / n as f64;
    let mut cov = 0.0;
    let mut vx = 0.0;
    let mut vy = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        cov += (x - mx) * (y - my);
        vx += (x - mx) * (x - mx);
        vy += (y - my) * (y - my);
    }
    if vx <= 0.0 || vy <= 0.0 {
        return None;
    }
    Some(cov / (vx.sqrt() * vy.sqrt()))
}

fn narrative_flow(piece: &Piece) -> f64 {
    if piece.segments.is_empty() {
        return 0.0;
    }
    let means: Vec<Option<f64>> = piece
        .segments
        .iter()
        .map(|s| {
            let pitches: Vec<f64> = s
                .events
                .iter()
                .filter(|e| e.role == Role::Melody)
                .map(|e| e.pitch as f64)
                .collect();
            (!pitches.is_empty()).then(|| pitches.iter().sum::<f64>() / pitches.len() as f64)
        })
        .collect();

    let coverage = means.iter().filter(|m| m.is_some()).count() as f64 / means.len() as f64;
    let smoothness: Vec<f64> = means
        .windows(2)
        .filter_map(|w| match (w[0], w[1]) {
            (Some(a), Some(b)) => Some(1.0 - ((a - b).abs() / 12.0).min(1.0)),
            _ => None,
        })
        .collect();
    let continuity = if smoothness.is_empty() {
        1.0
    } else {
        smoothness.iter().sum::<f64>() / smoothness.len() as f64
    };
    continuity * coverage
}

fn rhythm_diversity(piece: &Piece) -> f64 {
    let sixteenth = piece.beat_len() / 4.0;
    let onsets: Vec<f64> = piece
        .events()
        .filter(|e| e.role == Role::Rhythm)
        .map(|e| e.onset)
        .collect();
    let mut histogram = [0usize; IOI_CLASSES];
    for w in onsets.windows(2) {
        let q = ((w[1] - w[0]) / sixteenth).round() as usize;
        if q == 0 {
            continue;
        }
        histogram[q.min(IOI_CLASSES) - 1] += 1;
    }
    let total: usize = histogram.iter().sum();
    if total < 2 {
        return 0.0;
    }
    let sum_sq: f64 = histogram
        .iter()
        .map(|&c| {
            let p = c as f64 / total as f64;
            p * p
        })
        .sum();
    let max_diversity = 1.0 - 1.0 / IOI_CLASSES as f64;
    ((1.0 - sum_sq) / max_diversity).clamp(0.0, 1.0)
}
