// The piece representation: timed events grouped into segments.
//
// A `Piece` is an ordered list of `Segment`s that partition `[0, duration]`
// with no gaps or overlaps. Each segment holds the `Event`s whose onsets fall
// inside it, sorted by `event_order`. Segment boundaries are computed once
// (see compose.rs) and are never moved afterwards; the finalizer only adds
// events and re-partitions them by onset.
//
// The piece is the "source of truth" downstream: features, gates and the
// audio buffer are all derived from it, never the other way around.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// The structural layout used to carve the piece into segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructureMode {
    /// Twelve equal segments, one per astrological house.
    #[default]
    #[serde(alias = "house-order")]
    HouseOrder,
    /// Segments proportional to planet-cluster sizes, plus a trailing fill.
    Cluster,
    /// Four segments proportional to element weights.
    Elemental,
    /// Four equal segments following the lunar phases.
    Lunar,
}

impl StructureMode {
    pub const ALL: [StructureMode; 4] = [
        StructureMode::HouseOrder,
        StructureMode::Cluster,
        StructureMode::Elemental,
        StructureMode::Lunar,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StructureMode::HouseOrder => "house_order",
            StructureMode::Cluster => "cluster",
            StructureMode::Elemental => "elemental",
            StructureMode::Lunar => "lunar",
        }
    }
}

/// Musical role of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Melody,
    Rhythm,
    Harmony,
}

/// Voice/instrument tag carried by each event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Instrument {
    Lead,
    Pluck,
    Bell,
    Strings,
    Pad,
    Drum,
    Shaker,
    Chime,
}

/// One musical occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub role: Role,
    /// MIDI pitch number.
    pub pitch: u8,
    /// Onset in seconds from the start of the piece.
    pub onset: f64,
    /// Duration in seconds.
    pub duration: f64,
    /// Loudness in [0, 1].
    pub intensity: f64,
    pub instrument: Instrument,
}

/// Total order used for sorting events: onset, then role, pitch, instrument.
pub fn event_order(a: &Event, b: &Event) -> Ordering {
    a.onset
        .total_cmp(&b.onset)
        .then(a.role.cmp(&b.role))
        .then(a.pitch.cmp(&b.pitch))
        .then(a.instrument.cmp(&b.instrument))
        .then(a.duration.total_cmp(&b.duration))
}

/// A mode-specific span of the piece.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub label: String,
    pub start: f64,
    pub end: f64,
    pub events: Vec<Event>,
}

impl Segment {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn count_role(&self, role: Role) -> usize {
        self.events.iter().filter(|e| e.role == role).count()
    }
}

/// A complete generated piece.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Piece {
    pub mode: StructureMode,
    /// Total duration in seconds.
    pub duration: f64,
    pub tempo_bpm: f64,
    pub segments: Vec<Segment>,
}

impl Piece {
    /// Seconds per beat.
    pub fn beat_len(&self) -> f64 {
        60.0 / self.tempo_bpm
    }

    /// All events in segment order (which is also onset order).
    pub fn events(&self) -> impl Iterator<Item = &Event> + '_ {
        self.segments.iter().flat_map(|s| s.events.iter())
    }

    pub fn event_count(&self) -> usize {
        self.segments.iter().map(|s| s.events.len()).sum()
    }

    pub fn count_role(&self, role: Role) -> usize {
        self.segments.iter().map(|s| s.count_role(role)).sum()
    }

    /// True if the segments tile `[0, duration]` exactly, in order.
    pub fn covers_exactly(&self) -> bool {
        let Some(first) = self.segments.first() else {
            return false;
        };
        let Some(last) = self.segments.last() else {
            return false;
        };
        if first.start != 0.0 || last.end != self.duration {
            return false;
        }
        self.segments.windows(2).all(|w| w[0].end == w[1].start)
            && self.segments.iter().all(|s| s.end > s.start)
    }

    /// Index of the segment containing time `t`. The final segment also owns
    /// its end point.
    pub fn segment_index_at(&self, t: f64) -> usize {
        let idx = self.segments.partition_point(|s| s.start <= t);
        idx.saturating_sub(1)
    }
}
