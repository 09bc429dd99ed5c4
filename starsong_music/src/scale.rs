// Scale support: which pitches the melody may use.
//
// The modality of the control surface selects the mode and the dominant
// element selects the tonic. Melodic motion is planned in scale degrees (a
// step is one degree, a leap two or more) and converted to MIDI pitches
// here, so "step" and "leap" have the same meaning in the generator, the
// finalizer and the feature measurements.
//
// Used by compose.rs and finalize.rs.

use crate::controls::{ControlSurface, Element, Modality};
use serde::{Deserialize, Serialize};

/// The diatonic modes used by the generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScaleMode {
    /// Major scale: W W H W W W H.
    Ionian,
    /// Natural minor.
    Aeolian,
    /// Major with lowered 7th.
    Mixolydian,
}

impl ScaleMode {
    /// Semitone intervals from the tonic to each of the 7 scale degrees.
    pub fn intervals(self) -> [u8; 7] {
        match self {
            ScaleMode::Ionian => [0, 2, 4, 5, 7, 9, 11],
            ScaleMode::Aeolian => [0, 2, 3, 5, 7, 8, 10],
            ScaleMode::Mixolydian => [0, 2, 4, 5, 7, 9, 10],
        }
    }
}

impl From<Modality> for ScaleMode {
    fn from(modality: Modality) -> Self {
        match modality {
            Modality::Cardinal => ScaleMode::Ionian,
            Modality::Fixed => ScaleMode::Aeolian,
            Modality::Mutable => ScaleMode::Mixolydian,
        }
    }
}

/// Tonic MIDI pitch for each element.
pub fn tonic_for(element: Element) -> u8 {
    match element {
        Element::Fire => 62,  // D4
        Element::Earth => 60, // C4
        Element::Air => 65,   // F4
        Element::Water => 57, // A3
    }
}

/// Lowest and highest pitch the scale will produce.
const PITCH_FLOOR: u8 = 36;
const PITCH_CEIL: u8 = 96;

/// A mode rooted on a specific tonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scale {
    pub mode: ScaleMode,
    pub tonic: u8,
}

impl Scale {
    pub fn new(mode: ScaleMode, tonic: u8) -> Self {
        Scale { mode, tonic }
    }

    pub fn for_controls(controls: &ControlSurface) -> Self {
        Scale::new(
            controls.modality.into(),
            tonic_for(controls.element_dominance),
        )
    }

    /// MIDI pitch of a scale degree. Degree 0 is the tonic; negative degrees
    /// go below it. Clamped to the playable range.
    pub fn pitch_of(&self, degree: i32) -> u8 {
        let octave = degree.div_euclid(7);
        let step = degree.rem_euclid(7) as usize;
        let pitch = self.tonic as i32 + octave * 12 + self.mode.intervals()[step] as i32;
        pitch.clamp(PITCH_FLOOR as i32, PITCH_CEIL as i32) as u8
    }

    /// Scale degree at or just below `pitch` (out-of-mode pitches snap down).
    pub fn degree_of(&self, pitch: u8) -> i32 {
        let offset = pitch as i32 - self.tonic as i32;
        let octave = offset.div_euclid(12);
        let pc = offset.rem_euclid(12) as u8;
        let intervals = self.mode.intervals();
        let idx = intervals.iter().rposition(|&i| i <= pc).unwrap_or(0);
        octave * 7 + idx as i32
    }
}
