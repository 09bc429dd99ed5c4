// Explainer atoms: six short phrases derived from the control surface.
//
// Each continuous control is bucketed into a named class by fixed,
// non-overlapping cutoffs; the class names a mapping-table bucket, and one
// phrase is chosen from it with `seed_index(seed + atom_name, len)`. The
// astro color atom is keyed by the dominant element and may carry a tint for
// the first dominant planet that has one. Selection is a pure function of
// (bucket, seed, tables).
//
// Bucket classes are explicit enums implementing `Bucketed`, so the realizer
// and table validation dispatch on variants rather than on phrase text.

use crate::tables::MappingTables;
use serde::{Deserialize, Serialize};
use starsong_music::astro::AstroSummary;
use starsong_music::controls::{ControlSurface, Element};

/// Atom names in template order. Also the placeholder names templates use.
pub const ATOM_NAMES: [&str; 6] = [
    "arc_desc",
    "movement",
    "rhythm_feel",
    "density_desc",
    "motif_desc",
    "astro_color",
];

/// A named classification of one continuous control.
pub trait Bucketed: Copy + Sized + 'static {
    /// The atom this classification feeds.
    const ATOM: &'static str;
    /// Every class, for table validation.
    const ALL: &'static [Self];

    fn classify(value: f64) -> Self;
    fn key(self) -> &'static str;

    /// Full mapping-table bucket name, e.g. `movement.balanced`.
    fn bucket_name(self) -> String {
        format!("{}.{}", Self::ATOM, self.key())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArcBucket {
    EarlyPeak,
    CenteredArch,
    LateBloom,
}

impl Bucketed for ArcBucket {
    const ATOM: &'static str = "arc_desc";
    const ALL: &'static [Self] = &[Self::EarlyPeak, Self::CenteredArch, Self::LateBloom];

    fn classify(arc_shape: f64) -> Self {
        if arc_shape < 0.34 {
            Self::EarlyPeak
        } else if arc_shape < 0.67 {
            Self::CenteredArch
        } else {
            Self::LateBloom
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::EarlyPeak => "early_peak",
            Self::CenteredArch => "centered_arch",
            Self::LateBloom => "late_bloom",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovementBucket {
    StepwiseHeavy,
    Balanced,
    LeapingLead,
}

impl Bucketed for MovementBucket {
    const ATOM: &'static str = "movement";
    const ALL: &'static [Self] = &[Self::StepwiseHeavy, Self::Balanced, Self::LeapingLead];

    fn classify(step_bias: f64) -> Self {
        if step_bias >= 0.70 {
            Self::StepwiseHeavy
        } else if step_bias >= 0.40 {
            Self::Balanced
        } else {
            Self::LeapingLead
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::StepwiseHeavy => "stepwise_heavy",
            Self::Balanced => "balanced",
            Self::LeapingLead => "leaping_lead",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RhythmBucket {
    Syncopated,
    LightlyOffbeat,
    Straight,
}

impl Bucketed for RhythmBucket {
    const ATOM: &'static str = "rhythm_feel";
    const ALL: &'static [Self] = &[Self::Syncopated, Self::LightlyOffbeat, Self::Straight];

    fn classify(syncopation_bias: f64) -> Self {
        if syncopation_bias >= 0.60 {
            Self::Syncopated
        } else if syncopation_bias >= 0.30 {
            Self::LightlyOffbeat
        } else {
            Self::Straight
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Syncopated => "syncopated",
            Self::LightlyOffbeat => "lightly_offbeat",
            Self::Straight => "straight",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DensityBucket {
    Dense,
    Moderate,
    Sparse,
}

impl Bucketed for DensityBucket {
    const ATOM: &'static str = "density_desc";
    const ALL: &'static [Self] = &[Self::Dense, Self::Moderate, Self::Sparse];

    fn classify(density_level: f64) -> Self {
        if density_level >= 0.67 {
            Self::Dense
        } else if density_level >= 0.34 {
            Self::Moderate
        } else {
            Self::Sparse
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Dense => "dense",
            Self::Moderate => "moderate",
            Self::Sparse => "sparse",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotifBucket {
    Insistent,
    Recurring,
    Free,
}

impl Bucketed for MotifBucket {
    const ATOM: &'static str = "motif_desc";
    const ALL: &'static [Self] = &[Self::Insistent, Self::Recurring, Self::Free];

    fn classify(motif_rate: f64) -> Self {
        if motif_rate >= 0.60 {
            Self::Insistent
        } else if motif_rate >= 0.30 {
            Self::Recurring
        } else {
            Self::Free
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Insistent => "insistent",
            Self::Recurring => "recurring",
            Self::Free => "free",
        }
    }
}

fn astro_bucket_name(element: Element) -> String {
    format!("astro_color.{}", element.as_str())
}

/// Every bucket name the atoms can select from.
pub fn atom_bucket_names() -> Vec<String> {
    fn all<B: Bucketed>() -> impl Iterator<Item = String> {
        B::ALL.iter().map(|b| b.bucket_name())
    }
    all::<ArcBucket>()
        .chain(all::<MovementBucket>())
        .chain(all::<RhythmBucket>())
        .chain(all::<DensityBucket>())
        .chain(all::<MotifBucket>())
        .chain(Element::ALL.into_iter().map(astro_bucket_name))
        .collect()
}

/// The six atoms for one control surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Atoms {
    pub arc_desc: String,
    pub movement: String,
    pub rhythm_feel: String,
    pub density_desc: String,
    pub motif_desc: String,
    pub astro_color: String,
}

impl Atoms {
    /// Derive all six atoms. `seed` is the control-surface hash.
    pub fn derive(
        tables: &MappingTables,
        controls: &ControlSurface,
        astro: &AstroSummary,
        seed: &str,
    ) -> Self {
        let pick = |bucket: String, atom: &str| {
            tables
                .pick(&bucket, &format!("{seed}{atom}"))
                .to_string()
        };

        let mut astro_color = pick(astro_bucket_name(controls.element_dominance), "astro_color");
        if let Some(tint) = astro
            .dominant_planets
            .iter()
            .find_map(|planet| tables.tint(planet))
        {
            astro_color.push(' ');
            astro_color.push_str(tint);
        }

        Atoms {
            arc_desc: pick(ArcBucket::classify(controls.arc_shape).bucket_name(), ArcBucket::ATOM),
            movement: pick(
                MovementBucket::classify(controls.step_bias).bucket_name(),
                MovementBucket::ATOM,
            ),
            rhythm_feel: pick(
                RhythmBucket::classify(controls.syncopation_bias).bucket_name(),
                RhythmBucket::ATOM,
            ),
            density_desc: pick(
                DensityBucket::classify(controls.density_level).bucket_name(),
                DensityBucket::ATOM,
            ),
            motif_desc: pick(
                MotifBucket::classify(controls.motif_rate).bucket_name(),
                MotifBucket::ATOM,
            ),
            astro_color,
        }
    }

    /// Look up an atom by its placeholder name.
    pub fn get(&self, name: &str) -> Option<&str> {
        match name {
            "arc_desc" => Some(&self.arc_desc),
            "movement" => Some(&self.movement),
            "rhythm_feel" => Some(&self.rhythm_feel),
            "density_desc" => Some(&self.density_desc),
            "motif_desc" => Some(&self.motif_desc),
            "astro_color" => Some(&self.astro_color),
            _ => None,
        }
    }
}
