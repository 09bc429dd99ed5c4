// The control surface: the fixed-schema input that drives generation.
//
// A `ControlSurface` is an immutable record of named numeric/categorical
// fields plus a `hash` that is the single seed for every downstream
// deterministic choice (composition, finalization, text selection). Two
// surfaces with identical field values always get the same canonical hash.
// A caller may supply its own hash (e.g. "seed-A"); it is then used verbatim.
//
// `ControlVector` is the six-dimensional output of the upstream chart model.
// `ControlSurface::from_vector` lifts a vector (plus the astro summary) into a
// full surface, and `ControlSurface::vector` projects a directly supplied
// surface back onto the vector so the generator always has both views.
//
// Validation happens once, before generation (`validated`). Out-of-range or
// non-finite values are rejected with the offending field name; there is no
// partial result.

use crate::astro::AstroSummary;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Largest accepted `leap_cap`, in scale degrees.
pub const MAX_LEAP_CAP: i64 = 12;

/// Number of built-in rhythm templates (`rhythm_template_id` is an index).
pub const RHYTHM_TEMPLATE_COUNT: i64 = 8;

/// The four classical elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Element {
    Fire,
    #[default]
    Earth,
    Air,
    Water,
}

impl Element {
    pub const ALL: [Element; 4] = [Element::Fire, Element::Earth, Element::Air, Element::Water];

    pub fn as_str(self) -> &'static str {
        match self {
            Element::Fire => "fire",
            Element::Earth => "earth",
            Element::Air => "air",
            Element::Water => "water",
        }
    }
}

/// Astrological modality (quality).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    Cardinal,
    #[default]
    Fixed,
    Mutable,
}

impl Modality {
    pub const ALL: [Modality; 3] = [Modality::Cardinal, Modality::Fixed, Modality::Mutable];

    pub fn as_str(self) -> &'static str {
        match self {
            Modality::Cardinal => "cardinal",
            Modality::Fixed => "fixed",
            Modality::Mutable => "mutable",
        }
    }
}

/// Rejected control-surface input.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ControlError {
    #[error("control `{field}` is not a finite number")]
    NonFinite { field: &'static str },

    #[error("control `{field}` = {value} is outside {expected}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        expected: &'static str,
    },
}

fn half() -> f64 {
    0.5
}

fn default_leap_cap() -> i64 {
    4
}

/// The six-dimensional vector produced by the upstream chart model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlVector {
    pub melodic_activity: f64,
    pub rhythm_density: f64,
    pub harmonic_tension: f64,
    pub contour: f64,
    pub pace: f64,
    pub syncopation: f64,
}

impl ControlVector {
    /// The neutral fallback used when the model is unavailable.
    pub fn neutral() -> Self {
        ControlVector {
            melodic_activity: 0.5,
            rhythm_density: 0.5,
            harmonic_tension: 0.5,
            contour: 0.5,
            pace: 0.5,
            syncopation: 0.5,
        }
    }

    pub fn as_array(&self) -> [f64; 6] {
        [
            self.melodic_activity,
            self.rhythm_density,
            self.harmonic_tension,
            self.contour,
            self.pace,
            self.syncopation,
        ]
    }

    pub fn from_array(v: [f64; 6]) -> Self {
        ControlVector {
            melodic_activity: clamp01(v[0]),
            rhythm_density: clamp01(v[1]),
            harmonic_tension: clamp01(v[2]),
            contour: clamp01(v[3]),
            pace: clamp01(v[4]),
            syncopation: clamp01(v[5]),
        }
    }
}

/// The control surface. See the module comment for the hash contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlSurface {
    #[serde(default = "half")]
    pub arc_shape: f64,
    #[serde(default = "half")]
    pub density_level: f64,
    #[serde(default = "half")]
    pub tempo_norm: f64,
    #[serde(default = "half")]
    pub step_bias: f64,
    /// Largest melodic leap, in scale degrees.
    #[serde(default = "default_leap_cap")]
    pub leap_cap: i64,
    #[serde(default)]
    pub rhythm_template_id: i64,
    #[serde(default = "half")]
    pub syncopation_bias: f64,
    #[serde(default = "half")]
    pub motif_rate: f64,
    #[serde(default)]
    pub element_dominance: Element,
    #[serde(default = "half")]
    pub aspect_tension: f64,
    #[serde(default)]
    pub modality: Modality,
    /// Master seed. Empty means "compute the canonical hash".
    #[serde(default)]
    pub hash: String,
}

impl Default for ControlSurface {
    fn default() -> Self {
        let mut surface = ControlSurface {
            arc_shape: 0.5,
            density_level: 0.5,
            tempo_norm: 0.5,
            step_bias: 0.5,
            leap_cap: default_leap_cap(),
            rhythm_template_id: 0,
            syncopation_bias: 0.5,
            motif_rate: 0.5,
            element_dominance: Element::default(),
            aspect_tension: 0.5,
            modality: Modality::default(),
            hash: String::new(),
        };
        surface.hash = surface.canonical_hash();
        surface
    }
}

impl ControlSurface {
    /// Lift a model vector into a full surface, taking the categorical fields
    /// from the astro summary. The result carries its canonical hash.
    pub fn from_vector(vector: &ControlVector, astro: &AstroSummary) -> Self {
        let v = ControlVector::from_array(vector.as_array());
        let mut surface = ControlSurface {
            arc_shape: v.contour,
            density_level: (v.melodic_activity + v.rhythm_density) / 2.0,
            tempo_norm: v.pace,
            step_bias: clamp01(0.85 - 0.5 * v.harmonic_tension),
            leap_cap: 2 + (5.0 * v.harmonic_tension).round() as i64,
            rhythm_template_id: ((v.rhythm_density * RHYTHM_TEMPLATE_COUNT as f64) as i64)
                .min(RHYTHM_TEMPLATE_COUNT - 1),
            syncopation_bias: v.syncopation,
            motif_rate: clamp01(0.2 + 0.6 * v.melodic_activity),
            element_dominance: astro.elements.dominant(),
            aspect_tension: clamp01(astro.aspect_tension),
            modality: astro.modalities.dominant(),
            hash: String::new(),
        };
        surface.hash = surface.canonical_hash();
        surface
    }

    /// Project this surface onto the six-dimensional control vector.
    pub fn vector(&self) -> ControlVector {
        let template = (self.rhythm_template_id as f64 + 0.5) / RHYTHM_TEMPLATE_COUNT as f64;
        ControlVector {
            melodic_activity: clamp01(0.5 * self.motif_rate + 0.5 * self.density_level),
            rhythm_density: clamp01(0.6 * self.density_level + 0.4 * template),
            harmonic_tension: clamp01(0.5 * self.aspect_tension + 0.5 * (1.0 - self.step_bias)),
            contour: self.arc_shape,
            pace: self.tempo_norm,
            syncopation: self.syncopation_bias,
        }
    }

    /// Tempo in beats per minute implied by `tempo_norm` (60..=140).
    pub fn tempo_bpm(&self) -> f64 {
        60.0 + 80.0 * self.tempo_norm
    }

    /// Canonical fingerprint of the field values (16 hex chars of SHA-256).
    ///
    /// The supplied `hash` field itself is not part of the fingerprint.
    pub fn canonical_hash(&self) -> String {
        let canonical = format!(
            "arc_shape={:.6};density_level={:.6};tempo_norm={:.6};step_bias={:.6};\
             leap_cap={};rhythm_template_id={};syncopation_bias={:.6};motif_rate={:.6};\
             element_dominance={};aspect_tension={:.6};modality={}",
            positive_zero(self.arc_shape),
            positive_zero(self.density_level),
            positive_zero(self.tempo_norm),
            positive_zero(self.step_bias),
            self.leap_cap,
            self.rhythm_template_id,
            positive_zero(self.syncopation_bias),
            positive_zero(self.motif_rate),
            self.element_dominance.as_str(),
            positive_zero(self.aspect_tension),
            self.modality.as_str(),
        );
        let digest = Sha256::digest(canonical.as_bytes());
        hex::encode(digest)[..16].to_string()
    }

    /// Check every field against its declared range, filling in the
    /// canonical hash when none was supplied.
    pub fn validated(mut self) -> Result<Self, ControlError> {
        let unit_fields = [
            ("arc_shape", self.arc_shape),
            ("density_level", self.density_level),
            ("tempo_norm", self.tempo_norm),
            ("step_bias", self.step_bias),
            ("syncopation_bias", self.syncopation_bias),
            ("motif_rate", self.motif_rate),
            ("aspect_tension", self.aspect_tension),
        ];
        for (field, value) in unit_fields {
            if !value.is_finite() {
                return Err(ControlError::NonFinite { field });
            }
            if !(0.0..=1.0).contains(&value) {
                return Err(ControlError::OutOfRange {
                    field,
                    value,
                    expected: "[0, 1]",
                });
            }
        }
        if !(0..=MAX_LEAP_CAP).contains(&self.leap_cap) {
            return Err(ControlError::OutOfRange {
                field: "leap_cap",
                value: self.leap_cap as f64,
                expected: "0..=12",
            });
        }
        if !(0..RHYTHM_TEMPLATE_COUNT).contains(&self.rhythm_template_id) {
            return Err(ControlError::OutOfRange {
                field: "rhythm_template_id",
                value: self.rhythm_template_id as f64,
                expected: "0..=7",
            });
        }
        for field in [
            &mut self.arc_shape,
            &mut self.density_level,
            &mut self.tempo_norm,
            &mut self.step_bias,
            &mut self.syncopation_bias,
            &mut self.motif_rate,
            &mut self.aspect_tension,
        ] {
            *field = positive_zero(*field);
        }
        if self.hash.trim().is_empty() {
            self.hash = self.canonical_hash();
        }
        Ok(self)
    }
}

/// `-0.0` compares equal to `0.0` but formats as `-0.000000`.
fn positive_zero(x: f64) -> f64 {
    x + 0.0
}

pub(crate) fn clamp01(x: f64) -> f64 {
    if x.is_nan() { 0.5 } else { x.clamp(0.0, 1.0) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example() -> ControlSurface {
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

    #[test]
    fn test_identical_fields_identical_hash() {
        let a = ControlSurface {
            hash: String::new(),
            ..example()
        };
        let b = a.clone();
        assert_eq!(a.canonical_hash(), b.canonical_hash());
        assert_eq!(a.canonical_hash().len(), 16);
    }

    #[test]
    fn test_signed_zero_hashes_like_zero() {
        let positive = ControlSurface {
            arc_shape: 0.0,
            syncopation_bias: 0.0,
            hash: String::new(),
            ..example()
        };
        let negative = ControlSurface {
            arc_shape: -0.0,
            syncopation_bias: -0.0,
            ..positive.clone()
        };
        assert_eq!(positive, negative);
        let a = positive.validated().unwrap();
        let b = negative.validated().unwrap();
        assert_eq!(a.hash, b.hash);
        assert!(b.arc_shape.is_sign_positive());
    }

    #[test]
    fn test_different_fields_different_hash() {
        let a = example();
        let b = ControlSurface {
            step_bias: 0.63,
            ..example()
        };
        assert_ne!(a.canonical_hash(), b.canonical_hash());
    }

    #[test]
    fn test_supplied_hash_is_kept() {
        let surface = example().validated().unwrap();
        assert_eq!(surface.hash, "seed-A");
    }

    #[test]
    fn test_missing_hash_is_filled() {
        let surface = ControlSurface {
            hash: String::new(),
            ..example()
        }
        .validated()
        .unwrap();
        assert_eq!(surface.hash, surface.canonical_hash());
    }

    #[test]
    fn test_out_of_range_rejected_with_field_name() {
        let err = ControlSurface {
            step_bias: 1.3,
            ..example()
        }
        .validated()
        .unwrap_err();
        assert!(matches!(
            err,
            ControlError::OutOfRange {
                field: "step_bias",
                ..
            }
        ));

        let err = ControlSurface {
            rhythm_template_id: 8,
            ..example()
        }
        .validated()
        .unwrap_err();
        assert!(err.to_string().contains("rhythm_template_id"));

        let err = ControlSurface {
            leap_cap: -1,
            ..example()
        }
        .validated()
        .unwrap_err();
        assert!(err.to_string().contains("leap_cap"));
    }

    #[test]
    fn test_nan_rejected() {
        let err = ControlSurface {
            density_level: f64::NAN,
            ..example()
        }
        .validated()
        .unwrap_err();
        assert_eq!(
            err,
            ControlError::NonFinite {
                field: "density_level"
            }
        );
    }

    #[test]
    fn test_partial_json_uses_neutral_defaults() {
        let json = r#"{"step_bias":0.62,"leap_cap":3,"rhythm_template_id":4,
            "syncopation_bias":0.28,"density_level":0.5,"arc_shape":0.45,
            "motif_rate":0.4,"hash":"seed-A"}"#;
        let surface: ControlSurface = serde_json::from_str(json).unwrap();
        assert_eq!(surface.tempo_norm, 0.5);
        assert_eq!(surface.element_dominance, Element::Earth);
        assert_eq!(surface.modality, Modality::Fixed);
        assert_eq!(surface, example());
    }

    #[test]
    fn test_from_vector_stays_in_range() {
        let astro = AstroSummary::neutral();
        for v in [[0.0; 6], [1.0; 6], [0.5; 6], [0.1, 0.9, 0.3, 0.7, 0.2, 0.8]] {
            let surface = ControlSurface::from_vector(&ControlVector::from_array(v), &astro)
                .validated()
                .unwrap();
            assert!(!surface.hash.is_empty());
        }
    }

    #[test]
    fn test_vector_projection_is_monotonic_in_density() {
        let low = ControlSurface {
            density_level: 0.2,
            ..example()
        }
        .vector();
        let high = ControlSurface {
            density_level: 0.8,
            ..example()
        }
        .vector();
        assert!(high.rhythm_density > low.rhythm_density);
        assert!(high.melodic_activity > low.melodic_activity);
    }
}
