// Astro summary: the read-only output of the external ephemeris collaborator.
//
// Only the aggregate view is modeled here: element and modality weight
// distributions, the ordered list of dominant planets, an overall aspect
// tension, optional planet-cluster sizes (consumed by cluster mode), and the
// chart timestamp. `AstroSummary::neutral()` is the fallback used when the
// ephemeris is unavailable.

use crate::controls::{Element, Modality};
use serde::{Deserialize, Serialize};

/// Weight per element. Sums to 1 after `normalized()`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElementWeights {
    pub fire: f64,
    pub earth: f64,
    pub air: f64,
    pub water: f64,
}

impl ElementWeights {
    pub fn uniform() -> Self {
        ElementWeights {
            fire: 0.25,
            earth: 0.25,
            air: 0.25,
            water: 0.25,
        }
    }

    /// The dominant element at 0.4, the other three at 0.2.
    pub fn favoring(element: Element) -> Self {
        let mut w = ElementWeights {
            fire: 0.2,
            earth: 0.2,
            air: 0.2,
            water: 0.2,
        };
        *w.get_mut(element) = 0.4;
        w
    }

    pub fn get(&self, element: Element) -> f64 {
        match element {
            Element::Fire => self.fire,
            Element::Earth => self.earth,
            Element::Air => self.air,
            Element::Water => self.water,
        }
    }

    fn get_mut(&mut self, element: Element) -> &mut f64 {
        match element {
            Element::Fire => &mut self.fire,
            Element::Earth => &mut self.earth,
            Element::Air => &mut self.air,
            Element::Water => &mut self.water,
        }
    }

    pub fn total(&self) -> f64 {
        Element::ALL.iter().map(|&e| self.get(e).max(0.0)).sum()
    }

    /// Rescale to sum to 1. A degenerate distribution becomes uniform.
    pub fn normalized(&self) -> Self {
        let total = self.total();
        if total <= 0.0 || !total.is_finite() {
            return Self::uniform();
        }
        let mut w = *self;
        for e in Element::ALL {
            *w.get_mut(e) = self.get(e).max(0.0) / total;
        }
        w
    }

    /// Heaviest element; ties resolve in `Element::ALL` order.
    pub fn dominant(&self) -> Element {
        let mut best = Element::ALL[0];
        for e in Element::ALL {
            if self.get(e) > self.get(best) {
                best = e;
            }
        }
        best
    }
}

/// Weight per modality. Sums to 1 after `normalized()`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModalityWeights {
    pub cardinal: f64,
    pub fixed: f64,
    pub mutable: f64,
}

impl ModalityWeights {
    pub fn uniform() -> Self {
        ModalityWeights {
            cardinal: 1.0 / 3.0,
            fixed: 1.0 / 3.0,
            mutable: 1.0 / 3.0,
        }
    }

    pub fn get(&self, modality: Modality) -> f64 {
        match modality {
            Modality::Cardinal => self.cardinal,
            Modality::Fixed => self.fixed,
            Modality::Mutable => self.mutable,
        }
    }

    pub fn normalized(&self) -> Self {
        let total = self.cardinal.max(0.0) + self.fixed.max(0.0) + self.mutable.max(0.0);
        if total <= 0.0 || !total.is_finite() {
            return Self::uniform();
        }
        ModalityWeights {
            cardinal: self.cardinal.max(0.0) / total,
            fixed: self.fixed.max(0.0) / total,
            mutable: self.mutable.max(0.0) / total,
        }
    }

    /// Heaviest modality; ties resolve toward `Fixed`, then `Modality::ALL` order.
    pub fn dominant(&self) -> Modality {
        let mut best = Modality::Fixed;
        for m in Modality::ALL {
            if self.get(m) > self.get(best) {
                best = m;
            }
        }
        best
    }
}

/// Aggregate chart data supplied by the ephemeris collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AstroSummary {
    pub elements: ElementWeights,
    pub modalities: ModalityWeights,
    /// Lowercase planet names, most dominant first.
    #[serde(default)]
    pub dominant_planets: Vec<String>,
    #[serde(default = "default_tension")]
    pub aspect_tension: f64,
    /// Planet-cluster sizes, in chart order. Empty when not computed.
    #[serde(default)]
    pub clusters: Vec<u32>,
    #[serde(default)]
    pub timestamp: String,
}

fn default_tension() -> f64 {
    0.5
}

impl AstroSummary {
    /// Neutral fallback summary: uniform weights, no planets, mid tension.
    pub fn neutral() -> Self {
        AstroSummary {
            elements: ElementWeights::uniform(),
            modalities: ModalityWeights::uniform(),
            dominant_planets: Vec::new(),
            aspect_tension: 0.5,
            clusters: Vec::new(),
            timestamp: String::new(),
        }
    }

    /// Copy with both weight distributions rescaled to sum to 1 and the
    /// aspect tension clamped into [0, 1].
    pub fn normalized(&self) -> Self {
        AstroSummary {
            elements: self.elements.normalized(),
            modalities: self.modalities.normalized(),
            aspect_tension: crate::controls::clamp01(self.aspect_tension),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_weights_sum_to_one() {
        let w = ElementWeights {
            fire: 3.0,
            earth: 1.0,
            air: 0.0,
            water: 4.0,
        }
        .normalized();
        assert!((w.total() - 1.0).abs() < 1e-12);
        assert_eq!(w.dominant(), Element::Water);
    }

    #[test]
    fn test_degenerate_weights_become_uniform() {
        let w = ElementWeights {
            fire: 0.0,
            earth: 0.0,
            air: 0.0,
            water: 0.0,
        }
        .normalized();
        assert_eq!(w, ElementWeights::uniform());
    }

    #[test]
    fn test_favoring_makes_element_dominant() {
        for e in Element::ALL {
            assert_eq!(ElementWeights::favoring(e).dominant(), e);
        }
    }

    #[test]
    fn test_neutral_summary_modality_is_fixed() {
        assert_eq!(AstroSummary::neutral().modalities.dominant(), Modality::Fixed);
    }

    #[test]
    fn test_summary_parses_with_optional_fields_missing() {
        let json = r#"{
            "elements": {"fire": 0.1, "earth": 0.2, "air": 0.3, "water": 0.4},
            "modalities": {"cardinal": 0.5, "fixed": 0.25, "mutable": 0.25}
        }"#;
        let summary: AstroSummary = serde_json::from_str(json).unwrap();
        assert!(summary.dominant_planets.is_empty());
        assert!(summary.clusters.is_empty());
        assert_eq!(summary.aspect_tension, 0.5);
        assert_eq!(summary.modalities.dominant(), Modality::Cardinal);
    }
}
