// Text realizer: atoms -> short text, long text and bullets.
//
// Two states, selected by the calibrated gate verdict:
//
// - PASS: fill the seed-selected template for each length class with the
//   atoms, capitalize sentences, optionally prefix an overlay contrast
//   clause, clip to the length budget at a sentence or word boundary, then
//   apply the seed-selected synonym set as whole-word replacements (clipping
//   again if a replacement made the text longer).
// - FAIL-CLOSED: `short` is empty; `long` and `bullets` carry only the
//   sandbox hints for the failing calibrated sub-gates, in gate order. These
//   come straight from the tables, whose loader guarantees they are
//   actionable and adjective-free. No contrast clause, no synonyms.
//
// Overlay contrast compares a natal surface with the current one. A field
// contributes when |current - natal| reaches its threshold (step_bias 0.10,
// syncopation_bias 0.15, density_level 0.20) within `CONTRAST_TOLERANCE`, so
// a decimal delta like 0.7 - 0.5 still counts as 0.20. No qualifying field
// means no clause, which is a normal outcome.

use crate::atoms::Atoms;
use crate::tables::MappingTables;
use crate::text;
use serde::{Deserialize, Serialize};
use starsong_music::astro::AstroSummary;
use starsong_music::controls::ControlSurface;
use starsong_music::gates::GateReport;
use std::collections::BTreeMap;

pub const SHORT_BUDGET: usize = 160;
pub const LONG_BUDGET: usize = 640;
pub const BULLET_BUDGET: usize = 120;

/// Template buckets, one per length class.
pub const TEMPLATE_BUCKETS: [&str; 3] = ["template.short", "template.long", "template.bullets"];

/// Separates bullets inside a bullets template.
pub const BULLET_SEPARATOR: char = '|';

/// Slack on contrast thresholds for decimal deltas.
pub const CONTRAST_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextState {
    Pass,
    FailClosed,
}

impl TextState {
    pub fn from_report(report: &GateReport) -> Self {
        if report.calibrated.overall {
            TextState::Pass
        } else {
            TextState::FailClosed
        }
    }
}

/// Controls compared in overlay mode, in the order their phrases appear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContrastField {
    StepBias,
    SyncopationBias,
    DensityLevel,
}

impl ContrastField {
    pub const ALL: [ContrastField; 3] = [
        ContrastField::StepBias,
        ContrastField::SyncopationBias,
        ContrastField::DensityLevel,
    ];

    pub fn key(self) -> &'static str {
        match self {
            ContrastField::StepBias => "step_bias",
            ContrastField::SyncopationBias => "syncopation_bias",
            ContrastField::DensityLevel => "density_level",
        }
    }

    pub fn threshold(self) -> f64 {
        match self {
            ContrastField::StepBias => 0.10,
            ContrastField::SyncopationBias => 0.15,
            ContrastField::DensityLevel => 0.20,
        }
    }

    pub fn value(self, controls: &ControlSurface) -> f64 {
        match self {
            ContrastField::StepBias => controls.step_bias,
            ContrastField::SyncopationBias => controls.syncopation_bias,
            ContrastField::DensityLevel => controls.density_level,
        }
    }

    /// All `contrast.<field>.up|down` bucket names.
    pub fn bucket_names() -> impl Iterator<Item = String> {
        Self::ALL.into_iter().flat_map(|field| {
            ["up", "down"]
                .into_iter()
                .map(move |dir| format!("contrast.{}.{dir}", field.key()))
        })
    }
}

/// One field whose natal-to-current change reached its threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContrastShift {
    pub field: ContrastField,
    /// current - natal
    pub delta: f64,
}

impl ContrastShift {
    pub fn bucket_name(&self) -> String {
        let direction = if self.delta > 0.0 { "up" } else { "down" };
        format!("contrast.{}.{direction}", self.field.key())
    }
}

/// Fields whose change meets the threshold, in `ContrastField::ALL` order.
pub fn contrast_shifts(natal: &ControlSurface, current: &ControlSurface) -> Vec<ContrastShift> {
    ContrastField::ALL
        .into_iter()
        .filter_map(|field| {
            let delta = field.value(current) - field.value(natal);
            (delta.abs() + CONTRAST_TOLERANCE >= field.threshold())
                .then_some(ContrastShift { field, delta })
        })
        .collect()
}

/// The contrast sentence for a set of shifts, or `None` when there are none.
pub fn contrast_clause(
    tables: &MappingTables,
    shifts: &[ContrastShift],
    seed: &str,
) -> Option<String> {
    let phrases: Vec<&str> = shifts
        .iter()
        .map(|shift| {
            let bucket = shift.bucket_name();
            tables.pick(&bucket, &format!("{seed}{bucket}"))
        })
        .collect();
    let joined = match phrases.as_slice() {
        [] => return None,
        [only] => only.to_string(),
        [init @ .., last] => format!("{} and {last}", init.join(", ")),
    };
    Some(format!("Compared with the natal chart, {joined}."))
}

/// Realized text. `seed` is always the control-surface hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextOutput {
    pub short: String,
    pub long: String,
    pub bullets: Vec<String>,
    pub seed: String,
}

pub struct RealizeInput<'a> {
    pub controls: &'a ControlSurface,
    pub astro: &'a AstroSummary,
    pub gates: &'a GateReport,
    /// Natal surface; `Some` only in overlay mode.
    pub natal: Option<&'a ControlSurface>,
}

/// Produce the text for one request.
pub fn realize(tables: &MappingTables, input: &RealizeInput) -> TextOutput {
    let seed = input.controls.hash.as_str();
    match TextState::from_report(input.gates) {
        TextState::Pass => realize_pass(tables, input, seed),
        TextState::FailClosed => realize_fail_closed(tables, input.gates, seed),
    }
}

fn realize_pass(tables: &MappingTables, input: &RealizeInput, seed: &str) -> TextOutput {
    let atoms = Atoms::derive(tables, input.controls, input.astro, seed);
    let fill = |bucket: &str| {
        let template = tables.pick(bucket, &format!("{seed}{bucket}"));
        text::fill_template(template, |name| atoms.get(name))
    };

    let mut short = text::capitalize_sentences(&fill(TEMPLATE_BUCKETS[0]));
    let mut long = text::capitalize_sentences(&fill(TEMPLATE_BUCKETS[1]));
    let mut bullets: Vec<String> = fill(TEMPLATE_BUCKETS[2])
        .split(BULLET_SEPARATOR)
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .map(text::capitalize_first)
        .collect();

    let shifts = input
        .natal
        .map(|natal| contrast_shifts(natal, input.controls))
        .unwrap_or_default();
    if let Some(clause) = contrast_clause(tables, &shifts, seed) {
        tracing::debug!(seed, shifts = shifts.len(), "overlay contrast clause emitted");
        short = format!("{clause} {short}");
        long = format!("{clause} {long}");
        match bullets.first_mut() {
            Some(first) => *first = format!("{clause} {first}"),
            None => bullets.push(clause),
        }
    }

    let synonyms = tables.synonym_set(seed);
    TextOutput {
        short: finish(&short, SHORT_BUDGET, synonyms),
        long: finish(&long, LONG_BUDGET, synonyms),
        bullets: bullets
            .iter()
            .map(|b| finish(b, BULLET_BUDGET, synonyms))
            .collect(),
        seed: seed.to_string(),
    }
}

fn finish(text: &str, budget: usize, synonyms: &BTreeMap<String, String>) -> String {
    let clipped = text::truncate(text, budget);
    let varied = text::substitute_words(&clipped, synonyms);
    text::truncate(&varied, budget)
}

fn realize_fail_closed(tables: &MappingTables, gates: &GateReport, seed: &str) -> TextOutput {
    let failing = gates.calibrated.failing();
    tracing::debug!(
        seed,
        failing = ?failing.iter().map(|g| g.as_str()).collect::<Vec<_>>(),
        "fail-closed text"
    );
    let hints: Vec<String> = failing
        .into_iter()
        .map(|gate| tables.hint(gate).to_string())
        .collect();
    TextOutput {
        short: String::new(),
        long: hints.join(" "),
        bullets: hints,
        seed: seed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::HINT_PREFIX;
    use crate::{DEFAULT_TABLES_JSON, default_tables};
    use starsong_music::features::Features;
    use starsong_music::gates::{GateName, GatePolicy, evaluate};

    fn gates(step_leap_ratio: f64) -> GateReport {
        let features = Features {
            step_leap_ratio,
            arc: 0.9,
            narrative_flow: 0.9,
            rhythm_diversity: 0.9,
        };
        evaluate(&features, &GatePolicy::default())
    }

    fn seed_a() -> ControlSurface {
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

    fn run(
        controls: &ControlSurface,
        report: &GateReport,
        natal: Option<&ControlSurface>,
    ) -> TextOutput {
        let astro = AstroSummary::neutral();
        realize(
            &default_tables(),
            &RealizeInput {
                controls,
                astro: &astro,
                gates: report,
                natal,
            },
        )
    }

    #[test]
    fn test_pass_text_shape() {
        let out = run(&seed_a(), &gates(0.9), None);
        assert_eq!(out.seed, "seed-A");
        assert!(!out.short.is_empty());
        assert!(out.short.chars().count() <= SHORT_BUDGET);
        assert!(out.long.chars().count() <= LONG_BUDGET);
        assert_eq!(out.bullets.len(), 6);
        assert!(out.bullets.iter().all(|b| b.chars().count() <= BULLET_BUDGET));
        assert!(out.short.starts_with(char::is_uppercase));
        assert!(out.bullets[0].starts_with("Shape:"));
    }

    #[test]
    fn test_pass_text_is_deterministic() {
        let a = run(&seed_a(), &gates(0.9), None);
        let b = run(&seed_a(), &gates(0.9), None);
        assert_eq!(a, b);
    }

    #[test]
    fn test_budgets_hold_across_seeds() {
        for i in 0..200 {
            let controls = ControlSurface {
                arc_shape: (i % 10) as f64 / 10.0,
                step_bias: (i % 7) as f64 / 7.0,
                hash: format!("seed-{i}"),
                ..ControlSurface::default()
            };
            let natal = ControlSurface {
                step_bias: 1.0 - controls.step_bias,
                syncopation_bias: 0.0,
                density_level: 1.0,
                ..controls.clone()
            };
            let out = run(&controls, &gates(0.9), Some(&natal));
            assert!(out.short.chars().count() <= SHORT_BUDGET, "{}", out.short);
            assert!(out.long.chars().count() <= LONG_BUDGET);
            assert!(out.bullets.iter().all(|b| b.chars().count() <= BULLET_BUDGET));
        }
    }

    #[test]
    fn test_fail_closed_text() {
        let tables = default_tables();
        let out = run(&seed_a(), &gates(0.1), None);
        assert_eq!(out.short, "");
        assert_eq!(out.seed, "seed-A");
        assert_eq!(out.bullets, vec![tables.hint(GateName::MelodyStepLeap)]);
        assert!(out.long.contains("step_bias"));
        for line in out.bullets.iter().chain(std::iter::once(&out.long)) {
            assert!(line.starts_with(HINT_PREFIX));
            assert_eq!(tables.banned_adjective_in(line), None);
        }
    }

    #[test]
    fn test_fail_closed_lists_every_failing_gate() {
        let features = Features {
            step_leap_ratio: 0.0,
            arc: 0.0,
            narrative_flow: 0.0,
            rhythm_diversity: 0.0,
        };
        let report = evaluate(&features, &GatePolicy::default());
        let out = run(&seed_a(), &report, None);
        assert_eq!(out.bullets.len(), 4);
        assert_eq!(out.long, out.bullets.join(" "));
    }

    #[test]
    fn test_no_contrast_below_thresholds() {
        let current = seed_a();
        let natal = ControlSurface {
            step_bias: current.step_bias - 0.09,
            syncopation_bias: current.syncopation_bias + 0.14,
            density_level: current.density_level - 0.19,
            ..current.clone()
        };
        assert!(contrast_shifts(&natal, &current).is_empty());
        let out = run(&current, &gates(0.9), Some(&natal));
        assert!(!out.short.starts_with("Compared"));
        assert_eq!(out, run(&current, &gates(0.9), None));
    }

    #[test]
    fn test_density_delta_of_exactly_point_two_qualifies() {
        let natal = ControlSurface {
            density_level: 0.5,
            ..seed_a()
        };
        let current = ControlSurface {
            density_level: 0.7,
            ..seed_a()
        };
        let shifts = contrast_shifts(&natal, &current);
        assert_eq!(shifts.len(), 1);
        assert_eq!(shifts[0].field, ContrastField::DensityLevel);
        assert_eq!(shifts[0].bucket_name(), "contrast.density_level.up");

        let out = run(&current, &gates(0.9), Some(&natal));
        assert!(out.short.starts_with("Compared with the natal chart"));
        assert!(out.long.starts_with("Compared with the natal chart"));
        assert!(out.bullets[0].starts_with("Compared with the natal chart"));
    }

    #[test]
    fn test_step_delta_of_exactly_point_one_qualifies() {
        let natal = ControlSurface {
            step_bias: 0.5,
            ..seed_a()
        };
        let current = ControlSurface {
            step_bias: 0.6,
            ..seed_a()
        };
        let shifts = contrast_shifts(&natal, &current);
        assert_eq!(shifts.len(), 1);
        assert_eq!(shifts[0].field, ContrastField::StepBias);
    }

    #[test]
    fn test_syncopation_delta_of_exactly_point_one_five_qualifies() {
        let natal = ControlSurface {
            syncopation_bias: 0.45,
            ..seed_a()
        };
        let current = ControlSurface {
            syncopation_bias: 0.3,
            ..seed_a()
        };
        let shifts = contrast_shifts(&natal, &current);
        assert_eq!(shifts.len(), 1);
        assert_eq!(shifts[0].field, ContrastField::SyncopationBias);
        assert_eq!(shifts[0].bucket_name(), "contrast.syncopation_bias.down");

        let just_under = ControlSurface {
            syncopation_bias: 0.31,
            ..seed_a()
        };
        assert!(contrast_shifts(&natal, &just_under).is_empty());
    }

    #[test]
    fn test_contrast_clause_joins_in_field_order() {
        let tables = default_tables();
        let shifts = [
            ContrastShift {
                field: ContrastField::StepBias,
                delta: -0.3,
            },
            ContrastShift {
                field: ContrastField::DensityLevel,
                delta: 0.3,
            },
        ];
        let clause = contrast_clause(&tables, &shifts, "s").unwrap();
        let step = tables.pick("contrast.step_bias.down", "scontrast.step_bias.down");
        let density = tables.pick("contrast.density_level.up", "scontrast.density_level.up");
        assert_eq!(
            clause,
            format!("Compared with the natal chart, {step} and {density}.")
        );
        assert_eq!(contrast_clause(&tables, &[], "s"), None);
    }

    #[test]
    fn test_no_contrast_when_fail_closed() {
        let natal = ControlSurface {
            density_level: 0.0,
            ..seed_a()
        };
        let out = run(&seed_a(), &gates(0.1), Some(&natal));
        assert_eq!(out.short, "");
        assert!(!out.long.contains("Compared"));
    }

    #[test]
    fn test_synonym_pass_replaces_whole_words() {
        let mut doc: serde_json::Value = serde_json::from_str(DEFAULT_TABLES_JSON).unwrap();
        doc["synonym_variations"]["seed_based"]["sets"] =
            serde_json::json!([{ "texture": "fabric" }]);
        doc["buckets"]["density_desc.moderate"]["phrases"] =
            serde_json::json!(["a moderate texture"]);
        let tables = MappingTables::from_json(&doc.to_string()).unwrap();
        let astro = AstroSummary::neutral();
        let controls = seed_a();
        let report = gates(0.9);
        let out = realize(
            &tables,
            &RealizeInput {
                controls: &controls,
                astro: &astro,
                gates: &report,
                natal: None,
            },
        );
        assert!(out.long.contains("a moderate fabric"), "{}", out.long);
        assert!(!text::contains_word(&out.long, "texture"));
        assert_eq!(out.bullets[3], "Fabric: a moderate fabric");
    }
}
