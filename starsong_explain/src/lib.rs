// Starsong Explainer
//
// Deterministic natural-language explanation of a composed piece. Six
// "atoms" (short phrases) are selected from versioned mapping tables by
// bucketing the control surface, then assembled into short text, long text
// and bullets. When the calibrated quality gate fails, the realizer switches
// to fail-closed text made only of actionable control hints.
//
// Architecture:
// - tables.rs: Mapping-table document, load-time validation, seeded lookups
// - atoms.rs: Bucket classifications and the six atoms
// - realize.rs: PASS / FAIL-CLOSED realizer, overlay contrast, length budgets
// - text.rs: Whole-word utilities (synonym pass, truncation, templates)
//
// The tables are loaded from `data/mapping_tables.json` via
// `MappingTables::from_json()`. `default_tables()` embeds that file at
// compile time with `include_str!`.

pub mod atoms;
pub mod realize;
pub mod tables;
pub mod text;

pub use tables::{MappingError, MappingTables};

/// The embedded default mapping-table document.
pub const DEFAULT_TABLES_JSON: &str = include_str!("../data/mapping_tables.json");

/// Load the embedded default mapping tables.
///
/// Panics if the embedded JSON is malformed or fails validation (a build
/// defect, covered by tests).
pub fn default_tables() -> MappingTables {
    MappingTables::from_json(DEFAULT_TABLES_JSON).expect("embedded mapping_tables.json is invalid")
}
