// Mapping tables: the versioned, read-only phrase data behind the explainer.
//
// One JSON document holds every bucket (`phrases` or `templates` lists keyed
// by bucket name), planet tints, seed-selected synonym sets, the per-gate
// sandbox hints used in fail-closed text, and the adjective list those hints
// must avoid. `MappingTables::from_json` parses and validates the whole
// document once; afterwards the struct exposes only shared-reference
// accessors, so a loaded table can be shared across threads behind an `Arc`
// and can never change underneath a request.
//
// Validation guarantees that every lookup the atoms and realizer perform
// hits a non-empty bucket, so the accessors used on the hot path return
// plain `&str`.

use crate::atoms::{ATOM_NAMES, atom_bucket_names};
use crate::realize::{ContrastField, TEMPLATE_BUCKETS};
use crate::text;
use serde::{Deserialize, Serialize};
use starsong_music::gates::GateName;
use starsong_prng::seed_index;
use std::collections::BTreeMap;

/// Prefix every sandbox hint must start with.
pub const HINT_PREFIX: &str = "Adjust:";

/// Problems found while loading mapping tables.
#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    #[error("mapping tables are not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("mapping tables have an empty version")]
    MissingVersion,

    #[error("mapping tables are missing bucket {0:?}")]
    MissingBucket(String),

    #[error("bucket {0:?} has no entries")]
    EmptyBucket(String),

    #[error("template in {bucket:?} uses unknown placeholder {placeholder:?}")]
    UnknownPlaceholder { bucket: String, placeholder: String },

    #[error("no sandbox hint for gate {}", .0.as_str())]
    MissingHint(GateName),

    #[error("hint for {} must start with \"Adjust:\", got {hint:?}", .gate.as_str())]
    HintNotActionable { gate: GateName, hint: String },

    #[error("hint for {} contains the adjective {adjective:?}", .gate.as_str())]
    AdjectiveInHint { gate: GateName, adjective: String },

    #[error("mapping tables define no synonym sets")]
    NoSynonymSets,
}

/// A bucket holds either phrases or templates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhraseBucket {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub phrases: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub templates: Vec<String>,
}

impl PhraseBucket {
    pub fn entries(&self) -> &[String] {
        if self.phrases.is_empty() {
            &self.templates
        } else {
            &self.phrases
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct SynonymVariations {
    seed_based: SeedBasedSynonyms,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct SeedBasedSynonyms {
    sets: Vec<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct SandboxHint {
    hint: String,
}

/// Loaded, validated mapping tables. Construct with `from_json` or
/// `crate::default_tables`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingTables {
    version: String,
    buckets: BTreeMap<String, PhraseBucket>,
    /// Lowercase planet name -> tint phrase.
    #[serde(default)]
    tints: BTreeMap<String, String>,
    synonym_variations: SynonymVariations,
    sandbox_hints: BTreeMap<GateName, SandboxHint>,
    #[serde(default)]
    banned_adjectives: Vec<String>,
}

impl MappingTables {
    /// Parse and validate a mapping-table document.
    pub fn from_json(json: &str) -> Result<Self, MappingError> {
        let tables: MappingTables = serde_json::from_str(json)?;
        tables.validate()?;
        Ok(tables)
    }

    fn validate(&self) -> Result<(), MappingError> {
        if self.version.trim().is_empty() {
            return Err(MappingError::MissingVersion);
        }

        let required = atom_bucket_names()
            .into_iter()
            .chain(TEMPLATE_BUCKETS.iter().map(|b| b.to_string()))
            .chain(ContrastField::bucket_names());
        for name in required {
            let bucket = self
                .buckets
                .get(&name)
                .ok_or_else(|| MappingError::MissingBucket(name.clone()))?;
            if bucket.entries().is_empty() {
                return Err(MappingError::EmptyBucket(name));
            }
        }

        for (name, bucket) in &self.buckets {
            for template in &bucket.templates {
                let names = text::placeholders(template).map_err(|rest| {
                    MappingError::UnknownPlaceholder {
                        bucket: name.clone(),
                        placeholder: rest.to_string(),
                    }
                })?;
                let unknown = names
                    .into_iter()
                    .find(|n| !ATOM_NAMES.iter().any(|a| a == n));
                if let Some(unknown) = unknown {
                    return Err(MappingError::UnknownPlaceholder {
                        bucket: name.clone(),
                        placeholder: unknown.to_string(),
                    });
                }
            }
        }

        for gate in GateName::ALL {
            let hint = &self
                .sandbox_hints
                .get(&gate)
                .ok_or(MappingError::MissingHint(gate))?
                .hint;
            if !hint.starts_with(HINT_PREFIX) {
                return Err(MappingError::HintNotActionable {
                    gate,
                    hint: hint.clone(),
                });
            }
            if let Some(adjective) = self.banned_adjective_in(hint) {
                return Err(MappingError::AdjectiveInHint {
                    gate,
                    adjective: adjective.to_string(),
                });
            }
        }

        if self.synonym_variations.seed_based.sets.is_empty() {
            return Err(MappingError::NoSynonymSets);
        }
        Ok(())
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Entries of a bucket, if it exists.
    pub fn phrases(&self, bucket: &str) -> Option<&[String]> {
        self.buckets.get(bucket).map(PhraseBucket::entries)
    }

    /// One entry of `bucket`, chosen by `seed_index(key, len)`. Empty when the
    /// bucket is absent, which validation rules out for every bucket the
    /// explainer uses.
    pub fn pick(&self, bucket: &str, key: &str) -> &str {
        match self.phrases(bucket) {
            Some(entries) if !entries.is_empty() => &entries[seed_index(key, entries.len())],
            _ => "",
        }
    }

    /// Tint phrase for a lowercase planet name.
    pub fn tint(&self, planet: &str) -> Option<&str> {
        self.tints.get(planet).map(String::as_str)
    }

    /// The synonym set selected by `seed_hash(seed) % set_count`.
    pub fn synonym_set(&self, seed: &str) -> &BTreeMap<String, String> {
        let sets = &self.synonym_variations.seed_based.sets;
        &sets[seed_index(seed, sets.len())]
    }

    pub fn synonym_set_count(&self) -> usize {
        self.synonym_variations.seed_based.sets.len()
    }

    /// The fail-closed hint for a gate.
    pub fn hint(&self, gate: GateName) -> &str {
        self.sandbox_hints
            .get(&gate)
            .map(|h| h.hint.as_str())
            .unwrap_or(HINT_PREFIX)
    }

    pub fn banned_adjectives(&self) -> &[String] {
        &self.banned_adjectives
    }

    /// The first banned adjective appearing in `text` as a whole word.
    pub fn banned_adjective_in(&self, text: &str) -> Option<&str> {
        self.banned_adjectives
            .iter()
            .find(|adjective| text::contains_word(text, adjective))
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DEFAULT_TABLES_JSON;
    use serde_json::Value;

    fn edited(edit: impl FnOnce(&mut Value)) -> String {
        let mut doc: Value = serde_json::from_str(DEFAULT_TABLES_JSON).unwrap();
        edit(&mut doc);
        doc.to_string()
    }

    #[test]
    fn test_default_tables_load() {
        let tables = MappingTables::from_json(DEFAULT_TABLES_JSON).unwrap();
        assert_eq!(tables.version(), "mapping-tables-2024.3");
        assert_eq!(tables.synonym_set_count(), 3);
        assert!(tables.phrases("template.short").is_some());
    }

    #[test]
    fn test_not_json() {
        assert!(matches!(
            MappingTables::from_json("{ nope"),
            Err(MappingError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_bucket_rejected() {
        let json = edited(|doc| {
            doc["buckets"]
                .as_object_mut()
                .unwrap()
                .remove("movement.balanced");
        });
        match MappingTables::from_json(&json) {
            Err(MappingError::MissingBucket(name)) => assert_eq!(name, "movement.balanced"),
            other => panic!("expected MissingBucket, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_bucket_rejected() {
        let json = edited(|doc| {
            doc["buckets"]["contrast.density_level.up"]["phrases"] = Value::Array(vec![]);
        });
        assert!(matches!(
            MappingTables::from_json(&json),
            Err(MappingError::EmptyBucket(name)) if name == "contrast.density_level.up"
        ));
    }

    #[test]
    fn test_missing_hint_rejected() {
        let json = edited(|doc| {
            doc["sandbox_hints"]
                .as_object_mut()
                .unwrap()
                .remove("rhythm_diversity");
        });
        assert!(matches!(
            MappingTables::from_json(&json),
            Err(MappingError::MissingHint(GateName::RhythmDiversity))
        ));
    }

    #[test]
    fn test_adjective_in_hint_rejected() {
        let json = edited(|doc| {
            doc["sandbox_hints"]["melody_arc"]["hint"] =
                Value::from("Adjust: arc_shape for a beautiful contour");
        });
        match MappingTables::from_json(&json) {
            Err(MappingError::AdjectiveInHint { gate, adjective }) => {
                assert_eq!(gate, GateName::MelodyArc);
                assert_eq!(adjective, "beautiful");
            }
            other => panic!("expected AdjectiveInHint, got {other:?}"),
        }
    }

    #[test]
    fn test_hint_without_prefix_rejected() {
        let json = edited(|doc| {
            doc["sandbox_hints"]["melody_step_leap"]["hint"] = Value::from("Try more steps");
        });
        assert!(matches!(
            MappingTables::from_json(&json),
            Err(MappingError::HintNotActionable { .. })
        ));
    }

    #[test]
    fn test_unknown_placeholder_rejected() {
        let json = edited(|doc| {
            doc["buckets"]["template.short"]["templates"] =
                serde_json::json!(["{arc_desc} at {tempo}."]);
        });
        match MappingTables::from_json(&json) {
            Err(MappingError::UnknownPlaceholder { bucket, placeholder }) => {
                assert_eq!(bucket, "template.short");
                assert_eq!(placeholder, "tempo");
            }
            other => panic!("expected UnknownPlaceholder, got {other:?}"),
        }
    }

    #[test]
    fn test_pick_is_stable_and_in_bucket() {
        let tables = MappingTables::from_json(DEFAULT_TABLES_JSON).unwrap();
        let a = tables.pick("density_desc.dense", "seed-Adensity_desc");
        let b = tables.pick("density_desc.dense", "seed-Adensity_desc");
        assert_eq!(a, b);
        assert!(
            tables
                .phrases("density_desc.dense")
                .unwrap()
                .iter()
                .any(|p| p == a)
        );
        assert_eq!(tables.pick("no.such.bucket", "k"), "");
    }

    #[test]
    fn test_default_hints_are_clean() {
        let tables = MappingTables::from_json(DEFAULT_TABLES_JSON).unwrap();
        for gate in GateName::ALL {
            let hint = tables.hint(gate);
            assert!(hint.starts_with(HINT_PREFIX));
            assert_eq!(tables.banned_adjective_in(hint), None);
        }
    }
}
