// Immutable compose context, built once at process start.
//
// Holds the validated config, the shared mapping tables and the optional
// upstream collaborators. Everything is behind `Arc` and nothing offers a
// mutating method, so one context can serve any number of concurrent
// requests without locks. `Clone` is cheap (reference-count bumps).

use crate::config::ComposeConfig;
use crate::error::ConfigError;
use crate::upstream::{Ephemeris, VectorModel};
use starsong_explain::MappingTables;
use std::fmt;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct ComposeContext {
    config: Arc<ComposeConfig>,
    tables: Arc<MappingTables>,
    ephemeris: Option<Arc<dyn Ephemeris>>,
    model: Option<Arc<dyn VectorModel>>,
}

impl ComposeContext {
    /// Validate `config` and wrap it with `tables`. Fails on any startup
    /// defect, including an inverted gate policy.
    pub fn new(config: ComposeConfig, tables: MappingTables) -> Result<Self, ConfigError> {
        config.validate()?;
        info!(
            mapping_tables = tables.version(),
            gate_policy = %config.gates.version,
            duration_secs = config.duration_secs,
            "compose context ready"
        );
        Ok(ComposeContext {
            config: Arc::new(config),
            tables: Arc::new(tables),
            ephemeris: None,
            model: None,
        })
    }

    /// Context with the embedded default mapping tables.
    pub fn with_default_tables(config: ComposeConfig) -> Result<Self, ConfigError> {
        let tables = MappingTables::from_json(starsong_explain::DEFAULT_TABLES_JSON)?;
        Self::new(config, tables)
    }

    pub fn with_ephemeris(mut self, ephemeris: Arc<dyn Ephemeris>) -> Self {
        self.ephemeris = Some(ephemeris);
        self
    }

    pub fn with_model(mut self, model: Arc<dyn VectorModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn config(&self) -> &ComposeConfig {
        &self.config
    }

    pub fn tables(&self) -> &MappingTables {
        &self.tables
    }

    pub fn ephemeris(&self) -> Option<&dyn Ephemeris> {
        self.ephemeris.as_deref()
    }

    pub fn model(&self) -> Option<&dyn VectorModel> {
        self.model.as_deref()
    }
}

impl fmt::Debug for ComposeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComposeContext")
            .field("config", &self.config)
            .field("mapping_tables", &self.tables.version())
            .field("ephemeris", &self.ephemeris.is_some())
            .field("model", &self.model.is_some())
            .finish()
    }
}
