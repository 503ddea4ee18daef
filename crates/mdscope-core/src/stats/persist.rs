use super::StatsEngine;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// A persisted group or property definition: the name and the full command
/// string it was created with. Computed data is never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Definition {
    pub name: String,
    pub command: String,
}

/// Serialized form of an engine's definitions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsDocument {
    #[serde(default)]
    pub groups: Vec<Definition>,
    #[serde(default)]
    pub properties: Vec<Definition>,
}

impl StatsDocument {
    pub fn from_engine(engine: &StatsEngine) -> Self {
        let groups = engine
            .group_ids()
            .filter_map(|id| {
                Some(Definition {
                    name: engine.group_name(id)?.to_string(),
                    command: engine.group_command(id)?,
                })
            })
            .collect();
        let properties = engine
            .property_ids()
            .filter_map(|id| {
                Some(Definition {
                    name: engine.property_name(id)?.to_string(),
                    command: engine.property_command(id)?,
                })
            })
            .collect();
        Self { groups, properties }
    }

    /// Recreates the definitions in an engine. Definitions that fail to
    /// create (duplicates, unknown commands) are logged and skipped.
    pub fn apply(&self, engine: &mut StatsEngine) {
        for def in &self.groups {
            if let Err(err) = engine.create_group(&def.name, &def.command) {
                warn!(group = %def.name, error = %err, "Skipping persisted group");
            }
        }
        for def in &self.properties {
            if let Err(err) = engine.create_property(&def.name, &def.command) {
                warn!(property = %def.name, error = %err, "Skipping persisted property");
            }
        }
    }
}

/// Writes the engine's group and property definitions as TOML.
pub fn store_stats(path: &Path, engine: &StatsEngine) -> Result<(), PersistError> {
    let document = StatsDocument::from_engine(engine);
    let text = toml::to_string_pretty(&document)?;
    std::fs::write(path, text)?;
    Ok(())
}

/// Reads definitions from a TOML file into the engine.
pub fn load_stats(path: &Path, engine: &mut StatsEngine) -> Result<(), PersistError> {
    let text = std::fs::read_to_string(path)?;
    let document: StatsDocument = toml::from_str(&text)?;
    document.apply(engine);
    Ok(())
}
