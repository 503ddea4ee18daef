use crate::error::Result;
use mdscope::stats::persist::Definition;
use serde::Deserialize;
use std::path::Path;

/// Analysis configuration file.
///
/// ```toml
/// deperiodize = true
/// recenter_resnames = ["PROT"]
///
/// [[groups]]
/// name = "ala"
/// command = "resname ALA"
///
/// [[properties]]
/// name = "backbone"
/// command = "dist ala 0 1"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Rewrap bonded structures across the periodic boundary on load.
    #[serde(default)]
    pub deperiodize: bool,

    /// Residue names whose atoms become the recenter target.
    #[serde(default)]
    pub recenter_resnames: Option<Vec<String>>,

    /// Frame-cache budget in MiB; the loader default applies when unset.
    #[serde(default)]
    pub cache_budget_mib: Option<u64>,

    #[serde(default)]
    pub groups: Vec<Definition>,

    #[serde(default)]
    pub properties: Vec<Definition>,
}

impl AnalysisConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_config_parses() {
        let config: AnalysisConfig = toml::from_str(
            r#"
            deperiodize = true
            recenter_resnames = ["PROT", "LIG"]
            cache_budget_mib = 64

            [[groups]]
            name = "ala"
            command = "resname ALA"

            [[properties]]
            name = "d01"
            command = "dist ala 0 1"
            "#,
        )
        .unwrap();

        assert!(config.deperiodize);
        assert_eq!(config.recenter_resnames.as_deref().unwrap().len(), 2);
        assert_eq!(config.cache_budget_mib, Some(64));
        assert_eq!(config.groups.len(), 1);
        assert_eq!(config.properties[0].command, "dist ala 0 1");
    }

    #[test]
    fn empty_config_defaults() {
        let config: AnalysisConfig = toml::from_str("").unwrap();
        assert!(!config.deperiodize);
        assert!(config.recenter_resnames.is_none());
        assert!(config.groups.is_empty());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(toml::from_str::<AnalysisConfig>("nonsense = 1").is_err());
    }
}
