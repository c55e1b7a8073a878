//! Run configuration: join settings, schema mappings and thresholds.
//!
//! Loaded from YAML; every field has a default so a partial document (or no
//! document at all) is valid. Command-line flags override loaded values.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{
    analytics::AnomalyThresholds,
    derive::DeriveOptions,
    error::{ReconError, ReconResult},
    join::{JoinMode, Suffixes},
    normalize::SchemaMapping,
    quality::QualityThresholds,
    yaml_provider,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinConfig {
    pub keys: Vec<String>,
    pub mode: JoinMode,
    pub suffixes: Suffixes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingConfig {
    pub labor: SchemaMapping,
    pub output: SchemaMapping,
    pub merged: SchemaMapping,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            labor: SchemaMapping::labor_default(),
            output: SchemaMapping::output_default(),
            merged: SchemaMapping::merged_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub project_columns: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            project_columns: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconConfig {
    pub join: JoinConfig,
    pub mappings: MappingConfig,
    pub derive: DeriveOptions,
    pub quality: QualityThresholds,
    pub anomaly: AnomalyThresholds,
    pub analysis: AnalysisConfig,
}

impl ReconConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let config: ReconConfig = yaml_provider::load_from_path(path)
            .with_context(|| format!("Loading configuration from {path:?}"))?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        yaml_provider::save_to_path(path, self)
            .with_context(|| format!("Writing configuration to {path:?}"))
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> ReconResult<()> {
        if self.join.suffixes.left == self.join.suffixes.right {
            return Err(ReconError::invalid(
                "join.suffixes",
                "left and right suffixes must differ",
            ));
        }
        self.quality.validate()?;
        self.anomaly.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_match_documented_thresholds() {
        let config = ReconConfig::default();
        assert_eq!(config.quality.min_operating_hours, 0.03);
        assert_eq!(config.quality.efficiency_window_pct.min, 20.0);
        assert_eq!(config.quality.efficiency_window_pct.max, 150.0);
        assert_eq!(config.anomaly.low, 0.8);
        assert_eq!(config.anomaly.high, 1.05);
        assert_eq!(config.anomaly.ct_deviation_pct, 20.0);
        assert_eq!(config.anomaly.top_n, 10);
        assert_eq!(config.join.mode, JoinMode::Inner);
        assert!(config.join.keys.is_empty());
        config.validate().expect("defaults are valid");
    }

    #[test]
    fn partial_yaml_fills_in_defaults() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("recon.yml");
        std::fs::write(
            &path,
            "join:\n  keys: [料號]\n  mode: left\nanomaly:\n  low: 0.7\n",
        )
        .expect("write config");
        let config = ReconConfig::load(&path).expect("load config");
        assert_eq!(config.join.keys, vec!["料號".to_string()]);
        assert_eq!(config.join.mode, JoinMode::Left);
        assert_eq!(config.anomaly.low, 0.7);
        assert_eq!(config.anomaly.high, 1.05);
        assert_eq!(config.mappings, MappingConfig::default());
    }

    #[test]
    fn saved_config_loads_back_identically() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("recon.yml");
        let mut config = ReconConfig::default();
        config.quality.reserved_names.push("TEST".to_string());
        config.save(&path).expect("save config");
        assert_eq!(ReconConfig::load(&path).expect("reload"), config);
    }

    #[test]
    fn identical_suffixes_are_rejected() {
        let mut config = ReconConfig::default();
        config.join.suffixes.right = config.join.suffixes.left.clone();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("join.suffixes"));
    }
}
