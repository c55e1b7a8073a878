use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;

use serde_yaml::Value as YamlValue;

/// Parser/emitter seam for configuration documents.
pub trait YamlProvider: Send + Sync {
    fn parse_str(&self, input: &str) -> Result<YamlValue>;
    fn dump_value(&self, value: &YamlValue) -> Result<String>;
}

struct SerdeYamlProvider;

impl YamlProvider for SerdeYamlProvider {
    fn parse_str(&self, input: &str) -> Result<YamlValue> {
        Ok(serde_yaml::from_str(input)?)
    }

    fn dump_value(&self, value: &YamlValue) -> Result<String> {
        Ok(serde_yaml::to_string(value)?)
    }
}

static YAML_PROVIDER: OnceLock<Box<dyn YamlProvider>> = OnceLock::new();

fn provider() -> &'static dyn YamlProvider {
    YAML_PROVIDER
        .get_or_init(|| Box::new(SerdeYamlProvider))
        .as_ref()
}

pub fn load_from_path<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path).with_context(|| format!("Opening YAML file {path:?}"))?;
    // An empty document means "all defaults"
    if raw.trim().is_empty() {
        return Ok(serde_yaml::from_value(YamlValue::Mapping(Default::default()))?);
    }
    let value = provider().parse_str(&raw)?;
    Ok(serde_yaml::from_value(value)?)
}

pub fn save_to_path<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    let value = serde_yaml::to_value(data)?;
    let serialized = provider().dump_value(&value)?;
    fs::write(path, serialized).with_context(|| format!("Creating YAML file {path:?}"))
}
