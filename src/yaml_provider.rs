use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;

pub use serde_yaml::Value as YamlValue;

pub fn parse_str(input: &str) -> Result<YamlValue> {
    if input.trim().is_empty() {
        return Ok(YamlValue::Mapping(Default::default()));
    }
    Ok(serde_yaml::from_str(input)?)
}

pub fn load_from_path<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path).with_context(|| format!("Opening YAML file {path:?}"))?;
    let value = parse_str(&raw).with_context(|| format!("Parsing YAML file {path:?}"))?;
    Ok(serde_yaml::from_value(value)?)
}

pub fn save_to_path<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("Creating directory {parent:?}"))?;
    }
    let serialized = to_string(data)?;
    fs::write(path, serialized).with_context(|| format!("Creating YAML file {path:?}"))
}

pub fn to_string<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_yaml::to_string(value)?)
}
