//! Desired-state manifests
//!
//! A manifest is a `DesiredState` written as YAML (`.yaml`, `.yml`, or any
//! other extension) or JSON (`.json`).

use std::path::Path;

use anyhow::{Context, Result};
use ferry_core::domain::state::DesiredState;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Format {
    Yaml,
    Json,
}

impl Format {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Format::Json,
            _ => Format::Yaml,
        }
    }
}

/// Read and parse a manifest file
pub fn load(path: impl AsRef<Path>) -> Result<DesiredState> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest: {}", path.display()))?;

    parse(&content, Format::from_path(path))
        .with_context(|| format!("Invalid manifest: {}", path.display()))
}

pub fn parse(content: &str, format: Format) -> Result<DesiredState> {
    let desired = match format {
        Format::Yaml => serde_yaml::from_str(content)?,
        Format::Json => serde_json::from_str(content)?,
    };
    Ok(desired)
}
