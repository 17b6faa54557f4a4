//! YAML configuration loading
//!
//! Reads a pipeline file with `globals`, `pipeline` and `mappings` sections,
//! substitutes `${VAR}` references from the environment and resolves
//! per-field inheritance (mapping over pipeline over globals).
//!
//! Example format:
//! ```yaml
//! globals:
//!   retry_delay: 5
//! pipeline:
//!   pipeline_name: nightly
//! mappings:
//!   - mapping:
//!       mapping_name: orders
//!       from:
//!         store: { type: relational, connection_url: "sqlite://${DATA_DIR}/shop.db" }
//!         entity: { include: [orders] }
//!       to:
//!         store: { type: file, path: "./lake/{entity}/" }
//! ```

use super::{MappingConfig, PipelineConfig};
use eyre::{Context, Result, eyre};
use regex::{Captures, Regex};
use serde_yaml::{Mapping, Value};
use std::path::Path;
use std::sync::OnceLock;

/// Placeholder left untouched for the file store to fill per entity
const ENTITY_TOKEN: &str = "entity";

/// Read and resolve a pipeline configuration file using the process environment
pub fn load_pipeline_config(path: impl AsRef<Path>) -> Result<PipelineConfig> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file: {}", path.display()))?;
    parse_pipeline_config(&content)
        .with_context(|| format!("Invalid configuration file: {}", path.display()))
}

/// Parse YAML text using the process environment for substitution
pub fn parse_pipeline_config(content: &str) -> Result<PipelineConfig> {
    parse_pipeline_config_with(content, |name| std::env::var(name).ok())
}

/// Parse YAML text with an explicit variable lookup
pub fn parse_pipeline_config_with(
    content: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<PipelineConfig> {
    let raw: Value = serde_yaml::from_str(content).context("Invalid YAML syntax")?;
    if raw.is_null() {
        eyre::bail!("Configuration file is empty");
    }
    let raw = substitute_env(raw, &lookup);
    resolve(&raw)
}

/// Apply inheritance and deserialize into typed configuration
pub fn resolve(raw: &Value) -> Result<PipelineConfig> {
    let root = raw
        .as_mapping()
        .ok_or_else(|| eyre!("Configuration root must be a mapping"))?;

    let globals = section(root, "globals")?;
    let pipeline_section = section(root, "pipeline")?;

    let mut pipeline = globals.clone();
    overlay(&mut pipeline, &pipeline_section);

    let name = ["pipeline_name", "name"]
        .iter()
        .find_map(|key| pipeline.get(*key).and_then(Value::as_str))
        .unwrap_or_default()
        .to_string();

    let entries = match root.get("mappings") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Sequence(entries)) => entries.clone(),
        Some(_) => eyre::bail!("'mappings' must be a list"),
    };

    let mut mappings = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let body = match entry.get("mapping") {
            Some(inner) => inner,
            None => entry,
        };
        let body = body
            .as_mapping()
            .ok_or_else(|| eyre!("Mapping {} must be a mapping", index + 1))?;

        let mut merged = pipeline.clone();
        overlay(&mut merged, body);

        let mapping: MappingConfig = serde_yaml::from_value(Value::Mapping(merged))
            .with_context(|| format!("Mapping {} is malformed", index + 1))?;
        mappings.push(mapping);
    }

    log::debug!(
        "Resolved pipeline '{}' with {} mapping(s)",
        name,
        mappings.len()
    );

    Ok(PipelineConfig { name, mappings })
}

fn section(root: &Mapping, key: &str) -> Result<Mapping> {
    match root.get(key) {
        None | Some(Value::Null) => Ok(Mapping::new()),
        Some(Value::Mapping(m)) => Ok(m.clone()),
        Some(_) => eyre::bail!("'{}' section must be a mapping", key),
    }
}

/// Shallow merge: keys in `top` replace keys in `base`
fn overlay(base: &mut Mapping, top: &Mapping) {
    for (key, value) in top {
        base.insert(key.clone(), value.clone());
    }
}

fn env_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("valid regex"))
}

/// Replace `${VAR}` in every string; unknown variables stay as written
pub fn substitute_env(value: Value, lookup: &impl Fn(&str) -> Option<String>) -> Value {
    match value {
        Value::String(text) => Value::String(substitute_str(&text, lookup)),
        Value::Sequence(items) => Value::Sequence(
            items
                .into_iter()
                .map(|item| substitute_env(item, lookup))
                .collect(),
        ),
        Value::Mapping(map) => Value::Mapping(
            map.into_iter()
                .map(|(k, v)| (k, substitute_env(v, lookup)))
                .collect(),
        ),
        other => other,
    }
}

fn substitute_str(text: &str, lookup: &impl Fn(&str) -> Option<String>) -> String {
    env_pattern()
        .replace_all(text, |caps: &Captures| {
            let name = &caps[1];
            if name == ENTITY_TOKEN {
                return caps[0].to_string();
            }
            lookup(name).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}
