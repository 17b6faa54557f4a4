//! Resolved configuration types
//!
//! These are produced by the loader after inheritance and environment
//! substitution and are read-only inputs to the engine and pipeline.

use crate::error::{FlowError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

/// A fully resolved pipeline: a name and an ordered list of mappings
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub name: String,
    pub mappings: Vec<MappingConfig>,
}

impl PipelineConfig {
    pub fn new(name: impl Into<String>, mappings: Vec<MappingConfig>) -> Self {
        Self {
            name: name.into(),
            mappings,
        }
    }
}

/// Whether a mapping extracts everything or only changed data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadType {
    #[default]
    Full,
    Incremental,
}

impl std::fmt::Display for LoadType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Incremental => write!(f, "incremental"),
        }
    }
}

/// How incoming rows interact with existing target data
///
/// Unrecognised names are kept as [`WriteMode::Unknown`] rather than rejected
/// at load time; the target store reports them when it is asked to write.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum WriteMode {
    #[default]
    Overwrite,
    Append,
    Upsert,
    UpsertOnly,
    AppendDelete,
    Unknown(String),
}

impl WriteMode {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Overwrite => "overwrite",
            Self::Append => "append",
            Self::Upsert => "upsert",
            Self::UpsertOnly => "upsert_only",
            Self::AppendDelete => "append_delete",
            Self::Unknown(name) => name.as_str(),
        }
    }

    /// Modes that merge on key columns
    pub fn is_upsert(&self) -> bool {
        matches!(self, Self::Upsert | Self::UpsertOnly)
    }
}

impl From<String> for WriteMode {
    fn from(value: String) -> Self {
        let normalized = value.trim().to_lowercase();
        match normalized.as_str() {
            "overwrite" => Self::Overwrite,
            "append" => Self::Append,
            "upsert" => Self::Upsert,
            "upsert_only" => Self::UpsertOnly,
            "append_delete" => Self::AppendDelete,
            _ => Self::Unknown(value),
        }
    }
}

impl From<&str> for WriteMode {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<WriteMode> for String {
    fn from(mode: WriteMode) -> Self {
        mode.as_str().to_string()
    }
}

impl std::fmt::Display for WriteMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Store variant selected by the `type` tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Relational,
    File,
}

impl StoreKind {
    /// Map a configuration tag to a store variant
    pub fn from_tag(tag: &str) -> Result<Self> {
        match tag.trim().to_lowercase().as_str() {
            "relational" | "jdbc" | "database" | "sqlite" => Ok(Self::Relational),
            "file" | "local" | "filesystem" => Ok(Self::File),
            "s3" | "hdfs" => Err(FlowError::Config(format!(
                "Store type '{}' not yet implemented",
                tag
            ))),
            "" => Err(FlowError::Config(
                "Store configuration missing 'type' field".into(),
            )),
            other => Err(FlowError::Config(format!(
                "Unsupported store type: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Relational => write!(f, "relational"),
            Self::File => write!(f, "file"),
        }
    }
}

/// On-disk encoding used by file stores
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    Csv,
    Parquet,
    Json,
    Ndjson,
}

impl DataFormat {
    /// File extension written for this format
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Parquet => "parquet",
            Self::Json => "json",
            Self::Ndjson => "ndjson",
        }
    }
}

impl FromStr for DataFormat {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "parquet" => Ok(Self::Parquet),
            "json" => Ok(Self::Json),
            "ndjson" | "jsonl" => Ok(Self::Ndjson),
            other => Err(FlowError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl std::fmt::Display for DataFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// Connection and path parameters of a store (`from.store` / `to.store`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSettings {
    #[serde(rename = "type", default)]
    pub store_type: String,
    pub path: Option<String>,
    pub connection_url: Option<String>,
    pub db_type: Option<String>,
    pub host: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub port: Option<String>,
    #[serde(alias = "database")]
    pub db_name: Option<String>,
    #[serde(alias = "user")]
    pub username: Option<String>,
    pub password: Option<String>,
}

/// `data_format` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFormatConfig {
    #[serde(rename = "type")]
    pub format_type: String,
}

/// `entity` section: explicit names to process
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityConfig {
    #[serde(default)]
    pub include: Vec<String>,
}

/// Source or target of a mapping
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub data_format: Option<DataFormatConfig>,
    #[serde(default)]
    pub entity: EntityConfig,
}

impl StoreConfig {
    /// File store rooted at `path` with the given format name
    pub fn file(path: impl Into<String>, format: &str) -> Self {
        Self {
            store: StoreSettings {
                store_type: "file".to_string(),
                path: Some(path.into()),
                ..Default::default()
            },
            data_format: Some(DataFormatConfig {
                format_type: format.to_string(),
            }),
            entity: EntityConfig::default(),
        }
    }

    /// Relational store with an explicit connection URL
    pub fn relational(connection_url: impl Into<String>) -> Self {
        Self {
            store: StoreSettings {
                store_type: "relational".to_string(),
                connection_url: Some(connection_url.into()),
                ..Default::default()
            },
            data_format: None,
            entity: EntityConfig::default(),
        }
    }

    pub fn with_entities(mut self, entities: &[&str]) -> Self {
        self.entity.include = entities.iter().map(|e| e.to_string()).collect();
        self
    }

    pub fn kind(&self) -> Result<StoreKind> {
        StoreKind::from_tag(&self.store.store_type)
    }

    /// Configured format, csv when absent
    pub fn format(&self) -> Result<DataFormat> {
        match &self.data_format {
            Some(format) => format.format_type.parse(),
            None => Ok(DataFormat::Csv),
        }
    }
}

/// `schema_map` parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaMapConfig {
    #[serde(default)]
    pub column_mapping: BTreeMap<String, String>,
    #[serde(default)]
    pub selected_columns: Vec<String>,
}

/// One `(column, operator, value)` filter condition
///
/// Fields default to empty so an incomplete condition is skipped with a
/// warning at run time instead of failing the whole configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterCondition {
    #[serde(default)]
    pub column: String,
    #[serde(default)]
    pub operator: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

impl FilterCondition {
    pub fn new(column: &str, operator: &str, value: serde_json::Value) -> Self {
        Self {
            column: column.to_string(),
            operator: operator.to_string(),
            value,
        }
    }
}

/// `filter` parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default)]
    pub conditions: Vec<FilterCondition>,
}

/// `cleanup` parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanupConfig {
    #[serde(default = "default_true")]
    pub remove_empty_rows: bool,
    #[serde(default)]
    pub remove_duplicates: bool,
    #[serde(default = "default_true")]
    pub trim_whitespace: bool,
    #[serde(default = "default_true")]
    pub clean_column_names: bool,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            remove_empty_rows: true,
            remove_duplicates: false,
            trim_whitespace: true,
            clean_column_names: true,
        }
    }
}

impl CleanupConfig {
    /// What the engine applies when a mapping lists no transformations
    pub fn engine_default() -> Self {
        Self {
            remove_empty_rows: true,
            remove_duplicates: false,
            trim_whitespace: false,
            clean_column_names: true,
        }
    }
}

/// One entry of a mapping's `transformations` list
///
/// An unrecognised `type` is kept as [`TransformationConfig::Unknown`] so the
/// rest of the configuration still loads; the chain skips it at run time.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformationConfig {
    SchemaMap(SchemaMapConfig),
    Filter(FilterConfig),
    Cleanup(CleanupConfig),
    Unknown(String),
}

impl TransformationConfig {
    /// The `type` tag as written in configuration
    pub fn type_name(&self) -> &str {
        match self {
            Self::SchemaMap(_) => "schema_map",
            Self::Filter(_) => "filter",
            Self::Cleanup(_) => "cleanup",
            Self::Unknown(name) => name.as_str(),
        }
    }
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum KnownTransformation {
    SchemaMap(SchemaMapConfig),
    Filter(FilterConfig),
    Cleanup(CleanupConfig),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum KnownTransformationRef<'a> {
    SchemaMap(&'a SchemaMapConfig),
    Filter(&'a FilterConfig),
    Cleanup(&'a CleanupConfig),
}

impl<'de> Deserialize<'de> for TransformationConfig {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;

        let value = serde_yaml::Value::deserialize(deserializer)?;
        let tag = value
            .get("type")
            .and_then(serde_yaml::Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| D::Error::missing_field("type"))?;

        match tag.as_str() {
            "schema_map" | "filter" | "cleanup" => {
                let known: KnownTransformation =
                    serde_yaml::from_value(value).map_err(D::Error::custom)?;
                Ok(match known {
                    KnownTransformation::SchemaMap(cfg) => Self::SchemaMap(cfg),
                    KnownTransformation::Filter(cfg) => Self::Filter(cfg),
                    KnownTransformation::Cleanup(cfg) => Self::Cleanup(cfg),
                })
            }
            _ => Ok(Self::Unknown(tag)),
        }
    }
}

impl Serialize for TransformationConfig {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;

        match self {
            Self::SchemaMap(cfg) => KnownTransformationRef::SchemaMap(cfg).serialize(serializer),
            Self::Filter(cfg) => KnownTransformationRef::Filter(cfg).serialize(serializer),
            Self::Cleanup(cfg) => KnownTransformationRef::Cleanup(cfg).serialize(serializer),
            Self::Unknown(name) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("type", name)?;
                map.end()
            }
        }
    }
}

/// One source-to-target data movement unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingConfig {
    #[serde(rename = "mapping_name", default)]
    pub name: String,
    #[serde(default)]
    pub load_type: LoadType,
    #[serde(default)]
    pub write_mode: WriteMode,
    /// Key columns for `upsert` and `upsert_only`
    #[serde(default)]
    pub merge_keys: Vec<String>,
    #[serde(rename = "from")]
    pub source: StoreConfig,
    #[serde(rename = "to")]
    pub target: StoreConfig,
    #[serde(default)]
    pub transformations: Vec<TransformationConfig>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Seconds to wait between attempts
    #[serde(default = "default_retry_delay")]
    pub retry_delay: f64,
}

impl MappingConfig {
    pub fn new(name: impl Into<String>, source: StoreConfig, target: StoreConfig) -> Self {
        Self {
            name: name.into(),
            load_type: LoadType::default(),
            write_mode: WriteMode::default(),
            merge_keys: Vec::new(),
            source,
            target,
            transformations: Vec::new(),
            max_retries: default_max_retries(),
            retry_delay: default_retry_delay(),
        }
    }

    pub fn with_write_mode(mut self, mode: impl Into<WriteMode>) -> Self {
        self.write_mode = mode.into();
        self
    }

    pub fn with_load_type(mut self, load_type: LoadType) -> Self {
        self.load_type = load_type;
        self
    }

    pub fn with_merge_keys(mut self, keys: &[&str]) -> Self {
        self.merge_keys = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn with_transformations(mut self, transformations: Vec<TransformationConfig>) -> Self {
        self.transformations = transformations;
        self
    }

    pub fn with_retries(mut self, max_retries: u32, retry_delay: f64) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }

    /// Total attempts the pipeline makes, never less than one
    pub fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }

    pub fn retry_delay_duration(&self) -> Duration {
        if self.retry_delay.is_finite() && self.retry_delay > 0.0 {
            Duration::from_secs_f64(self.retry_delay)
        } else {
            Duration::ZERO
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_retries() -> u32 {
    1
}

fn default_retry_delay() -> f64 {
    5.0
}

/// Ports may arrive as numbers or, after `${VAR}` substitution, as strings
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(u64),
    }

    Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
        Raw::Text(text) => text,
        Raw::Number(n) => n.to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_mode_parsing() {
        assert_eq!(WriteMode::from("overwrite"), WriteMode::Overwrite);
        assert_eq!(WriteMode::from("UPSERT_ONLY"), WriteMode::UpsertOnly);
        assert_eq!(
            WriteMode::from("merge"),
            WriteMode::Unknown("merge".to_string())
        );
        assert_eq!(WriteMode::from("merge").as_str(), "merge");
        assert!(WriteMode::Upsert.is_upsert());
        assert!(!WriteMode::Append.is_upsert());
    }

    #[test]
    fn test_store_kind_tags() {
        assert_eq!(StoreKind::from_tag("jdbc").unwrap(), StoreKind::Relational);
        assert_eq!(StoreKind::from_tag("local").unwrap(), StoreKind::File);
        assert!(StoreKind::from_tag("s3").is_err());
        assert!(StoreKind::from_tag("").is_err());
        assert!(StoreKind::from_tag("ftp").is_err());
    }

    #[test]
    fn test_data_format_parsing() {
        assert_eq!("CSV".parse::<DataFormat>().unwrap(), DataFormat::Csv);
        assert_eq!("jsonl".parse::<DataFormat>().unwrap(), DataFormat::Ndjson);
        let err = "xlsx".parse::<DataFormat>().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::UnsupportedFormat);
    }

    #[test]
    fn test_mapping_defaults_from_yaml() {
        let yaml = r#"
mapping_name: copy
from:
  store: { type: local, path: ./in }
  entity: { include: [a] }
to:
  store: { type: local, path: ./out, port: 5432 }
"#;
        let mapping: MappingConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(mapping.load_type, LoadType::Full);
        assert_eq!(mapping.write_mode, WriteMode::Overwrite);
        assert_eq!(mapping.max_retries, 1);
        assert_eq!(mapping.retry_delay, 5.0);
        assert_eq!(mapping.source.entity.include, vec!["a"]);
        assert_eq!(mapping.target.store.port.as_deref(), Some("5432"));
        assert_eq!(mapping.source.format().unwrap(), DataFormat::Csv);
    }

    #[test]
    fn test_transformation_tags() {
        let yaml = r#"
- type: schema_map
  column_mapping: { old: new }
- type: filter
  conditions:
    - { column: age, operator: greater_equal, value: 18 }
- type: cleanup
  remove_duplicates: true
"#;
        let list: Vec<TransformationConfig> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(list.len(), 3);
        match &list[2] {
            TransformationConfig::Cleanup(cfg) => {
                assert!(cfg.remove_duplicates);
                assert!(cfg.remove_empty_rows);
                assert!(cfg.trim_whitespace);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unknown_transformation_type_is_kept() {
        let yaml = r#"
- type: cleanup
- type: deduplicate
  columns: [id]
"#;
        let list: Vec<TransformationConfig> = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(list[0], TransformationConfig::Cleanup(_)));
        assert_eq!(
            list[1],
            TransformationConfig::Unknown("deduplicate".to_string())
        );
        assert_eq!(list[1].type_name(), "deduplicate");

        let text = serde_yaml::to_string(&list).unwrap();
        assert!(text.contains("type: deduplicate"));
        assert!(text.contains("type: cleanup"));
    }

    #[test]
    fn test_transformation_without_type_is_rejected() {
        let err = serde_yaml::from_str::<Vec<TransformationConfig>>("- remove_duplicates: true")
            .unwrap_err();
        assert!(err.to_string().contains("type"));
    }

    #[test]
    fn test_retry_helpers() {
        let mapping = MappingConfig::new("m", StoreConfig::default(), StoreConfig::default())
            .with_retries(0, -3.0);
        assert_eq!(mapping.attempts(), 1);
        assert_eq!(mapping.retry_delay_duration(), Duration::ZERO);
    }
}
