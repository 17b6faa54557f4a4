//! Pipeline configuration
//!
//! - [`types`]: resolved, typed configuration consumed by the engine
//! - [`loader`]: YAML parsing, inheritance and `${VAR}` substitution
//! - [`validator`]: pre-flight errors and warnings

mod loader;
mod types;
mod validator;

pub use loader::{load_pipeline_config, parse_pipeline_config, parse_pipeline_config_with};
pub use types::{
    CleanupConfig, DataFormat, DataFormatConfig, EntityConfig, FilterCondition, FilterConfig,
    LoadType, MappingConfig, PipelineConfig, SchemaMapConfig, StoreConfig, StoreKind,
    StoreSettings, TransformationConfig, WriteMode,
};
pub use validator::{ValidationReport, validate};
