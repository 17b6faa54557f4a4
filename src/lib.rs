//! DataFlow
//!
//! Declarative movement of tabular data between relational databases and
//! file stores, driven by a YAML pipeline definition

pub mod cli;
pub mod config;
pub mod dataset;
pub mod error;
pub mod etl;
pub mod logger;
pub mod storage;
pub mod transform;

// Re-exports for convenience
pub use config::{MappingConfig, PipelineConfig, WriteMode, load_pipeline_config, validate};
pub use dataset::Dataset;
pub use error::{ErrorKind, FlowError, Result};
pub use etl::{
    Engine, MappingReport, Pipeline, PipelineReport, RetryMode, RunLog, TransformChain, Transformer,
};
pub use logger::Logger;
pub use storage::{Store, StoreFactory, WriteOptions, create_store};
