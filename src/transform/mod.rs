//! Transformation implementations
//!
//! - [`SchemaMapper`]: rename and project columns
//! - [`RowFilter`]: keep rows matching every condition
//! - [`Cleanup`]: drop empty or duplicate rows, trim text, tidy column names

mod cleanup;
mod filter;
mod schema_map;

pub use cleanup::Cleanup;
pub use filter::{Operator, RowFilter};
pub use schema_map::SchemaMapper;

use crate::config::TransformationConfig;
use crate::error::{FlowError, Result};
use crate::etl::Transformer;
use crate::logger::Logger;

/// Instantiate the transformer described by `config`
///
/// # Errors
/// Returns a `Transformation` error for a type this crate does not implement
pub fn create_transformer(
    config: &TransformationConfig,
    logger: &Logger,
) -> Result<Box<dyn Transformer>> {
    let transformer: Box<dyn Transformer> = match config {
        TransformationConfig::SchemaMap(cfg) => Box::new(SchemaMapper::new(
            cfg.clone(),
            logger.scoped("dataflow::transform::schema_map"),
        )),
        TransformationConfig::Filter(cfg) => Box::new(RowFilter::new(
            cfg.clone(),
            logger.scoped("dataflow::transform::filter"),
        )),
        TransformationConfig::Cleanup(cfg) => Box::new(Cleanup::new(
            cfg.clone(),
            logger.scoped("dataflow::transform::cleanup"),
        )),
        TransformationConfig::Unknown(name) => {
            return Err(FlowError::transformation(
                name,
                format!("Unsupported transformation type: {}", name),
            ));
        }
    };
    Ok(transformer)
}
