//! Transformer trait and the ordered chain the engine runs

use crate::config::{CleanupConfig, TransformationConfig};
use crate::dataset::Dataset;
use crate::error::Result;
use crate::logger::Logger;
use crate::transform::{Cleanup, create_transformer};

/// A single dataset-to-dataset step
///
/// Implementors are pure: they never modify their input and report
/// problems as errors instead of panicking.
///
/// # Example
/// ```no_run
/// use dataflow::etl::Transformer;
/// use dataflow::{Dataset, Result};
///
/// struct DropAll;
///
/// impl Transformer for DropAll {
///     fn name(&self) -> &'static str {
///         "drop_all"
///     }
///
///     fn transform(&self, input: &Dataset) -> Result<Dataset> {
///         Ok(input.retain_rows(&vec![false; input.row_count()]))
///     }
/// }
/// ```
pub trait Transformer: Send + Sync {
    /// Type tag used in logs and errors
    fn name(&self) -> &'static str;

    /// Produce a new dataset from `input`
    ///
    /// # Errors
    /// Returns an error if the step cannot be applied to this data
    fn transform(&self, input: &Dataset) -> Result<Dataset>;
}

/// Transformers applied in order
///
/// A failing step is logged and skipped: the data it received flows on to
/// the next step unchanged.
pub struct TransformChain {
    steps: Vec<Box<dyn Transformer>>,
    logger: Logger,
}

impl TransformChain {
    pub fn new(steps: Vec<Box<dyn Transformer>>, logger: Logger) -> Self {
        Self { steps, logger }
    }

    /// Build the chain for a mapping; no configured steps means the default
    /// cleanup (drop empty rows, normalise column names)
    ///
    /// Steps that cannot be built are logged and left out of the chain.
    pub fn from_configs(configs: &[TransformationConfig], logger: &Logger) -> Self {
        let steps: Vec<Box<dyn Transformer>> = if configs.is_empty() {
            vec![Box::new(Cleanup::new(
                CleanupConfig::engine_default(),
                logger.clone(),
            ))]
        } else {
            configs
                .iter()
                .filter_map(|config| match create_transformer(config, logger) {
                    Ok(step) => Some(step),
                    Err(e) => {
                        logger.error(format!("Skipping transformation: {}", e));
                        None
                    }
                })
                .collect()
        };
        Self::new(steps, logger.clone())
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Step names in execution order
    pub fn names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Run every step; never fails
    pub fn apply(&self, input: Dataset) -> Dataset {
        let mut current = input;
        for step in &self.steps {
            match step.transform(&current) {
                Ok(next) => {
                    self.logger.debug(format!(
                        "Transformation '{}': rows {} -> {}, columns {} -> {}",
                        step.name(),
                        current.row_count(),
                        next.row_count(),
                        current.column_count(),
                        next.column_count()
                    ));
                    current = next;
                }
                Err(e) => {
                    self.logger.error(format!(
                        "Transformation '{}' failed, passing data through unchanged: {}",
                        step.name(),
                        e
                    ));
                }
            }
        }
        current
    }
}

impl std::fmt::Debug for TransformChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformChain")
            .field("steps", &self.names())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FlowError;
    use crate::logger::CaptureSink;
    use serde_json::json;
    use std::sync::Arc;

    struct Failing;

    impl Transformer for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn transform(&self, _input: &Dataset) -> Result<Dataset> {
            Err(FlowError::transformation("failing", "boom"))
        }
    }

    struct KeepFirst;

    impl Transformer for KeepFirst {
        fn name(&self) -> &'static str {
            "keep_first"
        }

        fn transform(&self, input: &Dataset) -> Result<Dataset> {
            let mask: Vec<bool> = (0..input.row_count()).map(|i| i == 0).collect();
            Ok(input.retain_rows(&mask))
        }
    }

    fn numbers() -> Dataset {
        Dataset::from_rows(
            vec!["n".into()],
            vec![vec![json!(1)], vec![json!(2)], vec![json!(3)]],
        )
        .unwrap()
    }

    #[test]
    fn test_failing_step_passes_input_through() {
        let sink = Arc::new(CaptureSink::new());
        let chain = TransformChain::new(
            vec![Box::new(Failing), Box::new(KeepFirst)],
            Logger::new(sink.clone()),
        );

        let output = chain.apply(numbers());
        assert_eq!(output.row_count(), 1);
        assert!(sink.contains(log::Level::Error, "Transformation 'failing' failed"));
    }

    #[test]
    fn test_default_chain_is_cleanup() {
        let chain = TransformChain::from_configs(&[], &Logger::default());
        assert_eq!(chain.names(), vec!["cleanup"]);
    }

    #[test]
    fn test_configured_order_is_kept() {
        let configs = vec![
            TransformationConfig::Filter(Default::default()),
            TransformationConfig::SchemaMap(Default::default()),
        ];
        let chain = TransformChain::from_configs(&configs, &Logger::default());
        assert_eq!(chain.names(), vec!["filter", "schema_map"]);
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn test_unknown_type_is_skipped() {
        let sink = Arc::new(CaptureSink::new());
        let configs = vec![
            TransformationConfig::Unknown("deduplicate".into()),
            TransformationConfig::Filter(Default::default()),
        ];
        let chain = TransformChain::from_configs(&configs, &Logger::new(sink.clone()));
        assert_eq!(chain.names(), vec!["filter"]);
        assert!(sink.contains(
            log::Level::Error,
            "Unsupported transformation type: deduplicate"
        ));
    }

    #[test]
    fn test_only_unknown_types_pass_data_through() {
        let sink = Arc::new(CaptureSink::new());
        let configs = vec![TransformationConfig::Unknown("pivot".into())];
        let chain = TransformChain::from_configs(&configs, &Logger::new(sink.clone()));
        assert!(chain.is_empty());

        let output = chain.apply(numbers());
        assert_eq!(output, numbers());
        assert_eq!(sink.count(log::Level::Error), 1);
    }
}
