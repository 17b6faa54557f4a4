//! Column renaming and projection

use crate::config::SchemaMapConfig;
use crate::dataset::Dataset;
use crate::error::{FlowError, Result};
use crate::etl::Transformer;
use crate::logger::Logger;
use std::collections::HashMap;

/// Renames columns, then optionally keeps only the selected ones
///
/// Renames are applied simultaneously, so `{a: b, b: a}` swaps two columns.
/// Selected names that do not exist after renaming are ignored; if none of
/// them exist the projection is skipped with a warning.
pub struct SchemaMapper {
    column_mapping: HashMap<String, String>,
    selected_columns: Vec<String>,
    logger: Logger,
}

impl SchemaMapper {
    pub fn new(config: SchemaMapConfig, logger: Logger) -> Self {
        Self {
            column_mapping: config.column_mapping.into_iter().collect(),
            selected_columns: config.selected_columns,
            logger,
        }
    }
}

impl Transformer for SchemaMapper {
    fn name(&self) -> &'static str {
        "schema_map"
    }

    fn transform(&self, input: &Dataset) -> Result<Dataset> {
        let renamed = if self.column_mapping.is_empty() {
            input.clone()
        } else {
            input
                .rename(&self.column_mapping)
                .map_err(|e| FlowError::transformation(self.name(), e.to_string()))?
        };

        if self.selected_columns.is_empty() {
            return Ok(renamed);
        }

        let available: Vec<String> = self
            .selected_columns
            .iter()
            .filter(|name| renamed.has_column(name))
            .cloned()
            .collect();

        if available.is_empty() {
            self.logger
                .warn("No selected columns found in data, keeping all columns");
            return Ok(renamed);
        }

        self.logger
            .debug(format!("Selected columns: {}", available.join(", ")));
        Ok(renamed.select(&available))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::logger::CaptureSink;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn mapper(mapping: &[(&str, &str)], selected: &[&str]) -> (SchemaMapper, Arc<CaptureSink>) {
        let sink = Arc::new(CaptureSink::new());
        let config = SchemaMapConfig {
            column_mapping: mapping
                .iter()
                .map(|(a, b)| (a.to_string(), b.to_string()))
                .collect::<BTreeMap<_, _>>(),
            selected_columns: selected.iter().map(|s| s.to_string()).collect(),
        };
        (SchemaMapper::new(config, Logger::new(sink.clone())), sink)
    }

    fn single_old_column() -> Dataset {
        Dataset::from_rows(vec!["old".into()], vec![vec![json!(1)], vec![json!(2)]]).unwrap()
    }

    #[test]
    fn test_rename_single_column() {
        let (mapper, _) = mapper(&[("old", "new")], &[]);
        let output = mapper.transform(&single_old_column()).unwrap();
        assert_eq!(output.column_names(), vec!["new"]);
        assert_eq!(output.row_count(), 2);
    }

    #[test]
    fn test_rename_then_select_in_order() {
        let data = Dataset::from_rows(
            vec!["a".into(), "b".into(), "c".into()],
            vec![vec![json!(1), json!(2), json!(3)]],
        )
        .unwrap();
        let (mapper, _) = mapper(&[("a", "alpha")], &["c", "alpha", "missing"]);
        let output = mapper.transform(&data).unwrap();
        assert_eq!(output.column_names(), vec!["c", "alpha"]);
    }

    #[test]
    fn test_empty_selection_keeps_everything() {
        let (mapper, sink) = mapper(&[], &["nothing"]);
        let output = mapper.transform(&single_old_column()).unwrap();
        assert_eq!(output.column_names(), vec!["old"]);
        assert!(sink.contains(log::Level::Warn, "No selected columns"));
    }

    #[test]
    fn test_duplicate_names_are_errors() {
        let data = Dataset::from_rows(
            vec!["a".into(), "b".into()],
            vec![vec![json!(1), json!(2)]],
        )
        .unwrap();
        let (mapper, _) = mapper(&[("a", "b")], &[]);
        let err = mapper.transform(&data).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transformation);
    }
}
