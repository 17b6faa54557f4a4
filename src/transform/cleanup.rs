//! Basic data hygiene

use crate::config::CleanupConfig;
use crate::dataset::Dataset;
use crate::error::{FlowError, Result};
use crate::etl::Transformer;
use crate::logger::Logger;
use serde_json::Value;
use std::collections::HashSet;

/// Drops empty and duplicate rows, trims text cells and tidies column names
pub struct Cleanup {
    config: CleanupConfig,
    logger: Logger,
}

impl Cleanup {
    pub fn new(config: CleanupConfig, logger: Logger) -> Self {
        Self { config, logger }
    }
}

impl Transformer for Cleanup {
    fn name(&self) -> &'static str {
        "cleanup"
    }

    fn transform(&self, input: &Dataset) -> Result<Dataset> {
        let before = input.row_count();
        let mut data = input.clone();

        // A row is empty when every cell is null
        if self.config.remove_empty_rows {
            let mask: Vec<bool> = data
                .rows()
                .map(|row| row.iter().any(|cell| !cell.is_null()))
                .collect();
            data = data.retain_rows(&mask);
        }

        if self.config.remove_duplicates {
            let mut seen = HashSet::new();
            let mask: Vec<bool> = (0..data.row_count())
                .map(|row| seen.insert(data.full_row_key(row)))
                .collect();
            data = data.retain_rows(&mask);
        }

        if self.config.trim_whitespace {
            data.map_values(|cell| {
                if let Value::String(text) = cell {
                    let trimmed = text.trim();
                    if trimmed.len() != text.len() {
                        *text = trimmed.to_string();
                    }
                }
            });
        }

        if self.config.clean_column_names {
            data = data
                .map_column_names(|name| name.trim().replace(' ', "_"))
                .map_err(|e| FlowError::transformation(self.name(), e.to_string()))?;
        }

        self.logger.info(format!(
            "Basic cleanup completed. Rows: {} -> {}",
            before,
            data.row_count()
        ));
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    fn messy() -> Dataset {
        Dataset::from_rows(
            vec![" first name ".into(), "age".into()],
            vec![
                vec![json!("  ada "), json!(36)],
                vec![Value::Null, Value::Null],
                vec![json!("  ada "), json!(36)],
                vec![json!("grace"), Value::Null],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_defaults() {
        let cleanup = Cleanup::new(CleanupConfig::default(), Logger::default());
        let output = cleanup.transform(&messy()).unwrap();
        assert_eq!(output.column_names(), vec!["first_name", "age"]);
        assert_eq!(output.row_count(), 3);
        assert_eq!(output.row(0)[0], &json!("ada"));
    }

    #[test]
    fn test_remove_duplicates() {
        let config = CleanupConfig {
            remove_duplicates: true,
            ..Default::default()
        };
        let output = Cleanup::new(config, Logger::default())
            .transform(&messy())
            .unwrap();
        assert_eq!(output.row_count(), 2);
    }

    #[test]
    fn test_engine_default_does_not_trim() {
        let output = Cleanup::new(CleanupConfig::engine_default(), Logger::default())
            .transform(&messy())
            .unwrap();
        assert_eq!(output.row(0)[0], &json!("  ada "));
        assert_eq!(output.row_count(), 3);
    }

    #[test]
    fn test_colliding_column_names_fail() {
        let data = Dataset::from_rows(
            vec!["a b".into(), "a_b".into()],
            vec![vec![json!(1), json!(2)]],
        )
        .unwrap();
        let err = Cleanup::new(CleanupConfig::default(), Logger::default())
            .transform(&data)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transformation);
    }
}
