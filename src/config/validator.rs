//! Pre-flight checks on a resolved configuration

use super::{
    MappingConfig, PipelineConfig, StoreConfig, StoreKind, TransformationConfig, WriteMode,
};

/// Outcome of validating a pipeline configuration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validate a resolved pipeline configuration
pub fn validate(config: &PipelineConfig) -> ValidationReport {
    let mut report = ValidationReport::default();

    if config.name.trim().is_empty() {
        report
            .errors
            .push("Pipeline section missing required field: pipeline_name".to_string());
    }

    if config.mappings.is_empty() {
        report
            .warnings
            .push("No mappings defined in configuration".to_string());
    }

    for (index, mapping) in config.mappings.iter().enumerate() {
        validate_mapping(mapping, index + 1, &mut report);
    }

    report
}

fn validate_mapping(mapping: &MappingConfig, index: usize, report: &mut ValidationReport) {
    let label = if mapping.name.is_empty() {
        format!("Mapping {}", index)
    } else {
        format!("Mapping {} ('{}')", index, mapping.name)
    };

    if mapping.name.trim().is_empty() {
        report
            .errors
            .push(format!("{} missing required field: mapping_name", label));
    }

    match &mapping.write_mode {
        WriteMode::Unknown(mode) => report.errors.push(format!(
            "{} has unsupported write_mode: {}. Supported: overwrite, append, upsert, upsert_only",
            label, mode
        )),
        WriteMode::AppendDelete => report.errors.push(format!(
            "{} uses write_mode append_delete, which no store implements",
            label
        )),
        mode if mode.is_upsert() && mapping.merge_keys.is_empty() => report.errors.push(format!(
            "{} uses write_mode {} but defines no merge_keys",
            label, mode
        )),
        _ => {}
    }

    if mapping.max_retries == 0 {
        report
            .errors
            .push(format!("{} max_retries must be at least 1", label));
    }

    if mapping.retry_delay < 0.0 || !mapping.retry_delay.is_finite() {
        report.errors.push(format!(
            "{} retry_delay must be a non-negative number of seconds",
            label
        ));
    }

    if mapping.load_type == super::LoadType::Incremental {
        report.warnings.push(format!(
            "{} uses incremental load, which currently runs as a full load",
            label
        ));
    }

    for (position, transformation) in mapping.transformations.iter().enumerate() {
        if let TransformationConfig::Unknown(name) = transformation {
            report.warnings.push(format!(
                "{} transformation {} has unsupported type '{}' and will be skipped",
                label,
                position + 1,
                name
            ));
        }
    }

    if mapping.source.entity.include.is_empty() {
        report.warnings.push(format!(
            "{} lists no entities under from.entity.include and will do nothing",
            label
        ));
    }

    validate_store(&mapping.source, &format!("{} 'from'", label), report);
    validate_store(&mapping.target, &format!("{} 'to'", label), report);
}

fn validate_store(store: &StoreConfig, context: &str, report: &mut ValidationReport) {
    let kind = match store.kind() {
        Ok(kind) => kind,
        Err(e) => {
            report.errors.push(format!("{}: {}", context, e));
            return;
        }
    };

    match kind {
        StoreKind::File => {
            if store.store.path.as_deref().is_none_or(|p| p.trim().is_empty()) {
                report
                    .errors
                    .push(format!("{} file store must have 'path' field", context));
            }
            if let Err(e) = store.format() {
                report.errors.push(format!("{}: {}", context, e));
            }
        }
        StoreKind::Relational => {
            if store.store.connection_url.is_none() && store.store.db_name.is_none() {
                report.warnings.push(format!(
                    "{} relational store has neither 'connection_url' nor 'db_name'; relying on environment variables",
                    context
                ));
            }
        }
    }
}
