//! CLI helper functions

use crate::{
    config::{PipelineConfig, ValidationReport, load_pipeline_config, validate},
    etl::{ExecutionPlan, Pipeline, PipelineReport, RetryMode, RunLog},
    logger::Logger,
    storage::create_store,
};
use eyre::{Context, Result};
use owo_colors::OwoColorize;
use regex::Regex;
use std::path::{Path, PathBuf};

/// Options of the `run` command
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub config: PathBuf,
    /// Replaces `pipeline.pipeline_name` from the file
    pub pipeline_name: Option<String>,
    pub retry_mode: RetryMode,
    /// Directory holding run logs; `None` disables them
    pub state_dir: Option<PathBuf>,
    pub dry_run: bool,
}

/// Load a configuration file, optionally overriding the pipeline name
pub fn load_config(path: impl AsRef<Path>, pipeline_name: Option<&str>) -> Result<PipelineConfig> {
    let path = path.as_ref();
    let mut config = load_pipeline_config(path)?;
    if let Some(name) = pipeline_name {
        log::debug!("Overriding pipeline name '{}' with '{}'", config.name, name);
        config.name = name.to_string();
    }
    Ok(config)
}

/// Log validation errors and warnings; returns whether the config is usable
pub fn report_validation(report: &ValidationReport, logger: &Logger) -> bool {
    for warning in &report.warnings {
        logger.warn(format!("  - {}", warning));
    }
    if report.is_valid() {
        logger.info(format!("{} Configuration validation passed", "✓".green()));
        return true;
    }
    logger.error("Configuration validation failed:");
    for error in &report.errors {
        logger.error(format!("  - {}", error.red()));
    }
    false
}

/// Validate a configuration file without running anything
pub fn validate_config(path: impl AsRef<Path>, logger: &Logger) -> Result<bool> {
    let path = path.as_ref();
    logger.info(format!("Validating {}", path.display().bright_black()));
    let config = load_config(path, None)?;
    let report = validate(&config);
    Ok(report_validation(&report, logger))
}

/// Load, validate and execute (or plan) a pipeline
///
/// Returns `Ok(false)` when validation or execution fails; errors are
/// reserved for problems reading the configuration itself.
pub async fn run_pipeline(options: RunOptions, logger: &Logger) -> Result<bool> {
    logger.info(format!(
        "Configuration file: {}",
        options.config.display().bright_black()
    ));
    logger.info(format!("Retry mode: {}", options.retry_mode.cyan()));

    let config = load_config(&options.config, options.pipeline_name.as_deref())?;
    if !report_validation(&validate(&config), logger) {
        return Ok(false);
    }

    let mut pipeline = Pipeline::new(config, logger.clone()).with_retry_mode(options.retry_mode);
    if let Some(state_dir) = &options.state_dir {
        let run_log = RunLog::in_dir(state_dir, &pipeline.config().name);
        logger.debug(format!("Run log: {}", run_log.path().display()));
        pipeline = pipeline.with_run_log(run_log);
    }

    if options.dry_run {
        logger.info("Dry run mode - showing execution plan:");
        let plan = pipeline
            .plan()
            .context("Failed to build execution plan")?;
        show_plan(&plan, logger);
        return Ok(true);
    }

    let report = pipeline.execute().await;
    show_summary(&report, logger);
    Ok(report.succeeded())
}

/// Log a dry-run plan
pub fn show_plan(plan: &ExecutionPlan, logger: &Logger) {
    logger.info(format!("Pipeline: {}", plan.pipeline.bold()));
    logger.info(format!("Total mappings: {}", plan.steps.len()));
    if plan.start_index > 0 {
        logger.info(format!(
            "Continuing from mapping {} ({} already completed)",
            plan.start_index + 1,
            plan.start_index
        ));
    }

    for step in &plan.steps {
        let marker = if step.skipped {
            "skip".bright_black().to_string()
        } else {
            "run".green().to_string()
        };
        logger.info(format!(
            "  {}. [{}] {}",
            step.position,
            marker,
            step.mapping.cyan()
        ));
        logger.info(format!(
            "     Load type: {}, Write mode: {}",
            step.load_type, step.write_mode
        ));
        logger.info(format!("     From: {}", step.source));
        logger.info(format!("     To:   {}", step.target));
        let entities = if step.entities.is_empty() {
            "(none)".to_string()
        } else {
            step.entities.join(", ")
        };
        logger.info(format!("     Entities: {}", entities));
        logger.info(format!(
            "     Transformations: {}",
            step.transformations.join(" -> ")
        ));
        logger.info(format!(
            "     Attempts: {}, retry delay: {}s",
            step.attempts, step.retry_delay
        ));
    }
}

fn show_summary(report: &PipelineReport, logger: &Logger) {
    for outcome in &report.mappings {
        let status = if outcome.report.success {
            "✓".green().to_string()
        } else {
            "✗".red().to_string()
        };
        logger.info(format!(
            "{} {}: {} row(s) written in {} attempt(s)",
            status,
            outcome.report.mapping,
            outcome.report.rows_written(),
            outcome.attempts
        ));
    }
    if report.succeeded() {
        logger.info(format!(
            "{} Pipeline execution completed successfully",
            "✓".green()
        ));
    } else {
        logger.error(format!(
            "Pipeline execution failed: {}",
            report.error.as_deref().unwrap_or("unknown error")
        ));
    }
}

/// Report each mapping's entities and what the stores actually contain
///
/// Store entity listings can be narrowed with regex patterns: include
/// first, then exclude. Returns the number of configured entities missing
/// from their source store.
pub fn list_entities(
    path: impl AsRef<Path>,
    include: Option<&str>,
    exclude: Option<&str>,
    logger: &Logger,
) -> Result<usize> {
    let config = load_config(path, None)?;
    let include = include
        .map(|p| Regex::new(p).with_context(|| format!("Invalid include regex pattern: {}", p)))
        .transpose()?;
    let exclude = exclude
        .map(|p| Regex::new(p).with_context(|| format!("Invalid exclude regex pattern: {}", p)))
        .transpose()?;

    let mut missing = 0;
    for mapping in &config.mappings {
        logger.info(format!("Mapping {}", mapping.name.cyan()));

        let source = match create_store(&mapping.source, logger) {
            Ok(store) => store,
            Err(e) => {
                logger.warn(format!("  Cannot open source store: {}", e));
                continue;
            }
        };
        let target = create_store(&mapping.target, logger)
            .inspect_err(|e| logger.warn(format!("  Cannot open target store: {}", e)))
            .ok();
        logger.info(format!("  Source: {}", source.connection_descriptor()));

        for entity in &mapping.source.entity.include {
            let in_source = source.entity_exists(entity);
            let in_target = target.as_ref().is_some_and(|t| t.entity_exists(entity));
            if !in_source {
                missing += 1;
            }
            logger.info(format!(
                "  {} {} (target: {})",
                if in_source {
                    "✓".green().to_string()
                } else {
                    "✗".red().to_string()
                },
                entity,
                if in_target { "present" } else { "absent" }
            ));
        }

        let available: Vec<String> = source
            .list_entities()
            .with_context(|| format!("Failed to list entities for mapping {}", mapping.name))?
            .into_iter()
            .filter(|name| include.as_ref().is_none_or(|re| re.is_match(name)))
            .filter(|name| exclude.as_ref().is_none_or(|re| !re.is_match(name)))
            .collect();
        logger.info(format!(
            "  Source store has {} entit{}: {}",
            available.len(),
            if available.len() == 1 { "y" } else { "ies" },
            available.join(", ").bright_black()
        ));
    }
    Ok(missing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::CaptureSink;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn write_config(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("pipeline.yml");
        std::fs::write(&path, body).unwrap();
        path
    }

    fn capture() -> (Logger, Arc<CaptureSink>) {
        let sink = Arc::new(CaptureSink::new());
        (Logger::new(sink.clone()), sink)
    }

    fn file_pipeline(dir: &Path) -> String {
        format!(
            r#"
pipeline:
  pipeline_name: copy
mappings:
  - mapping:
      mapping_name: people
      retry_delay: 0
      from:
        store: {{ type: file, path: "{src}" }}
        data_format: {{ type: csv }}
        entity: {{ include: [people, ghosts] }}
      to:
        store: {{ type: file, path: "{dst}/{{entity}}/" }}
        data_format: {{ type: json }}
"#,
            src = dir.join("in").display(),
            dst = dir.join("out").display()
        )
    }

    fn seed(dir: &Path) {
        std::fs::create_dir_all(dir.join("in")).unwrap();
        std::fs::write(dir.join("in/people.csv"), "name,age\nada,36\ngrace,45\n").unwrap();
        std::fs::write(dir.join("in/pets.csv"), "name\nrex\n").unwrap();
    }

    #[test]
    fn test_load_config_overrides_name() {
        let dir = TempDir::new().unwrap();
        let path = write_config(dir.path(), &file_pipeline(dir.path()));
        let config = load_config(&path, Some("adhoc")).unwrap();
        assert_eq!(config.name, "adhoc");
    }

    #[test]
    fn test_validate_config_reports_errors() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            dir.path(),
            "pipeline:\n  pipeline_name: p\nmappings:\n  - mapping:\n      mapping_name: m\n      write_mode: upsert\n      from: { store: { type: file, path: ./a } }\n      to: { store: { type: file, path: ./b } }\n",
        );
        let (logger, sink) = capture();
        assert!(!validate_config(&path, &logger).unwrap());
        assert!(sink.contains(log::Level::Error, "merge_keys"));
    }

    #[tokio::test]
    async fn test_run_pipeline_end_to_end() {
        let dir = TempDir::new().unwrap();
        seed(dir.path());
        let path = write_config(dir.path(), &file_pipeline(dir.path()));
        let (logger, sink) = capture();

        let options = RunOptions {
            config: path,
            pipeline_name: None,
            retry_mode: RetryMode::Restart,
            state_dir: Some(dir.path().join("state")),
            dry_run: false,
        };
        assert!(run_pipeline(options, &logger).await.unwrap());
        assert!(dir.path().join("out/people/people.json").exists());
        assert!(dir.path().join("state/copy.run.json").exists());
        assert!(sink.contains(log::Level::Warn, "No data extracted for entity: ghosts"));
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let dir = TempDir::new().unwrap();
        seed(dir.path());
        let path = write_config(dir.path(), &file_pipeline(dir.path()));
        let (logger, sink) = capture();

        let options = RunOptions {
            config: path,
            pipeline_name: None,
            retry_mode: RetryMode::Restart,
            state_dir: None,
            dry_run: true,
        };
        assert!(run_pipeline(options, &logger).await.unwrap());
        assert!(!dir.path().join("out").exists());
        assert!(sink.contains(log::Level::Info, "Total mappings: 1"));
    }

    #[test]
    fn test_list_entities_counts_missing() {
        let dir = TempDir::new().unwrap();
        seed(dir.path());
        let path = write_config(dir.path(), &file_pipeline(dir.path()));
        let (logger, sink) = capture();

        let missing = list_entities(&path, None, Some("^pets$"), &logger).unwrap();
        assert_eq!(missing, 1);
        assert!(sink.contains(log::Level::Info, "Source store has 1 entity"));
    }

    #[test]
    fn test_list_entities_rejects_bad_regex() {
        let dir = TempDir::new().unwrap();
        let path = write_config(dir.path(), &file_pipeline(dir.path()));
        let (logger, _) = capture();
        let err = list_entities(&path, Some("("), None, &logger).unwrap_err();
        assert!(err.to_string().contains("Invalid include regex pattern"));
    }
}
