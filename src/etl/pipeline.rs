//! Pipeline orchestration
//!
//! A pipeline runs its mappings strictly in order through an [`Engine`],
//! retrying each failed mapping up to its configured number of attempts.
//! The first mapping that exhausts its attempts stops the pipeline.

use super::{Engine, MappingReport, MappingRecord, RunLog, RunRecord};
use crate::config::{
    LoadType, MappingConfig, PipelineConfig, StoreConfig, StoreKind, TransformationConfig,
    WriteMode,
};
use crate::error::{ErrorKind, FlowError, Result};
use crate::logger::Logger;
use crate::storage::mask_credentials;
use chrono::Utc;
use log::Level;
use std::str::FromStr;
use std::time::{Duration, Instant};

/// How a pipeline picks its first mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryMode {
    /// Always start from the first mapping
    #[default]
    Restart,
    /// Skip mappings the last unfinished run already completed
    Continue,
}

impl FromStr for RetryMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "restart" => Ok(Self::Restart),
            "continue" => Ok(Self::Continue),
            other => Err(format!(
                "invalid retry mode '{}', expected 'restart' or 'continue'",
                other
            )),
        }
    }
}

impl std::fmt::Display for RetryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Restart => write!(f, "restart"),
            Self::Continue => write!(f, "continue"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    NotStarted,
    Running,
    Succeeded,
    Failed,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::NotStarted => "not_started",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Final report of a mapping and how many attempts it took
#[derive(Debug, Clone, PartialEq)]
pub struct MappingOutcome {
    pub report: MappingReport,
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineReport {
    pub pipeline: String,
    pub state: PipelineState,
    /// Index of the first mapping executed in this run
    pub start_index: usize,
    pub mappings: Vec<MappingOutcome>,
    pub elapsed: Duration,
    pub error_kind: Option<ErrorKind>,
    pub error: Option<String>,
}

impl PipelineReport {
    pub fn succeeded(&self) -> bool {
        self.state == PipelineState::Succeeded
    }

    pub fn rows_written(&self) -> usize {
        self.mappings.iter().map(|m| m.report.rows_written()).sum()
    }
}

/// One line of a dry-run plan
#[derive(Debug, Clone, PartialEq)]
pub struct PlanStep {
    /// 1-based position in the pipeline
    pub position: usize,
    pub mapping: String,
    pub load_type: LoadType,
    pub write_mode: WriteMode,
    pub source: String,
    pub target: String,
    pub entities: Vec<String>,
    pub transformations: Vec<String>,
    pub attempts: u32,
    pub retry_delay: f64,
    /// Already completed by a previous run and skipped by `continue`
    pub skipped: bool,
}

/// What [`Pipeline::execute`] would do, without touching any store
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionPlan {
    pub pipeline: String,
    pub retry_mode: RetryMode,
    pub start_index: usize,
    pub steps: Vec<PlanStep>,
}

/// Ordered mapping executor with retry and resume support
///
/// # Example
/// ```no_run
/// use dataflow::config::PipelineConfig;
/// use dataflow::etl::{Pipeline, RetryMode, RunLog};
/// use dataflow::logger::Logger;
///
/// # async fn example(config: PipelineConfig) {
/// let mut pipeline = Pipeline::new(config, Logger::default())
///     .with_retry_mode(RetryMode::Continue)
///     .with_run_log(RunLog::in_dir(".dataflow", "nightly"));
///
/// let report = pipeline.execute().await;
/// println!("{} rows written", report.rows_written());
/// # }
/// ```
pub struct Pipeline {
    config: PipelineConfig,
    engine: Engine,
    retry_mode: RetryMode,
    run_log: Option<RunLog>,
    state: PipelineState,
    logger: Logger,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, logger: Logger) -> Self {
        Self {
            config,
            engine: Engine::new(logger.clone()),
            retry_mode: RetryMode::default(),
            run_log: None,
            state: PipelineState::NotStarted,
            logger,
        }
    }

    pub fn with_engine(mut self, engine: Engine) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_retry_mode(mut self, retry_mode: RetryMode) -> Self {
        self.retry_mode = retry_mode;
        self
    }

    pub fn with_run_log(mut self, run_log: RunLog) -> Self {
        self.run_log = Some(run_log);
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Index of the first mapping this run executes
    ///
    /// # Errors
    /// `continue` without a run log is a configuration error; an unreadable
    /// run log is a data error.
    pub fn start_index(&self) -> Result<usize> {
        Ok(self.resume_from()?.0)
    }

    /// Start index plus the previous run record it was derived from
    fn resume_from(&self) -> Result<(usize, Option<RunRecord>)> {
        match self.retry_mode {
            RetryMode::Restart => Ok((0, None)),
            RetryMode::Continue => {
                let run_log = self.run_log.as_ref().ok_or_else(|| {
                    FlowError::Config(
                        "Retry mode 'continue' requires a run log (set a state directory)"
                            .to_string(),
                    )
                })?;
                let Some(previous) = run_log.load()? else {
                    self.logger
                        .info("No previous run recorded, starting from the beginning");
                    return Ok((0, None));
                };
                let point = previous.resume_point(&self.config);
                if point.is_mismatch() {
                    self.logger.warn(&point);
                } else {
                    self.logger.info(&point);
                }
                Ok((point.index(), Some(previous)))
            }
        }
    }

    /// Describe the run without executing it
    pub fn plan(&self) -> Result<ExecutionPlan> {
        let start_index = self.start_index()?;
        let steps = self
            .config
            .mappings
            .iter()
            .enumerate()
            .map(|(index, mapping)| PlanStep {
                position: index + 1,
                mapping: mapping.name.clone(),
                load_type: mapping.load_type,
                write_mode: mapping.write_mode.clone(),
                source: describe_store(&mapping.source),
                target: describe_store(&mapping.target),
                entities: mapping.source.entity.include.clone(),
                transformations: transformation_names(mapping),
                attempts: mapping.attempts(),
                retry_delay: mapping.retry_delay,
                skipped: index < start_index,
            })
            .collect();
        Ok(ExecutionPlan {
            pipeline: self.config.name.clone(),
            retry_mode: self.retry_mode,
            start_index,
            steps,
        })
    }

    /// Run every mapping from the start index; failures end up in the report
    pub async fn execute(&mut self) -> PipelineReport {
        let started = Instant::now();
        self.state = PipelineState::Running;
        let mut report = PipelineReport {
            pipeline: self.config.name.clone(),
            state: PipelineState::Running,
            start_index: 0,
            mappings: Vec::new(),
            elapsed: Duration::ZERO,
            error_kind: None,
            error: None,
        };

        self.logger.event(
            Level::Info,
            &format!("Starting pipeline execution: {}", self.config.name),
            &[
                ("event_type", "pipeline_start".to_string()),
                ("pipeline", self.config.name.clone()),
                ("retry_mode", self.retry_mode.to_string()),
                ("mappings", self.config.mappings.len().to_string()),
            ],
        );

        let (start_index, previous) = match self.resume_from() {
            Ok(resume) => resume,
            Err(e) => {
                self.logger.error(format!("Cannot start pipeline: {}", e));
                report.error_kind = Some(e.kind());
                report.error = Some(e.to_string());
                return self.finish(report, started);
            }
        };
        report.start_index = start_index;
        if start_index > 0 {
            self.logger.info(format!(
                "Skipping {} mapping(s) completed by the previous run",
                start_index
            ));
        }

        let mut run = RunRecord::start(&self.config.name);
        if let Some(previous) = previous {
            run.mappings
                .extend(previous.mappings.into_iter().take(start_index));
        }

        let mappings = self.config.mappings[start_index..].to_vec();
        for mapping in &mappings {
            let outcome = self.execute_with_retry(mapping).await;
            run.mappings.push(MappingRecord {
                name: mapping.name.clone(),
                succeeded: outcome.report.success,
                attempts: outcome.attempts,
                rows_written: outcome.report.rows_written(),
                finished_at: Utc::now(),
            });
            let failed = !outcome.report.success;
            if failed {
                report.error_kind = outcome.report.error_kind;
                report.error = Some(format!(
                    "Mapping {} failed after {} attempts: {}",
                    mapping.name,
                    outcome.attempts,
                    outcome.report.error.as_deref().unwrap_or("unknown error")
                ));
            }
            report.mappings.push(outcome);
            if failed {
                self.save_run(&run);
                return self.finish(report, started);
            }
            self.save_run(&run);
        }

        run.completed = true;
        run.finished_at = Some(Utc::now());
        self.save_run(&run);
        report.state = PipelineState::Succeeded;
        self.finish(report, started)
    }

    async fn execute_with_retry(&self, mapping: &MappingConfig) -> MappingOutcome {
        let attempts = mapping.attempts();
        let mut attempt = 1;
        loop {
            if attempt > 1 {
                self.logger.info(format!(
                    "Retrying mapping {} (attempt {}/{})",
                    mapping.name, attempt, attempts
                ));
            }
            let report = self.engine.execute_mapping(mapping);
            if report.success {
                return MappingOutcome {
                    report,
                    attempts: attempt,
                };
            }
            if attempt >= attempts {
                self.logger.error(format!(
                    "Mapping {} failed after {} attempts",
                    mapping.name, attempts
                ));
                return MappingOutcome {
                    report,
                    attempts: attempt,
                };
            }
            self.logger.warn(format!(
                "Mapping {} failed on attempt {}/{}: {}",
                mapping.name,
                attempt,
                attempts,
                report.error.as_deref().unwrap_or("unknown error")
            ));
            tokio::time::sleep(mapping.retry_delay_duration()).await;
            attempt += 1;
        }
    }

    fn save_run(&self, run: &RunRecord) {
        if let Some(run_log) = &self.run_log
            && let Err(e) = run_log.save(run)
        {
            self.logger.warn(format!("Could not update run log: {}", e));
        }
    }

    fn finish(&mut self, mut report: PipelineReport, started: Instant) -> PipelineReport {
        if report.state != PipelineState::Succeeded {
            report.state = PipelineState::Failed;
        }
        report.elapsed = started.elapsed();
        self.state = report.state;

        let message = if report.succeeded() {
            "Pipeline completed successfully".to_string()
        } else {
            format!(
                "Pipeline failed: {}",
                report.error.as_deref().unwrap_or("unknown error")
            )
        };
        self.logger.event(
            if report.succeeded() { Level::Info } else { Level::Error },
            &message,
            &[
                ("event_type", "pipeline_end".to_string()),
                ("pipeline", report.pipeline.clone()),
                ("state", report.state.to_string()),
                ("rows_written", report.rows_written().to_string()),
            ],
        );
        self.logger.info(format!(
            "Total execution time: {:.2} seconds",
            report.elapsed.as_secs_f64()
        ));
        report
    }
}

/// Human-readable store summary with credentials masked
fn describe_store(config: &StoreConfig) -> String {
    match config.kind() {
        Ok(StoreKind::File) => {
            let format = match config.format() {
                Ok(format) => format.to_string(),
                Err(_) => config
                    .data_format
                    .as_ref()
                    .map(|f| format!("unsupported format '{}'", f.format_type))
                    .unwrap_or_default(),
            };
            format!(
                "file {} ({})",
                config.store.path.as_deref().unwrap_or("./data"),
                format
            )
        }
        Ok(StoreKind::Relational) => {
            let settings = &config.store;
            if let Some(url) = &settings.connection_url {
                format!("relational {}", mask_credentials(url))
            } else if let Some(db_name) = &settings.db_name {
                format!(
                    "relational {} database {}",
                    settings.db_type.as_deref().unwrap_or("postgresql"),
                    db_name
                )
            } else {
                "relational (connection from environment)".to_string()
            }
        }
        Err(_) => format!("unknown store type '{}'", config.store.store_type),
    }
}

fn transformation_names(mapping: &MappingConfig) -> Vec<String> {
    if mapping.transformations.is_empty() {
        return vec!["cleanup (default)".to_string()];
    }
    mapping
        .transformations
        .iter()
        .map(|t| match t {
            TransformationConfig::Unknown(name) => format!("{} (unsupported, skipped)", name),
            known => known.type_name().to_string(),
        })
        .collect()
}
