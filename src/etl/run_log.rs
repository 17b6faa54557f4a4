//! Persisted record of pipeline runs
//!
//! One JSON file per pipeline records which mappings finished in the most
//! recent run. `continue` retry mode reads it to skip mappings that already
//! succeeded.

use crate::config::PipelineConfig;
use crate::error::{FlowError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Result of one mapping within a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingRecord {
    pub name: String,
    pub succeeded: bool,
    pub attempts: u32,
    pub rows_written: usize,
    pub finished_at: DateTime<Utc>,
}

/// The most recent run of a pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub pipeline: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub completed: bool,
    #[serde(default)]
    pub mappings: Vec<MappingRecord>,
}

impl RunRecord {
    pub fn start(pipeline: &str) -> Self {
        Self {
            pipeline: pipeline.to_string(),
            started_at: Utc::now(),
            finished_at: None,
            completed: false,
            mappings: Vec::new(),
        }
    }

    /// Where a continued run should start
    ///
    /// Counts the leading mappings that succeeded and match the configured
    /// order. A finished run starts from the beginning; so does a record
    /// for a different pipeline or a reordered mapping list.
    pub fn resume_point(&self, config: &PipelineConfig) -> ResumePoint {
        if self.pipeline != config.name {
            return ResumePoint::Mismatch(format!(
                "Run log belongs to pipeline '{}'",
                self.pipeline
            ));
        }
        if self.completed {
            return ResumePoint::Completed;
        }

        let mut index = 0;
        for record in &self.mappings {
            match config.mappings.get(index) {
                Some(mapping) if mapping.name == record.name => {
                    if !record.succeeded {
                        break;
                    }
                    index += 1;
                }
                _ => {
                    return ResumePoint::Mismatch(format!(
                        "Run log mapping '{}' does not match the configured order",
                        record.name
                    ));
                }
            }
        }
        ResumePoint::After(index)
    }
}

/// Outcome of comparing a run record with the current configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumePoint {
    /// Skip this many mappings that already succeeded
    After(usize),
    /// The previous run finished
    Completed,
    /// The record cannot be trusted for this configuration
    Mismatch(String),
}

impl ResumePoint {
    /// Index of the first mapping to execute
    pub fn index(&self) -> usize {
        match self {
            Self::After(index) => *index,
            Self::Completed | Self::Mismatch(_) => 0,
        }
    }

    pub fn is_mismatch(&self) -> bool {
        matches!(self, Self::Mismatch(_))
    }
}

impl std::fmt::Display for ResumePoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::After(index) => write!(f, "Resuming after {} successful mapping(s)", index),
            Self::Completed => write!(f, "Previous run completed, starting from the beginning"),
            Self::Mismatch(reason) => write!(f, "{}, starting from the beginning", reason),
        }
    }
}

/// Location of a pipeline's run record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLog {
    path: PathBuf,
}

impl RunLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<dir>/<pipeline>.run.json`, with unsafe filename characters replaced
    pub fn in_dir(dir: impl AsRef<Path>, pipeline: &str) -> Self {
        let stem: String = pipeline
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let stem = if stem.is_empty() { "pipeline".to_string() } else { stem };
        Self::new(dir.as_ref().join(format!("{}.run.json", stem)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last saved record, `None` if nothing has been recorded yet
    pub fn load(&self) -> Result<Option<RunRecord>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content =
            std::fs::read_to_string(&self.path).map_err(|e| FlowError::io(&self.path, e))?;
        let record = serde_json::from_str(&content).map_err(|e| {
            FlowError::Data(format!("Corrupt run log {}: {}", self.path.display(), e))
        })?;
        Ok(Some(record))
    }

    /// Replace the stored record
    pub fn save(&self, record: &RunRecord) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| FlowError::io(parent, e))?;
        }
        let content = serde_json::to_string_pretty(record)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content).map_err(|e| FlowError::io(&tmp, e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| FlowError::io(&self.path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MappingConfig, StoreConfig};
    use tempfile::TempDir;

    fn config(names: &[&str]) -> PipelineConfig {
        PipelineConfig::new(
            "nightly",
            names
                .iter()
                .map(|n| MappingConfig::new(*n, StoreConfig::default(), StoreConfig::default()))
                .collect(),
        )
    }

    fn record(results: &[(&str, bool)]) -> RunRecord {
        let mut run = RunRecord::start("nightly");
        for (name, succeeded) in results {
            run.mappings.push(MappingRecord {
                name: name.to_string(),
                succeeded: *succeeded,
                attempts: 1,
                rows_written: 0,
                finished_at: Utc::now(),
            });
        }
        run
    }

    #[test]
    fn test_resume_after_successful_prefix() {
        let cfg = config(&["a", "b", "c"]);
        assert_eq!(
            record(&[("a", true), ("b", false)]).resume_point(&cfg),
            ResumePoint::After(1)
        );
        assert_eq!(record(&[("a", true), ("b", true)]).resume_point(&cfg).index(), 2);
        assert_eq!(record(&[]).resume_point(&cfg), ResumePoint::After(0));
    }

    #[test]
    fn test_failed_first_mapping_is_not_a_mismatch() {
        let cfg = config(&["a", "b"]);
        let point = record(&[("a", false)]).resume_point(&cfg);
        assert_eq!(point, ResumePoint::After(0));
        assert!(!point.is_mismatch());
        assert_eq!(point.to_string(), "Resuming after 0 successful mapping(s)");
    }

    #[test]
    fn test_resume_restarts_on_mismatch_or_completion() {
        let cfg = config(&["a", "b"]);
        let point = record(&[("b", true)]).resume_point(&cfg);
        assert_eq!(point.index(), 0);
        assert!(point.is_mismatch());
        assert!(point.to_string().contains("does not match"));

        let mut done = record(&[("a", true), ("b", true)]);
        done.completed = true;
        assert_eq!(done.resume_point(&cfg), ResumePoint::Completed);
        assert_eq!(done.resume_point(&cfg).index(), 0);

        let mut other = record(&[("a", true)]);
        other.pipeline = "weekly".into();
        let point = other.resume_point(&cfg);
        assert!(point.is_mismatch());
        assert!(point.to_string().contains("weekly"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let log = RunLog::in_dir(dir.path().join("state"), "nightly load/v2");
        assert!(log.path().ends_with("nightly_load_v2.run.json"));
        assert!(log.load().unwrap().is_none());

        let run = record(&[("a", true)]);
        log.save(&run).unwrap();
        assert_eq!(log.load().unwrap(), Some(run));
    }

    #[test]
    fn test_corrupt_log_is_error() {
        let dir = TempDir::new().unwrap();
        let log = RunLog::new(dir.path().join("bad.run.json"));
        std::fs::write(log.path(), "{not json").unwrap();
        assert_eq!(log.load().unwrap_err().kind(), crate::error::ErrorKind::Data);
    }
}
