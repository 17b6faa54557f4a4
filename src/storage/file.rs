//! Path-based file store
//!
//! Each entity maps to one file derived from a path template. The template
//! may contain `${entity}$` or `{entity}`; a resolved path without an
//! extension is treated as a directory and gets `<entity>.<ext>` appended.

use super::{Store, WriteOptions, combine, format};
use crate::config::{DataFormat, StoreConfig, StoreKind, WriteMode};
use crate::dataset::Dataset;
use crate::error::{FlowError, Result};
use crate::logger::Logger;
use regex::Regex;
use std::path::{Path, PathBuf};

const DEFAULT_PATH: &str = "./data";
const DOLLAR_TOKEN: &str = "${entity}$";
const BRACE_TOKEN: &str = "{entity}";
const ENTITY_MARKER: &str = "\u{1}entity\u{1}";

/// Reads and writes one file per entity
#[derive(Debug, Clone)]
pub struct FileStore {
    template: String,
    format: DataFormat,
    logger: Logger,
}

impl FileStore {
    pub fn new(template: impl Into<String>, format: DataFormat, logger: Logger) -> Self {
        Self {
            template: template.into(),
            format,
            logger,
        }
    }

    /// Build from configuration; an unknown format fails here, before any I/O
    pub fn from_config(config: &StoreConfig, logger: Logger) -> Result<Self> {
        let format = config.format()?;
        let template = config
            .store
            .path
            .clone()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PATH.to_string());
        Ok(Self::new(template, format, logger))
    }

    pub fn format(&self) -> DataFormat {
        self.format
    }

    /// Concrete file for `entity`
    pub fn entity_path(&self, entity: &str) -> PathBuf {
        self.expand(entity, entity)
    }

    fn expand(&self, replacement: &str, stem: &str) -> PathBuf {
        // The dollar form contains the brace form, so it must go first
        let resolved = if self.template.contains(DOLLAR_TOKEN) {
            self.template.replace(DOLLAR_TOKEN, replacement)
        } else {
            self.template.replace(BRACE_TOKEN, replacement)
        };

        let path = PathBuf::from(resolved);
        if path.extension().is_some() {
            path
        } else {
            path.join(format!("{}.{}", stem, self.format.extension()))
        }
    }

    /// Regex over resolved paths with one capture group per entity slot,
    /// or `None` when the template never mentions the entity
    fn entity_matcher(&self) -> Result<Option<Regex>> {
        let sample = self.expand(ENTITY_MARKER, ENTITY_MARKER);
        let sample = sample.to_string_lossy();
        let pieces: Vec<String> = strip_current_dir(&sample)
            .split(ENTITY_MARKER)
            .map(regex::escape)
            .collect();
        if pieces.len() < 2 {
            return Ok(None);
        }

        let source = format!("^{}$", pieces.join(r"([^/\\]+)"));
        Regex::new(&source).map(Some).map_err(|e| {
            FlowError::Config(format!("Invalid path template '{}': {}", self.template, e))
        })
    }

    fn read_file(&self, path: &Path) -> Result<Option<Dataset>> {
        if !path.is_file() {
            return Ok(None);
        }
        let data = format::read(path, self.format)?;
        Ok(Some(data))
    }

    fn write_file(&self, path: &Path, data: &Dataset) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| FlowError::io(parent, e))?;
        }

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        if let Err(e) = format::write(&tmp, self.format, data) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e);
        }
        std::fs::rename(&tmp, path).map_err(|e| FlowError::io(path, e))
    }

    fn write_inner(&self, entity: &str, data: &Dataset, options: &WriteOptions) -> Result<usize> {
        options.check(StoreKind::File)?;
        let path = self.entity_path(entity);

        let existing = match options.mode {
            WriteMode::Overwrite => None,
            _ => self.read_file(&path)?,
        };
        let combined = combine(existing, data, options)?;

        self.write_file(&path, &combined.dataset)?;
        self.logger.info(format!(
            "Wrote {} rows to {} (mode: {}, {} rows in file)",
            combined.rows_written,
            path.display(),
            options.mode,
            combined.dataset.row_count()
        ));
        Ok(combined.rows_written)
    }
}

/// Entity captured from a listed path; every slot must agree
fn entity_from_path(matcher: &Regex, path: &Path) -> Option<String> {
    let text = path.to_string_lossy();
    let captures = matcher.captures(strip_current_dir(&text))?;
    let mut slots = captures.iter().skip(1).flatten().map(|m| m.as_str());
    let entity = slots.next()?;
    slots
        .all(|other| other == entity)
        .then(|| entity.to_string())
}

fn strip_current_dir(path: &str) -> &str {
    path.strip_prefix("./")
        .or_else(|| path.strip_prefix(".\\"))
        .unwrap_or(path)
}

impl Store for FileStore {
    fn kind(&self) -> StoreKind {
        StoreKind::File
    }

    fn read_entity(&self, entity: &str) -> Result<Option<Dataset>> {
        let path = self.entity_path(entity);
        self.logger
            .debug(format!("Reading entity '{}' from {}", entity, path.display()));

        match self.read_file(&path) {
            Ok(None) => {
                self.logger.debug(format!("File not found: {}", path.display()));
                Ok(None)
            }
            Ok(Some(data)) if data.is_empty() => {
                self.logger.debug(format!("File has no rows: {}", path.display()));
                Ok(None)
            }
            Ok(Some(data)) => {
                self.logger.info(format!(
                    "Read {} rows from {}",
                    data.row_count(),
                    path.display()
                ));
                Ok(Some(data))
            }
            Err(e) => {
                self.logger
                    .error(format!("Failed to read {}: {}", path.display(), e));
                Err(e)
            }
        }
    }

    fn write_entity(&self, entity: &str, data: &Dataset, options: &WriteOptions) -> Result<usize> {
        self.write_inner(entity, data, options).inspect_err(|e| {
            self.logger
                .error(format!("Failed to write entity '{}': {}", entity, e));
        })
    }

    fn list_entities(&self) -> Result<Vec<String>> {
        let pattern = self.expand("*", "*");
        let pattern = pattern.to_string_lossy();
        let paths = glob::glob(&pattern)
            .map_err(|e| FlowError::Config(format!("Invalid path pattern '{}': {}", pattern, e)))?;
        let matcher = self.entity_matcher()?;

        let mut entities: Vec<String> = paths
            .filter_map(|entry| entry.ok())
            .filter(|path| path.is_file())
            .filter_map(|path| match &matcher {
                Some(matcher) => entity_from_path(matcher, &path),
                None => path
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned()),
            })
            .collect();
        entities.sort();
        entities.dedup();
        Ok(entities)
    }

    fn entity_exists(&self, entity: &str) -> bool {
        self.entity_path(entity).is_file()
    }

    fn connection_descriptor(&self) -> String {
        format!("file:{} ({})", self.template, self.format)
    }
}
