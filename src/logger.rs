//! Injectable logging handle
//!
//! Components never log through a global; they receive a [`Logger`] when
//! they are constructed. The default [`FacadeSink`] forwards to the `log`
//! crate so the binary's `env_logger` setup applies, while tests swap in a
//! [`CaptureSink`] to assert on diagnostics.

use chrono::Local;
use log::Level;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Destination for log records
pub trait LogSink: Send + Sync {
    fn log(&self, level: Level, target: &str, message: &str);
}

/// Forwards records to the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct FacadeSink;

impl LogSink for FacadeSink {
    fn log(&self, level: Level, target: &str, message: &str) {
        log::log!(target: target, level, "{}", message);
    }
}

/// Appends every record to a log file, regardless of the console level
pub struct FileSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileSink {
    /// Create `dataflow_<timestamp>.log` inside `log_dir`
    pub fn create(log_dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let log_dir = log_dir.as_ref();
        std::fs::create_dir_all(log_dir)?;
        let filename = format!("dataflow_{}.log", Local::now().format("%Y%m%d_%H%M%S"));
        let path = log_dir.join(filename);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogSink for FileSink {
    fn log(&self, level: Level, target: &str, message: &str) {
        if let Ok(mut file) = self.file.lock() {
            // A failing log file must not take the run down with it
            let _ = writeln!(
                file,
                "{} | {:<5} | {} | {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                level,
                target,
                message
            );
        }
    }
}

/// Fans a record out to several sinks
pub struct TeeSink {
    sinks: Vec<Arc<dyn LogSink>>,
}

impl TeeSink {
    pub fn new(sinks: Vec<Arc<dyn LogSink>>) -> Self {
        Self { sinks }
    }
}

impl LogSink for TeeSink {
    fn log(&self, level: Level, target: &str, message: &str) {
        for sink in &self.sinks {
            sink.log(level, target, message);
        }
    }
}

/// A single captured record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedRecord {
    pub level: Level,
    pub target: String,
    pub message: String,
}

/// In-memory sink for tests
#[derive(Debug, Default)]
pub struct CaptureSink {
    records: Mutex<Vec<CapturedRecord>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything logged so far
    pub fn records(&self) -> Vec<CapturedRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    /// Whether any record at `level` contains `needle`
    pub fn contains(&self, level: Level, needle: &str) -> bool {
        self.records()
            .iter()
            .any(|r| r.level == level && r.message.contains(needle))
    }

    /// Count of records at `level`
    pub fn count(&self, level: Level) -> usize {
        self.records().iter().filter(|r| r.level == level).count()
    }
}

impl LogSink for CaptureSink {
    fn log(&self, level: Level, target: &str, message: &str) {
        if let Ok(mut records) = self.records.lock() {
            records.push(CapturedRecord {
                level,
                target: target.to_string(),
                message: message.to_string(),
            });
        }
    }
}

/// Cloneable logging handle passed into every component
#[derive(Clone)]
pub struct Logger {
    sink: Arc<dyn LogSink>,
    target: String,
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::facade()
    }
}

impl Logger {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self {
            sink,
            target: "dataflow".to_string(),
        }
    }

    /// Logger backed by the `log` facade
    pub fn facade() -> Self {
        Self::new(Arc::new(FacadeSink))
    }

    /// Same sink, different target (e.g. `dataflow::engine`)
    pub fn scoped(&self, target: &str) -> Self {
        Self {
            sink: self.sink.clone(),
            target: target.to_string(),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn log(&self, level: Level, message: impl std::fmt::Display) {
        self.sink.log(level, &self.target, &message.to_string());
    }

    pub fn debug(&self, message: impl std::fmt::Display) {
        self.log(Level::Debug, message);
    }

    pub fn info(&self, message: impl std::fmt::Display) {
        self.log(Level::Info, message);
    }

    pub fn warn(&self, message: impl std::fmt::Display) {
        self.log(Level::Warn, message);
    }

    pub fn error(&self, message: impl std::fmt::Display) {
        self.log(Level::Error, message);
    }

    /// Structured event rendered as `message | key=value | ...`
    pub fn event(&self, level: Level, message: &str, fields: &[(&str, String)]) {
        let mut line = message.to_string();
        for (key, value) in fields {
            line.push_str(&format!(" | {}={}", key, value));
        }
        self.log(level, line);
    }
}
