//! JSON record files
//!
//! Two layouts are supported:
//! - `json`: a single pretty-printed array of objects
//! - `ndjson`: one object per line

use crate::dataset::Dataset;
use crate::error::{FlowError, Result};
use serde_json::{Map, Value};
use std::io::Write;
use std::path::Path;

/// Read a JSON array of objects
pub fn read_records(path: &Path) -> Result<Dataset> {
    let content = std::fs::read_to_string(path).map_err(|e| FlowError::io(path, e))?;
    if content.trim().is_empty() {
        return Ok(Dataset::new());
    }

    let value: Value = serde_json::from_str(&content)?;
    let Value::Array(items) = value else {
        return Err(FlowError::Data(format!(
            "{}: expected a JSON array of records",
            path.display()
        )));
    };

    let records = items
        .into_iter()
        .enumerate()
        .map(|(index, item)| into_record(item, path, index + 1))
        .collect::<Result<Vec<_>>>()?;
    Ok(Dataset::from_records(records))
}

/// Write a pretty-printed JSON array of objects
pub fn write_records(path: &Path, data: &Dataset) -> Result<()> {
    let records: Vec<Value> = data.to_records().into_iter().map(Value::Object).collect();
    let content = serde_json::to_string_pretty(&records)?;
    std::fs::write(path, content).map_err(|e| FlowError::io(path, e))
}

/// Read newline delimited JSON objects; blank lines are skipped
pub fn read_lines(path: &Path) -> Result<Dataset> {
    let content = std::fs::read_to_string(path).map_err(|e| FlowError::io(path, e))?;

    let records = content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            let value: Value = serde_json::from_str(line).map_err(|e| {
                FlowError::Data(format!("{} line {}: {}", path.display(), index + 1, e))
            })?;
            into_record(value, path, index + 1)
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Dataset::from_records(records))
}

/// Write one JSON object per line with a trailing newline
pub fn write_lines(path: &Path, data: &Dataset) -> Result<()> {
    let file = std::fs::File::create(path).map_err(|e| FlowError::io(path, e))?;
    let mut out = std::io::BufWriter::new(file);
    for record in data.to_records() {
        serde_json::to_writer(&mut out, &record)?;
        writeln!(out).map_err(|e| FlowError::io(path, e))?;
    }
    out.flush().map_err(|e| FlowError::io(path, e))
}

fn into_record(value: Value, path: &Path, position: usize) -> Result<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(FlowError::Data(format!(
            "{} record {}: expected an object, found {}",
            path.display(),
            position,
            type_name(&other)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
