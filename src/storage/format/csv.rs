//! CSV with a header row
//!
//! Cells are typed on read: empty → null, then integer, float, boolean,
//! falling back to text.

use crate::dataset::Dataset;
use crate::error::{FlowError, Result};
use serde_json::{Number, Value};
use std::path::Path;

pub fn read(path: &Path) -> Result<Dataset> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| open_error(path, e))?;

    let names: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(infer_cell).collect());
    }

    Dataset::from_rows(names, rows)
}

pub fn write(path: &Path, data: &Dataset) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| open_error(path, e))?;
    if data.column_count() > 0 {
        writer.write_record(data.column_names())?;
        for row in data.rows() {
            writer.write_record(row.into_iter().map(cell_text))?;
        }
    }
    writer.flush().map_err(|e| FlowError::io(path, e))?;
    Ok(())
}

fn open_error(path: &Path, e: csv::Error) -> FlowError {
    match e.into_kind() {
        csv::ErrorKind::Io(io) => FlowError::io(path, io),
        other => FlowError::Data(format!("CSV {}: {:?}", path.display(), other)),
    }
}

/// Type a raw CSV field
pub(crate) fn infer_cell(text: &str) -> Value {
    if text.is_empty() {
        return Value::Null;
    }
    if let Ok(i) = text.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(f) = text.parse::<f64>()
        && let Some(n) = Number::from_f64(f)
    {
        return Value::Number(n);
    }
    match text.to_ascii_lowercase().as_str() {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(text.to_string()),
    }
}

/// Render a cell as a CSV field; nested values are written as JSON text
pub(crate) fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}
