//! On-disk encodings for file stores

mod csv;
mod json;
mod parquet;

use crate::config::DataFormat;
use crate::dataset::Dataset;
use crate::error::Result;
use serde_json::Value;
use std::path::Path;

/// Decode a whole file into a dataset
pub fn read(path: &Path, format: DataFormat) -> Result<Dataset> {
    match format {
        DataFormat::Csv => self::csv::read(path),
        DataFormat::Parquet => self::parquet::read(path),
        DataFormat::Json => self::json::read_records(path),
        DataFormat::Ndjson => self::json::read_lines(path),
    }
}

/// Encode a dataset into `path`, replacing any previous content
pub fn write(path: &Path, format: DataFormat, data: &Dataset) -> Result<()> {
    match format {
        DataFormat::Csv => self::csv::write(path, data),
        DataFormat::Parquet => self::parquet::write(path, data),
        DataFormat::Json => self::json::write_records(path, data),
        DataFormat::Ndjson => self::json::write_lines(path, data),
    }
}

/// An unsigned integer no 64-bit signed column can hold
///
/// Stores keep such columns as text so the digits survive unchanged.
pub(crate) fn exceeds_i64(value: &Value) -> bool {
    value.is_u64() && !value.is_i64()
}
