//! Parquet via arrow, zstd compressed
//!
//! Column types are inferred from the cells: all integers → Int64, any
//! other numbers → Float64, booleans → Boolean, everything else Utf8.
//! Integers above `i64::MAX` make the column Utf8.

use super::exceeds_i64;
use crate::dataset::{Column, Dataset};
use crate::error::{FlowError, Result};
use arrow::array::{
    Array, ArrayRef, BooleanArray, Float64Array, Int64Array, RecordBatch, RecordBatchOptions,
    StringArray,
};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Schema};
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;
use serde_json::{Number, Value};
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

pub fn read(path: &Path) -> Result<Dataset> {
    let file = File::open(path).map_err(|e| FlowError::io(path, e))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let schema = builder.schema().clone();
    let reader = builder.build()?;

    let mut columns: Vec<Column> = schema
        .fields()
        .iter()
        .map(|field| Column::new(field.name().clone(), Vec::new()))
        .collect();

    for batch in reader {
        let batch = batch?;
        for (column, array) in columns.iter_mut().zip(batch.columns()) {
            column.values.extend(column_values(array)?);
        }
    }

    Dataset::from_columns(columns)
}

pub fn write(path: &Path, data: &Dataset) -> Result<()> {
    let mut fields = Vec::with_capacity(data.column_count());
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(data.column_count());
    for column in data.columns() {
        let data_type = infer_type(&column.values);
        arrays.push(build_array(&data_type, &column.values));
        fields.push(Field::new(column.name.clone(), data_type, true));
    }

    let schema = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new_with_options(
        schema.clone(),
        arrays,
        &RecordBatchOptions::new().with_row_count(Some(data.row_count())),
    )?;

    let file = File::create(path).map_err(|e| FlowError::io(path, e))?;
    let props = WriterProperties::builder()
        .set_compression(Compression::ZSTD(ZstdLevel::default()))
        .build();
    let mut writer = ArrowWriter::try_new(file, schema, Some(props))?;
    if batch.num_rows() > 0 {
        writer.write(&batch)?;
    }
    writer.close()?;
    Ok(())
}

fn infer_type(values: &[Value]) -> DataType {
    let present: Vec<&Value> = values.iter().filter(|v| !v.is_null()).collect();
    if present.is_empty() || present.iter().any(|v| exceeds_i64(v)) {
        DataType::Utf8
    } else if present.iter().all(|v| v.is_i64()) {
        DataType::Int64
    } else if present.iter().all(|v| v.is_number()) {
        DataType::Float64
    } else if present.iter().all(|v| v.is_boolean()) {
        DataType::Boolean
    } else {
        DataType::Utf8
    }
}

fn build_array(data_type: &DataType, values: &[Value]) -> ArrayRef {
    match data_type {
        DataType::Int64 => Arc::new(Int64Array::from(
            values.iter().map(Value::as_i64).collect::<Vec<_>>(),
        )),
        DataType::Float64 => Arc::new(Float64Array::from(
            values.iter().map(Value::as_f64).collect::<Vec<_>>(),
        )),
        DataType::Boolean => Arc::new(BooleanArray::from(
            values.iter().map(Value::as_bool).collect::<Vec<_>>(),
        )),
        _ => Arc::new(StringArray::from(
            values
                .iter()
                .map(|v| match v {
                    Value::Null => None,
                    Value::String(s) => Some(s.clone()),
                    other => Some(other.to_string()),
                })
                .collect::<Vec<_>>(),
        )),
    }
}

fn column_values(array: &ArrayRef) -> Result<Vec<Value>> {
    let data_type = array.data_type();
    if data_type.is_integer() {
        let ints = cast(array.as_ref(), &DataType::Int64)?;
        let ints = downcast::<Int64Array>(&ints)?;
        return Ok(ints.iter().map(|v| v.map_or(Value::Null, Value::from)).collect());
    }

    match data_type {
        DataType::Float16 | DataType::Float32 | DataType::Float64 => {
            let floats = cast(array.as_ref(), &DataType::Float64)?;
            let floats = downcast::<Float64Array>(&floats)?;
            Ok(floats
                .iter()
                .map(|v| v.and_then(Number::from_f64).map_or(Value::Null, Value::Number))
                .collect())
        }
        DataType::Boolean => {
            let bools = downcast::<BooleanArray>(array)?;
            Ok(bools.iter().map(|v| v.map_or(Value::Null, Value::Bool)).collect())
        }
        _ => {
            let text = cast(array.as_ref(), &DataType::Utf8)?;
            let text = downcast::<StringArray>(&text)?;
            Ok(text
                .iter()
                .map(|v| v.map_or(Value::Null, |s| Value::String(s.to_string())))
                .collect())
        }
    }
}

fn downcast<T: 'static>(array: &ArrayRef) -> Result<&T> {
    array.as_any().downcast_ref::<T>().ok_or_else(|| {
        FlowError::Data(format!(
            "Unexpected parquet column type {}",
            array.data_type()
        ))
    })
}
