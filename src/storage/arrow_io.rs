//! Arrow conversion plus Parquet and CSV files for [`Table`].

use std::fs::File;
use std::io::Seek;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, BooleanArray, BooleanBuilder, Date32Array, Date32Builder, Float64Array,
    Float64Builder, Int64Array, Int64Builder, StringArray, StringBuilder,
};
use arrow::compute::{cast, concat_batches};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use chrono::{Datelike, NaiveDate};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use crate::error::StorageError;

use super::table::{Column, ColumnData, Table};

/// Days between 0001-01-01 and 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Rows sampled when inferring a CSV schema.
const CSV_INFER_RECORDS: usize = 1000;

fn date_to_days(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}

fn days_to_date(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days.checked_add(UNIX_EPOCH_DAYS_FROM_CE)?)
}

/// Arrow schema of a table; every field is nullable.
pub fn table_schema(table: &Table) -> Schema {
    Schema::new(
        table
            .columns()
            .iter()
            .map(|c| Field::new(&c.name, arrow_type(&c.data), true))
            .collect::<Vec<_>>(),
    )
}

fn arrow_type(data: &ColumnData) -> DataType {
    match data {
        ColumnData::Float(_) => DataType::Float64,
        ColumnData::Int(_) => DataType::Int64,
        ColumnData::Text(_) => DataType::Utf8,
        ColumnData::Bool(_) => DataType::Boolean,
        ColumnData::Date(_) => DataType::Date32,
    }
}

fn column_to_array(data: &ColumnData) -> ArrayRef {
    match data {
        ColumnData::Float(values) => {
            let mut builder = Float64Builder::with_capacity(values.len());
            for v in values {
                builder.append_option(*v);
            }
            Arc::new(builder.finish())
        }
        ColumnData::Int(values) => {
            let mut builder = Int64Builder::with_capacity(values.len());
            for v in values {
                builder.append_option(*v);
            }
            Arc::new(builder.finish())
        }
        ColumnData::Text(values) => {
            let mut builder = StringBuilder::new();
            for v in values {
                builder.append_option(v.as_deref());
            }
            Arc::new(builder.finish())
        }
        ColumnData::Bool(values) => {
            let mut builder = BooleanBuilder::with_capacity(values.len());
            for v in values {
                builder.append_option(*v);
            }
            Arc::new(builder.finish())
        }
        ColumnData::Date(values) => {
            let mut builder = Date32Builder::with_capacity(values.len());
            for v in values {
                builder.append_option(v.map(date_to_days));
            }
            Arc::new(builder.finish())
        }
    }
}

/// Converts a table into a single Arrow record batch.
pub fn table_to_record_batch(table: &Table) -> Result<RecordBatch, StorageError> {
    let schema = Arc::new(table_schema(table));
    let columns: Vec<ArrayRef> = table
        .columns()
        .iter()
        .map(|c| column_to_array(&c.data))
        .collect();
    let options = RecordBatchOptions::new().with_row_count(Some(table.n_rows()));
    Ok(RecordBatch::try_new_with_options(schema, columns, &options)?)
}

fn downcast<'a, T: 'static>(
    name: &str,
    array: &'a ArrayRef,
) -> Result<&'a T, StorageError> {
    array
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| StorageError::UnsupportedColumnType {
            column: name.to_string(),
            data_type: array.data_type().to_string(),
        })
}

fn column_from_array(name: &str, array: &ArrayRef) -> Result<ColumnData, StorageError> {
    let len = array.len();
    let data = match array.data_type() {
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => {
            let casted = cast(array, &DataType::Int64)?;
            let arr = downcast::<Int64Array>(name, &casted)?;
            ColumnData::Int(
                (0..len)
                    .map(|i| if arr.is_null(i) { None } else { Some(arr.value(i)) })
                    .collect(),
            )
        }
        DataType::Float16 | DataType::Float32 | DataType::Float64 => {
            let casted = cast(array, &DataType::Float64)?;
            let arr = downcast::<Float64Array>(name, &casted)?;
            ColumnData::Float(
                (0..len)
                    .map(|i| if arr.is_null(i) { None } else { Some(arr.value(i)) })
                    .collect(),
            )
        }
        DataType::Utf8 | DataType::LargeUtf8 => {
            let casted = cast(array, &DataType::Utf8)?;
            let arr = downcast::<StringArray>(name, &casted)?;
            ColumnData::Text(
                (0..len)
                    .map(|i| {
                        if arr.is_null(i) {
                            None
                        } else {
                            Some(arr.value(i).to_string())
                        }
                    })
                    .collect(),
            )
        }
        DataType::Boolean => {
            let arr = downcast::<BooleanArray>(name, array)?;
            ColumnData::Bool(
                (0..len)
                    .map(|i| if arr.is_null(i) { None } else { Some(arr.value(i)) })
                    .collect(),
            )
        }
        DataType::Date32 | DataType::Date64 | DataType::Timestamp(_, _) => {
            let casted = cast(array, &DataType::Date32)?;
            let arr = downcast::<Date32Array>(name, &casted)?;
            ColumnData::Date(
                (0..len)
                    .map(|i| if arr.is_null(i) { None } else { days_to_date(arr.value(i)) })
                    .collect(),
            )
        }
        DataType::Null => ColumnData::Text(vec![None; len]),
        other => {
            return Err(StorageError::UnsupportedColumnType {
                column: name.to_string(),
                data_type: other.to_string(),
            })
        }
    };
    Ok(data)
}

/// Converts a record batch into a table.
pub fn record_batch_to_table(batch: &RecordBatch) -> Result<Table, StorageError> {
    let schema = batch.schema();
    let columns = schema
        .fields()
        .iter()
        .zip(batch.columns())
        .map(|(field, array)| {
            column_from_array(field.name(), array).map(|data| Column::new(field.name(), data))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Table::from_columns(columns)?)
}

fn batches_to_table(schema: &SchemaRef, batches: &[RecordBatch]) -> Result<Table, StorageError> {
    let batch = concat_batches(schema, batches)?;
    record_batch_to_table(&batch)
}

fn create_file(path: &Path) -> Result<File, StorageError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
    }
    File::create(path).map_err(|e| StorageError::io(path, e))
}

/// Writes a table to a ZSTD-compressed Parquet file.
pub fn write_parquet(table: &Table, path: &Path) -> Result<(), StorageError> {
    let batch = table_to_record_batch(table)?;
    let file = create_file(path)?;
    let props = WriterProperties::builder()
        .set_compression(Compression::ZSTD(Default::default()))
        .build();

    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
    writer.write(&batch)?;
    writer.close()?;

    tracing::debug!(path = %path.display(), rows = table.n_rows(), "Parquet file written");
    Ok(())
}

/// Reads a Parquet file into a table.
pub fn read_parquet(path: &Path) -> Result<Table, StorageError> {
    let file = File::open(path).map_err(|e| StorageError::io(path, e))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let schema = builder.schema().clone();
    let reader = builder.build()?;

    let batches = reader.collect::<Result<Vec<_>, _>>()?;
    let table = batches_to_table(&schema, &batches)?;

    tracing::debug!(path = %path.display(), rows = table.n_rows(), "Parquet file loaded");
    Ok(table)
}

/// Writes a table to a CSV file with a header row.
pub fn write_csv(table: &Table, path: &Path) -> Result<(), StorageError> {
    let batch = table_to_record_batch(table)?;
    let file = create_file(path)?;
    let mut writer = arrow::csv::WriterBuilder::new().with_header(true).build(file);
    writer.write(&batch)?;
    Ok(())
}

/// Reads a CSV file with a header row, inferring column types.
pub fn read_csv(path: &Path) -> Result<Table, StorageError> {
    let mut file = File::open(path).map_err(|e| StorageError::io(path, e))?;
    let (schema, _) = arrow::csv::reader::Format::default()
        .with_header(true)
        .infer_schema(&mut file, Some(CSV_INFER_RECORDS))?;
    file.rewind().map_err(|e| StorageError::io(path, e))?;

    let schema = Arc::new(schema);
    let reader = arrow::csv::ReaderBuilder::new(schema.clone())
        .with_header(true)
        .build(file)?;
    let batches = reader.collect::<Result<Vec<_>, _>>()?;
    batches_to_table(&schema, &batches)
}
