use parquet::data_type::{ByteArray, ByteArrayType, Int64Type};
use parquet::file::properties::WriterProperties;
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::file::writer::SerializedFileWriter;
use parquet::schema::parser::parse_message_type;
use serde::de::DeserializeOwned;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::constants::columns::{CLEAN, DOC_ID, RAW, TEXT, TIMESTAMP, URL};
use crate::constants::splits::ALL_SPLITS;
use crate::data::{JoinedRecord, Partitions, Record};
use crate::errors::PipelineError;
use crate::splits::SplitLabel;

/// Schema of shard files; field names must match the serde names of `Record`.
fn record_schema() -> String {
    format!(
        "message record {{
            REQUIRED BINARY {URL} (UTF8);
            REQUIRED BINARY {TEXT} (UTF8);
            REQUIRED BINARY {TIMESTAMP} (UTF8);
        }}"
    )
}

/// Schema of partition files; field names must match `JoinedRecord`.
fn joined_schema() -> String {
    format!(
        "message joined_record {{
            REQUIRED BINARY {URL} (UTF8);
            REQUIRED BINARY {TIMESTAMP} (UTF8);
            REQUIRED BINARY {CLEAN} (UTF8);
            REQUIRED BINARY {RAW} (UTF8);
            REQUIRED INT64 {DOC_ID};
        }}"
    )
}

enum ColumnValues {
    Utf8(Vec<ByteArray>),
    Int64(Vec<i64>),
}

fn utf8_column<T>(rows: &[T], field: impl Fn(&T) -> &str) -> ColumnValues {
    ColumnValues::Utf8(rows.iter().map(|row| ByteArray::from(field(row))).collect())
}

fn columnar_err(path: &Path, reason: impl Into<String>) -> PipelineError {
    PipelineError::Columnar {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// Write one row group holding `columns` (in schema order) to `path`.
fn write_columns(
    path: &Path,
    schema: &str,
    columns: Vec<ColumnValues>,
    row_count: usize,
) -> Result<(), PipelineError> {
    let schema = Arc::new(
        parse_message_type(schema)
            .map_err(|err| columnar_err(path, format!("invalid parquet schema: {err}")))?,
    );
    let props = Arc::new(WriterProperties::builder().build());
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(path)
        .map_err(|err| columnar_err(path, format!("failed creating file: {err}")))?;
    let mut writer = SerializedFileWriter::new(file, schema, props)
        .map_err(|err| columnar_err(path, format!("failed opening parquet writer: {err}")))?;

    if row_count > 0 {
        let mut row_group = writer
            .next_row_group()
            .map_err(|err| columnar_err(path, format!("failed starting row group: {err}")))?;
        for values in columns {
            let Some(mut col_writer) = row_group
                .next_column()
                .map_err(|err| columnar_err(path, format!("failed opening column: {err}")))?
            else {
                return Err(columnar_err(path, "schema has fewer columns than values"));
            };
            let written = match &values {
                ColumnValues::Utf8(values) => col_writer
                    .typed::<ByteArrayType>()
                    .write_batch(values, None, None),
                ColumnValues::Int64(values) => col_writer
                    .typed::<Int64Type>()
                    .write_batch(values, None, None),
            };
            written.map_err(|err| columnar_err(path, format!("failed writing column: {err}")))?;
            col_writer
                .close()
                .map_err(|err| columnar_err(path, format!("failed closing column: {err}")))?;
        }
        row_group
            .close()
            .map_err(|err| columnar_err(path, format!("failed closing row group: {err}")))?;
    }

    writer
        .close()
        .map_err(|err| columnar_err(path, format!("failed finalizing parquet file: {err}")))?;
    Ok(())
}

/// Read every row of a parquet file and decode it through its JSON form.
pub(crate) fn read_rows_as<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, PipelineError> {
    let file =
        File::open(path).map_err(|err| columnar_err(path, format!("failed opening file: {err}")))?;
    let reader = SerializedFileReader::new(file)
        .map_err(|err| columnar_err(path, format!("failed reading parquet metadata: {err}")))?;
    let expected = reader.metadata().file_metadata().num_rows().max(0) as usize;
    let iter = reader
        .get_row_iter(None)
        .map_err(|err| columnar_err(path, format!("failed iterating rows: {err}")))?;

    let mut rows = Vec::with_capacity(expected);
    for (position, row) in iter.enumerate() {
        let row =
            row.map_err(|err| columnar_err(path, format!("failed reading row {position}: {err}")))?;
        let value = row.to_json_value();
        let decoded = serde_json::from_value(value)
            .map_err(|err| columnar_err(path, format!("failed decoding row {position}: {err}")))?;
        rows.push(decoded);
    }
    Ok(rows)
}

/// Write corpus records (`url, text, timestamp`) to `path`.
pub fn write_records(path: &Path, records: &[Record]) -> Result<(), PipelineError> {
    let columns = vec![
        utf8_column(records, |r| r.url.as_str()),
        utf8_column(records, |r| r.text.as_str()),
        utf8_column(records, |r| r.timestamp.as_str()),
    ];
    write_columns(path, &record_schema(), columns, records.len())
}

/// Read corpus records written by [`write_records`].
pub fn read_records(path: &Path) -> Result<Vec<Record>, PipelineError> {
    read_rows_as(path)
}

/// Write joined records (`url, timestamp, clean, raw, doc_id`) to `path`.
pub fn write_joined(path: &Path, rows: &[JoinedRecord]) -> Result<(), PipelineError> {
    let columns = vec![
        utf8_column(rows, |r| r.url.as_str()),
        utf8_column(rows, |r| r.timestamp.as_str()),
        utf8_column(rows, |r| r.clean.as_str()),
        utf8_column(rows, |r| r.raw.as_str()),
        ColumnValues::Int64(rows.iter().map(|r| r.doc_id as i64).collect()),
    ];
    write_columns(path, &joined_schema(), columns, rows.len())
}

/// Read joined records written by [`write_joined`].
pub fn read_joined(path: &Path) -> Result<Vec<JoinedRecord>, PipelineError> {
    read_rows_as(path)
}

/// Write `train.parquet`, `validate.parquet` and `test.parquet` into `dir`.
pub fn write_partitions(dir: &Path, partitions: &Partitions) -> Result<Vec<PathBuf>, PipelineError> {
    fs::create_dir_all(dir)?;
    let mut written = Vec::with_capacity(ALL_SPLITS.len());
    for label in ALL_SPLITS {
        let rows = match label {
            SplitLabel::Train => &partitions.train,
            SplitLabel::Validation => &partitions.validate,
            SplitLabel::Test => &partitions.test,
        };
        let path = dir.join(label.file_name());
        write_joined(&path, rows)?;
        info!(
            "[corpus_pairs:columnar] wrote {} rows -> {}",
            rows.len(),
            path.display()
        );
        written.push(path);
    }
    Ok(written)
}
