//! The shape of our destination table, and normalized batches of rows.

use std::{collections::HashSet, fmt};

use chrono::NaiveDateTime;
use csv::StringRecord;

use crate::errors::ParseError;
use crate::from_csv_cell::FromCsvCell;
use crate::postgres::PgName;
use crate::reader::RawBatch;

/// Column holding the trip pickup time.
pub const PICKUP_DATETIME_COLUMN: &str = "tpep_pickup_datetime";

/// Column holding the trip dropoff time.
pub const DROPOFF_DATETIME_COLUMN: &str = "tpep_dropoff_datetime";

/// The columns we convert from text to timestamps.
pub const TIMESTAMP_COLUMNS: &[&str] = &[PICKUP_DATETIME_COLUMN, DROPOFF_DATETIME_COLUMN];

/// The type of a destination column.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ColumnType {
    /// A 64-bit row number.
    BigInt,
    /// Uninterpreted text.
    Text,
    /// A date and time without a time zone.
    Timestamp,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::BigInt => write!(f, "BIGINT"),
            ColumnType::Text => write!(f, "TEXT"),
            ColumnType::Timestamp => write!(f, "TIMESTAMP"),
        }
    }
}

/// A destination column.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
}

/// Where a column's values come from.
#[derive(Clone, Copy, Debug)]
enum ColumnSource {
    /// Zero-based row number within the whole file.
    RowIndex,
    /// The CSV field at this position, as text.
    Text(usize),
    /// The CSV field at this position, parsed as a timestamp.
    Timestamp(usize),
}

/// The destination table, derived once from the CSV header and fixed for the
/// rest of the run.
#[derive(Clone, Debug)]
pub struct TableSchema {
    /// The table to write.
    pub name: PgName,
    columns: Vec<Column>,
    sources: Vec<ColumnSource>,
}

impl TableSchema {
    /// Derive a table from the CSV header. The two trip timestamp columns
    /// become [`ColumnType::Timestamp`], and everything else is
    /// [`ColumnType::Text`]. If `index_column` is given, a leading row-number
    /// column of that name is added. Every column name must be unique.
    pub fn from_headers(
        name: PgName,
        headers: &StringRecord,
        index_column: Option<&str>,
    ) -> Result<Self, ParseError> {
        for &required in TIMESTAMP_COLUMNS {
            if !headers.iter().any(|h| h == required) {
                return Err(ParseError::MissingColumn {
                    column: required.to_owned(),
                });
            }
        }

        let mut seen = HashSet::new();
        for name in index_column.into_iter().chain(headers.iter()) {
            if !seen.insert(name) {
                return Err(ParseError::DuplicateColumn {
                    column: name.to_owned(),
                });
            }
        }

        let mut columns = vec![];
        let mut sources = vec![];
        if let Some(index_column) = index_column {
            columns.push(Column {
                name: index_column.to_owned(),
                column_type: ColumnType::BigInt,
            });
            sources.push(ColumnSource::RowIndex);
        }
        for (idx, header) in headers.iter().enumerate() {
            let (column_type, source) = if TIMESTAMP_COLUMNS.contains(&header) {
                (ColumnType::Timestamp, ColumnSource::Timestamp(idx))
            } else {
                (ColumnType::Text, ColumnSource::Text(idx))
            };
            columns.push(Column {
                name: header.to_owned(),
                column_type,
            });
            sources.push(source);
        }
        Ok(Self {
            name,
            columns,
            sources,
        })
    }

    /// Our columns, in table order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Convert a batch of raw CSV records into typed rows for this table.
    pub fn normalize(&self, batch: &RawBatch) -> Result<NormalizedBatch, ParseError> {
        let mut rows = Vec::with_capacity(batch.len());
        for (offset, record) in batch.records().iter().enumerate() {
            let row_index = batch.first_row() + offset as u64;
            let mut row = Vec::with_capacity(self.columns.len());
            for (column, source) in self.columns.iter().zip(&self.sources) {
                let value = match *source {
                    ColumnSource::RowIndex => Value::BigInt(row_index as i64),
                    ColumnSource::Text(idx) => match record.get(idx) {
                        None | Some("") => Value::Null,
                        Some(cell) => Value::Text(cell.to_owned()),
                    },
                    ColumnSource::Timestamp(idx) => match record.get(idx) {
                        None | Some("") => Value::Null,
                        Some(cell) => NaiveDateTime::from_csv_cell(cell)
                            .map(Value::Timestamp)
                            .map_err(|_| ParseError::InvalidTimestamp {
                                column: column.name.clone(),
                                row: row_index + 1,
                                value: cell.to_owned(),
                            })?,
                    },
                };
                row.push(value);
            }
            rows.push(row);
        }
        Ok(NormalizedBatch {
            first_row: batch.first_row(),
            rows,
        })
    }
}

/// A single typed value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    BigInt(i64),
    Text(String),
    Timestamp(NaiveDateTime),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::BigInt(i) => i.fmt(f),
            Value::Text(s) => s.fmt(f),
            Value::Timestamp(ts) => ts.format("%Y-%m-%d %H:%M:%S%.f").fmt(f),
        }
    }
}

/// A batch of typed rows, ready to append to a [`TableSchema`].
#[derive(Clone, Debug)]
pub struct NormalizedBatch {
    first_row: u64,
    rows: Vec<Vec<Value>>,
}

impl NormalizedBatch {
    /// Zero-based index of the first row of this batch within the file.
    pub fn first_row(&self) -> u64 {
        self.first_row
    }

    /// Our rows, in file order.
    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// The number of rows in this batch.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Is this batch empty?
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Serialize this batch as headerless CSV, with `NULL` as an unquoted
    /// empty field. This is the format PostgreSQL's `COPY ... (FORMAT csv)`
    /// expects.
    pub fn to_csv(&self) -> Result<Vec<u8>, csv::Error> {
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(vec![]);
        for row in &self.rows {
            for value in row {
                wtr.write_field(value.to_string())?;
            }
            wtr.write_record(None::<&[u8]>)?;
        }
        wtr.into_inner().map_err(|err| err.into_error().into())
    }
}
