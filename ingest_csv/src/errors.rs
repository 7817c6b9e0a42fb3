//! Errors returned at the boundaries between our components.
//!
//! Each stage of a run has its own error type, so that callers (and tests) can
//! tell a failed download from a failed connection from a bad row. The CLI
//! converts all of these into [`anyhow::Error`] before reporting them.

use std::{error, io, path::PathBuf};

use thiserror::Error;

/// A boxed error from a lower layer, such as a [`crate::loader::TableSink`].
pub type BoxError = Box<dyn error::Error + Send + Sync + 'static>;

/// We could not download the source file.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DownloadError {
    /// We were asked to write the body zero bytes at a time.
    #[error("download chunk size must be greater than 0")]
    InvalidChunkSize,
    /// The HTTP request could not be completed.
    #[error("could not request {url}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    /// The server answered with a 4xx or 5xx status.
    #[error("HTTP status {status} downloading {url}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    /// The connection failed while we were reading the response body.
    #[error("error reading response body from {url}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    /// We could not write the downloaded data to disk.
    #[error("could not write {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// We could not open a connection to PostgreSQL.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConnectionError {
    /// We could not build a TLS configuration.
    #[error("could not configure TLS for PostgreSQL")]
    Tls(#[source] BoxError),
    /// The server refused us, or could not be reached.
    #[error("could not connect to PostgreSQL at {target}")]
    Connect {
        target: String,
        #[source]
        source: tokio_postgres::Error,
    },
}

/// A row contained data we could not interpret.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// The CSV header lacks a column we need to convert.
    #[error("CSV header is missing required column {column:?}")]
    MissingColumn { column: String },
    /// Two columns would have the same name in the destination table.
    #[error("CSV header contains column {column:?} more than once")]
    DuplicateColumn { column: String },
    /// A timestamp cell was malformed.
    #[error("cannot parse {value:?} in column {column:?} (row {row}) as a timestamp")]
    InvalidTimestamp {
        column: String,
        /// One-based row number, not counting the header.
        row: u64,
        value: String,
    },
}

/// Loading the staged CSV file failed. Batches written before the failure
/// remain in the table.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LoadError {
    /// We were asked to read zero records per batch.
    #[error("batch size must be greater than 0")]
    InvalidBatchSize,
    /// We could not open the staged file.
    #[error("could not open {}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The staged file could not be read as CSV.
    #[error("could not read CSV data from {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    /// A row could not be normalized.
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// We could not replace the destination table.
    #[error("error creating table {table}")]
    CreateTable {
        table: String,
        #[source]
        source: BoxError,
    },
    /// We could not append a batch to the destination table.
    #[error("error writing batch {batch} to {table}")]
    Write {
        table: String,
        /// One-based batch number.
        batch: usize,
        #[source]
        source: BoxError,
    },
    /// The background thread reading our CSV data went away.
    #[error("background CSV reader failed")]
    Background(#[from] tokio::task::JoinError),
}
