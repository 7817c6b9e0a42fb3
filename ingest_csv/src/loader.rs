//! Loading a staged CSV file into a table, one batch at a time.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;

use crate::common::*;
use crate::config::DEFAULT_BATCH_SIZE;
use crate::errors::LoadError;
use crate::postgres::PgName;
use crate::reader::CsvBatchReader;
use crate::table::{NormalizedBatch, TableSchema};

/// Somewhere we can write a table.
///
/// [`load_csv`] calls [`TableSink::replace_table`] exactly once, before any
/// call to [`TableSink::append_batch`].
#[async_trait]
pub trait TableSink: Send {
    /// Create an empty table matching `table`, destroying any existing table
    /// with the same name.
    async fn replace_table(&mut self, table: &TableSchema) -> Result<()>;

    /// Append `batch` to `table`. Either all of the batch's rows are written,
    /// or none are. Returns the number of rows written.
    async fn append_batch(
        &mut self,
        table: &TableSchema,
        batch: &NormalizedBatch,
    ) -> Result<u64>;
}

/// Options for [`load_csv`].
#[derive(Clone, Debug)]
pub struct LoadOptions {
    /// The table to replace.
    pub table: PgName,
    /// The maximum number of rows per batch.
    pub batch_size: usize,
    /// If present, add a leading row-number column with this name.
    pub index_column: Option<String>,
}

impl LoadOptions {
    /// Default options for loading into `table`.
    pub fn new(table: PgName) -> Self {
        Self {
            table,
            batch_size: DEFAULT_BATCH_SIZE,
            index_column: None,
        }
    }
}

/// What happened to a single batch.
#[derive(Clone, Debug)]
pub struct BatchStats {
    /// One-based batch number.
    pub index: usize,
    /// Rows appended.
    pub rows: u64,
    /// Time spent reading, normalizing and appending this batch.
    pub elapsed: Duration,
}

/// What [`load_csv`] did.
#[derive(Clone, Debug, Default)]
pub struct LoadSummary {
    /// Every batch we appended, in order.
    pub batches: Vec<BatchStats>,
}

impl LoadSummary {
    /// The total number of rows appended.
    pub fn total_rows(&self) -> u64 {
        self.batches.iter().map(|b| b.rows).sum()
    }
}

/// Load the CSV file at `path` into `sink`.
///
/// The first batch is read and normalized before the table is touched, so a
/// file whose first batch is bad leaves any existing table alone. After that
/// the table is replaced, and each batch is appended as it is read. If a
/// later batch fails, the batches before it stay in the table.
#[instrument(level = "debug", skip(path, sink, opts), fields(path = %path.display(), table = %opts.table))]
pub async fn load_csv(
    path: &Path,
    sink: &mut dyn TableSink,
    opts: &LoadOptions,
) -> Result<LoadSummary, LoadError> {
    let table_name = opts.table.to_string();
    let reader = {
        let path = path.to_owned();
        let batch_size = opts.batch_size;
        spawn_blocking(move || CsvBatchReader::open(&path, batch_size)).await?
    };
    let schema = Arc::new(TableSchema::from_headers(
        opts.table.clone(),
        reader.headers(),
        opts.index_column.as_deref(),
    )?);
    let mut batches = BatchReads {
        reader: Some(reader),
        schema: schema.clone(),
        path: path.to_owned(),
    };

    let started = Instant::now();
    let first = batches.next_batch().await?;

    sink.replace_table(&schema)
        .await
        .map_err(|err| LoadError::CreateTable {
            table: table_name.clone(),
            source: err.into(),
        })?;
    info!("Table {} created successfully.", table_name);

    let mut summary = LoadSummary::default();
    let first = match first {
        Some(first) => first,
        None => {
            warn!(
                "{} contains a header but no rows, so {} is empty",
                path.display(),
                table_name,
            );
            return Ok(summary);
        }
    };
    let rows = append(sink, &schema, &first, 1, &table_name).await?;
    summary.batches.push(BatchStats {
        index: 1,
        rows,
        elapsed: started.elapsed(),
    });
    info!(batch = 1, rows, "First chunk inserted successfully.");

    loop {
        let started = Instant::now();
        let batch = match batches.next_batch().await? {
            Some(batch) => batch,
            None => break,
        };
        let index = summary.batches.len() + 1;
        let rows = append(sink, &schema, &batch, index, &table_name).await?;
        let elapsed = started.elapsed();
        info!(
            batch = index,
            rows,
            "Inserted another chunk, took {:.3} seconds",
            elapsed.as_secs_f64()
        );
        summary.batches.push(BatchStats {
            index,
            rows,
            elapsed,
        });
    }

    info!(
        "Finished ingesting data into the PostgreSQL database ({} rows in {} batches)",
        summary.total_rows(),
        summary.batches.len(),
    );
    Ok(summary)
}

/// Append a single batch, attaching the batch number to any error.
async fn append(
    sink: &mut dyn TableSink,
    schema: &TableSchema,
    batch: &NormalizedBatch,
    index: usize,
    table_name: &str,
) -> Result<u64, LoadError> {
    sink.append_batch(schema, batch)
        .await
        .map_err(|err| LoadError::Write {
            table: table_name.to_owned(),
            batch: index,
            source: err.into(),
        })
}

/// Reads and normalizes batches on the blocking thread pool.
///
/// The reader is moved to the worker thread for each batch and handed back
/// afterwards. If a read fails, the reader is dropped along with the error,
/// and no further batches will be returned.
struct BatchReads {
    reader: Option<CsvBatchReader>,
    schema: Arc<TableSchema>,
    path: PathBuf,
}

impl BatchReads {
    async fn next_batch(&mut self) -> Result<Option<NormalizedBatch>, LoadError> {
        let mut reader = match self.reader.take() {
            Some(reader) => reader,
            None => return Ok(None),
        };
        let schema = self.schema.clone();
        let (reader, batch) = spawn_blocking(move || {
            let batch = match reader.next_batch()? {
                Some(raw) => Some(schema.normalize(&raw)?),
                None => None,
            };
            Ok::<_, LoadError>((reader, batch))
        })
        .await?;
        if batch.is_some() {
            self.reader = Some(reader);
        } else {
            trace!("no more batches in {}", self.path.display());
        }
        Ok(batch)
    }
}
