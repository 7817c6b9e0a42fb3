//! Writing tables to PostgreSQL.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;

use super::{connect, Client, ConnectionTarget, Ident, PgName};
use crate::common::*;
use crate::errors::ConnectionError;
use crate::loader::TableSink;
use crate::table::{Column, NormalizedBatch, TableSchema};

/// How much CSV data we send to the server in a single `COPY` message.
const COPY_CHUNK_SIZE: usize = 64 * 1024;

/// A [`TableSink`] backed by a PostgreSQL connection.
pub struct PostgresSink {
    client: Client,
}

impl PostgresSink {
    /// Connect to `target`. The connection is driven by a background worker
    /// in `ctx`.
    pub async fn connect(
        ctx: &Context,
        target: &ConnectionTarget,
    ) -> Result<Self, ConnectionError> {
        let client = connect(ctx, target).await?;
        debug!("connected to {}", target);
        Ok(Self { client })
    }
}

#[async_trait]
impl TableSink for PostgresSink {
    #[instrument(level = "debug", skip(self, table), fields(table = %table.name))]
    async fn replace_table(&mut self, table: &TableSchema) -> Result<()> {
        let drop_sql = drop_table_sql(&table.name);
        debug!("{}", drop_sql);
        self.client
            .batch_execute(&drop_sql)
            .await
            .with_context(|| format!("error deleting existing {}", table.name))?;

        let create_sql = PgCreateTable::new(table).to_string();
        debug!("{}", create_sql);
        self.client
            .batch_execute(&create_sql)
            .await
            .with_context(|| format!("error creating table {}", table.name))?;
        Ok(())
    }

    #[instrument(level = "debug", skip_all, fields(table = %table.name, rows = batch.len()))]
    async fn append_batch(
        &mut self,
        table: &TableSchema,
        batch: &NormalizedBatch,
    ) -> Result<u64> {
        let mut data = Bytes::from(
            batch
                .to_csv()
                .context("could not serialize batch as CSV")?,
        );
        let copy_sql = PgCopyFromCsv::new(table).to_string();
        trace!("{}", copy_sql);

        let sink = self
            .client
            .copy_in::<_, Bytes>(copy_sql.as_str())
            .await
            .with_context(|| format!("error starting COPY into {}", table.name))?;
        futures::pin_mut!(sink);
        while !data.is_empty() {
            let chunk = data.split_to(data.len().min(COPY_CHUNK_SIZE));
            sink.send(chunk)
                .await
                .with_context(|| format!("error sending rows to {}", table.name))?;
        }
        let rows = sink
            .as_mut()
            .finish()
            .await
            .with_context(|| format!("error finishing COPY into {}", table.name))?;
        Ok(rows)
    }
}

/// `DROP TABLE IF EXISTS` for `name`.
fn drop_table_sql(name: &PgName) -> String {
    format!("DROP TABLE IF EXISTS {}", name.quoted())
}

/// A column declaration in a `CREATE TABLE` statement.
struct PgColumn<'a>(&'a Column);

impl fmt::Display for PgColumn<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", Ident(&self.0.name), self.0.column_type)
    }
}

/// Generates `CREATE TABLE` SQL for a [`TableSchema`].
struct PgCreateTable<'a> {
    table: &'a TableSchema,
}

impl<'a> PgCreateTable<'a> {
    fn new(table: &'a TableSchema) -> Self {
        Self { table }
    }
}

impl fmt::Display for PgCreateTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "CREATE TABLE {} (", self.table.name.quoted())?;
        let columns = self.table.columns();
        for (idx, col) in columns.iter().enumerate() {
            write!(f, "    {}", PgColumn(col))?;
            if idx + 1 == columns.len() {
                writeln!(f)?;
            } else {
                writeln!(f, ",")?;
            }
        }
        writeln!(f, ");")?;
        Ok(())
    }
}

/// Generates the `COPY ... FROM STDIN` SQL we use to append a batch.
struct PgCopyFromCsv<'a> {
    table: &'a TableSchema,
}

impl<'a> PgCopyFromCsv<'a> {
    fn new(table: &'a TableSchema) -> Self {
        Self { table }
    }
}

impl fmt::Display for PgCopyFromCsv<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "COPY {} (", self.table.name.quoted())?;
        for (idx, col) in self.table.columns().iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", Ident(&col.name))?;
        }
        write!(f, ") FROM STDIN WITH (FORMAT csv)")
    }
}

#[cfg(test)]
mod tests {
    use csv::StringRecord;
    use pretty_assertions::assert_eq;

    use super::*;

    fn schema(index_column: Option<&str>) -> TableSchema {
        let headers = StringRecord::from(vec![
            "VendorID",
            "tpep_pickup_datetime",
            "tpep_dropoff_datetime",
            "odd\"name",
        ]);
        TableSchema::from_headers(
            "public.yellow_taxi_data".parse().unwrap(),
            &headers,
            index_column,
        )
        .unwrap()
    }

    #[test]
    fn drop_table() {
        assert_eq!(
            drop_table_sql(&"yellow_taxi_data".parse().unwrap()),
            "DROP TABLE IF EXISTS \"yellow_taxi_data\""
        );
    }

    #[test]
    fn create_table() {
        let sql = PgCreateTable::new(&schema(Some("index"))).to_string();
        assert_eq!(
            sql,
            r#"CREATE TABLE "public"."yellow_taxi_data" (
    "index" BIGINT,
    "VendorID" TEXT,
    "tpep_pickup_datetime" TIMESTAMP,
    "tpep_dropoff_datetime" TIMESTAMP,
    "odd""name" TEXT
);
"#
        );
    }

    #[test]
    fn copy_from_csv() {
        let sql = PgCopyFromCsv::new(&schema(None)).to_string();
        assert_eq!(
            sql,
            r#"COPY "public"."yellow_taxi_data" ("VendorID", "tpep_pickup_datetime", "tpep_dropoff_datetime", "odd""name") FROM STDIN WITH (FORMAT csv)"#
        );
    }
}
