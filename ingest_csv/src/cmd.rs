//! Command-line parsing and the top-level ingest command.

use anyhow::Result;
use clap::Parser;
use ingest_csv::{
    fetch::{download_file, http_client},
    load_csv,
    postgres::{ConnectionTarget, Password, PgName, PostgresSink},
    staging::StagingFile,
    Configuration, Context, LoadOptions,
};
use tracing::{debug, info, instrument};
use url::Url;

/// Command-line options, parsed using `clap`.
#[derive(Debug, Parser)]
#[clap(name = "ingest_csv", version, about = "Ingest CSV data to Postgres")]
pub(crate) struct Opt {
    /// User name for Postgres
    #[clap(long)]
    user: String,

    /// Password for Postgres
    #[clap(long)]
    password: Password,

    /// Host for Postgres
    #[clap(long)]
    host: String,

    /// Port for Postgres
    #[clap(long)]
    port: u16,

    /// Database name for Postgres
    #[clap(long)]
    db: String,

    /// Name of the table to write data to
    #[clap(long = "table_name")]
    table_name: PgName,

    /// URL of the CSV file
    #[clap(long)]
    url: Url,
}

impl Opt {
    /// Where our table should be written.
    fn connection_target(&self) -> ConnectionTarget {
        ConnectionTarget {
            user: self.user.clone(),
            password: self.password.clone(),
            host: self.host.clone(),
            port: self.port,
            db: self.db.clone(),
        }
    }
}

/// Download `opt.url` and load it into `opt.table_name`.
///
/// The staged download is deleted on the way out, whether or not we succeed.
#[instrument(level = "debug", name = "ingest", skip_all, fields(table = %opt.table_name))]
pub(crate) async fn run(ctx: Context, config: Configuration, opt: Opt) -> Result<()> {
    // Check our configuration before we touch the network.
    let load_opts = LoadOptions {
        table: opt.table_name.clone(),
        batch_size: config.batch_size()?,
        index_column: config.index_column()?,
    };
    let chunk_size = config.download_chunk_size()?;
    let staging_dir = config.staging_dir()?;
    debug!("using configuration from {}", config.path().display());

    let staging = StagingFile::for_url(&staging_dir, &opt.url);
    let client = http_client()?;
    download_file(&client, &opt.url, staging.path(), chunk_size).await?;

    let target = opt.connection_target();
    let mut sink = PostgresSink::connect(&ctx, &target).await?;
    let summary = load_csv(staging.path(), &mut sink, &load_opts).await?;
    info!(
        "loaded {} rows into {} in {} batches",
        summary.total_rows(),
        opt.table_name,
        summary.batches.len(),
    );
    Ok(())
}
