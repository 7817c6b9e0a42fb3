//! A CLI tool which downloads a CSV file and loads it into PostgreSQL.

#![warn(rust_2018_idioms, unused_extern_crates, clippy::all)]

use std::process;

use anyhow::Result;
use clap::Parser;
use futures::FutureExt;
use ingest_csv::{
    logging::LogFormat, tokio_glue::run_futures_with_runtime, Configuration, Context,
};
use tracing::{debug, error};

mod cmd;

fn main() {
    if let Err(err) = LogFormat::from_env().and_then(LogFormat::install) {
        eprintln!("Error: {:?}", err);
        process::exit(1);
    }
    if let Err(err) = run() {
        error!("{:?}", err);
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let opt = cmd::Opt::parse();
    debug!("{:?}", opt);

    let config = Configuration::try_default()?;
    let (ctx, worker_fut) = Context::create();
    let cmd_fut = cmd::run(ctx, config, opt).boxed();
    run_futures_with_runtime(cmd_fut, worker_fut)
}
