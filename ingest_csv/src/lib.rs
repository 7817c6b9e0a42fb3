//! Download a CSV file of trip records and load it into PostgreSQL.
//!
//! The interesting part is [`loader::load_csv`], which reads the downloaded
//! file in fixed-size batches, normalizes the pickup and dropoff timestamps,
//! and hands each batch to a [`loader::TableSink`]. The first batch replaces
//! the destination table, and every later batch is appended to it.

#![warn(rust_2018_idioms, unused_extern_crates, clippy::all)]

use std::result;

pub mod config;
mod context;
pub mod errors;
pub mod fetch;
mod from_csv_cell;
pub mod loader;
pub mod logging;
pub mod postgres;
pub mod reader;
pub mod staging;
pub mod table;
mod tls;
pub mod tokio_glue;

/// Standard error type for the parts of this crate that don't need a typed
/// error.
pub use anyhow::Error;

/// Standard result type for this crate.
pub type Result<T, E = Error> = result::Result<T, E>;

pub use self::config::Configuration;
pub use self::context::Context;
pub use self::errors::{ConnectionError, DownloadError, LoadError, ParseError};
pub use self::loader::{load_csv, LoadOptions, LoadSummary, TableSink};

/// Definitions included by all the files in this crate.
///
/// This forms the dialect of Rust we use for the loader and its drivers, with
/// an emphasis on `tokio` and `tracing`.
#[allow(unused_imports)]
pub(crate) mod common {
    pub(crate) use anyhow::{format_err, Context as _};
    pub(crate) use futures::{FutureExt, SinkExt, StreamExt, TryFutureExt};
    pub(crate) use tracing::{
        debug, debug_span, error, info, instrument, trace, warn, Instrument,
    };
    pub(crate) use url::Url;

    pub(crate) use crate::{
        context::Context,
        tokio_glue::{spawn_blocking, BoxFuture},
        Error, Result,
    };
}
