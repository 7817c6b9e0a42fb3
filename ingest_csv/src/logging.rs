//! Log output configuration.

use std::{env, io::stderr, str::FromStr};

use tracing_subscriber::EnvFilter;

use crate::common::*;

/// The environment variable used to pick a [`LogFormat`].
pub const LOG_FORMAT_VAR: &str = "INGEST_CSV_LOG_FORMAT";

/// What log format we should use.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LogFormat {
    /// Compact, colorized logs.
    Indented,
    /// Single-line log entries with all fields on each line, and no colors.
    Flat,
    /// JSON records.
    Json,
}

impl LogFormat {
    /// Read our log format from `INGEST_CSV_LOG_FORMAT`, defaulting to
    /// [`LogFormat::Indented`].
    pub fn from_env() -> Result<Self> {
        match env::var(LOG_FORMAT_VAR) {
            Ok(s) => s.parse(),
            Err(env::VarError::NotPresent) => Ok(LogFormat::Indented),
            Err(err) => Err(err).with_context(|| format!("could not read {}", LOG_FORMAT_VAR)),
        }
    }

    /// Install a global `tracing` subscriber using this format. `RUST_LOG`
    /// controls filtering, and defaults to `info`.
    pub fn install(self) -> Result<()> {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(stderr);
        let result = match self {
            Self::Indented => builder.compact().try_init(),
            Self::Flat => builder.with_ansi(false).try_init(),
            Self::Json => builder.json().try_init(),
        };
        result.map_err(|err| format_err!("could not install tracing subscriber: {}", err))
    }
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "indented" => Ok(LogFormat::Indented),
            "flat" => Ok(LogFormat::Flat),
            "json" => Ok(LogFormat::Json),
            _ => Err(format_err!("unknown log format: {}", s)),
        }
    }
}

#[test]
fn parses_log_formats() {
    assert_eq!("indented".parse::<LogFormat>().unwrap(), LogFormat::Indented);
    assert_eq!("flat".parse::<LogFormat>().unwrap(), LogFormat::Flat);
    assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
    assert!("pretty".parse::<LogFormat>().is_err());
}
