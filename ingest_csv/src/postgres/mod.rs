//! Our PostgreSQL destination.

use std::{fmt, str::FromStr};

pub use tokio_postgres::Client;

use crate::common::*;
use crate::errors::ConnectionError;
use crate::tls::rustls_client_config;

mod connection_target;
mod sink;

pub use self::connection_target::{ConnectionTarget, Password};
pub use self::sink::PostgresSink;

/// Open a connection to `target`, negotiating TLS when the server supports
/// it. The connection itself is driven by a worker spawned on `ctx`.
#[instrument(level = "trace", skip(ctx))]
pub(crate) async fn connect(
    ctx: &Context,
    target: &ConnectionTarget,
) -> Result<Client, ConnectionError> {
    let tls_config =
        rustls_client_config().map_err(|err| ConnectionError::Tls(err.into()))?;
    let (client, connection) = target
        .to_config()
        .connect(tokio_postgres_rustls::MakeRustlsConnect::new(tls_config))
        .await
        .map_err(|source| ConnectionError::Connect {
            target: target.to_string(),
            source,
        })?;

    // `tokio_postgres` does no I/O unless this is polled.
    let description = target.to_string();
    ctx.spawn_worker(
        debug_span!("postgres connection", target = %description),
        connection.map_err(move |err| {
            Error::new(err)
                .context(format!("lost PostgreSQL connection to {}", description))
        }),
    );
    Ok(client)
}

/// A PostgreSQL identifier, which always displays double-quoted so that
/// mixed-case CSV headers like `VendorID` keep their case.
pub(crate) struct Ident<'a>(pub(crate) &'a str);

impl fmt::Display for Ident<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self.0.replace('"', "\"\""))
    }
}

/// The name of our destination table, optionally qualified by a PostgreSQL
/// schema, as in `public.yellow_taxi_data`.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct PgName {
    schema: Option<String>,
    name: String,
}

impl PgName {
    /// Create a new table name.
    pub fn new<S, T>(schema: S, name: T) -> Self
    where
        S: Into<Option<String>>,
        T: Into<String>,
    {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// The PostgreSQL schema, if one was given.
    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    /// The table name without its schema.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// A `Display` wrapper which quotes this name for use in SQL.
    pub(crate) fn quoted(&self) -> TableNameQuoted<'_> {
        TableNameQuoted(self)
    }
}

impl fmt::Display for PgName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

impl FromStr for PgName {
    type Err = Error;

    /// Parse `table` or `schema.table`. Anything after the first `.` is the
    /// table name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed = match s.split_once('.') {
            Some((schema, name)) => Self::new(Some(schema.to_owned()), name),
            None => Self::new(None, s),
        };
        if parsed.name.is_empty() || parsed.schema() == Some("") {
            return Err(format_err!("cannot parse table name {:?}", s));
        }
        Ok(parsed)
    }
}

/// Displays a [`PgName`] with each part quoted.
pub(crate) struct TableNameQuoted<'a>(&'a PgName);

impl fmt::Display for TableNameQuoted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(schema) = self.0.schema() {
            write!(f, "{}.", Ident(schema))?;
        }
        write!(f, "{}", Ident(self.0.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_names_are_quoted() {
        let examples = &[
            ("yellow_taxi_data", "\"yellow_taxi_data\""),
            ("trips.yellow", "\"trips\".\"yellow\""),
            ("Trips.2021.01", "\"Trips\".\"2021.01\""),
        ];
        for &(input, expected) in examples {
            let name = input.parse::<PgName>().unwrap();
            assert_eq!(name.quoted().to_string(), expected);
            assert_eq!(name.to_string(), input);
        }

        let with_quote = PgName::new(Some("ny".to_owned()), "odd\"name");
        assert_eq!(with_quote.quoted().to_string(), "\"ny\".\"odd\"\"name\"");
    }

    #[test]
    fn table_names_reject_empty_parts() {
        for s in &["", ".trips", "trips."] {
            assert!(s.parse::<PgName>().is_err(), "parsing {:?}", s);
        }
    }
}
