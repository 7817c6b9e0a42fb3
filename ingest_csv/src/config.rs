//! Configuration file support.

use std::{
    env,
    fs::File,
    io::{self, Read},
    path::{Path, PathBuf},
};
use toml_edit::{DocumentMut, Item};

use crate::common::*;

/// How many CSV records we load per batch, unless configured otherwise.
pub const DEFAULT_BATCH_SIZE: usize = 100_000;

/// How many bytes we write to disk at a time while downloading.
pub const DEFAULT_DOWNLOAD_CHUNK_SIZE: usize = 8192;

/// Environment variable which overrides our configuration directory.
pub const CONFIG_DIR_VAR: &str = "INGEST_CSV_CONFIG_DIR";

/// The directory holding `ingest_csv.toml`.
pub(crate) fn config_dir() -> Result<PathBuf> {
    // `var_os`, so that non-Unicode paths still work.
    if let Some(dir) = env::var_os(CONFIG_DIR_VAR) {
        return Ok(PathBuf::from(dir));
    }
    let base = dirs::config_dir().ok_or_else(|| {
        format_err!("no user config directory; set {} instead", CONFIG_DIR_VAR)
    })?;
    Ok(base.join("ingest_csv"))
}

/// The path to `ingest_csv.toml`.
pub(crate) fn config_file() -> Result<PathBuf> {
    Ok(config_dir()?.join("ingest_csv.toml"))
}

/// Our `ingest_csv.toml` configuration file.
///
/// Every key is optional. A missing file is the same as an empty one.
///
/// ```toml
/// batch_size = 100000
/// download_chunk_size = 8192
/// staging_dir = "/var/tmp"
/// index_column = "index"
/// ```
#[derive(Debug)]
pub struct Configuration {
    /// Where this configuration lives, whether or not the file exists.
    path: PathBuf,
    doc: DocumentMut,
}

impl Configuration {
    /// Load `ingest_csv.toml` from our configuration directory.
    pub fn try_default() -> Result<Self> {
        Self::from_path(&config_file()?)
    }

    /// Load the configuration file at `path`, or use the defaults if it does
    /// not exist.
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                trace!("no config file at {}", path.display());
                return Ok(Self {
                    path: path.to_owned(),
                    doc: DocumentMut::default(),
                });
            }
            Err(err) => {
                return Err(err).with_context(|| format!("could not open {}", path.display()))
            }
        };
        Self::from_reader(path.to_owned(), file)
            .with_context(|| format!("could not read {}", path.display()))
    }

    /// Parse a configuration file from `rdr`.
    fn from_reader<R: Read>(path: PathBuf, mut rdr: R) -> Result<Self> {
        let mut text = String::new();
        rdr.read_to_string(&mut text)?;
        let doc = text.parse::<DocumentMut>()?;
        Ok(Self { path, doc })
    }

    /// The path this configuration was loaded from (whether or not it exists).
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The maximum number of records per batch.
    pub fn batch_size(&self) -> Result<usize> {
        self.positive_integer("batch_size", DEFAULT_BATCH_SIZE)
    }

    /// The number of bytes to write per disk write while downloading.
    pub fn download_chunk_size(&self) -> Result<usize> {
        self.positive_integer("download_chunk_size", DEFAULT_DOWNLOAD_CHUNK_SIZE)
    }

    /// The directory where we stage downloaded files. Defaults to the current
    /// directory.
    pub fn staging_dir(&self) -> Result<PathBuf> {
        Ok(self
            .string("staging_dir")?
            .map_or_else(|| PathBuf::from("."), PathBuf::from))
    }

    /// The name of an optional row-number column to add to the table.
    pub fn index_column(&self) -> Result<Option<String>> {
        match self.string("index_column")? {
            Some(name) if name.is_empty() => Err(format_err!(
                "index_column in {} may not be empty",
                self.path.display()
            )),
            other => Ok(other),
        }
    }

    /// Look up a raw key.
    fn get(&self, key: &str) -> Option<&Item> {
        self.doc.as_table().get(key)
    }

    /// Get a positive integer from our config file, or `default`.
    fn positive_integer(&self, key: &str, default: usize) -> Result<usize> {
        match self.get(key) {
            None => Ok(default),
            Some(item) => {
                let value = item.as_integer().ok_or_else(|| {
                    format_err!(
                        "expected {} in {} to be an integer",
                        key,
                        self.path.display()
                    )
                })?;
                match usize::try_from(value) {
                    Ok(value) if value > 0 => Ok(value),
                    _ => Err(format_err!(
                        "expected {} in {} to be greater than 0, found {}",
                        key,
                        self.path.display(),
                        value
                    )),
                }
            }
        }
    }

    /// Get an optional string from our config file.
    fn string(&self, key: &str) -> Result<Option<String>> {
        match self.get(key) {
            None => Ok(None),
            Some(item) => item.as_str().map(|s| Some(s.to_owned())).ok_or_else(|| {
                format_err!(
                    "expected {} in {} to be a string",
                    key,
                    self.path.display()
                )
            }),
        }
    }
}
