//! The local file we download into, which lives only as long as one run.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use crate::common::*;

/// File name used when the URL doesn't end in one.
const FALLBACK_FILE_NAME: &str = "download.csv";

/// A staged download. The file (if it was ever created) is deleted when this
/// value is dropped, whether the run succeeded or not.
#[derive(Debug)]
pub struct StagingFile {
    path: PathBuf,
}

impl StagingFile {
    /// Stage the download of `url` in `staging_dir`, naming the file after the
    /// last segment of the URL's path.
    pub fn for_url(staging_dir: &Path, url: &Url) -> Self {
        Self {
            path: staging_dir.join(file_name_for_url(url)),
        }
    }

    /// Where the staged file lives.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagingFile {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => info!("Temporary file {} deleted.", self.path.display()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                trace!("no temporary file at {}", self.path.display());
            }
            Err(err) => warn!(
                "could not delete temporary file {}: {}",
                self.path.display(),
                err
            ),
        }
    }
}

/// Pick a local file name for `url`.
fn file_name_for_url(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty())
        .unwrap_or(FALLBACK_FILE_NAME)
        .to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_comes_from_last_path_segment() {
        let examples = &[
            (
                "https://d37ci6vzurychx.cloudfront.net/trip-data/yellow_tripdata_2021-01.csv",
                "yellow_tripdata_2021-01.csv",
            ),
            (
                "https://example.com/releases/yellow_tripdata_2021-01.csv.gz?raw=true",
                "yellow_tripdata_2021-01.csv.gz",
            ),
            ("https://example.com/", FALLBACK_FILE_NAME),
            ("https://example.com/data/", FALLBACK_FILE_NAME),
        ];
        for &(url, expected) in examples {
            let url = url.parse::<Url>().unwrap();
            assert_eq!(file_name_for_url(&url), expected, "url {}", url);
        }
    }

    #[test]
    fn drop_deletes_file() {
        let dir = tempfile::tempdir().unwrap();
        let url = "http://example.com/trips.csv".parse::<Url>().unwrap();
        let staging = StagingFile::for_url(dir.path(), &url);
        let path = staging.path().to_owned();
        assert_eq!(path, dir.path().join("trips.csv"));
        fs::write(&path, "a,b\n").unwrap();
        drop(staging);
        assert!(!path.exists());
    }

    #[test]
    fn drop_without_file_is_harmless() {
        let dir = tempfile::tempdir().unwrap();
        let url = "http://example.com/trips.csv".parse::<Url>().unwrap();
        let staging = StagingFile::for_url(dir.path(), &url);
        drop(staging);
        assert!(!dir.path().join("trips.csv").exists());
    }
}
