//! Downloading the source file.

use std::path::Path;

use tokio::{
    fs::File,
    io::{AsyncWriteExt, BufWriter},
};

use crate::common::*;
use crate::errors::DownloadError;
use crate::tls::rustls_client_config;

/// Build the HTTP client we download with.
pub fn http_client() -> Result<reqwest::Client> {
    let tls_config = rustls_client_config()?;
    reqwest::Client::builder()
        .use_preconfigured_tls(tls_config)
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("could not build HTTP client")
}

/// Download `url` to `dest`, overwriting anything already there, and return
/// the number of bytes written.
///
/// The body is streamed to disk `chunk_size` bytes at a time, so we never hold
/// the whole file in memory.
#[instrument(level = "debug", skip(client, url, dest), fields(url = %url, dest = %dest.display()))]
pub async fn download_file(
    client: &reqwest::Client,
    url: &Url,
    dest: &Path,
    chunk_size: usize,
) -> Result<u64, DownloadError> {
    if chunk_size == 0 {
        return Err(DownloadError::InvalidChunkSize);
    }
    info!("Downloading file from {}", url);

    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|source| DownloadError::Request {
            url: url.to_string(),
            source,
        })?;
    let status = response.status();
    if status.is_client_error() || status.is_server_error() {
        return Err(DownloadError::Status {
            url: url.to_string(),
            status,
        });
    }

    let write_err = |source| DownloadError::Write {
        path: dest.to_owned(),
        source,
    };
    let file = File::create(dest).await.map_err(write_err)?;
    let mut wtr = BufWriter::with_capacity(chunk_size, file);
    let mut body = response.bytes_stream();
    let mut written: u64 = 0;
    while let Some(bytes) = body.next().await {
        let bytes = bytes.map_err(|source| DownloadError::Body {
            url: url.to_string(),
            source,
        })?;
        for chunk in bytes.chunks(chunk_size) {
            wtr.write_all(chunk).await.map_err(write_err)?;
        }
        written += bytes.len() as u64;
        trace!("downloaded {} bytes so far", written);
    }
    wtr.flush().await.map_err(write_err)?;

    info!(
        "File downloaded successfully to {} ({} bytes)",
        dest.display(),
        written
    );
    Ok(written)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    const BODY: &str = "VendorID,tpep_pickup_datetime,tpep_dropoff_datetime\n\
                        1,2021-01-01 00:30:10,2021-01-01 00:36:12\n";

    #[tokio::test]
    async fn downloads_body_to_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/trip-data/trips.csv"))
            .respond_with(ResponseTemplate::new(200).set_body_string(BODY))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("trips.csv");
        fs::write(&dest, "stale contents that are longer than the new body ......")
            .unwrap();
        let url = format!("{}/trip-data/trips.csv", server.uri())
            .parse::<Url>()
            .unwrap();

        // A tiny chunk size exercises the chunked write path.
        let written = download_file(&http_client().unwrap(), &url, &dest, 7)
            .await
            .unwrap();
        assert_eq!(written, BODY.len() as u64);
        assert_eq!(fs::read_to_string(&dest).unwrap(), BODY);
    }

    #[tokio::test]
    async fn http_errors_are_download_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("missing.csv");
        let url = format!("{}/missing.csv", server.uri())
            .parse::<Url>()
            .unwrap();
        let err = download_file(&http_client().unwrap(), &url, &dest, 8192)
            .await
            .unwrap_err();
        match err {
            DownloadError::Status { status, .. } => assert_eq!(status.as_u16(), 404),
            other => panic!("unexpected error: {}", other),
        }
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn server_errors_are_download_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let url = format!("{}/trips.csv", server.uri()).parse::<Url>().unwrap();
        let err = download_file(
            &http_client().unwrap(),
            &url,
            &dir.path().join("trips.csv"),
            8192,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DownloadError::Status { .. }));
    }

    #[tokio::test]
    async fn unreachable_hosts_are_download_errors() {
        // Port 9 is "discard"; nothing should be listening on it locally.
        let url = "http://127.0.0.1:9/trips.csv".parse::<Url>().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let err = download_file(
            &http_client().unwrap(),
            &url,
            &dir.path().join("trips.csv"),
            8192,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DownloadError::Request { .. }));
    }

    #[tokio::test]
    async fn zero_chunk_size_is_rejected_before_requesting() {
        // Nothing listens here, so reaching the network would be a `Request`
        // error instead.
        let url = "http://127.0.0.1:9/trips.csv".parse::<Url>().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("trips.csv");
        let err = download_file(&http_client().unwrap(), &url, &dest, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::InvalidChunkSize));
        assert!(!dest.exists());
    }
}
