//! Support for setting up RusTLS in a consistent fashion.

use std::sync::Arc;

use rustls::{crypto::aws_lc_rs, ClientConfig, RootCertStore};
use rustls_native_certs::load_native_certs;

use crate::common::*;

/// Standard RusTLS `ClientConfig` setup, shared by our HTTP client and our
/// PostgreSQL connection. This always uses the `aws-lc-rs` provider.
pub(crate) fn rustls_client_config() -> Result<ClientConfig> {
    let mut root_store = RootCertStore::empty();
    let cert_result = load_native_certs();
    for cert in cert_result.certs {
        root_store
            .add(cert)
            .context("could not add certificate to cert store")?;
    }
    for err in &cert_result.errors {
        warn!("error loading native certs: {}", err);
    }
    if root_store.is_empty() {
        if let Some(err) = cert_result.errors.into_iter().next() {
            return Err(err).context("could not load any native certs");
        }
        debug!("no native certs found; TLS servers will fail to verify");
    }

    Ok(
        ClientConfig::builder_with_provider(Arc::new(aws_lc_rs::default_provider()))
            .with_safe_default_protocol_versions()
            .context("could not configure TLS protocol versions")?
            .with_root_certificates(root_store)
            .with_no_client_auth(),
    )
}
