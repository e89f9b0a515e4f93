//! # Credentials
//!
//! The client certificate and private key that authenticate every gateway
//! and feedback session.
//!
//! A bundle is loaded once and handed out behind an `Arc`; the sender and
//! feedback connectors share the same bytes read-only.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use native_tls::Identity;
use tracing::info;

use crate::config::GatewayConfig;
use crate::error::{GatewayError, GatewayResult};

/// PEM certificate chain plus PEM PKCS#8 private key.
#[derive(Clone)]
pub struct CredentialBundle {
    cert_pem: Vec<u8>,
    key_pem: Vec<u8>,
}

impl CredentialBundle {
    /// Wraps PEM bytes already in memory.
    pub fn from_pem(cert_pem: impl Into<Vec<u8>>, key_pem: impl Into<Vec<u8>>) -> Self {
        CredentialBundle {
            cert_pem: cert_pem.into(),
            key_pem: key_pem.into(),
        }
    }

    /// Reads the certificate and key files.
    ///
    /// Both may be the same file. Empty files are rejected here so the
    /// failure names the path instead of surfacing later as a TLS error.
    pub fn load(cert_path: &Path, key_path: &Path) -> GatewayResult<Self> {
        let cert_pem = read_pem(cert_path)?;
        let key_pem = read_pem(key_path)?;

        info!(cert = %cert_path.display(), key = %key_path.display(), "Loaded credentials");
        Ok(Self::from_pem(cert_pem, key_pem))
    }

    /// Loads the bundle named by the configuration, ready to share.
    pub fn from_config(config: &GatewayConfig) -> GatewayResult<Arc<Self>> {
        let cert_path = config.cert_path()?;
        let key_path = config.key_path()?;
        Self::load(&cert_path, &key_path).map(Arc::new)
    }

    /// Builds the TLS client identity.
    pub fn identity(&self) -> GatewayResult<Identity> {
        Identity::from_pkcs8(&self.cert_pem, &self.key_pem)
            .map_err(|e| GatewayError::CredentialLoadFailed(e.to_string()))
    }

    pub fn cert_pem(&self) -> &[u8] {
        &self.cert_pem
    }
}

impl fmt::Debug for CredentialBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialBundle")
            .field("cert_pem", &format_args!("<{} bytes>", self.cert_pem.len()))
            .field("key_pem", &format_args!("<redacted>"))
            .finish()
    }
}

fn read_pem(path: &Path) -> GatewayResult<Vec<u8>> {
    let bytes = std::fs::read(path).map_err(|e| {
        GatewayError::CredentialLoadFailed(format!("{}: {}", path.display(), e))
    })?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(GatewayError::CredentialLoadFailed(format!(
            "{}: file is empty",
            path.display()
        )));
    }
    Ok(bytes)
}
