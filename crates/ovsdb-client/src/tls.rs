//! TLS configuration
//!
//! Connectors verify the server against a PEM CA bundle and may present a
//! client identity; listeners terminate TLS with a PEM certificate/key
//! pair and optionally demand client certificates.

use crate::error::{OvsdbError, Result};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_rustls::{TlsAcceptor, TlsConnector};

/// Client-side TLS settings
#[derive(Debug, Clone)]
pub struct TlsClientConfig {
    /// PEM bundle the server certificate must chain to
    ca_cert: PathBuf,
    /// Client identity presented when the server requests one
    cert: Option<PathBuf>,
    key: Option<PathBuf>,
    /// Name to verify the server certificate against; defaults to the
    /// host part of the connect address
    server_name: Option<String>,
}

impl TlsClientConfig {
    pub fn new(ca_cert: impl Into<PathBuf>) -> Self {
        Self {
            ca_cert: ca_cert.into(),
            cert: None,
            key: None,
            server_name: None,
        }
    }

    /// Present a client certificate during the handshake
    pub fn with_identity(mut self, cert: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Self {
        self.cert = Some(cert.into());
        self.key = Some(key.into());
        self
    }

    /// Override the name the server certificate is verified against
    pub fn with_server_name(mut self, server_name: impl Into<String>) -> Self {
        self.server_name = Some(server_name.into());
        self
    }

    /// Build a TLS connector from this config
    pub fn build_connector(&self) -> Result<TlsConnector> {
        let mut roots = RootCertStore::empty();
        for cert in load_certs(&self.ca_cert)? {
            roots
                .add(cert)
                .map_err(|e| OvsdbError::tls(format!("rejected CA certificate: {e}")))?;
        }

        let builder = ClientConfig::builder().with_root_certificates(roots);
        let config = match (&self.cert, &self.key) {
            (Some(cert_path), Some(key_path)) => builder
                .with_client_auth_cert(load_certs(cert_path)?, load_key(key_path)?)
                .map_err(|e| OvsdbError::tls(format!("invalid client identity: {e}")))?,
            _ => builder.with_no_client_auth(),
        };
        Ok(TlsConnector::from(Arc::new(config)))
    }

    /// The name to verify the server against when connecting to `addr`
    pub fn resolved_server_name(&self, addr: &str) -> Result<ServerName<'static>> {
        let name = match &self.server_name {
            Some(name) => name.clone(),
            None => addr
                .rsplit_once(':')
                .map(|(host, _)| host.to_string())
                .unwrap_or_else(|| addr.to_string()),
        };
        ServerName::try_from(name)
            .map_err(|e| OvsdbError::tls(format!("invalid TLS server name: {e}")))
    }
}

/// Listener-side TLS settings
#[derive(Debug, Clone)]
pub struct TlsServerConfig {
    cert: PathBuf,
    key: PathBuf,
}

impl TlsServerConfig {
    pub fn new(cert: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Self {
        Self {
            cert: cert.into(),
            key: key.into(),
        }
    }

    /// Build a TLS acceptor from this config
    pub fn build_acceptor(&self) -> Result<TlsAcceptor> {
        let certs = load_certs(&self.cert)?;
        let key = load_key(&self.key)?;
        let config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| OvsdbError::tls(format!("invalid server identity: {e}")))?;
        Ok(TlsAcceptor::from(Arc::new(config)))
    }
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path)
        .map_err(|e| OvsdbError::tls(format!("failed to open {}: {e}", path.display())))?;
    let mut reader = BufReader::new(file);
    let certs: Vec<_> = rustls_pemfile::certs(&mut reader)
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| OvsdbError::tls(format!("failed to parse {}: {e}", path.display())))?;
    if certs.is_empty() {
        return Err(OvsdbError::tls(format!(
            "no certificates found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let file = File::open(path)
        .map_err(|e| OvsdbError::tls(format!("failed to open {}: {e}", path.display())))?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| OvsdbError::tls(format!("failed to parse {}: {e}", path.display())))?
        .ok_or_else(|| OvsdbError::tls(format!("no private key found in {}", path.display())))
}
