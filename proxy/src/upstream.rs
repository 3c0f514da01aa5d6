// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! Authenticated TLS connections to the upstream DoT resolver.
//!
//! Every session gets a fresh TCP connection and a full handshake. The
//! certificate chain must lead to a configured trust anchor and the leaf must
//! be valid for the configured server name; there is no fallback to an
//! unverified connection.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::{CertificateDer, ServerName};
use rustls::RootCertStore;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, trace, warn};

use crate::config::UpstreamConfig;
use crate::error::{Phase, SessionError, StartupError};

/// Opens verified TLS connections to one upstream resolver.
pub struct UpstreamConnector {
    address: String,
    server_name: ServerName<'static>,
    display_name: String,
    tls_connector: TlsConnector,
    timeout: Duration,
}

impl UpstreamConnector {
    /// Build a connector trusting the system store and/or `ca_file`.
    pub fn from_config(config: &UpstreamConfig, timeout: Duration) -> Result<Self, StartupError> {
        let mut roots = RootCertStore::empty();

        if config.system_roots {
            let loaded = rustls_native_certs::load_native_certs();
            for err in &loaded.errors {
                warn!(error = %err, "could not load part of the system trust store");
            }
            let (added, ignored) = roots.add_parsable_certificates(loaded.certs);
            debug!(added, ignored, "loaded system trust anchors");
        }

        if let Some(path) = &config.ca_file {
            let certs = load_ca_file(path)?;
            let (added, ignored) = roots.add_parsable_certificates(certs);
            if added == 0 {
                return Err(StartupError::CaFile {
                    path: path.clone(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        "no usable certificates in file",
                    ),
                });
            }
            debug!(path = %path.display(), added, ignored, "loaded extra trust anchors");
        }

        if roots.is_empty() {
            return Err(StartupError::NoTrustAnchors);
        }

        Ok(Self::with_roots(
            config.address.clone(),
            config.server_name()?,
            roots,
            timeout,
        ))
    }

    /// Build a connector with an explicit set of trust anchors.
    pub fn with_roots(
        address: impl Into<String>,
        server_name: ServerName<'static>,
        roots: RootCertStore,
        timeout: Duration,
    ) -> Self {
        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();

        let display_name = match &server_name {
            ServerName::DnsName(name) => name.as_ref().to_string(),
            ServerName::IpAddress(ip) => std::net::IpAddr::from(*ip).to_string(),
            other => format!("{other:?}"),
        };

        Self {
            address: address.into(),
            server_name,
            display_name,
            tls_connector: TlsConnector::from(Arc::new(tls_config)),
            timeout,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Name the upstream certificate is checked against.
    pub fn server_name(&self) -> &str {
        &self.display_name
    }

    /// TCP connect, then TLS handshake with certificate and name verification.
    /// Each step has its own deadline.
    pub async fn connect(&self) -> Result<TlsStream<TcpStream>, SessionError> {
        trace!(upstream = %self.address, "connecting to upstream");
        let tcp_stream = timeout(self.timeout, TcpStream::connect(self.address.as_str()))
            .await
            .map_err(|_| SessionError::Timeout {
                phase: Phase::UpstreamConnect,
            })?
            .map_err(|source| SessionError::UpstreamConnect {
                upstream: self.address.clone(),
                source,
            })?;
        // DNS exchanges are one small write each way.
        if let Err(e) = tcp_stream.set_nodelay(true) {
            trace!(error = %e, "could not set TCP_NODELAY");
        }

        let tls_stream = timeout(
            self.timeout,
            self.tls_connector.connect(self.server_name.clone(), tcp_stream),
        )
        .await
        .map_err(|_| SessionError::Timeout {
            phase: Phase::TlsHandshake,
        })?
        .map_err(|source| SessionError::TlsHandshake {
            server_name: self.display_name.clone(),
            source,
        })?;

        debug!(
            upstream = %self.address,
            server_name = %self.display_name,
            "upstream TLS established"
        );
        Ok(tls_stream)
    }
}

fn load_ca_file(path: &Path) -> Result<Vec<CertificateDer<'static>>, StartupError> {
    let ca_error = |source| StartupError::CaFile {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(ca_error)?;
    rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(ca_error)
}
