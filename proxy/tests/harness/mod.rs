// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! Test harness: a throwaway PKI, a mock DoT resolver, and helpers to run the
//! proxy on a loopback port.

#![allow(dead_code)]

pub mod dns;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dot_common::protocol::{encode_frame, read_frame, write_frame};
use dot_proxy::config::{Config, LimitsConfig};
use dot_proxy::{Listener, SessionContext, UpstreamConnector};
use rcgen::{BasicConstraints, CertificateParams, DnType, IsCa, KeyPair};
use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer, ServerName};
use rustls::{RootCertStore, ServerConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;

/// A CA that issues server certificates for the mock resolver.
pub struct TestPki {
    ca_cert: rcgen::Certificate,
    ca_key: KeyPair,
}

impl TestPki {
    pub fn new() -> Self {
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.distinguished_name.push(DnType::CommonName, "dot-proxy test CA");
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let ca_key = KeyPair::generate().unwrap();
        let ca_cert = params.self_signed(&ca_key).unwrap();
        Self { ca_cert, ca_key }
    }

    /// Trust store containing only this CA.
    pub fn roots(&self) -> RootCertStore {
        let mut roots = RootCertStore::empty();
        roots.add(self.ca_cert.der().clone()).unwrap();
        roots
    }

    /// PEM encoding of the CA certificate, for `ca_file` tests.
    pub fn ca_pem(&self) -> String {
        self.ca_cert.pem()
    }

    /// Server TLS config presenting a leaf valid for `names`.
    pub fn server_config(&self, names: &[&str]) -> Arc<ServerConfig> {
        let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
        let mut params = CertificateParams::new(names).unwrap();
        params.distinguished_name.push(DnType::CommonName, "mock resolver");
        let key = KeyPair::generate().unwrap();
        let cert = params.signed_by(&key, &self.ca_cert, &self.ca_key).unwrap();

        let key_der = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key.serialize_der()));
        let config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(vec![cert.der().clone()], key_der)
            .unwrap();
        Arc::new(config)
    }
}

/// Decides what the mock resolver sends back for a query payload.
/// `None` closes the connection without answering.
pub type Responder = Arc<dyn Fn(&[u8]) -> Option<Vec<u8>> + Send + Sync>;

/// A DoT resolver on loopback that records everything it sees.
pub struct MockUpstream {
    pub addr: SocketAddr,
    /// Raw frames received (prefix included), one per completed query.
    pub received: Arc<Mutex<Vec<Vec<u8>>>>,
    /// TCP connections accepted, whether or not TLS succeeded.
    pub connections: Arc<AtomicUsize>,
    pub handshake_failures: Arc<AtomicUsize>,
}

/// What the mock resolver does once it has read a query.
#[derive(Clone)]
enum Behaviour {
    Answer(Responder),
    /// Hold the connection open without ever answering.
    Stall,
}

impl MockUpstream {
    pub async fn start(tls: Arc<ServerConfig>, responder: Responder) -> Self {
        Self::spawn(tls, Behaviour::Answer(responder)).await
    }

    /// A resolver that completes the handshake, reads the query and then
    /// says nothing until the proxy hangs up.
    pub async fn stalling(tls: Arc<ServerConfig>) -> Self {
        Self::spawn(tls, Behaviour::Stall).await
    }

    async fn spawn(tls: Arc<ServerConfig>, behaviour: Behaviour) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let acceptor = TlsAcceptor::from(tls);

        let received = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));
        let handshake_failures = Arc::new(AtomicUsize::new(0));

        let (rec, conns, failures) = (
            Arc::clone(&received),
            Arc::clone(&connections),
            Arc::clone(&handshake_failures),
        );
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    continue;
                };
                conns.fetch_add(1, Ordering::SeqCst);
                let acceptor = acceptor.clone();
                let behaviour = behaviour.clone();
                let rec = Arc::clone(&rec);
                let failures = Arc::clone(&failures);

                tokio::spawn(async move {
                    let mut tls = match acceptor.accept(stream).await {
                        Ok(tls) => tls,
                        Err(_) => {
                            failures.fetch_add(1, Ordering::SeqCst);
                            return;
                        }
                    };
                    let Ok(Some(query)) = read_frame(&mut tls).await else {
                        return;
                    };
                    rec.lock().unwrap().push(encode_frame(&query).unwrap());
                    match behaviour {
                        Behaviour::Answer(responder) => {
                            if let Some(body) = responder(&query) {
                                let _ = write_frame(&mut tls, &body).await;
                            }
                        }
                        Behaviour::Stall => {
                            let mut rest = Vec::new();
                            let _ = tls.read_to_end(&mut rest).await;
                            return;
                        }
                    }
                    let _ = tls.shutdown().await;
                });
            }
        });

        Self {
            addr,
            received,
            connections,
            handshake_failures,
        }
    }

    pub fn received(&self) -> Vec<Vec<u8>> {
        self.received.lock().unwrap().clone()
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn handshake_failures(&self) -> usize {
        self.handshake_failures.load(Ordering::SeqCst)
    }

    /// Wait until `check` holds or a second has passed.
    pub async fn wait_for(&self, check: impl Fn(&Self) -> bool) -> bool {
        for _ in 0..100 {
            if check(self) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        check(self)
    }
}

/// Limits with a short deadline so failure paths finish quickly.
pub fn test_limits(io_timeout: Duration) -> LimitsConfig {
    LimitsConfig {
        io_timeout_ms: io_timeout.as_millis() as u64,
        ..Default::default()
    }
}

pub fn connector(
    upstream: SocketAddr,
    tls_name: &str,
    roots: RootCertStore,
    io_timeout: Duration,
) -> UpstreamConnector {
    UpstreamConnector::with_roots(
        upstream.to_string(),
        ServerName::try_from(tls_name.to_string()).unwrap(),
        roots,
        io_timeout,
    )
}

/// Run the proxy on an ephemeral loopback port; returns its address.
pub async fn start_proxy(connector: UpstreamConnector, limits: LimitsConfig) -> SocketAddr {
    let config = Config {
        listen: "127.0.0.1:0".parse().unwrap(),
        limits,
        ..Default::default()
    };
    let ctx = SessionContext::new(connector, &config.limits);
    let listener = Listener::bind(&config, ctx).unwrap();
    let addr = listener.local_addr();
    tokio::spawn(listener.run());
    addr
}

/// Everything the proxy sends before closing. A reset counts as closed.
pub async fn read_until_closed(stream: &mut TcpStream) -> Vec<u8> {
    let mut buf = Vec::new();
    match stream.read_to_end(&mut buf).await {
        Ok(_) => buf,
        Err(e) if matches!(
            e.kind(),
            std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::BrokenPipe
        ) => buf,
        Err(e) => panic!("client read failed: {e}"),
    }
}

/// Send one framed query through the proxy and collect the reply bytes.
///
/// A refused connection may be closed before the write lands; that reads as
/// an empty reply.
pub async fn exchange(proxy: SocketAddr, query: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(proxy).await.unwrap();
    if stream.write_all(&encode_frame(query).unwrap()).await.is_err() {
        return Vec::new();
    }
    read_until_closed(&mut stream).await
}
