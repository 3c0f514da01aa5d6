// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! Error types for the DoT proxy.
//!
//! [`SessionError`] covers everything that can end a single client session.
//! None of it escapes the session task. [`StartupError`] covers configuration
//! and binding, where failures are fatal.

use std::fmt;
use std::path::PathBuf;

use dot_common::FrameError;
use tracing::{error, warn};

/// The blocking step a session was in when its deadline expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    ClientRead,
    UpstreamConnect,
    TlsHandshake,
    UpstreamWrite,
    UpstreamRead,
    ClientWrite,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ClientRead => "client_read",
            Self::UpstreamConnect => "upstream_connect",
            Self::TlsHandshake => "tls_handshake",
            Self::UpstreamWrite => "upstream_write",
            Self::UpstreamRead => "upstream_read",
            Self::ClientWrite => "client_write",
        })
    }
}

/// Reasons a session is aborted.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("malformed framing from client: {0}")]
    MalformedFraming(FrameError),

    #[error("could not connect to upstream {upstream}: {source}")]
    UpstreamConnect {
        upstream: String,
        #[source]
        source: std::io::Error,
    },

    #[error("TLS handshake with {server_name} failed: {source}")]
    TlsHandshake {
        server_name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out during {phase}")]
    Timeout { phase: Phase },

    #[error("upstream closed after {received} bytes, before a complete response")]
    UpstreamClosedEarly { received: usize },

    #[error("upstream response of {len} bytes exceeds limit of {limit}")]
    ResponseTooLarge { len: usize, limit: usize },

    #[error("upstream I/O error: {0}")]
    UpstreamIo(#[source] std::io::Error),

    #[error("writing to client failed: {0}")]
    ClientWrite(#[source] std::io::Error),
}

impl SessionError {
    /// Short stable label used as the `kind` field in log events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedFraming(_) => "malformed_framing",
            Self::UpstreamConnect { .. } => "upstream_connect",
            Self::TlsHandshake { .. } => "tls_handshake",
            Self::Timeout { .. } => "timeout",
            Self::UpstreamClosedEarly { .. } => "upstream_closed_early",
            Self::ResponseTooLarge { .. } => "response_too_large",
            Self::UpstreamIo(_) => "upstream_io",
            Self::ClientWrite(_) => "client_write",
        }
    }

    /// Emit this error at the severity its kind warrants.
    ///
    /// Client-side faults are warnings; anything that stops the relay on the
    /// upstream side is an error. TLS failures are flagged separately since
    /// they may indicate the upstream path is being intercepted.
    pub fn log(&self) {
        match self {
            Self::MalformedFraming(_) => {
                warn!(kind = self.kind(), error = %self, "session aborted")
            }
            Self::Timeout { phase } => warn!(kind = self.kind(), %phase, "timeout during {phase}"),
            Self::TlsHandshake { server_name, .. } => error!(
                kind = self.kind(),
                server_name = %server_name,
                possible_interception = true,
                error = %self,
                "upstream failed TLS verification; query not forwarded"
            ),
            _ => error!(kind = self.kind(), error = %self, "session aborted"),
        }
    }
}

impl From<FrameError> for SessionError {
    fn from(err: FrameError) -> Self {
        Self::MalformedFraming(err)
    }
}

/// Configuration and bind errors. Any of these aborts the process.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("invalid TLS server name {0:?}")]
    InvalidServerName(String),

    #[error("failed to load CA certificates from {path}: {source}")]
    CaFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no trust anchors available for upstream verification")]
    NoTrustAnchors,

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },
}
