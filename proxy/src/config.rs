// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! Configuration for the DoT proxy.
//!
//! Values come from an optional TOML file and are then overridden by command
//! line flags in the binary. Defaults match a local stub forwarding to
//! Cloudflare's DoT endpoint.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rustls::pki_types::ServerName;
use serde::{Deserialize, Serialize};

use crate::error::StartupError;

/// Smallest response a DoT upstream can legitimately send.
const MIN_RESPONSE_LIMIT: usize = dot_common::qname::HEADER_LEN;

/// Top-level proxy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Plain TCP listen address (default: 0.0.0.0:53)
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Accept backlog handed to listen(2) (default: 128)
    #[serde(default = "default_backlog")]
    pub backlog: u32,

    /// Upstream resolver settings
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Per-session limits
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Logging output
    #[serde(default)]
    pub log: LogConfig,
}

/// Upstream DoT resolver and how to authenticate it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Resolver address as host:port (default: 1.1.1.1:853)
    #[serde(default = "default_upstream")]
    pub address: String,

    /// Name the certificate must be valid for. Defaults to the host part of
    /// `address`; an IP address there is checked against IP SANs.
    #[serde(default)]
    pub tls_name: Option<String>,

    /// Extra PEM trust anchors, e.g. a private resolver's CA
    #[serde(default)]
    pub ca_file: Option<PathBuf>,

    /// Trust the operating system's certificate store (default: true)
    #[serde(default = "default_true")]
    pub system_roots: bool,
}

/// Limits applied to every session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Deadline for each blocking step of a session, in milliseconds (default: 10000)
    #[serde(default = "default_io_timeout_ms")]
    pub io_timeout_ms: u64,

    /// Concurrent sessions before new connections are refused (default: 256)
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Largest upstream response accepted, excluding the length prefix (default: 65535)
    #[serde(default = "default_max_response_size")]
    pub max_response_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default level when RUST_LOG is unset (default: info)
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 53))
}

fn default_backlog() -> u32 {
    128
}

fn default_upstream() -> String {
    "1.1.1.1:853".to_string()
}

fn default_true() -> bool {
    true
}

fn default_io_timeout_ms() -> u64 {
    10_000
}

fn default_max_sessions() -> usize {
    256
}

fn default_max_response_size() -> usize {
    dot_common::MAX_PAYLOAD
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            backlog: default_backlog(),
            upstream: UpstreamConfig::default(),
            limits: LimitsConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            address: default_upstream(),
            tls_name: None,
            ca_file: None,
            system_roots: default_true(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            io_timeout_ms: default_io_timeout_ms(),
            max_sessions: default_max_sessions(),
            max_response_size: default_max_response_size(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self, StartupError> {
        let text = std::fs::read_to_string(path).map_err(|source| StartupError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| StartupError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reject settings the proxy cannot run with.
    pub fn validate(&self) -> Result<(), StartupError> {
        if self.backlog == 0 {
            return Err(StartupError::Invalid("backlog must be at least 1".into()));
        }
        if self.limits.io_timeout_ms == 0 {
            return Err(StartupError::Invalid("io_timeout_ms must be positive".into()));
        }
        if self.limits.max_sessions == 0 {
            return Err(StartupError::Invalid("max_sessions must be at least 1".into()));
        }
        if self.limits.max_response_size < MIN_RESPONSE_LIMIT {
            return Err(StartupError::Invalid(format!(
                "max_response_size must be at least {MIN_RESPONSE_LIMIT}"
            )));
        }
        if self.upstream.address.trim().is_empty() {
            return Err(StartupError::Invalid("upstream address is empty".into()));
        }
        if self.upstream.port().is_none() {
            return Err(StartupError::Invalid(format!(
                "upstream address {:?} needs a port, e.g. {}:853",
                self.upstream.address,
                self.upstream.host()
            )));
        }
        if self.log.level.trim().parse::<tracing::Level>().is_err() {
            return Err(StartupError::Invalid(format!(
                "unknown log level {:?} (expected trace, debug, info, warn or error)",
                self.log.level
            )));
        }
        self.upstream.server_name()?;
        Ok(())
    }
}

impl UpstreamConfig {
    /// The host part of `address`, without port or IPv6 brackets.
    pub fn host(&self) -> &str {
        let addr = self.address.trim();
        if let Some(rest) = addr.strip_prefix('[') {
            return rest.split(']').next().unwrap_or(rest);
        }
        match addr.rsplit_once(':') {
            Some((host, port)) if !host.contains(':') && port.parse::<u16>().is_ok() => host,
            _ => addr,
        }
    }

    /// The port part of `address`, if there is one.
    pub fn port(&self) -> Option<u16> {
        let addr = self.address.trim();
        let port = match addr.strip_prefix('[') {
            Some(rest) => rest.split_once("]:")?.1,
            None => {
                let (host, port) = addr.rsplit_once(':')?;
                if host.contains(':') {
                    return None;
                }
                port
            }
        };
        port.parse().ok()
    }

    /// Name the upstream certificate is verified against.
    pub fn server_name(&self) -> Result<ServerName<'static>, StartupError> {
        let name = self.tls_name.as_deref().unwrap_or_else(|| self.host());
        ServerName::try_from(name.to_string())
            .map_err(|_| StartupError::InvalidServerName(name.to_string()))
    }
}

impl LimitsConfig {
    /// Get the per-step I/O deadline
    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }
}
