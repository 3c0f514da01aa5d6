// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! Command line flags. Flags override the config file, which overrides defaults.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::config::{Config, LogFormat};
use crate::error::StartupError;

#[derive(Debug, Parser)]
#[command(
    name = "dot-proxy",
    version,
    about = "Forward plain TCP DNS queries to a DNS-over-TLS resolver"
)]
pub struct Args {
    /// TOML configuration file
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Listen address for plain TCP DNS clients [default: 0.0.0.0:53]
    #[arg(long)]
    pub listen: Option<SocketAddr>,

    /// Upstream DoT resolver as host:port [default: 1.1.1.1:853]
    #[arg(long)]
    pub upstream: Option<String>,

    /// Name the upstream certificate must match (defaults to the upstream host)
    #[arg(long)]
    pub tls_name: Option<String>,

    /// Extra PEM CA certificates to trust for the upstream
    #[arg(long)]
    pub ca_file: Option<PathBuf>,

    /// Do not trust the operating system's certificate store
    #[arg(long)]
    pub no_system_roots: bool,

    /// Per-step I/O deadline (e.g. "10s", "500ms", "2m") [default: 10s]
    #[arg(long, value_parser = parse_duration)]
    pub timeout: Option<Duration>,

    /// Maximum concurrent sessions [default: 256]
    #[arg(long)]
    pub max_sessions: Option<usize>,

    /// Accept backlog [default: 128]
    #[arg(long)]
    pub backlog: Option<u32>,

    /// Largest upstream response in bytes [default: 65535]
    #[arg(long)]
    pub max_response_size: Option<usize>,

    /// Log level when RUST_LOG is unset [default: info]
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log output format
    #[arg(long, value_enum)]
    pub log_format: Option<LogFormat>,
}

impl Args {
    /// Resolve the effective, validated configuration.
    pub fn into_config(self) -> Result<Config, StartupError> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        self.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    fn apply(self, config: &mut Config) {
        if let Some(listen) = self.listen {
            config.listen = listen;
        }
        if let Some(upstream) = self.upstream {
            config.upstream.address = upstream;
        }
        if let Some(name) = self.tls_name {
            config.upstream.tls_name = Some(name);
        }
        if let Some(path) = self.ca_file {
            config.upstream.ca_file = Some(path);
        }
        if self.no_system_roots {
            config.upstream.system_roots = false;
        }
        if let Some(timeout) = self.timeout {
            config.limits.io_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        }
        if let Some(max) = self.max_sessions {
            config.limits.max_sessions = max;
        }
        if let Some(backlog) = self.backlog {
            config.backlog = backlog;
        }
        if let Some(size) = self.max_response_size {
            config.limits.max_response_size = size;
        }
        if let Some(level) = self.log_level {
            config.log.level = level;
        }
        if let Some(format) = self.log_format {
            config.log.format = format;
        }
    }
}

/// Parse "500ms", "10s", "2m", "1h", or a bare number of seconds.
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        let ms: u64 = ms.parse().map_err(|e| format!("invalid milliseconds: {e}"))?;
        Ok(Duration::from_millis(ms))
    } else if let Some(secs) = s.strip_suffix('s') {
        let secs: u64 = secs.parse().map_err(|e| format!("invalid seconds: {e}"))?;
        Ok(Duration::from_secs(secs))
    } else if let Some(mins) = s.strip_suffix('m') {
        let m: u64 = mins.parse().map_err(|e| format!("invalid minutes: {e}"))?;
        let secs = m.checked_mul(60).ok_or("duration too large")?;
        Ok(Duration::from_secs(secs))
    } else if let Some(hours) = s.strip_suffix('h') {
        let h: u64 = hours.parse().map_err(|e| format!("invalid hours: {e}"))?;
        let secs = h.checked_mul(3600).ok_or("duration too large")?;
        Ok(Duration::from_secs(secs))
    } else {
        let secs: u64 = s.parse().map_err(|e| format!("invalid duration: {e}"))?;
        Ok(Duration::from_secs(secs))
    }
}
