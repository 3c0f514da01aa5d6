// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! DoT Proxy
//!
//! Accepts classic length-prefixed DNS queries over plain TCP and relays each
//! one to a DNS-over-TLS resolver (RFC 7858), returning the resolver's answer
//! to the client:
//!
//! - One task per client connection, nothing shared between sessions
//! - A fresh, fully verified TLS connection upstream per session
//! - Every blocking step bounded by a deadline
//! - A cap on concurrent sessions; connections beyond it are refused

use std::future::Future;

pub mod cli;
pub mod config;
pub mod error;
pub mod listener;
pub mod session;
pub mod telemetry;
pub mod upstream;

pub use config::Config;
pub use error::{Phase, SessionError, StartupError};
pub use listener::Listener;
pub use session::{Session, SessionContext, SessionOutcome};
pub use upstream::UpstreamConnector;

/// Validate `config`, bind, and serve until `shutdown` resolves.
///
/// Only startup can fail; errors inside sessions are logged and contained.
pub async fn start<F>(config: &Config, shutdown: F) -> Result<(), StartupError>
where
    F: Future<Output = ()>,
{
    config.validate()?;
    let connector = UpstreamConnector::from_config(&config.upstream, config.limits.io_timeout())?;
    let ctx = SessionContext::new(connector, &config.limits);
    let listener = Listener::bind(config, ctx)?;
    listener.run_until(shutdown).await;
    Ok(())
}
