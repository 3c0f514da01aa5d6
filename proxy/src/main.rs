// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// DoT Proxy: plain TCP DNS in, DNS-over-TLS out
//
// Listens for length-prefixed DNS queries from local clients (port 53 by
// default) and forwards each over a verified TLS connection to an upstream
// resolver (1.1.1.1:853 by default).
//
// RFC 1035 Section 4.2.2: DNS over TCP framing
// RFC 7858: DNS over TLS

use anyhow::Context;
use clap::Parser;
use dot_proxy::cli::Args;
use dot_proxy::telemetry;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = args.into_config().context("invalid configuration")?;

    telemetry::init(&config.log);
    info!(
        listen = %config.listen,
        upstream = %config.upstream.address,
        io_timeout_ms = config.limits.io_timeout_ms,
        max_sessions = config.limits.max_sessions,
        "starting DoT proxy"
    );

    dot_proxy::start(&config, shutdown_signal())
        .await
        .context("DoT proxy failed to start")?;

    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("interrupt received, no longer accepting connections"),
        Err(e) => {
            warn!(error = %e, "cannot listen for interrupt; running until killed");
            std::future::pending::<()>().await;
        }
    }
}
