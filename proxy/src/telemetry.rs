// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! Process-wide tracing subscriber, installed once at startup.

use tracing::level_filters::LevelFilter;
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{LogConfig, LogFormat};

/// Install the global subscriber. `RUST_LOG` takes precedence over the
/// configured level.
pub fn init(log: &LogConfig) {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(default_level(&log.level)).into())
        .from_env_lossy();

    let registry = tracing_subscriber::registry().with(filter);
    match log.format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Text => registry.with(fmt::layer().with_target(false)).init(),
    }
}

fn default_level(level: &str) -> Level {
    level.trim().parse::<Level>().unwrap_or(Level::INFO)
}
