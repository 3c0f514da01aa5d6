// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! Plain TCP listener that hands each client to its own session task.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::Semaphore;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::Config;
use crate::error::StartupError;
use crate::session::{Session, SessionContext, SessionOutcome};

/// Pause after a failed accept so a persistent error (e.g. EMFILE) does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

pub struct Listener {
    listener: TcpListener,
    local_addr: SocketAddr,
    ctx: Arc<SessionContext>,
    permits: Arc<Semaphore>,
    max_sessions: usize,
}

impl Listener {
    /// Bind the listen address with the configured backlog.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn bind(config: &Config, ctx: SessionContext) -> Result<Self, StartupError> {
        let addr = config.listen;
        let bind_error = |source| StartupError::Bind { addr, source };

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(bind_error)?;
        #[cfg(unix)]
        socket.set_reuseaddr(true).map_err(bind_error)?;
        socket.bind(addr).map_err(bind_error)?;
        let listener = socket.listen(config.backlog).map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;

        let max_sessions = config.limits.max_sessions;
        Ok(Self {
            listener,
            local_addr,
            ctx: Arc::new(ctx),
            permits: Arc::new(Semaphore::new(max_sessions)),
            max_sessions,
        })
    }

    /// The bound address, with the real port when 0 was requested.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections forever.
    pub async fn run(self) {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Accept connections until `shutdown` resolves. Sessions already running
    /// are left to finish on their own.
    pub async fn run_until<F: Future<Output = ()>>(self, shutdown: F) {
        info!(
            listen = %self.local_addr,
            upstream = %self.ctx.connector.address(),
            server_name = %self.ctx.connector.server_name(),
            max_sessions = self.max_sessions,
            "listening on {}", self.local_addr
        );

        tokio::pin!(shutdown);
        let mut next_id: u64 = 0;

        loop {
            let (stream, peer) = tokio::select! {
                _ = &mut shutdown => {
                    info!("listener stopped");
                    return;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok(v) => v,
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                        continue;
                    }
                },
            };

            let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() else {
                warn!(
                    peer = %peer,
                    limit = self.max_sessions,
                    "session limit reached; refusing connection"
                );
                drop(stream);
                continue;
            };

            next_id += 1;
            let session = Session::new(next_id, peer, Arc::clone(&self.ctx));
            let span = info_span!("session", id = session.id(), peer = %session.peer());

            tokio::spawn(
                async move {
                    let _permit = permit;
                    match session.run(stream).await {
                        Ok(SessionOutcome::ClientClosed) => {
                            debug!("session ended: client idle close")
                        }
                        Ok(SessionOutcome::Relayed { .. }) => debug!("session complete"),
                        Err(e) => e.log(),
                    }
                }
                .instrument(span),
            );
        }
    }
}
