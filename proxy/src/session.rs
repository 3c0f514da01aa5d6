// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! One client connection, start to finish.
//!
//! A session reads a single framed query from the client, opens its own
//! verified TLS connection upstream, forwards the query unmodified and relays
//! exactly one framed response back. Sessions share nothing mutable.
//!
//! Only one response frame is read from upstream. Reading a fixed-size chunk
//! instead would cut off any response larger than the chunk, and reading until
//! end of stream depends on the resolver closing promptly, which DoT servers
//! (RFC 7858 Section 3.4) are not required to do.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dot_common::protocol::{encode_frame, read_length_prefix, read_payload, PREFIX_LEN};
use dot_common::{extract_question, read_frame, FrameError};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, trace};

use crate::config::LimitsConfig;
use crate::error::{Phase, SessionError};
use crate::upstream::UpstreamConnector;

/// Shared, read-only inputs every session needs.
pub struct SessionContext {
    pub connector: UpstreamConnector,
    pub io_timeout: Duration,
    pub max_response_size: usize,
}

impl SessionContext {
    pub fn new(connector: UpstreamConnector, limits: &LimitsConfig) -> Self {
        Self {
            connector,
            io_timeout: limits.io_timeout(),
            max_response_size: limits.max_response_size,
        }
    }
}

/// How a session ended when nothing went wrong.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The client closed without sending a byte.
    ClientClosed,
    /// One query was forwarded and its response delivered.
    Relayed {
        /// `None` when the question name could not be decoded.
        domain: Option<String>,
        /// Response payload size, excluding the length prefix.
        response_len: usize,
    },
}

pub struct Session {
    id: u64,
    peer: SocketAddr,
    ctx: Arc<SessionContext>,
}

impl Session {
    pub fn new(id: u64, peer: SocketAddr, ctx: Arc<SessionContext>) -> Self {
        Self { id, peer, ctx }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Run the full relay cycle and close the client connection.
    ///
    /// The upstream stream is owned by the relay step and is closed before
    /// the client is, on every path.
    pub async fn run<C>(self, mut client: C) -> Result<SessionOutcome, SessionError>
    where
        C: AsyncRead + AsyncWrite + Unpin,
    {
        let result = self.relay(&mut client).await;

        if let Ok(Err(e)) = tokio::time::timeout(self.ctx.io_timeout, client.shutdown()).await {
            trace!(error = %e, "client shutdown failed");
        }
        result
    }

    async fn relay<C>(&self, client: &mut C) -> Result<SessionOutcome, SessionError>
    where
        C: AsyncRead + AsyncWrite + Unpin,
    {
        let Some(query) = self.within(Phase::ClientRead, read_frame(client)).await?? else {
            debug!("client closed without sending a query");
            return Ok(SessionOutcome::ClientClosed);
        };

        let domain = match extract_question(&query) {
            Ok(question) => {
                info!(
                    len = query.len(),
                    qtype = ?question.record_type,
                    "query received for {}",
                    question.name
                );
                Some(question.name)
            }
            Err(e) => {
                info!(len = query.len(), reason = %e, "query received for <unparseable>");
                None
            }
        };
        let label = domain.as_deref().unwrap_or("<unparseable>");

        let mut upstream = self.ctx.connector.connect().await?;

        // Same bytes the client sent: prefix and body, untouched.
        let wire = encode_frame(&query)?;
        self.within(Phase::UpstreamWrite, async {
            upstream.write_all(&wire).await?;
            upstream.flush().await
        })
        .await?
        .map_err(SessionError::UpstreamIo)?;

        let response = self
            .within(
                Phase::UpstreamRead,
                read_response(&mut upstream, self.ctx.max_response_size),
            )
            .await??;

        // close_notify to the resolver; its connection is done either way.
        if let Ok(Err(e)) = tokio::time::timeout(self.ctx.io_timeout, upstream.shutdown()).await {
            trace!(error = %e, "upstream shutdown failed");
        }
        drop(upstream);

        self.within(Phase::ClientWrite, async {
            client.write_all(&response).await?;
            client.flush().await
        })
        .await?
        .map_err(SessionError::ClientWrite)?;

        let response_len = response.len() - PREFIX_LEN;
        info!(response_len, "response relayed for {label}");
        Ok(SessionOutcome::Relayed {
            domain,
            response_len,
        })
    }

    /// Bound `fut` by the I/O deadline, reporting `phase` if it expires.
    async fn within<F: Future>(&self, phase: Phase, fut: F) -> Result<F::Output, SessionError> {
        tokio::time::timeout(self.ctx.io_timeout, fut)
            .await
            .map_err(|_| SessionError::Timeout { phase })
    }
}

/// Read one framed response from upstream. Returns it re-framed, ready to
/// write to the client.
async fn read_response<S>(upstream: &mut S, limit: usize) -> Result<Vec<u8>, SessionError>
where
    S: AsyncRead + Unpin,
{
    let len = match read_length_prefix(upstream).await {
        Ok(Some(len)) => len as usize,
        Ok(None) => return Err(SessionError::UpstreamClosedEarly { received: 0 }),
        Err(e) => return Err(upstream_frame_error(e, 0)),
    };
    if len > limit {
        return Err(SessionError::ResponseTooLarge { len, limit });
    }

    let body = read_payload(upstream, len)
        .await
        .map_err(|e| upstream_frame_error(e, PREFIX_LEN))?;
    trace!(len, "received upstream response");
    Ok(encode_frame(&body)?)
}

/// `offset` is how many bytes of the response were consumed before the
/// failing read.
fn upstream_frame_error(err: FrameError, offset: usize) -> SessionError {
    match err {
        FrameError::Truncated { received, .. } => SessionError::UpstreamClosedEarly {
            received: offset + received,
        },
        // TLS peers that drop TCP without close_notify surface as UnexpectedEof.
        FrameError::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            SessionError::UpstreamClosedEarly { received: offset }
        }
        FrameError::Io(e) => SessionError::UpstreamIo(e),
        other => SessionError::UpstreamIo(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            other,
        )),
    }
}
