// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// DNS-over-TCP / DNS-over-TLS framing: 2-byte big-endian length prefix + payload
// (RFC 1035 Section 4.2.2, RFC 7858 Section 3.3).

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest payload a 16-bit length prefix can declare.
pub const MAX_PAYLOAD: usize = u16::MAX as usize;

/// Size of the length prefix on the wire.
pub const PREFIX_LEN: usize = 2;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame truncated: expected {expected} bytes, received {received}")]
    Truncated { expected: usize, received: usize },

    #[error("zero-length message")]
    Empty,

    #[error("payload too large: {len} > {max}")]
    TooLarge { len: usize, max: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Encode a payload as `[2 bytes: big-endian length] [N bytes: payload]`.
///
/// Any length a `u16` can express is accepted, including zero.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    let len = u16::try_from(payload.len()).map_err(|_| FrameError::TooLarge {
        len: payload.len(),
        max: MAX_PAYLOAD,
    })?;

    let mut wire = Vec::with_capacity(PREFIX_LEN + payload.len());
    wire.extend_from_slice(&len.to_be_bytes());
    wire.extend_from_slice(payload);
    Ok(wire)
}

/// Split one frame off the front of an in-memory buffer.
///
/// Returns `(payload, rest)`.
pub fn decode_frame(wire: &[u8]) -> Result<(&[u8], &[u8]), FrameError> {
    if wire.len() < PREFIX_LEN {
        return Err(FrameError::Truncated {
            expected: PREFIX_LEN,
            received: wire.len(),
        });
    }

    let len = u16::from_be_bytes([wire[0], wire[1]]) as usize;
    let body = &wire[PREFIX_LEN..];
    if body.len() < len {
        return Err(FrameError::Truncated {
            expected: len,
            received: body.len(),
        });
    }

    Ok(body.split_at(len))
}

/// Read until `buf` is full or the peer closes. Returns the number of bytes read.
async fn fill<R: AsyncRead + Unpin>(stream: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = stream.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Read the 2-byte length prefix.
///
/// `Ok(None)` means the peer closed before sending anything, which is an
/// ordinary end of conversation rather than a framing fault.
pub async fn read_length_prefix<R: AsyncRead + Unpin>(
    stream: &mut R,
) -> Result<Option<u16>, FrameError> {
    let mut len_buf = [0u8; PREFIX_LEN];
    match fill(stream, &mut len_buf).await? {
        0 => Ok(None),
        PREFIX_LEN => Ok(Some(u16::from_be_bytes(len_buf))),
        received => Err(FrameError::Truncated {
            expected: PREFIX_LEN,
            received,
        }),
    }
}

/// Read exactly `len` payload bytes, tolerating arbitrarily fragmented reads.
pub async fn read_payload<R: AsyncRead + Unpin>(
    stream: &mut R,
    len: usize,
) -> Result<Vec<u8>, FrameError> {
    let mut buf = vec![0u8; len];
    let received = fill(stream, &mut buf).await?;
    if received < len {
        return Err(FrameError::Truncated {
            expected: len,
            received,
        });
    }
    Ok(buf)
}

/// Read a length-prefixed DNS message from a stream.
///
/// Returns `Ok(None)` on a clean close before the prefix. A declared length
/// of zero is rejected since a DNS message always carries a 12-byte header.
pub async fn read_frame<R: AsyncRead + Unpin>(
    stream: &mut R,
) -> Result<Option<Vec<u8>>, FrameError> {
    let Some(len) = read_length_prefix(stream).await? else {
        return Ok(None);
    };
    if len == 0 {
        return Err(FrameError::Empty);
    }
    read_payload(stream, len as usize).await.map(Some)
}

/// Write a length-prefixed message to a stream and flush it.
///
/// Prefix and payload go out in a single write so a TLS transport emits
/// them in one record.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    stream: &mut W,
    payload: &[u8],
) -> Result<(), FrameError> {
    let wire = encode_frame(payload)?;
    stream.write_all(&wire).await?;
    stream.flush().await?;
    Ok(())
}
