// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Best-effort question decoding for log output.
//
// Only the first question name is read, starting right after the fixed
// 12-byte header. Nothing here is trusted for forwarding decisions: the proxy
// relays the original bytes whether or not this succeeds.

use std::fmt;

use hickory_proto::rr::RecordType;

/// Fixed DNS header size (RFC 1035 Section 4.1.1).
pub const HEADER_LEN: usize = 12;

/// Offset of QDCOUNT within the header.
const QDCOUNT_OFFSET: usize = 4;

/// Labels are at most 63 octets; the top two bits select the label type.
const MAX_LABEL_LEN: u8 = 63;
const POINTER_MASK: u8 = 0xC0;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QnameError {
    #[error("message shorter than DNS header ({len} < 12 bytes)")]
    ShortHeader { len: usize },

    #[error("message carries no question")]
    NoQuestion,

    #[error("label at offset {offset} runs past end of message")]
    LabelOverrun { offset: usize },

    #[error("label at offset {offset} is not valid text")]
    InvalidLabel { offset: usize },

    #[error("compression pointer at offset {offset} in question name")]
    CompressedName { offset: usize },

    #[error("question name has no terminating root label")]
    Unterminated,
}

/// The first question of a query, as far as it could be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub name: String,
    /// Absent when the message ends right after the name.
    pub record_type: Option<RecordType>,
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.record_type {
            Some(rtype) => write!(f, "{} {}", self.name, rtype),
            None => f.write_str(&self.name),
        }
    }
}

/// Extract the dot-joined question name from a raw DNS message.
///
/// `[7]example[3]com[0]` yields `"example.com"`; the root name yields `"."`.
pub fn extract_domain_name(message: &[u8]) -> Result<String, QnameError> {
    parse_name(message).map(|(name, _)| name)
}

/// Extract the question name and, when present, its QTYPE.
pub fn extract_question(message: &[u8]) -> Result<Question, QnameError> {
    let (name, end) = parse_name(message)?;
    let record_type = message
        .get(end..end + 2)
        .map(|b| RecordType::from(u16::from_be_bytes([b[0], b[1]])));
    Ok(Question { name, record_type })
}

/// Returns the decoded name and the offset just past its root label.
fn parse_name(message: &[u8]) -> Result<(String, usize), QnameError> {
    if message.len() < HEADER_LEN {
        return Err(QnameError::ShortHeader { len: message.len() });
    }
    let qdcount = u16::from_be_bytes([message[QDCOUNT_OFFSET], message[QDCOUNT_OFFSET + 1]]);
    if qdcount == 0 {
        return Err(QnameError::NoQuestion);
    }

    let mut labels: Vec<&str> = Vec::new();
    let mut pos = HEADER_LEN;
    loop {
        let len = *message.get(pos).ok_or(QnameError::Unterminated)?;
        if len == 0 {
            pos += 1;
            break;
        }
        if len & POINTER_MASK == POINTER_MASK {
            return Err(QnameError::CompressedName { offset: pos });
        }
        if len > MAX_LABEL_LEN {
            return Err(QnameError::InvalidLabel { offset: pos });
        }

        let start = pos + 1;
        let end = start + len as usize;
        let raw = message
            .get(start..end)
            .ok_or(QnameError::LabelOverrun { offset: pos })?;
        let label = std::str::from_utf8(raw).map_err(|_| QnameError::InvalidLabel { offset: pos })?;
        labels.push(label);
        pos = end;
    }

    let name = if labels.is_empty() {
        ".".to_string()
    } else {
        labels.join(".")
    };
    Ok((name, pos))
}
