// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// DoT Common: wire framing and question decoding shared by the proxy
//
//   protocol: 2-byte big-endian length prefix framing (RFC 1035 4.2.2, RFC 7858 3.3)
//   qname:    best-effort question name extraction for log output

pub mod protocol;
pub mod qname;

pub use protocol::{read_frame, write_frame, FrameError, MAX_PAYLOAD};
pub use qname::{extract_domain_name, extract_question, QnameError, Question};
