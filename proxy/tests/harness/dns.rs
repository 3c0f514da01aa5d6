// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! DNS message builders for the mock resolver.

use std::net::Ipv4Addr;

use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::{rdata::A, Name, RData, Record, RecordType};
use hickory_proto::serialize::binary::{BinDecodable, BinEncodable};

pub fn query(id: u16, domain: &str) -> Vec<u8> {
    let mut message = Message::new();
    message.set_id(id);
    message.set_message_type(MessageType::Query);
    message.set_op_code(OpCode::Query);
    message.set_recursion_desired(true);
    message.add_query(Query::query(Name::from_ascii(domain).unwrap(), RecordType::A));
    message.to_vec().unwrap()
}

/// Answer a query with one A record, keeping its ID and question.
pub fn answer(query: &[u8], addr: Ipv4Addr) -> Vec<u8> {
    let request = Message::from_vec(query).unwrap();
    let mut response = Message::new();
    response.set_id(request.id());
    response.set_message_type(MessageType::Response);
    response.set_op_code(OpCode::Query);
    response.set_recursion_desired(true);
    response.set_recursion_available(true);
    response.set_response_code(ResponseCode::NoError);
    for q in request.queries() {
        response.add_query(q.clone());
        response.add_answer(Record::from_rdata(q.name().clone(), 300, RData::A(A(addr))));
    }
    response.to_vec().unwrap()
}

pub fn id_of(message: &[u8]) -> u16 {
    Message::from_vec(message).unwrap().id()
}

pub fn first_name(message: &[u8]) -> String {
    Message::from_vec(message).unwrap().queries()[0].name().to_ascii()
}
