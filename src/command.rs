use std::time::Duration;

use bytes::BytesMut;

use crate::resp_value::{RespError, RespValue};

/// Requests sent to the volatile store.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Ping,
    Get {
        key: String,
    },
    SetEx {
        key: String,
        value: String,
        ttl: Duration,
    },
    Del {
        key: String,
    },
    DbSize,
    Ttl {
        key: String,
    },
}

impl Command {
    pub fn serialize(&self, buf: &mut BytesMut) {
        let request_value = match self {
            Command::Ping => RespValue::Array(vec![RespValue::BulkString("PING")]),
            Command::Get { key } => RespValue::Array(vec![
                RespValue::BulkString("GET"),
                RespValue::BulkString(key),
            ]),
            Command::SetEx { key, value, ttl } => RespValue::Array(vec![
                RespValue::BulkString("SET"),
                RespValue::BulkString(key),
                RespValue::BulkString(value),
                RespValue::BulkString("EX"),
                // EX rejects zero, so sub-second ttls round up
                RespValue::OwnedBulkString(ttl.as_secs().max(1).to_string()),
            ]),
            Command::Del { key } => RespValue::Array(vec![
                RespValue::BulkString("DEL"),
                RespValue::BulkString(key),
            ]),
            Command::DbSize => RespValue::Array(vec![RespValue::BulkString("DBSIZE")]),
            Command::Ttl { key } => RespValue::Array(vec![
                RespValue::BulkString("TTL"),
                RespValue::BulkString(key),
            ]),
        };
        request_value.serialize(buf);
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Ping => "PING",
            Command::Get { .. } => "GET",
            Command::SetEx { .. } => "SET",
            Command::Del { .. } => "DEL",
            Command::DbSize => "DBSIZE",
            Command::Ttl { .. } => "TTL",
        }
    }
}

/// Owned reply decoded from the volatile store, detached from the read buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Pong,
    Ok,
    Integer(i64),
    Bulk(Option<String>),
    Error(String),
}

impl Reply {
    /// Decode a single reply, returning it and the number of bytes consumed.
    pub fn deserialize(data: &[u8]) -> Result<(Self, usize), RespError> {
        let (value, rest) = RespValue::deserialize(data)?;
        let consumed = data.len() - rest.len();
        let reply = match value {
            RespValue::SimpleString(s) => match s.to_ascii_lowercase().as_str() {
                "pong" => Reply::Pong,
                "ok" => Reply::Ok,
                _ => Reply::Bulk(Some(s.to_owned())),
            },
            RespValue::SimpleError(s) => Reply::Error(s.to_owned()),
            RespValue::Integer(n) => Reply::Integer(n),
            RespValue::BulkString(s) => Reply::Bulk(Some(s.to_owned())),
            RespValue::OwnedBulkString(s) => Reply::Bulk(Some(s)),
            RespValue::NullBulkString | RespValue::Null => Reply::Bulk(None),
            RespValue::Array(_) | RespValue::NullArray => {
                return Err(RespError::Invalid("unexpected array reply"))
            }
        };
        Ok((reply, consumed))
    }
}
