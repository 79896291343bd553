//! Minimal RESP client for a Redis-compatible volatile store.
//!
//! Every command opens its own connection, bounded by a connect timeout and
//! an operation timeout. Nothing is retried: a failed attempt is reported to
//! the caller, which falls through to the next tier.

use std::{io, time::Duration};

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::TcpStream,
    time::timeout,
};

use crate::{
    cache::{CacheStore, KeyTtl},
    command::{Command, Reply},
    error::BackendError,
    resp_value::RespError,
};

const TRACING_TARGET: &str = "hosts_gateway::redis";

pub const DEFAULT_PORT: u16 = 6379;
/// Applied to both connect and the request/reply exchange.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct RedisCache {
    addr: String,
    connect_timeout: Duration,
    operation_timeout: Duration,
}

impl RedisCache {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            addr: format!("{host}:{port}"),
            connect_timeout: DEFAULT_TIMEOUT,
            operation_timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeouts(mut self, connect: Duration, operation: Duration) -> Self {
        self.connect_timeout = connect;
        self.operation_timeout = operation;
        self
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn connect(&self) -> Result<TcpStream, BackendError> {
        match timeout(self.connect_timeout, TcpStream::connect(&self.addr)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(BackendError::Unreachable(e)),
            Err(_) => Err(BackendError::Timeout(self.connect_timeout)),
        }
    }

    async fn execute(&self, command: Command) -> Result<Reply, BackendError> {
        let mut stream = self.connect().await?;
        let result = match timeout(self.operation_timeout, round_trip(&mut stream, &command)).await
        {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout(self.operation_timeout)),
        };
        if let Err(e) = &result {
            tracing::debug!(
                target: TRACING_TARGET,
                addr = %self.addr,
                command = command.name(),
                error = %e,
                "volatile store command failed"
            );
        }
        result
    }
}

/// Write one command and read exactly one reply, accumulating partial frames.
pub async fn round_trip<S>(stream: &mut S, command: &Command) -> Result<Reply, BackendError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut output_buf = BytesMut::with_capacity(512);
    command.serialize(&mut output_buf);
    stream.write_all(&output_buf).await?;

    let mut input_buf = BytesMut::with_capacity(512);
    loop {
        if stream.read_buf(&mut input_buf).await? == 0 {
            return Err(BackendError::Unreachable(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed before reply",
            )));
        }
        match Reply::deserialize(&input_buf) {
            Ok((Reply::Error(message), _)) => return Err(BackendError::Command(message)),
            Ok((reply, _)) => return Ok(reply),
            Err(RespError::Incomplete) => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

fn unexpected(command: &str, reply: Reply) -> BackendError {
    BackendError::Command(format!("unexpected reply to {command}: {reply:?}"))
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn ping(&self) -> Result<(), BackendError> {
        match self.execute(Command::Ping).await? {
            Reply::Pong => Ok(()),
            reply => Err(unexpected("PING", reply)),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        match self.execute(Command::Get { key: key.into() }).await? {
            Reply::Bulk(value) => Ok(value),
            reply => Err(unexpected("GET", reply)),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), BackendError> {
        let command = Command::SetEx {
            key: key.into(),
            value: value.into(),
            ttl,
        };
        match self.execute(command).await? {
            Reply::Ok => Ok(()),
            reply => Err(unexpected("SET", reply)),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, BackendError> {
        match self.execute(Command::Del { key: key.into() }).await? {
            Reply::Integer(n) => Ok(n > 0),
            reply => Err(unexpected("DEL", reply)),
        }
    }

    async fn len(&self) -> Result<u64, BackendError> {
        match self.execute(Command::DbSize).await? {
            Reply::Integer(n) => Ok(n.max(0) as u64),
            reply => Err(unexpected("DBSIZE", reply)),
        }
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl, BackendError> {
        match self.execute(Command::Ttl { key: key.into() }).await? {
            Reply::Integer(n) => Ok(KeyTtl::from_reply(n)),
            reply => Err(unexpected("TTL", reply)),
        }
    }

    fn describe(&self) -> String {
        format!("redis://{}", self.addr)
    }
}
