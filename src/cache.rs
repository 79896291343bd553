//! Volatile store interface.
//!
//! The gateway only needs a handful of operations from the cache tier, so
//! both the in-process store and the RESP client sit behind [`CacheStore`].

use std::time::Duration;

use async_trait::async_trait;

use crate::error::BackendError;

/// Remaining lifetime of a key, mirroring the `TTL` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    Missing,
    Persistent,
    Expires(Duration),
}

impl KeyTtl {
    /// Decode the integer reply of `TTL`.
    pub fn from_reply(n: i64) -> Self {
        match n {
            -2 => KeyTtl::Missing,
            -1 => KeyTtl::Persistent,
            n if n >= 0 => KeyTtl::Expires(Duration::from_secs(n as u64)),
            _ => KeyTtl::Missing,
        }
    }
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn ping(&self) -> Result<(), BackendError>;

    async fn get(&self, key: &str) -> Result<Option<String>, BackendError>;

    /// Store `value` under `key`, expiring `ttl` after this call.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), BackendError>;

    /// Delete `key`, returning whether it existed.
    async fn delete(&self, key: &str) -> Result<bool, BackendError>;

    /// Number of live keys.
    async fn len(&self) -> Result<u64, BackendError>;

    async fn ttl(&self, key: &str) -> Result<KeyTtl, BackendError>;

    /// Short label for logs and diagnostics.
    fn describe(&self) -> String;
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::KeyTtl;

    #[test]
    fn ttl_reply_codes() {
        assert_eq!(KeyTtl::from_reply(-2), KeyTtl::Missing);
        assert_eq!(KeyTtl::from_reply(-1), KeyTtl::Persistent);
        assert_eq!(
            KeyTtl::from_reply(299),
            KeyTtl::Expires(Duration::from_secs(299))
        );
    }
}
