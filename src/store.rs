use std::{collections::HashMap, sync::Mutex, time::Duration};

use async_trait::async_trait;
use tokio::time::Instant;

use crate::{
    cache::{CacheStore, KeyTtl},
    error::BackendError,
};

/// In-process volatile store with absolute per-key expiry.
#[derive(Debug, Default)]
pub struct MemoryCache {
    data: Mutex<HashMap<String, StoreValue>>,
}

#[derive(Debug)]
struct StoreValue {
    data: String,
    expires_at: Option<Instant>,
}

impl StoreValue {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(deadline) if now >= deadline)
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store without an expiry.
    pub fn set(&self, key: &str, value: &str) {
        self.lock().insert(
            key.to_string(),
            StoreValue {
                data: value.to_string(),
                expires_at: None,
            },
        );
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, StoreValue>> {
        // A poisoned map still holds consistent entries.
        self.data.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn purge_expired(data: &mut HashMap<String, StoreValue>, now: Instant) {
        data.retain(|_, value| !value.is_expired(now));
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn ping(&self) -> Result<(), BackendError> {
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        let now = Instant::now();
        let mut data = self.lock();
        match data.get(key) {
            Some(value) if !value.is_expired(now) => return Ok(Some(value.data.clone())),
            Some(_) => {}
            None => return Ok(None),
        }
        data.remove(key);
        Ok(None)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), BackendError> {
        let deadline = Instant::now()
            .checked_add(ttl)
            .ok_or_else(|| BackendError::Command(format!("expiry {ttl:?} out of range")))?;
        let value = StoreValue {
            data: value.to_string(),
            expires_at: Some(deadline),
        };
        self.lock().insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, BackendError> {
        let now = Instant::now();
        Ok(matches!(self.lock().remove(key), Some(value) if !value.is_expired(now)))
    }

    async fn len(&self) -> Result<u64, BackendError> {
        let mut data = self.lock();
        Self::purge_expired(&mut data, Instant::now());
        Ok(data.len() as u64)
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl, BackendError> {
        let now = Instant::now();
        Ok(match self.lock().get(key) {
            None => KeyTtl::Missing,
            Some(value) => match value.expires_at {
                None => KeyTtl::Persistent,
                Some(deadline) if now >= deadline => KeyTtl::Missing,
                Some(deadline) => KeyTtl::Expires(deadline - now),
            },
        })
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
