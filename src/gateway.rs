//! Read-through cache gateway.
//!
//! Each dataset is served from the volatile store when a live entry exists,
//! and otherwise read in full from the durable store, mapped to
//! [`HostEntry`] values and written back with a fixed time to live.
//!
//! Concurrent misses on the same key are not coalesced: each one reads the
//! durable store and the last write back wins. The payloads are expected to
//! be identical, so this only costs redundant reads.

use std::{fmt, sync::Arc, time::Duration};

use serde::Serialize;

use crate::{
    cache::{CacheStore, KeyTtl},
    dataset::{Dataset, DatasetRegistry, HostEntry},
    document::DocumentStore,
    error::GatewayError,
};

const TRACING_TARGET: &str = "hosts_gateway::gateway";

pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Which tier produced a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Cache,
    Database,
    Error,
}

impl Source {
    /// Value of the `X-Cache` response header.
    pub fn header_value(&self) -> &'static str {
        match self {
            Source::Cache => "HIT",
            Source::Database => "MISS",
            Source::Error => "ERROR",
        }
    }
}

/// A serialized dataset and the tier that answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    /// JSON array of [`HostEntry`].
    pub payload: String,
    pub source: Source,
}

impl Fetched {
    pub fn entries(&self) -> Result<Vec<HostEntry>, GatewayError> {
        Ok(serde_json::from_str(&self.payload)?)
    }
}

/// Outcome of an invalidation. Never an error for backend reasons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invalidation {
    Removed,
    Absent,
    Unavailable,
    Failed(String),
}

impl Invalidation {
    pub fn succeeded(&self) -> bool {
        matches!(self, Invalidation::Removed | Invalidation::Absent)
    }
}

impl fmt::Display for Invalidation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Invalidation::Removed => write!(f, "cache cleared"),
            Invalidation::Absent => write!(f, "cache already empty"),
            Invalidation::Unavailable => write!(f, "cache unavailable, nothing to clear"),
            Invalidation::Failed(message) => write!(f, "cache clear failed: {message}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatus {
    pub available: bool,
    pub entry_count: u64,
    /// Seconds until the dataset entry expires, `-1` when there is none.
    pub ttl_remaining: i64,
}

impl CacheStatus {
    pub const ABSENT_TTL: i64 = -1;

    fn unavailable() -> Self {
        Self {
            available: false,
            entry_count: 0,
            ttl_remaining: Self::ABSENT_TTL,
        }
    }
}

pub struct Gateway {
    durable: Arc<dyn DocumentStore>,
    /// `None` when the volatile store was unreachable at startup.
    volatile: Option<Arc<dyn CacheStore>>,
    datasets: DatasetRegistry,
    ttl: Duration,
}

impl Gateway {
    pub fn new(
        durable: Arc<dyn DocumentStore>,
        volatile: Option<Arc<dyn CacheStore>>,
        datasets: DatasetRegistry,
    ) -> Self {
        Self {
            durable,
            volatile,
            datasets,
            ttl: DEFAULT_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn datasets(&self) -> &DatasetRegistry {
        &self.datasets
    }

    pub fn durable(&self) -> &Arc<dyn DocumentStore> {
        &self.durable
    }

    pub fn cache_enabled(&self) -> bool {
        self.volatile.is_some()
    }

    pub async fn fetch(&self, name: &str) -> Result<Fetched, GatewayError> {
        let dataset = self.datasets.resolve(name)?;
        let key = dataset.cache_key();

        if let Some(cached) = self.lookup(&key).await {
            tracing::debug!(target: TRACING_TARGET, dataset = name, "cache hit");
            return Ok(Fetched {
                payload: cached,
                source: Source::Cache,
            });
        }

        let payload = match self.load(dataset).await {
            Ok(payload) => payload,
            Err(message) => {
                tracing::error!(
                    target: TRACING_TARGET,
                    dataset = name,
                    error = %message,
                    "durable read failed"
                );
                let payload = serde_json::to_string(&[HostEntry::new("Error", message)])?;
                return Ok(Fetched {
                    payload,
                    source: Source::Error,
                });
            }
        };

        if let Some(cache) = &self.volatile {
            match cache.set_ex(&key, &payload, self.ttl).await {
                Ok(()) => tracing::debug!(
                    target: TRACING_TARGET,
                    dataset = name,
                    ttl_secs = self.ttl.as_secs(),
                    "cache repopulated"
                ),
                Err(e) => tracing::warn!(
                    target: TRACING_TARGET,
                    dataset = name,
                    error = %e,
                    "cache write failed"
                ),
            }
        }

        Ok(Fetched {
            payload,
            source: Source::Database,
        })
    }

    /// A live, well-formed cache entry. Anything else counts as a miss.
    async fn lookup(&self, key: &str) -> Option<String> {
        let cache = self.volatile.as_ref()?;
        match cache.get(key).await {
            Ok(Some(payload)) => match serde_json::from_str::<Vec<HostEntry>>(&payload) {
                Ok(_) => Some(payload),
                Err(e) => {
                    tracing::warn!(
                        target: TRACING_TARGET,
                        key,
                        error = %e,
                        "malformed cache entry"
                    );
                    None
                }
            },
            Ok(None) => {
                tracing::debug!(target: TRACING_TARGET, key, "cache miss");
                None
            }
            Err(e) => {
                tracing::warn!(target: TRACING_TARGET, key, error = %e, "cache read failed");
                None
            }
        }
    }

    async fn load(&self, dataset: &Dataset) -> Result<String, String> {
        let records = self
            .durable
            .find_all(&dataset.collection)
            .await
            .map_err(|e| format!("durable store read failed: {e}"))?;
        let entries: Vec<HostEntry> = records.iter().map(|r| dataset.to_entry(r)).collect();
        serde_json::to_string(&entries).map_err(|e| e.to_string())
    }

    pub async fn invalidate(&self, name: &str) -> Result<Invalidation, GatewayError> {
        let key = self.datasets.resolve(name)?.cache_key();
        let Some(cache) = &self.volatile else {
            return Ok(Invalidation::Unavailable);
        };
        let outcome = match cache.delete(&key).await {
            Ok(true) => Invalidation::Removed,
            Ok(false) => Invalidation::Absent,
            Err(e) if e.is_unreachable() => Invalidation::Unavailable,
            Err(e) => Invalidation::Failed(e.to_string()),
        };
        tracing::info!(
            target: TRACING_TARGET,
            dataset = name,
            outcome = %outcome,
            "cache invalidation"
        );
        Ok(outcome)
    }

    pub async fn cache_status(&self, name: &str) -> Result<CacheStatus, GatewayError> {
        let key = self.datasets.resolve(name)?.cache_key();
        let Some(cache) = &self.volatile else {
            return Ok(CacheStatus::unavailable());
        };
        if let Err(e) = cache.ping().await {
            tracing::debug!(target: TRACING_TARGET, error = %e, "cache liveness check failed");
            return Ok(CacheStatus::unavailable());
        }

        let entry_count = cache.len().await.unwrap_or(0);
        let ttl_remaining = match cache.ttl(&key).await {
            Ok(KeyTtl::Expires(remaining)) => remaining.as_secs() as i64,
            // Never written by the gateway, but present.
            Ok(KeyTtl::Persistent) => i64::MAX,
            Ok(KeyTtl::Missing) | Err(_) => CacheStatus::ABSENT_TTL,
        };
        Ok(CacheStatus {
            available: true,
            entry_count,
            ttl_remaining,
        })
    }
}
