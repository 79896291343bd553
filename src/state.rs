use std::sync::Arc;

use crate::{
    cache::CacheStore,
    config::{Config, Environment},
    dataset::{Dataset, DatasetRegistry, HOSTS},
    document::{DocumentStore, MemoryDocumentStore},
    gateway::Gateway,
    probe::{HealthReport, Probe},
    redis::RedisCache,
    store::MemoryCache,
};

const TRACING_TARGET: &str = "hosts_gateway::state";

/// Everything a request handler needs, fixed once startup completes.
pub struct State {
    pub gateway: Gateway,
    pub probe: Probe,
    /// Backend status as observed at startup. Not refreshed.
    pub startup: HealthReport,
    pub environment: Environment,
    pub hostname: String,
}

impl State {
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let durable = durable_store(config).await?;

        let volatile: Arc<dyn CacheStore> = match &config.redis_host {
            Some(host) => Arc::new(RedisCache::new(host, config.redis_port)),
            None => {
                tracing::info!(target: TRACING_TARGET, "no REDIS_HOST, caching in process");
                Arc::new(MemoryCache::new())
            }
        };

        let mut state = State::assemble(durable, volatile, config.environment).await;
        state.gateway = state.gateway.with_ttl(config.cache_ttl());
        Ok(state)
    }

    /// Probe both backends once and wire the gateway from the outcome: a
    /// volatile store that is unreachable now stays bypassed for the life
    /// of the process.
    pub async fn assemble(
        durable: Arc<dyn DocumentStore>,
        volatile: Arc<dyn CacheStore>,
        environment: Environment,
    ) -> Self {
        let probe = Probe::new(durable.clone(), volatile.clone());
        let startup = probe.run().await;

        let cache = if startup.volatile.is_available() {
            Some(volatile)
        } else {
            tracing::warn!(
                target: TRACING_TARGET,
                status = %startup.volatile,
                "volatile store unavailable at startup, serving from the durable store only"
            );
            None
        };

        let datasets = DatasetRegistry::new().with(Dataset::hosts());
        State {
            gateway: Gateway::new(durable, cache, datasets),
            probe,
            startup,
            environment,
            hostname: hostname(),
        }
    }
}

async fn durable_store(config: &Config) -> anyhow::Result<Arc<dyn DocumentStore>> {
    #[cfg(feature = "mongodb")]
    if let Some(uri) = &config.mongo_uri {
        let store = crate::mongo::MongoDocumentStore::connect(
            uri,
            &config.mongo_database,
            crate::probe::DURABLE_TIMEOUT,
        )
        .await
        .map_err(|e| anyhow::anyhow!("invalid MONGO_URI: {e}"))?;
        return Ok(Arc::new(store));
    }

    let mut store = MemoryDocumentStore::new();
    if let Some(path) = &config.seed_file {
        store = store.load_seed(path, HOSTS)?;
        tracing::info!(
            target: TRACING_TARGET,
            seed = %path.display(),
            "seeded in-memory durable store"
        );
    }
    Ok(Arc::new(store))
}

/// The pod name inside Kubernetes.
fn hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| std::fs::read_to_string("/proc/sys/kernel/hostname").ok())
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}
