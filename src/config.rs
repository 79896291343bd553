use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use serde::Serialize;

/// Longest accepted cache lifetime: one year.
pub const MAX_CACHE_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// Service configuration, from flags or the environment.
///
/// Without `MONGO_URI` records live in process memory, optionally seeded
/// from `SEED_FILE`. Without `REDIS_HOST` the cache tier is in process too.
#[derive(Debug, Clone, Parser)]
#[command(name = "hosts-gateway", version, about)]
pub struct Config {
    /// Address to bind the HTTP server to.
    #[arg(long, env = "HTTP_HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    #[arg(short = 'p', long, env = "PORT", default_value_t = 5000)]
    pub port: u16,

    /// Durable store connection string, e.g. `mongodb://mongo-0.mongo:27017/?replicaSet=rs0`.
    #[arg(long, env = "MONGO_URI")]
    pub mongo_uri: Option<String>,

    #[arg(long, env = "MONGO_DATABASE", default_value = "demoDB")]
    pub mongo_database: String,

    /// Volatile store host.
    #[arg(long, env = "REDIS_HOST")]
    pub redis_host: Option<String>,

    #[arg(long, env = "REDIS_PORT", default_value_t = crate::redis::DEFAULT_PORT)]
    pub redis_port: u16,

    /// Deployment environment label: dev, test or prod.
    #[arg(long, env = "ENVIRONMENT", default_value = "dev")]
    pub environment: Environment,

    /// Lifetime of a cached dataset, in seconds.
    #[arg(long, env = "CACHE_TTL", default_value_t = 300)]
    pub cache_ttl: u64,

    /// JSON records loaded into the in-memory durable store.
    #[arg(long = "seed", env = "SEED_FILE")]
    pub seed_file: Option<PathBuf>,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.cache_ttl == 0 {
            anyhow::bail!("cache ttl must be at least one second");
        }
        if self.cache_ttl > MAX_CACHE_TTL_SECS {
            anyhow::bail!(
                "cache ttl of {}s exceeds the maximum of {MAX_CACHE_TTL_SECS}s",
                self.cache_ttl
            );
        }
        if self.mongo_uri.is_some() && !cfg!(feature = "mongodb") {
            anyhow::bail!("MONGO_URI is set but this build has no mongodb support");
        }
        if self.mongo_uri.is_some() && self.seed_file.is_some() {
            anyhow::bail!("a seed file only applies to the in-memory durable store");
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl)
    }
}

#[derive(Debug, Hash, PartialEq, Eq, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Test,
    Prod,
}

impl Environment {
    pub fn deserialize(s: &str) -> anyhow::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Dev),
            "test" | "staging" => Ok(Environment::Test),
            "prod" | "production" => Ok(Environment::Prod),
            other => anyhow::bail!("unknown environment {other:?}"),
        }
    }

    pub fn serialize(&self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Test => "test",
            Environment::Prod => "prod",
        }
    }

    /// Which architecture the diagnostic page describes.
    pub fn architecture(&self) -> &'static str {
        match self {
            Environment::Dev => "single pod, in-process stores",
            Environment::Test => "replicated pods behind a service, rebuilt on every push",
            Environment::Prod => "replicated pods, sharded document store, shared cache",
        }
    }
}

impl FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Environment::deserialize(s)
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.serialize())
    }
}
