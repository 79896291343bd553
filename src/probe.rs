//! Backend reachability and topology classification.

use std::{fmt, sync::Arc, time::Duration};

use serde::Serialize;
use tokio::time::timeout;

use crate::{cache::CacheStore, document::DocumentStore};

const TRACING_TARGET: &str = "hosts_gateway::probe";

pub const DURABLE_TIMEOUT: Duration = Duration::from_secs(5);
pub const VOLATILE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    Available,
    Unavailable,
    Degraded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topology {
    Clustered,
    SingleNode,
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topology::Clustered => write!(f, "clustered"),
            Topology::SingleNode => write!(f, "single-node"),
        }
    }
}

/// Result of one probe. Not retained across probes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendStatus {
    pub availability: Availability,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topology: Option<Topology>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub shards: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl BackendStatus {
    pub fn available() -> Self {
        Self {
            availability: Availability::Available,
            topology: None,
            shards: Vec::new(),
            message: None,
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            availability: Availability::Unavailable,
            message: Some(message.into()),
            ..Self::available()
        }
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self {
            availability: Availability::Degraded,
            message: Some(message.into()),
            ..Self::available()
        }
    }

    fn with_topology(mut self, topology: Topology, shards: Vec<String>) -> Self {
        self.topology = Some(topology);
        self.shards = shards;
        self
    }

    pub fn is_available(&self) -> bool {
        self.availability == Availability::Available
    }
}

impl fmt::Display for BackendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let availability = match self.availability {
            Availability::Available => "available",
            Availability::Unavailable => "unavailable",
            Availability::Degraded => "degraded",
        };
        match self.topology {
            Some(topology) => write!(f, "{availability} ({topology})"),
            None => write!(f, "{availability}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub durable: BackendStatus,
    pub volatile: BackendStatus,
}

impl HealthReport {
    /// Stable one-line description for diagnostic output.
    pub fn summary(&self) -> String {
        format!("durable: {}, volatile: {}", self.durable, self.volatile)
    }
}

/// Probes both backends with bounded timeouts.
#[derive(Clone)]
pub struct Probe {
    durable: Arc<dyn DocumentStore>,
    volatile: Arc<dyn CacheStore>,
    durable_timeout: Duration,
    volatile_timeout: Duration,
}

impl Probe {
    pub fn new(durable: Arc<dyn DocumentStore>, volatile: Arc<dyn CacheStore>) -> Self {
        Self {
            durable,
            volatile,
            durable_timeout: DURABLE_TIMEOUT,
            volatile_timeout: VOLATILE_TIMEOUT,
        }
    }

    pub fn with_timeouts(mut self, durable: Duration, volatile: Duration) -> Self {
        self.durable_timeout = durable;
        self.volatile_timeout = volatile;
        self
    }

    /// Liveness first, then a classification query that only a sharded
    /// deployment answers. Its failure just means single-node.
    pub async fn probe_durable(&self) -> BackendStatus {
        let limit = self.durable_timeout;
        match timeout(limit, self.durable.ping()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return BackendStatus::unavailable(e.to_string()),
            Err(_) => return BackendStatus::unavailable(format!("no answer within {limit:?}")),
        }

        match timeout(limit, self.durable.list_shards()).await {
            Ok(Ok(shards)) => BackendStatus::available().with_topology(Topology::Clustered, shards),
            Ok(Err(e)) => {
                tracing::debug!(target: TRACING_TARGET, reason = %e, "not a sharded deployment");
                BackendStatus::available().with_topology(Topology::SingleNode, Vec::new())
            }
            Err(_) => BackendStatus::degraded(format!(
                "topology query did not answer within {limit:?}"
            )),
        }
    }

    pub async fn probe_volatile(&self) -> BackendStatus {
        let limit = self.volatile_timeout;
        match timeout(limit, self.volatile.ping()).await {
            Ok(Err(e)) if e.is_unreachable() => BackendStatus::unavailable(e.to_string()),
            Ok(_) => BackendStatus::available(),
            Err(_) => BackendStatus::unavailable(format!("no answer within {limit:?}")),
        }
    }

    pub async fn run(&self) -> HealthReport {
        let (durable, volatile) = tokio::join!(self.probe_durable(), self.probe_volatile());
        let report = HealthReport { durable, volatile };
        tracing::info!(
            target: TRACING_TARGET,
            durable = %self.durable.describe(),
            volatile = %self.volatile.describe(),
            summary = %report.summary(),
            "backend probe complete"
        );
        report
    }
}
