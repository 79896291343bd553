//! Durable store interface and the in-process document store.

use std::{
    collections::HashMap,
    io,
    path::Path,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        RwLock,
    },
};

use anyhow::Context;
use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::BackendError;

/// A schemaless document as stored by the durable tier.
pub type Record = Map<String, Value>;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Lightweight liveness command.
    async fn ping(&self) -> Result<(), BackendError>;

    /// Shard names of a sharded deployment. Fails on anything else.
    async fn list_shards(&self) -> Result<Vec<String>, BackendError>;

    async fn find_all(&self, collection: &str) -> Result<Vec<Record>, BackendError>;

    async fn insert(&self, collection: &str, record: Record) -> Result<(), BackendError>;

    /// Delete the first record whose `field` equals `value`.
    async fn delete(&self, collection: &str, field: &str, value: &str)
        -> Result<bool, BackendError>;

    fn describe(&self) -> String;
}

/// Document store held in process memory.
///
/// Stands in for the database when none is configured, and lets tests
/// simulate outages and sharded deployments.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    collections: RwLock<HashMap<String, Vec<Record>>>,
    shards: Option<Vec<String>>,
    offline: AtomicBool,
    reads: AtomicUsize,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report a sharded topology with the given shard names.
    pub fn with_shards(mut self, shards: Vec<String>) -> Self {
        self.shards = Some(shards);
        self
    }

    pub fn with_records(self, collection: &str, records: Vec<Record>) -> Self {
        self.write()
            .entry(collection.to_string())
            .or_default()
            .extend(records);
        self
    }

    /// Load records from a JSON file. A top-level array goes to
    /// `default_collection`; an object maps collection names to arrays.
    pub fn load_seed(self, path: &Path, default_collection: &str) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read seed file {}", path.display()))?;
        let value: Value = serde_json::from_str(&text)
            .with_context(|| format!("seed file {} is not valid JSON", path.display()))?;

        let mut store = self;
        match value {
            Value::Array(items) => {
                store = store.with_records(default_collection, objects(items)?);
            }
            Value::Object(map) => {
                for (collection, items) in map {
                    let Value::Array(items) = items else {
                        anyhow::bail!("seed collection {collection:?} must be an array");
                    };
                    store = store.with_records(&collection, objects(items)?);
                }
            }
            _ => anyhow::bail!("seed file must hold an array or an object of arrays"),
        }
        Ok(store)
    }

    /// Simulate the database going away or coming back.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of `find_all` calls served so far.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> Result<(), BackendError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(BackendError::Unreachable(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "durable store offline",
            )))
        } else {
            Ok(())
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Vec<Record>>> {
        self.collections.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Vec<Record>>> {
        self.collections.write().unwrap_or_else(|e| e.into_inner())
    }
}

fn objects(items: Vec<Value>) -> anyhow::Result<Vec<Record>> {
    items
        .into_iter()
        .map(|item| match item {
            Value::Object(record) => Ok(record),
            other => Err(anyhow::anyhow!("seed record must be an object, got {other}")),
        })
        .collect()
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn ping(&self) -> Result<(), BackendError> {
        self.check_online()
    }

    async fn list_shards(&self) -> Result<Vec<String>, BackendError> {
        self.check_online()?;
        self.shards
            .clone()
            .ok_or_else(|| BackendError::Command("listShards requires a sharded cluster".into()))
    }

    async fn find_all(&self, collection: &str) -> Result<Vec<Record>, BackendError> {
        self.check_online()?;
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.read().get(collection).cloned().unwrap_or_default())
    }

    async fn insert(&self, collection: &str, record: Record) -> Result<(), BackendError> {
        self.check_online()?;
        self.write()
            .entry(collection.to_string())
            .or_default()
            .push(record);
        Ok(())
    }

    async fn delete(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<bool, BackendError> {
        self.check_online()?;
        let mut collections = self.write();
        let Some(records) = collections.get_mut(collection) else {
            return Ok(false);
        };
        match records
            .iter()
            .position(|record| record.get(field).and_then(Value::as_str) == Some(value))
        {
            Some(index) => {
                records.remove(index);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serde_json::json;

    use super::{DocumentStore, MemoryDocumentStore, Record};

    fn record(value: serde_json::Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn insert_find_delete() {
        let store = MemoryDocumentStore::new();
        assert!(store.find_all("hosts").await.unwrap().is_empty());

        store
            .insert("hosts", record(json!({"pod": "pod-a", "info": "ready"})))
            .await
            .unwrap();
        let records = store.find_all("hosts").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["pod"], "pod-a");

        assert!(store.delete("hosts", "pod", "pod-a").await.unwrap());
        assert!(!store.delete("hosts", "pod", "pod-a").await.unwrap());
        assert_eq!(store.read_count(), 2);
    }

    #[tokio::test]
    async fn offline_store_is_unreachable() {
        let store = MemoryDocumentStore::new();
        store.set_offline(true);
        assert!(store.ping().await.unwrap_err().is_unreachable());
        assert!(store.find_all("hosts").await.is_err());

        store.set_offline(false);
        assert!(store.ping().await.is_ok());
    }

    #[tokio::test]
    async fn shards_only_when_sharded() {
        let single = MemoryDocumentStore::new();
        assert!(single.list_shards().await.is_err());

        let sharded = MemoryDocumentStore::new().with_shards(vec!["rs0".into(), "rs1".into()]);
        assert_eq!(sharded.list_shards().await.unwrap(), vec!["rs0", "rs1"]);
    }

    #[tokio::test]
    async fn load_seed_array_and_object() {
        let dir = std::env::temp_dir();

        let array_path = dir.join(format!("hosts-seed-array-{}.json", std::process::id()));
        let mut file = std::fs::File::create(&array_path).unwrap();
        write!(file, r#"[{{"pod": "pod-a", "info": "ready"}}]"#).unwrap();
        let store = MemoryDocumentStore::new()
            .load_seed(&array_path, "hosts")
            .unwrap();
        assert_eq!(store.find_all("hosts").await.unwrap().len(), 1);

        let object_path = dir.join(format!("hosts-seed-object-{}.json", std::process::id()));
        let mut file = std::fs::File::create(&object_path).unwrap();
        write!(file, r#"{{"nodes": [{{"name": "n1"}}, {{"name": "n2"}}]}}"#).unwrap();
        let store = MemoryDocumentStore::new()
            .load_seed(&object_path, "hosts")
            .unwrap();
        assert_eq!(store.find_all("nodes").await.unwrap().len(), 2);

        let bad_path = dir.join(format!("hosts-seed-bad-{}.json", std::process::id()));
        std::fs::write(&bad_path, "[1, 2]").unwrap();
        assert!(MemoryDocumentStore::new()
            .load_seed(&bad_path, "hosts")
            .is_err());

        for path in [array_path, object_path, bad_path] {
            let _ = std::fs::remove_file(path);
        }
    }
}
