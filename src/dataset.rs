use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{document::Record, error::GatewayError};

pub const HOSTS: &str = "hosts";

pub const UNKNOWN_ID: &str = "Unknown";
pub const NO_INFO: &str = "No info";

/// Wire shape of every dataset entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostEntry {
    pub id: String,
    pub info: String,
}

impl HostEntry {
    pub fn new(id: impl Into<String>, info: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            info: info.into(),
        }
    }
}

/// A named view over one durable collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    pub name: String,
    pub collection: String,
    /// Durable field exposed as `id`.
    pub id_field: String,
    /// Durable field exposed as `info`.
    pub info_field: String,
}

impl Dataset {
    pub fn new(name: &str, collection: &str, id_field: &str, info_field: &str) -> Self {
        Self {
            name: name.to_string(),
            collection: collection.to_string(),
            id_field: id_field.to_string(),
            info_field: info_field.to_string(),
        }
    }

    /// The pod list, keyed by pod name.
    pub fn hosts() -> Self {
        Self::new(HOSTS, "hosts", "pod", "info")
    }

    pub fn cache_key(&self) -> String {
        format!("{}_data", self.name)
    }

    pub fn to_entry(&self, record: &Record) -> HostEntry {
        HostEntry {
            id: display(record.get(&self.id_field)).unwrap_or_else(|| UNKNOWN_ID.to_string()),
            info: display(record.get(&self.info_field)).unwrap_or_else(|| NO_INFO.to_string()),
        }
    }

    pub fn to_record(&self, entry: &HostEntry) -> Record {
        let mut record = Record::new();
        record.insert(self.id_field.clone(), Value::String(entry.id.clone()));
        record.insert(self.info_field.clone(), Value::String(entry.info.clone()));
        record
    }
}

/// Scalars render as text; objects, arrays and null count as missing.
fn display(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// The datasets the gateway knows how to serve.
#[derive(Debug, Clone, Default)]
pub struct DatasetRegistry {
    datasets: HashMap<String, Dataset>,
}

impl DatasetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, dataset: Dataset) -> Self {
        self.datasets.insert(dataset.name.clone(), dataset);
        self
    }

    pub fn resolve(&self, name: &str) -> Result<&Dataset, GatewayError> {
        self.datasets
            .get(name)
            .ok_or_else(|| GatewayError::NotFound(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.datasets.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
