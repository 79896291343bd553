//! MongoDB-backed durable store.

use std::{io, time::Duration};

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, Bson, Document},
    options::ClientOptions,
    Client, Database,
};
use serde_json::Value;

use crate::{
    document::{DocumentStore, Record},
    error::BackendError,
};

pub struct MongoDocumentStore {
    client: Client,
    database: Database,
}

impl MongoDocumentStore {
    /// Build a client; no connection is made until the first command.
    pub async fn connect(
        uri: &str,
        database: &str,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let mut options = ClientOptions::parse(uri).await.map_err(driver_error)?;
        options.server_selection_timeout = Some(timeout);
        options.connect_timeout = Some(timeout);
        let client = Client::with_options(options).map_err(driver_error)?;
        let database = client.database(database);
        Ok(Self {
            client,
            database,
        })
    }
}

fn driver_error(e: mongodb::error::Error) -> BackendError {
    use mongodb::error::ErrorKind;

    match e.kind.as_ref() {
        ErrorKind::ServerSelection { .. } | ErrorKind::Io(_) => BackendError::Unreachable(
            io::Error::new(io::ErrorKind::ConnectionRefused, e.to_string()),
        ),
        _ => BackendError::Command(e.to_string()),
    }
}

fn to_record(document: Document) -> Record {
    match Bson::Document(document).into_relaxed_extjson() {
        Value::Object(record) => record,
        _ => Record::new(),
    }
}

#[async_trait]
impl DocumentStore for MongoDocumentStore {
    async fn ping(&self) -> Result<(), BackendError> {
        self.database
            .run_command(doc! { "ping": 1 })
            .await
            .map(|_| ())
            .map_err(driver_error)
    }

    async fn list_shards(&self) -> Result<Vec<String>, BackendError> {
        let reply = self
            .client
            .database("admin")
            .run_command(doc! { "listShards": 1 })
            .await
            .map_err(driver_error)?;
        let shards = reply
            .get_array("shards")
            .map_err(|e| BackendError::Command(e.to_string()))?;
        Ok(shards
            .iter()
            .filter_map(|shard| shard.as_document())
            .filter_map(|shard| shard.get_str("_id").ok())
            .map(str::to_string)
            .collect())
    }

    async fn find_all(&self, collection: &str) -> Result<Vec<Record>, BackendError> {
        let cursor = self
            .database
            .collection::<Document>(collection)
            .find(doc! {})
            .projection(doc! { "_id": 0 })
            .await
            .map_err(driver_error)?;
        let documents: Vec<Document> = cursor.try_collect().await.map_err(driver_error)?;
        Ok(documents.into_iter().map(to_record).collect())
    }

    async fn insert(&self, collection: &str, record: Record) -> Result<(), BackendError> {
        let document = mongodb::bson::to_document(&record)
            .map_err(|e| BackendError::Command(e.to_string()))?;
        self.database
            .collection::<Document>(collection)
            .insert_one(document)
            .await
            .map(|_| ())
            .map_err(driver_error)
    }

    async fn delete(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<bool, BackendError> {
        let result = self
            .database
            .collection::<Document>(collection)
            .delete_one(doc! { field: value })
            .await
            .map_err(driver_error)?;
        Ok(result.deleted_count > 0)
    }

    fn describe(&self) -> String {
        format!("mongodb (database {})", self.database.name())
    }
}
