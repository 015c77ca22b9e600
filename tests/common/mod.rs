//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use squirreldb_kit::{
    AggregateOptions, Collection, Cursor, Database, DeleteResult, Document, DocumentStore, Error,
    Filter, FindOptions, IndexDescriptor, IndexModel, InsertManyResult, InsertOneResult,
    MemoryStore, Result, UpdateResult,
};

/// `MemoryStore` wrapper that can fail or stall on demand and counts the
/// calls that matter to the tests.
#[derive(Default)]
pub struct FaultyStore {
    inner: MemoryStore,
    pub fail_counts: AtomicBool,
    pub fail_create_indexes: AtomicBool,
    pub aggregate_delay: std::sync::Mutex<Option<Duration>>,
    pub create_index_calls: AtomicUsize,
    pub list_index_calls: AtomicUsize,
}

impl FaultyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn stall_aggregate(&self, delay: Duration) {
        *self.aggregate_delay.lock().unwrap() = Some(delay);
    }
}

#[async_trait]
impl DocumentStore for FaultyStore {
    async fn list_collections(&self) -> Result<Vec<String>> {
        self.inner.list_collections().await
    }

    async fn list_indexes(&self, collection: &str) -> Result<Vec<IndexDescriptor>> {
        self.list_index_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.list_indexes(collection).await
    }

    async fn create_indexes(
        &self,
        collection: &str,
        models: Vec<IndexModel>,
    ) -> Result<Vec<String>> {
        self.create_index_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_create_indexes.load(Ordering::SeqCst) {
            return Err(Error::Store("index build interrupted".to_string()));
        }
        self.inner.create_indexes(collection, models).await
    }

    async fn drop_index(&self, collection: &str, name: &str) -> Result<()> {
        self.inner.drop_index(collection, name).await
    }

    async fn insert_one(&self, collection: &str, document: Document) -> Result<InsertOneResult> {
        self.inner.insert_one(collection, document).await
    }

    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> Result<InsertManyResult> {
        self.inner.insert_many(collection, documents).await
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &Document,
    ) -> Result<UpdateResult> {
        self.inner.update_one(collection, filter, patch).await
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &Document,
    ) -> Result<UpdateResult> {
        self.inner.update_many(collection, filter, patch).await
    }

    async fn delete_one(&self, collection: &str, filter: &Filter) -> Result<DeleteResult> {
        self.inner.delete_one(collection, filter).await
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<DeleteResult> {
        self.inner.delete_many(collection, filter).await
    }

    async fn count_documents(&self, collection: &str, filter: &Filter) -> Result<u64> {
        if self.fail_counts.load(Ordering::SeqCst) {
            return Err(Error::Store("connection reset by peer".to_string()));
        }
        self.inner.count_documents(collection, filter).await
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Box<dyn Cursor>> {
        self.inner.find(collection, filter, options).await
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: &[Value],
        options: &AggregateOptions,
    ) -> Result<Box<dyn Cursor>> {
        let delay = *self.aggregate_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.aggregate(collection, pipeline, options).await
    }
}

/// Collection backed by `store`.
pub fn collection(store: Arc<FaultyStore>, name: &str) -> Collection {
    Database::new(store).collection(name)
}

/// Insert the people used across the session tests.
pub async fn seed_people(users: &Collection) {
    users
        .insert_all(&[
            json!({"name": "Alice", "age": 31, "team": "core"}),
            json!({"name": "Bob", "age": 25, "team": "web"}),
            json!({"name": "Carol", "age": 44, "team": "core"}),
            json!({"name": "Dave", "age": 19, "team": "ops"}),
        ])
        .await
        .unwrap();
}
