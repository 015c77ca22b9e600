//! Contract of the document store the kit drives.
//!
//! Everything the kit does goes through [`DocumentStore`]; network drivers
//! and [`MemoryStore`](crate::memory::MemoryStore) implement it.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::decode::Cursor;
use crate::error::Result;
use crate::index::{IndexDescriptor, IndexModel};
use crate::protocol::Document;
use crate::query::{Filter, FindOptions};

/// Deadline applied to aggregations when none is configured
pub const DEFAULT_AGGREGATE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertOneResult {
    pub inserted_id: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertManyResult {
    pub inserted_ids: Vec<Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateResult {
    pub matched_count: u64,
    pub modified_count: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteResult {
    pub deleted_count: u64,
}

/// Aggregation options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateOptions {
    /// Deadline for the whole aggregation, [`DEFAULT_AGGREGATE_TIMEOUT`] when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_time: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_disk_use: Option<bool>,
}

impl AggregateOptions {
    pub fn with_max_time(mut self, max_time: Duration) -> Self {
        self.max_time = Some(max_time);
        self
    }

    pub fn effective_max_time(&self) -> Duration {
        self.max_time.unwrap_or(DEFAULT_AGGREGATE_TIMEOUT)
    }
}

/// Operations a document store offers. Filters handed to the write and
/// count operations are never "absent": callers normalize a missing filter
/// to an empty one, which matches every document.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn list_collections(&self) -> Result<Vec<String>>;

    async fn list_indexes(&self, collection: &str) -> Result<Vec<IndexDescriptor>>;

    /// Create all `models` in one call, returning the created index names.
    async fn create_indexes(
        &self,
        collection: &str,
        models: Vec<IndexModel>,
    ) -> Result<Vec<String>>;

    async fn drop_index(&self, collection: &str, name: &str) -> Result<()>;

    async fn insert_one(&self, collection: &str, document: Document) -> Result<InsertOneResult>;

    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> Result<InsertManyResult>;

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &Document,
    ) -> Result<UpdateResult>;

    async fn update_many(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &Document,
    ) -> Result<UpdateResult>;

    async fn delete_one(&self, collection: &str, filter: &Filter) -> Result<DeleteResult>;

    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<DeleteResult>;

    async fn count_documents(&self, collection: &str, filter: &Filter) -> Result<u64>;

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Box<dyn Cursor>>;

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: &[Value],
        options: &AggregateOptions,
    ) -> Result<Box<dyn Cursor>>;
}
