//! Collection facade: CRUD, aggregation and index management.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::time::{timeout_at, Instant};
use tracing::debug;

use crate::decode::{decode, DecodeTarget};
use crate::error::{Error, Result};
use crate::index::{reconcile, IndexDescriptor, IndexSpec};
use crate::protocol::{Document, DocumentId};
use crate::query::Filter;
use crate::session::Session;
use crate::store::{
    AggregateOptions, DocumentStore, InsertManyResult, InsertOneResult, UpdateResult,
};

/// Serialize a caller value into a document; anything but an object is rejected.
pub(crate) fn to_document<T: Serialize + ?Sized>(value: &T) -> Result<Document> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(Error::Serialization(format!(
            "expected a document, got {other}"
        ))),
    }
}

/// Entry point handing out collections that share one store.
#[derive(Clone)]
pub struct Database {
    store: Arc<dyn DocumentStore>,
}

impl Database {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn collection(&self, name: impl Into<String>) -> Collection {
        Collection {
            store: Arc::clone(&self.store),
            name: name.into(),
        }
    }

    pub async fn list_collections(&self) -> Result<Vec<String>> {
        self.store.list_collections().await
    }
}

/// Handle to one collection. Cheap to clone and safe to share: it holds no
/// per-call state, every operation builds its own [`Session`].
#[derive(Clone)]
pub struct Collection {
    store: Arc<dyn DocumentStore>,
    name: String,
}

impl Collection {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    /// Bind `filter` to this collection.
    pub fn query(&self, filter: Filter) -> Session<'_> {
        Session::new(self, filter)
    }

    /// Session matching every document.
    pub fn all(&self) -> Session<'_> {
        Session::new(self, Filter::new())
    }

    pub async fn find_by_id<T: DeserializeOwned>(&self, id: DocumentId) -> Result<T> {
        self.query(Filter::by_id(id)).one().await
    }

    /// Read every document matching `filter` into `target`.
    pub async fn find<T>(&self, filter: Option<Filter>, target: &mut T) -> Result<()>
    where
        T: DecodeTarget + ?Sized,
    {
        self.query(filter.unwrap_or_default()).find(target).await
    }

    pub async fn insert<D: Serialize + ?Sized>(&self, document: &D) -> Result<InsertOneResult> {
        self.store.insert_one(&self.name, to_document(document)?).await
    }

    pub async fn insert_all<D: Serialize>(&self, documents: &[D]) -> Result<InsertManyResult> {
        let documents = documents.iter().map(to_document).collect::<Result<Vec<_>>>()?;
        self.store.insert_many(&self.name, documents).await
    }

    /// Update the first document matching `filter`; `None` matches all.
    pub async fn update<P: Serialize + ?Sized>(
        &self,
        filter: Option<Filter>,
        patch: &P,
    ) -> Result<UpdateResult> {
        self.query(filter.unwrap_or_default()).update(patch).await
    }

    pub async fn update_by_id<P: Serialize + ?Sized>(
        &self,
        id: DocumentId,
        patch: &P,
    ) -> Result<UpdateResult> {
        self.update(Some(Filter::by_id(id)), patch).await
    }

    /// Update every document matching `filter`; `None` matches all.
    pub async fn update_all<P: Serialize + ?Sized>(
        &self,
        filter: Option<Filter>,
        patch: &P,
    ) -> Result<UpdateResult> {
        self.query(filter.unwrap_or_default()).update_all(patch).await
    }

    /// Delete the first document matching `filter`; `None` matches all.
    pub async fn remove(&self, filter: Option<Filter>) -> Result<()> {
        self.query(filter.unwrap_or_default()).remove().await
    }

    pub async fn remove_by_id(&self, id: DocumentId) -> Result<()> {
        self.remove(Some(Filter::by_id(id))).await
    }

    /// Delete every document matching `filter`; `None` matches all.
    pub async fn remove_all(&self, filter: Option<Filter>) -> Result<()> {
        self.query(filter.unwrap_or_default()).remove_all().await
    }

    /// Number of documents matching `filter`, zero if the store fails.
    pub async fn count(&self, filter: Option<Filter>) -> u64 {
        self.query(filter.unwrap_or_default()).count().await
    }

    /// Run an aggregation pipeline and decode its output into `target`.
    ///
    /// The whole call runs under `options.max_time` (10 seconds by default).
    /// When the deadline passes before the store answers, [`Error::Timeout`]
    /// is returned and nothing is decoded.
    pub async fn aggregate<T>(
        &self,
        pipeline: &[Value],
        target: &mut T,
        options: AggregateOptions,
    ) -> Result<()>
    where
        T: DecodeTarget + ?Sized,
    {
        let deadline = Instant::now() + options.effective_max_time();
        let pending = self.store.aggregate(&self.name, pipeline, &options);
        let cursor = timeout_at(deadline, pending).await??;
        timeout_at(deadline, decode(cursor, target)).await?
    }

    pub async fn indexes(&self) -> Result<Vec<IndexDescriptor>> {
        self.store.list_indexes(&self.name).await
    }

    /// Make sure every index in `specs` exists, creating only the missing
    /// ones in a single batch. Returns the names of the indexes created,
    /// which is empty when there was nothing to do.
    pub async fn index(&self, specs: &[IndexSpec]) -> Result<Vec<String>> {
        let existing = self.store.list_indexes(&self.name).await?;
        let models = reconcile(&existing, specs);
        if models.is_empty() {
            debug!(collection = %self.name, "indexes up to date");
            return Ok(Vec::new());
        }

        debug!(
            collection = %self.name,
            names = ?models.iter().map(|m| m.name.as_str()).collect::<Vec<_>>(),
            "creating indexes"
        );
        self.store.create_indexes(&self.name, models).await
    }

    pub async fn drop_index(&self, name: &str) -> Result<()> {
        self.store.drop_index(&self.name, name).await
    }
}
