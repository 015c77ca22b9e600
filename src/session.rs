//! Single-use query sessions.
//!
//! A [`Session`] binds a filter and read options to a collection. Every
//! terminal operation takes the session by value, so a session runs exactly
//! one operation; build a new one from the collection for the next query.
//!
//! ```no_run
//! # async fn run(users: squirreldb_kit::Collection) -> squirreldb_kit::Result<()> {
//! use squirreldb_kit::{field, Filter, SortDirection};
//!
//! let mut adults: Vec<serde_json::Value> = Vec::new();
//! users
//!     .query(Filter::from(field("age").gte(18)))
//!     .sort("name", SortDirection::Asc)
//!     .limit(10)
//!     .find(&mut adults)
//!     .await?;
//! # Ok(())
//! # }
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::collection::{to_document, Collection};
use crate::decode::{decode, decode_one, DecodeTarget};
use crate::error::Result;
use crate::query::{Filter, FindOptions, SortDirection, SortSpec};
use crate::store::UpdateResult;

/// A filter bound to a collection, waiting for its terminal operation.
///
/// A session is spent by its first terminal operation:
///
/// ```compile_fail,E0382
/// # async fn run(users: squirreldb_kit::Collection) {
/// let session = users.all();
/// let first = session.count().await;
/// let second = session.count().await;
/// # }
/// ```
#[must_use = "a session does nothing until a terminal operation runs"]
pub struct Session<'c> {
    collection: &'c Collection,
    filter: Filter,
    options: FindOptions,
}

impl<'c> Session<'c> {
    pub(crate) fn new(collection: &'c Collection, filter: Filter) -> Self {
        Self {
            collection,
            filter,
            options: FindOptions::default(),
        }
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    /// Sort by field. Repeated calls add tie-breakers in call order.
    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.options.sort.push(SortSpec {
            field: field.into(),
            direction,
        });
        self
    }

    /// Limit number of results
    pub fn limit(mut self, n: usize) -> Self {
        self.options.limit = Some(n);
        self
    }

    /// Skip results (offset)
    pub fn skip(mut self, n: usize) -> Self {
        self.options.skip = Some(n);
        self
    }

    /// Read every matching document into `target`.
    pub async fn find<T>(self, target: &mut T) -> Result<()>
    where
        T: DecodeTarget + ?Sized,
    {
        let cursor = self
            .collection
            .store()
            .find(self.collection.name(), &self.filter, &self.options)
            .await?;
        decode(cursor, target).await
    }

    /// Read the first matching document.
    ///
    /// Fails with [`Error::NoDocument`](crate::Error::NoDocument) when nothing matches.
    pub async fn one<T: DeserializeOwned>(self) -> Result<T> {
        let options = FindOptions {
            limit: Some(1),
            ..self.options
        };
        let cursor = self
            .collection
            .store()
            .find(self.collection.name(), &self.filter, &options)
            .await?;
        decode_one(cursor).await
    }

    /// Number of matching documents. Store failures are logged and reported
    /// as zero, never returned.
    pub async fn count(self) -> u64 {
        match self
            .collection
            .store()
            .count_documents(self.collection.name(), &self.filter)
            .await
        {
            Ok(n) => n,
            Err(err) => {
                warn!(
                    collection = self.collection.name(),
                    error = %err,
                    "count failed, reporting 0"
                );
                0
            }
        }
    }

    /// Apply `patch` to the first matching document.
    pub async fn update<P: Serialize + ?Sized>(self, patch: &P) -> Result<UpdateResult> {
        let patch = to_document(patch)?;
        self.collection
            .store()
            .update_one(self.collection.name(), &self.filter, &patch)
            .await
    }

    /// Apply `patch` to every matching document.
    pub async fn update_all<P: Serialize + ?Sized>(self, patch: &P) -> Result<UpdateResult> {
        let patch = to_document(patch)?;
        self.collection
            .store()
            .update_many(self.collection.name(), &self.filter, &patch)
            .await
    }

    /// Delete the first matching document.
    pub async fn remove(self) -> Result<()> {
        self.collection
            .store()
            .delete_one(self.collection.name(), &self.filter)
            .await?;
        Ok(())
    }

    /// Delete every matching document.
    pub async fn remove_all(self) -> Result<()> {
        self.collection
            .store()
            .delete_many(self.collection.name(), &self.filter)
            .await?;
        Ok(())
    }
}
