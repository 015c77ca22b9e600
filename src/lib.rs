//! SquirrelDB Kit
//!
//! Convenience layer over a SquirrelDB-style document store: single-use
//! query sessions, cursor decoding into any container the caller declares,
//! idempotent index synchronization, and a shared sharded cache client.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use serde::Deserialize;
//! use serde_json::json;
//! use squirreldb_kit::{field, Database, Filter, IndexSpec, MemoryStore};
//!
//! #[derive(Debug, Deserialize)]
//! struct User {
//!     name: String,
//!     age: u32,
//! }
//!
//! #[tokio::main]
//! async fn main() -> squirreldb_kit::Result<()> {
//!     let db = Database::new(Arc::new(MemoryStore::new()));
//!     let users = db.collection("users");
//!
//!     // Create the indexes that are missing, and only those
//!     users.index(&[IndexSpec::new().asc("email").unique()]).await?;
//!
//!     users.insert(&json!({"name": "Alice", "email": "alice@example.com", "age": 31})).await?;
//!
//!     let mut adults: Vec<User> = Vec::new();
//!     users.query(Filter::from(field("age").gte(18))).find(&mut adults).await?;
//!     println!("Found: {:?}", adults);
//!
//!     println!("Total: {}", users.count(None).await);
//!     Ok(())
//! }
//! ```

pub mod cache;
mod collection;
pub mod config;
pub mod decode;
mod error;
pub mod index;
pub mod memory;
pub mod protocol;
pub mod query;
mod session;
pub mod store;

pub use cache::{
  init_shared_cache, shared_cache, CacheClient, CacheError, CacheOptions, ShardedCache,
};
pub use collection::{Collection, Database};
pub use config::Settings;
pub use decode::{decode, BufferedCursor, Cursor, DecodeTarget};
pub use error::{Error, Result};
pub use index::{reconcile, IndexDescriptor, IndexDirection, IndexKey, IndexModel, IndexSpec};
pub use memory::MemoryStore;
pub use protocol::{Document, DocumentId, Encoding, RawDocument, ID_FIELD, MAX_DOCUMENT_SIZE};
pub use query::{
  and, field, not, or, Condition, Field, Filter, FindOptions, SortDirection, SortSpec,
};
pub use session::Session;
pub use store::{
  AggregateOptions, DeleteResult, DocumentStore, InsertManyResult, InsertOneResult, UpdateResult,
  DEFAULT_AGGREGATE_TIMEOUT,
};
