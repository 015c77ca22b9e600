//! Basic example demonstrating sessions, decoding and index sync.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use squirreldb_kit::{
  field, AggregateOptions, Database, Filter, IndexSpec, MemoryStore, SortDirection,
};

#[derive(Debug, Deserialize)]
struct User {
  name: String,
  email: String,
  active: bool,
}

#[tokio::main]
async fn main() -> squirreldb_kit::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
    .init();

  let db = Database::new(Arc::new(MemoryStore::new()));
  let users = db.collection("users");

  // Safe to run on every start: only missing indexes are created
  let created = users
    .index(&[
      IndexSpec::new().asc("email").unique(),
      IndexSpec::new().asc("active").desc("name"),
    ])
    .await?;
  println!("Created indexes: {:?}", created);

  let again = users.index(&[IndexSpec::new().asc("email").unique()]).await?;
  println!("Second sync created: {:?}", again);

  users
    .insert_all(&[
      json!({"name": "Alice", "email": "alice@example.com", "active": true}),
      json!({"name": "Bob", "email": "bob@example.com", "active": false}),
      json!({"name": "Carol", "email": "carol@example.com", "active": true}),
    ])
    .await?;

  // Query documents
  let mut active: Vec<User> = Vec::new();
  users
    .query(Filter::from(field("active").eq(true)))
    .sort("name", SortDirection::Desc)
    .find(&mut active)
    .await?;
  for user in &active {
    println!("Active: {} <{}> ({})", user.name, user.email, user.active);
  }

  // Update the document
  let result = users
    .update(
      Some(Filter::new().eq("email", "bob@example.com")),
      &json!({"$set": {"active": true}}),
    )
    .await?;
  println!("Updated: {:?}", result);
  println!("Active now: {}", users.count(Some(Filter::new().eq("active", true))).await);

  let mut totals: Vec<serde_json::Value> = Vec::new();
  users
    .aggregate(
      &[json!({"$match": {"active": true}}), json!({"$count": "active"})],
      &mut totals,
      AggregateOptions::default(),
    )
    .await?;
  println!("Aggregate: {}", serde_json::to_string_pretty(&totals)?);

  users.remove_all(None).await?;
  println!("Remaining: {}", users.count(None).await);

  Ok(())
}
