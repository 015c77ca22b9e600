//! Session and collection facade tests.

mod common;

use std::sync::atomic::Ordering;

use serde::Deserialize;
use serde_json::{json, Value};
use squirreldb_kit::{field, or, DocumentId, Error, Filter, SortDirection, UpdateResult};

use common::{collection, seed_people, FaultyStore};

#[derive(Debug, Deserialize, PartialEq)]
struct Person {
    name: String,
    age: u32,
    team: String,
}

#[tokio::test]
async fn test_find_with_options() {
    let users = collection(FaultyStore::new(), "users");
    seed_people(&users).await;

    let mut people: Vec<Person> = Vec::new();
    users
        .query(Filter::from(field("age").gte(20)))
        .sort("age", SortDirection::Desc)
        .skip(1)
        .limit(2)
        .find(&mut people)
        .await
        .unwrap();

    let names: Vec<&str> = people.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["Alice", "Bob"]);
}

#[tokio::test]
async fn test_empty_filter_finds_everything() {
    let users = collection(FaultyStore::new(), "users");
    seed_people(&users).await;

    let mut all: Vec<Person> = Vec::new();
    users.find(None, &mut all).await.unwrap();
    assert_eq!(all.len(), 4);

    let mut again: Vec<Person> = Vec::new();
    users.all().find(&mut again).await.unwrap();
    assert_eq!(again, all);
}

#[tokio::test]
async fn test_one_and_no_document() {
    let users = collection(FaultyStore::new(), "users");
    seed_people(&users).await;

    let carol: Person = users.query(Filter::new().eq("name", "Carol")).one().await.unwrap();
    assert_eq!(carol.age, 44);

    let missing = users
        .query(Filter::new().eq("name", "Zed"))
        .one::<Person>()
        .await
        .unwrap_err();
    assert!(matches!(missing, Error::NoDocument));
    assert_eq!(missing.to_string(), "no document results");
}

#[tokio::test]
async fn test_by_id_helpers() {
    let users = collection(FaultyStore::new(), "users");
    let id = DocumentId::new();
    users
        .insert(&json!({"_id": id, "name": "Erin", "age": 52, "team": "core"}))
        .await
        .unwrap();
    seed_people(&users).await;

    let erin: Person = users.find_by_id(id).await.unwrap();
    assert_eq!(erin.name, "Erin");

    let result = users
        .update_by_id(id, &json!({"$set": {"team": "infra"}}))
        .await
        .unwrap();
    assert_eq!(result, UpdateResult { matched_count: 1, modified_count: 1 });
    let erin: Person = users.find_by_id(id).await.unwrap();
    assert_eq!(erin.team, "infra");

    users.remove_by_id(id).await.unwrap();
    assert!(matches!(users.find_by_id::<Person>(id).await, Err(Error::NoDocument)));
    assert_eq!(users.count(None).await, 4);
}

#[tokio::test]
async fn test_inserted_ids_are_generated() {
    let users = collection(FaultyStore::new(), "users");
    let result = users.insert(&json!({"name": "Frank"})).await.unwrap();
    let id: DocumentId = result.inserted_id.as_str().unwrap().parse().unwrap();

    let frank: Value = users.find_by_id(id).await.unwrap();
    assert_eq!(frank["name"], "Frank");
}

#[tokio::test]
async fn test_count_matches_filter() {
    let users = collection(FaultyStore::new(), "users");
    seed_people(&users).await;

    assert_eq!(users.count(None).await, 4);
    assert_eq!(users.count(Some(Filter::new().eq("team", "core"))).await, 2);
    let filter = Filter::from(or(vec![field("team").eq("web"), field("age").lt(20)]));
    assert_eq!(users.query(filter).count().await, 2);
}

#[tokio::test]
async fn test_count_failure_reports_zero() {
    let store = FaultyStore::new();
    let users = collection(store.clone(), "users");
    seed_people(&users).await;
    store.fail_counts.store(true, Ordering::SeqCst);

    assert_eq!(users.count(None).await, 0);
    assert_eq!(users.count(Some(Filter::new().eq("team", "core"))).await, 0);
    assert_eq!(users.query(Filter::from(field("age").gt(0))).count().await, 0);
}

#[tokio::test]
async fn test_update_all_without_filter_matches_all() {
    let users = collection(FaultyStore::new(), "users");
    seed_people(&users).await;
    let total = users.count(None).await;

    let result = users
        .update_all(None, &json!({"$set": {"active": true}}))
        .await
        .unwrap();
    assert_eq!(result.matched_count, total);
    assert_eq!(result.modified_count, total);

    let explicit = users
        .update_all(Some(Filter::new()), &json!({"$set": {"active": false}}))
        .await
        .unwrap();
    assert_eq!(explicit.matched_count, total);
}

#[tokio::test]
async fn test_update_without_filter_touches_one() {
    let users = collection(FaultyStore::new(), "users");
    seed_people(&users).await;

    let result = users.update(None, &json!({"$inc": {"age": 1}})).await.unwrap();
    assert_eq!(result.matched_count, 1);
}

#[tokio::test]
async fn test_remove_all_without_filter_empties_collection() {
    let users = collection(FaultyStore::new(), "users");
    seed_people(&users).await;
    assert_eq!(users.count(None).await, 4);

    users.remove_all(None).await.unwrap();
    assert_eq!(users.count(None).await, 0);

    seed_people(&users).await;
    users.remove_all(Some(Filter::new())).await.unwrap();
    assert_eq!(users.count(None).await, 0);
}

#[tokio::test]
async fn test_remove_deletes_one_match() {
    let users = collection(FaultyStore::new(), "users");
    seed_people(&users).await;

    users.remove(Some(Filter::new().eq("team", "core"))).await.unwrap();
    assert_eq!(users.count(Some(Filter::new().eq("team", "core"))).await, 1);

    users.query(Filter::new().eq("team", "core")).remove().await.unwrap();
    assert_eq!(users.count(Some(Filter::new().eq("team", "core"))).await, 0);
    assert_eq!(users.count(None).await, 2);
}

#[tokio::test]
async fn test_each_session_runs_fresh() {
    let users = collection(FaultyStore::new(), "users");
    seed_people(&users).await;
    let core = Filter::new().eq("team", "core");

    let mut first: Vec<Person> = Vec::new();
    users.query(core.clone()).find(&mut first).await.unwrap();
    assert_eq!(first.len(), 2);

    users.query(core.clone()).remove_all().await.unwrap();

    let mut second: Vec<Person> = Vec::new();
    users.query(core).find(&mut second).await.unwrap();
    assert!(second.is_empty());
}

#[tokio::test]
async fn test_patch_must_be_a_document() {
    let users = collection(FaultyStore::new(), "users");
    seed_people(&users).await;

    let err = users.update_all(None, &json!([1, 2])).await.unwrap_err();
    assert!(matches!(err, Error::Serialization(_)));
}

#[tokio::test]
async fn test_collections_share_the_store() {
    let store = FaultyStore::new();
    let users = collection(store.clone(), "users");
    let audit = collection(store, "audit");
    users.insert(&json!({"name": "Gail"})).await.unwrap();
    audit.insert(&json!({"event": "login"})).await.unwrap();

    assert_eq!(users.count(None).await, 1);
    assert_eq!(audit.count(None).await, 1);
    assert_eq!(users.name(), "users");
}
