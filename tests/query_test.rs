//! Filter builder tests

use serde_json::json;
use squirreldb_kit::{and, field, not, or, DocumentId, Filter, ID_FIELD};

#[test]
fn test_field_eq() {
    let cond = field("age").eq(25);
    assert_eq!(cond.field, "age");
    assert_eq!(cond.operator, "$eq");
    assert_eq!(cond.value, json!(25));
}

#[test]
fn test_field_ne() {
    let cond = field("status").ne("inactive");
    assert_eq!(cond.operator, "$ne");
    assert_eq!(cond.value, json!("inactive"));
}

#[test]
fn test_field_comparisons() {
    assert_eq!(field("price").gt(100).operator, "$gt");
    assert_eq!(field("count").gte(10).operator, "$gte");
    assert_eq!(field("age").lt(18).operator, "$lt");
    assert_eq!(field("rating").lte(5).operator, "$lte");
}

#[test]
fn test_field_is_in() {
    let cond = field("role").is_in(vec![json!("admin"), json!("mod")]);
    assert_eq!(cond.operator, "$in");
    assert!(cond.value.is_array());
}

#[test]
fn test_field_not_in() {
    let cond = field("status").not_in(vec![json!("banned"), json!("deleted")]);
    assert_eq!(cond.operator, "$nin");
}

#[test]
fn test_field_exists() {
    let cond = field("avatar").exists(true);
    assert_eq!(cond.operator, "$exists");
    assert_eq!(cond.value, json!(true));
}

#[test]
fn test_field_matches() {
    let cond = field("email").matches(r"@example\.com$");
    assert_eq!(cond.operator, "$regex");
}

#[test]
fn test_multiple_conditions() {
    let filter = Filter::new()
        .with(field("age").gte(18))
        .with(field("age").lte(65))
        .eq("status", "active");

    assert_eq!(filter.len(), 3);
    let doc = filter.to_document();
    assert_eq!(doc["age"]["$gte"], json!(18));
    assert_eq!(doc["age"]["$lte"], json!(65));
    assert_eq!(doc["status"], json!("active"));
}

#[test]
fn test_and_combines_conditions() {
    let cond = and(vec![field("age").gte(18), field("active").eq(true)]);
    assert_eq!(cond.field, "$and");
    assert_eq!(cond.value.as_array().map(Vec::len), Some(2));
}

#[test]
fn test_or_combines_conditions() {
    let cond = or(vec![field("role").eq("admin"), field("role").eq("moderator")]);
    assert_eq!(cond.field, "$or");
}

#[test]
fn test_not_negates_condition() {
    let cond = not(field("banned").eq(true));
    assert_eq!(cond.field, "$nor");
}

#[test]
fn test_id_filter_has_single_constraint() {
    let id = DocumentId::new();
    let filter = Filter::by_id(id);
    let constraints: Vec<_> = filter.iter().collect();
    assert_eq!(constraints, vec![(ID_FIELD, &json!(id.to_string()))]);
}

#[test]
fn test_filter_from_pairs() {
    let filter: Filter = vec![("a", json!(1)), ("b", json!(2))].into_iter().collect();
    assert_eq!(filter, Filter::new().eq("b", 2).eq("a", 1));
    assert_eq!(serde_json::to_string(&filter).unwrap(), r#"{"a":1,"b":2}"#);
}
