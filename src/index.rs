//! Index specifications and reconciliation against what a store already has.
//!
//! Indexes are identified by a canonical key: `field:direction` tokens joined
//! with `_`, in key order. `[("a", 1), ("b", -1)]` becomes `a:1_b:-1`. The
//! canonical key doubles as the name of every index this crate creates.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Direction or kind of one indexed field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexDirection {
    Ascending,
    Descending,
    Text,
    Hashed,
    Sphere2d,
}

impl IndexDirection {
    /// Value sent to the store for this direction.
    pub fn to_value(self) -> Value {
        match self {
            IndexDirection::Ascending => Value::from(1),
            IndexDirection::Descending => Value::from(-1),
            IndexDirection::Text => Value::from("text"),
            IndexDirection::Hashed => Value::from("hashed"),
            IndexDirection::Sphere2d => Value::from("2dsphere"),
        }
    }
}

impl fmt::Display for IndexDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&direction_token(&self.to_value()))
    }
}

impl From<IndexDirection> for Value {
    fn from(direction: IndexDirection) -> Self {
        direction.to_value()
    }
}

/// One `(field, direction)` pair of an index
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexKey {
    pub field: String,
    pub direction: IndexDirection,
}

/// A desired index
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexSpec {
    pub keys: Vec<IndexKey>,
    pub unique: bool,
}

impl IndexSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn asc(self, field: impl Into<String>) -> Self {
        self.key(field, IndexDirection::Ascending)
    }

    pub fn desc(self, field: impl Into<String>) -> Self {
        self.key(field, IndexDirection::Descending)
    }

    pub fn key(mut self, field: impl Into<String>, direction: IndexDirection) -> Self {
        self.keys.push(IndexKey {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Canonical key of this spec. `None` when the spec has no fields: such
    /// an index can only be identified by a name the server assigned.
    pub fn canonical_key(&self) -> Option<String> {
        if self.keys.is_empty() {
            return None;
        }
        Some(join_tokens(
            self.keys
                .iter()
                .map(|k| (k.field.as_str(), k.direction.to_value())),
        ))
    }
}

/// An index as reported by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub name: String,
    pub keys: Vec<(String, Value)>,
    #[serde(default)]
    pub unique: bool,
}

impl IndexDescriptor {
    /// Canonical key, falling back to the server-assigned name for indexes
    /// without key fields.
    pub fn canonical_key(&self) -> String {
        if self.keys.is_empty() {
            return self.name.clone();
        }
        join_tokens(self.keys.iter().map(|(f, v)| (f.as_str(), v.clone())))
    }
}

/// Index creation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexModel {
    pub keys: Vec<(String, Value)>,
    pub name: String,
    pub unique: bool,
}

fn join_tokens<'a>(keys: impl Iterator<Item = (&'a str, Value)>) -> String {
    keys.map(|(field, dir)| format!("{}:{}", field, direction_token(&dir)))
        .collect::<Vec<_>>()
        .join("_")
}

/// Directions are rendered the way a store reports them: integral numbers
/// without a fraction (`1`, `-1`), strings verbatim.
fn direction_token(value: &Value) -> String {
    match value {
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() && f.fract() == 0.0 => (f as i64).to_string(),
            _ => n.to_string(),
        },
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Compute the indexes that have to be created so that every spec in
/// `desired` exists.
///
/// Specs whose canonical key is already present, either in `existing` or
/// earlier in `desired`, are skipped, so calling this again after the
/// returned models were created yields nothing. Specs without fields have no
/// canonical key of their own and are never created.
pub fn reconcile(existing: &[IndexDescriptor], desired: &[IndexSpec]) -> Vec<IndexModel> {
    let mut known: HashSet<String> = existing.iter().map(IndexDescriptor::canonical_key).collect();

    let mut models = Vec::new();
    for spec in desired {
        let Some(key) = spec.canonical_key() else {
            continue;
        };
        if !known.insert(key.clone()) {
            continue;
        }
        models.push(IndexModel {
            keys: spec
                .keys
                .iter()
                .map(|k| (k.field.clone(), k.direction.to_value()))
                .collect(),
            name: key,
            unique: spec.unique,
        });
    }
    models
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn existing(keys: &[(&str, Value)]) -> IndexDescriptor {
        IndexDescriptor {
            name: "ignored".to_string(),
            keys: keys.iter().map(|(f, v)| (f.to_string(), v.clone())).collect(),
            unique: false,
        }
    }

    #[test]
    fn test_canonical_key() {
        let spec = IndexSpec::new().asc("b").desc("c");
        assert_eq!(spec.canonical_key().as_deref(), Some("b:1_c:-1"));

        let text = IndexSpec::new().key("body", IndexDirection::Text);
        assert_eq!(text.canonical_key().as_deref(), Some("body:text"));

        assert_eq!(IndexSpec::new().canonical_key(), None);
    }

    #[test]
    fn test_descriptor_canonical_key() {
        assert_eq!(existing(&[("a", json!(1.0))]).canonical_key(), "a:1");
        assert_eq!(existing(&[("a", json!(-1))]).canonical_key(), "a:-1");
        assert_eq!(existing(&[("loc", json!("2dsphere"))]).canonical_key(), "loc:2dsphere");

        let unnamed = IndexDescriptor {
            name: "server_side".to_string(),
            keys: vec![],
            unique: false,
        };
        assert_eq!(unnamed.canonical_key(), "server_side");
    }

    #[test]
    fn test_reconcile_skips_existing() {
        let current = vec![existing(&[("a", json!(1))])];
        let desired = vec![
            IndexSpec::new().asc("a"),
            IndexSpec::new().asc("b").desc("c").unique(),
        ];

        let models = reconcile(&current, &desired);
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].name, "b:1_c:-1");
        assert!(models[0].unique);
        assert_eq!(
            models[0].keys,
            vec![("b".to_string(), json!(1)), ("c".to_string(), json!(-1))]
        );
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let mut current = vec![existing(&[("a", json!(1))])];
        let desired = vec![
            IndexSpec::new().asc("a"),
            IndexSpec::new().asc("b").desc("c").unique(),
        ];

        for model in reconcile(&current, &desired) {
            current.push(IndexDescriptor {
                name: model.name,
                keys: model.keys,
                unique: model.unique,
            });
        }
        assert!(reconcile(&current, &desired).is_empty());
    }

    #[test]
    fn test_reconcile_collapses_duplicates() {
        let desired = vec![IndexSpec::new().asc("a"), IndexSpec::new().asc("a")];
        let models = reconcile(&[], &desired);
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].name, "a:1");
        assert!(!models[0].unique);
    }

    #[test]
    fn test_reconcile_key_order_matters() {
        let current = vec![existing(&[("a", json!(1)), ("b", json!(1))])];
        let models = reconcile(&current, &[IndexSpec::new().asc("b").asc("a")]);
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].name, "b:1_a:1");
    }

    #[test]
    fn test_reconcile_skips_fieldless_specs() {
        assert!(reconcile(&[], &[IndexSpec::new().unique()]).is_empty());
    }
}
