//! Filters and query options
//!
//! Filters are ordered lists of field constraints using MongoDB-like operator
//! naming: `field("age").gt(21)` becomes `("age", {"$gt": 21})`.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

use crate::protocol::{Document, DocumentId, ID_FIELD};

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Asc => write!(f, "asc"),
            SortDirection::Desc => write!(f, "desc"),
        }
    }
}

/// Sort specification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
}

/// Options applied to a filtered read
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindOptions {
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub sort: Vec<SortSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip: Option<usize>,
}

/// One field constraint
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub operator: String,
    pub value: Value,
}

impl Condition {
    fn new(field: impl Into<String>, operator: &str, value: Value) -> Self {
        Self {
            field: field.into(),
            operator: operator.to_string(),
            value,
        }
    }

    /// The constraint value as stored in a filter. Logical combinators carry
    /// their operand array directly; field operators are wrapped.
    fn into_pair(self) -> (String, Value) {
        if self.field.starts_with('$') {
            (self.field, self.value)
        } else {
            let mut op = serde_json::Map::new();
            op.insert(self.operator, self.value);
            (self.field, Value::Object(op))
        }
    }

    fn to_document(&self) -> Value {
        let (field, value) = self.clone().into_pair();
        let mut doc = serde_json::Map::new();
        doc.insert(field, value);
        Value::Object(doc)
    }
}

/// Field expression builder for fluent filter construction
pub struct Field {
    name: String,
}

impl Field {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn eq(self, value: impl Into<Value>) -> Condition {
        Condition::new(self.name, "$eq", value.into())
    }

    pub fn ne(self, value: impl Into<Value>) -> Condition {
        Condition::new(self.name, "$ne", value.into())
    }

    pub fn gt(self, value: impl Into<Value>) -> Condition {
        Condition::new(self.name, "$gt", value.into())
    }

    pub fn gte(self, value: impl Into<Value>) -> Condition {
        Condition::new(self.name, "$gte", value.into())
    }

    pub fn lt(self, value: impl Into<Value>) -> Condition {
        Condition::new(self.name, "$lt", value.into())
    }

    pub fn lte(self, value: impl Into<Value>) -> Condition {
        Condition::new(self.name, "$lte", value.into())
    }

    pub fn is_in(self, values: Vec<Value>) -> Condition {
        Condition::new(self.name, "$in", Value::Array(values))
    }

    pub fn not_in(self, values: Vec<Value>) -> Condition {
        Condition::new(self.name, "$nin", Value::Array(values))
    }

    pub fn exists(self, value: bool) -> Condition {
        Condition::new(self.name, "$exists", Value::Bool(value))
    }

    pub fn matches(self, pattern: impl Into<String>) -> Condition {
        Condition::new(self.name, "$regex", Value::String(pattern.into()))
    }
}

/// Create a field expression
pub fn field(name: impl Into<String>) -> Field {
    Field::new(name)
}

/// Combine conditions with AND
pub fn and(conditions: Vec<Condition>) -> Condition {
    combine("$and", conditions)
}

/// Combine conditions with OR
pub fn or(conditions: Vec<Condition>) -> Condition {
    combine("$or", conditions)
}

/// Negate a condition
pub fn not(condition: Condition) -> Condition {
    combine("$nor", vec![condition])
}

fn combine(op: &str, conditions: Vec<Condition>) -> Condition {
    let operands = conditions.iter().map(Condition::to_document).collect();
    Condition::new(op, op, Value::Array(operands))
}

/// Ordered list of `(field, value)` constraints. An empty filter matches
/// every document.
///
/// Order is kept for stores that use it to pick compound indexes, but two
/// filters compare equal when they hold the same constraints in any order.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    constraints: Vec<(String, Value)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter selecting a single document by identifier.
    pub fn by_id(id: DocumentId) -> Self {
        Self::new().eq(ID_FIELD, id)
    }

    /// Add a literal equality constraint.
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.constraints.push((field.into(), value.into()));
        self
    }

    /// Add a condition built with [`field`], [`and`], [`or`] or [`not`].
    pub fn with(mut self, condition: Condition) -> Self {
        self.constraints.push(condition.into_pair());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.constraints.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Render as a single filter document. Operator objects given for the
    /// same field are merged; for anything else the last constraint wins.
    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        for (key, value) in &self.constraints {
            match (doc.get_mut(key), value) {
                (Some(Value::Object(existing)), Value::Object(ops))
                    if ops.keys().all(|k| k.starts_with('$')) =>
                {
                    for (op, v) in ops {
                        existing.insert(op.clone(), v.clone());
                    }
                }
                _ => {
                    doc.insert(key.clone(), value.clone());
                }
            }
        }
        doc
    }
}

impl PartialEq for Filter {
    fn eq(&self, other: &Self) -> bool {
        self.constraints.iter().all(|c| other.constraints.contains(c))
            && other.constraints.iter().all(|c| self.constraints.contains(c))
    }
}

impl From<Condition> for Filter {
    fn from(condition: Condition) -> Self {
        Filter::new().with(condition)
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Filter {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self {
            constraints: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

impl Serialize for Filter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.constraints.len()))?;
        for (k, v) in &self.constraints {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}
