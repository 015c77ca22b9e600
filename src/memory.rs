//! In-process document store.
//!
//! `MemoryStore` implements [`DocumentStore`] over plain maps. It supports
//! the filter operators produced by [`crate::query`], the `$set`, `$unset`
//! and `$inc` update operators, unique indexes, and a small aggregation
//! pipeline (`$match`, `$sort`, `$skip`, `$limit`, `$project`, `$count`).
//! Cursors carry a snapshot of the result, encoded with the store's
//! [`Encoding`].

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::debug;

use crate::decode::{BufferedCursor, Cursor};
use crate::error::{Error, Result};
use crate::index::{IndexDescriptor, IndexModel};
use crate::protocol::{Document, DocumentId, Encoding, RawDocument, ID_FIELD};
use crate::query::{Filter, FindOptions, SortDirection, SortSpec};
use crate::store::{
    AggregateOptions, DeleteResult, DocumentStore, InsertManyResult, InsertOneResult, UpdateResult,
};

/// Name of the index every collection gets on `_id`
pub const ID_INDEX_NAME: &str = "_id_";

struct MemCollection {
    documents: Vec<Document>,
    indexes: Vec<IndexDescriptor>,
}

impl MemCollection {
    fn new() -> Self {
        Self {
            documents: Vec::new(),
            indexes: vec![IndexDescriptor {
                name: ID_INDEX_NAME.to_string(),
                keys: vec![(ID_FIELD.to_string(), Value::from(1))],
                unique: true,
            }],
        }
    }

    /// Reject `candidate` if it collides with another document on a unique
    /// index. `skip` is the position of the document being replaced.
    fn check_unique(&self, candidate: &Document, skip: Option<usize>) -> Result<()> {
        for index in self.indexes.iter().filter(|i| i.unique) {
            let key = index_key(index, candidate);
            let clash = self
                .documents
                .iter()
                .enumerate()
                .any(|(pos, doc)| Some(pos) != skip && index_key(index, doc) == key);
            if clash {
                return Err(Error::DuplicateKey(format!(
                    "index {} already holds {}",
                    index.name,
                    Value::Array(key.into_iter().map(|v| v.unwrap_or(Value::Null)).collect())
                )));
            }
        }
        Ok(())
    }

    fn matching(&self, filter: &Filter) -> Result<Vec<usize>> {
        let mut positions = Vec::new();
        for (pos, doc) in self.documents.iter().enumerate() {
            if matches_filter(doc, filter.iter())? {
                positions.push(pos);
            }
        }
        Ok(positions)
    }

    fn insert(&mut self, mut document: Document) -> Result<Value> {
        let id = document
            .entry(ID_FIELD.to_string())
            .or_insert_with(|| DocumentId::new().into())
            .clone();
        self.check_unique(&document, None)?;
        self.documents.push(document);
        Ok(id)
    }

    fn update(&mut self, filter: &Filter, patch: &Document, many: bool) -> Result<UpdateResult> {
        let mut positions = self.matching(filter)?;
        if !many {
            positions.truncate(1);
        }

        let mut result = UpdateResult::default();
        for pos in positions {
            result.matched_count += 1;
            let updated = apply_patch(&self.documents[pos], patch)?;
            if updated == self.documents[pos] {
                continue;
            }
            self.check_unique(&updated, Some(pos))?;
            self.documents[pos] = updated;
            result.modified_count += 1;
        }
        Ok(result)
    }

    fn delete(&mut self, filter: &Filter, many: bool) -> Result<DeleteResult> {
        let mut positions = self.matching(filter)?;
        if !many {
            positions.truncate(1);
        }
        for pos in positions.iter().rev() {
            self.documents.remove(*pos);
        }
        Ok(DeleteResult {
            deleted_count: positions.len() as u64,
        })
    }
}

fn index_key(index: &IndexDescriptor, doc: &Document) -> Vec<Option<Value>> {
    index
        .keys
        .iter()
        .map(|(field, _)| lookup(doc, field).cloned())
        .collect()
}

/// Document store held entirely in process memory.
pub struct MemoryStore {
    collections: RwLock<HashMap<String, MemCollection>>,
    encoding: Encoding,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            encoding: Encoding::default(),
        }
    }

    /// Encoding used for documents handed out on cursors.
    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    fn cursor(&self, documents: Vec<Document>) -> Result<Box<dyn Cursor>> {
        let raw = documents
            .iter()
            .map(|doc| RawDocument::encode(doc, self.encoding))
            .collect::<Result<Vec<_>>>()?;
        Ok(Box::new(BufferedCursor::new(raw)))
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn list_collections(&self) -> Result<Vec<String>> {
        let collections = self.collections.read().await;
        let mut names: Vec<String> = collections.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn list_indexes(&self, collection: &str) -> Result<Vec<IndexDescriptor>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|c| c.indexes.clone())
            .unwrap_or_default())
    }

    async fn create_indexes(
        &self,
        collection: &str,
        models: Vec<IndexModel>,
    ) -> Result<Vec<String>> {
        let mut collections = self.collections.write().await;
        let coll = collections
            .entry(collection.to_string())
            .or_insert_with(MemCollection::new);

        // Validate the whole batch before touching the collection.
        let mut staged = coll.indexes.clone();
        for model in &models {
            if model.keys.is_empty() {
                return Err(Error::Store(format!("index {} has no key fields", model.name)));
            }
            if staged.iter().any(|i| i.name == model.name) {
                return Err(Error::Store(format!("index {} already exists", model.name)));
            }
            let descriptor = IndexDescriptor {
                name: model.name.clone(),
                keys: model.keys.clone(),
                unique: model.unique,
            };
            if descriptor.unique {
                let mut seen = Vec::new();
                for doc in &coll.documents {
                    let key = index_key(&descriptor, doc);
                    if seen.contains(&key) {
                        return Err(Error::DuplicateKey(format!(
                            "cannot build unique index {}: duplicate values",
                            descriptor.name
                        )));
                    }
                    seen.push(key);
                }
            }
            staged.push(descriptor);
        }

        coll.indexes = staged;
        debug!(collection, count = models.len(), "created indexes");
        Ok(models.into_iter().map(|m| m.name).collect())
    }

    async fn drop_index(&self, collection: &str, name: &str) -> Result<()> {
        if name == ID_INDEX_NAME {
            return Err(Error::Store("cannot drop the _id index".to_string()));
        }
        let mut collections = self.collections.write().await;
        let coll = collections
            .get_mut(collection)
            .ok_or_else(|| Error::Store(format!("index not found: {name}")))?;
        let before = coll.indexes.len();
        coll.indexes.retain(|i| i.name != name);
        if coll.indexes.len() == before {
            return Err(Error::Store(format!("index not found: {name}")));
        }
        Ok(())
    }

    async fn insert_one(&self, collection: &str, document: Document) -> Result<InsertOneResult> {
        let mut collections = self.collections.write().await;
        let coll = collections
            .entry(collection.to_string())
            .or_insert_with(MemCollection::new);
        let inserted_id = coll.insert(document)?;
        Ok(InsertOneResult { inserted_id })
    }

    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> Result<InsertManyResult> {
        let mut collections = self.collections.write().await;
        let coll = collections
            .entry(collection.to_string())
            .or_insert_with(MemCollection::new);
        let mut inserted_ids = Vec::with_capacity(documents.len());
        for document in documents {
            inserted_ids.push(coll.insert(document)?);
        }
        Ok(InsertManyResult { inserted_ids })
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &Document,
    ) -> Result<UpdateResult> {
        let mut collections = self.collections.write().await;
        match collections.get_mut(collection) {
            Some(coll) => coll.update(filter, patch, false),
            None => Ok(UpdateResult::default()),
        }
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &Document,
    ) -> Result<UpdateResult> {
        let mut collections = self.collections.write().await;
        match collections.get_mut(collection) {
            Some(coll) => coll.update(filter, patch, true),
            None => Ok(UpdateResult::default()),
        }
    }

    async fn delete_one(&self, collection: &str, filter: &Filter) -> Result<DeleteResult> {
        let mut collections = self.collections.write().await;
        match collections.get_mut(collection) {
            Some(coll) => coll.delete(filter, false),
            None => Ok(DeleteResult::default()),
        }
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<DeleteResult> {
        let mut collections = self.collections.write().await;
        match collections.get_mut(collection) {
            Some(coll) => coll.delete(filter, true),
            None => Ok(DeleteResult::default()),
        }
    }

    async fn count_documents(&self, collection: &str, filter: &Filter) -> Result<u64> {
        let collections = self.collections.read().await;
        match collections.get(collection) {
            Some(coll) => Ok(coll.matching(filter)?.len() as u64),
            None => Ok(0),
        }
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Box<dyn Cursor>> {
        let documents = {
            let collections = self.collections.read().await;
            match collections.get(collection) {
                Some(coll) => coll
                    .matching(filter)?
                    .into_iter()
                    .map(|pos| coll.documents[pos].clone())
                    .collect(),
                None => Vec::new(),
            }
        };

        let mut documents = sort_documents(documents, &options.sort);
        let skip = options.skip.unwrap_or(0).min(documents.len());
        documents.drain(..skip);
        if let Some(limit) = options.limit {
            documents.truncate(limit);
        }
        self.cursor(documents)
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: &[Value],
        _options: &AggregateOptions,
    ) -> Result<Box<dyn Cursor>> {
        let mut documents = {
            let collections = self.collections.read().await;
            collections
                .get(collection)
                .map(|c| c.documents.clone())
                .unwrap_or_default()
        };

        for stage in pipeline {
            documents = run_stage(documents, stage)?;
        }
        self.cursor(documents)
    }
}

fn run_stage(documents: Vec<Document>, stage: &Value) -> Result<Vec<Document>> {
    let (name, spec) = match stage.as_object() {
        Some(obj) if obj.len() == 1 => obj.iter().next().map(|(k, v)| (k.as_str(), v)),
        _ => None,
    }
    .ok_or_else(|| Error::Store(format!("pipeline stage must have exactly one field: {stage}")))?;

    match name {
        "$match" => {
            let cond = spec
                .as_object()
                .ok_or_else(|| Error::Store("$match requires a document".to_string()))?;
            let mut kept = Vec::new();
            for doc in documents {
                if matches_filter(&doc, cond.iter().map(|(k, v)| (k.as_str(), v)))? {
                    kept.push(doc);
                }
            }
            Ok(kept)
        }
        "$sort" => {
            let spec = spec
                .as_object()
                .ok_or_else(|| Error::Store("$sort requires a document".to_string()))?;
            let sort = spec
                .iter()
                .map(|(field, dir)| SortSpec {
                    field: field.clone(),
                    direction: if dir.as_i64() == Some(-1) {
                        SortDirection::Desc
                    } else {
                        SortDirection::Asc
                    },
                })
                .collect::<Vec<_>>();
            Ok(sort_documents(documents, &sort))
        }
        "$skip" => {
            let n = stage_count(name, spec)?;
            Ok(documents.into_iter().skip(n).collect())
        }
        "$limit" => {
            let n = stage_count(name, spec)?;
            Ok(documents.into_iter().take(n).collect())
        }
        "$project" => {
            let spec = spec
                .as_object()
                .ok_or_else(|| Error::Store("$project requires a document".to_string()))?;
            Ok(documents.iter().map(|doc| project(doc, spec)).collect())
        }
        "$count" => {
            let field = spec
                .as_str()
                .ok_or_else(|| Error::Store("$count requires a field name".to_string()))?;
            let mut out = Document::new();
            out.insert(field.to_string(), Value::from(documents.len() as u64));
            Ok(vec![out])
        }
        other => Err(Error::Store(format!("unsupported pipeline stage {other}"))),
    }
}

fn stage_count(name: &str, spec: &Value) -> Result<usize> {
    spec.as_u64()
        .map(|n| n as usize)
        .ok_or_else(|| Error::Store(format!("{name} requires a non-negative integer")))
}

fn project(doc: &Document, spec: &Map<String, Value>) -> Document {
    let included = |v: &Value| v.as_bool().unwrap_or_else(|| v.as_i64() != Some(0));
    let mut out = Document::new();
    let keep_id = spec.get(ID_FIELD).map(included).unwrap_or(true);
    if keep_id {
        if let Some(id) = doc.get(ID_FIELD) {
            out.insert(ID_FIELD.to_string(), id.clone());
        }
    }
    for (field, flag) in spec {
        if field == ID_FIELD || !included(flag) {
            continue;
        }
        if let Some(value) = doc.get(field) {
            out.insert(field.clone(), value.clone());
        }
    }
    out
}

fn sort_documents(mut documents: Vec<Document>, sort: &[SortSpec]) -> Vec<Document> {
    if sort.is_empty() {
        return documents;
    }
    documents.sort_by(|a, b| {
        for spec in sort {
            let ord = total_order(lookup(a, &spec.field), lookup(b, &spec.field));
            let ord = match spec.direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
    documents
}

/// Resolve a dotted path such as `address.city`.
fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut value = doc.get(parts.next()?)?;
    for part in parts {
        value = match value {
            Value::Object(obj) => obj.get(part)?,
            Value::Array(arr) => arr.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(value)
}

fn matches_filter<'a>(
    doc: &Document,
    constraints: impl Iterator<Item = (&'a str, &'a Value)>,
) -> Result<bool> {
    for (key, cond) in constraints {
        let ok = match key {
            "$and" => sub_filters(doc, key, cond)?.iter().all(|m| *m),
            "$or" => sub_filters(doc, key, cond)?.iter().any(|m| *m),
            "$nor" => !sub_filters(doc, key, cond)?.iter().any(|m| *m),
            _ => matches_field(lookup(doc, key), cond)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn sub_filters(doc: &Document, op: &str, cond: &Value) -> Result<Vec<bool>> {
    let operands = cond
        .as_array()
        .ok_or_else(|| Error::Store(format!("{op} requires an array")))?;
    operands
        .iter()
        .map(|operand| {
            let obj = operand
                .as_object()
                .ok_or_else(|| Error::Store(format!("{op} operands must be documents")))?;
            matches_filter(doc, obj.iter().map(|(k, v)| (k.as_str(), v)))
        })
        .collect()
}

fn is_operator_doc(value: &Value) -> bool {
    match value {
        Value::Object(obj) => !obj.is_empty() && obj.keys().all(|k| k.starts_with('$')),
        _ => false,
    }
}

fn matches_field(actual: Option<&Value>, cond: &Value) -> Result<bool> {
    let Value::Object(ops) = cond else {
        return Ok(equals(actual, cond));
    };
    if !is_operator_doc(cond) {
        return Ok(equals(actual, cond));
    }

    for (op, operand) in ops {
        let ok = match op.as_str() {
            "$eq" => equals(actual, operand),
            "$ne" => !equals(actual, operand),
            "$gt" => compare(actual, operand).is_some_and(|o| o == Ordering::Greater),
            "$gte" => compare(actual, operand).is_some_and(|o| o != Ordering::Less),
            "$lt" => compare(actual, operand).is_some_and(|o| o == Ordering::Less),
            "$lte" => compare(actual, operand).is_some_and(|o| o != Ordering::Greater),
            "$in" => in_list(actual, op, operand)?,
            "$nin" => !in_list(actual, op, operand)?,
            "$exists" => actual.is_some() == truthy(operand),
            "$regex" => {
                let pattern = operand
                    .as_str()
                    .ok_or_else(|| Error::Store("$regex requires a string pattern".to_string()))?;
                let re = Regex::new(pattern)
                    .map_err(|e| Error::Store(format!("invalid $regex: {e}")))?;
                matches!(actual, Some(Value::String(s)) if re.is_match(s))
            }
            other => return Err(Error::Store(format!("unknown operator {other}"))),
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

/// `false`, `null` and numeric zero are false; everything else is true.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64() != Some(0.0),
        _ => true,
    }
}

fn in_list(actual: Option<&Value>, op: &str, operand: &Value) -> Result<bool> {
    let list = operand
        .as_array()
        .ok_or_else(|| Error::Store(format!("{op} requires an array")))?;
    Ok(list.iter().any(|v| equals(actual, v)))
}

/// Equality, where an array field also matches any of its elements.
fn equals(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        None => expected.is_null(),
        Some(value) if same(value, expected) => true,
        Some(Value::Array(items)) => items.iter().any(|item| same(item, expected)),
        Some(_) => false,
    }
}

fn same(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn compare(actual: Option<&Value>, operand: &Value) -> Option<Ordering> {
    match (actual?, operand) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Ordering across types for sorting: missing and null first, then numbers,
/// strings, objects, arrays, booleans.
fn total_order(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None | Some(Value::Null) => 0,
            Some(Value::Number(_)) => 1,
            Some(Value::String(_)) => 2,
            Some(Value::Object(_)) => 3,
            Some(Value::Array(_)) => 4,
            Some(Value::Bool(_)) => 5,
        }
    }
    rank(a)
        .cmp(&rank(b))
        .then_with(|| match (a, b) {
            (Some(x), Some(y)) => compare(Some(x), y).unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        })
}

/// Apply an update document. A document made only of operators is applied
/// field by field; anything else replaces the body while keeping `_id`.
fn apply_patch(doc: &Document, patch: &Document) -> Result<Document> {
    if patch.is_empty() || !patch.keys().all(|k| k.starts_with('$')) {
        let mut replaced = patch.clone();
        replaced.remove(ID_FIELD);
        if let Some(id) = doc.get(ID_FIELD) {
            replaced.insert(ID_FIELD.to_string(), id.clone());
        }
        return Ok(replaced);
    }

    let mut updated = doc.clone();
    for (op, fields) in patch {
        let fields = fields
            .as_object()
            .ok_or_else(|| Error::Store(format!("{op} requires a document")))?;
        for (path, value) in fields {
            if path == ID_FIELD {
                return Err(Error::Store("the _id field is immutable".to_string()));
            }
            match op.as_str() {
                "$set" => set_path(&mut updated, path, value.clone())?,
                "$unset" => unset_path(&mut updated, path),
                "$inc" => {
                    let current = lookup(&updated, path).cloned().unwrap_or(Value::from(0));
                    set_path(&mut updated, path, add(&current, value, path)?)?;
                }
                other => return Err(Error::Store(format!("unknown update operator {other}"))),
            }
        }
    }
    Ok(updated)
}

fn add(current: &Value, delta: &Value, path: &str) -> Result<Value> {
    match (current, delta) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(x), Some(y)) => x
                .checked_add(y)
                .map(Value::from)
                .ok_or_else(|| Error::Store(format!("$inc overflows field {path}"))),
            _ => Ok(Value::from(a.as_f64().unwrap_or(0.0) + b.as_f64().unwrap_or(0.0))),
        },
        _ => Err(Error::Store(format!("cannot apply $inc to non-numeric field {path}"))),
    }
}

fn set_path(doc: &mut Document, path: &str, value: Value) -> Result<()> {
    let mut parts: Vec<&str> = path.split('.').collect();
    let last = parts.pop().unwrap_or(path);
    let mut target = doc;
    for part in parts {
        let entry = target
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        target = match entry {
            Value::Object(obj) => obj,
            _ => return Err(Error::Store(format!("cannot set {path}: {part} is not a document"))),
        };
    }
    target.insert(last.to_string(), value);
    Ok(())
}

fn unset_path(doc: &mut Document, path: &str) {
    let mut parts: Vec<&str> = path.split('.').collect();
    let last = parts.pop().unwrap_or(path);
    let mut target = doc;
    for part in parts {
        match target.get_mut(part) {
            Some(Value::Object(obj)) => target = obj,
            _ => return,
        }
    }
    target.remove(last);
}
