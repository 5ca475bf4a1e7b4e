//! In-process transport
//!
//! A small document store implementing the [`Transport`] contract, used by
//! the test suite and `--memory` dry runs. It understands:
//! - top-level and dotted-path filters with `$eq`, `$ne`, `$gt`, `$gte`,
//!   `$lt`, `$lte`, `$in`, `$nin`, `$exists`, `$regex`/`$options`, plus
//!   `$and`/`$or`
//! - `$set`, `$unset` and `$inc` updates
//! - `$match`, `$sort`, `$skip`, `$limit` and `$count` pipeline stages
//!
//! Latency and failures can be injected, and every stream start and release
//! is counted so tests can observe cursor behaviour.

use std::cmp::Ordering;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use mongodb::bson::{Bson, Document, doc, oid::ObjectId};
use tracing::debug;

use super::{DocumentStream, IndexSpec, InsertOutcome, Transport, UpdateMode, UpdateOutcome};
use crate::error::{ExecutionError, Result};
use crate::translator::{Namespace, QueryDescriptor};

type Store = BTreeMap<String, BTreeMap<String, CollectionData>>;

#[derive(Debug, Default, Clone)]
struct CollectionData {
    documents: Vec<Document>,
    indexes: Vec<Document>,
}

impl CollectionData {
    fn new() -> Self {
        Self {
            documents: Vec::new(),
            indexes: vec![doc! { "v": 2, "key": { "_id": 1 }, "name": "_id_" }],
        }
    }
}

/// Counters exposed for assertions.
#[derive(Debug, Default)]
pub struct TransportStats {
    pub stream_starts: AtomicUsize,
    pub stream_releases: AtomicUsize,
    pub exact_counts: AtomicUsize,
    pub estimated_counts: AtomicUsize,
    pub shutdowns: AtomicUsize,
}

impl TransportStats {
    pub fn starts(&self) -> usize {
        self.stream_starts.load(AtomicOrdering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.stream_releases.load(AtomicOrdering::SeqCst)
    }

    pub fn exact(&self) -> usize {
        self.exact_counts.load(AtomicOrdering::SeqCst)
    }

    pub fn estimated(&self) -> usize {
        self.estimated_counts.load(AtomicOrdering::SeqCst)
    }

    pub fn shutdown_calls(&self) -> usize {
        self.shutdowns.load(AtomicOrdering::SeqCst)
    }
}

/// In-memory transport
#[derive(Default)]
pub struct MemoryTransport {
    endpoint: String,
    store: Mutex<Store>,
    command_replies: Mutex<BTreeMap<String, std::result::Result<Document, String>>>,
    commands: Mutex<Vec<(String, Document)>>,
    failure: Mutex<Option<String>>,
    stream_failure: Mutex<Option<(usize, String)>>,
    latency: Option<Duration>,
    stats: Arc<TransportStats>,
}

impl MemoryTransport {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// Delay every operation by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make every subsequent operation fail with `message`.
    pub fn fail_with(&self, message: impl Into<String>) {
        *lock(&self.failure) = Some(message.into());
    }

    pub fn clear_failure(&self) {
        *lock(&self.failure) = None;
    }

    /// Make streams opened from now on fail after yielding `after` documents.
    pub fn fail_streams_after(&self, after: usize, message: impl Into<String>) {
        *lock(&self.stream_failure) = Some((after, message.into()));
    }

    /// Canned reply for a command, keyed by the command's first field name.
    pub fn reply_to(&self, command: &str, reply: std::result::Result<Document, String>) {
        lock(&self.command_replies).insert(command.to_string(), reply);
    }

    /// Seed documents directly, bypassing `_id` generation.
    pub fn seed(&self, ns: &Namespace, documents: Vec<Document>) {
        let mut store = lock(&self.store);
        collection_mut(&mut store, ns).documents.extend(documents);
    }

    pub fn stats(&self) -> Arc<TransportStats> {
        Arc::clone(&self.stats)
    }

    /// Commands received so far, as `(database, command)`.
    pub fn commands(&self) -> Vec<(String, Document)> {
        lock(&self.commands).clone()
    }

    async fn enter(&self) -> Result<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        match lock(&self.failure).clone() {
            Some(message) => Err(ExecutionError::CommandFailed(message).into()),
            None => Ok(()),
        }
    }

    fn matching(&self, ns: &Namespace, filter: &Document) -> Result<Vec<Document>> {
        let store = lock(&self.store);
        let Some(data) = store.get(&ns.db).and_then(|colls| colls.get(&ns.collection)) else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        for doc in &data.documents {
            if matches_filter(doc, filter)? {
                out.push(doc.clone());
            }
        }
        Ok(out)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn collection_mut<'a>(store: &'a mut Store, ns: &Namespace) -> &'a mut CollectionData {
    store
        .entry(ns.db.clone())
        .or_default()
        .entry(ns.collection.clone())
        .or_insert_with(CollectionData::new)
}

/// Stream over a snapshot of matching documents.
struct MemoryStream {
    documents: VecDeque<Document>,
    released: bool,
    yielded: usize,
    fail_after: Option<(usize, String)>,
    stats: Arc<TransportStats>,
}

#[async_trait]
impl DocumentStream for MemoryStream {
    async fn next_document(&mut self) -> Result<Option<Document>> {
        if self.released {
            return Ok(None);
        }
        if let Some((after, message)) = &self.fail_after {
            if self.yielded >= *after {
                return Err(ExecutionError::CommandFailed(message.clone()).into());
            }
        }
        let next = self.documents.pop_front();
        if next.is_some() {
            self.yielded += 1;
        }
        Ok(next)
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.documents.clear();
            self.stats.stream_releases.fetch_add(1, AtomicOrdering::SeqCst);
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn run_command(&self, db: &str, command: Document) -> Result<Document> {
        self.enter().await?;
        lock(&self.commands).push((db.to_string(), command.clone()));

        let name = command.keys().next().cloned().unwrap_or_default();
        if let Some(reply) = lock(&self.command_replies).get(&name).cloned() {
            return reply.map_err(|message| ExecutionError::CommandFailed(message).into());
        }

        match name.as_str() {
            "ping" => Ok(doc! { "ok": 1 }),
            "usersInfo" => Ok(doc! { "users": [], "ok": 1 }),
            "dbStats" => {
                let store = lock(&self.store);
                let colls = store.get(db);
                let collections = colls.map(|c| c.len()).unwrap_or(0) as i64;
                let objects: i64 = colls
                    .map(|c| c.values().map(|d| d.documents.len() as i64).sum())
                    .unwrap_or(0);
                Ok(doc! { "db": db, "collections": collections, "objects": objects, "ok": 1 })
            }
            "collStats" => {
                let coll = command.get_str("collStats").unwrap_or_default().to_string();
                let count = lock(&self.store)
                    .get(db)
                    .and_then(|c| c.get(&coll))
                    .map(|d| d.documents.len() as i64)
                    .unwrap_or(0);
                Ok(doc! { "ns": format!("{db}.{coll}"), "count": count, "ok": 1 })
            }
            other if other.starts_with("replSet") || other == "isMaster" => {
                Err(ExecutionError::CommandFailed("not running with --replSet".to_string()).into())
            }
            other => Err(ExecutionError::CommandFailed(format!("no such command: '{other}'")).into()),
        }
    }

    async fn open_query(&self, db: &str, query: &QueryDescriptor) -> Result<Box<dyn DocumentStream>> {
        self.enter().await?;
        self.stats.stream_starts.fetch_add(1, AtomicOrdering::SeqCst);
        debug!("[{}] open_query {}.{}", self.endpoint, db, query.collection);

        let ns = Namespace::new(db, &query.collection);
        let mut docs = self.matching(&ns, &query.filter)?;
        if let Some(sort) = &query.sort {
            sort_documents(&mut docs, sort);
        }
        let skip = query.skip.unwrap_or(0) as usize;
        let mut docs: Vec<Document> = docs.into_iter().skip(skip).collect();
        if let Some(limit) = query.limit {
            docs.truncate(limit.unsigned_abs() as usize);
        }
        if let Some(projection) = &query.projection {
            docs = docs.iter().map(|d| project(d, projection)).collect();
        }

        Ok(Box::new(MemoryStream {
            documents: docs.into(),
            released: false,
            yielded: 0,
            fail_after: lock(&self.stream_failure).clone(),
            stats: Arc::clone(&self.stats),
        }))
    }

    async fn insert(&self, ns: &Namespace, documents: Vec<Document>) -> Result<InsertOutcome> {
        self.enter().await?;
        let mut store = lock(&self.store);
        let data = collection_mut(&mut store, ns);
        let mut inserted_ids = Vec::with_capacity(documents.len());
        for document in documents {
            let (id, stored) = with_id(document);
            if data.documents.iter().any(|d| d.get("_id") == Some(&id)) {
                return Err(ExecutionError::CommandFailed(format!(
                    "E11000 duplicate key error collection: {ns} index: _id_ dup key"
                ))
                .into());
            }
            data.documents.push(stored);
            inserted_ids.push(id);
        }
        Ok(InsertOutcome { inserted_ids })
    }

    async fn update(
        &self,
        ns: &Namespace,
        filter: Document,
        update: Document,
        mode: UpdateMode,
    ) -> Result<UpdateOutcome> {
        self.enter().await?;
        let mut store = lock(&self.store);
        let data = collection_mut(&mut store, ns);

        let mut matched = 0;
        let mut modified = 0;
        for doc in data.documents.iter_mut() {
            if !matches_filter(doc, &filter)? {
                continue;
            }
            matched += 1;
            let before = doc.clone();
            apply_update(doc, &update)?;
            if *doc != before {
                modified += 1;
            }
            if !mode.many {
                break;
            }
        }

        let mut upserted_id = None;
        if matched == 0 && mode.upsert {
            let mut seed = Document::new();
            for (key, value) in &filter {
                if !key.starts_with('$') && !matches!(value, Bson::Document(d) if d.keys().any(|k| k.starts_with('$'))) {
                    seed.insert(key.clone(), value.clone());
                }
            }
            apply_update(&mut seed, &update)?;
            let (id, stored) = with_id(seed);
            data.documents.push(stored);
            upserted_id = Some(id);
        }

        Ok(UpdateOutcome {
            matched,
            modified,
            upserted_id,
        })
    }

    async fn delete(&self, ns: &Namespace, filter: Document, many: bool) -> Result<u64> {
        self.enter().await?;
        let mut store = lock(&self.store);
        let data = collection_mut(&mut store, ns);
        let mut deleted = 0;
        let mut kept = Vec::with_capacity(data.documents.len());
        for doc in data.documents.drain(..) {
            if (many || deleted == 0) && matches_filter(&doc, &filter)? {
                deleted += 1;
            } else {
                kept.push(doc);
            }
        }
        data.documents = kept;
        Ok(deleted)
    }

    async fn count(&self, ns: &Namespace, filter: Document) -> Result<u64> {
        self.enter().await?;
        self.stats.exact_counts.fetch_add(1, AtomicOrdering::SeqCst);
        Ok(self.matching(ns, &filter)?.len() as u64)
    }

    async fn estimated_count(&self, ns: &Namespace) -> Result<u64> {
        self.enter().await?;
        self.stats.estimated_counts.fetch_add(1, AtomicOrdering::SeqCst);
        let store = lock(&self.store);
        Ok(store
            .get(&ns.db)
            .and_then(|c| c.get(&ns.collection))
            .map(|d| d.documents.len() as u64)
            .unwrap_or(0))
    }

    async fn aggregate(&self, ns: &Namespace, pipeline: Vec<Document>) -> Result<Vec<Document>> {
        self.enter().await?;
        let mut docs = self.matching(ns, &Document::new())?;
        for stage in pipeline {
            let Some((name, spec)) = stage.iter().next() else {
                continue;
            };
            match (name.as_str(), spec) {
                ("$match", Bson::Document(filter)) => {
                    let mut kept = Vec::new();
                    for doc in docs {
                        if matches_filter(&doc, filter)? {
                            kept.push(doc);
                        }
                    }
                    docs = kept;
                }
                ("$sort", Bson::Document(sort)) => sort_documents(&mut docs, sort),
                ("$skip", n) => {
                    let n = as_f64(n).unwrap_or(0.0) as usize;
                    docs = docs.into_iter().skip(n).collect();
                }
                ("$limit", n) => docs.truncate(as_f64(n).unwrap_or(0.0) as usize),
                ("$count", Bson::String(field)) => {
                    let count = docs.len() as i32;
                    docs.clear();
                    if count > 0 {
                        let mut out = Document::new();
                        out.insert(field.clone(), count);
                        docs.push(out);
                    }
                }
                (other, _) => {
                    return Err(ExecutionError::CommandFailed(format!(
                        "Unrecognized pipeline stage name: '{other}'"
                    ))
                    .into());
                }
            }
        }
        Ok(docs)
    }

    async fn distinct(&self, ns: &Namespace, field: &str, filter: Document) -> Result<Vec<Bson>> {
        self.enter().await?;
        let mut values: Vec<Bson> = Vec::new();
        for doc in self.matching(ns, &filter)? {
            let candidates = match lookup(&doc, field) {
                Some(Bson::Array(items)) => items.clone(),
                Some(value) => vec![value.clone()],
                None => Vec::new(),
            };
            for value in candidates {
                if !values.contains(&value) {
                    values.push(value);
                }
            }
        }
        Ok(values)
    }

    async fn create_index(&self, ns: &Namespace, keys: Document, spec: IndexSpec) -> Result<String> {
        self.enter().await?;
        let name = spec.name.clone().unwrap_or_else(|| default_index_name(&keys));
        let mut index = doc! { "v": 2, "key": keys, "name": name.clone() };
        if let Some(unique) = spec.unique {
            index.insert("unique", unique);
        }
        if let Some(sparse) = spec.sparse {
            index.insert("sparse", sparse);
        }

        let mut store = lock(&self.store);
        let data = collection_mut(&mut store, ns);
        if !data.indexes.iter().any(|i| i.get_str("name").ok() == Some(name.as_str())) {
            data.indexes.push(index);
        }
        Ok(name)
    }

    async fn list_indexes(&self, ns: &Namespace) -> Result<Vec<Document>> {
        self.enter().await?;
        let store = lock(&self.store);
        match store.get(&ns.db).and_then(|c| c.get(&ns.collection)) {
            Some(data) => Ok(data.indexes.clone()),
            None => Err(ExecutionError::CommandFailed(format!("ns does not exist: {ns}")).into()),
        }
    }

    async fn list_databases(&self) -> Result<Vec<String>> {
        self.enter().await?;
        Ok(lock(&self.store).keys().cloned().collect())
    }

    async fn list_collections(&self, db: &str) -> Result<Vec<String>> {
        self.enter().await?;
        Ok(lock(&self.store)
            .get(db)
            .map(|c| c.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn create_collection(&self, ns: &Namespace) -> Result<()> {
        self.enter().await?;
        let mut store = lock(&self.store);
        let exists = store.get(&ns.db).is_some_and(|c| c.contains_key(&ns.collection));
        if exists {
            return Err(ExecutionError::CommandFailed(format!("Collection {ns} already exists")).into());
        }
        collection_mut(&mut store, ns);
        Ok(())
    }

    async fn drop_collection(&self, ns: &Namespace) -> Result<()> {
        self.enter().await?;
        let mut store = lock(&self.store);
        if let Some(colls) = store.get_mut(&ns.db) {
            colls.remove(&ns.collection);
            if colls.is_empty() {
                store.remove(&ns.db);
            }
        }
        Ok(())
    }

    async fn drop_database(&self, db: &str) -> Result<()> {
        self.enter().await?;
        lock(&self.store).remove(db);
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        self.stats.shutdowns.fetch_add(1, AtomicOrdering::SeqCst);
        match lock(&self.failure).clone() {
            Some(message) => Err(ExecutionError::CommandFailed(message).into()),
            None => Ok(()),
        }
    }
}

/// Ensure `_id` is present and first, as the server stores it.
fn with_id(document: Document) -> (Bson, Document) {
    let id = document
        .get("_id")
        .cloned()
        .unwrap_or_else(|| Bson::ObjectId(ObjectId::new()));
    let mut stored = Document::new();
    stored.insert("_id", id.clone());
    for (key, value) in document {
        if key != "_id" {
            stored.insert(key, value);
        }
    }
    (id, stored)
}

fn default_index_name(keys: &Document) -> String {
    keys.iter()
        .map(|(k, v)| match v {
            Bson::String(s) => format!("{k}_{s}"),
            other => format!("{k}_{}", as_f64(other).map(|n| n as i64).unwrap_or(1)),
        })
        .collect::<Vec<_>>()
        .join("_")
}

/// Resolve a dotted path.
fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Bson::Document(d) => d.get(part)?,
            Bson::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}

fn compare(a: &Bson, b: &Bson) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (as_f64(a), as_f64(b)) {
        return x.partial_cmp(&y);
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        (Bson::DateTime(x), Bson::DateTime(y)) => Some(x.cmp(y)),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => Some(x.bytes().cmp(&y.bytes())),
        (Bson::Null, Bson::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

fn values_equal(a: Option<&Bson>, b: &Bson) -> bool {
    match a {
        Some(Bson::Array(items)) if !matches!(b, Bson::Array(_)) => {
            items.iter().any(|item| values_equal(Some(item), b))
        }
        Some(value) => compare(value, b) == Some(Ordering::Equal) || value == b,
        None => matches!(b, Bson::Null),
    }
}

fn matches_filter(doc: &Document, filter: &Document) -> Result<bool> {
    for (key, condition) in filter {
        let ok = match key.as_str() {
            "$and" => match condition {
                Bson::Array(clauses) => {
                    let mut all = true;
                    for clause in clauses {
                        if let Bson::Document(c) = clause {
                            all &= matches_filter(doc, c)?;
                        }
                    }
                    all
                }
                _ => false,
            },
            "$or" => match condition {
                Bson::Array(clauses) => {
                    let mut any = false;
                    for clause in clauses {
                        if let Bson::Document(c) = clause {
                            any |= matches_filter(doc, c)?;
                        }
                    }
                    any
                }
                _ => false,
            },
            _ => matches_condition(lookup(doc, key), condition)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn matches_condition(value: Option<&Bson>, condition: &Bson) -> Result<bool> {
    let Bson::Document(ops) = condition else {
        return Ok(values_equal(value, condition));
    };
    if !ops.keys().any(|k| k.starts_with('$')) {
        return Ok(values_equal(value, condition));
    }

    for (op, operand) in ops {
        let ok = match op.as_str() {
            "$eq" => values_equal(value, operand),
            "$ne" => !values_equal(value, operand),
            "$gt" => value.and_then(|v| compare(v, operand)) == Some(Ordering::Greater),
            "$gte" => matches!(
                value.and_then(|v| compare(v, operand)),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            "$lt" => value.and_then(|v| compare(v, operand)) == Some(Ordering::Less),
            "$lte" => matches!(
                value.and_then(|v| compare(v, operand)),
                Some(Ordering::Less | Ordering::Equal)
            ),
            "$in" => match operand {
                Bson::Array(items) => items.iter().any(|item| values_equal(value, item)),
                _ => false,
            },
            "$nin" => match operand {
                Bson::Array(items) => !items.iter().any(|item| values_equal(value, item)),
                _ => true,
            },
            "$exists" => value.is_some() == operand.as_bool().unwrap_or(true),
            "$regex" => {
                let options = ops.get_str("$options").unwrap_or_default();
                matches_regex(value, operand, options)?
            }
            "$options" => true,
            other => {
                return Err(ExecutionError::CommandFailed(format!("unknown operator: {other}")).into());
            }
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn matches_regex(value: Option<&Bson>, pattern: &Bson, options: &str) -> Result<bool> {
    let (pattern, options) = match pattern {
        Bson::String(p) => (p.as_str(), options.to_string()),
        Bson::RegularExpression(re) => (re.pattern.as_str(), format!("{}{}", re.options, options)),
        _ => return Ok(false),
    };
    let regex = regex::RegexBuilder::new(pattern)
        .case_insensitive(options.contains('i'))
        .multi_line(options.contains('m'))
        .dot_matches_new_line(options.contains('s'))
        .ignore_whitespace(options.contains('x'))
        .build()
        .map_err(|e| ExecutionError::InvalidParameters(format!("Invalid regex pattern: {e}")))?;
    Ok(match value {
        Some(Bson::String(s)) => regex.is_match(s),
        Some(Bson::Array(items)) => items
            .iter()
            .any(|item| matches!(item, Bson::String(s) if regex.is_match(s))),
        _ => false,
    })
}

fn sort_documents(docs: &mut [Document], sort: &Document) {
    docs.sort_by(|a, b| {
        for (key, direction) in sort {
            let descending = as_f64(direction).is_some_and(|d| d < 0.0);
            let ordering = match (lookup(a, key), lookup(b, key)) {
                (Some(x), Some(y)) => compare(x, y).unwrap_or(Ordering::Equal),
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            let ordering = if descending { ordering.reverse() } else { ordering };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

fn project(doc: &Document, projection: &Document) -> Document {
    let include_id = projection.get("_id").map(is_truthy).unwrap_or(true);
    let inclusive = projection.iter().any(|(k, v)| k != "_id" && is_truthy(v));

    let mut out = Document::new();
    for (key, value) in doc {
        let keep = if key == "_id" {
            include_id
        } else if inclusive {
            projection.get(key).is_some_and(is_truthy)
        } else {
            !projection.get(key).is_some_and(|v| !is_truthy(v))
        };
        if keep {
            out.insert(key.clone(), value.clone());
        }
    }
    out
}

fn is_truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        other => as_f64(other).is_none_or(|n| n != 0.0),
    }
}

fn apply_update(doc: &mut Document, update: &Document) -> Result<()> {
    for (op, spec) in update {
        let Bson::Document(fields) = spec else {
            return Err(ExecutionError::InvalidParameters(format!(
                "Modifiers operate on fields but we found type {} instead",
                spec
            ))
            .into());
        };
        match op.as_str() {
            "$set" => {
                for (key, value) in fields {
                    doc.insert(key.clone(), value.clone());
                }
            }
            "$unset" => {
                for key in fields.keys() {
                    doc.remove(key);
                }
            }
            "$inc" => {
                for (key, delta) in fields {
                    let current = doc.get(key).and_then(as_f64).unwrap_or(0.0);
                    let sum = current + as_f64(delta).unwrap_or(0.0);
                    let value = match (doc.get(key), delta) {
                        (Some(Bson::Double(_)), _) | (_, Bson::Double(_)) => Bson::Double(sum),
                        (Some(Bson::Int64(_)), _) | (_, Bson::Int64(_)) => Bson::Int64(sum as i64),
                        _ => Bson::Int32(sum as i32),
                    };
                    doc.insert(key.clone(), value);
                }
            }
            other => {
                return Err(ExecutionError::InvalidParameters(format!(
                    "Unknown modifier: {other}"
                ))
                .into());
            }
        }
    }
    Ok(())
}
