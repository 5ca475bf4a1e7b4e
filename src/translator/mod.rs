//! Command translator
//!
//! The translator owns one endpoint's transport and the active database
//! name. It exposes typed operations taking dynamic [`ShellValue`]s,
//! converts them once with [`convert`], and performs the transport call.
//!
//! Operations that need a database return [`Notice::NoDatabaseSelected`]
//! instead of failing when none is selected.

pub mod convert;
pub mod query;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use mongodb::bson::{Bson, Document, doc};
use tracing::{debug, info};

use crate::bridge::ShellValue;
use crate::cursor::BatchCursor;
use crate::error::Result;
use crate::transport::{IndexSpec, Transport, UpdateMode};

pub use convert::{convert, to_document, to_document_list};
pub use query::{Namespace, QueryDescriptor};

/// Recoverable conditions reported to the operator as text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    NoDatabaseSelected,
    UnknownShow(String),
    MissingArgument(String),
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::NoDatabaseSelected => write!(f, "No database selected"),
            Notice::UnknownShow(what) => write!(f, "Unknown show command: {what}"),
            Notice::MissingArgument(message) => write!(f, "{message}"),
        }
    }
}

/// Either a value or a notice.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply<T> {
    Value(T),
    Notice(Notice),
}

impl<T> Reply<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Reply<U> {
        match self {
            Reply::Value(v) => Reply::Value(f(v)),
            Reply::Notice(n) => Reply::Notice(n),
        }
    }

    pub fn value(self) -> Option<T> {
        match self {
            Reply::Value(v) => Some(v),
            Reply::Notice(_) => None,
        }
    }

    pub fn notice(&self) -> Option<&Notice> {
        match self {
            Reply::Value(_) => None,
            Reply::Notice(n) => Some(n),
        }
    }
}

/// Output of `show <what>`.
#[derive(Debug, Clone, PartialEq)]
pub enum ShowOutput {
    Names(Vec<String>),
    Documents(Vec<Document>),
}

/// Receiver for verbose query diagnostics.
pub type DiagnosticSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Resolve the namespace or return the no-database notice.
macro_rules! namespace_or_notice {
    ($self:ident, $collection:expr) => {
        match $self.namespace($collection) {
            Some(ns) => ns,
            None => return Ok(Reply::Notice(Notice::NoDatabaseSelected)),
        }
    };
}

/// Translates shell-level operations into canonical transport calls.
pub struct CommandTranslator {
    transport: Arc<dyn Transport>,
    database: RwLock<Option<String>>,
    verbose: AtomicBool,
    diagnostics: DiagnosticSink,
    batch_size: usize,
}

impl fmt::Debug for CommandTranslator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandTranslator")
            .field("endpoint", &self.transport.endpoint())
            .field("database", &self.database_name())
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

impl CommandTranslator {
    /// Create a translator
    ///
    /// # Arguments
    /// * `transport` - Connection to execute against
    /// * `database` - Initially selected database, if any
    /// * `batch_size` - Documents per cursor batch
    pub fn new(transport: Arc<dyn Transport>, database: Option<String>, batch_size: usize) -> Self {
        Self {
            transport,
            database: RwLock::new(database),
            verbose: AtomicBool::new(false),
            diagnostics: Arc::new(|line: &str| eprintln!("{line}")),
            batch_size: batch_size.max(1),
        }
    }

    /// Route verbose diagnostics somewhere other than stderr.
    pub fn with_diagnostics(mut self, sink: DiagnosticSink) -> Self {
        self.diagnostics = sink;
        self
    }

    pub fn set_verbose(&self, verbose: bool) {
        self.verbose.store(verbose, Ordering::Relaxed);
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose.load(Ordering::Relaxed)
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn database_name(&self) -> Option<String> {
        self.database
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Switch the active database. Returns the shell's confirmation text.
    pub fn use_database(&self, name: &str) -> String {
        info!("switching to database '{}'", name);
        *self.database.write().unwrap_or_else(PoisonError::into_inner) = Some(name.to_string());
        format!("switched to db {name}")
    }

    fn namespace(&self, collection: &str) -> Option<Namespace> {
        self.database_name().map(|db| Namespace::new(db, collection))
    }

    /// Build a query descriptor from dynamic filter/projection values.
    pub fn build_query(
        &self,
        collection: &str,
        filter: &ShellValue,
        projection: Option<&ShellValue>,
    ) -> QueryDescriptor {
        QueryDescriptor::new(collection, to_document(filter))
            .with_projection(projection.map(to_document))
    }

    /// Lazy cursor over a query. No transport call happens here.
    pub fn open_cursor(&self, query: QueryDescriptor) -> Reply<BatchCursor> {
        match self.database_name() {
            Some(db) => Reply::Value(BatchCursor::new(
                Arc::clone(&self.transport),
                db,
                query,
                self.batch_size,
            )),
            None => Reply::Notice(Notice::NoDatabaseSelected),
        }
    }

    /// Execute a query and collect every result.
    pub async fn find(&self, query: QueryDescriptor) -> Result<Reply<Vec<Document>>> {
        let Some(db) = self.database_name() else {
            return Ok(Reply::Notice(Notice::NoDatabaseSelected));
        };
        debug!("find on {}.{}: {}", db, query.collection, query.filter);

        let mut stream = self.transport.open_query(&db, &query).await?;
        let mut documents = Vec::new();
        let pulled = loop {
            match stream.next_document().await {
                Ok(Some(doc)) => documents.push(doc),
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        stream.release();
        pulled?;
        Ok(Reply::Value(documents))
    }

    /// First matching document, or `None`.
    pub async fn find_one(
        &self,
        collection: &str,
        filter: &ShellValue,
        projection: Option<&ShellValue>,
    ) -> Result<Reply<Option<Document>>> {
        let mut query = self.build_query(collection, filter, projection);
        query.set_limit(1);
        Ok(self.find(query).await?.map(|docs| docs.into_iter().next()))
    }

    /// Insert one document; replies `{acknowledged, insertedId}`.
    pub async fn insert_one(&self, collection: &str, document: &ShellValue) -> Result<Reply<Document>> {
        let ns = namespace_or_notice!(self, collection);
        if document.is_null() {
            return Ok(Reply::Notice(Notice::MissingArgument("Document required".into())));
        }
        let outcome = self.transport.insert(&ns, vec![to_document(document)]).await?;
        let id = outcome.inserted_ids.into_iter().next().unwrap_or(Bson::Null);
        debug!("inserted document into {} with _id {}", ns, id);
        Ok(Reply::Value(doc! { "acknowledged": true, "insertedId": id }))
    }

    /// Insert a list of documents; replies `{acknowledged, insertedIds}`.
    pub async fn insert_many(&self, collection: &str, documents: &ShellValue) -> Result<Reply<Document>> {
        let ns = namespace_or_notice!(self, collection);
        let is_list = matches!(documents, ShellValue::Array(_) | ShellValue::Canonical(Bson::Array(_)));
        let documents = to_document_list(documents);
        if !is_list || documents.is_empty() {
            return Ok(Reply::Notice(Notice::MissingArgument(
                "Documents array required".into(),
            )));
        }
        let outcome = self.transport.insert(&ns, documents).await?;
        debug!("inserted {} documents into {}", outcome.inserted_ids.len(), ns);
        Ok(Reply::Value(doc! {
            "acknowledged": true,
            "insertedIds": outcome.inserted_ids,
        }))
    }

    /// Update matching documents.
    ///
    /// An update without top-level operators is wrapped in `$set`.
    pub async fn update(
        &self,
        collection: &str,
        filter: &ShellValue,
        update: &ShellValue,
        mode: UpdateMode,
    ) -> Result<Reply<Document>> {
        let ns = namespace_or_notice!(self, collection);
        let filter = to_document(filter);
        let update = wrap_update(to_document(update));
        debug!("update on {}: filter {} update {} ({:?})", ns, filter, update, mode);

        let outcome = self.transport.update(&ns, filter, update, mode).await?;
        let mut reply = doc! {
            "acknowledged": true,
            "matchedCount": outcome.matched as i64,
            "modifiedCount": outcome.modified as i64,
        };
        if let Some(id) = outcome.upserted_id {
            reply.insert("upsertedId", id);
        }
        Ok(Reply::Value(reply))
    }

    /// Delete one or all matching documents; replies `{acknowledged, deletedCount}`.
    pub async fn delete(&self, collection: &str, filter: &ShellValue, many: bool) -> Result<Reply<Document>> {
        let ns = namespace_or_notice!(self, collection);
        let deleted = self.transport.delete(&ns, to_document(filter), many).await?;
        debug!("deleted {} document(s) from {}", deleted, ns);
        Ok(Reply::Value(doc! { "acknowledged": true, "deletedCount": deleted as i64 }))
    }

    /// Exact count of matching documents.
    pub async fn count_documents(&self, collection: &str, filter: &ShellValue) -> Result<Reply<u64>> {
        let ns = namespace_or_notice!(self, collection);
        let filter = to_document(filter);
        self.emit_count_diagnostics(&ns, &filter);
        Ok(Reply::Value(self.transport.count(&ns, filter).await?))
    }

    /// Approximate count of the whole collection.
    pub async fn estimated_document_count(&self, collection: &str) -> Result<Reply<u64>> {
        let ns = namespace_or_notice!(self, collection);
        Ok(Reply::Value(self.transport.estimated_count(&ns).await?))
    }

    fn emit_count_diagnostics(&self, ns: &Namespace, filter: &Document) {
        if !self.is_verbose() {
            return;
        }
        let json = Bson::Document(filter.clone()).into_relaxed_extjson().to_string();
        (self.diagnostics)(&format!(
            "VERBOSE: countDocuments query:\n  Collection: {ns}\n  Filter: {json}"
        ));
    }

    pub async fn aggregate(&self, collection: &str, pipeline: &ShellValue) -> Result<Reply<Vec<Document>>> {
        let ns = namespace_or_notice!(self, collection);
        let stages = to_document_list(pipeline);
        debug!("aggregate on {} with {} stage(s)", ns, stages.len());
        Ok(Reply::Value(self.transport.aggregate(&ns, stages).await?))
    }

    /// Distinct values are passed through unconverted.
    pub async fn distinct(&self, collection: &str, field: &str, filter: &ShellValue) -> Result<Reply<Vec<Bson>>> {
        let ns = namespace_or_notice!(self, collection);
        Ok(Reply::Value(self.transport.distinct(&ns, field, to_document(filter)).await?))
    }

    /// Create an index; only `unique`, `name` and `sparse` options are honoured.
    pub async fn create_index(
        &self,
        collection: &str,
        keys: &ShellValue,
        options: Option<&ShellValue>,
    ) -> Result<Reply<String>> {
        let ns = namespace_or_notice!(self, collection);
        let spec = options.map(|o| index_spec(&to_document(o))).unwrap_or_default();
        let name = self.transport.create_index(&ns, to_document(keys), spec).await?;
        info!("created index {} on {}", name, ns);
        Ok(Reply::Value(name))
    }

    pub async fn get_indexes(&self, collection: &str) -> Result<Reply<Vec<Document>>> {
        let ns = namespace_or_notice!(self, collection);
        Ok(Reply::Value(self.transport.list_indexes(&ns).await?))
    }

    pub async fn create_collection(&self, collection: &str) -> Result<Reply<String>> {
        let ns = namespace_or_notice!(self, collection);
        self.transport.create_collection(&ns).await?;
        Ok(Reply::Value(format!("Collection created: {collection}")))
    }

    pub async fn drop_collection(&self, collection: &str) -> Result<Reply<String>> {
        let ns = namespace_or_notice!(self, collection);
        self.transport.drop_collection(&ns).await?;
        Ok(Reply::Value(format!("Collection dropped: {collection}")))
    }

    pub async fn drop_database(&self) -> Result<Reply<String>> {
        let Some(db) = self.database_name() else {
            return Ok(Reply::Notice(Notice::NoDatabaseSelected));
        };
        self.transport.drop_database(&db).await?;
        info!("dropped database {}", db);
        Ok(Reply::Value(format!("Database dropped: {db}")))
    }

    pub async fn collection_names(&self) -> Result<Reply<Vec<String>>> {
        let Some(db) = self.database_name() else {
            return Ok(Reply::Notice(Notice::NoDatabaseSelected));
        };
        Ok(Reply::Value(self.transport.list_collections(&db).await?))
    }

    pub async fn database_stats(&self) -> Result<Reply<Document>> {
        self.run_command(doc! { "dbStats": 1 }).await
    }

    pub async fn collection_stats(&self, collection: &str) -> Result<Reply<Document>> {
        self.run_command(doc! { "collStats": collection }).await
    }

    /// Run a command document against the active database.
    pub async fn run_command(&self, command: Document) -> Result<Reply<Document>> {
        let Some(db) = self.database_name() else {
            return Ok(Reply::Notice(Notice::NoDatabaseSelected));
        };
        Ok(Reply::Value(self.transport.run_command(&db, command).await?))
    }

    /// Run a command document against `admin`; needs no selected database.
    pub async fn run_admin_command(&self, command: Document) -> Result<Document> {
        self.transport.run_command("admin", command).await
    }

    /// `show <what>`, with the shell's aliases.
    pub async fn execute_show_command(&self, what: &str) -> Result<Reply<ShowOutput>> {
        match what.to_ascii_lowercase().as_str() {
            "dbs" | "databases" => Ok(Reply::Value(ShowOutput::Names(
                self.transport.list_databases().await?,
            ))),
            "collections" | "tables" => Ok(self.collection_names().await?.map(ShowOutput::Names)),
            "users" => {
                let reply = self.run_command(doc! { "usersInfo": 1 }).await?;
                Ok(reply.map(|doc| {
                    let users = doc
                        .get_array("users")
                        .map(|users| {
                            users
                                .iter()
                                .filter_map(|u| u.as_document().cloned())
                                .collect()
                        })
                        .unwrap_or_default();
                    ShowOutput::Documents(users)
                }))
            }
            "profile" => {
                let query = QueryDescriptor::new("system.profile", Document::new());
                Ok(self.find(query).await?.map(ShowOutput::Documents))
            }
            _ => Ok(Reply::Notice(Notice::UnknownShow(what.to_string()))),
        }
    }

    /// Release the underlying connection.
    pub async fn shutdown(&self) -> Result<()> {
        self.transport.shutdown().await
    }
}

/// Wrap an operator-less update document in `$set`.
pub fn wrap_update(update: Document) -> Document {
    if update.keys().any(|k| k.starts_with('$')) {
        update
    } else {
        doc! { "$set": update }
    }
}

fn index_spec(options: &Document) -> IndexSpec {
    IndexSpec {
        unique: options.get_bool("unique").ok(),
        name: options.get_str("name").ok().map(str::to_string),
        sparse: options.get_bool("sparse").ok(),
    }
}

#[cfg(test)]
mod tests;
