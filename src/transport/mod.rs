//! Transport seam
//!
//! A [`Transport`] executes canonical documents against one backend
//! connection. Only `bson` types cross this boundary, so no dynamic script
//! value can reach the wire unconverted.
//!
//! - [`MongoTransport`]: the official async driver
//! - [`MemoryTransport`]: an in-process store used by tests and dry runs

pub mod memory;
pub mod mongo;

use async_trait::async_trait;
use mongodb::bson::{Bson, Document};

use crate::error::Result;
use crate::translator::{Namespace, QueryDescriptor};

pub use memory::MemoryTransport;
pub use mongo::MongoTransport;

/// Outcome of an insert.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertOutcome {
    pub inserted_ids: Vec<Bson>,
}

/// Outcome of an update.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOutcome {
    pub matched: u64,
    pub modified: u64,
    pub upserted_id: Option<Bson>,
}

/// How an update applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateMode {
    pub many: bool,
    pub upsert: bool,
}

/// Recognized index options; anything else is dropped before this point.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexSpec {
    pub unique: Option<bool>,
    pub name: Option<String>,
    pub sparse: Option<bool>,
}

/// Server-side result stream.
///
/// A stream is started by [`Transport::open_query`]; each
/// [`next_document`](DocumentStream::next_document) call after that only
/// continues it. [`release`](DocumentStream::release) frees the server-side
/// handle and must be safe to call more than once.
#[async_trait]
pub trait DocumentStream: Send {
    async fn next_document(&mut self) -> Result<Option<Document>>;

    fn release(&mut self);
}

/// One backend connection.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Label used in logs.
    fn endpoint(&self) -> &str;

    /// Run a command document against a database.
    async fn run_command(&self, db: &str, command: Document) -> Result<Document>;

    /// Start a query stream.
    async fn open_query(&self, db: &str, query: &QueryDescriptor) -> Result<Box<dyn DocumentStream>>;

    async fn insert(&self, ns: &Namespace, documents: Vec<Document>) -> Result<InsertOutcome>;

    async fn update(
        &self,
        ns: &Namespace,
        filter: Document,
        update: Document,
        mode: UpdateMode,
    ) -> Result<UpdateOutcome>;

    async fn delete(&self, ns: &Namespace, filter: Document, many: bool) -> Result<u64>;

    /// Exact count of matching documents.
    async fn count(&self, ns: &Namespace, filter: Document) -> Result<u64>;

    /// Metadata-based count of the whole collection.
    async fn estimated_count(&self, ns: &Namespace) -> Result<u64>;

    async fn aggregate(&self, ns: &Namespace, pipeline: Vec<Document>) -> Result<Vec<Document>>;

    async fn distinct(&self, ns: &Namespace, field: &str, filter: Document) -> Result<Vec<Bson>>;

    /// Returns the index name.
    async fn create_index(&self, ns: &Namespace, keys: Document, spec: IndexSpec) -> Result<String>;

    async fn list_indexes(&self, ns: &Namespace) -> Result<Vec<Document>>;

    async fn list_databases(&self) -> Result<Vec<String>>;

    async fn list_collections(&self, db: &str) -> Result<Vec<String>>;

    async fn create_collection(&self, ns: &Namespace) -> Result<()>;

    async fn drop_collection(&self, ns: &Namespace) -> Result<()>;

    async fn drop_database(&self, db: &str) -> Result<()>;

    /// Release the connection.
    async fn shutdown(&self) -> Result<()>;
}
