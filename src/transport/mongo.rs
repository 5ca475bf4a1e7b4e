//! Transport over the official MongoDB async driver.

use async_trait::async_trait;
use futures::stream::TryStreamExt;
use mongodb::bson::{Bson, Document};
use mongodb::options::{FindOptions, IndexOptions};
use mongodb::{Client, Collection, Cursor, IndexModel};
use tracing::debug;

use super::{DocumentStream, IndexSpec, InsertOutcome, Transport, UpdateMode, UpdateOutcome};
use crate::error::Result;
use crate::translator::{Namespace, QueryDescriptor};

/// Driver-backed transport for one endpoint.
pub struct MongoTransport {
    client: Client,
    endpoint: String,
    batch_size: u32,
}

impl MongoTransport {
    /// Wrap a connected client
    ///
    /// # Arguments
    /// * `client` - Connected driver client
    /// * `endpoint` - Label for logs (usually the URI host list)
    /// * `batch_size` - Server batch size hint for query streams
    pub fn new(client: Client, endpoint: impl Into<String>, batch_size: u32) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            batch_size,
        }
    }

    fn collection(&self, ns: &Namespace) -> Collection<Document> {
        self.client.database(&ns.db).collection(&ns.collection)
    }
}

/// Live driver cursor.
struct DriverStream {
    cursor: Option<Cursor<Document>>,
}

#[async_trait]
impl DocumentStream for DriverStream {
    async fn next_document(&mut self) -> Result<Option<Document>> {
        match self.cursor.as_mut() {
            Some(cursor) => Ok(cursor.try_next().await?),
            None => Ok(None),
        }
    }

    fn release(&mut self) {
        // Dropping a live driver cursor issues killCursors in the background.
        if self.cursor.take().is_some() {
            debug!("released driver cursor");
        }
    }
}

#[async_trait]
impl Transport for MongoTransport {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn run_command(&self, db: &str, command: Document) -> Result<Document> {
        debug!("[{}] runCommand on {}: {}", self.endpoint, db, command);
        Ok(self.client.database(db).run_command(command).await?)
    }

    async fn open_query(&self, db: &str, query: &QueryDescriptor) -> Result<Box<dyn DocumentStream>> {
        debug!(
            "[{}] find on {}.{} with filter: {}",
            self.endpoint, db, query.collection, query.filter
        );
        let coll: Collection<Document> = self.client.database(db).collection(&query.collection);

        let mut find_options = FindOptions::default();
        find_options.projection = query.projection.clone();
        find_options.sort = query.sort.clone();
        find_options.limit = query.limit;
        find_options.skip = query.skip;
        find_options.batch_size = Some(self.batch_size);

        let cursor = coll.find(query.filter.clone()).with_options(find_options).await?;
        Ok(Box::new(DriverStream {
            cursor: Some(cursor),
        }))
    }

    async fn insert(&self, ns: &Namespace, documents: Vec<Document>) -> Result<InsertOutcome> {
        let coll = self.collection(ns);
        if documents.len() == 1 {
            let mut documents = documents;
            let doc = documents.remove(0);
            let result = coll.insert_one(doc).await?;
            return Ok(InsertOutcome {
                inserted_ids: vec![result.inserted_id],
            });
        }

        let result = coll.insert_many(documents).await?;
        let mut ids: Vec<(usize, Bson)> = result.inserted_ids.into_iter().collect();
        ids.sort_by_key(|(idx, _)| *idx);
        Ok(InsertOutcome {
            inserted_ids: ids.into_iter().map(|(_, id)| id).collect(),
        })
    }

    async fn update(
        &self,
        ns: &Namespace,
        filter: Document,
        update: Document,
        mode: UpdateMode,
    ) -> Result<UpdateOutcome> {
        let coll = self.collection(ns);
        let result = if mode.many {
            coll.update_many(filter, update).upsert(mode.upsert).await?
        } else {
            coll.update_one(filter, update).upsert(mode.upsert).await?
        };
        Ok(UpdateOutcome {
            matched: result.matched_count,
            modified: result.modified_count,
            upserted_id: result.upserted_id,
        })
    }

    async fn delete(&self, ns: &Namespace, filter: Document, many: bool) -> Result<u64> {
        let coll = self.collection(ns);
        let result = if many {
            coll.delete_many(filter).await?
        } else {
            coll.delete_one(filter).await?
        };
        Ok(result.deleted_count)
    }

    async fn count(&self, ns: &Namespace, filter: Document) -> Result<u64> {
        Ok(self.collection(ns).count_documents(filter).await?)
    }

    async fn estimated_count(&self, ns: &Namespace) -> Result<u64> {
        Ok(self.collection(ns).estimated_document_count().await?)
    }

    async fn aggregate(&self, ns: &Namespace, pipeline: Vec<Document>) -> Result<Vec<Document>> {
        let cursor = self.collection(ns).aggregate(pipeline).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn distinct(&self, ns: &Namespace, field: &str, filter: Document) -> Result<Vec<Bson>> {
        Ok(self.collection(ns).distinct(field, filter).await?)
    }

    async fn create_index(&self, ns: &Namespace, keys: Document, spec: IndexSpec) -> Result<String> {
        let mut options = IndexOptions::default();
        options.unique = spec.unique;
        options.name = spec.name;
        options.sparse = spec.sparse;

        let model = IndexModel::builder().keys(keys).options(options).build();
        let result = self.collection(ns).create_index(model).await?;
        Ok(result.index_name)
    }

    async fn list_indexes(&self, ns: &Namespace) -> Result<Vec<Document>> {
        let cursor = self.collection(ns).list_indexes().await?;
        let models: Vec<IndexModel> = cursor.try_collect().await?;
        let mut indexes = Vec::with_capacity(models.len());
        for model in models {
            match mongodb::bson::to_document(&model) {
                Ok(doc) => indexes.push(doc),
                Err(e) => debug!("skipping unserializable index model: {}", e),
            }
        }
        Ok(indexes)
    }

    async fn list_databases(&self) -> Result<Vec<String>> {
        Ok(self.client.list_database_names().await?)
    }

    async fn list_collections(&self, db: &str) -> Result<Vec<String>> {
        let mut names = self.client.database(db).list_collection_names().await?;
        names.sort();
        Ok(names)
    }

    async fn create_collection(&self, ns: &Namespace) -> Result<()> {
        Ok(self.client.database(&ns.db).create_collection(&ns.collection).await?)
    }

    async fn drop_collection(&self, ns: &Namespace) -> Result<()> {
        Ok(self.collection(ns).drop().await?)
    }

    async fn drop_database(&self, db: &str) -> Result<()> {
        Ok(self.client.database(db).drop().await?)
    }

    async fn shutdown(&self) -> Result<()> {
        debug!("[{}] shutting down client", self.endpoint);
        self.client.clone().shutdown().await;
        Ok(())
    }
}
