//! Cursor proxy returned by `find`

use std::sync::Arc;

use mongodb::bson::{Bson, Document};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::value::{BoundMethod, ProxyObject, ShellValue};
use super::{arg, count_value, documents_value, not_a_function, reply_into};
use crate::cursor::BatchCursor;
use crate::error::Result;
use crate::translator::{CommandTranslator, QueryDescriptor, Reply, to_document};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorMethod {
    Sort,
    Limit,
    Skip,
    Count,
    ToArray,
}

impl CursorMethod {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sort" => Some(Self::Sort),
            "limit" => Some(Self::Limit),
            "skip" => Some(Self::Skip),
            "count" => Some(Self::Count),
            "toArray" => Some(Self::ToArray),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct CursorState {
    query: QueryDescriptor,
    /// Created on the first pull.
    cursor: Option<BatchCursor>,
    closed: bool,
}

/// Builder over a pending query that becomes a [`BatchCursor`] when first
/// pulled.
#[derive(Debug)]
pub struct CursorProxy {
    translator: Arc<CommandTranslator>,
    collection: String,
    state: Mutex<CursorState>,
}

impl CursorProxy {
    pub fn new(translator: Arc<CommandTranslator>, query: QueryDescriptor) -> Self {
        Self {
            translator,
            collection: query.collection.clone(),
            state: Mutex::new(CursorState {
                query,
                cursor: None,
                closed: false,
            }),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub async fn query(&self) -> QueryDescriptor {
        self.state.lock().await.query.clone()
    }

    pub fn get_member(self: &Arc<Self>, name: &str) -> ShellValue {
        match CursorMethod::from_name(name) {
            Some(_) => ShellValue::Method(BoundMethod {
                receiver: ProxyObject::Cursor(Arc::clone(self)),
                name: name.to_string(),
            }),
            None => ShellValue::Null,
        }
    }

    pub async fn invoke(self: &Arc<Self>, name: &str, args: &[ShellValue]) -> Result<ShellValue> {
        let Some(method) = CursorMethod::from_name(name) else {
            return Err(not_a_function(&format!("cursor.{name}")));
        };
        debug!("cursor on {}: {}({} arg(s))", self.collection, name, args.len());

        match method {
            CursorMethod::Sort | CursorMethod::Limit | CursorMethod::Skip => {
                self.modify(method, arg(args, 0)).await;
                Ok(ShellValue::Proxy(ProxyObject::Cursor(Arc::clone(self))))
            }
            CursorMethod::Count => {
                let filter = self.state.lock().await.query.filter.clone();
                let reply = self
                    .translator
                    .count_documents(&self.collection, &ShellValue::Canonical(Bson::Document(filter)))
                    .await?;
                Ok(count_value(reply))
            }
            CursorMethod::ToArray => {
                let query = self.query().await;
                Ok(reply_into(self.translator.find(query).await?, documents_value))
            }
        }
    }

    async fn modify(&self, method: CursorMethod, value: &ShellValue) {
        let mut state = self.state.lock().await;
        if state.cursor.is_some() {
            warn!(
                "cursor on {} already executed; ignoring {:?}",
                self.collection, method
            );
            return;
        }
        match method {
            CursorMethod::Sort => state.query.set_sort(to_document(value)),
            CursorMethod::Limit => state.query.set_limit(value.as_f64().unwrap_or(0.0) as i64),
            CursorMethod::Skip => state.query.set_skip(value.as_f64().unwrap_or(0.0).max(0.0) as u64),
            CursorMethod::Count | CursorMethod::ToArray => {}
        }
    }

    /// Pull the next batch, executing the query on the first call.
    pub async fn next_batch(&self) -> Result<Reply<Vec<Document>>> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Ok(Reply::Value(Vec::new()));
        }
        if state.cursor.is_none() {
            match self.translator.open_cursor(state.query.clone()) {
                Reply::Value(cursor) => state.cursor = Some(cursor),
                Reply::Notice(notice) => return Ok(Reply::Notice(notice)),
            }
        }
        match state.cursor.as_mut() {
            Some(cursor) => Ok(Reply::Value(cursor.next_batch().await?)),
            None => Ok(Reply::Value(Vec::new())),
        }
    }

    /// As of the last pull; a cursor never pulled may still have results.
    pub async fn has_more(&self) -> bool {
        let state = self.state.lock().await;
        if state.closed {
            return false;
        }
        state.cursor.as_ref().is_none_or(BatchCursor::has_more)
    }

    /// Whether the query has been sent to the server.
    pub async fn executed(&self) -> bool {
        self.state
            .lock()
            .await
            .cursor
            .as_ref()
            .is_some_and(BatchCursor::executed)
    }

    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        state.closed = true;
        if let Some(cursor) = state.cursor.as_mut() {
            cursor.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translator::Namespace;
    use crate::transport::MemoryTransport;
    use mongodb::bson::doc;

    fn setup(n: i32) -> (Arc<MemoryTransport>, Arc<CursorProxy>) {
        let transport = Arc::new(MemoryTransport::new("mem"));
        transport.seed(
            &Namespace::new("shop", "items"),
            (0..n).map(|i| doc! { "_id": i, "n": i % 3 }).collect(),
        );
        let translator = Arc::new(CommandTranslator::new(transport.clone(), Some("shop".into()), 2));
        let query = QueryDescriptor::new("items", doc! {});
        (transport, Arc::new(CursorProxy::new(translator, query)))
    }

    #[tokio::test]
    async fn test_builders_chain_and_shape_query() {
        let (transport, cursor) = setup(5);
        let sort = ShellValue::Object(vec![("n".into(), ShellValue::Number(-1.0))]);
        let out = cursor.invoke("sort", &[sort]).await.unwrap();
        assert!(matches!(out, ShellValue::Proxy(ProxyObject::Cursor(c)) if Arc::ptr_eq(&c, &cursor)));
        cursor.invoke("limit", &[ShellValue::Number(3.0)]).await.unwrap();
        cursor.invoke("skip", &[ShellValue::Number(1.0)]).await.unwrap();

        let query = cursor.query().await;
        assert_eq!(query.sort, Some(doc! { "n": -1 }));
        assert_eq!(query.limit, Some(3));
        assert_eq!(query.skip, Some(1));
        assert_eq!(transport.stats().starts(), 0);
    }

    #[tokio::test]
    async fn test_builders_ignored_after_execution() {
        let (_, cursor) = setup(5);
        cursor.next_batch().await.unwrap();
        cursor.invoke("limit", &[ShellValue::Number(1.0)]).await.unwrap();
        assert_eq!(cursor.query().await.limit, None);
    }

    #[tokio::test]
    async fn test_count_ignores_limit_and_skip() {
        let (_, cursor) = setup(5);
        cursor.invoke("limit", &[ShellValue::Number(2.0)]).await.unwrap();
        cursor.invoke("skip", &[ShellValue::Number(1.0)]).await.unwrap();
        let n = cursor.invoke("count", &[]).await.unwrap();
        assert!(matches!(n, ShellValue::Canonical(Bson::Int64(5))));
    }

    #[tokio::test]
    async fn test_to_array_drains_everything() {
        let (_, cursor) = setup(5);
        let all = cursor.invoke("toArray", &[]).await.unwrap();
        assert_eq!(all.field("length").and_then(|v| v.as_f64()), Some(5.0));
    }

    #[tokio::test]
    async fn test_batches_then_close() {
        let (transport, cursor) = setup(3);
        assert!(cursor.has_more().await);
        let first = cursor.next_batch().await.unwrap().value().unwrap();
        assert_eq!(first.len(), 2);
        assert!(cursor.has_more().await);
        cursor.close().await;
        assert!(!cursor.has_more().await);
        assert_eq!(transport.stats().starts(), 1);
        assert_eq!(transport.stats().releases(), 1);
    }
}
