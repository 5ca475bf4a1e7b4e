//! Collection proxy (`db.<name>`)

use std::sync::Arc;

use mongodb::bson::Bson;
use tracing::debug;

use super::cursor::CursorProxy;
use super::value::{BoundMethod, ProxyObject, ShellValue};
use super::{arg, count_value, documents_value, not_a_function, reply_into};
use crate::error::Result;
use crate::translator::CommandTranslator;
use crate::transport::UpdateMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionMethod {
    Find,
    FindOne,
    InsertOne,
    InsertMany,
    Update,
    UpdateOne,
    UpdateMany,
    DeleteOne,
    DeleteMany,
    Count,
    CountDocuments,
    EstimatedDocumentCount,
    Aggregate,
    Distinct,
    Drop,
    CreateIndex,
    GetIndexes,
    Stats,
    GetName,
}

impl CollectionMethod {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "find" => Some(Self::Find),
            "findOne" => Some(Self::FindOne),
            "insert" | "insertOne" => Some(Self::InsertOne),
            "insertMany" => Some(Self::InsertMany),
            "update" => Some(Self::Update),
            "updateOne" => Some(Self::UpdateOne),
            "updateMany" => Some(Self::UpdateMany),
            "remove" | "deleteOne" => Some(Self::DeleteOne),
            "deleteMany" => Some(Self::DeleteMany),
            "count" => Some(Self::Count),
            "countDocuments" => Some(Self::CountDocuments),
            "estimatedDocumentCount" => Some(Self::EstimatedDocumentCount),
            "aggregate" => Some(Self::Aggregate),
            "distinct" => Some(Self::Distinct),
            "drop" => Some(Self::Drop),
            "createIndex" => Some(Self::CreateIndex),
            "getIndexes" => Some(Self::GetIndexes),
            "stats" => Some(Self::Stats),
            "getName" => Some(Self::GetName),
            _ => None,
        }
    }
}

/// Proxy for one named collection of the active database.
#[derive(Debug)]
pub struct CollectionProxy {
    translator: Arc<CommandTranslator>,
    name: String,
}

impl CollectionProxy {
    pub fn new(translator: Arc<CommandTranslator>, name: impl Into<String>) -> Self {
        Self {
            translator,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `db.collection` as currently resolved.
    pub fn full_name(&self) -> String {
        match self.translator.database_name() {
            Some(db) => format!("{}.{}", db, self.name),
            None => self.name.clone(),
        }
    }

    /// Build a lazy cursor proxy. Nothing is sent to the server.
    pub fn find(&self, filter: &ShellValue, projection: Option<&ShellValue>) -> Arc<CursorProxy> {
        let query = self.translator.build_query(&self.name, filter, projection);
        Arc::new(CursorProxy::new(Arc::clone(&self.translator), query))
    }

    pub fn get_member(self: &Arc<Self>, name: &str) -> ShellValue {
        debug!("{}.{}", self.name, name);
        match CollectionMethod::from_name(name) {
            Some(_) => ShellValue::Method(BoundMethod {
                receiver: ProxyObject::Collection(Arc::clone(self)),
                name: name.to_string(),
            }),
            None => ShellValue::Null,
        }
    }

    pub async fn invoke(self: &Arc<Self>, name: &str, args: &[ShellValue]) -> Result<ShellValue> {
        let Some(method) = CollectionMethod::from_name(name) else {
            return Err(not_a_function(&format!("db.{}.{}", self.name, name)));
        };
        debug!("{}.{}({} arg(s))", self.name, name, args.len());
        let translator = &self.translator;
        let coll = self.name.as_str();

        let value = match method {
            CollectionMethod::Find => {
                let projection = optional(args, 1);
                ShellValue::Proxy(ProxyObject::Cursor(self.find(arg(args, 0), projection)))
            }
            CollectionMethod::FindOne => {
                let reply = translator.find_one(coll, arg(args, 0), optional(args, 1)).await?;
                reply_into(reply, |doc| doc.map(ShellValue::from).unwrap_or(ShellValue::Null))
            }
            CollectionMethod::InsertOne => {
                reply_into(translator.insert_one(coll, arg(args, 0)).await?, ShellValue::from)
            }
            CollectionMethod::InsertMany => {
                reply_into(translator.insert_many(coll, arg(args, 0)).await?, ShellValue::from)
            }
            CollectionMethod::Update | CollectionMethod::UpdateOne | CollectionMethod::UpdateMany => {
                if arg(args, 1).is_null() {
                    return Ok(ShellValue::string("Update document required"));
                }
                let mode = update_mode(method, arg(args, 2));
                reply_into(
                    translator.update(coll, arg(args, 0), arg(args, 1), mode).await?,
                    ShellValue::from,
                )
            }
            CollectionMethod::DeleteOne => {
                reply_into(translator.delete(coll, arg(args, 0), false).await?, ShellValue::from)
            }
            CollectionMethod::DeleteMany => {
                reply_into(translator.delete(coll, arg(args, 0), true).await?, ShellValue::from)
            }
            CollectionMethod::Count if arg(args, 0).is_null() => {
                count_value(translator.estimated_document_count(coll).await?)
            }
            CollectionMethod::Count | CollectionMethod::CountDocuments => {
                count_value(translator.count_documents(coll, arg(args, 0)).await?)
            }
            CollectionMethod::EstimatedDocumentCount => {
                count_value(translator.estimated_document_count(coll).await?)
            }
            CollectionMethod::Aggregate => {
                reply_into(translator.aggregate(coll, arg(args, 0)).await?, documents_value)
            }
            CollectionMethod::Distinct => match arg(args, 0).as_str() {
                Some(field) => reply_into(
                    translator.distinct(coll, field, arg(args, 1)).await?,
                    |values| ShellValue::Canonical(Bson::Array(values)),
                ),
                None => ShellValue::string("Field name required"),
            },
            CollectionMethod::Drop => {
                reply_into(translator.drop_collection(coll).await?, ShellValue::String)
            }
            CollectionMethod::CreateIndex => {
                if arg(args, 0).is_null() {
                    return Ok(ShellValue::string("Index keys required"));
                }
                reply_into(
                    translator.create_index(coll, arg(args, 0), optional(args, 1)).await?,
                    ShellValue::String,
                )
            }
            CollectionMethod::GetIndexes => {
                reply_into(translator.get_indexes(coll).await?, documents_value)
            }
            CollectionMethod::Stats => {
                reply_into(translator.collection_stats(coll).await?, ShellValue::from)
            }
            CollectionMethod::GetName => ShellValue::string(coll),
        };
        Ok(value)
    }
}

fn optional(args: &[ShellValue], idx: usize) -> Option<&ShellValue> {
    args.get(idx).filter(|v| !v.is_null())
}

/// Third update argument: a bare upsert flag or `{upsert, multi}`.
fn update_mode(method: CollectionMethod, options: &ShellValue) -> UpdateMode {
    let mut mode = UpdateMode {
        many: method == CollectionMethod::UpdateMany,
        upsert: false,
    };
    if let Some(upsert) = options.as_bool() {
        mode.upsert = upsert;
    } else if !options.is_null() {
        mode.upsert = options.field("upsert").is_some_and(|v| v.truthy());
        if method == CollectionMethod::Update {
            mode.many = options.field("multi").is_some_and(|v| v.truthy());
        }
    }
    mode
}
