//! Database proxy (`db`)

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use mongodb::bson::{Bson, Document};
use tracing::debug;

use super::collection::CollectionProxy;
use super::value::{BoundMethod, ProxyObject, ShellValue};
use super::{arg, not_a_function, reply_into};
use crate::error::Result;
use crate::translator::{CommandTranslator, to_document};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseMethod {
    GetName,
    GetCollectionNames,
    CreateCollection,
    DropDatabase,
    Stats,
    RunCommand,
    GetCollection,
}

impl DatabaseMethod {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "getName" => Some(Self::GetName),
            "getCollectionNames" => Some(Self::GetCollectionNames),
            "createCollection" => Some(Self::CreateCollection),
            "dropDatabase" => Some(Self::DropDatabase),
            "stats" => Some(Self::Stats),
            "runCommand" => Some(Self::RunCommand),
            "getCollection" => Some(Self::GetCollection),
            _ => None,
        }
    }
}

/// Proxy for the active database.
///
/// Any member that is not a database method resolves to a collection proxy,
/// memoized per name. Collection proxies resolve the database at call time,
/// so they stay valid across `use`.
#[derive(Debug)]
pub struct DatabaseProxy {
    translator: Arc<CommandTranslator>,
    collections: Mutex<HashMap<String, Arc<CollectionProxy>>>,
}

impl DatabaseProxy {
    pub fn new(translator: Arc<CommandTranslator>) -> Self {
        Self {
            translator,
            collections: Mutex::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> String {
        self.translator.database_name().unwrap_or_default()
    }

    /// Memoized collection proxy for `name`.
    pub fn collection(&self, name: &str) -> Arc<CollectionProxy> {
        let mut collections = self.collections.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            collections
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(CollectionProxy::new(Arc::clone(&self.translator), name))),
        )
    }

    pub fn get_member(self: &Arc<Self>, name: &str) -> ShellValue {
        debug!("db.{}", name);
        if DatabaseMethod::from_name(name).is_some() {
            ShellValue::Method(BoundMethod {
                receiver: ProxyObject::Database(Arc::clone(self)),
                name: name.to_string(),
            })
        } else {
            ShellValue::Proxy(ProxyObject::Collection(self.collection(name)))
        }
    }

    pub async fn invoke(self: &Arc<Self>, name: &str, args: &[ShellValue]) -> Result<ShellValue> {
        let Some(method) = DatabaseMethod::from_name(name) else {
            return Err(not_a_function(&format!("db.{name}")));
        };
        debug!("db.{}({} arg(s))", name, args.len());

        match method {
            DatabaseMethod::GetName => Ok(ShellValue::String(self.name())),
            DatabaseMethod::GetCollectionNames => {
                let reply = self.translator.collection_names().await?;
                Ok(reply_into(reply, |names| {
                    ShellValue::Array(names.into_iter().map(ShellValue::String).collect())
                }))
            }
            DatabaseMethod::CreateCollection => match arg(args, 0).as_str() {
                Some(collection) => Ok(reply_into(
                    self.translator.create_collection(collection).await?,
                    ShellValue::String,
                )),
                None => Ok(ShellValue::string("Collection name required")),
            },
            DatabaseMethod::DropDatabase => Ok(reply_into(
                self.translator.drop_database().await?,
                ShellValue::String,
            )),
            DatabaseMethod::Stats => Ok(reply_into(
                self.translator.database_stats().await?,
                ShellValue::from,
            )),
            DatabaseMethod::RunCommand => {
                let command = match arg(args, 0) {
                    ShellValue::Null => return Ok(ShellValue::string("Command required")),
                    ShellValue::String(name) => {
                        let mut command = Document::new();
                        command.insert(name.clone(), Bson::Int32(1));
                        command
                    }
                    other => to_document(other),
                };
                Ok(reply_into(
                    self.translator.run_command(command).await?,
                    ShellValue::from,
                ))
            }
            DatabaseMethod::GetCollection => match arg(args, 0).as_str() {
                Some(collection) => Ok(ShellValue::Proxy(ProxyObject::Collection(
                    self.collection(collection),
                ))),
                None => Ok(ShellValue::string("Collection name required")),
            },
        }
    }
}
