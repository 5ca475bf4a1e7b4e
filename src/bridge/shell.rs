//! Shell commands callable from scripts: `use`, `show`, `it` and `help`
//!
//! The session answers these itself when they make up the whole input.
//! Inside a longer script they are bound as functions, and statements
//! written in command form (`use shop`) are first rewritten into calls by
//! [`super::rewrite_shell_commands`].
//!
//! The proxy also owns the session's last cursor, which `it` continues.

use std::sync::{Arc, Mutex, PoisonError};

use mongodb::bson::Bson;

use super::cursor::CursorProxy;
use super::value::{BoundMethod, ProxyObject, ShellValue};
use super::{arg, documents_value, not_a_function, reply_into};
use crate::error::Result;
use crate::translator::{CommandTranslator, ShowOutput};

pub const HELP_TEXT: &str = "\
Shell Help

Database Commands:
  use <db>                      Switch to database
  show dbs                      Show all databases
  show collections              Show collections in current database
  show users                    Show users of the current database
  show profile                  Show recent profiling entries
  db.<collection>.find()        Find documents
  db.<collection>.insertOne()   Insert a document
  db.<collection>.updateOne()   Update a document
  db.<collection>.deleteOne()   Remove a document
  db.<collection>.count()       Estimated document count
  rs.status()                   Replica set status

Shell Commands:
  help                          Show this help
  it                            Show more results from the last cursor
  exit                          Exit the shell";

const NO_CURSOR: &str = "no cursor";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellMethod {
    Use,
    Show,
    It,
    Help,
}

impl ShellMethod {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "use" => Some(Self::Use),
            "show" => Some(Self::Show),
            "it" => Some(Self::It),
            "help" => Some(Self::Help),
            _ => None,
        }
    }

    pub const NAMES: [&'static str; 4] = ["use", "show", "it", "help"];
}

#[derive(Debug)]
pub struct ShellProxy {
    translator: Arc<CommandTranslator>,
    last_cursor: Mutex<Option<Arc<CursorProxy>>>,
}

impl ShellProxy {
    pub fn new(translator: Arc<CommandTranslator>) -> Self {
        Self {
            translator,
            last_cursor: Mutex::new(None),
        }
    }

    /// The function value bound to `name` in script scopes.
    pub fn function(self: &Arc<Self>, name: &str) -> ShellValue {
        ShellValue::Method(BoundMethod {
            receiver: ProxyObject::Shell(Arc::clone(self)),
            name: name.to_string(),
        })
    }

    pub fn last_cursor(&self) -> Option<Arc<CursorProxy>> {
        self.slot().clone()
    }

    /// Store `cursor` as the cursor `it` continues; returns the one it replaced.
    pub fn replace_last_cursor(&self, cursor: Option<Arc<CursorProxy>>) -> Option<Arc<CursorProxy>> {
        std::mem::replace(&mut *self.slot(), cursor)
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<Arc<CursorProxy>>> {
        self.last_cursor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Switch the active database.
    pub fn use_database(&self, name: Option<&str>) -> String {
        match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => self.translator.use_database(name),
            None => "specify database name".to_string(),
        }
    }

    /// The last cursor while it has more results, else the `no cursor` message.
    pub async fn it(&self) -> ShellValue {
        match self.last_cursor() {
            Some(cursor) if cursor.has_more().await => ShellValue::Proxy(ProxyObject::Cursor(cursor)),
            _ => ShellValue::string(NO_CURSOR),
        }
    }

    pub async fn invoke(&self, name: &str, args: &[ShellValue]) -> Result<ShellValue> {
        let Some(method) = ShellMethod::from_name(name) else {
            return Err(not_a_function(name));
        };
        let argument = arg(args, 0);
        let text = (!argument.is_null()).then(|| argument.to_string());

        Ok(match method {
            ShellMethod::Use => ShellValue::String(self.use_database(text.as_deref())),
            ShellMethod::Show => match text {
                Some(what) => {
                    let reply = self.translator.execute_show_command(&what).await?;
                    reply_into(reply, |output| match output {
                        ShowOutput::Names(names) => ShellValue::Canonical(Bson::Array(
                            names.into_iter().map(Bson::String).collect(),
                        )),
                        ShowOutput::Documents(docs) => documents_value(docs),
                    })
                }
                None => ShellValue::string("show requires an argument"),
            },
            ShellMethod::It => self.it().await,
            ShellMethod::Help => ShellValue::string(HELP_TEXT),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translator::QueryDescriptor;
    use crate::transport::MemoryTransport;
    use mongodb::bson::doc;

    fn proxy(db: Option<&str>) -> (Arc<MemoryTransport>, Arc<ShellProxy>) {
        let transport = Arc::new(MemoryTransport::new("mem"));
        let translator = Arc::new(CommandTranslator::new(
            transport.clone(),
            db.map(String::from),
            20,
        ));
        (transport, Arc::new(ShellProxy::new(translator)))
    }

    #[tokio::test]
    async fn test_use_switches_database() {
        let (_, shell) = proxy(None);
        let reply = shell.invoke("use", &[ShellValue::string("shop")]).await.unwrap();
        assert_eq!(reply.as_str(), Some("switched to db shop"));
        assert_eq!(shell.translator.database_name().as_deref(), Some("shop"));

        let reply = shell.invoke("use", &[]).await.unwrap();
        assert_eq!(reply.as_str(), Some("specify database name"));
    }

    #[tokio::test]
    async fn test_show_and_help() {
        let (transport, shell) = proxy(Some("shop"));
        transport.seed(&crate::translator::Namespace::new("shop", "orders"), vec![doc! { "a": 1 }]);

        let names = shell.invoke("show", &[ShellValue::string("collections")]).await.unwrap();
        assert!(matches!(names, ShellValue::Canonical(Bson::Array(items))
            if items == vec![Bson::String("orders".into())]));

        let missing = shell.invoke("show", &[]).await.unwrap();
        assert_eq!(missing.as_str(), Some("show requires an argument"));
        let unknown = shell.invoke("show", &[ShellValue::string("nope")]).await.unwrap();
        assert_eq!(unknown.as_str(), Some("Unknown show command: nope"));

        let help = shell.invoke("help", &[]).await.unwrap();
        assert!(help.as_str().is_some_and(|h| h.starts_with("Shell Help")));
    }

    #[tokio::test]
    async fn test_it_follows_last_cursor() {
        let (_, shell) = proxy(Some("shop"));
        assert_eq!(shell.it().await.as_str(), Some("no cursor"));

        let cursor = Arc::new(CursorProxy::new(
            Arc::clone(&shell.translator),
            QueryDescriptor::new("orders", doc! {}),
        ));
        assert!(shell.replace_last_cursor(Some(Arc::clone(&cursor))).is_none());
        assert!(matches!(shell.it().await, ShellValue::Proxy(ProxyObject::Cursor(_))));

        cursor.close().await;
        assert_eq!(shell.it().await.as_str(), Some("no cursor"));
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let (_, shell) = proxy(None);
        let err = shell.invoke("exit", &[]).await.unwrap_err();
        assert_eq!(err.to_string(), "TypeError: exit is not a function");
    }
}
