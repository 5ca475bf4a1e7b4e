//! Values exchanged between the script evaluator and the proxy layer.
//!
//! Everything the evaluator can produce is one of the [`ShellValue`]
//! variants. Foreign values are reduced to canonical documents exactly once,
//! at the translator boundary, by [`crate::translator::convert`].

use std::fmt;
use std::sync::Arc;

use mongodb::bson::Bson;

use super::collection::CollectionProxy;
use super::cursor::CursorProxy;
use super::database::DatabaseProxy;
use super::replica_set::ReplicaSetProxy;
use super::shell::ShellProxy;

/// A dynamic value as seen by scripts.
#[derive(Debug, Clone)]
pub enum ShellValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    /// A `/pattern/flags` literal.
    Regex(RegexLiteral),
    /// An object literal; key order is preserved.
    Object(Vec<(String, ShellValue)>),
    Array(Vec<ShellValue>),
    /// A value that already is a canonical document value.
    Canonical(Bson),
    /// A host value the bridge does not model, known only by its text.
    Opaque(OpaqueValue),
    Proxy(ProxyObject),
    /// A proxy method looked up but not yet called.
    Method(BoundMethod),
}

/// A regular-expression literal.
///
/// `source` and `flags` are the structured accessors; `text` is the
/// `/pattern/flags` form used when the structured parts are absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegexLiteral {
    pub source: Option<String>,
    pub flags: Option<String>,
    pub text: String,
}

impl RegexLiteral {
    pub fn new(pattern: impl Into<String>, flags: impl Into<String>) -> Self {
        let pattern = pattern.into();
        let flags = flags.into();
        let text = format!("/{pattern}/{flags}");
        Self {
            source: Some(pattern),
            flags: Some(flags),
            text,
        }
    }

    /// A literal known only by its textual form.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            source: None,
            flags: None,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OpaqueValue {
    pub type_name: String,
    pub text: String,
    /// Inner value for host wrappers that box another value (e.g. a wrapped
    /// regex).
    pub wrapped: Option<Box<ShellValue>>,
}

/// Capability-tagged proxy handle.
#[derive(Debug, Clone)]
pub enum ProxyObject {
    Database(Arc<DatabaseProxy>),
    Collection(Arc<CollectionProxy>),
    Cursor(Arc<CursorProxy>),
    ReplicaSet(Arc<ReplicaSetProxy>),
    /// Receiver of the `use`, `show`, `it` and `help` functions.
    Shell(Arc<ShellProxy>),
}

#[derive(Debug, Clone)]
pub struct BoundMethod {
    pub receiver: ProxyObject,
    pub name: String,
}

impl ShellValue {
    pub fn string(s: impl Into<String>) -> Self {
        ShellValue::String(s.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ShellValue::Null | ShellValue::Canonical(Bson::Null))
    }

    /// Name used in `TypeError` messages.
    pub fn type_name(&self) -> &str {
        match self {
            ShellValue::Null => "null",
            ShellValue::Bool(_) => "boolean",
            ShellValue::Number(_) => "number",
            ShellValue::String(_) => "string",
            ShellValue::Regex(_) => "RegExp",
            ShellValue::Object(_) => "object",
            ShellValue::Array(_) => "array",
            ShellValue::Canonical(_) => "object",
            ShellValue::Opaque(o) => &o.type_name,
            ShellValue::Proxy(p) => p.type_name(),
            ShellValue::Method(_) => "function",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ShellValue::String(s) => Some(s),
            ShellValue::Canonical(Bson::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ShellValue::Number(n) => Some(*n),
            ShellValue::Canonical(Bson::Int32(n)) => Some(f64::from(*n)),
            ShellValue::Canonical(Bson::Int64(n)) => Some(*n as f64),
            ShellValue::Canonical(Bson::Double(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ShellValue::Bool(b) => Some(*b),
            ShellValue::Canonical(Bson::Boolean(b)) => Some(*b),
            _ => None,
        }
    }

    /// Script truthiness, used by `!` and boolean options.
    pub fn truthy(&self) -> bool {
        match self {
            ShellValue::Null => false,
            ShellValue::Bool(b) => *b,
            ShellValue::Number(n) => *n != 0.0 && !n.is_nan(),
            ShellValue::String(s) => !s.is_empty(),
            ShellValue::Canonical(Bson::Null) => false,
            ShellValue::Canonical(Bson::Boolean(b)) => *b,
            ShellValue::Canonical(Bson::String(s)) => !s.is_empty(),
            ShellValue::Canonical(b) => match b {
                Bson::Int32(n) => *n != 0,
                Bson::Int64(n) => *n != 0,
                Bson::Double(n) => *n != 0.0,
                _ => true,
            },
            _ => true,
        }
    }

    /// Look up a member of a plain (non-proxy) value.
    pub fn field(&self, name: &str) -> Option<ShellValue> {
        match self {
            ShellValue::Object(entries) => entries
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone()),
            ShellValue::Canonical(Bson::Document(doc)) => {
                doc.get(name).map(|b| ShellValue::Canonical(b.clone()))
            }
            ShellValue::Array(items) if name == "length" => Some(ShellValue::Number(items.len() as f64)),
            ShellValue::Canonical(Bson::Array(items)) if name == "length" => {
                Some(ShellValue::Number(items.len() as f64))
            }
            ShellValue::String(s) if name == "length" => {
                Some(ShellValue::Number(s.chars().count() as f64))
            }
            ShellValue::Regex(r) => match name {
                "source" => r.source.clone().map(ShellValue::String),
                "flags" => r.flags.clone().map(ShellValue::String),
                _ => None,
            },
            _ => None,
        }
    }

    /// Index into an array value.
    pub fn index(&self, idx: usize) -> Option<ShellValue> {
        match self {
            ShellValue::Array(items) => items.get(idx).cloned(),
            ShellValue::Canonical(Bson::Array(items)) => {
                items.get(idx).map(|b| ShellValue::Canonical(b.clone()))
            }
            _ => None,
        }
    }
}

impl fmt::Display for ShellValue {
    /// Textual form, as a script would see it when coercing to string.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShellValue::Null => write!(f, "null"),
            ShellValue::Bool(b) => write!(f, "{b}"),
            ShellValue::Number(n) => {
                if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{n}")
                }
            }
            ShellValue::String(s) => write!(f, "{s}"),
            ShellValue::Regex(r) => write!(f, "{}", r.text),
            ShellValue::Object(_) => write!(f, "[object Object]"),
            ShellValue::Array(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "{}", parts.join(","))
            }
            ShellValue::Canonical(Bson::String(s)) => write!(f, "{s}"),
            ShellValue::Canonical(Bson::Int32(n)) => write!(f, "{n}"),
            ShellValue::Canonical(Bson::Int64(n)) => write!(f, "{n}"),
            ShellValue::Canonical(Bson::Double(n)) => write!(f, "{}", ShellValue::Number(*n)),
            ShellValue::Canonical(b) => write!(f, "{b}"),
            ShellValue::Opaque(o) => write!(f, "{}", o.text),
            ShellValue::Proxy(p) => write!(f, "{}", p.describe()),
            ShellValue::Method(m) => write!(f, "{}.{}", m.receiver.describe(), m.name),
        }
    }
}

impl From<Bson> for ShellValue {
    fn from(value: Bson) -> Self {
        ShellValue::Canonical(value)
    }
}

impl From<mongodb::bson::Document> for ShellValue {
    fn from(doc: mongodb::bson::Document) -> Self {
        ShellValue::Canonical(Bson::Document(doc))
    }
}

impl ProxyObject {
    pub fn type_name(&self) -> &'static str {
        match self {
            ProxyObject::Database(_) => "Database",
            ProxyObject::Collection(_) => "Collection",
            ProxyObject::Cursor(_) => "Cursor",
            ProxyObject::ReplicaSet(_) => "ReplicaSet",
            ProxyObject::Shell(_) => "Shell",
        }
    }

    /// Textual form used by the converter and by `print`.
    pub fn describe(&self) -> String {
        match self {
            ProxyObject::Database(db) => db.name(),
            ProxyObject::Collection(coll) => coll.full_name(),
            ProxyObject::Cursor(cursor) => format!("Cursor({})", cursor.collection()),
            ProxyObject::ReplicaSet(_) => "rs".to_string(),
            ProxyObject::Shell(_) => "shell".to_string(),
        }
    }
}
