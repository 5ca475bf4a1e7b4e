//! Scripting bridge
//!
//! Proxy objects stand in for the database, its collections, cursors and
//! the replica set. Each proxy kind has an explicit table of known methods;
//! the database proxy additionally resolves any other member to a
//! collection proxy.
//!
//! Member access never performs I/O. Invocation goes through the proxy's
//! [`CommandTranslator`].

pub mod collection;
pub mod cursor;
pub mod database;
pub mod replica_set;
pub mod shell;
pub mod value;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use mongodb::bson::{Bson, Document};

pub use collection::CollectionProxy;
pub use cursor::CursorProxy;
pub use database::DatabaseProxy;
pub use replica_set::ReplicaSetProxy;
pub use shell::{HELP_TEXT, ShellMethod, ShellProxy};
pub use value::{BoundMethod, OpaqueValue, ProxyObject, RegexLiteral, ShellValue};

use crate::error::{Result, ScriptError, ShellError};
use crate::translator::{CommandTranslator, Reply};

static NULL: ShellValue = ShellValue::Null;

/// Positional argument, `null` when absent.
pub(crate) fn arg(args: &[ShellValue], idx: usize) -> &ShellValue {
    args.get(idx).unwrap_or(&NULL)
}

pub(crate) fn not_a_function(name: &str) -> ShellError {
    ScriptError::TypeError(format!("{name} is not a function")).into()
}

/// Notices surface to scripts as plain strings.
pub(crate) fn reply_into<T>(reply: Reply<T>, f: impl FnOnce(T) -> ShellValue) -> ShellValue {
    match reply {
        Reply::Value(v) => f(v),
        Reply::Notice(notice) => ShellValue::String(notice.to_string()),
    }
}

pub(crate) fn count_value(reply: Reply<u64>) -> ShellValue {
    reply_into(reply, |n| ShellValue::Canonical(Bson::Int64(n as i64)))
}

pub(crate) fn documents_value(docs: Vec<Document>) -> ShellValue {
    ShellValue::Canonical(Bson::Array(docs.into_iter().map(Bson::Document).collect()))
}

impl ProxyObject {
    /// Resolve `proxy.name` without performing I/O.
    pub fn get_member(&self, name: &str) -> ShellValue {
        match self {
            ProxyObject::Database(db) => db.get_member(name),
            ProxyObject::Collection(coll) => coll.get_member(name),
            ProxyObject::Cursor(cursor) => cursor.get_member(name),
            ProxyObject::ReplicaSet(rs) => rs.get_member(name),
            ProxyObject::Shell(_) => ShellValue::Null,
        }
    }

    /// Call `proxy.name(args...)`.
    pub async fn invoke(&self, name: &str, args: &[ShellValue]) -> Result<ShellValue> {
        match self {
            ProxyObject::Database(db) => db.invoke(name, args).await,
            ProxyObject::Collection(coll) => coll.invoke(name, args).await,
            ProxyObject::Cursor(cursor) => cursor.invoke(name, args).await,
            ProxyObject::ReplicaSet(rs) => rs.invoke(name, args).await,
            ProxyObject::Shell(shell) => shell.invoke(name, args).await,
        }
    }
}

/// Bindings visible to one evaluation, plus the lines it printed.
#[derive(Debug, Default)]
pub struct Scope {
    bindings: HashMap<String, ShellValue>,
    printed: Mutex<Vec<String>>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, name: impl Into<String>, value: ShellValue) {
        self.bindings.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&ShellValue> {
        self.bindings.get(name)
    }

    pub fn print(&self, line: impl Into<String>) {
        self.printed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.into());
    }

    pub fn take_output(&self) -> Vec<String> {
        std::mem::take(&mut *self.printed.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

/// The proxies for one endpoint.
#[derive(Debug)]
pub struct Bridge {
    translator: Arc<CommandTranslator>,
    db: Arc<DatabaseProxy>,
    rs: Arc<ReplicaSetProxy>,
    shell: Arc<ShellProxy>,
}

impl Bridge {
    pub fn new(translator: Arc<CommandTranslator>) -> Self {
        Self {
            db: Arc::new(DatabaseProxy::new(Arc::clone(&translator))),
            rs: Arc::new(ReplicaSetProxy::new(Arc::clone(&translator))),
            shell: Arc::new(ShellProxy::new(Arc::clone(&translator))),
            translator,
        }
    }

    pub fn translator(&self) -> &Arc<CommandTranslator> {
        &self.translator
    }

    pub fn database(&self) -> &Arc<DatabaseProxy> {
        &self.db
    }

    pub fn shell(&self) -> &Arc<ShellProxy> {
        &self.shell
    }

    /// A fresh scope holding `db`, `rs` and the shell functions. Built once
    /// per evaluation.
    pub fn seed_scope(&self) -> Scope {
        let mut scope = Scope::new();
        scope.bind("db", ShellValue::Proxy(ProxyObject::Database(Arc::clone(&self.db))));
        scope.bind("rs", ShellValue::Proxy(ProxyObject::ReplicaSet(Arc::clone(&self.rs))));
        for name in ShellMethod::NAMES {
            scope.bind(name, self.shell.function(name));
        }
        scope
    }
}

/// Rewrite `db.a.b.method(` into `db.getCollection('a.b').method(`.
///
/// Only chains of three or more segments ending in a call are touched.
/// String and regex literals and comments pass through unchanged.
pub fn rewrite_dotted(source: &str) -> String {
    let chars: Vec<char> = source.chars().collect();
    let mut out = String::with_capacity(source.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if let Some(end) = literal_end(&chars, i) {
            out.extend(&chars[i..end]);
            i = end;
            continue;
        }

        let at_word_start = i == 0 || !(is_ident(chars[i - 1]) || chars[i - 1] == '.');
        if at_word_start && starts_with(&chars, i, "db.") {
            if let Some((segments, end)) = member_chain(&chars, i + 3) {
                if let Some((method, collection)) = segments.split_last() {
                    if collection.len() >= 2 && chars.get(end) == Some(&'(') {
                        out.push_str(&format!(
                            "db.getCollection('{}').{}",
                            collection.join("."),
                            method
                        ));
                        i = end;
                        continue;
                    }
                }
            }
        }

        out.push(c);
        i += 1;
    }
    out
}

/// Rewrite statements written as shell commands into calls.
///
/// `use shop` becomes `use('shop')`, `show dbs` becomes `show('dbs')`, and
/// a bare `it`, `help`, `use` or `show` gets `()` appended. Statements end
/// at `;` or at a line break outside brackets.
pub fn rewrite_shell_commands(source: &str) -> String {
    let chars: Vec<char> = source.chars().collect();
    let mut out = String::with_capacity(source.len());
    let mut depth: usize = 0;
    let mut statement_start = 0;
    let mut i = 0;

    while i < chars.len() {
        if let Some(end) = literal_end(&chars, i) {
            i = end;
            continue;
        }
        match chars[i] {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            ';' | '\n' if depth == 0 => {
                push_statement(&mut out, &chars[statement_start..i]);
                out.push(chars[i]);
                statement_start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    push_statement(&mut out, &chars[statement_start..]);
    out
}

fn push_statement(out: &mut String, statement: &[char]) {
    let text: String = statement.iter().collect();
    match shell_call(text.trim()) {
        Some(call) => {
            let leading = text.len() - text.trim_start().len();
            out.push_str(&text[..leading]);
            out.push_str(&call);
            out.push_str(&text[text.trim_end().len()..]);
        }
        None => out.push_str(&text),
    }
}

/// Call form of a statement written as a shell command.
fn shell_call(statement: &str) -> Option<String> {
    let (word, rest) = statement
        .split_once(char::is_whitespace)
        .unwrap_or((statement, ""));
    let method = ShellMethod::from_name(word)?;
    let rest = rest.trim();
    if rest.is_empty() {
        return Some(format!("{word}()"));
    }
    match method {
        ShellMethod::Use | ShellMethod::Show if is_command_argument(rest) => {
            Some(format!("{word}('{rest}')"))
        }
        _ => None,
    }
}

/// A database name or `show` target: one word, no punctuation but `.`,
/// `-` and `_`.
pub fn is_command_argument(text: &str) -> bool {
    !text.is_empty() && text.chars().all(|c| is_ident(c) || c == '.' || c == '-')
}

fn is_ident(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn starts_with(chars: &[char], at: usize, prefix: &str) -> bool {
    prefix
        .chars()
        .enumerate()
        .all(|(k, p)| chars.get(at + k) == Some(&p))
}

/// End of the string literal, regex literal or `//` comment starting at
/// `at`. With no division operator, every other `/` opens a regex.
fn literal_end(chars: &[char], at: usize) -> Option<usize> {
    match chars[at] {
        '"' | '\'' => Some(string_end(chars, at)),
        '/' if chars.get(at + 1) == Some(&'/') => Some(
            chars[at..]
                .iter()
                .position(|c| *c == '\n')
                .map_or(chars.len(), |p| at + p),
        ),
        '/' => Some(regex_end(chars, at)),
        _ => None,
    }
}

/// Index after the regex literal at `start`, flags included. An
/// unterminated literal ends at the line break.
fn regex_end(chars: &[char], start: usize) -> usize {
    let mut i = start + 1;
    let mut in_class = false;
    while i < chars.len() {
        match chars[i] {
            '\n' => return i,
            '\\' => i += 1,
            '[' => in_class = true,
            ']' => in_class = false,
            '/' if !in_class => {
                i += 1;
                while i < chars.len() && chars[i].is_ascii_alphabetic() {
                    i += 1;
                }
                return i;
            }
            _ => {}
        }
        i += 1;
    }
    chars.len()
}

/// Index one past the closing quote of the literal starting at `start`.
fn string_end(chars: &[char], start: usize) -> usize {
    let quote = chars[start];
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            c if c == quote => return i + 1,
            _ => i += 1,
        }
    }
    chars.len()
}

/// Dot-separated identifiers starting at `start`, and the index after them.
fn member_chain(chars: &[char], start: usize) -> Option<(Vec<String>, usize)> {
    let mut segments = Vec::new();
    let mut i = start;
    loop {
        let begin = i;
        while i < chars.len() && is_ident(chars[i]) {
            i += 1;
        }
        if i == begin {
            return None;
        }
        segments.push(chars[begin..i].iter().collect());
        if chars.get(i) == Some(&'.') && chars.get(i + 1).is_some_and(|c| is_ident(*c)) {
            i += 1;
        } else {
            return Some((segments, i));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;

    #[test]
    fn test_rewrite_dotted_collection() {
        assert_eq!(
            rewrite_dotted("db.a.b.find({})"),
            "db.getCollection('a.b').find({})"
        );
        assert_eq!(
            rewrite_dotted("db.logs.2024.jan.count()"),
            "db.getCollection('logs.2024.jan').count()"
        );
    }

    #[test]
    fn test_rewrite_leaves_simple_chains() {
        for src in [
            "db.orders.find({}).sort({a: 1})",
            "db.getName()",
            "mydb.a.b.find()",
            "db.a.b",
            "print('db.a.b.find()')",
        ] {
            assert_eq!(rewrite_dotted(src), src);
        }
    }

    #[test]
    fn test_rewrite_after_string_literal() {
        assert_eq!(
            rewrite_dotted("print(\"x\"); db.a.b.drop()"),
            "print(\"x\"); db.getCollection('a.b').drop()"
        );
    }

    #[test]
    fn test_rewrite_skips_regex_literals() {
        assert_eq!(
            rewrite_dotted("db.a.find({n: /it's/}); db.x.y.count()"),
            "db.a.find({n: /it's/}); db.getCollection('x.y').count()"
        );
        assert_eq!(
            rewrite_dotted("db.a.find({n: /[/\"]db.p.q.r(/}); db.x.y.drop()"),
            "db.a.find({n: /[/\"]db.p.q.r(/}); db.getCollection('x.y').drop()"
        );
        assert_eq!(
            rewrite_dotted("// don't\ndb.x.y.count()"),
            "// don't\ndb.getCollection('x.y').count()"
        );
    }

    #[test]
    fn test_rewrite_shell_commands() {
        assert_eq!(
            rewrite_shell_commands("use shop\ndb.orders.insertOne({a: 1})"),
            "use('shop')\ndb.orders.insertOne({a: 1})"
        );
        assert_eq!(
            rewrite_shell_commands("use shop; show collections;\n  it\nhelp"),
            "use('shop'); show('collections');\n  it()\nhelp()"
        );
        assert_eq!(rewrite_shell_commands("use"), "use()");
    }

    #[test]
    fn test_rewrite_shell_commands_leaves_expressions() {
        for src in [
            "use('shop')",
            "show('dbs')",
            "print('use shop')",
            "db.items.find({\n  it: 1\n})",
            "db.items.find({n: /;\\n/})",
            "use shop extra",
        ] {
            assert_eq!(rewrite_shell_commands(src), src);
        }
    }

    #[test]
    fn test_seeded_scope_has_proxies() {
        let transport = Arc::new(MemoryTransport::new("mem"));
        let translator = Arc::new(CommandTranslator::new(transport, Some("test".into()), 20));
        let bridge = Bridge::new(translator);
        let scope = bridge.seed_scope();
        assert!(matches!(scope.get("db"), Some(ShellValue::Proxy(ProxyObject::Database(_)))));
        assert!(matches!(scope.get("rs"), Some(ShellValue::Proxy(ProxyObject::ReplicaSet(_)))));
        assert!(matches!(scope.get("use"), Some(ShellValue::Method(m)) if m.name == "use"));

        scope.print("hello");
        assert_eq!(scope.take_output(), vec!["hello".to_string()]);
        assert!(scope.take_output().is_empty());
    }

    #[test]
    fn test_notices_become_strings() {
        let transport = Arc::new(MemoryTransport::new("mem"));
        let translator = Arc::new(CommandTranslator::new(transport, None, 20));
        let reply = translator.open_cursor(Default::default()).map(|_| ());
        let value = reply_into(reply, |_| ShellValue::Null);
        assert_eq!(value.as_str(), Some("No database selected"));
    }
}
