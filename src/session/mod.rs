//! Shell session
//!
//! A [`Session`] ties one endpoint's translator and bridge to a script
//! evaluator. It handles the shell commands (`use`, `show`, `it`, `help`)
//! itself and hands everything else to the evaluator, then turns the
//! returned value into an [`ExecutionResult`].
//!
//! Inside longer scripts the same commands run as the functions bound by
//! [`crate::bridge::ShellProxy`], which also keeps the cursor most recently
//! returned so that `it` can continue it.

use std::sync::Arc;
use std::time::Instant;

use mongodb::bson::Document;
use tracing::{debug, info};

use crate::bridge::{
    Bridge, CursorProxy, ProxyObject, ShellValue, is_command_argument, rewrite_dotted,
    rewrite_shell_commands,
};
use crate::error::Result;
use crate::executor::{ExecutionResult, ResultData};
use crate::script::{ExpressionEvaluator, ScriptEvaluator};
use crate::translator::{CommandTranslator, Reply, ShowOutput, convert};

pub use crate::bridge::HELP_TEXT;

/// Commands the session answers without the evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShellCommand<'a> {
    Empty,
    Help,
    It,
    Use(Option<&'a str>),
    Show(Option<&'a str>),
    Script(&'a str),
}

impl<'a> ShellCommand<'a> {
    fn parse(input: &'a str) -> Self {
        let trimmed = input.trim();
        let bare = trimmed.trim_end_matches(';').trim_end();

        if bare.is_empty() {
            return ShellCommand::Empty;
        }
        match bare {
            "help" | "help()" => return ShellCommand::Help,
            "it" => return ShellCommand::It,
            "use" => return ShellCommand::Use(None),
            "show" => return ShellCommand::Show(None),
            _ => {}
        }

        let (word, rest) = bare.split_once(char::is_whitespace).unwrap_or((bare, ""));
        let rest = rest.trim();
        match word {
            "use" if is_command_argument(rest) => ShellCommand::Use(Some(rest)),
            "show" if is_command_argument(rest) => ShellCommand::Show(Some(rest)),
            _ => ShellCommand::Script(trimmed),
        }
    }
}

/// What the session remembers between commands, besides the last cursor.
#[derive(Debug, Default)]
pub struct SessionState {
    closed: bool,
}

/// How cursor results are presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CursorMode {
    /// Pull one batch and keep the cursor for `it`.
    Interactive,
    /// Drain every batch and close the cursor.
    Materialized,
}

/// One endpoint's shell.
pub struct Session {
    name: String,
    bridge: Bridge,
    evaluator: Arc<dyn ScriptEvaluator>,
    state: SessionState,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("name", &self.name)
            .field("state", &self.state)
            .finish()
    }
}

impl Session {
    /// Create a session using the built-in expression evaluator
    ///
    /// # Arguments
    /// * `name` - Label for logs and shard banners
    /// * `translator` - Translator for this session's endpoint
    pub fn new(name: impl Into<String>, translator: Arc<CommandTranslator>) -> Self {
        Self::with_evaluator(name, translator, Arc::new(ExpressionEvaluator::new()))
    }

    pub fn with_evaluator(
        name: impl Into<String>,
        translator: Arc<CommandTranslator>,
        evaluator: Arc<dyn ScriptEvaluator>,
    ) -> Self {
        Self {
            name: name.into(),
            bridge: Bridge::new(translator),
            evaluator,
            state: SessionState::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn translator(&self) -> &Arc<CommandTranslator> {
        self.bridge.translator()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Cursor the next `it` continues, if it still has results.
    pub fn last_cursor(&self) -> Option<Arc<CursorProxy>> {
        self.bridge.shell().last_cursor()
    }

    /// Execute one command. A cursor result yields its first batch.
    pub async fn execute(&mut self, text: &str) -> Result<ExecutionResult> {
        self.run(text, CursorMode::Interactive).await
    }

    /// Execute one command, draining any cursor result completely.
    pub async fn execute_materialized(&mut self, text: &str) -> Result<ExecutionResult> {
        self.run(text, CursorMode::Materialized).await
    }

    async fn run(&mut self, text: &str, mode: CursorMode) -> Result<ExecutionResult> {
        let start = Instant::now();
        let result = match ShellCommand::parse(text) {
            ShellCommand::Empty => ExecutionResult::none(),
            ShellCommand::Help => ExecutionResult::message(HELP_TEXT),
            ShellCommand::It => {
                let value = self.bridge.shell().it().await;
                self.present(value, mode).await?
            }
            ShellCommand::Use(name) => ExecutionResult::message(self.bridge.shell().use_database(name)),
            ShellCommand::Show(None) => ExecutionResult::message("show requires an argument"),
            ShellCommand::Show(Some(what)) => {
                let data = match self.translator().execute_show_command(what).await? {
                    Reply::Value(ShowOutput::Names(names)) => ResultData::List(names),
                    Reply::Value(ShowOutput::Documents(docs)) => ResultData::Documents(docs),
                    Reply::Notice(notice) => ResultData::Message(notice.to_string()),
                };
                ExecutionResult::new(data)
            }
            ShellCommand::Script(source) => {
                let source = rewrite_dotted(&rewrite_shell_commands(source));
                debug!("[{}] evaluating: {}", self.name, source);
                let scope = self.bridge.seed_scope();
                let value = self.evaluator.evaluate(&source, &scope).await?;
                let printed = scope.take_output();
                self.present(value, mode).await?.with_printed(printed)
            }
        };

        Ok(result.with_elapsed_ms(start.elapsed().as_millis() as u64))
    }

    async fn present(&mut self, value: ShellValue, mode: CursorMode) -> Result<ExecutionResult> {
        let data = match value {
            ShellValue::Null => ResultData::None,
            ShellValue::String(s) => ResultData::Message(s),
            ShellValue::Proxy(ProxyObject::Cursor(cursor)) => match mode {
                CursorMode::Interactive => {
                    let pulled = pull_batch(&cursor).await;
                    let keep = pulled.is_ok() && cursor.executed().await && cursor.has_more().await;
                    self.settle_cursor(cursor, keep).await;
                    pulled?
                }
                CursorMode::Materialized => {
                    let drained = drain(&cursor).await;
                    self.settle_cursor(cursor, false).await;
                    drained?
                }
            },
            ShellValue::Proxy(proxy) => ResultData::Message(proxy.describe()),
            ShellValue::Method(method) => {
                ResultData::Message(format!("[Function: {}]", method.name))
            }
            other => ResultData::from_bson(convert(&other)),
        };
        Ok(ExecutionResult::new(data))
    }

    /// Make `cursor` the last cursor when `keep`, else close it. Whatever
    /// cursor it replaces is closed.
    async fn settle_cursor(&mut self, cursor: Arc<CursorProxy>, keep: bool) {
        let next = keep.then(|| Arc::clone(&cursor));
        let previous = self.bridge.shell().replace_last_cursor(next);
        if !keep {
            cursor.close().await;
        }
        if let Some(previous) = previous.filter(|p| !Arc::ptr_eq(p, &cursor)) {
            debug!("[{}] releasing cursor on {}", self.name, previous.collection());
            previous.close().await;
        }
    }

    /// Release the last cursor, then the translator's connection.
    ///
    /// Calling this twice is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        if self.state.closed {
            return Ok(());
        }
        self.state.closed = true;

        if let Some(cursor) = self.bridge.shell().replace_last_cursor(None) {
            cursor.close().await;
        }
        info!("[{}] closing session", self.name);
        self.translator().shutdown().await
    }
}

async fn pull_batch(cursor: &CursorProxy) -> Result<ResultData> {
    Ok(match cursor.next_batch().await? {
        Reply::Value(documents) => ResultData::Batch {
            documents,
            has_more: cursor.has_more().await,
        },
        Reply::Notice(notice) => ResultData::Message(notice.to_string()),
    })
}

async fn drain(cursor: &CursorProxy) -> Result<ResultData> {
    let mut documents: Vec<Document> = Vec::new();
    loop {
        match cursor.next_batch().await? {
            Reply::Value(batch) => documents.extend(batch),
            Reply::Notice(notice) => return Ok(ResultData::Message(notice.to_string())),
        }
        if !cursor.has_more().await {
            break;
        }
    }
    Ok(ResultData::Documents(documents))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translator::Namespace;
    use crate::transport::MemoryTransport;
    use mongodb::bson::{Bson, doc};

    fn session_with(n: i32, batch: usize) -> (Arc<MemoryTransport>, Session) {
        let transport = Arc::new(MemoryTransport::new("mem"));
        transport.seed(
            &Namespace::new("shop", "items"),
            (0..n).map(|i| doc! { "_id": i }).collect(),
        );
        let translator = Arc::new(CommandTranslator::new(
            transport.clone(),
            Some("shop".into()),
            batch,
        ));
        (transport, Session::new("mem", translator))
    }

    #[test]
    fn test_shell_command_parsing() {
        assert_eq!(ShellCommand::parse("  "), ShellCommand::Empty);
        assert_eq!(ShellCommand::parse("help()"), ShellCommand::Help);
        assert_eq!(ShellCommand::parse("it;"), ShellCommand::It);
        assert_eq!(ShellCommand::parse("use shop"), ShellCommand::Use(Some("shop")));
        assert_eq!(ShellCommand::parse("use"), ShellCommand::Use(None));
        assert_eq!(ShellCommand::parse("show dbs"), ShellCommand::Show(Some("dbs")));
        assert_eq!(
            ShellCommand::parse("use shop;db.items.count()"),
            ShellCommand::Script("use shop;db.items.count()")
        );
        assert_eq!(
            ShellCommand::parse("db.items.find()"),
            ShellCommand::Script("db.items.find()")
        );
    }

    #[tokio::test]
    async fn test_use_and_missing_arguments() {
        let (_, mut session) = session_with(0, 20);
        let result = session.execute("use other").await.unwrap();
        assert_eq!(result.data, ResultData::Message("switched to db other".into()));
        assert_eq!(session.translator().database_name().as_deref(), Some("other"));

        let result = session.execute("use").await.unwrap();
        assert_eq!(result.data, ResultData::Message("specify database name".into()));
        let result = session.execute("show").await.unwrap();
        assert_eq!(result.data, ResultData::Message("show requires an argument".into()));
    }

    #[tokio::test]
    async fn test_cursor_result_and_continuation() {
        let (transport, mut session) = session_with(5, 2);

        let first = session.execute("db.items.find()").await.unwrap();
        assert_eq!(
            first.data,
            ResultData::Batch {
                documents: vec![doc! { "_id": 0 }, doc! { "_id": 1 }],
                has_more: true,
            }
        );

        let second = session.execute("it").await.unwrap();
        assert_eq!(second.stats.documents_returned, 2);
        let third = session.execute("it").await.unwrap();
        assert_eq!(
            third.data,
            ResultData::Batch {
                documents: vec![doc! { "_id": 4 }],
                has_more: false,
            }
        );
        let done = session.execute("it").await.unwrap();
        assert_eq!(done.data, ResultData::Message("no cursor".into()));
        assert_eq!(transport.stats().starts(), 1);
    }

    #[tokio::test]
    async fn test_it_without_cursor() {
        let (_, mut session) = session_with(0, 20);
        let result = session.execute("it").await.unwrap();
        assert_eq!(result.data, ResultData::Message("no cursor".into()));
    }

    #[tokio::test]
    async fn test_new_cursor_releases_previous() {
        let (transport, mut session) = session_with(5, 2);
        session.execute("db.items.find()").await.unwrap();
        session.execute("db.items.find({_id: 3})").await.unwrap();
        assert_eq!(transport.stats().releases(), 2);
    }

    #[tokio::test]
    async fn test_failed_pull_closes_cursor() {
        let (transport, mut session) = session_with(5, 2);
        session.execute("db.items.find()").await.unwrap();

        transport.fail_streams_after(1, "network reset");
        let err = session.execute("db.items.find({_id: {$gte: 0}})").await.unwrap_err();
        assert_eq!(err.to_string(), "Command failed: network reset");
        assert!(session.last_cursor().is_none());
        assert_eq!(transport.stats().starts(), 2);
        assert_eq!(transport.stats().releases(), 2);
    }

    #[tokio::test]
    async fn test_only_cursors_with_more_results_are_kept() {
        let (_, mut session) = session_with(2, 20);
        session.execute("db.items.find()").await.unwrap();
        assert!(session.last_cursor().is_none());
        let result = session.execute("it").await.unwrap();
        assert_eq!(result.data, ResultData::Message("no cursor".into()));

        let translator = Arc::new(CommandTranslator::new(
            Arc::new(MemoryTransport::new("mem")),
            None,
            20,
        ));
        let mut unselected = Session::new("mem", translator);
        let result = unselected.execute("db.items.find()").await.unwrap();
        assert_eq!(result.data, ResultData::Message("No database selected".into()));
        assert!(unselected.last_cursor().is_none());
    }

    #[tokio::test]
    async fn test_shell_commands_inside_scripts() {
        let (_, mut session) = session_with(0, 20);
        let result = session
            .execute("use other\ndb.orders.insertOne({a: 1})\ndb.orders.countDocuments({})")
            .await
            .unwrap();
        assert_eq!(result.data, ResultData::Value(Bson::Int64(1)));
        assert_eq!(session.translator().database_name().as_deref(), Some("other"));

        let result = session.execute("use('shop'); show('collections')").await.unwrap();
        assert_eq!(
            result.data,
            ResultData::Value(Bson::Array(vec![Bson::String("items".into())]))
        );
    }

    #[tokio::test]
    async fn test_it_inside_script_continues_cursor() {
        let (_, mut session) = session_with(3, 2);
        session.execute("db.items.find()").await.unwrap();
        let result = session.execute("print('next')\nit").await.unwrap();
        assert_eq!(result.printed, vec!["next".to_string()]);
        assert_eq!(
            result.data,
            ResultData::Batch {
                documents: vec![doc! { "_id": 2 }],
                has_more: false,
            }
        );
        assert!(session.last_cursor().is_none());
    }

    #[tokio::test]
    async fn test_materialized_drains_cursor() {
        let (transport, mut session) = session_with(5, 2);
        let result = session.execute_materialized("db.items.find()").await.unwrap();
        assert_eq!(result.stats.documents_returned, 5);
        assert!(session.last_cursor().is_none());
        assert_eq!(transport.stats().starts(), 1);
        assert_eq!(transport.stats().releases(), 1);
    }

    #[tokio::test]
    async fn test_print_and_values() {
        let (_, mut session) = session_with(3, 20);
        let result = session
            .execute("print('total', db.items.countDocuments({})); 7")
            .await
            .unwrap();
        assert_eq!(result.printed, vec!["total 3".to_string()]);
        assert_eq!(result.data, ResultData::Value(Bson::Int32(7)));
    }

    #[tokio::test]
    async fn test_evaluation_errors_propagate() {
        let (_, mut session) = session_with(0, 20);
        let err = session.execute("foo.bar()").await.unwrap_err();
        assert_eq!(err.to_string(), "ReferenceError: foo is not defined");
    }

    #[tokio::test]
    async fn test_close_once() {
        let (transport, mut session) = session_with(5, 2);
        session.execute("db.items.find()").await.unwrap();
        session.close().await.unwrap();
        session.close().await.unwrap();
        assert_eq!(transport.stats().shutdown_calls(), 1);
        assert_eq!(transport.stats().releases(), 1);
    }
}
