//! Shard fan-out execution
//!
//! [`ShardExecutor`] owns one [`Session`] per shard and runs the same
//! command against all of them concurrently. Every shard yields exactly one
//! [`ShardOutcome`]; a failure on one shard never affects the others.
//! Outcomes are reported in shard-name order regardless of completion
//! order.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::result::ExecutionResult;
use crate::error::{ExecutionError, Result, ShellError};
use crate::formatter::Formatter;
use crate::session::Session;

/// Result of one shard's run: a result or an error, never both.
#[derive(Debug)]
pub struct ShardOutcome {
    pub shard: String,
    pub result: Result<ExecutionResult>,
}

impl ShardOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Runs commands on every shard at once.
pub struct ShardExecutor {
    /// Sorted by shard name
    sessions: Vec<(String, Arc<Mutex<Session>>)>,

    formatter: Formatter,
}

impl ShardExecutor {
    /// Create an executor over the given sessions
    ///
    /// Sessions are keyed by [`Session::name`] and kept in name order.
    pub fn new(sessions: Vec<Session>, formatter: Formatter) -> Self {
        let mut sessions: Vec<(String, Arc<Mutex<Session>>)> = sessions
            .into_iter()
            .map(|s| (s.name().to_string(), Arc::new(Mutex::new(s))))
            .collect();
        sessions.sort_by(|a, b| a.0.cmp(&b.0));
        Self {
            sessions,
            formatter,
        }
    }

    pub fn shard_names(&self) -> Vec<&str> {
        self.sessions.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Run `text` on every shard and gather one outcome per shard.
    ///
    /// Cursor results are drained inside each shard's task. Cancelling
    /// `cancel` while outcomes are being gathered aborts every task and
    /// returns [`ShellError::Interrupted`].
    pub async fn execute_on_all(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<ShardOutcome>> {
        if self.sessions.is_empty() {
            warn!("no shards to execute on");
        }
        info!("executing on {} shard(s)", self.sessions.len());

        let handles: Vec<_> = self
            .sessions
            .iter()
            .map(|(name, session)| {
                let name = name.clone();
                let session = Arc::clone(session);
                let text = text.to_string();
                tokio::spawn(async move {
                    let mut session = session.lock().await;
                    debug!("[{}] running command", name);
                    session.execute_materialized(&text).await
                })
            })
            .collect();
        let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();

        let joined = tokio::select! {
            joined = join_all(handles) => joined,
            _ = cancel.cancelled() => {
                warn!("fan-out interrupted; aborting {} task(s)", aborts.len());
                for abort in &aborts {
                    abort.abort();
                }
                return Err(ShellError::Interrupted);
            }
        };

        let outcomes = self
            .sessions
            .iter()
            .zip(joined)
            .map(|((name, _), joined)| {
                let result = match joined {
                    Ok(result) => result,
                    Err(join_error) => Err(ExecutionError::TaskFailed {
                        shard: name.clone(),
                        message: join_error.to_string(),
                    }
                    .into()),
                };
                if let Err(e) = &result {
                    debug!("[{}] failed: {}", name, e);
                }
                ShardOutcome {
                    shard: name.clone(),
                    result,
                }
            })
            .collect();
        Ok(outcomes)
    }

    /// Render outcomes as per-shard blocks.
    pub fn render_outcomes(&self, outcomes: &[ShardOutcome]) -> String {
        self.formatter.format_outcomes(outcomes)
    }

    /// Run `text` on every shard and print one block per shard.
    pub async fn execute_on_all_shards(&self, text: &str, cancel: &CancellationToken) -> Result<()> {
        let outcomes = self.execute_on_all(text, cancel).await?;
        println!("{}", self.render_outcomes(&outcomes));
        Ok(())
    }

    /// Close every session in reverse order. Failures are logged.
    pub async fn close(&self) {
        for (name, session) in self.sessions.iter().rev() {
            if let Err(e) = session.lock().await.close().await {
                error!("failed to close shard {}: {}", name, e);
            }
        }
    }
}

impl std::fmt::Debug for ShardExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardExecutor")
            .field("shards", &self.shard_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ResultData;
    use crate::translator::{CommandTranslator, Namespace};
    use crate::transport::MemoryTransport;
    use mongodb::bson::{Bson, doc};
    use std::time::Duration;

    fn shard(name: &str, docs: i32) -> (Arc<MemoryTransport>, Session) {
        let transport = Arc::new(MemoryTransport::new(name));
        transport.seed(
            &Namespace::new("app", "events"),
            (0..docs).map(|i| doc! { "_id": i }).collect(),
        );
        let translator = Arc::new(CommandTranslator::new(transport.clone(), Some("app".into()), 2));
        (transport, Session::new(name, translator))
    }

    #[tokio::test]
    async fn test_no_shards_renders_notice() {
        let executor = ShardExecutor::new(Vec::new(), Formatter::new(false));
        let outcomes = executor
            .execute_on_all("db.events.countDocuments({})", &CancellationToken::new())
            .await
            .unwrap();
        assert!(outcomes.is_empty());
        assert_eq!(executor.render_outcomes(&outcomes), "No shards available");
    }

    #[tokio::test]
    async fn test_outcomes_in_name_order_with_isolated_failure() {
        let (_, s2) = shard("s2", 3);
        let (failing, s1) = shard("s1", 1);
        let (_, s0) = shard("s0", 2);
        failing.fail_with("connection refused");

        let executor = ShardExecutor::new(vec![s2, s1, s0], Formatter::new(false));
        let outcomes = executor
            .execute_on_all("db.events.countDocuments({})", &CancellationToken::new())
            .await
            .unwrap();

        let names: Vec<&str> = outcomes.iter().map(|o| o.shard.as_str()).collect();
        assert_eq!(names, vec!["s0", "s1", "s2"]);
        assert!(outcomes[0].is_ok());
        assert!(!outcomes[1].is_ok());
        assert_eq!(
            outcomes[2].result.as_ref().unwrap().data,
            ResultData::Value(Bson::Int64(3))
        );
    }

    #[tokio::test]
    async fn test_cursor_results_are_materialized() {
        let (transport, s0) = shard("s0", 5);
        let executor = ShardExecutor::new(vec![s0], Formatter::new(false));
        let outcomes = executor
            .execute_on_all("db.events.find()", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcomes[0].result.as_ref().unwrap().stats.documents_returned, 5);
        assert_eq!(transport.stats().starts(), 1);
    }

    #[tokio::test]
    async fn test_cancel_aborts_round() {
        let transport = Arc::new(
            MemoryTransport::new("slow").with_latency(Duration::from_secs(30)),
        );
        let translator = Arc::new(CommandTranslator::new(transport, Some("app".into()), 2));
        let executor = ShardExecutor::new(vec![Session::new("slow", translator)], Formatter::new(false));

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = executor
            .execute_on_all("db.events.countDocuments({})", &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ShellError::Interrupted));
    }

    #[tokio::test]
    async fn test_close_releases_every_shard() {
        let (t0, s0) = shard("s0", 0);
        let (t1, s1) = shard("s1", 0);
        let executor = ShardExecutor::new(vec![s0, s1], Formatter::new(false));
        executor.close().await;
        assert_eq!(t0.stats().shutdown_calls(), 1);
        assert_eq!(t1.stats().shutdown_calls(), 1);
    }
}
