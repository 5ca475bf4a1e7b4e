//! Fan-out over several in-memory shards.

use std::sync::Arc;

use mongodb::bson::{Bson, doc};
use tokio_util::sync::CancellationToken;

use mshell::config::{ConnectionConfig, ShardConfig};
use mshell::formatter::Formatter;
use mshell::translator::{CommandTranslator, Namespace};
use mshell::transport::MemoryTransport;
use mshell::{ConnectionManager, ResultData, Session, ShardExecutor, StaticTopology, TopologyProvider};

fn shard(name: &str, orders: i32) -> (Arc<MemoryTransport>, Session) {
    let transport = Arc::new(MemoryTransport::new(name));
    transport.seed(
        &Namespace::new("shop", "orders"),
        (0..orders).map(|i| doc! { "_id": i, "shard": name }).collect(),
    );
    let translator = Arc::new(CommandTranslator::new(transport.clone(), Some("shop".into()), 20));
    (transport, Session::new(name, translator))
}

#[tokio::test]
async fn test_failing_shard_is_reported_in_order() {
    let (_, s0) = shard("s0", 2);
    let (t1, s1) = shard("s1", 4);
    let (_, s2) = shard("s2", 6);
    t1.fail_with("connection reset by peer");

    let executor = ShardExecutor::new(vec![s1, s2, s0], Formatter::new(false));
    let outcomes = executor
        .execute_on_all("db.orders.countDocuments({})", &CancellationToken::new())
        .await
        .unwrap();

    let rendered = executor.render_outcomes(&outcomes);
    assert_eq!(
        rendered,
        "=== Shard: s0 ===\n2\n\n\
         === Shard: s1 ===\nERROR: Command failed: connection reset by peer\n\n\
         === Shard: s2 ===\n6"
    );
}

#[tokio::test]
async fn test_find_is_materialized_per_shard() {
    let (_, s0) = shard("s0", 25);
    let (_, s1) = shard("s1", 0);
    let executor = ShardExecutor::new(vec![s0, s1], Formatter::new(false));

    let outcomes = executor
        .execute_on_all("db.orders.find()", &CancellationToken::new())
        .await
        .unwrap();

    match &outcomes[0].result.as_ref().unwrap().data {
        ResultData::Documents(docs) => assert_eq!(docs.len(), 25),
        other => panic!("expected documents, got {other:?}"),
    }
    let rendered = executor.render_outcomes(&outcomes);
    assert!(rendered.contains("Results: 25 document(s)"));
    assert!(rendered.contains("=== Shard: s1 ===\nResults: 0 document(s)"));
    assert!(!rendered.contains("Type \"it\" for more"));
}

#[tokio::test]
async fn test_writes_stay_on_each_shard() {
    let (t0, s0) = shard("s0", 0);
    let (t1, s1) = shard("s1", 0);
    let executor = ShardExecutor::new(vec![s0, s1], Formatter::new(false));
    let cancel = CancellationToken::new();

    executor
        .execute_on_all("db.orders.insertOne({marker: true})", &cancel)
        .await
        .unwrap();
    let outcomes = executor
        .execute_on_all("db.orders.countDocuments({marker: true})", &cancel)
        .await
        .unwrap();
    for outcome in &outcomes {
        assert_eq!(
            outcome.result.as_ref().unwrap().data,
            ResultData::Value(Bson::Int64(1))
        );
    }

    executor.close().await;
    assert_eq!(t0.stats().shutdown_calls(), 1);
    assert_eq!(t1.stats().shutdown_calls(), 1);
}

#[tokio::test]
async fn test_static_topology_feeds_executor() {
    let entries = vec![
        ShardConfig {
            name: "beta".into(),
            uri: "mongodb://beta:27018".into(),
        },
        ShardConfig {
            name: "alpha".into(),
            uri: "mongodb://alpha:27018".into(),
        },
    ];
    let topology = StaticTopology::new(entries, ConnectionManager::new(ConnectionConfig::default()), 20)
        .unwrap()
        .in_memory();

    let sessions: Vec<Session> = topology
        .shards()
        .await
        .unwrap()
        .into_iter()
        .map(|target| {
            let translator = Arc::new(CommandTranslator::new(target.transport, Some("shop".into()), 20));
            Session::new(target.name, translator)
        })
        .collect();
    let executor = ShardExecutor::new(sessions, Formatter::new(false));
    assert_eq!(executor.shard_names(), vec!["alpha", "beta"]);
}
