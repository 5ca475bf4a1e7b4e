//! End-to-end scenarios for one endpoint, driven through the session.

use std::sync::Arc;

use mongodb::bson::{Bson, Document, doc};

use mshell::formatter::{Formatter, MORE_HINT};
use mshell::translator::{CommandTranslator, Namespace};
use mshell::transport::MemoryTransport;
use mshell::{ResultData, Session};

fn shell(batch_size: usize) -> (Arc<MemoryTransport>, Session) {
    let transport = Arc::new(MemoryTransport::new("memory"));
    let translator = Arc::new(CommandTranslator::new(
        transport.clone(),
        Some("shop".into()),
        batch_size,
    ));
    (transport, Session::new("memory", translator))
}

fn documents(data: ResultData) -> Vec<Document> {
    match data {
        ResultData::Documents(docs) => docs,
        ResultData::Batch { documents, .. } => documents,
        other => panic!("expected documents, got {other:?}"),
    }
}

#[tokio::test]
async fn test_insert_find_count_update() {
    let (_, mut session) = shell(20);

    let inserted = session.execute("db.orders.insertOne({a: 1})").await.unwrap();
    let ResultData::Document(reply) = inserted.data else {
        panic!("insertOne should reply with a document");
    };
    assert_eq!(reply.get_bool("acknowledged"), Ok(true));
    let id = reply.get("insertedId").cloned().unwrap();
    assert!(!matches!(id, Bson::Null));

    let all = session.execute("db.orders.find().toArray()").await.unwrap();
    assert_eq!(documents(all.data), vec![doc! { "_id": id.clone(), "a": 1 }]);

    let count = session.execute("db.orders.countDocuments({})").await.unwrap();
    assert_eq!(count.data, ResultData::Value(Bson::Int64(1)));

    let updated = session
        .execute("db.orders.updateOne({a: 1}, {b: 2}, false)")
        .await
        .unwrap();
    let ResultData::Document(reply) = updated.data else {
        panic!("updateOne should reply with a document");
    };
    assert_eq!(reply.get_i64("matchedCount"), Ok(1));

    let found = session.execute("db.orders.findOne({a: 1})").await.unwrap();
    assert_eq!(found.data, ResultData::Document(doc! { "_id": id, "a": 1, "b": 2 }));
}

#[tokio::test]
async fn test_cursor_starts_once_and_continues_with_it() {
    let (transport, mut session) = shell(20);
    transport.seed(
        &Namespace::new("shop", "items"),
        (0..45).map(|i| doc! { "_id": i }).collect(),
    );
    let formatter = Formatter::new(false);

    let first = session.execute("db.items.find()").await.unwrap();
    assert_eq!(first.stats.documents_returned, 20);
    assert!(formatter.format(&first).ends_with(MORE_HINT));

    let second = session.execute("it").await.unwrap();
    assert_eq!(second.stats.documents_returned, 20);

    let third = session.execute("it").await.unwrap();
    assert_eq!(third.stats.documents_returned, 5);
    assert!(!formatter.format(&third).contains(MORE_HINT));

    assert_eq!(transport.stats().starts(), 1);
    let done = session.execute("it").await.unwrap();
    assert_eq!(done.data, ResultData::Message("no cursor".into()));
}

#[tokio::test]
async fn test_cursor_builders_shape_the_query() {
    let (transport, mut session) = shell(20);
    transport.seed(
        &Namespace::new("shop", "items"),
        (0..10).map(|i| doc! { "_id": i, "n": i }).collect(),
    );

    let result = session
        .execute("db.items.find({n: {$gte: 2}}).sort({n: -1}).skip(1).limit(3)")
        .await
        .unwrap();
    let ids: Vec<i32> = documents(result.data)
        .iter()
        .map(|d| d.get_i32("_id").unwrap())
        .collect();
    assert_eq!(ids, vec![8, 7, 6]);

    let counted = session
        .execute("db.items.find({n: {$gte: 2}}).limit(3).count()")
        .await
        .unwrap();
    assert_eq!(counted.data, ResultData::Value(Bson::Int64(8)));
}

#[tokio::test]
async fn test_count_uses_estimate_and_count_documents_is_exact() {
    let (transport, mut session) = shell(20);

    let empty = session.execute("db.orders.count()").await.unwrap();
    assert_eq!(empty.data, ResultData::Value(Bson::Int64(0)));
    let empty = session.execute("db.orders.countDocuments({})").await.unwrap();
    assert_eq!(empty.data, ResultData::Value(Bson::Int64(0)));

    assert_eq!(transport.stats().estimated(), 1);
    assert_eq!(transport.stats().exact(), 1);

    session.execute("db.orders.count({a: 1})").await.unwrap();
    assert_eq!(transport.stats().exact(), 2);
}

#[tokio::test]
async fn test_dotted_collection_names() {
    let (transport, mut session) = shell(20);
    transport.seed(
        &Namespace::new("shop", "rollup.daily"),
        vec![doc! { "_id": 1 }, doc! { "_id": 2 }],
    );

    let result = session
        .execute("db.rollup.daily.countDocuments({})")
        .await
        .unwrap();
    assert_eq!(result.data, ResultData::Value(Bson::Int64(2)));

    let literal = session.execute("'db.rollup.daily.find()'").await.unwrap();
    assert_eq!(literal.data, ResultData::Message("db.rollup.daily.find()".into()));
}

#[tokio::test]
async fn test_regex_filters() {
    let (transport, mut session) = shell(20);
    transport.seed(
        &Namespace::new("shop", "users"),
        vec![
            doc! { "_id": 1, "name": "Alice" },
            doc! { "_id": 2, "name": "bob" },
            doc! { "_id": 3, "name": "ALINA" },
        ],
    );

    let bare = session
        .execute("db.users.countDocuments({name: /^al/i})")
        .await
        .unwrap();
    assert_eq!(bare.data, ResultData::Value(Bson::Int64(2)));

    let nested = session
        .execute("db.users.countDocuments({name: {$regex: /^al/}})")
        .await
        .unwrap();
    assert_eq!(nested.data, ResultData::Value(Bson::Int64(0)));
}

#[tokio::test]
async fn test_no_database_selected_is_a_notice() {
    let transport = Arc::new(MemoryTransport::new("memory"));
    let translator = Arc::new(CommandTranslator::new(transport, None, 20));
    let mut session = Session::new("memory", translator);

    let result = session.execute("db.orders.find()").await.unwrap();
    assert_eq!(result.data, ResultData::Message("No database selected".into()));

    session.execute("use shop").await.unwrap();
    let result = session.execute("db.orders.countDocuments({})").await.unwrap();
    assert_eq!(result.data, ResultData::Value(Bson::Int64(0)));
}

#[tokio::test]
async fn test_errors_and_admin_failures() {
    let (_, mut session) = shell(20);

    let err = session.execute("db.orders.explode()").await.unwrap_err();
    assert_eq!(err.to_string(), "TypeError: db.orders.explode is not a function");

    let status = session.execute("rs.status()").await.unwrap();
    let ResultData::Document(reply) = status.data else {
        panic!("rs.status() should reply with a document");
    };
    assert_eq!(reply.get_i32("ok"), Ok(0));
    assert!(reply.get_str("errmsg").unwrap().contains("--replSet"));
}

#[tokio::test]
async fn test_show_unknown_and_help() {
    let (_, mut session) = shell(20);

    let unknown = session.execute("show widgets").await.unwrap();
    assert_eq!(unknown.data, ResultData::Message("Unknown show command: widgets".into()));

    let help = session.execute("help").await.unwrap();
    let ResultData::Message(text) = help.data else {
        panic!("help should reply with text");
    };
    assert!(text.contains("use <db>"));
}

#[tokio::test]
async fn test_shell_commands_in_multi_statement_input() {
    let (_, mut session) = shell(20);

    let inserted = session
        .execute("use warehouse\ndb.orders.insertOne({sku: 'a-1', qty: 2})\ndb.orders.countDocuments({})")
        .await
        .unwrap();
    assert_eq!(inserted.data, ResultData::Value(Bson::Int64(1)));
    assert_eq!(session.translator().database_name().as_deref(), Some("warehouse"));

    let listed = session.execute("use('warehouse'); show('collections')").await.unwrap();
    assert_eq!(
        listed.data,
        ResultData::Value(Bson::Array(vec![Bson::String("orders".into())]))
    );

    let dbs = session.execute("show('dbs')").await.unwrap();
    let ResultData::Value(Bson::Array(names)) = dbs.data else {
        panic!("show('dbs') should list names");
    };
    assert!(names.contains(&Bson::String("warehouse".into())));
}
